//! # ampsym-core
//!
//! This is an internal crate used by `ampsym`. It holds the symbolic side of the library
//! (symbols, the expression tree, pool sums, parameter binding and formatting) and the numeric
//! compiler which turns a finished tree into a broadcasting [`NumericFunction`].
#![warn(clippy::perf, clippy::style)]
#![allow(clippy::excessive_precision)]

use thiserror::Error;

/// Substitution of symbols and coefficients by values or sub-expressions.
pub mod binding;
/// Lowering of expression trees into flat, callable numeric functions.
pub mod compile;
/// The immutable expression tree and its transformations.
pub mod expression;
/// Pluggable formatting of expression trees.
pub mod format;
/// Symbols, indexed coefficients, and the variables built from them.
pub mod symbols;
/// Utility functions and enums.
pub mod utils;

pub use crate::binding::Binding;
pub use crate::compile::{compile, FunctionCache, NumericFunction, Value};
pub use crate::expression::{Expr, Index, IndexRange, Node, NodeKind};
pub use crate::format::{NodeFormatter, Printer, Style};
pub use crate::symbols::{Coefficient, CoefficientFamily, Domain, Role, Symbol, Variable};
pub use crate::utils::enums::Sign;

/// The mathematical constant $`\pi`$.
pub const PI: f64 = std::f64::consts::PI;

/// Shorthand for results returned by `ampsym` methods.
pub type AmpsymResult<T> = Result<T, AmpsymError>;

/// The error type used by all `ampsym` internal methods
#[derive(Error, Debug)]
pub enum AmpsymError {
    /// An alias for [`std::io::Error`].
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// An alias for [`shellexpand::LookupError`].
    #[error("Failed to expand path: {0}")]
    LookupError(#[from] shellexpand::LookupError<std::env::VarError>),
    /// An alias for [`toml::de::Error`].
    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
    /// An alias for [`serde_json::Error`].
    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// An error raised while assembling a formula from an invalid order or index set.
    #[error("Invalid formula construction: {reason}")]
    Construction {
        /// What was wrong with the request
        reason: String,
    },
    /// A free symbol of an expression has no corresponding argument of the function being
    /// compiled.
    #[error("Free symbol \"{name}\" is not among the declared arguments")]
    UnboundSymbol {
        /// Name of the unbound symbol
        name: String,
    },
    /// An argument list names the same variable twice.
    #[error("Argument \"{name}\" appears more than once in the argument list")]
    DuplicateArgument {
        /// Name of the repeated argument
        name: String,
    },
    /// An index variable of a pool sum survived into a place where a concrete value is needed.
    #[error("Index \"{name}\" has no value outside of its pool sum")]
    UnboundIndex {
        /// Name of the index variable
        name: String,
    },
    /// Two array arguments cannot be broadcast against each other.
    #[error("Cannot broadcast shapes {left:?} and {right:?}")]
    ShapeMismatch {
        /// Shape broadcast so far
        left: Vec<usize>,
        /// Shape of the offending argument
        right: Vec<usize>,
    },
    /// A compiled function was called with the wrong number of arguments.
    #[error("Expected {expected} arguments, got {got}")]
    ArityMismatch {
        /// Number of declared arguments
        expected: usize,
        /// Number of arguments supplied
        got: usize,
    },
    /// A binding refers to a coefficient family which was never declared.
    #[error("No coefficient family \"{family}\" was declared for this binding")]
    BindingKey {
        /// Display name of the undeclared family
        family: String,
    },
    /// A renderer control was requested which does not exist.
    #[error("No control named \"{name}\"")]
    UnknownControl {
        /// Name of the control which failed lookup
        name: String,
    },
    /// A heatmap could not be drawn or saved.
    #[error("Failed to render image: {0}")]
    Render(String),
    /// An error which occurs when the user tries to parse an invalid string of text, typically
    /// into an enum variant.
    #[error("Failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"!")]
    ParseError {
        /// The string which was parsed
        name: String,
        /// The name of the object it failed to parse into
        object: String,
    },
    /// A custom fallback error for errors too complex or too infrequent to warrant their own error
    /// category.
    #[error("{0}")]
    Custom(String),
}

impl Clone for AmpsymError {
    // error sources are rarely cloneable, so clones keep only the message
    fn clone(&self) -> Self {
        AmpsymError::Custom(self.to_string())
    }
}
