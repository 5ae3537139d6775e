//! `ampsym` is a library for building the angular intensity of polarized two-body decays as a
//! symbolic expression, inspecting it, and turning it into a fast numeric function which can be
//! evaluated over whole grids of angles at once.
//!
//! <div class="warning">
//!
//! This crate is still in an early development phase, and the API is not stable.
//!
//! </div>
//!
//! # Table of Contents
//! - [Key Features](#key-features)
//! - [Quick Start](#quick-start)
//!   - [Assembling a Model](#assembling-a-model)
//!   - [Compiling and Evaluating](#compiling-and-evaluating)
//!   - [Interactive Sessions](#interactive-sessions)
//! - [Command Line](#command-line)
//!
//! # Key Features
//! * A compact expression tree with pool sums over index ranges and phase-rotated harmonics
//!   $`Z_\ell^m(\theta, \phi, \Phi) = Y_\ell^m(\theta, \phi) e^{-\imath\Phi}`$, which is only
//!   expanded when asked to.
//! * Structural substitution of symbols and indexed coefficients by numbers or sub-expressions.
//! * Text and LaTeX printing with per-node overrides.
//! * A numeric compiler with common-subexpression elimination and numpy-style broadcasting,
//!   parallelized with [`rayon`](https://github.com/rayon-rs/rayon).
//! * Heatmap sessions driven by sliders, for exploring how each partial wave shapes the
//!   intensity.
//!
//! # Quick Start
//! ## Assembling a Model
//! The polarized intensity up to $`\ell = 2`$, with one flip index and $`m \in [-2, 2]`$:
//! ```rust
//! use ampsym::{assemble, Printer};
//!
//! let model = assemble(2, &[0], &[-2, -1, 0, 1, 2]).unwrap();
//! println!("{}", Printer::latex().render(model.expression()));
//! ```
//!
//! ## Compiling and Evaluating
//! Any parameter can be bound before compiling. Everything left free becomes an argument, and
//! arguments accept both scalars and arrays:
//! ```rust
//! use ampsym::{assemble, compile, Value};
//! use ndarray::Array2;
//!
//! let model = assemble(1, &[0], &[-1, 0, 1]).unwrap();
//! let mut binding = model.binding();
//! binding.bind_symbol(model.kappa(), 1.0);
//! let expression = model.expression().substitute(&binding);
//! let arguments = expression.expand().sorted_free_variables();
//! let function = compile(&expression, &arguments).unwrap();
//!
//! let theta = Array2::from_elem((4, 3), 0.3);
//! let values: Vec<Value> = arguments
//!     .iter()
//!     .map(|a| match a.name().as_str() {
//!         "theta" => Value::from(theta.clone()),
//!         _ => Value::from(0.5),
//!     })
//!     .collect();
//! let intensity = function.call(&values).unwrap();
//! assert_eq!(intensity.shape(), vec![4, 3]);
//! ```
//!
//! ## Interactive Sessions
//! A [`Session`] couples a compiled model to a grid, a set of sliders, and a [`Canvas`]. Every
//! slider change evaluates the grid once and redraws:
//! ```rust,no_run
//! use ampsym::{HeatmapCanvas, Session, SessionConfig};
//!
//! let config = SessionConfig::default();
//! let canvas = HeatmapCanvas::new(&config.canvas.output, config.canvas.scale).unwrap();
//! let mut session = Session::from_config(&config, canvas).unwrap();
//! session.set_control("A+[1,0] phase", 1.2).unwrap();
//! ```
//!
//! # Command Line
//! The `ampsym` binary prints formulas (`ampsym formula --format latex`), evaluates single points,
//! exports and compares grids, and runs sessions reading commands from standard input. Built
//! with the `gui` feature, `ampsym gui` opens the same session in a window with sliders. Logging
//! is controlled by `RUST_LOG` (default `ampsym=info`).
#![warn(clippy::perf, clippy::style, missing_docs)]

/// Symbols, coefficients, and variables.
pub mod symbols {
    pub use ampsym_core::symbols::*;
}

/// The expression tree.
pub mod expression {
    pub use ampsym_core::expression::*;
}

/// Substitution of variables.
pub mod binding {
    pub use ampsym_core::binding::*;
}

/// The numeric compiler.
pub mod compile {
    pub use ampsym_core::compile::*;
}

/// Formatting of expressions.
pub mod format {
    pub use ampsym_core::format::*;
}

/// Utility functions, enums, and path helpers.
pub mod utils {
    pub use ampsym_core::utils::*;
}

/// Interactive sessions.
pub mod render {
    pub use ampsym_render::*;
}

pub use ampsym_amplitudes::*;
pub use ampsym_core::compile::compile;
pub use ampsym_core::{
    AmpsymError, AmpsymResult, Binding, Coefficient, CoefficientFamily, Domain, Expr,
    FunctionCache, Index, IndexRange, Node, NodeFormatter, NodeKind, NumericFunction, Printer,
    Role, Sign, Style, Symbol, Value, Variable, PI,
};
pub use ampsym_render::{
    compare_exports, export_grid, Canvas, Comparison, ControlSet, GridExport, GridSample,
    HeatmapCanvas, MemoryCanvas, Panel, RedrawOutcome, RenderState, Session, SessionConfig, Slider,
};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use num::complex::Complex64;

    fn random_point(rng: &mut fastrand::Rng, arguments: &[Variable]) -> HashMap<Variable, Complex64> {
        arguments
            .iter()
            .map(|a| {
                let value = match a {
                    Variable::Symbol(s) => match s.name() {
                        "theta" => Complex64::new(rng.f64() * PI, 0.0),
                        "phi" | "Phi" => Complex64::new((2.0 * rng.f64() - 1.0) * PI, 0.0),
                        _ => Complex64::new(rng.f64(), 0.0),
                    },
                    Variable::Coefficient(_) => {
                        Complex64::from_polar(2.0 * rng.f64(), (2.0 * rng.f64() - 1.0) * PI)
                    }
                };
                (a.clone(), value)
            })
            .collect()
    }

    #[test]
    fn test_compiled_matches_bound_evaluation() {
        let model = assemble(2, &[0, 1], &[-2, -1, 0, 1, 2]).unwrap();
        let arguments = model.expanded().sorted_free_variables();
        let function = compile(model.expression(), &arguments).unwrap();
        let mut rng = fastrand::Rng::with_seed(2024);
        for _ in 0..20 {
            let point = random_point(&mut rng, &arguments);
            let mut binding = model.binding();
            for (variable, value) in &point {
                binding.bind(variable.clone(), *value).unwrap();
            }
            let direct = model
                .expression()
                .substitute(&binding)
                .evaluate(&HashMap::new())
                .unwrap();
            let values: Vec<Value> = arguments.iter().map(|a| Value::from(point[a])).collect();
            let compiled = function.call(&values).unwrap().as_scalar().unwrap();
            assert_relative_eq!(compiled.re, direct.re, max_relative = 1e-9, epsilon = 1e-12);
            assert_relative_eq!(compiled.im, direct.im, max_relative = 1e-9, epsilon = 1e-12);
            assert!(direct.re >= -1e-12);
        }
    }

    #[test]
    fn test_compile_module_and_function_paths() {
        let x = Symbol::parameter("x");
        let arguments = vec![Variable::from(&x)];
        let mut cache = crate::compile::FunctionCache::default();
        let function = compile(&Expr::from(&x).norm_sqr(), &arguments).unwrap();
        let cached = cache
            .get_or_compile(&Expr::from(&x).norm_sqr(), &arguments)
            .unwrap();
        let value = Value::from(3.0);
        assert_eq!(
            function.call(&[value.clone()]).unwrap().as_scalar(),
            cached.call(&[value]).unwrap().as_scalar()
        );
    }

    #[test]
    fn test_full_grid_keeps_its_shape() {
        let model = assemble(2, &[0], &[-2, -1, 0, 1, 2]).unwrap();
        let arguments = model.expanded().sorted_free_variables();
        let function = compile(model.expression(), &arguments).unwrap();
        let grid = GridSample::default();
        let values: Vec<Value> = arguments
            .iter()
            .map(|a| {
                grid.coordinate(&a.name())
                    .unwrap_or_else(|| Value::from(0.5))
            })
            .collect();
        let intensity = function.call(&values).unwrap();
        assert_eq!(intensity.shape(), vec![400, 200]);

        let mut wrong = values.clone();
        let theta = arguments.iter().position(|a| a.name() == "theta").unwrap();
        wrong[theta] = Value::from(Array2::<f64>::zeros((200, 400)));
        assert!(matches!(
            function.call(&wrong),
            Err(AmpsymError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_argument_fails_at_compile_time() {
        let model = assemble(1, &[0], &[-1, 0, 1]).unwrap();
        let mut arguments = model.expanded().sorted_free_variables();
        arguments.retain(|a| a.name() != "P");
        assert!(matches!(
            compile(model.expression(), &arguments),
            Err(AmpsymError::UnboundSymbol { name }) if name == "P"
        ));
    }

    #[test]
    fn test_fully_polarized_negative_branch_point() {
        let model = assemble(2, &[0], &[-2, -1, 0, 1, 2]).unwrap();
        let mut binding = model.binding();
        for coefficient in model.coefficients() {
            let value = match coefficient.family().sign() {
                Sign::Positive => 0.0,
                Sign::Negative => 1.0,
            };
            binding.bind(coefficient, value).unwrap();
        }
        binding
            .bind_symbol(model.polarization(), 1.0)
            .bind_symbol(model.kappa(), PI)
            .bind_symbol(model.theta(), PI / 2.0)
            .bind_symbol(model.phi(), 0.0)
            .bind_symbol(model.big_phi(), 0.0);
        let value = model
            .expression()
            .substitute(&binding)
            .evaluate(&HashMap::new())
            .unwrap();
        assert!(value.re.is_finite());
        assert!(value.re >= 0.0);
        assert_relative_eq!(value.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_session_from_default_config_on_a_small_grid() {
        let mut config = SessionConfig::default();
        config.grid.n_phi = 20;
        config.grid.n_costheta = 10;
        let mut session = Session::from_config(&config, MemoryCanvas::new()).unwrap();
        let outcome = session.set_control("P", 0.0).unwrap();
        assert!(matches!(outcome, RedrawOutcome::Drawn { .. }));
        assert_eq!(session.canvas().draws(), 2);
    }
}
