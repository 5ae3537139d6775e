use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::utils::enums::Sign;

/// The set of values a [`Symbol`] may take.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// A real-valued unknown.
    Real,
    /// An unrestricted (complex-valued) unknown.
    Complex,
}

/// How a [`Symbol`] is supplied when a compiled function is evaluated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// A scalar parameter, typically driven by a control.
    Parameter,
    /// A coordinate of the evaluation grid.
    Coordinate,
}

/// An opaque named scalar unknown.
///
/// Two symbols are the same symbol only if their name, [`Domain`], and [`Role`] all agree.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol {
    name: String,
    domain: Domain,
    role: Role,
}

impl Symbol {
    /// Create a new [`Symbol`].
    pub fn new(name: &str, domain: Domain, role: Role) -> Self {
        Self {
            name: name.to_string(),
            domain,
            role,
        }
    }
    /// Shorthand for a real-valued parameter.
    pub fn parameter(name: &str) -> Self {
        Self::new(name, Domain::Real, Role::Parameter)
    }
    /// Shorthand for a real-valued grid coordinate.
    pub fn coordinate(name: &str) -> Self {
        Self::new(name, Domain::Real, Role::Coordinate)
    }
    /// The name of the symbol.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The [`Domain`] of the symbol.
    pub fn domain(&self) -> Domain {
        self.domain
    }
    /// The [`Role`] of the symbol.
    pub fn role(&self) -> Role {
        self.role
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A declared family of indexed coefficients, such as $`A^{(+)}`$.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoefficientFamily {
    name: String,
    sign: Sign,
}

impl CoefficientFamily {
    /// Declare a new family with the given base name and branch [`Sign`].
    pub fn new(name: &str, sign: Sign) -> Self {
        Self {
            name: name.to_string(),
            sign,
        }
    }
    /// The base name shared by both branches.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The branch label.
    pub fn sign(&self) -> Sign {
        self.sign
    }
    /// The concrete member of this family at the given indices.
    pub fn at(&self, indices: &[i64]) -> Coefficient {
        Coefficient {
            family: self.clone(),
            indices: indices.to_vec(),
        }
    }
}

impl Display for CoefficientFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.sign)
    }
}

/// One complex-valued member of a [`CoefficientFamily`] at a concrete index tuple.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coefficient {
    family: CoefficientFamily,
    indices: Vec<i64>,
}

impl Coefficient {
    /// The family this coefficient belongs to.
    pub fn family(&self) -> &CoefficientFamily {
        &self.family
    }
    /// The concrete indices.
    pub fn indices(&self) -> &[i64] {
        &self.indices
    }
}

impl Display for Coefficient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indices = self
            .indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{}[{}]", self.family, indices)
    }
}

/// Anything which can be free in an expression: a plain [`Symbol`] or a concrete
/// [`Coefficient`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variable {
    /// A plain symbol.
    Symbol(Symbol),
    /// An indexed coefficient.
    Coefficient(Coefficient),
}

impl Variable {
    /// A stable text name, used for ordering argument lists and binding controls.
    pub fn name(&self) -> String {
        match self {
            Variable::Symbol(s) => s.name().to_string(),
            Variable::Coefficient(c) => c.to_string(),
        }
    }
    /// The [`Domain`] of the variable. Coefficients are always complex.
    pub fn domain(&self) -> Domain {
        match self {
            Variable::Symbol(s) => s.domain(),
            Variable::Coefficient(_) => Domain::Complex,
        }
    }
    /// Whether this variable is a coordinate of the evaluation grid.
    pub fn is_coordinate(&self) -> bool {
        matches!(self, Variable::Symbol(s) if s.role() == Role::Coordinate)
    }
    /// The coefficient this variable refers to, if any.
    pub fn as_coefficient(&self) -> Option<&Coefficient> {
        match self {
            Variable::Coefficient(c) => Some(c),
            Variable::Symbol(_) => None,
        }
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<Symbol> for Variable {
    fn from(value: Symbol) -> Self {
        Variable::Symbol(value)
    }
}

impl From<&Symbol> for Variable {
    fn from(value: &Symbol) -> Self {
        Variable::Symbol(value.clone())
    }
}

impl From<Coefficient> for Variable {
    fn from(value: Coefficient) -> Self {
        Variable::Coefficient(value)
    }
}

impl From<&Coefficient> for Variable {
    fn from(value: &Coefficient) -> Self {
        Variable::Coefficient(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_identity_includes_domain() {
        let a = Symbol::new("x", Domain::Real, Role::Parameter);
        let b = Symbol::new("x", Domain::Complex, Role::Parameter);
        assert_ne!(a, b);
        assert_eq!(a, Symbol::parameter("x"));
    }

    #[test]
    fn test_coefficient_names() {
        let plus = CoefficientFamily::new("A", Sign::Positive);
        let minus = CoefficientFamily::new("A", Sign::Negative);
        assert_eq!(plus.at(&[-1, 0]).to_string(), "A+[-1,0]");
        assert_eq!(Variable::from(minus.at(&[2, 1])).name(), "A-[2,1]");
        assert_ne!(plus.at(&[1, 0]), plus.at(&[0, 1]));
        assert_ne!(plus.at(&[1, 0]), minus.at(&[1, 0]));
    }

    #[test]
    fn test_variable_roles() {
        let theta = Variable::from(Symbol::coordinate("theta"));
        let p = Variable::from(Symbol::parameter("P"));
        let c = Variable::from(CoefficientFamily::new("A", Sign::Positive).at(&[0, 0]));
        assert!(theta.is_coordinate());
        assert!(!p.is_coordinate());
        assert_eq!(c.domain(), Domain::Complex);
        assert!(c.as_coefficient().is_some());
    }
}
