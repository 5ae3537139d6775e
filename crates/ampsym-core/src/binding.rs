use std::collections::HashMap;

use indexmap::IndexMap;
use num::complex::Complex64;

use crate::{
    expression::{Index, Node},
    symbols::{CoefficientFamily, Symbol, Variable},
    AmpsymError, AmpsymResult, Expr, Sign,
};

/// A mapping from [`Variable`]s to literal numbers or sub-expressions, used for analytic
/// substitution with [`Expr::substitute`].
///
/// A binding knows which [`CoefficientFamily`]s were declared when the formula was assembled and
/// refuses (at construction time) to hold a coefficient from any other family.
#[derive(Clone, Debug, Default)]
pub struct Binding {
    families: Vec<CoefficientFamily>,
    values: IndexMap<Variable, Expr>,
}

impl Binding {
    /// Create an empty binding for the given declared coefficient families.
    pub fn new(families: &[CoefficientFamily]) -> Self {
        Self {
            families: families.to_vec(),
            values: IndexMap::default(),
        }
    }

    /// The declared coefficient families.
    pub fn families(&self) -> &[CoefficientFamily] {
        &self.families
    }

    fn check_family(&self, family: &CoefficientFamily) -> AmpsymResult<()> {
        if self.families.contains(family) {
            Ok(())
        } else {
            Err(AmpsymError::BindingKey {
                family: family.to_string(),
            })
        }
    }

    /// Bind a symbol or coefficient to a value.
    ///
    /// # Errors
    ///
    /// Returns [`AmpsymError::BindingKey`] if `variable` is a coefficient of an undeclared family.
    pub fn bind<V: Into<Variable>, E: Into<Expr>>(
        &mut self,
        variable: V,
        value: E,
    ) -> AmpsymResult<&mut Self> {
        let variable = variable.into();
        if let Variable::Coefficient(c) = &variable {
            self.check_family(c.family())?;
        }
        self.values.insert(variable, value.into());
        Ok(self)
    }

    /// Bind a plain symbol. Symbols never need a declaration, so this cannot fail.
    pub fn bind_symbol<E: Into<Expr>>(&mut self, symbol: &Symbol, value: E) -> &mut Self {
        self.values
            .insert(Variable::Symbol(symbol.clone()), value.into());
        self
    }

    /// Bind the coefficient of family `name` with branch `sign` at `indices`.
    ///
    /// # Errors
    ///
    /// Returns [`AmpsymError::BindingKey`] if no such family was declared.
    pub fn bind_coefficient<E: Into<Expr>>(
        &mut self,
        name: &str,
        sign: Sign,
        indices: &[i64],
        value: E,
    ) -> AmpsymResult<&mut Self> {
        let family = CoefficientFamily::new(name, sign);
        self.check_family(&family)?;
        self.values
            .insert(Variable::Coefficient(family.at(indices)), value.into());
        Ok(self)
    }

    /// The value bound to `variable`, if any.
    pub fn get(&self, variable: &Variable) -> Option<&Expr> {
        self.values.get(variable)
    }

    /// The number of bound variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over bound variables and their values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Expr)> {
        self.values.iter()
    }

    /// Whether any coefficient is bound.
    pub fn has_coefficients(&self) -> bool {
        self.values
            .keys()
            .any(|v| matches!(v, Variable::Coefficient(_)))
    }

    /// The bindings whose values are plain numbers, in the form taken by [`Expr::evaluate`].
    pub fn numeric_values(&self) -> HashMap<Variable, Complex64> {
        self.values
            .iter()
            .filter_map(|(k, v)| v.as_number().map(|n| (k.clone(), n)))
            .collect()
    }
}

impl Expr {
    /// Replace every bound variable by its value.
    ///
    /// Replacement is structural: a coefficient only matches the coefficient with the identical
    /// family and index tuple, and a symbol only matches the symbol with the identical name,
    /// domain, and role. Parents of replaced leaves are rebuilt with the default normalization;
    /// nothing else is simplified. Variables which are absent from the tree are ignored.
    ///
    /// Coefficients inside a pool sum only get concrete indices once the sum is unfolded, so a
    /// pool sum is unfolded first whenever a coefficient is bound. Bindings of plain symbols
    /// keep pool sums compact.
    pub fn substitute(&self, binding: &Binding) -> Expr {
        if binding.is_empty() {
            return self.clone();
        }
        match self.node() {
            Node::Symbol(s) => binding
                .get(&Variable::Symbol(s.clone()))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Node::Coefficient { family, indices } => {
                let concrete: Option<Vec<i64>> = indices.iter().map(Index::value).collect();
                concrete
                    .and_then(|c| binding.get(&Variable::Coefficient(family.at(&c))))
                    .cloned()
                    .unwrap_or_else(|| self.clone())
            }
            Node::PoolSum { .. } if binding.has_coefficients() => {
                self.unfold_sums().substitute(binding)
            }
            _ => self.map_children(|c| c.substitute(binding)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Domain, Role};
    use approx::assert_relative_eq;

    fn families() -> Vec<CoefficientFamily> {
        vec![
            CoefficientFamily::new("A", Sign::Positive),
            CoefficientFamily::new("A", Sign::Negative),
        ]
    }

    #[test]
    fn test_undeclared_family_fails_at_construction() {
        let mut binding = Binding::new(&families());
        assert!(matches!(
            binding.bind_coefficient("B", Sign::Positive, &[0, 0], 1.0),
            Err(AmpsymError::BindingKey { family }) if family == "B+"
        ));
        let stray = CoefficientFamily::new("C", Sign::Negative).at(&[1, 0]);
        assert!(binding.bind(stray, 1.0).is_err());
        assert!(binding
            .bind_coefficient("A", Sign::Negative, &[0, 0], 1.0)
            .is_ok());
        assert_eq!(binding.len(), 1);
    }

    #[test]
    fn test_substitution_is_structural() {
        let declared = families();
        let plus = &declared[0];
        let a10 = Expr::from(plus.at(&[1, 0]));
        let a01 = Expr::from(plus.at(&[0, 1]));
        let x_real = Symbol::parameter("x");
        let x_complex = Symbol::new("x", Domain::Complex, Role::Parameter);
        let expr = &a10 + &a01 * Expr::from(&x_real) + Expr::from(&x_complex);

        let mut binding = Binding::new(&families());
        binding
            .bind_coefficient("A", Sign::Positive, &[1, 0], 2.0)
            .unwrap();
        binding.bind_symbol(&x_real, 3.0);
        let bound = expr.substitute(&binding);

        let names: Vec<String> = bound.free_variables().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["A+[0,1]", "x"]);
        assert!(bound.contains(&Variable::from(&x_complex)));
        assert!(!bound.contains(&Variable::from(&x_real)));
        // the number 2 is folded into the sum as a leading literal
        assert_eq!(bound.children()[0].as_number(), Some(Complex64::new(2.0, 0.0)));
    }

    #[test]
    fn test_absent_variables_are_noops() {
        let x = Symbol::parameter("x");
        let expr = Expr::from(&x).norm_sqr();
        let mut binding = Binding::new(&families());
        binding.bind_symbol(&Symbol::parameter("y"), 1.0);
        let bound = expr.substitute(&binding);
        assert!(bound.ptr_eq(&expr));
    }

    #[test]
    fn test_coefficients_inside_pool_sums_are_replaced() {
        let declared = families();
        let minus = &declared[1];
        let x = Symbol::parameter("x");
        let body = Expr::coefficient(minus, vec![Index::var("m"), Index::Value(0)]) * Expr::from(&x);
        let compact = Expr::pool_sum(body, vec![crate::IndexRange::new("m", &[-1, 0, 1])]);
        let target = minus.at(&[0, 0]);

        let mut binding = Binding::new(&declared);
        binding.bind(target.clone(), 5.0).unwrap();
        let bound = compact.substitute(&binding);
        assert!(!bound.contains(&Variable::from(target.clone())));
        assert!(!bound.expand().contains(&Variable::from(target.clone())));
        assert!(bound.contains(&Variable::from(minus.at(&[1, 0]))));
        assert_eq!(
            bound.free_variables(),
            compact.expand().substitute(&binding).free_variables()
        );

        let mut symbols_only = Binding::new(&declared);
        symbols_only.bind_symbol(&x, 2.0);
        assert_eq!(
            compact
                .substitute(&symbols_only)
                .count(crate::NodeKind::PoolSum),
            1
        );
    }

    #[test]
    fn test_bind_all_then_evaluate() {
        let x = Symbol::parameter("x");
        let coefficient = families()[1].at(&[0, 0]);
        let expr = (Expr::from(&coefficient) * Expr::from(&x)).norm_sqr();
        let mut binding = Binding::new(&families());
        binding
            .bind(coefficient.clone(), Complex64::new(1.0, 2.0))
            .unwrap();
        binding.bind_symbol(&x, 2.0);
        let bound = expr.substitute(&binding);
        let value = bound.as_number().unwrap();
        assert_relative_eq!(value.re, 20.0, epsilon = 1e-12);
        let direct = expr.evaluate(&binding.numeric_values()).unwrap();
        assert_relative_eq!(direct.re, value.re, epsilon = 1e-12);
    }
}
