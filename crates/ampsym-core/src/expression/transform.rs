use std::collections::HashMap;

use num::complex::Complex64;

use super::{Expr, Index, IndexRange, Node, NodeKind};

impl Expr {
    /// Expand every deferred construct of the tree.
    ///
    /// Pool sums are unfolded into plain sums over the cartesian product of their ranges (the
    /// first range varies slowest), each $`Z_\ell^m`$ is replaced by
    /// $`Y_\ell^m(\theta, \phi) e^{-\imath\Phi}`$, and harmonics with $`|m| > \ell`$ vanish. The
    /// result contains no [`Node::PoolSum`] or [`Node::Zlm`], so expanding it again returns it
    /// unchanged.
    pub fn expand(&self) -> Expr {
        let expr = self.map_children(|c| c.expand());
        match expr.node() {
            Node::Zlm {
                l,
                m,
                theta,
                phi,
                big_phi,
            } => {
                Expr::ylm(l.clone(), m.clone(), theta.clone(), phi.clone())
                    * Expr::product(vec![Expr::number(-Complex64::I), big_phi.clone()]).exp()
            }
            Node::PoolSum { body, ranges } => unfold(body, ranges),
            _ => expr,
        }
    }

    /// Unfold pool sums only, leaving phase-rotated harmonics in their compact form.
    pub fn unfold_sums(&self) -> Expr {
        let expr = self.map_children(|c| c.unfold_sums());
        match expr.node() {
            Node::PoolSum { body, ranges } => unfold(body, ranges),
            _ => expr,
        }
    }

    /// Rewrite every product containing $`Y_\ell^m(\theta, \phi)`$ and $`e^{-\imath\Phi}`$ back
    /// into $`Z_\ell^m(\theta, \phi, \Phi)`$.
    ///
    /// This only changes how the tree reads: expanding the collapsed tree gives back the
    /// expanded one.
    pub fn collapse(&self) -> Expr {
        let mut expr = self.map_children(|c| c.collapse());
        while let Node::Mul(factors) = expr.node() {
            match collapse_product(factors) {
                Some(collapsed) => expr = collapsed,
                None => break,
            }
        }
        expr
    }

    /// Replace pool-sum index variables by concrete values. Index variables of nested pool sums
    /// shadow the outer ones.
    pub(crate) fn bind_indices(&self, env: &HashMap<String, i64>) -> Expr {
        if env.is_empty() {
            return self.clone();
        }
        let bind = |index: &Index| match index {
            Index::Var(name) => env.get(name).map(|v| Index::Value(*v)),
            Index::Value(_) => None,
        };
        match self.node() {
            Node::Coefficient { family, indices } => {
                let bound: Vec<Option<Index>> = indices.iter().map(bind).collect();
                if bound.iter().all(Option::is_none) {
                    return self.clone();
                }
                let indices = indices
                    .iter()
                    .zip(bound)
                    .map(|(old, new)| new.unwrap_or_else(|| old.clone()))
                    .collect();
                Expr::coefficient(family, indices)
            }
            Node::Ylm { l, m, theta, phi } => {
                let (new_l, new_m) = (bind(l), bind(m));
                let (new_theta, new_phi) = (theta.bind_indices(env), phi.bind_indices(env));
                if new_l.is_none()
                    && new_m.is_none()
                    && new_theta.ptr_eq(theta)
                    && new_phi.ptr_eq(phi)
                {
                    return self.clone();
                }
                Expr::ylm(
                    new_l.unwrap_or_else(|| l.clone()),
                    new_m.unwrap_or_else(|| m.clone()),
                    new_theta,
                    new_phi,
                )
            }
            Node::Zlm {
                l,
                m,
                theta,
                phi,
                big_phi,
            } => {
                let (new_l, new_m) = (bind(l), bind(m));
                let new_theta = theta.bind_indices(env);
                let new_phi = phi.bind_indices(env);
                let new_big_phi = big_phi.bind_indices(env);
                if new_l.is_none()
                    && new_m.is_none()
                    && new_theta.ptr_eq(theta)
                    && new_phi.ptr_eq(phi)
                    && new_big_phi.ptr_eq(big_phi)
                {
                    return self.clone();
                }
                Expr::zlm(
                    new_l.unwrap_or_else(|| l.clone()),
                    new_m.unwrap_or_else(|| m.clone()),
                    new_theta,
                    new_phi,
                    new_big_phi,
                )
            }
            Node::PoolSum { body, ranges } => {
                let mut inner = env.clone();
                for range in ranges {
                    inner.remove(range.name());
                }
                let new_body = body.bind_indices(&inner);
                if new_body.ptr_eq(body) {
                    self.clone()
                } else {
                    Expr::pool_sum(new_body, ranges.clone())
                }
            }
            _ => self.map_children(|c| c.bind_indices(env)),
        }
    }
}

fn unfold(body: &Expr, ranges: &[IndexRange]) -> Expr {
    if ranges.iter().any(|r| r.values().is_empty()) {
        return Expr::zero();
    }
    let mut terms = Vec::new();
    let mut cursor = vec![0usize; ranges.len()];
    loop {
        let env: HashMap<String, i64> = ranges
            .iter()
            .zip(&cursor)
            .map(|(range, &i)| (range.name().to_string(), range.values()[i]))
            .collect();
        terms.push(body.bind_indices(&env));
        let mut k = ranges.len();
        loop {
            if k == 0 {
                return Expr::sum(terms);
            }
            k -= 1;
            cursor[k] += 1;
            if cursor[k] < ranges[k].values().len() {
                break;
            }
            cursor[k] = 0;
        }
    }
}

/// The angle $`\Phi`$ of a rotation factor $`e^{-\imath\Phi}`$, given the exponent.
fn rotation_angle(exponent: &Expr) -> Option<Expr> {
    match exponent.node() {
        Node::Mul(factors) => {
            let c = factors.first()?.as_number()?;
            if c.re != 0.0 {
                return None;
            }
            let mut rest = vec![Expr::number(c * Complex64::I)];
            rest.extend(factors[1..].iter().cloned());
            Some(Expr::product(rest))
        }
        _ => None,
    }
}

fn collapse_product(factors: &[Expr]) -> Option<Expr> {
    let harmonic = factors.iter().position(|f| f.kind() == NodeKind::Ylm)?;
    let (rotation, big_phi) = factors.iter().enumerate().find_map(|(i, f)| match f.node() {
        Node::Exp(exponent) => rotation_angle(exponent).map(|angle| (i, angle)),
        _ => None,
    })?;
    let Node::Ylm { l, m, theta, phi } = factors[harmonic].node() else {
        return None;
    };
    let zlm = Expr::zlm(l.clone(), m.clone(), theta.clone(), phi.clone(), big_phi);
    let rest = factors
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != rotation)
        .map(|(i, f)| if i == harmonic { zlm.clone() } else { f.clone() })
        .collect();
    Some(Expr::product(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoefficientFamily, Sign, Symbol};

    fn angles() -> (Expr, Expr, Expr) {
        (
            Expr::from(Symbol::coordinate("theta")),
            Expr::from(Symbol::coordinate("phi")),
            Expr::from(Symbol::parameter("Phi")),
        )
    }

    #[test]
    fn test_pool_sum_unfolds_in_declaration_order() {
        let family = CoefficientFamily::new("A", Sign::Positive);
        let body = Expr::coefficient(&family, vec![Index::var("m"), Index::var("k")]);
        let sum = Expr::pool_sum(
            body,
            vec![IndexRange::new("m", &[-1, 1]), IndexRange::new("k", &[0, 1])],
        );
        let names: Vec<String> = sum
            .expand()
            .free_variables()
            .iter()
            .map(|v| v.name())
            .collect();
        assert_eq!(
            names,
            vec!["A+[-1,0]", "A+[-1,1]", "A+[1,0]", "A+[1,1]"]
        );
    }

    #[test]
    fn test_nested_pool_sums_shadow_indices() {
        let family = CoefficientFamily::new("A", Sign::Negative);
        let inner = Expr::pool_sum(
            Expr::coefficient(&family, vec![Index::var("m"), Index::Value(0)]),
            vec![IndexRange::new("m", &[5])],
        );
        let outer = Expr::pool_sum(inner, vec![IndexRange::new("m", &[1, 2])]);
        let names: Vec<String> = outer
            .expand()
            .free_variables()
            .iter()
            .map(|v| v.name())
            .collect();
        assert_eq!(names, vec!["A-[5,0]"]);
    }

    #[test]
    fn test_empty_range_unfolds_to_zero() {
        let (theta, _, _) = angles();
        let sum = Expr::pool_sum(theta, vec![IndexRange::new("m", &[])]);
        assert_eq!(sum.expand(), Expr::zero());
    }

    #[test]
    fn test_zlm_expansion_and_collapse() {
        let (theta, phi, big_phi) = angles();
        let z = Expr::zlm(2.into(), (-1).into(), theta, phi, big_phi);
        let expanded = z.expand();
        assert_eq!(expanded.count(NodeKind::Zlm), 0);
        assert_eq!(expanded.count(NodeKind::Ylm), 1);
        assert_eq!(expanded.count(NodeKind::Exp), 1);
        let collapsed = expanded.collapse();
        assert_eq!(collapsed, z);
        assert_eq!(collapsed.expand(), expanded);
    }

    #[test]
    fn test_expand_is_idempotent() {
        let (theta, phi, big_phi) = angles();
        let family = CoefficientFamily::new("A", Sign::Positive);
        let body = Expr::coefficient(&family, vec![Index::var("m"), Index::Value(0)])
            * Expr::zlm(Index::var("l"), Index::var("m"), theta, phi, big_phi).re();
        let sum = Expr::pool_sum(
            body,
            vec![
                IndexRange::inclusive("l", 0, 2),
                IndexRange::inclusive("m", -2, 2),
            ],
        )
        .norm_sqr();
        let once = sum.expand();
        let twice = once.expand();
        assert_eq!(once, twice);
        assert!(once.ptr_eq(&twice));
        // 9 of the 15 (l, m) pairs have |m| <= l
        assert_eq!(once.count(NodeKind::Ylm), 9);
        assert_eq!(once.expand().collapse().expand(), once);
    }

    #[test]
    fn test_unfold_sums_keeps_zlm() {
        let (theta, phi, big_phi) = angles();
        let sum = Expr::pool_sum(
            Expr::zlm(Index::var("l"), 0.into(), theta, phi, big_phi),
            vec![IndexRange::inclusive("l", 0, 1)],
        );
        let unfolded = sum.unfold_sums();
        assert_eq!(unfolded.count(NodeKind::Zlm), 2);
        assert_eq!(unfolded.count(NodeKind::PoolSum), 0);
    }
}
