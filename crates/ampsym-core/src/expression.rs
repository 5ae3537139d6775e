use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    sync::Arc,
};

use auto_ops::*;
use indexmap::IndexSet;
use num::complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::{
    format::Printer,
    symbols::{Coefficient, CoefficientFamily, Symbol, Variable},
    utils::functions::spherical_harmonic,
    AmpsymError, AmpsymResult,
};

/// Rewrites of the expression tree: pool-sum unfolding, expansion, and collapsing.
mod transform;

/// A numeric literal stored in an expression tree.
///
/// Literals compare and hash by their bit patterns (with `-0.0` identified with `0.0`), which
/// keeps [`Expr`] usable as a map key.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Literal(pub Complex64);

impl Literal {
    fn bits(&self) -> (u64, u64) {
        ((self.0.re + 0.0).to_bits(), (self.0.im + 0.0).to_bits())
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// An integer index inside a pool sum: either a concrete value or a named index variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Index {
    /// A concrete integer.
    Value(i64),
    /// An index variable bound by an enclosing [`Node::PoolSum`].
    Var(String),
}

impl Index {
    /// Shorthand for an index variable.
    pub fn var(name: &str) -> Self {
        Index::Var(name.to_string())
    }
    /// The concrete value, if there is one.
    pub fn value(&self) -> Option<i64> {
        match self {
            Index::Value(v) => Some(*v),
            Index::Var(_) => None,
        }
    }
    fn resolve(&self) -> AmpsymResult<i64> {
        match self {
            Index::Value(v) => Ok(*v),
            Index::Var(name) => Err(AmpsymError::UnboundIndex { name: name.clone() }),
        }
    }
}

impl From<i64> for Index {
    fn from(value: i64) -> Self {
        Index::Value(value)
    }
}

impl From<&str> for Index {
    fn from(value: &str) -> Self {
        Index::var(value)
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Index::Value(v) => write!(f, "{v}"),
            Index::Var(name) => write!(f, "{name}"),
        }
    }
}

/// One named index range of a pool sum.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRange {
    name: String,
    values: Vec<i64>,
}

impl IndexRange {
    /// A range over an explicit list of values.
    pub fn new(name: &str, values: &[i64]) -> Self {
        Self {
            name: name.to_string(),
            values: values.to_vec(),
        }
    }
    /// A range over `lo..=hi`.
    pub fn inclusive(name: &str, lo: i64, hi: i64) -> Self {
        Self {
            name: name.to_string(),
            values: (lo..=hi).collect(),
        }
    }
    /// The name of the index variable.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The values the index runs over, in order.
    pub fn values(&self) -> &[i64] {
        &self.values
    }
}

/// The variants of the expression tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Node {
    /// A numeric literal.
    Number(Literal),
    /// A plain symbol.
    Symbol(Symbol),
    /// A member of a coefficient family, possibly at symbolic indices.
    Coefficient {
        /// The family of the coefficient.
        family: CoefficientFamily,
        /// The indices, concrete or bound by a pool sum.
        indices: Vec<Index>,
    },
    /// The sum of any number of terms.
    Add(Vec<Expr>),
    /// The product of any number of factors.
    Mul(Vec<Expr>),
    /// A base raised to an exponent.
    Pow(Expr, Expr),
    /// The absolute value.
    Abs(Expr),
    /// The real part.
    Re(Expr),
    /// The imaginary part.
    Im(Expr),
    /// The complex conjugate.
    Conj(Expr),
    /// The exponential function.
    Exp(Expr),
    /// The spherical harmonic $`Y_\ell^m(\theta, \phi)`$ of the polar angle $`\theta`$.
    Ylm {
        /// Angular momentum.
        l: Index,
        /// Azimuthal index.
        m: Index,
        /// Polar angle.
        theta: Expr,
        /// Azimuthal angle.
        phi: Expr,
    },
    /// The phase-rotated spherical harmonic
    /// $`Z_\ell^m(\theta, \phi, \Phi) = Y_\ell^m(\theta, \phi) e^{-\imath\Phi}`$, kept compact
    /// until [`Expr::expand`] is called.
    Zlm {
        /// Angular momentum.
        l: Index,
        /// Azimuthal index.
        m: Index,
        /// Polar angle.
        theta: Expr,
        /// Azimuthal angle.
        phi: Expr,
        /// Production-plane angle.
        big_phi: Expr,
    },
    /// A sum of `body` over the cartesian product of several independent index ranges.
    PoolSum {
        /// The summand.
        body: Expr,
        /// The ranges, outermost first.
        ranges: Vec<IndexRange>,
    },
}

/// A tag for each [`Node`] variant, used to key formatters and count nodes.
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Number,
    Symbol,
    Coefficient,
    Add,
    Mul,
    Pow,
    Abs,
    Re,
    Im,
    Conj,
    Exp,
    Ylm,
    Zlm,
    PoolSum,
}

/// An immutable handle to an expression tree.
///
/// Every transformation returns a new [`Expr`]; unchanged subtrees are shared between the old and
/// new trees rather than copied.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expr(Arc<Node>);

impl Expr {
    fn from_node(node: Node) -> Self {
        Self(Arc::new(node))
    }

    /// The root node of the tree.
    pub fn node(&self) -> &Node {
        &self.0
    }

    /// The [`NodeKind`] of the root node.
    pub fn kind(&self) -> NodeKind {
        match self.node() {
            Node::Number(_) => NodeKind::Number,
            Node::Symbol(_) => NodeKind::Symbol,
            Node::Coefficient { .. } => NodeKind::Coefficient,
            Node::Add(_) => NodeKind::Add,
            Node::Mul(_) => NodeKind::Mul,
            Node::Pow(_, _) => NodeKind::Pow,
            Node::Abs(_) => NodeKind::Abs,
            Node::Re(_) => NodeKind::Re,
            Node::Im(_) => NodeKind::Im,
            Node::Conj(_) => NodeKind::Conj,
            Node::Exp(_) => NodeKind::Exp,
            Node::Ylm { .. } => NodeKind::Ylm,
            Node::Zlm { .. } => NodeKind::Zlm,
            Node::PoolSum { .. } => NodeKind::PoolSum,
        }
    }

    /// Whether two handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A numeric literal.
    pub fn number<T: Into<Complex64>>(value: T) -> Self {
        Self::from_node(Node::Number(Literal(value.into())))
    }
    /// The additive identity.
    pub fn zero() -> Self {
        Self::number(Complex64::ZERO)
    }
    /// The multiplicative identity.
    pub fn one() -> Self {
        Self::number(Complex64::ONE)
    }
    /// The imaginary unit.
    pub fn i() -> Self {
        Self::number(Complex64::I)
    }

    /// The literal value of this node, if it is a number.
    pub fn as_number(&self) -> Option<Complex64> {
        match self.node() {
            Node::Number(Literal(v)) => Some(*v),
            _ => None,
        }
    }

    /// A coefficient of the given family at (possibly symbolic) indices.
    pub fn coefficient(family: &CoefficientFamily, indices: Vec<Index>) -> Self {
        Self::from_node(Node::Coefficient {
            family: family.clone(),
            indices,
        })
    }

    /// The sum of `terms`, flattening nested sums and folding numeric literals.
    pub fn sum(terms: Vec<Expr>) -> Self {
        let mut literal = Complex64::ZERO;
        let mut rest = Vec::with_capacity(terms.len());
        for term in terms {
            match term.node() {
                Node::Number(Literal(v)) => literal += v,
                Node::Add(inner) => {
                    for t in inner {
                        match t.as_number() {
                            Some(v) => literal += v,
                            None => rest.push(t.clone()),
                        }
                    }
                }
                _ => rest.push(term),
            }
        }
        if literal != Complex64::ZERO {
            rest.insert(0, Expr::number(literal));
        }
        match rest.len() {
            0 => Expr::zero(),
            1 => rest.remove(0),
            _ => Self::from_node(Node::Add(rest)),
        }
    }

    /// The product of `factors`, flattening nested products and folding numeric literals. A
    /// literal zero factor collapses the whole product to zero.
    pub fn product(factors: Vec<Expr>) -> Self {
        let mut literal = Complex64::ONE;
        let mut rest = Vec::with_capacity(factors.len());
        for factor in factors {
            match factor.node() {
                Node::Number(Literal(v)) => literal *= v,
                Node::Mul(inner) => {
                    for f in inner {
                        match f.as_number() {
                            Some(v) => literal *= v,
                            None => rest.push(f.clone()),
                        }
                    }
                }
                _ => rest.push(factor),
            }
        }
        if literal == Complex64::ZERO {
            return Expr::zero();
        }
        if literal != Complex64::ONE || rest.is_empty() {
            rest.insert(0, Expr::number(literal));
        }
        match rest.len() {
            1 => rest.remove(0),
            _ => Self::from_node(Node::Mul(rest)),
        }
    }

    /// `base` raised to `exponent`.
    pub fn pow(base: Expr, exponent: Expr) -> Self {
        match (base.as_number(), exponent.as_number()) {
            (Some(b), Some(e)) => Expr::number(powc(b, e)),
            (_, Some(e)) if e == Complex64::ONE => base,
            (_, Some(e)) if e == Complex64::ZERO => Expr::one(),
            _ => Self::from_node(Node::Pow(base, exponent)),
        }
    }

    /// The absolute value.
    pub fn abs(&self) -> Self {
        match self.as_number() {
            Some(v) => Expr::number(v.norm()),
            None => Self::from_node(Node::Abs(self.clone())),
        }
    }
    /// The squared magnitude $`|x|^2`$, represented as a power of an absolute value.
    pub fn norm_sqr(&self) -> Self {
        Expr::pow(self.abs(), Expr::number(2.0))
    }
    /// The real part.
    pub fn re(&self) -> Self {
        match self.as_number() {
            Some(v) => Expr::number(v.re),
            None => Self::from_node(Node::Re(self.clone())),
        }
    }
    /// The imaginary part.
    pub fn im(&self) -> Self {
        match self.as_number() {
            Some(v) => Expr::number(v.im),
            None => Self::from_node(Node::Im(self.clone())),
        }
    }
    /// The complex conjugate.
    pub fn conj(&self) -> Self {
        match self.as_number() {
            Some(v) => Expr::number(v.conj()),
            None => Self::from_node(Node::Conj(self.clone())),
        }
    }
    /// The exponential function.
    pub fn exp(&self) -> Self {
        match self.as_number() {
            Some(v) => Expr::number(v.exp()),
            None => Self::from_node(Node::Exp(self.clone())),
        }
    }

    /// The spherical harmonic $`Y_\ell^m(\theta, \phi)`$. Concrete indices with $`|m| > \ell`$
    /// give zero.
    pub fn ylm(l: Index, m: Index, theta: Expr, phi: Expr) -> Self {
        if vanishing_harmonic(&l, &m) {
            return Expr::zero();
        }
        Self::from_node(Node::Ylm { l, m, theta, phi })
    }

    /// The phase-rotated spherical harmonic $`Z_\ell^m(\theta, \phi, \Phi)`$. Concrete indices
    /// with $`|m| > \ell`$ give zero.
    pub fn zlm(l: Index, m: Index, theta: Expr, phi: Expr, big_phi: Expr) -> Self {
        if vanishing_harmonic(&l, &m) {
            return Expr::zero();
        }
        Self::from_node(Node::Zlm {
            l,
            m,
            theta,
            phi,
            big_phi,
        })
    }

    /// A pool sum of `body` over all combinations of `ranges`.
    pub fn pool_sum(body: Expr, ranges: Vec<IndexRange>) -> Self {
        if ranges.is_empty() {
            return body;
        }
        Self::from_node(Node::PoolSum { body, ranges })
    }

    /// The direct children of this node, in order.
    pub fn children(&self) -> Vec<&Expr> {
        match self.node() {
            Node::Number(_) | Node::Symbol(_) | Node::Coefficient { .. } => Vec::new(),
            Node::Add(terms) | Node::Mul(terms) => terms.iter().collect(),
            Node::Pow(a, b) => vec![a, b],
            Node::Abs(a) | Node::Re(a) | Node::Im(a) | Node::Conj(a) | Node::Exp(a) => vec![a],
            Node::Ylm { theta, phi, .. } => vec![theta, phi],
            Node::Zlm {
                theta,
                phi,
                big_phi,
                ..
            } => vec![theta, phi, big_phi],
            Node::PoolSum { body, .. } => vec![body],
        }
    }

    /// Rebuild this node with `f` applied to each child. If no child changes, the original
    /// handle is returned so the subtree stays shared.
    pub fn map_children<F: FnMut(&Expr) -> Expr>(&self, mut f: F) -> Expr {
        fn same(old: &[&Expr], new: &[Expr]) -> bool {
            old.iter().zip(new).all(|(a, b)| a.ptr_eq(b))
        }
        let old = self.children();
        if old.is_empty() {
            return self.clone();
        }
        let new: Vec<Expr> = old.iter().map(|c| f(c)).collect();
        if same(&old, &new) {
            return self.clone();
        }
        let mut new = new.into_iter();
        let mut next = || new.next().unwrap_or_else(Expr::zero);
        match self.node() {
            Node::Add(_) => Expr::sum(new_collect(&mut next, old.len())),
            Node::Mul(_) => Expr::product(new_collect(&mut next, old.len())),
            Node::Pow(_, _) => {
                let base = next();
                Expr::pow(base, next())
            }
            Node::Abs(_) => next().abs(),
            Node::Re(_) => next().re(),
            Node::Im(_) => next().im(),
            Node::Conj(_) => next().conj(),
            Node::Exp(_) => next().exp(),
            Node::Ylm { l, m, .. } => {
                let theta = next();
                Expr::ylm(l.clone(), m.clone(), theta, next())
            }
            Node::Zlm { l, m, .. } => {
                let theta = next();
                let phi = next();
                Expr::zlm(l.clone(), m.clone(), theta, phi, next())
            }
            Node::PoolSum { ranges, .. } => Expr::pool_sum(next(), ranges.clone()),
            Node::Number(_) | Node::Symbol(_) | Node::Coefficient { .. } => self.clone(),
        }
    }

    /// All variables occurring free in the tree, in order of first appearance. Coefficients whose
    /// indices are bound by a pool sum are not free; the symbols inside pool-sum bodies are.
    pub fn free_variables(&self) -> IndexSet<Variable> {
        fn visit(expr: &Expr, out: &mut IndexSet<Variable>) {
            match expr.node() {
                Node::Symbol(s) => {
                    out.insert(Variable::Symbol(s.clone()));
                }
                Node::Coefficient { family, indices } => {
                    let concrete: Option<Vec<i64>> = indices.iter().map(Index::value).collect();
                    if let Some(concrete) = concrete {
                        out.insert(Variable::Coefficient(family.at(&concrete)));
                    }
                }
                _ => {
                    for child in expr.children() {
                        visit(child, out);
                    }
                }
            }
        }
        let mut out = IndexSet::new();
        visit(self, &mut out);
        out
    }

    /// The free variables sorted by [`Variable::name`]. This is the default argument order for
    /// [`compile`](crate::compile::compile).
    pub fn sorted_free_variables(&self) -> Vec<Variable> {
        let mut vars: Vec<Variable> = self.free_variables().into_iter().collect();
        vars.sort_by_key(|v| v.name());
        vars
    }

    /// Whether `variable` occurs free in the tree.
    pub fn contains(&self, variable: &Variable) -> bool {
        self.free_variables().contains(variable)
    }

    /// The number of nodes of the given kind.
    pub fn count(&self, kind: NodeKind) -> usize {
        let here = usize::from(self.kind() == kind);
        here + self
            .children()
            .into_iter()
            .map(|c| c.count(kind))
            .sum::<usize>()
    }

    /// The number of squared-magnitude subtrees, $`|x|^2`$.
    pub fn count_norm_sqr(&self) -> usize {
        let here = match self.node() {
            Node::Pow(base, exponent) => usize::from(
                base.kind() == NodeKind::Abs && exponent.as_number() == Some(Complex64::new(2.0, 0.0)),
            ),
            _ => 0,
        };
        here + self
            .children()
            .into_iter()
            .map(|c| c.count_norm_sqr())
            .sum::<usize>()
    }

    /// The total number of nodes in the tree (shared subtrees counted once per occurrence).
    pub fn size(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(|c| c.size())
            .sum::<usize>()
    }

    /// Evaluate the tree directly for a complete assignment of its free variables.
    ///
    /// Deferred constructs are expanded first. This is the reference semantics which compiled
    /// [`NumericFunction`](crate::compile::NumericFunction)s reproduce.
    ///
    /// # Errors
    ///
    /// Returns [`AmpsymError::UnboundSymbol`] if a free variable has no value.
    pub fn evaluate(&self, values: &HashMap<Variable, Complex64>) -> AmpsymResult<Complex64> {
        self.expand().evaluate_expanded(values)
    }

    fn evaluate_expanded(&self, values: &HashMap<Variable, Complex64>) -> AmpsymResult<Complex64> {
        let lookup = |var: Variable| -> AmpsymResult<Complex64> {
            values
                .get(&var)
                .copied()
                .ok_or_else(|| AmpsymError::UnboundSymbol { name: var.name() })
        };
        Ok(match self.node() {
            Node::Number(Literal(v)) => *v,
            Node::Symbol(s) => lookup(Variable::Symbol(s.clone()))?,
            Node::Coefficient { family, indices } => {
                let concrete = indices
                    .iter()
                    .map(Index::resolve)
                    .collect::<AmpsymResult<Vec<i64>>>()?;
                lookup(Variable::Coefficient(family.at(&concrete)))?
            }
            Node::Add(terms) => {
                let mut acc = Complex64::ZERO;
                for t in terms {
                    acc += t.evaluate_expanded(values)?;
                }
                acc
            }
            Node::Mul(factors) => {
                let mut acc = Complex64::ONE;
                for f in factors {
                    acc *= f.evaluate_expanded(values)?;
                }
                acc
            }
            Node::Pow(b, e) => powc(b.evaluate_expanded(values)?, e.evaluate_expanded(values)?),
            Node::Abs(a) => Complex64::new(a.evaluate_expanded(values)?.norm(), 0.0),
            Node::Re(a) => Complex64::new(a.evaluate_expanded(values)?.re, 0.0),
            Node::Im(a) => Complex64::new(a.evaluate_expanded(values)?.im, 0.0),
            Node::Conj(a) => a.evaluate_expanded(values)?.conj(),
            Node::Exp(a) => a.evaluate_expanded(values)?.exp(),
            Node::Ylm { l, m, theta, phi } => ylm_value(
                l.resolve()?,
                m.resolve()?,
                theta.evaluate_expanded(values)?,
                phi.evaluate_expanded(values)?,
            ),
            Node::Zlm {
                l,
                m,
                theta,
                phi,
                big_phi,
            } => {
                ylm_value(
                    l.resolve()?,
                    m.resolve()?,
                    theta.evaluate_expanded(values)?,
                    phi.evaluate_expanded(values)?,
                ) * (-Complex64::I * big_phi.evaluate_expanded(values)?).exp()
            }
            Node::PoolSum { .. } => self.expand().evaluate_expanded(values)?,
        })
    }

    /// Credit to Daniel Janus: <https://blog.danieljanus.pl/2023/07/20/iterating-trees/>
    fn write_tree(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        parent_prefix: &str,
        immediate_prefix: &str,
        parent_suffix: &str,
    ) -> std::fmt::Result {
        let display_string = match self.node() {
            Node::Number(Literal(v)) => format_number(*v),
            Node::Symbol(s) => s.to_string(),
            Node::Coefficient { family, indices } => format!(
                "{}[{}]",
                family,
                indices
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Node::Add(_) => "+".to_string(),
            Node::Mul(_) => "×".to_string(),
            Node::Pow(_, _) => "^".to_string(),
            Node::Abs(_) => "Abs".to_string(),
            Node::Re(_) => "Re".to_string(),
            Node::Im(_) => "Im".to_string(),
            Node::Conj(_) => "*".to_string(),
            Node::Exp(_) => "Exp".to_string(),
            Node::Ylm { l, m, .. } => format!("Y({l},{m})"),
            Node::Zlm { l, m, .. } => format!("Z({l},{m})"),
            Node::PoolSum { ranges, .. } => format!(
                "Σ[{}]",
                ranges
                    .iter()
                    .map(|r| r.name().to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        };
        writeln!(f, "{}{}{}", parent_prefix, immediate_prefix, display_string)?;
        let children = self.children();
        let mut it = children.iter().peekable();
        let child_prefix = format!("{}{}", parent_prefix, parent_suffix);
        while let Some(child) = it.next() {
            match it.peek() {
                Some(_) => child.write_tree(f, &child_prefix, "├─ ", "│  "),
                None => child.write_tree(f, &child_prefix, "└─ ", "   "),
            }?;
        }
        Ok(())
    }
}

fn new_collect(next: &mut impl FnMut() -> Expr, n: usize) -> Vec<Expr> {
    (0..n).map(|_| next()).collect()
}

fn vanishing_harmonic(l: &Index, m: &Index) -> bool {
    match (l.value(), m.value()) {
        (Some(l), Some(m)) => l < 0 || m.abs() > l,
        _ => false,
    }
}

/// Complex power which stays exact for integer exponents.
pub(crate) fn powc(base: Complex64, exponent: Complex64) -> Complex64 {
    if exponent.im == 0.0 && exponent.re.fract() == 0.0 && exponent.re.abs() <= i32::MAX as f64 {
        base.powi(exponent.re as i32)
    } else {
        base.powc(exponent)
    }
}

/// $`Y_\ell^m`$ at a (real part of the) polar angle and azimuthal angle.
pub(crate) fn ylm_value(l: i64, m: i64, theta: Complex64, phi: Complex64) -> Complex64 {
    if l < 0 || m.abs() > l {
        return Complex64::ZERO;
    }
    spherical_harmonic(l as usize, m as isize, theta.re.cos(), phi.re)
}

pub(crate) fn format_number(v: Complex64) -> String {
    if v.im == 0.0 {
        format!("{}", v.re)
    } else if v.re == 0.0 {
        if v.im == 1.0 {
            "i".to_string()
        } else if v.im == -1.0 {
            "-i".to_string()
        } else {
            format!("{}i", v.im)
        }
    } else {
        format!("({}{:+}i)", v.re, v.im)
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_tree(f, "", "", "")
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Printer::text().render(self))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::number(value)
    }
}

impl From<Complex64> for Expr {
    fn from(value: Complex64) -> Self {
        Expr::number(value)
    }
}

impl From<Symbol> for Expr {
    fn from(value: Symbol) -> Self {
        Expr::from_node(Node::Symbol(value))
    }
}

impl From<&Symbol> for Expr {
    fn from(value: &Symbol) -> Self {
        Expr::from_node(Node::Symbol(value.clone()))
    }
}

impl From<Coefficient> for Expr {
    fn from(value: Coefficient) -> Self {
        Expr::coefficient(
            value.family(),
            value.indices().iter().map(|i| Index::Value(*i)).collect(),
        )
    }
}

impl From<&Coefficient> for Expr {
    fn from(value: &Coefficient) -> Self {
        Expr::from(value.clone())
    }
}

impl From<Variable> for Expr {
    fn from(value: Variable) -> Self {
        match value {
            Variable::Symbol(s) => Expr::from(s),
            Variable::Coefficient(c) => Expr::from(c),
        }
    }
}

impl From<&Variable> for Expr {
    fn from(value: &Variable) -> Self {
        Expr::from(value.clone())
    }
}

#[rustfmt::skip]
impl_op_ex!(+ |a: &Expr, b: &Expr| -> Expr {
    Expr::sum(vec![a.clone(), b.clone()])
});
#[rustfmt::skip]
impl_op_ex!(- |a: &Expr, b: &Expr| -> Expr {
    Expr::sum(vec![a.clone(), -b])
});
#[rustfmt::skip]
impl_op_ex!(* |a: &Expr, b: &Expr| -> Expr {
    Expr::product(vec![a.clone(), b.clone()])
});
#[rustfmt::skip]
impl_op_ex!(/ |a: &Expr, b: &Expr| -> Expr {
    Expr::product(vec![a.clone(), Expr::pow(b.clone(), Expr::number(-1.0))])
});
#[rustfmt::skip]
impl_op_ex!(- |a: &Expr| -> Expr {
    Expr::product(vec![Expr::number(-1.0), a.clone()])
});
#[rustfmt::skip]
impl_op_ex_commutative!(+ |a: &Expr, b: &f64| -> Expr {
    Expr::sum(vec![a.clone(), Expr::number(*b)])
});
#[rustfmt::skip]
impl_op_ex_commutative!(* |a: &Expr, b: &f64| -> Expr {
    Expr::product(vec![Expr::number(*b), a.clone()])
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{symbols::Role, Domain, Sign};
    use approx::assert_relative_eq;

    fn x() -> Symbol {
        Symbol::parameter("x")
    }

    #[test]
    fn test_normalization_flattens_and_folds() {
        let x = Expr::from(x());
        let e = (&x + 1.0) + (&x + 2.0);
        match e.node() {
            Node::Add(terms) => {
                assert_eq!(terms.len(), 3);
                assert_eq!(terms[0].as_number(), Some(Complex64::new(3.0, 0.0)));
            }
            _ => panic!("expected a sum"),
        }
        assert_eq!(Expr::zero() * &x, Expr::zero());
        assert_eq!(Expr::one() * &x, x);
        assert_eq!(&x + Expr::zero(), x);
        assert_eq!(Expr::pow(x.clone(), Expr::one()), x);
    }

    #[test]
    fn test_free_variables() {
        let family = CoefficientFamily::new("A", Sign::Positive);
        let p = Expr::from(Symbol::parameter("P"));
        let theta = Expr::from(Symbol::coordinate("theta"));
        let bound = Expr::coefficient(&family, vec![Index::var("m"), Index::Value(0)]);
        let concrete = Expr::from(family.at(&[1, 0]));
        let summed = Expr::pool_sum(&bound * &theta, vec![IndexRange::inclusive("m", -1, 1)]);
        let expr = &summed * &p + concrete;
        let names: Vec<String> = expr.free_variables().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["theta", "P", "A+[1,0]"]);
        let sorted: Vec<String> = expr
            .sorted_free_variables()
            .iter()
            .map(|v| v.name())
            .collect();
        assert_eq!(sorted, vec!["A+[1,0]", "P", "theta"]);
    }

    #[test]
    fn test_direct_evaluation() {
        let x_sym = x();
        let z = Symbol::new("z", Domain::Complex, Role::Parameter);
        let expr = (Expr::from(&x_sym) * Expr::from(&z)).norm_sqr() + Expr::from(&z).re();
        let mut values = HashMap::new();
        values.insert(Variable::from(&x_sym), Complex64::new(2.0, 0.0));
        values.insert(Variable::from(&z), Complex64::new(1.0, 1.0));
        let result = expr.evaluate(&values).unwrap();
        assert_relative_eq!(result.re, 4.0 * 2.0 + 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.im, 0.0);

        values.remove(&Variable::from(&z));
        assert!(matches!(
            expr.evaluate(&values),
            Err(AmpsymError::UnboundSymbol { name }) if name == "z"
        ));
    }

    #[test]
    fn test_harmonic_constructors_vanish_above_order() {
        let theta = Expr::from(Symbol::coordinate("theta"));
        let phi = Expr::from(Symbol::coordinate("phi"));
        assert_eq!(
            Expr::ylm(1.into(), 2.into(), theta.clone(), phi.clone()),
            Expr::zero()
        );
        assert_ne!(
            Expr::ylm(Index::var("l"), 2.into(), theta, phi),
            Expr::zero()
        );
    }

    #[test]
    fn test_literal_hash_identifies_signed_zero() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Expr::number(0.0));
        assert!(set.contains(&Expr::number(-0.0)));
    }

    #[test]
    fn test_tree_printing() {
        let x = Expr::from(x());
        let expr = (&x * Expr::i()).norm_sqr() + x.re();
        assert_eq!(
            format!("{:?}", expr),
            "+
├─ ^
│  ├─ Abs
│  │  └─ ×
│  │     ├─ i
│  │     └─ x
│  └─ 2
└─ Re
   └─ x
"
        );
    }

    #[test]
    fn test_count_norm_sqr() {
        let x = Expr::from(x());
        let expr = x.norm_sqr() + (&x + 1.0).norm_sqr() + Expr::pow(x.clone(), Expr::number(2.0));
        assert_eq!(expr.count_norm_sqr(), 2);
        assert_eq!(expr.count(NodeKind::Abs), 2);
    }
}
