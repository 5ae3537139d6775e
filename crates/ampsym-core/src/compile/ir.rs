use std::collections::HashMap;

use num::complex::Complex64;

use crate::{
    expression::{powc, ylm_value, Expr, Index, Node},
    symbols::Variable,
    AmpsymError, AmpsymResult,
};

type IrValueId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum IrUnaryOp {
    Neg,
    Real,
    Imag,
    Conj,
    Abs,
    Exp,
    NormSqr,
}

impl IrUnaryOp {
    fn apply(self, value: Complex64) -> Complex64 {
        match self {
            IrUnaryOp::Neg => -value,
            IrUnaryOp::Real => Complex64::new(value.re, 0.0),
            IrUnaryOp::Imag => Complex64::new(value.im, 0.0),
            IrUnaryOp::Conj => value.conj(),
            IrUnaryOp::Abs => Complex64::new(value.norm(), 0.0),
            IrUnaryOp::Exp => value.exp(),
            IrUnaryOp::NormSqr => Complex64::new(value.norm_sqr(), 0.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum IrBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl IrBinaryOp {
    fn apply(self, a: Complex64, b: Complex64) -> Complex64 {
        match self {
            IrBinaryOp::Add => a + b,
            IrBinaryOp::Sub => a - b,
            IrBinaryOp::Mul => a * b,
            IrBinaryOp::Div => a / b,
            IrBinaryOp::Pow => powc(a, b),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum IrNode {
    Constant(Complex64),
    Arg(usize),
    Unary {
        op: IrUnaryOp,
        input: IrValueId,
    },
    Binary {
        op: IrBinaryOp,
        left: IrValueId,
        right: IrValueId,
    },
    PowI {
        input: IrValueId,
        exponent: i32,
    },
    Ylm {
        l: i64,
        m: i64,
        theta: IrValueId,
        phi: IrValueId,
    },
}

impl IrNode {
    fn inputs(&self) -> Vec<IrValueId> {
        match *self {
            IrNode::Constant(_) | IrNode::Arg(_) => Vec::new(),
            IrNode::Unary { input, .. } | IrNode::PowI { input, .. } => vec![input],
            IrNode::Binary { left, right, .. } => vec![left, right],
            IrNode::Ylm { theta, phi, .. } => vec![theta, phi],
        }
    }

    fn remap(&self, remap: &[IrValueId]) -> IrNode {
        match *self {
            IrNode::Constant(value) => IrNode::Constant(value),
            IrNode::Arg(idx) => IrNode::Arg(idx),
            IrNode::Unary { op, input } => IrNode::Unary {
                op,
                input: remap[input],
            },
            IrNode::Binary { op, left, right } => IrNode::Binary {
                op,
                left: remap[left],
                right: remap[right],
            },
            IrNode::PowI { input, exponent } => IrNode::PowI {
                input: remap[input],
                exponent,
            },
            IrNode::Ylm { l, m, theta, phi } => IrNode::Ylm {
                l,
                m,
                theta: remap[theta],
                phi: remap[phi],
            },
        }
    }
}

/// A flat single-assignment program computing one expression. Every node only refers to nodes
/// with smaller ids, so evaluating in id order is always valid.
#[derive(Clone, Debug)]
pub(super) struct ExpressionIR {
    nodes: Vec<IrNode>,
    root: IrValueId,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum IrNodeKey {
    Constant {
        re_bits: u64,
        im_bits: u64,
    },
    Arg(usize),
    Unary {
        op: IrUnaryOp,
        input: IrValueId,
    },
    Binary {
        op: IrBinaryOp,
        left: IrValueId,
        right: IrValueId,
    },
    PowI {
        input: IrValueId,
        exponent: i32,
    },
    Ylm {
        l: i64,
        m: i64,
        theta: IrValueId,
        phi: IrValueId,
    },
}

fn integer_exponent(exponent: &Expr) -> Option<i32> {
    let value = exponent.as_number()?;
    if value.im == 0.0 && value.re.fract() == 0.0 && value.re.abs() <= i32::MAX as f64 {
        Some(value.re as i32)
    } else {
        None
    }
}

impl ExpressionIR {
    /// Lower an expanded expression, mapping each free variable to its argument position.
    pub(super) fn from_expr(expr: &Expr, arguments: &HashMap<Variable, usize>) -> AmpsymResult<Self> {
        fn push(nodes: &mut Vec<IrNode>, node: IrNode) -> IrValueId {
            let id = nodes.len();
            nodes.push(node);
            id
        }
        fn arg(
            variable: Variable,
            arguments: &HashMap<Variable, usize>,
            nodes: &mut Vec<IrNode>,
        ) -> AmpsymResult<IrValueId> {
            match arguments.get(&variable) {
                Some(&idx) => Ok(push(nodes, IrNode::Arg(idx))),
                None => Err(AmpsymError::UnboundSymbol {
                    name: variable.name(),
                }),
            }
        }
        fn concrete(index: &Index) -> AmpsymResult<i64> {
            match index {
                Index::Value(v) => Ok(*v),
                Index::Var(name) => Err(AmpsymError::UnboundIndex { name: name.clone() }),
            }
        }
        fn negated(term: &Expr) -> Option<Expr> {
            match term.node() {
                Node::Mul(factors) if factors[0].as_number() == Some(-Complex64::ONE) => {
                    Some(Expr::product(factors[1..].to_vec()))
                }
                _ => None,
            }
        }
        fn reciprocal(factor: &Expr) -> Option<&Expr> {
            match factor.node() {
                Node::Pow(base, exponent) if integer_exponent(exponent) == Some(-1) => Some(base),
                _ => None,
            }
        }
        fn lower(
            expr: &Expr,
            arguments: &HashMap<Variable, usize>,
            nodes: &mut Vec<IrNode>,
        ) -> AmpsymResult<IrValueId> {
            Ok(match expr.node() {
                Node::Number(literal) => push(nodes, IrNode::Constant(literal.0)),
                Node::Symbol(s) => arg(Variable::Symbol(s.clone()), arguments, nodes)?,
                Node::Coefficient { family, indices } => {
                    let indices = indices
                        .iter()
                        .map(concrete)
                        .collect::<AmpsymResult<Vec<i64>>>()?;
                    arg(Variable::Coefficient(family.at(&indices)), arguments, nodes)?
                }
                Node::Add(terms) => {
                    let mut acc = lower(&terms[0], arguments, nodes)?;
                    for term in &terms[1..] {
                        let (op, right) = match negated(term) {
                            Some(positive) => (IrBinaryOp::Sub, lower(&positive, arguments, nodes)?),
                            None => (IrBinaryOp::Add, lower(term, arguments, nodes)?),
                        };
                        acc = push(
                            nodes,
                            IrNode::Binary {
                                op,
                                left: acc,
                                right,
                            },
                        );
                    }
                    acc
                }
                Node::Mul(factors) => {
                    if let Some(positive) = negated(expr) {
                        let input = lower(&positive, arguments, nodes)?;
                        return Ok(push(
                            nodes,
                            IrNode::Unary {
                                op: IrUnaryOp::Neg,
                                input,
                            },
                        ));
                    }
                    let mut acc = lower(&factors[0], arguments, nodes)?;
                    for factor in &factors[1..] {
                        let (op, right) = match reciprocal(factor) {
                            Some(base) => (IrBinaryOp::Div, lower(base, arguments, nodes)?),
                            None => (IrBinaryOp::Mul, lower(factor, arguments, nodes)?),
                        };
                        acc = push(
                            nodes,
                            IrNode::Binary {
                                op,
                                left: acc,
                                right,
                            },
                        );
                    }
                    acc
                }
                Node::Pow(base, exponent) => match (base.node(), integer_exponent(exponent)) {
                    (Node::Abs(inner), Some(2)) => {
                        let input = lower(inner, arguments, nodes)?;
                        push(
                            nodes,
                            IrNode::Unary {
                                op: IrUnaryOp::NormSqr,
                                input,
                            },
                        )
                    }
                    (_, Some(exponent)) => {
                        let input = lower(base, arguments, nodes)?;
                        push(nodes, IrNode::PowI { input, exponent })
                    }
                    _ => {
                        let left = lower(base, arguments, nodes)?;
                        let right = lower(exponent, arguments, nodes)?;
                        push(
                            nodes,
                            IrNode::Binary {
                                op: IrBinaryOp::Pow,
                                left,
                                right,
                            },
                        )
                    }
                },
                Node::Abs(a) | Node::Re(a) | Node::Im(a) | Node::Conj(a) | Node::Exp(a) => {
                    let op = match expr.node() {
                        Node::Abs(_) => IrUnaryOp::Abs,
                        Node::Re(_) => IrUnaryOp::Real,
                        Node::Im(_) => IrUnaryOp::Imag,
                        Node::Conj(_) => IrUnaryOp::Conj,
                        _ => IrUnaryOp::Exp,
                    };
                    let input = lower(a, arguments, nodes)?;
                    push(nodes, IrNode::Unary { op, input })
                }
                Node::Ylm { l, m, theta, phi } => {
                    let (l, m) = (concrete(l)?, concrete(m)?);
                    let theta = lower(theta, arguments, nodes)?;
                    let phi = lower(phi, arguments, nodes)?;
                    push(nodes, IrNode::Ylm { l, m, theta, phi })
                }
                Node::Zlm { .. } | Node::PoolSum { .. } => {
                    return lower(&expr.expand(), arguments, nodes);
                }
            })
        }

        let mut nodes = Vec::new();
        let root = lower(expr, arguments, &mut nodes)?;
        Ok(Self { nodes, root })
    }

    pub(super) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(super) fn root(&self) -> IrValueId {
        self.root
    }

    /// Which nodes depend on at least one array argument.
    pub(super) fn varying(&self, array_arguments: &[bool]) -> Vec<bool> {
        let mut varying = vec![false; self.nodes.len()];
        for (id, node) in self.nodes.iter().enumerate() {
            varying[id] = match node {
                IrNode::Arg(idx) => array_arguments.get(*idx).copied().unwrap_or(false),
                other => other.inputs().into_iter().any(|input| varying[input]),
            };
        }
        varying
    }

    /// Compute node `id` from already computed inputs in `values`.
    #[inline]
    pub(super) fn eval_node(
        &self,
        id: IrValueId,
        values: &mut [Complex64],
        argument: impl Fn(usize) -> Complex64,
    ) {
        values[id] = match self.nodes[id] {
            IrNode::Constant(value) => value,
            IrNode::Arg(idx) => argument(idx),
            IrNode::Unary { op, input } => op.apply(values[input]),
            IrNode::Binary { op, left, right } => op.apply(values[left], values[right]),
            IrNode::PowI { input, exponent } => values[input].powi(exponent),
            IrNode::Ylm { l, m, theta, phi } => ylm_value(l, m, values[theta], values[phi]),
        };
    }
}

struct ConstantFoldPass;

impl ConstantFoldPass {
    fn run(&self, ir: &mut ExpressionIR) {
        let mut constants: Vec<Option<Complex64>> = vec![None; ir.nodes.len()];
        for index in 0..ir.nodes.len() {
            let folded = match ir.nodes[index].clone() {
                IrNode::Constant(value) => Some(value),
                IrNode::Arg(_) => None,
                IrNode::Unary { op, input } => constants[input].map(|value| op.apply(value)),
                IrNode::Binary { op, left, right } => match (constants[left], constants[right]) {
                    (Some(a), Some(b)) => Some(op.apply(a, b)),
                    _ => None,
                },
                IrNode::PowI { input, exponent } => constants[input].map(|v| v.powi(exponent)),
                IrNode::Ylm { l, m, theta, phi } => match (constants[theta], constants[phi]) {
                    (Some(t), Some(p)) => Some(ylm_value(l, m, t, p)),
                    _ => None,
                },
            };
            if let Some(value) = folded {
                ir.nodes[index] = IrNode::Constant(value);
                constants[index] = Some(value);
            }
        }
    }
}

struct CsePass;

impl CsePass {
    fn run(&self, ir: &mut ExpressionIR) {
        fn key_for(node: &IrNode) -> IrNodeKey {
            match *node {
                IrNode::Constant(value) => IrNodeKey::Constant {
                    re_bits: (value.re + 0.0).to_bits(),
                    im_bits: (value.im + 0.0).to_bits(),
                },
                IrNode::Arg(idx) => IrNodeKey::Arg(idx),
                IrNode::Unary { op, input } => IrNodeKey::Unary { op, input },
                IrNode::Binary { op, left, right } => IrNodeKey::Binary { op, left, right },
                IrNode::PowI { input, exponent } => IrNodeKey::PowI { input, exponent },
                IrNode::Ylm { l, m, theta, phi } => IrNodeKey::Ylm { l, m, theta, phi },
            }
        }

        let mut remap = vec![0usize; ir.nodes.len()];
        let mut interned: HashMap<IrNodeKey, IrValueId> = HashMap::new();
        let mut compacted: Vec<IrNode> = Vec::with_capacity(ir.nodes.len());

        for (old_id, node) in ir.nodes.iter().enumerate() {
            let remapped = node.remap(&remap);
            let key = key_for(&remapped);
            if let Some(&existing) = interned.get(&key) {
                remap[old_id] = existing;
            } else {
                let new_id = compacted.len();
                compacted.push(remapped);
                interned.insert(key, new_id);
                remap[old_id] = new_id;
            }
        }

        ir.root = remap[ir.root];
        ir.nodes = compacted;
    }
}

/// Drops nodes which the root no longer reaches, typically the inputs of folded constants.
struct PrunePass;

impl PrunePass {
    fn run(&self, ir: &mut ExpressionIR) {
        let mut live = vec![false; ir.nodes.len()];
        live[ir.root] = true;
        for id in (0..ir.nodes.len()).rev() {
            if live[id] {
                for input in ir.nodes[id].inputs() {
                    live[input] = true;
                }
            }
        }
        let mut remap = vec![0usize; ir.nodes.len()];
        let mut compacted: Vec<IrNode> = Vec::with_capacity(ir.nodes.len());
        for (old_id, node) in ir.nodes.iter().enumerate() {
            if live[old_id] {
                remap[old_id] = compacted.len();
                compacted.push(node.remap(&remap));
            }
        }
        ir.root = remap[ir.root];
        ir.nodes = compacted;
    }
}

enum IrPassKind {
    Cse,
    ConstantFold,
    Prune,
}

pub(super) struct ExpressionIrPipeline {
    passes: Vec<IrPassKind>,
}

impl ExpressionIrPipeline {
    pub(super) fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub(super) fn cse(mut self) -> Self {
        self.passes.push(IrPassKind::Cse);
        self
    }

    pub(super) fn constant_fold(mut self) -> Self {
        self.passes.push(IrPassKind::ConstantFold);
        self
    }

    pub(super) fn prune(mut self) -> Self {
        self.passes.push(IrPassKind::Prune);
        self
    }

    pub(super) fn run(&self, ir: &mut ExpressionIR) {
        for pass in &self.passes {
            match pass {
                IrPassKind::Cse => CsePass.run(ir),
                IrPassKind::ConstantFold => ConstantFoldPass.run(ir),
                IrPassKind::Prune => PrunePass.run(ir),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use num::complex::Complex64;

    use super::*;
    use crate::Symbol;

    fn arguments(names: &[&str]) -> HashMap<Variable, usize> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (Variable::from(Symbol::parameter(n)), i))
            .collect()
    }

    fn eval_scalar(ir: &ExpressionIR, args: &[Complex64]) -> Complex64 {
        let mut values = vec![Complex64::ZERO; ir.node_count()];
        for id in 0..ir.node_count() {
            ir.eval_node(id, &mut values, |k| args[k]);
        }
        values[ir.root()]
    }

    #[test]
    fn test_expression_ir_constant_fold_pipeline() {
        let tree = Expr::pow(Expr::from(Symbol::parameter("x")), Expr::number(2.0)).abs()
            * Expr::number(3.0).exp();
        let mut ir = ExpressionIR::from_expr(&tree, &arguments(&["x"])).unwrap();
        let raw = ir.node_count();
        ExpressionIrPipeline::new()
            .constant_fold()
            .prune()
            .run(&mut ir);
        assert!(ir.node_count() <= raw);
        let value = eval_scalar(&ir, &[Complex64::new(2.0, 0.0)]);
        approx::assert_relative_eq!(value.re, 4.0 * 3.0f64.exp(), epsilon = 1e-9);
    }

    #[test]
    fn test_expression_ir_cse_pipeline_deduplicates_nodes() {
        let x = Expr::from(Symbol::parameter("x"));
        let y = Expr::from(Symbol::parameter("y"));
        let repeated = (&x * &y).re();
        let tree = (&repeated + Expr::from(Symbol::parameter("z"))) * &repeated;
        let mut ir = ExpressionIR::from_expr(&tree, &arguments(&["x", "y", "z"])).unwrap();
        let before = ir.node_count();
        ExpressionIrPipeline::new().cse().run(&mut ir);
        let after = ir.node_count();
        assert!(after < before);
        let args = [
            Complex64::new(1.0, 2.0),
            Complex64::new(0.5, -1.0),
            Complex64::new(3.0, 0.0),
        ];
        let re = (args[0] * args[1]).re;
        approx::assert_relative_eq!(eval_scalar(&ir, &args).re, (re + 3.0) * re);
    }

    #[test]
    fn test_norm_sqr_and_subtraction_lowering() {
        let x = Expr::from(Symbol::parameter("x"));
        let y = Expr::from(Symbol::parameter("y"));
        let tree = (&x - &y).norm_sqr() / &y;
        let ir = ExpressionIR::from_expr(&tree, &arguments(&["x", "y"])).unwrap();
        assert!(ir.nodes.iter().any(|n| matches!(
            n,
            IrNode::Unary {
                op: IrUnaryOp::NormSqr,
                ..
            }
        )));
        assert!(ir.nodes.iter().any(|n| matches!(
            n,
            IrNode::Binary {
                op: IrBinaryOp::Sub,
                ..
            }
        )));
        let value = eval_scalar(&ir, &[Complex64::new(3.0, 1.0), Complex64::new(2.0, 0.0)]);
        approx::assert_relative_eq!(value.re, 1.0);
    }

    #[test]
    fn test_missing_argument_fails_lowering() {
        let tree = Expr::from(Symbol::parameter("x")) + Expr::from(Symbol::parameter("w"));
        assert!(matches!(
            ExpressionIR::from_expr(&tree, &arguments(&["x"])),
            Err(AmpsymError::UnboundSymbol { name }) if name == "w"
        ));
    }
}
