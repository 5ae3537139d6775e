use std::collections::{hash_map::Entry, HashMap};

use indexmap::IndexSet;
use ndarray::{Array2, ArrayD, IxDyn};
use num::complex::Complex64;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::debug;

use crate::{symbols::Variable, AmpsymError, AmpsymResult, Expr};

/// The flat intermediate representation and its optimization passes.
mod ir;

use ir::{ExpressionIR, ExpressionIrPipeline};

/// An argument to (or the result of) a [`NumericFunction`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A single complex number, broadcast against any array arguments.
    Scalar(Complex64),
    /// An n-dimensional array of complex numbers.
    Array(ArrayD<Complex64>),
}

impl Value {
    /// The shape of the value (empty for scalars).
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Value::Scalar(_) => Vec::new(),
            Value::Array(a) => a.shape().to_vec(),
        }
    }
    /// The scalar, if this is one.
    pub fn as_scalar(&self) -> Option<Complex64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Array(_) => None,
        }
    }
    /// The array, if this is one.
    pub fn as_array(&self) -> Option<&ArrayD<Complex64>> {
        match self {
            Value::Scalar(_) => None,
            Value::Array(a) => Some(a),
        }
    }
    /// The real part of every element as an array (scalars become zero-dimensional arrays).
    pub fn real(&self) -> ArrayD<f64> {
        match self {
            Value::Scalar(v) => ArrayD::from_elem(IxDyn(&[]), v.re),
            Value::Array(a) => a.mapv(|v| v.re),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(Complex64::new(value, 0.0))
    }
}

impl From<Complex64> for Value {
    fn from(value: Complex64) -> Self {
        Value::Scalar(value)
    }
}

impl From<ArrayD<f64>> for Value {
    fn from(value: ArrayD<f64>) -> Self {
        Value::Array(value.mapv(|v| Complex64::new(v, 0.0)))
    }
}

impl From<Array2<f64>> for Value {
    fn from(value: Array2<f64>) -> Self {
        Value::from(value.into_dyn())
    }
}

impl From<ArrayD<Complex64>> for Value {
    fn from(value: ArrayD<Complex64>) -> Self {
        Value::Array(value)
    }
}

impl From<Array2<Complex64>> for Value {
    fn from(value: Array2<Complex64>) -> Self {
        Value::Array(value.into_dyn())
    }
}

fn broadcast_shapes(left: &[usize], right: &[usize]) -> AmpsymResult<Vec<usize>> {
    let ndim = left.len().max(right.len());
    let mut shape = vec![0; ndim];
    for i in 0..ndim {
        let a = if i < ndim - left.len() {
            1
        } else {
            left[i - (ndim - left.len())]
        };
        let b = if i < ndim - right.len() {
            1
        } else {
            right[i - (ndim - right.len())]
        };
        shape[i] = match (a, b) {
            (a, b) if a == b => a,
            (1, b) => b,
            (a, 1) => a,
            _ => {
                return Err(AmpsymError::ShapeMismatch {
                    left: left.to_vec(),
                    right: right.to_vec(),
                })
            }
        };
    }
    Ok(shape)
}

/// A callable numeric function compiled from an expression tree and an ordered argument list.
///
/// Calls are pure and deterministic. Arguments may be scalars or arrays; arrays broadcast
/// against each other with the usual rules (trailing dimensions must agree or be one).
#[derive(Clone, Debug)]
pub struct NumericFunction {
    arguments: Vec<Variable>,
    ir: ExpressionIR,
}

impl NumericFunction {
    /// The argument list, in call order.
    pub fn arguments(&self) -> &[Variable] {
        &self.arguments
    }

    /// The number of arguments.
    pub fn arity(&self) -> usize {
        self.arguments.len()
    }

    /// The position of the argument called `name`.
    pub fn arg_index(&self, name: &str) -> Option<usize> {
        self.arguments.iter().position(|a| a.name() == name)
    }

    /// The number of instructions left after optimization.
    pub fn node_count(&self) -> usize {
        self.ir.node_count()
    }

    /// Evaluate the function.
    ///
    /// Instructions which do not depend on an array argument are evaluated once; only the rest
    /// run for every element of the broadcast shape.
    ///
    /// # Errors
    ///
    /// Returns [`AmpsymError::ArityMismatch`] if the number of arguments is wrong and
    /// [`AmpsymError::ShapeMismatch`] if the array arguments cannot be broadcast together.
    pub fn call(&self, args: &[Value]) -> AmpsymResult<Value> {
        if args.len() != self.arity() {
            return Err(AmpsymError::ArityMismatch {
                expected: self.arity(),
                got: args.len(),
            });
        }
        let mut shape: Option<Vec<usize>> = None;
        for arg in args {
            if let Value::Array(a) = arg {
                shape = Some(match shape {
                    Some(s) => broadcast_shapes(&s, a.shape())?,
                    None => a.shape().to_vec(),
                });
            }
        }
        let scalars: Vec<Complex64> = args
            .iter()
            .map(|a| a.as_scalar().unwrap_or(Complex64::ZERO))
            .collect();
        let is_array: Vec<bool> = args.iter().map(|a| a.as_array().is_some()).collect();
        let varying = self.ir.varying(&is_array);
        let mut base = vec![Complex64::ZERO; self.ir.node_count()];
        for (id, varies) in varying.iter().enumerate() {
            if !varies {
                self.ir.eval_node(id, &mut base, |k| scalars[k]);
            }
        }
        let Some(shape) = shape else {
            return Ok(Value::Scalar(base[self.ir.root()]));
        };
        let mut arrays: Vec<Option<Vec<Complex64>>> = Vec::with_capacity(args.len());
        for arg in args {
            arrays.push(match arg {
                Value::Scalar(_) => None,
                Value::Array(a) => Some(
                    a.broadcast(IxDyn(&shape))
                        .ok_or_else(|| AmpsymError::ShapeMismatch {
                            left: shape.clone(),
                            right: a.shape().to_vec(),
                        })?
                        .iter()
                        .copied()
                        .collect(),
                ),
            });
        }
        let varying_ids: Vec<usize> = varying
            .iter()
            .enumerate()
            .filter_map(|(id, varies)| varies.then_some(id))
            .collect();
        let n_elements: usize = shape.iter().product();
        let root = self.ir.root();
        let element = |values: &mut Vec<Complex64>, i: usize| -> Complex64 {
            let argument = |k: usize| match &arrays[k] {
                Some(array) => array[i],
                None => scalars[k],
            };
            for &id in &varying_ids {
                self.ir.eval_node(id, values, argument);
            }
            values[root]
        };
        #[cfg(feature = "rayon")]
        let output: Vec<Complex64> = (0..n_elements)
            .into_par_iter()
            .map_init(|| base.clone(), |values, i| element(values, i))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let output: Vec<Complex64> = {
            let mut values = base;
            (0..n_elements).map(|i| element(&mut values, i)).collect()
        };
        ArrayD::from_shape_vec(IxDyn(&shape), output)
            .map(Value::Array)
            .map_err(|e| AmpsymError::Custom(e.to_string()))
    }
}

/// Compile `expr` into a [`NumericFunction`] of `args`, in the given order.
///
/// The tree is expanded first, then lowered to a flat instruction list which goes through
/// common-subexpression elimination, constant folding, and dead-instruction pruning. Arguments
/// which do not occur in the tree are accepted and ignored.
///
/// # Errors
///
/// Returns [`AmpsymError::UnboundSymbol`] if a free variable of the expanded tree is not among
/// `args` and [`AmpsymError::DuplicateArgument`] if `args` repeats a variable.
pub fn compile(expr: &Expr, args: &[Variable]) -> AmpsymResult<NumericFunction> {
    let mut seen = IndexSet::with_capacity(args.len());
    for arg in args {
        if !seen.insert(arg) {
            return Err(AmpsymError::DuplicateArgument { name: arg.name() });
        }
    }
    let expanded = expr.expand();
    if let Some(missing) = expanded
        .free_variables()
        .into_iter()
        .find(|v| !seen.contains(v))
    {
        return Err(AmpsymError::UnboundSymbol {
            name: missing.name(),
        });
    }
    let positions: HashMap<Variable, usize> = args
        .iter()
        .enumerate()
        .map(|(i, v)| (v.clone(), i))
        .collect();
    let mut ir = ExpressionIR::from_expr(&expanded, &positions)?;
    let lowered = ir.node_count();
    ExpressionIrPipeline::new()
        .cse()
        .constant_fold()
        .cse()
        .prune()
        .run(&mut ir);
    debug!(
        lowered,
        optimized = ir.node_count(),
        arity = args.len(),
        "compiled numeric function"
    );
    Ok(NumericFunction {
        arguments: args.to_vec(),
        ir,
    })
}

/// A memo of compiled functions, one per distinct expression and argument list.
#[derive(Default, Debug)]
pub struct FunctionCache {
    functions: HashMap<(Expr, Vec<Variable>), NumericFunction>,
}

impl FunctionCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled function for `expr` and `args`, compiling it on first request.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`compile`]; failures are not cached.
    pub fn get_or_compile(
        &mut self,
        expr: &Expr,
        args: &[Variable],
    ) -> AmpsymResult<&NumericFunction> {
        match self.functions.entry((expr.clone(), args.to_vec())) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let function = compile(expr, args)?;
                Ok(entry.insert(function))
            }
        }
    }

    /// The number of compiled functions held.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether nothing has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
