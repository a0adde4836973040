//! Matrix-valued models.
//!
//! A [`MatrixModel`] is the matrix counterpart of [`Model`](crate::Model):
//! an ordered mapping from output symbols to [`MatrixExpr`] right-hand
//! sides, analyzed by the same connectivity machinery, so matrix outputs can
//! consume other matrix outputs and scalar parameters alike. Scalars are
//! 1x1 matrices; a parameter bound to a scalar value broadcasts into the
//! expressions that consume it.
//!
//! Matrix models are evaluation-only: matrix expressions cannot be
//! differentiated, so there are no Jacobian or Hessian counterparts. They
//! are interpreted directly over `nalgebra` matrices rather than
//! JIT-compiled, since the dimensions are only known per call.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use colored::Colorize;
use itertools::Itertools;
use nalgebra::DMatrix;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::connectivity::{analyze, Connectivity};
use crate::errors::ModelError;
use crate::signature::CallSignature;
use crate::symbol::{Role, Symbol};

/// A matrix expression tree node.
///
/// Leaves are symbol references; scalars travel as 1x1 matrices. `Mul` is
/// the matrix product unless one operand is 1x1, in which case it scales the
/// other; `Div` requires a 1x1 divisor; `Sqrt` applies elementwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatrixExpr {
    /// A reference to a symbol (matrix input, matrix output or scalar
    /// parameter)
    Var(Symbol),
    /// Elementwise addition
    Add(Box<MatrixExpr>, Box<MatrixExpr>),
    /// Elementwise subtraction
    Sub(Box<MatrixExpr>, Box<MatrixExpr>),
    /// Matrix product, or scaling when either operand is 1x1
    Mul(Box<MatrixExpr>, Box<MatrixExpr>),
    /// Division by a 1x1 operand
    Div(Box<MatrixExpr>, Box<MatrixExpr>),
    /// Elementwise negation
    Neg(Box<MatrixExpr>),
    /// Transpose
    Transpose(Box<MatrixExpr>),
    /// Inverse of a square matrix
    Inverse(Box<MatrixExpr>),
    /// Elementwise square root
    Sqrt(Box<MatrixExpr>),
    /// Integer power of a 1x1 operand
    Pow(Box<MatrixExpr>, i64),
}

impl MatrixExpr {
    /// Returns the symbols referenced by this expression, in first-appearance
    /// order with duplicates removed.
    pub fn free_symbols(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut Vec<Symbol>) {
        match self {
            MatrixExpr::Var(sym) => {
                if !out.contains(sym) {
                    out.push(sym.clone());
                }
            }
            MatrixExpr::Add(l, r)
            | MatrixExpr::Sub(l, r)
            | MatrixExpr::Mul(l, r)
            | MatrixExpr::Div(l, r) => {
                l.collect_symbols(out);
                r.collect_symbols(out);
            }
            MatrixExpr::Neg(e)
            | MatrixExpr::Transpose(e)
            | MatrixExpr::Inverse(e)
            | MatrixExpr::Sqrt(e) => e.collect_symbols(out),
            MatrixExpr::Pow(b, _) => b.collect_symbols(out),
        }
    }

    /// Transpose.
    pub fn t(self) -> MatrixExpr {
        MatrixExpr::Transpose(Box::new(self))
    }

    /// Inverse.
    pub fn inverse(self) -> MatrixExpr {
        MatrixExpr::Inverse(Box::new(self))
    }

    /// Elementwise square root.
    pub fn sqrt(self) -> MatrixExpr {
        MatrixExpr::Sqrt(Box::new(self))
    }

    /// Integer power of a 1x1 expression.
    pub fn pow(self, n: i64) -> MatrixExpr {
        MatrixExpr::Pow(Box::new(self), n)
    }
}

impl From<Symbol> for MatrixExpr {
    fn from(sym: Symbol) -> Self {
        MatrixExpr::Var(sym)
    }
}

impl From<&Symbol> for MatrixExpr {
    fn from(sym: &Symbol) -> Self {
        MatrixExpr::Var(sym.clone())
    }
}

impl Add for MatrixExpr {
    type Output = MatrixExpr;
    fn add(self, rhs: MatrixExpr) -> MatrixExpr {
        MatrixExpr::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for MatrixExpr {
    type Output = MatrixExpr;
    fn sub(self, rhs: MatrixExpr) -> MatrixExpr {
        MatrixExpr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl Mul for MatrixExpr {
    type Output = MatrixExpr;
    fn mul(self, rhs: MatrixExpr) -> MatrixExpr {
        MatrixExpr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl Div for MatrixExpr {
    type Output = MatrixExpr;
    fn div(self, rhs: MatrixExpr) -> MatrixExpr {
        MatrixExpr::Div(Box::new(self), Box::new(rhs))
    }
}

impl Neg for MatrixExpr {
    type Output = MatrixExpr;
    fn neg(self) -> MatrixExpr {
        MatrixExpr::Neg(Box::new(self))
    }
}

impl fmt::Display for MatrixExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixExpr::Var(sym) => write!(f, "{sym}"),
            MatrixExpr::Add(l, r) => write!(f, "({l} + {r})"),
            MatrixExpr::Sub(l, r) => write!(f, "({l} - {r})"),
            MatrixExpr::Mul(l, r) => write!(f, "({l} * {r})"),
            MatrixExpr::Div(l, r) => write!(f, "({l} / {r})"),
            MatrixExpr::Neg(e) => write!(f, "-({e})"),
            MatrixExpr::Transpose(e) => write!(f, "{e}^T"),
            MatrixExpr::Inverse(e) => write!(f, "inv({e})"),
            MatrixExpr::Sqrt(e) => write!(f, "sqrt({e})"),
            MatrixExpr::Pow(b, n) => write!(f, "({b}^{n})"),
        }
    }
}

/// A named argument value for a matrix model call.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixValue {
    Scalar(f64),
    Matrix(DMatrix<f64>),
}

impl From<f64> for MatrixValue {
    fn from(v: f64) -> Self {
        MatrixValue::Scalar(v)
    }
}

impl From<DMatrix<f64>> for MatrixValue {
    fn from(m: DMatrix<f64>) -> Self {
        MatrixValue::Matrix(m)
    }
}

/// The result of a matrix model evaluation: one matrix per output key, in
/// the model's declared key order.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixOutput {
    keys: Vec<Symbol>,
    values: Vec<DMatrix<f64>>,
}

impl MatrixOutput {
    pub fn get(&self, name: &str) -> Option<&DMatrix<f64>> {
        self.keys
            .iter()
            .position(|k| k.name() == name)
            .map(|i| &self.values[i])
    }

    pub fn keys(&self) -> &[Symbol] {
        &self.keys
    }

    pub fn values(&self) -> &[DMatrix<f64>] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &DMatrix<f64>)> {
        self.keys.iter().zip(self.values.iter())
    }
}

/// An ordered matrix-valued model, analyzed at construction and interpreted
/// per call.
#[derive(Clone)]
pub struct MatrixModel {
    entries: Vec<(Symbol, MatrixExpr)>,
    connectivity: Connectivity,
    signature: CallSignature,
}

impl MatrixModel {
    /// Builds a matrix model from symbol/expression pairs. Connectivity and
    /// signature synthesis work exactly as for algebraic models.
    pub fn new(entries: Vec<(Symbol, MatrixExpr)>) -> Result<Self, ModelError> {
        let keys: Vec<Symbol> = entries.iter().map(|(k, _)| k.clone()).collect();
        let entries: Vec<(Symbol, MatrixExpr)> = entries
            .into_iter()
            .map(|(k, e)| {
                let e = demote_undefined_outputs(e, &keys);
                (k, e)
            })
            .collect();

        let dep_entries: Vec<(Symbol, Vec<Symbol>)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.free_symbols()))
            .collect();
        let connectivity = analyze(&dep_entries)?;
        let signature = CallSignature::new(&connectivity.independent, &connectivity.params);

        Ok(Self {
            entries,
            connectivity,
            signature,
        })
    }

    pub fn signature(&self) -> &CallSignature {
        &self.signature
    }

    pub fn params(&self) -> &[Symbol] {
        &self.connectivity.params
    }

    pub fn independent_vars(&self) -> &[Symbol] {
        &self.connectivity.independent
    }

    pub fn output_vars(&self) -> &[Symbol] {
        &self.connectivity.outputs
    }

    pub fn dependent_vars(&self) -> &[Symbol] {
        &self.connectivity.dependent
    }

    pub fn interdependent_vars(&self) -> &[Symbol] {
        &self.connectivity.interdependent
    }

    pub fn eval_order(&self) -> &[Symbol] {
        &self.connectivity.eval_order
    }

    pub fn connectivity_mapping(&self) -> &[(Symbol, Vec<Symbol>)] {
        &self.connectivity.mapping
    }

    pub fn entries(&self) -> &[(Symbol, MatrixExpr)] {
        &self.entries
    }

    /// Evaluates the model for named arguments. Scalars become 1x1 matrices;
    /// dimensions are checked per operation.
    pub fn eval(&self, args: &[(&str, MatrixValue)]) -> Result<MatrixOutput, ModelError> {
        let names: Vec<&str> = args.iter().map(|(name, _)| *name).collect();
        let order = self.signature.bind_order(&names)?;

        let mut env: HashMap<Symbol, DMatrix<f64>> = HashMap::new();
        for (sym, &provided) in self.signature.args().iter().zip(order.iter()) {
            let value = match &args[provided].1 {
                MatrixValue::Scalar(v) => DMatrix::from_element(1, 1, *v),
                MatrixValue::Matrix(m) => m.clone(),
            };
            env.insert(sym.clone(), value);
        }

        let mut results: Vec<(usize, DMatrix<f64>)> =
            Vec::with_capacity(self.entries.len());
        for (&idx, key) in self
            .connectivity
            .eval_indices
            .iter()
            .zip(&self.connectivity.eval_order)
        {
            let value = eval_matrix(&self.entries[idx].1, &env, key)?;
            env.insert(key.clone(), value.clone());
            results.push((idx, value));
        }

        // eval_indices permute the declared entries, so sorting restores
        // declaration order
        results.sort_by_key(|(i, _)| *i);
        Ok(MatrixOutput {
            keys: self.connectivity.outputs.clone(),
            values: results.into_iter().map(|(_, v)| v).collect(),
        })
    }
}

/// Replaces references to output symbols that no key defines with
/// independent variables of the same name.
fn demote_undefined_outputs(expr: MatrixExpr, keys: &[Symbol]) -> MatrixExpr {
    match expr {
        MatrixExpr::Var(sym) => {
            if sym.role() == Role::Output && !keys.contains(&sym) {
                MatrixExpr::Var(Symbol::independent(sym.name()))
            } else {
                MatrixExpr::Var(sym)
            }
        }
        MatrixExpr::Add(l, r) => MatrixExpr::Add(
            Box::new(demote_undefined_outputs(*l, keys)),
            Box::new(demote_undefined_outputs(*r, keys)),
        ),
        MatrixExpr::Sub(l, r) => MatrixExpr::Sub(
            Box::new(demote_undefined_outputs(*l, keys)),
            Box::new(demote_undefined_outputs(*r, keys)),
        ),
        MatrixExpr::Mul(l, r) => MatrixExpr::Mul(
            Box::new(demote_undefined_outputs(*l, keys)),
            Box::new(demote_undefined_outputs(*r, keys)),
        ),
        MatrixExpr::Div(l, r) => MatrixExpr::Div(
            Box::new(demote_undefined_outputs(*l, keys)),
            Box::new(demote_undefined_outputs(*r, keys)),
        ),
        MatrixExpr::Neg(e) => MatrixExpr::Neg(Box::new(demote_undefined_outputs(*e, keys))),
        MatrixExpr::Transpose(e) => {
            MatrixExpr::Transpose(Box::new(demote_undefined_outputs(*e, keys)))
        }
        MatrixExpr::Inverse(e) => {
            MatrixExpr::Inverse(Box::new(demote_undefined_outputs(*e, keys)))
        }
        MatrixExpr::Sqrt(e) => MatrixExpr::Sqrt(Box::new(demote_undefined_outputs(*e, keys))),
        MatrixExpr::Pow(b, n) => {
            MatrixExpr::Pow(Box::new(demote_undefined_outputs(*b, keys)), n)
        }
    }
}

fn is_scalar(m: &DMatrix<f64>) -> bool {
    m.nrows() == 1 && m.ncols() == 1
}

fn shape_error(key: &Symbol, op: &str, l: &DMatrix<f64>, r: &DMatrix<f64>) -> ModelError {
    ModelError::MatrixShape(format!(
        "output '{}': operands of '{}' have shapes {}x{} and {}x{}",
        key.name(),
        op,
        l.nrows(),
        l.ncols(),
        r.nrows(),
        r.ncols()
    ))
}

/// Interprets a matrix expression against the bound environment. `key` names
/// the output being computed, for error reporting.
fn eval_matrix(
    expr: &MatrixExpr,
    env: &HashMap<Symbol, DMatrix<f64>>,
    key: &Symbol,
) -> Result<DMatrix<f64>, ModelError> {
    match expr {
        MatrixExpr::Var(sym) => env
            .get(sym)
            .cloned()
            .ok_or_else(|| ModelError::MissingArguments(sym.name().to_string())),

        MatrixExpr::Add(l, r) => {
            let l = eval_matrix(l, env, key)?;
            let r = eval_matrix(r, env, key)?;
            if l.shape() != r.shape() {
                return Err(shape_error(key, "+", &l, &r));
            }
            Ok(l + r)
        }
        MatrixExpr::Sub(l, r) => {
            let l = eval_matrix(l, env, key)?;
            let r = eval_matrix(r, env, key)?;
            if l.shape() != r.shape() {
                return Err(shape_error(key, "-", &l, &r));
            }
            Ok(l - r)
        }
        MatrixExpr::Mul(l, r) => {
            let l = eval_matrix(l, env, key)?;
            let r = eval_matrix(r, env, key)?;
            if is_scalar(&l) {
                Ok(r * l[(0, 0)])
            } else if is_scalar(&r) {
                Ok(l * r[(0, 0)])
            } else if l.ncols() == r.nrows() {
                Ok(l * r)
            } else {
                Err(shape_error(key, "*", &l, &r))
            }
        }
        MatrixExpr::Div(l, r) => {
            let l = eval_matrix(l, env, key)?;
            let r = eval_matrix(r, env, key)?;
            if is_scalar(&r) {
                Ok(l / r[(0, 0)])
            } else {
                Err(shape_error(key, "/", &l, &r))
            }
        }

        MatrixExpr::Neg(e) => Ok(-eval_matrix(e, env, key)?),
        MatrixExpr::Transpose(e) => Ok(eval_matrix(e, env, key)?.transpose()),
        MatrixExpr::Inverse(e) => {
            let m = eval_matrix(e, env, key)?;
            if !m.is_square() {
                return Err(ModelError::MatrixShape(format!(
                    "output '{}': inverse of a {}x{} matrix",
                    key.name(),
                    m.nrows(),
                    m.ncols()
                )));
            }
            m.try_inverse()
                .ok_or_else(|| ModelError::SingularMatrix(key.name().to_string()))
        }
        MatrixExpr::Sqrt(e) => Ok(eval_matrix(e, env, key)?.map(f64::sqrt)),
        MatrixExpr::Pow(b, n) => {
            let m = eval_matrix(b, env, key)?;
            if !is_scalar(&m) {
                return Err(ModelError::MatrixShape(format!(
                    "output '{}': power of a {}x{} matrix",
                    key.name(),
                    m.nrows(),
                    m.ncols()
                )));
            }
            Ok(DMatrix::from_element(1, 1, m[(0, 0)].powi(*n as i32)))
        }
    }
}

impl fmt::Display for MatrixModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, expr) in &self.entries {
            let deps = expr.free_symbols();
            let inputs = deps
                .iter()
                .filter(|s| s.role() != Role::Parameter)
                .map(|s| s.name())
                .join(", ");
            let params = deps
                .iter()
                .filter(|s| s.role() == Role::Parameter)
                .map(|s| s.name())
                .join(", ");
            writeln!(f, "{}({}; {}) = {expr}", key.name().cyan(), inputs, params)?;
        }
        Ok(())
    }
}

impl fmt::Debug for MatrixModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixModel")
            .field("entries", &self.entries)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize)]
struct MatrixModelSpec {
    entries: Vec<(Symbol, MatrixExpr)>,
}

impl Serialize for MatrixModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MatrixModelSpec {
            entries: self.entries.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MatrixModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let spec = MatrixModelSpec::deserialize(deserializer)?;
        MatrixModel::new(spec.entries).map_err(D::Error::custom)
    }
}
