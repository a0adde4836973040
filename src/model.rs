//! Symbolic models: ordered output mappings with compiled evaluation.
//!
//! A [`Model`] is an ordered mapping from output symbols to components. A
//! component is either a symbolic expression or an external numeric function
//! with a declared input list. At construction the model analyzes its
//! dependency structure, synthesizes a call signature, fixes the slot layout
//! and JIT-compiles every symbolic component; afterwards it is immutable and
//! can be shared freely between threads.
//!
//! ```
//! use modeljit::{Expr, Model, Symbol};
//!
//! let x = Symbol::independent("x");
//! let a = Symbol::parameter("a");
//! let y = Symbol::output("y");
//!
//! let model = Model::new(vec![(y, Expr::from(&a) * Expr::from(&x).pow(2))])?;
//! let out = model.eval(&[("x", 3.0.into()), ("a", 2.0.into())])?;
//! assert_eq!(out.get("y").unwrap()[0], 18.0);
//! # Ok::<(), modeljit::ModelError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use colored::Colorize;
use evalexpr::{build_operator_tree, DefaultNumericTypes};
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use serde::de::Error as DeError;
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::builder::{build_scalar_function, ScalarFn, SlotLayout};
use crate::connectivity::{analyze, Connectivity};
use crate::convert::build_ast;
use crate::errors::ModelError;
use crate::expr::Expr;
use crate::signature::CallSignature;
use crate::symbol::{Role, Symbol};

/// An externally supplied numeric component. Called with one array per
/// declared input, in declaration order; must return one value per point.
pub type NumericFn = Arc<dyn Fn(&[ArrayView1<f64>]) -> Array1<f64> + Send + Sync>;

/// One model output: a symbolic expression or an opaque numeric function.
///
/// Numeric components must declare their inputs explicitly because free
/// symbols cannot be read off an opaque function.
#[derive(Clone)]
pub enum Component {
    Symbolic(Expr),
    Numeric { fun: NumericFn, inputs: Vec<Symbol> },
}

impl Component {
    /// The symbols this component directly consumes.
    pub fn dependencies(&self) -> Vec<Symbol> {
        match self {
            Component::Symbolic(expr) => expr.free_symbols(),
            Component::Numeric { inputs, .. } => inputs.clone(),
        }
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            Component::Symbolic(expr) => Some(expr),
            Component::Numeric { .. } => None,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Symbolic(expr) => write!(f, "Symbolic({expr})"),
            Component::Numeric { inputs, .. } => f
                .debug_struct("Numeric")
                .field("inputs", inputs)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Expr> for Component {
    fn from(expr: Expr) -> Self {
        Component::Symbolic(expr)
    }
}

/// A named argument value for a model call.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Scalar(f64),
    Array(Array1<f64>),
}

impl From<f64> for InputValue {
    fn from(v: f64) -> Self {
        InputValue::Scalar(v)
    }
}

impl From<Array1<f64>> for InputValue {
    fn from(v: Array1<f64>) -> Self {
        InputValue::Array(v)
    }
}

impl From<Vec<f64>> for InputValue {
    fn from(v: Vec<f64>) -> Self {
        InputValue::Array(Array1::from(v))
    }
}

impl From<&[f64]> for InputValue {
    fn from(v: &[f64]) -> Self {
        InputValue::Array(Array1::from(v.to_vec()))
    }
}

/// The result of a model evaluation: one array per output key, in the
/// model's declared key order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    keys: Vec<Symbol>,
    values: Vec<Array1<f64>>,
}

impl ModelOutput {
    pub(crate) fn new(keys: Vec<Symbol>, values: Vec<Array1<f64>>) -> Self {
        Self { keys, values }
    }

    pub fn get(&self, name: &str) -> Option<&Array1<f64>> {
        self.keys
            .iter()
            .position(|k| k.name() == name)
            .map(|i| &self.values[i])
    }

    pub fn keys(&self) -> &[Symbol] {
        &self.keys
    }

    pub fn values(&self) -> &[Array1<f64>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Array1<f64>> {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Array1<f64>)> {
        self.keys.iter().zip(self.values.iter())
    }
}

enum Compiled {
    Jit(ScalarFn),
    External { fun: NumericFn, inputs: Vec<Symbol> },
}

impl Clone for Compiled {
    fn clone(&self) -> Self {
        match self {
            Compiled::Jit(f) => Compiled::Jit(f.clone()),
            Compiled::External { fun, inputs } => Compiled::External {
                fun: fun.clone(),
                inputs: inputs.clone(),
            },
        }
    }
}

/// An ordered symbolic model, analyzed and compiled at construction.
#[derive(Clone)]
pub struct Model {
    entries: Vec<(Symbol, Component)>,
    connectivity: Connectivity,
    signature: CallSignature,
    layout: SlotLayout,
    compiled: Vec<Compiled>,
}

impl Model {
    /// Builds a model from symbol/expression pairs. Parameters take
    /// first-appearance order across the expressions.
    pub fn new(entries: Vec<(Symbol, Expr)>) -> Result<Self, ModelError> {
        Self::build(
            entries
                .into_iter()
                .map(|(k, e)| (k, Component::Symbolic(e)))
                .collect(),
            None,
        )
    }

    /// Builds a model from mixed symbolic and numeric components.
    pub fn from_components(entries: Vec<(Symbol, Component)>) -> Result<Self, ModelError> {
        Self::build(entries, None)
    }

    /// Builds a model with an explicitly ordered parameter list. Every
    /// parameter the components consume must appear in `params`; unused
    /// entries are kept in the signature, which is how derivative and
    /// constraint models stay aligned with their source model.
    pub fn from_components_with_params(
        entries: Vec<(Symbol, Component)>,
        params: Vec<Symbol>,
    ) -> Result<Self, ModelError> {
        Self::build(entries, Some(params))
    }

    /// Builds a model from strings, e.g. `[("y", "a * x^2 + b")]` with
    /// declared parameters `["a", "b"]`. Identifiers that are neither keys
    /// nor declared parameters become independent variables.
    pub fn from_strs(outputs: &[(&str, &str)], params: &[&str]) -> Result<Self, ModelError> {
        let mut roles = HashMap::new();
        for (name, _) in outputs {
            roles.insert(name.to_string(), Symbol::output(*name));
        }
        for name in params {
            roles.insert(name.to_string(), Symbol::parameter(*name));
        }

        let mut entries = Vec::with_capacity(outputs.len());
        for (name, src) in outputs {
            let tree = build_operator_tree::<DefaultNumericTypes>(src)?;
            let expr = build_ast(&tree, &roles)?;
            entries.push((Symbol::output(*name), Component::Symbolic(expr)));
        }
        Self::build(
            entries,
            Some(params.iter().map(|p| Symbol::parameter(*p)).collect()),
        )
    }

    pub(crate) fn build(
        entries: Vec<(Symbol, Component)>,
        params_override: Option<Vec<Symbol>>,
    ) -> Result<Self, ModelError> {
        let keys: Vec<Symbol> = entries.iter().map(|(k, _)| k.clone()).collect();
        let entries = normalize_undefined_outputs(entries, &keys);

        let dep_entries: Vec<(Symbol, Vec<Symbol>)> = entries
            .iter()
            .map(|(k, c)| (k.clone(), c.dependencies()))
            .collect();
        let mut connectivity = analyze(&dep_entries)?;

        if let Some(params) = params_override {
            let undeclared = connectivity
                .params
                .iter()
                .filter(|p| !params.contains(p))
                .map(|p| p.name())
                .join(", ");
            if !undeclared.is_empty() {
                return Err(ModelError::UnexpectedArguments(undeclared));
            }
            connectivity.params = params;
        }

        let signature = CallSignature::new(&connectivity.independent, &connectivity.params);

        let mut slots: Vec<Symbol> = signature.args().to_vec();
        slots.extend(connectivity.interdependent.iter().cloned());
        let layout = SlotLayout::new(slots);

        let compiled = entries
            .iter()
            .map(|(_, component)| match component {
                Component::Symbolic(expr) => {
                    Ok(Compiled::Jit(build_scalar_function(expr, &layout)?))
                }
                Component::Numeric { fun, inputs } => Ok(Compiled::External {
                    fun: fun.clone(),
                    inputs: inputs.clone(),
                }),
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        Ok(Self {
            entries,
            connectivity,
            signature,
            layout,
            compiled,
        })
    }

    pub fn signature(&self) -> &CallSignature {
        &self.signature
    }

    /// Parameters, in signature order.
    pub fn params(&self) -> &[Symbol] {
        &self.connectivity.params
    }

    /// Independent variables, in signature order.
    pub fn independent_vars(&self) -> &[Symbol] {
        &self.connectivity.independent
    }

    /// All output keys, in declaration order.
    pub fn output_vars(&self) -> &[Symbol] {
        &self.connectivity.outputs
    }

    /// Output keys no other output consumes (the fit targets).
    pub fn dependent_vars(&self) -> &[Symbol] {
        &self.connectivity.dependent
    }

    /// Output keys consumed by other outputs.
    pub fn interdependent_vars(&self) -> &[Symbol] {
        &self.connectivity.interdependent
    }

    /// The order outputs are evaluated in.
    pub fn eval_order(&self) -> &[Symbol] {
        &self.connectivity.eval_order
    }

    /// Per output key, the symbols its component directly consumes.
    pub fn connectivity_mapping(&self) -> &[(Symbol, Vec<Symbol>)] {
        &self.connectivity.mapping
    }

    pub fn entries(&self) -> &[(Symbol, Component)] {
        &self.entries
    }

    pub fn component(&self, key: &Symbol) -> Option<&Component> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, c)| c)
    }

    pub(crate) fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// True if every component is symbolic.
    pub fn is_symbolic(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, c)| matches!(c, Component::Symbolic(_)))
    }

    /// Evaluates the model for named arguments, broadcasting scalars against
    /// arrays. Returns one array per output key in declaration order.
    pub fn eval(&self, args: &[(&str, InputValue)]) -> Result<ModelOutput, ModelError> {
        let names: Vec<&str> = args.iter().map(|(name, _)| *name).collect();
        let order = self.signature.bind_order(&names)?;

        // signature-ordered views into the caller's values
        let bound: Vec<&InputValue> = order.iter().map(|&i| &args[i].1).collect();

        let n = broadcast_len(&self.signature, &bound)?;

        let mut buf = vec![0.0; self.layout.len()];
        let mut array_slots: Vec<(usize, &Array1<f64>)> = Vec::new();
        for (slot, value) in bound.iter().enumerate() {
            match value {
                InputValue::Scalar(v) => buf[slot] = *v,
                InputValue::Array(arr) => array_slots.push((slot, arr)),
            }
        }

        let mut computed: HashMap<Symbol, Array1<f64>> = HashMap::new();

        for (&idx, key) in self
            .connectivity
            .eval_indices
            .iter()
            .zip(&self.connectivity.eval_order)
        {
            let out = match &self.compiled[idx] {
                Compiled::Jit(f) => {
                    // slots that change per point: array args plus the
                    // interdependent outputs computed so far
                    let mut point_slots = array_slots.clone();
                    for (sym, arr) in &computed {
                        if let Some(slot) = self.layout.index_of(sym) {
                            point_slots.push((slot, arr));
                        }
                    }
                    let mut out = Array1::zeros(n);
                    for i in 0..n {
                        for (slot, arr) in &point_slots {
                            buf[*slot] = arr[i];
                        }
                        out[i] = f(&buf);
                    }
                    out
                }
                Compiled::External { fun, inputs } => {
                    let gathered = self.gather_inputs(inputs, &bound, &computed, n)?;
                    let views: Vec<ArrayView1<f64>> = gathered.iter().map(|a| a.view()).collect();
                    let out = fun(&views);
                    if out.len() != n {
                        return Err(ModelError::ShapeMismatch {
                            name: key.name().to_string(),
                            expected: n,
                            got: out.len(),
                        });
                    }
                    out
                }
            };
            computed.insert(key.clone(), out);
        }

        let values = self
            .connectivity
            .outputs
            .iter()
            .map(|key| computed.remove(key).unwrap_or_default())
            .collect();
        Ok(ModelOutput {
            keys: self.connectivity.outputs.clone(),
            values,
        })
    }

    /// Evaluates many argument sets in parallel.
    pub fn eval_batch(
        &self,
        calls: &[Vec<(&str, InputValue)>],
    ) -> Result<Vec<ModelOutput>, ModelError> {
        calls.par_iter().map(|args| self.eval(args)).collect()
    }

    fn gather_inputs(
        &self,
        inputs: &[Symbol],
        bound: &[&InputValue],
        computed: &HashMap<Symbol, Array1<f64>>,
        n: usize,
    ) -> Result<Vec<Array1<f64>>, ModelError> {
        inputs
            .iter()
            .map(|sym| {
                if let Some(arr) = computed.get(sym) {
                    return Ok(arr.clone());
                }
                if let Some(pos) = self.signature.args().iter().position(|s| s == sym) {
                    return Ok(match bound[pos] {
                        InputValue::Scalar(v) => Array1::from_elem(n, *v),
                        InputValue::Array(arr) => (*arr).clone(),
                    });
                }
                Err(ModelError::MissingArguments(sym.name().to_string()))
            })
            .collect()
    }

    /// Returns a model computing the negated outputs. Only outputs no other
    /// output consumes are negated; flipping an interdependent output would
    /// change everything downstream of it.
    pub fn negate(&self) -> Result<Model, ModelError> {
        let entries = self
            .entries
            .iter()
            .map(|(key, component)| {
                let negated = if self.connectivity.interdependent.contains(key) {
                    component.clone()
                } else {
                    match component {
                        Component::Symbolic(expr) => {
                            Component::Symbolic(Expr::Neg(Box::new(expr.clone())))
                        }
                        Component::Numeric { fun, inputs } => {
                            let inner = fun.clone();
                            Component::Numeric {
                                fun: Arc::new(move |args: &[ArrayView1<f64>]| -inner(args)),
                                inputs: inputs.clone(),
                            }
                        }
                    }
                };
                (key.clone(), negated)
            })
            .collect();
        Model::build(entries, Some(self.connectivity.params.clone()))
    }
}

/// Replaces references to output symbols that no key defines with
/// independent variables of the same name, in expressions and in numeric
/// input lists alike.
fn normalize_undefined_outputs(
    entries: Vec<(Symbol, Component)>,
    keys: &[Symbol],
) -> Vec<(Symbol, Component)> {
    entries
        .into_iter()
        .map(|(key, component)| {
            let component = match component {
                Component::Symbolic(expr) => {
                    let undefined: Vec<Symbol> = expr
                        .free_symbols()
                        .into_iter()
                        .filter(|s| s.role() == Role::Output && !keys.contains(s))
                        .collect();
                    let expr = undefined.iter().fold(expr, |e, sym| {
                        e.substitute(sym, &Expr::Var(Symbol::independent(sym.name())))
                    });
                    Component::Symbolic(expr)
                }
                Component::Numeric { fun, inputs } => Component::Numeric {
                    fun,
                    inputs: inputs
                        .into_iter()
                        .map(|s| {
                            if s.role() == Role::Output && !keys.contains(&s) {
                                Symbol::independent(s.name())
                            } else {
                                s
                            }
                        })
                        .collect(),
                },
            };
            (key, component)
        })
        .collect()
}

fn broadcast_len(
    signature: &CallSignature,
    bound: &[&InputValue],
) -> Result<usize, ModelError> {
    let mut n: Option<usize> = None;
    for (sym, value) in signature.args().iter().zip(bound.iter()) {
        if let InputValue::Array(arr) = value {
            match n {
                None => n = Some(arr.len()),
                Some(len) if len != arr.len() => {
                    return Err(ModelError::ShapeMismatch {
                        name: sym.name().to_string(),
                        expected: len,
                        got: arr.len(),
                    });
                }
                Some(_) => {}
            }
        }
    }
    Ok(n.unwrap_or(1))
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, component) in &self.entries {
            let deps = component.dependencies();
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
            write!(f, "{}({}; {}) = ", key.name().cyan(), inputs, params)?;
            match component {
                Component::Symbolic(expr) => writeln!(f, "{expr}")?,
                Component::Numeric { .. } => writeln!(f, "{}", "<numeric>".yellow())?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("entries", &self.entries)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize)]
struct ModelSpec {
    entries: Vec<(Symbol, Expr)>,
    params: Vec<Symbol>,
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (key, component) in &self.entries {
            match component {
                Component::Symbolic(expr) => entries.push((key.clone(), expr.clone())),
                Component::Numeric { .. } => {
                    return Err(S::Error::custom(format!(
                        "output '{}' has a numeric component and cannot be serialized",
                        key.name()
                    )));
                }
            }
        }
        ModelSpec {
            entries,
            params: self.connectivity.params.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Model {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let spec = ModelSpec::deserialize(deserializer)?;
        let entries = spec
            .entries
            .into_iter()
            .map(|(k, e)| (k, Component::Symbolic(e)))
            .collect();
        Model::build(entries, Some(spec.params)).map_err(D::Error::custom)
    }
}

/// The comparison a constraint encodes, with the right-hand side moved to
/// zero: `Eq` means `lhs - rhs == 0`, `Ge` means `lhs - rhs >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Eq,
    Ge,
}

/// A scalar constraint bound to a reference model.
///
/// The constraint is rebuilt as a single-output model over `lhs - rhs`,
/// with the reference model's full parameter list forced into its
/// signature so optimizers can call both with the same arguments.
#[derive(Clone, Serialize, Deserialize)]
pub struct Constraint {
    model: Model,
    kind: ConstraintKind,
}

impl Constraint {
    pub fn new(
        lhs: Expr,
        rhs: Expr,
        kind: ConstraintKind,
        reference: &Model,
    ) -> Result<Self, ModelError> {
        let expr = Expr::Sub(Box::new(lhs), Box::new(rhs));
        let model = Model::build(
            vec![(Symbol::output("constraint"), Component::Symbolic(expr))],
            Some(reference.params().to_vec()),
        )?;
        Ok(Self { model, kind })
    }

    /// `lhs <= rhs`, stored as the equivalent `rhs - lhs >= 0`.
    pub fn le(lhs: Expr, rhs: Expr, reference: &Model) -> Result<Self, ModelError> {
        Self::new(rhs, lhs, ConstraintKind::Ge, reference)
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn model(&self) -> &Model {
        &self.model
    }
}

impl Deref for Constraint {
    type Target = Model;

    fn deref(&self) -> &Model {
        &self.model
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn x() -> Symbol {
        Symbol::independent("x")
    }
    fn a() -> Symbol {
        Symbol::parameter("a")
    }
    fn b() -> Symbol {
        Symbol::parameter("b")
    }
    fn y() -> Symbol {
        Symbol::output("y")
    }
    fn z() -> Symbol {
        Symbol::output("z")
    }

    /// y = a^3*x + b^2, z = y^2 + a*b
    fn chain_model() -> Model {
        let y_expr = Expr::from(&a()).pow(3) * Expr::from(&x()) + Expr::from(&b()).pow(2);
        let z_expr = Expr::from(&y()).pow(2) + Expr::from(&a()) * Expr::from(&b());
        Model::new(vec![(y(), y_expr), (z(), z_expr)]).unwrap()
    }

    #[test]
    fn evaluates_simple_model() -> Result<(), ModelError> {
        let model = Model::new(vec![(
            y(),
            Expr::from(&a()) * Expr::from(&x()).pow(2) + Expr::from(&b()),
        )])?;

        let out = model.eval(&[
            ("x", vec![0.0, 1.0, 2.0].into()),
            ("a", 2.0.into()),
            ("b", 1.0.into()),
        ])?;
        let y_vals = out.get("y").unwrap();
        assert_relative_eq!(y_vals[0], 1.0);
        assert_relative_eq!(y_vals[1], 3.0);
        assert_relative_eq!(y_vals[2], 9.0);
        Ok(())
    }

    #[test]
    fn evaluates_interdependent_outputs() -> Result<(), ModelError> {
        let model = chain_model();
        assert_eq!(model.interdependent_vars(), &[y()]);
        assert_eq!(model.eval_order(), &[y(), z()]);

        let out = model.eval(&[("x", 3.0.into()), ("a", 1.0.into()), ("b", 2.0.into())])?;
        assert_relative_eq!(out.get("y").unwrap()[0], 7.0);
        assert_relative_eq!(out.get("z").unwrap()[0], 51.0);
        Ok(())
    }

    #[test]
    fn signature_lists_independent_then_params() {
        let model = chain_model();
        assert_eq!(model.signature().independent(), &[x()]);
        assert_eq!(model.signature().parameters(), &[a(), b()]);
    }

    #[test]
    fn missing_argument_is_reported() {
        let model = chain_model();
        let err = model.eval(&[("x", 3.0.into())]).unwrap_err();
        match err {
            ModelError::MissingArguments(names) => assert_eq!(names, "a, b"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unexpected_argument_is_reported() {
        let model = chain_model();
        let err = model
            .eval(&[
                ("x", 3.0.into()),
                ("a", 1.0.into()),
                ("b", 2.0.into()),
                ("q", 0.0.into()),
            ])
            .unwrap_err();
        assert!(matches!(err, ModelError::UnexpectedArguments(_)));
    }

    #[test]
    fn duplicated_argument_is_reported() {
        let model = chain_model();
        let err = model
            .eval(&[
                ("x", 1.0.into()),
                ("x", 2.0.into()),
                ("a", 1.0.into()),
                ("b", 2.0.into()),
            ])
            .unwrap_err();
        match err {
            ModelError::DuplicateArguments(names) => assert_eq!(names, "x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn array_length_mismatch_is_reported() {
        let model = chain_model();
        let err = model
            .eval(&[
                ("x", vec![1.0, 2.0].into()),
                ("a", vec![1.0, 2.0, 3.0].into()),
                ("b", 2.0.into()),
            ])
            .unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn negation_skips_interdependent_outputs() -> Result<(), ModelError> {
        // {y: a*x^2, z: y^2} -> {y: a*x^2, z: -(y^2)}
        let model = Model::new(vec![
            (y(), Expr::from(&a()) * Expr::from(&x()).pow(2)),
            (z(), Expr::from(&y()).pow(2)),
        ])?;
        let negated = model.negate()?;

        let y_expr = negated.component(&y()).unwrap().as_expr().unwrap();
        let z_expr = negated.component(&z()).unwrap().as_expr().unwrap();
        assert_eq!(*y_expr, Expr::from(&a()) * Expr::from(&x()).pow(2));
        assert_eq!(*z_expr, Expr::Neg(Box::new(Expr::from(&y()).pow(2))));

        let out = negated.eval(&[("x", 2.0.into()), ("a", 1.0.into())])?;
        assert_relative_eq!(out.get("y").unwrap()[0], 4.0);
        assert_relative_eq!(out.get("z").unwrap()[0], -16.0);
        Ok(())
    }

    #[test]
    fn numeric_component_matches_symbolic_signature() -> Result<(), ModelError> {
        let symbolic = Model::new(vec![(
            y(),
            Expr::from(&a()) * Expr::from(&x()) + Expr::from(&b()),
        )])?;

        let fun: NumericFn = Arc::new(|args: &[ArrayView1<f64>]| {
            let (x, a, b) = (&args[0], &args[1], &args[2]);
            a * x + b
        });
        let numeric = Model::from_components(vec![(
            y(),
            Component::Numeric {
                fun,
                inputs: vec![x(), a(), b()],
            },
        )])?;

        assert_eq!(symbolic.signature(), numeric.signature());

        let args: Vec<(&str, InputValue)> = vec![
            ("x", vec![1.0, 2.0].into()),
            ("a", 3.0.into()),
            ("b", 0.5.into()),
        ];
        let s = symbolic.eval(&args)?;
        let n = numeric.eval(&args)?;
        assert_relative_eq!(s.get("y").unwrap()[0], n.get("y").unwrap()[0]);
        assert_relative_eq!(s.get("y").unwrap()[1], n.get("y").unwrap()[1]);
        Ok(())
    }

    #[test]
    fn numeric_component_can_consume_symbolic_output() -> Result<(), ModelError> {
        let fun: NumericFn = Arc::new(|args: &[ArrayView1<f64>]| {
            let y = &args[0];
            y.mapv(|v| v * v)
        });
        let model = Model::from_components(vec![
            (
                y(),
                Component::Symbolic(Expr::from(&a()) * Expr::from(&x())),
            ),
            (
                z(),
                Component::Numeric {
                    fun,
                    inputs: vec![y()],
                },
            ),
        ])?;
        assert_eq!(model.interdependent_vars(), &[y()]);

        let out = model.eval(&[("x", vec![1.0, 2.0].into()), ("a", 3.0.into())])?;
        assert_relative_eq!(out.get("z").unwrap()[0], 9.0);
        assert_relative_eq!(out.get("z").unwrap()[1], 36.0);
        Ok(())
    }

    #[test]
    fn from_strs_parses_and_orders_params() -> Result<(), ModelError> {
        let model = Model::from_strs(&[("y", "a * x^2 + b")], &["a", "b"])?;
        assert_eq!(model.params(), &[a(), b()]);

        let out = model.eval(&[("x", 2.0.into()), ("a", 3.0.into()), ("b", 1.0.into())])?;
        assert_relative_eq!(out.get("y").unwrap()[0], 13.0);
        Ok(())
    }

    #[test]
    fn eval_batch_matches_sequential() -> Result<(), ModelError> {
        let model = chain_model();
        let calls: Vec<Vec<(&str, InputValue)>> = (0..8)
            .map(|i| {
                vec![
                    ("x", (i as f64).into()),
                    ("a", 1.0.into()),
                    ("b", 2.0.into()),
                ]
            })
            .collect();
        let batch = model.eval_batch(&calls)?;
        for (call, out) in calls.iter().zip(&batch) {
            assert_eq!(&model.eval(call)?, out);
        }
        Ok(())
    }

    #[test]
    fn serde_round_trip_preserves_behavior() -> Result<(), Box<dyn std::error::Error>> {
        let model = chain_model();
        let json = serde_json::to_string(&model)?;
        let restored: Model = serde_json::from_str(&json)?;

        assert_eq!(model.signature(), restored.signature());
        assert_eq!(model.connectivity_mapping(), restored.connectivity_mapping());
        assert_eq!(model.eval_order(), restored.eval_order());

        let args: Vec<(&str, InputValue)> =
            vec![("x", 3.0.into()), ("a", 1.0.into()), ("b", 2.0.into())];
        assert_eq!(model.eval(&args)?, restored.eval(&args)?);
        Ok(())
    }

    #[test]
    fn numeric_model_does_not_serialize() {
        let fun: NumericFn = Arc::new(|args: &[ArrayView1<f64>]| args[0].to_owned());
        let model = Model::from_components(vec![(
            y(),
            Component::Numeric {
                fun,
                inputs: vec![x()],
            },
        )])
        .unwrap();
        assert!(serde_json::to_string(&model).is_err());
    }

    #[test]
    fn constraint_takes_reference_params() -> Result<(), ModelError> {
        let model = chain_model();
        // a - 1 >= 0, uses only `a` but carries both params
        let constraint = Constraint::new(
            Expr::from(&a()),
            Expr::Const(1.0),
            ConstraintKind::Ge,
            &model,
        )?;
        assert_eq!(constraint.params(), model.params());

        let out = constraint.eval(&[("a", 3.0.into()), ("b", 0.0.into())])?;
        assert_relative_eq!(out.get("constraint").unwrap()[0], 2.0);
        Ok(())
    }

    #[test]
    fn constraint_le_flips_sides() -> Result<(), ModelError> {
        let model = chain_model();
        // a <= 5  ==  5 - a >= 0
        let constraint = Constraint::le(Expr::from(&a()), Expr::Const(5.0), &model)?;
        assert_eq!(constraint.kind(), ConstraintKind::Ge);

        let out = constraint.eval(&[("a", 3.0.into()), ("b", 0.0.into())])?;
        assert_relative_eq!(out.get("constraint").unwrap()[0], 2.0);
        Ok(())
    }

    #[test]
    fn constraint_serde_round_trip_preserves_behavior() -> Result<(), Box<dyn std::error::Error>>
    {
        let model = chain_model();
        let constraint = Constraint::new(
            Expr::from(&a()),
            Expr::Const(1.0),
            ConstraintKind::Ge,
            &model,
        )?;
        let json = serde_json::to_string(&constraint)?;
        let restored: Constraint = serde_json::from_str(&json)?;

        assert_eq!(constraint.kind(), restored.kind());
        assert_eq!(constraint.signature(), restored.signature());

        let args: Vec<(&str, InputValue)> = vec![("a", 3.0.into()), ("b", 0.0.into())];
        assert_eq!(constraint.eval(&args)?, restored.eval(&args)?);
        Ok(())
    }

    #[test]
    fn constraint_rejects_foreign_params() {
        let model = chain_model();
        let c = Symbol::parameter("c");
        let err = Constraint::new(
            Expr::from(&c),
            Expr::Const(0.0),
            ConstraintKind::Eq,
            &model,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::UnexpectedArguments(_)));
    }
}
