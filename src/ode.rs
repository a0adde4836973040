//! Models defined by ordinary differential equations.
//!
//! An [`OdeModel`] maps each state to the right-hand side of its first-order
//! equation `d(state)/d(x) = rhs(x, states, params)`, together with initial
//! conditions at a starting point `x0`. Evaluation does not apply the
//! right-hand sides algebraically; it integrates them with the
//! Dormand-Prince stepper from `ode_solvers`, driving a single JIT-compiled
//! function that computes all state derivatives per step.
//!
//! The synthesized signature looks exactly like an algebraic model's (the
//! independent variable, then the parameters), so a fitting loop can swap an
//! `OdeModel` in without changes. Requested evaluation points must be
//! non-decreasing and must not lie before `x0`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use colored::Colorize;
use itertools::Itertools;
use ndarray::Array1;
use ode_solvers::dopri5::Dopri5;
use ode_solvers::{DVector, System};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::builder::{build_combined_function, CombinedFn, SlotLayout};
use crate::errors::ModelError;
use crate::expr::Expr;
use crate::model::{InputValue, ModelOutput};
use crate::signature::CallSignature;
use crate::symbol::{derivative_symbol, Role, Symbol};

const DEFAULT_RTOL: f64 = 1e-6;
const DEFAULT_ATOL: f64 = 1e-9;

/// A first-order ODE system with initial conditions, evaluated by numeric
/// integration.
#[derive(Clone)]
pub struct OdeModel {
    states: Vec<Symbol>,
    rhs_exprs: Vec<Expr>,
    derivative_keys: Vec<Symbol>,
    independent: Symbol,
    initial_x: f64,
    initial_y: Vec<f64>,
    params: Vec<Symbol>,
    signature: CallSignature,
    state_slots: Vec<usize>,
    rhs: CombinedFn,
    rtol: f64,
    atol: f64,
}

impl OdeModel {
    /// Builds an ODE model from `(state, rhs)` pairs, the independent
    /// variable, and initial conditions `state(initial_x) = value`.
    ///
    /// Right-hand sides may reference the independent variable, any state,
    /// and parameters; any other symbol is rejected, since the integrator
    /// has nothing to feed it with.
    pub fn new(
        equations: Vec<(Symbol, Expr)>,
        independent: Symbol,
        initial_x: f64,
        initial_y: &[(Symbol, f64)],
    ) -> Result<Self, ModelError> {
        Self::build(
            equations,
            independent,
            initial_x,
            initial_y,
            DEFAULT_RTOL,
            DEFAULT_ATOL,
        )
    }

    fn build(
        equations: Vec<(Symbol, Expr)>,
        independent: Symbol,
        initial_x: f64,
        initial_y: &[(Symbol, f64)],
        rtol: f64,
        atol: f64,
    ) -> Result<Self, ModelError> {
        let states: Vec<Symbol> = equations.iter().map(|(s, _)| s.clone()).collect();

        for (state, _) in &equations {
            if state.role() == Role::Parameter {
                return Err(ModelError::ParameterAsOutput(state.name().to_string()));
            }
            if states.iter().filter(|s| *s == state).count() > 1 {
                return Err(ModelError::DuplicateOutput(state.name().to_string()));
            }
        }

        let mut params = Vec::new();
        let mut foreign = Vec::new();
        for (_, expr) in &equations {
            for sym in expr.free_symbols() {
                match sym.role() {
                    Role::Parameter => {
                        if !params.contains(&sym) {
                            params.push(sym);
                        }
                    }
                    Role::Independent if sym == independent => {}
                    Role::Output if states.contains(&sym) => {}
                    _ => {
                        if !foreign.contains(&sym) {
                            foreign.push(sym);
                        }
                    }
                }
            }
        }
        if !foreign.is_empty() {
            return Err(ModelError::UnexpectedArguments(
                foreign.iter().map(|s| s.name()).join(", "),
            ));
        }

        let given: HashMap<&Symbol, f64> = initial_y.iter().map(|(s, v)| (s, *v)).collect();
        let missing = states
            .iter()
            .filter(|s| !given.contains_key(s))
            .map(|s| s.name())
            .join(", ");
        if !missing.is_empty() {
            return Err(ModelError::MissingArguments(missing));
        }
        let unknown = initial_y
            .iter()
            .filter(|(s, _)| !states.contains(s))
            .map(|(s, _)| s.name())
            .join(", ");
        if !unknown.is_empty() {
            return Err(ModelError::UnexpectedArguments(unknown));
        }
        let initial_values: Vec<f64> = states.iter().map(|s| given[s]).collect();

        let signature = CallSignature::new(std::slice::from_ref(&independent), &params);

        let mut slots: Vec<Symbol> = signature.args().to_vec();
        slots.extend(states.iter().cloned());
        let layout = SlotLayout::new(slots);
        // states occupy the slots right after the signature arguments
        let state_slots: Vec<usize> = (0..states.len()).map(|i| signature.len() + i).collect();

        let rhs_exprs: Vec<Expr> = equations.into_iter().map(|(_, e)| e).collect();
        let rhs = build_combined_function(&rhs_exprs, &layout)?;

        let derivative_keys = states
            .iter()
            .map(|s| derivative_symbol(s, std::slice::from_ref(&independent)))
            .collect();

        Ok(Self {
            states,
            rhs_exprs,
            derivative_keys,
            independent,
            initial_x,
            initial_y: initial_values,
            params,
            signature,
            state_slots,
            rhs,
            rtol,
            atol,
        })
    }

    /// Replaces the integrator tolerances (defaults: rtol 1e-6, atol 1e-9).
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    pub fn signature(&self) -> &CallSignature {
        &self.signature
    }

    /// The states, in declaration order. These are the output keys of
    /// evaluation results.
    pub fn states(&self) -> &[Symbol] {
        &self.states
    }

    /// The `d(state)/d(x)` symbols naming each equation.
    pub fn derivative_keys(&self) -> &[Symbol] {
        &self.derivative_keys
    }

    pub fn independent_var(&self) -> &Symbol {
        &self.independent
    }

    pub fn params(&self) -> &[Symbol] {
        &self.params
    }

    /// The initial point and the state values there, in state order.
    pub fn initial(&self) -> (f64, &[f64]) {
        (self.initial_x, &self.initial_y)
    }

    /// Integrates the system to every requested point and returns one array
    /// per state.
    ///
    /// The independent variable may be a scalar or a non-decreasing array
    /// starting at or after `x0`; parameters must be scalars.
    pub fn eval(&self, args: &[(&str, InputValue)]) -> Result<ModelOutput, ModelError> {
        let names: Vec<&str> = args.iter().map(|(name, _)| *name).collect();
        let order = self.signature.bind_order(&names)?;
        let bound: Vec<&InputValue> = order.iter().map(|&i| &args[i].1).collect();

        let xs: Vec<f64> = match bound[0] {
            InputValue::Scalar(v) => vec![*v],
            InputValue::Array(arr) => arr.to_vec(),
        };
        if xs.iter().any(|&x| x < self.initial_x) {
            return Err(ModelError::IntegrationRange(format!(
                "requested point lies before the initial point {}",
                self.initial_x
            )));
        }
        if xs.windows(2).any(|w| w[0] > w[1]) {
            return Err(ModelError::IntegrationRange(
                "requested points must be non-decreasing".to_string(),
            ));
        }

        // buffer template: independent + params fixed, states updated per step
        let layout_len = self.signature.len() + self.states.len();
        let mut template = vec![0.0; layout_len];
        for (slot, value) in bound.iter().enumerate().skip(1) {
            match value {
                InputValue::Scalar(v) => template[slot] = *v,
                InputValue::Array(arr) => {
                    return Err(ModelError::ShapeMismatch {
                        name: self.signature.args()[slot].name().to_string(),
                        expected: 1,
                        got: arr.len(),
                    });
                }
            }
        }

        let mut x_cur = self.initial_x;
        let mut y_cur = self.initial_y.clone();
        let mut trajectory: Vec<Vec<f64>> = vec![Vec::with_capacity(xs.len()); self.states.len()];

        for &x_next in &xs {
            if x_next > x_cur {
                y_cur = self.integrate_segment(&template, x_cur, x_next, &y_cur)?;
                x_cur = x_next;
            }
            for (state_idx, series) in trajectory.iter_mut().enumerate() {
                series.push(y_cur[state_idx]);
            }
        }

        let values = trajectory.into_iter().map(Array1::from).collect();
        Ok(ModelOutput::new(self.states.clone(), values))
    }

    fn integrate_segment(
        &self,
        template: &[f64],
        x_from: f64,
        x_to: f64,
        y_from: &[f64],
    ) -> Result<Vec<f64>, ModelError> {
        let system = RhsSystem {
            rhs: &self.rhs,
            buf: RefCell::new(template.to_vec()),
            out: RefCell::new(vec![0.0; self.states.len()]),
            state_slots: &self.state_slots,
        };
        let y0 = DVector::from_vec(y_from.to_vec());

        let mut stepper = Dopri5::new(system, x_from, x_to, x_to - x_from, y0, self.rtol, self.atol);
        stepper
            .integrate()
            .map_err(|e| ModelError::IntegrationFailed(e.to_string()))?;

        match stepper.y_out().last() {
            Some(y) => Ok(y.iter().copied().collect()),
            None => Err(ModelError::IntegrationFailed(
                "integrator produced no output".to_string(),
            )),
        }
    }

    /// Returns the model with every right-hand side negated. Unlike
    /// algebraic models there is no selectivity here: the states are coupled
    /// through the integrator, so negation applies to the whole system.
    pub fn negate(&self) -> Result<OdeModel, ModelError> {
        let equations = self
            .states
            .iter()
            .cloned()
            .zip(
                self.rhs_exprs
                    .iter()
                    .map(|e| Expr::Neg(Box::new(e.clone()))),
            )
            .collect();
        let initial_y: Vec<(Symbol, f64)> = self
            .states
            .iter()
            .cloned()
            .zip(self.initial_y.iter().copied())
            .collect();
        Self::build(
            equations,
            self.independent.clone(),
            self.initial_x,
            &initial_y,
            self.rtol,
            self.atol,
        )
    }
}

struct RhsSystem<'a> {
    rhs: &'a CombinedFn,
    buf: RefCell<Vec<f64>>,
    out: RefCell<Vec<f64>>,
    state_slots: &'a [usize],
}

impl System<f64, DVector<f64>> for RhsSystem<'_> {
    fn system(&self, x: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        let mut buf = self.buf.borrow_mut();
        buf[0] = x;
        for (i, &slot) in self.state_slots.iter().enumerate() {
            buf[slot] = y[i];
        }
        let mut out = self.out.borrow_mut();
        (self.rhs)(&buf, &mut out);
        for (i, v) in out.iter().enumerate() {
            dy[i] = *v;
        }
    }
}

impl fmt::Display for OdeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, expr) in self.derivative_keys.iter().zip(&self.rhs_exprs) {
            writeln!(f, "{} = {}", key.name().cyan(), expr)?;
        }
        Ok(())
    }
}

impl fmt::Debug for OdeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdeModel")
            .field("states", &self.states)
            .field("independent", &self.independent)
            .field("initial_x", &self.initial_x)
            .field("initial_y", &self.initial_y)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize)]
struct OdeModelSpec {
    equations: Vec<(Symbol, Expr)>,
    independent: Symbol,
    initial_x: f64,
    initial_y: Vec<(Symbol, f64)>,
    rtol: f64,
    atol: f64,
}

impl Serialize for OdeModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        OdeModelSpec {
            equations: self
                .states
                .iter()
                .cloned()
                .zip(self.rhs_exprs.iter().cloned())
                .collect(),
            independent: self.independent.clone(),
            initial_x: self.initial_x,
            initial_y: self
                .states
                .iter()
                .cloned()
                .zip(self.initial_y.iter().copied())
                .collect(),
            rtol: self.rtol,
            atol: self.atol,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OdeModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let spec = OdeModelSpec::deserialize(deserializer)?;
        OdeModel::build(
            spec.equations,
            spec.independent,
            spec.initial_x,
            &spec.initial_y,
            spec.rtol,
            spec.atol,
        )
        .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn t() -> Symbol {
        Symbol::independent("t")
    }
    fn k() -> Symbol {
        Symbol::parameter("k")
    }

    /// d(y)/d(t) = -k * y, y(0) = 1
    fn decay() -> OdeModel {
        let y = Symbol::output("y");
        let rhs = Expr::Neg(Box::new(Expr::from(&k()) * Expr::from(&y)));
        OdeModel::new(vec![(y.clone(), rhs)], t(), 0.0, &[(y, 1.0)]).unwrap()
    }

    #[test]
    fn derivative_keys_and_signature() {
        let model = decay();
        assert_eq!(model.derivative_keys()[0].name(), "d(y)/d(t)");
        assert_eq!(model.signature().independent(), &[t()]);
        assert_eq!(model.signature().parameters(), &[k()]);
    }

    #[test]
    fn integrates_exponential_decay() -> Result<(), ModelError> {
        let model = decay();
        let out = model.eval(&[
            ("t", vec![0.0, 0.5, 1.0, 2.0].into()),
            ("k", 0.3.into()),
        ])?;
        let y = out.get("y").unwrap();
        for (i, &x) in [0.0f64, 0.5, 1.0, 2.0].iter().enumerate() {
            assert_relative_eq!(y[i], (-0.3 * x).exp(), epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn integrates_coupled_states() -> Result<(), ModelError> {
        // A -> B: d(a)/d(t) = -k*a, d(b)/d(t) = k*a
        let a = Symbol::output("a");
        let b = Symbol::output("b");
        let model = OdeModel::new(
            vec![
                (
                    a.clone(),
                    Expr::Neg(Box::new(Expr::from(&k()) * Expr::from(&a))),
                ),
                (b.clone(), Expr::from(&k()) * Expr::from(&a)),
            ],
            t(),
            0.0,
            &[(a, 1.0), (b, 0.0)],
        )?;

        let out = model.eval(&[("t", vec![1.0, 3.0].into()), ("k", 0.5.into())])?;
        let a_vals = out.get("a").unwrap();
        let b_vals = out.get("b").unwrap();
        for i in 0..2 {
            // mass conservation and the analytic solution
            assert_relative_eq!(a_vals[i] + b_vals[i], 1.0, epsilon = 1e-6);
        }
        assert_relative_eq!(a_vals[0], (-0.5f64).exp(), epsilon = 1e-5);
        assert_relative_eq!(b_vals[1], 1.0 - (-1.5f64).exp(), epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn rejects_points_before_the_initial_point() {
        let model = decay();
        let err = model
            .eval(&[("t", vec![-1.0, 1.0].into()), ("k", 0.3.into())])
            .unwrap_err();
        assert!(matches!(err, ModelError::IntegrationRange(_)));
    }

    #[test]
    fn rejects_decreasing_points() {
        let model = decay();
        let err = model
            .eval(&[("t", vec![1.0, 0.5].into()), ("k", 0.3.into())])
            .unwrap_err();
        assert!(matches!(err, ModelError::IntegrationRange(_)));
    }

    #[test]
    fn rejects_array_valued_parameters() {
        let model = decay();
        let err = model
            .eval(&[("t", 1.0.into()), ("k", vec![0.3, 0.4].into())])
            .unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn rejects_missing_initial_condition() {
        let y = Symbol::output("y");
        let z = Symbol::output("z");
        let err = OdeModel::new(
            vec![
                (y.clone(), Expr::from(&k()) * Expr::from(&z)),
                (z, Expr::from(&y)),
            ],
            t(),
            0.0,
            &[(y, 1.0)],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::MissingArguments(_)));
    }

    #[test]
    fn rejects_undefined_symbols_in_rhs() {
        let y = Symbol::output("y");
        let w = Symbol::independent("w");
        let err = OdeModel::new(
            vec![(y.clone(), Expr::from(&w) * Expr::from(&y))],
            t(),
            0.0,
            &[(y, 1.0)],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::UnexpectedArguments(_)));
    }

    #[test]
    fn negation_flips_every_equation() -> Result<(), ModelError> {
        // negated decay grows as exp(+k*t)
        let negated = decay().negate()?;
        let out = negated.eval(&[("t", 1.0.into()), ("k", 0.3.into())])?;
        assert_relative_eq!(out.get("y").unwrap()[0], 0.3f64.exp(), epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn serde_round_trip_preserves_behavior() -> Result<(), Box<dyn std::error::Error>> {
        let model = decay();
        let json = serde_json::to_string(&model)?;
        let restored: OdeModel = serde_json::from_str(&json)?;

        assert_eq!(model.signature(), restored.signature());
        assert_eq!(model.states(), restored.states());

        let args: Vec<(&str, InputValue)> =
            vec![("t", vec![0.5, 1.0].into()), ("k", 0.3.into())];
        let a = model.eval(&args)?;
        let b = restored.eval(&args)?;
        assert_relative_eq!(
            a.get("y").unwrap()[1],
            b.get("y").unwrap()[1],
            epsilon = 1e-12
        );
        Ok(())
    }
}
