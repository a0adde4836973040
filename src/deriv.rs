//! Jacobian and Hessian models.
//!
//! Differentiation produces new [`Model`]s rather than raw expressions: the
//! derivative of each output with respect to each parameter becomes an
//! output of its own, named canonically (`d(z)/d(a)`, `d^2(z)/d(a)d(b)`),
//! followed by the original outputs so the derivative model can also report
//! base values. Connectivity is recomputed from scratch on the new mapping.
//!
//! Because outputs may consume other outputs, the partial derivative of an
//! expression is not the whole story. The total derivative adds one chain
//! term per consumed output:
//!
//! ```text
//! D(z, p) = dz/dp + sum over consumed outputs u of dz/du * D(u, p)
//! ```
//!
//! The inner `D(u, p)` is a reference to the derivative output of `u`, so
//! the dependency analyzer orders everything bottom-up automatically.
//!
//! Mixed second partials are generated once per unordered parameter pair,
//! with the pair sorted into parameter order. Symmetry of the Hessian holds
//! by construction instead of by cancellation.

use std::collections::HashMap;

use crate::errors::ModelError;
use crate::expr::Expr;
use crate::model::{Component, Model};
use crate::symbol::{derivative_symbol, Symbol};

/// A differentiable output tracked through the chain rule: the original
/// output it derives from and the parameters it was differentiated by, as
/// positions into the parameter list. Index order is canonical order.
type TrackedOutputs = HashMap<Symbol, (Symbol, Vec<usize>)>;

impl Model {
    /// Builds the model of all first partial derivatives with respect to the
    /// parameters, honoring the chain rule through interdependent outputs.
    ///
    /// The resulting model carries one output per (output, parameter) pair
    /// plus the original outputs, and shares this model's signature.
    pub fn jacobian_model(&self) -> Result<Model, ModelError> {
        let exprs = symbolic_components(self)?;
        let params = self.params().to_vec();
        let tracked = base_tracked(self);

        let (jac_entries, _) = first_order_entries(self, &exprs, &params, &tracked);

        let mut entries: Vec<(Symbol, Component)> = jac_entries
            .iter()
            .map(|(sym, expr)| (sym.clone(), Component::Symbolic(expr.clone())))
            .collect();
        entries.extend(self.entries().iter().cloned());

        Model::build(entries, Some(params))
    }

    /// Builds the model of all second partial derivatives with respect to
    /// the parameters. Each unordered parameter pair appears once, under its
    /// canonical name; the first derivatives and the original outputs are
    /// included as well, since the second-order chain terms reference them.
    pub fn hessian_model(&self) -> Result<Model, ModelError> {
        let exprs = symbolic_components(self)?;
        let params = self.params().to_vec();
        let tracked = base_tracked(self);

        let (jac_entries, jac_meta) = first_order_entries(self, &exprs, &params, &tracked);

        // second pass differentiates the first derivatives, with both the
        // original interdependent outputs and the first derivatives tracked
        let mut tracked2 = tracked;
        tracked2.extend(jac_meta);

        let jac_by_symbol: HashMap<Symbol, Expr> = jac_entries.iter().cloned().collect();

        let mut entries: Vec<(Symbol, Component)> = Vec::new();
        for key in self.output_vars() {
            for (i, p) in params.iter().enumerate() {
                let first = &jac_by_symbol[&derivative_symbol(key, std::slice::from_ref(p))];
                // q runs from p onward, so (p, q) is already the canonical pair
                for (j, q) in params.iter().enumerate().skip(i) {
                    let second = total_derivative(first, q, j, &tracked2, &params);
                    let sym = derivative_symbol(key, &[p.clone(), q.clone()]);
                    entries.push((sym, Component::Symbolic(second)));
                }
            }
        }
        entries.extend(
            jac_entries
                .into_iter()
                .map(|(sym, expr)| (sym, Component::Symbolic(expr))),
        );
        entries.extend(self.entries().iter().cloned());

        Model::build(entries, Some(params))
    }
}

/// Collects the expression behind every output, failing on the first
/// numeric component.
fn symbolic_components(model: &Model) -> Result<HashMap<Symbol, Expr>, ModelError> {
    model
        .entries()
        .iter()
        .map(|(key, component)| match component.as_expr() {
            Some(expr) => Ok((key.clone(), expr.clone())),
            None => Err(ModelError::NotDifferentiable(key.name().to_string())),
        })
        .collect()
}

/// The interdependent outputs of the base model, tracked with no
/// differentiation applied yet.
fn base_tracked(model: &Model) -> TrackedOutputs {
    model
        .interdependent_vars()
        .iter()
        .map(|u| (u.clone(), (u.clone(), Vec::new())))
        .collect()
}

/// Generates the first-order derivative entries, output-major then
/// parameter-major, plus the tracking metadata for a second pass.
fn first_order_entries(
    model: &Model,
    exprs: &HashMap<Symbol, Expr>,
    params: &[Symbol],
    tracked: &TrackedOutputs,
) -> (Vec<(Symbol, Expr)>, TrackedOutputs) {
    let mut entries = Vec::with_capacity(model.output_vars().len() * params.len());
    let mut meta = TrackedOutputs::new();

    for key in model.output_vars() {
        for (i, p) in params.iter().enumerate() {
            let d = total_derivative(&exprs[key], p, i, tracked, params);
            let sym = derivative_symbol(key, std::slice::from_ref(p));
            meta.insert(sym.clone(), (key.clone(), vec![i]));
            entries.push((sym, d));
        }
    }
    (entries, meta)
}

/// The total derivative of `expr` with respect to parameter `p` (position
/// `p_idx` in the parameter list): the direct partial plus one chain term per
/// tracked output the expression consumes.
fn total_derivative(
    expr: &Expr,
    p: &Symbol,
    p_idx: usize,
    tracked: &TrackedOutputs,
    params: &[Symbol],
) -> Expr {
    let mut result = *expr.derivative(p);
    for sym in expr.free_symbols() {
        if let Some((base, wrts)) = tracked.get(&sym) {
            let mut order = wrts.clone();
            order.push(p_idx);
            order.sort_unstable();
            let by: Vec<Symbol> = order.iter().map(|&i| params[i].clone()).collect();

            let chain = Expr::Mul(
                expr.derivative(&sym),
                Box::new(Expr::Var(derivative_symbol(base, &by))),
            );
            result = Expr::Add(Box::new(result), Box::new(chain));
        }
    }
    *result.simplify()
}
