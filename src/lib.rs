//! Symbolic fit models compiled to native code.
//!
//! `modeljit` turns ordered mappings from output symbols to symbolic
//! expressions into fast callable models: it classifies every symbol by role,
//! resolves which outputs feed other outputs, fixes a topological evaluation
//! order, synthesizes an introspectable call signature, and JIT-compiles
//! every expression with Cranelift. Models can then be differentiated
//! symbolically with respect to their parameters, producing Jacobian and
//! Hessian models whose derivatives follow the chain rule through the whole
//! output graph.
//!
//! # Features
//!
//! - **Role-tagged symbols**: independent variables, outputs and parameters
//!   are distinct identities, so dependency analysis needs no global registry
//! - **Interdependent outputs**: outputs may consume other outputs; the
//!   evaluation order is derived, and cycles are rejected at construction
//! - **JIT evaluation**: every symbolic component compiles to native machine
//!   code before the first call
//! - **Exact derivatives**: [`Model::jacobian_model`] and
//!   [`Model::hessian_model`] build new models from symbolic total
//!   derivatives, with Hessian symmetry holding by construction
//! - **Numeric components**: opaque Rust functions slot into a model next to
//!   symbolic outputs, with declared connectivity
//! - **Matrix models**: [`MatrixModel`] evaluates matrix-valued equation sets
//!   (transpose, inverse, matrix product) over the same connectivity
//!   analysis; evaluation-only, since matrix expressions cannot be
//!   differentiated
//! - **ODE models**: [`OdeModel`] evaluates by integrating JIT-compiled
//!   right-hand sides with the Dormand-Prince stepper
//! - **Serialization**: models round-trip through serde and recompile on
//!   restore
//!
//! # Quick start
//!
//! ```
//! use modeljit::{Expr, Model, Symbol};
//!
//! let x = Symbol::independent("x");
//! let (a, b) = (Symbol::parameter("a"), Symbol::parameter("b"));
//! let (y, z) = (Symbol::output("y"), Symbol::output("z"));
//!
//! // y = a^3*x + b^2, z = y^2 + a*b  (z consumes y)
//! let model = Model::new(vec![
//!     (
//!         y.clone(),
//!         Expr::from(&a).pow(3) * Expr::from(&x) + Expr::from(&b).pow(2),
//!     ),
//!     (z, Expr::from(&y).pow(2) + Expr::from(&a) * Expr::from(&b)),
//! ])?;
//!
//! let point = [("x", 3.0.into()), ("a", 1.0.into()), ("b", 2.0.into())];
//! let out = model.eval(&point)?;
//! assert_eq!(out.get("y").unwrap()[0], 7.0);
//! assert_eq!(out.get("z").unwrap()[0], 51.0);
//!
//! // derivatives are chain-rule-correct through y
//! let jacobian = model.jacobian_model()?;
//! let out = jacobian.eval(&point)?;
//! assert_eq!(out.get("d(z)/d(a)").unwrap()[0], 128.0);
//! # Ok::<(), modeljit::ModelError>(())
//! ```
//!
//! Models can also be declared from strings:
//!
//! ```
//! use modeljit::Model;
//!
//! let model = Model::from_strs(&[("y", "a * x^2 + b")], &["a", "b"])?;
//! let out = model.eval(&[("x", 2.0.into()), ("a", 3.0.into()), ("b", 1.0.into())])?;
//! assert_eq!(out.get("y").unwrap()[0], 13.0);
//! # Ok::<(), modeljit::ModelError>(())
//! ```

pub mod builder;
pub mod connectivity;
pub mod convert;
mod deriv;
pub mod errors;
pub mod expr;
pub mod matrix;
pub mod model;
pub mod ode;
mod operators;
pub mod signature;
pub mod symbol;

pub use builder::{CombinedFn, ScalarFn, SlotLayout};
pub use connectivity::Connectivity;
pub use errors::{BuilderError, ConvertError, ModelError};
pub use expr::Expr;
pub use matrix::{MatrixExpr, MatrixModel, MatrixOutput, MatrixValue};
pub use model::{
    Component, Constraint, ConstraintKind, InputValue, Model, ModelOutput, NumericFn,
};
pub use ode::OdeModel;
pub use signature::CallSignature;
pub use symbol::{Parameter, Role, Symbol};
