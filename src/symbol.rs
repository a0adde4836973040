//! Symbols and their roles.
//!
//! Every name appearing in a model is a [`Symbol`] carrying one of three
//! roles: an independent variable supplied by the caller, an output produced
//! by the model, or a tunable parameter. Two symbols are equal iff both name
//! and role match, so symbols survive serialization without any global
//! registry.
//!
//! [`Parameter`] wraps a parameter symbol together with the mutable state an
//! optimizer works on: current value, optional bounds and a fixed flag.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The role a symbol plays inside a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// A named input supplied by the caller, never produced by the model
    Independent,
    /// A model output; may be consumed by other outputs (interdependent)
    Output,
    /// A tunable numeric input adjusted by an external optimizer
    Parameter,
}

/// An atomic named entity with a role. Identity is (name, role).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    name: String,
    role: Role,
}

impl Symbol {
    /// Creates an independent-variable symbol.
    pub fn independent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Independent,
        }
    }

    /// Creates an output symbol, usable as a model key or as a reference to
    /// another output inside an expression.
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Output,
        }
    }

    /// Creates a parameter symbol.
    pub fn parameter(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Parameter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Builds the output symbol naming a partial derivative.
///
/// `wrt` lists the differentiation variables in canonical order; repeated
/// entries produce power notation. Examples: `d(z)/d(a)`,
/// `d^2(z)/d(a)d(b)`, `d^2(z)/d(a)^2`.
pub(crate) fn derivative_symbol(base: &Symbol, wrt: &[Symbol]) -> Symbol {
    debug_assert!(!wrt.is_empty());
    let order = wrt.len();
    let mut denom = String::new();
    let mut i = 0;
    while i < wrt.len() {
        let mut run = 1;
        while i + run < wrt.len() && wrt[i + run] == wrt[i] {
            run += 1;
        }
        denom.push_str(&format!("d({})", wrt[i].name()));
        if run > 1 {
            denom.push_str(&format!("^{run}"));
        }
        i += run;
    }
    let name = if order == 1 {
        format!("d({})/{}", base.name(), denom)
    } else {
        format!("d^{}({})/{}", order, base.name(), denom)
    };
    Symbol::output(name)
}

/// A parameter symbol together with the numeric state an optimizer adjusts.
///
/// The symbol itself is immutable; `value`, the bounds and `fixed` are
/// deliberately mutable so fitting code can update them in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    symbol: Symbol,
    /// Current (or initial guess) value
    pub value: f64,
    /// Optional lower bound
    pub min: Option<f64>,
    /// Optional upper bound
    pub max: Option<f64>,
    /// When true, optimizers must not adjust this parameter
    pub fixed: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            symbol: Symbol::parameter(name),
            value: 1.0,
            min: None,
            max: None,
            fixed: false,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        self.symbol.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_compare_by_name_and_role() {
        assert_eq!(Symbol::parameter("a"), Symbol::parameter("a"));
        assert_ne!(Symbol::parameter("a"), Symbol::independent("a"));
        assert_ne!(Symbol::output("a"), Symbol::output("b"));
    }

    #[test]
    fn derivative_symbol_names() {
        let z = Symbol::output("z");
        let a = Symbol::parameter("a");
        let b = Symbol::parameter("b");

        assert_eq!(derivative_symbol(&z, &[a.clone()]).name(), "d(z)/d(a)");
        assert_eq!(
            derivative_symbol(&z, &[a.clone(), b.clone()]).name(),
            "d^2(z)/d(a)d(b)"
        );
        assert_eq!(
            derivative_symbol(&z, &[a.clone(), a.clone()]).name(),
            "d^2(z)/d(a)^2"
        );
    }

    #[test]
    fn parameter_defaults() {
        let p = Parameter::new("k").with_value(2.5).with_bounds(Some(0.0), None);
        assert_eq!(p.name(), "k");
        assert_eq!(p.value, 2.5);
        assert_eq!(p.min, Some(0.0));
        assert_eq!(p.max, None);
        assert!(!p.fixed);
        assert_eq!(p.symbol().role(), Role::Parameter);
    }
}
