//! Expression trees over role-tagged symbols.
//!
//! [`Expr`] is the symbolic representation behind every model output. It is
//! built recursively with `Box<Expr>` children and supports:
//!
//! - free-symbol extraction in first-appearance order (the basis of
//!   connectivity analysis)
//! - symbolic partial differentiation with respect to any symbol
//! - algebraic simplification (constant folding, identities, exponent rules)
//! - structural equality and serde round trips
//!
//! Operator overloading and method-style functions (`exp()`, `ln()`, ...)
//! allow models to be written directly in Rust:
//!
//! ```
//! use modeljit::{Expr, Symbol};
//!
//! let x = Symbol::independent("x");
//! let a = Symbol::parameter("a");
//! let rhs = Expr::from(&a) * Expr::from(&x).pow(2);
//! assert_eq!(rhs.to_string(), "(a * (x^2))");
//! ```

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

/// An expression tree node.
///
/// Leaves are constants and symbol references; inner nodes are arithmetic,
/// powers and the elementary functions the JIT backend can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A constant floating point value
    Const(f64),
    /// A reference to a symbol (independent variable, parameter or output)
    Var(Symbol),
    /// Addition of two expressions
    Add(Box<Expr>, Box<Expr>),
    /// Subtraction of two expressions
    Sub(Box<Expr>, Box<Expr>),
    /// Multiplication of two expressions
    Mul(Box<Expr>, Box<Expr>),
    /// Division of two expressions
    Div(Box<Expr>, Box<Expr>),
    /// Negation of an expression
    Neg(Box<Expr>),
    /// Absolute value of an expression
    Abs(Box<Expr>),
    /// Exponentiation by an integer constant
    Pow(Box<Expr>, i64),
    /// Exponentiation by a floating point constant
    PowFloat(Box<Expr>, f64),
    /// Exponentiation by another expression
    PowExpr(Box<Expr>, Box<Expr>),
    /// Exponential function
    Exp(Box<Expr>),
    /// Natural logarithm
    Ln(Box<Expr>),
    /// Square root
    Sqrt(Box<Expr>),
    /// Sine (radians)
    Sin(Box<Expr>),
    /// Cosine (radians)
    Cos(Box<Expr>),
}

impl Expr {
    /// Returns the symbols referenced by this expression, in first-appearance
    /// order with duplicates removed. The ordering is what makes connectivity
    /// analysis and signature synthesis deterministic.
    pub fn free_symbols(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut Vec<Symbol>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(sym) => {
                if !out.contains(sym) {
                    out.push(sym.clone());
                }
            }
            Expr::Add(l, r)
            | Expr::Sub(l, r)
            | Expr::Mul(l, r)
            | Expr::Div(l, r)
            | Expr::PowExpr(l, r) => {
                l.collect_symbols(out);
                r.collect_symbols(out);
            }
            Expr::Neg(e)
            | Expr::Abs(e)
            | Expr::Exp(e)
            | Expr::Ln(e)
            | Expr::Sqrt(e)
            | Expr::Sin(e)
            | Expr::Cos(e) => e.collect_symbols(out),
            Expr::Pow(b, _) | Expr::PowFloat(b, _) => b.collect_symbols(out),
        }
    }

    /// True if `sym` appears anywhere in this expression.
    pub fn depends_on(&self, sym: &Symbol) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Var(s) => s == sym,
            Expr::Add(l, r)
            | Expr::Sub(l, r)
            | Expr::Mul(l, r)
            | Expr::Div(l, r)
            | Expr::PowExpr(l, r) => l.depends_on(sym) || r.depends_on(sym),
            Expr::Neg(e)
            | Expr::Abs(e)
            | Expr::Exp(e)
            | Expr::Ln(e)
            | Expr::Sqrt(e)
            | Expr::Sin(e)
            | Expr::Cos(e) => e.depends_on(sym),
            Expr::Pow(b, _) | Expr::PowFloat(b, _) => b.depends_on(sym),
        }
    }

    /// Computes the symbolic partial derivative of this expression with
    /// respect to `wrt`, treating every other symbol as constant.
    ///
    /// The usual calculus rules are applied recursively: sum, product and
    /// quotient rules, the power rules and the chain rule through the
    /// elementary functions.
    pub fn derivative(&self, wrt: &Symbol) -> Box<Expr> {
        match self {
            Expr::Const(_) => Box::new(Expr::Const(0.0)),

            Expr::Var(sym) => {
                if sym == wrt {
                    Box::new(Expr::Const(1.0))
                } else {
                    Box::new(Expr::Const(0.0))
                }
            }

            // d(f + g) = df + dg
            Expr::Add(l, r) => Box::new(Expr::Add(l.derivative(wrt), r.derivative(wrt))),

            // d(f - g) = df - dg
            Expr::Sub(l, r) => Box::new(Expr::Sub(l.derivative(wrt), r.derivative(wrt))),

            // d(f * g) = f * dg + g * df
            Expr::Mul(l, r) => Box::new(Expr::Add(
                Box::new(Expr::Mul(l.clone(), r.derivative(wrt))),
                Box::new(Expr::Mul(r.clone(), l.derivative(wrt))),
            )),

            // d(f / g) = (g * df - f * dg) / g^2
            Expr::Div(l, r) => Box::new(Expr::Div(
                Box::new(Expr::Sub(
                    Box::new(Expr::Mul(r.clone(), l.derivative(wrt))),
                    Box::new(Expr::Mul(l.clone(), r.derivative(wrt))),
                )),
                Box::new(Expr::Pow(r.clone(), 2)),
            )),

            Expr::Neg(e) => Box::new(Expr::Neg(e.derivative(wrt))),

            // d|f| = f/|f| * df
            Expr::Abs(e) => Box::new(Expr::Mul(
                Box::new(Expr::Div(e.clone(), Box::new(Expr::Abs(e.clone())))),
                e.derivative(wrt),
            )),

            // d(f^n) = n * f^(n-1) * df
            Expr::Pow(b, n) => Box::new(Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(*n as f64)),
                    Box::new(Expr::Pow(b.clone(), n - 1)),
                )),
                b.derivative(wrt),
            )),

            // d(f^c) = c * f^(c-1) * df
            Expr::PowFloat(b, c) => Box::new(Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(*c)),
                    Box::new(Expr::PowFloat(b.clone(), c - 1.0)),
                )),
                b.derivative(wrt),
            )),

            // d(f^g) = f^g * (dg * ln(f) + g * df / f)
            Expr::PowExpr(b, e) => Box::new(Expr::Mul(
                Box::new(Expr::PowExpr(b.clone(), e.clone())),
                Box::new(Expr::Add(
                    Box::new(Expr::Mul(e.derivative(wrt), Box::new(Expr::Ln(b.clone())))),
                    Box::new(Expr::Mul(
                        e.clone(),
                        Box::new(Expr::Div(b.derivative(wrt), b.clone())),
                    )),
                )),
            )),

            // d(e^f) = e^f * df
            Expr::Exp(e) => Box::new(Expr::Mul(
                Box::new(Expr::Exp(e.clone())),
                e.derivative(wrt),
            )),

            // d(ln f) = df / f
            Expr::Ln(e) => Box::new(Expr::Div(e.derivative(wrt), e.clone())),

            // d(sqrt f) = df / (2 * sqrt f)
            Expr::Sqrt(e) => Box::new(Expr::Div(
                e.derivative(wrt),
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(2.0)),
                    Box::new(Expr::Sqrt(e.clone())),
                )),
            )),

            // d(sin f) = cos(f) * df
            Expr::Sin(e) => Box::new(Expr::Mul(
                Box::new(Expr::Cos(e.clone())),
                e.derivative(wrt),
            )),

            // d(cos f) = -sin(f) * df
            Expr::Cos(e) => Box::new(Expr::Mul(
                Box::new(Expr::Neg(Box::new(Expr::Sin(e.clone())))),
                e.derivative(wrt),
            )),
        }
    }

    /// Simplifies the expression by folding constants and applying basic
    /// algebraic rules. Derivative trees in particular are full of `* 1` and
    /// `+ 0` noise; this keeps the compiled code and the printed form sane.
    pub fn simplify(&self) -> Box<Expr> {
        match self {
            Expr::Const(_) | Expr::Var(_) => Box::new(self.clone()),

            Expr::Add(l, r) => {
                let l = l.simplify();
                let r = r.simplify();
                match (&*l, &*r) {
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a + b)),
                    // x + 0 -> x
                    (e, Expr::Const(c)) | (Expr::Const(c), e) if *c == 0.0 => Box::new(e.clone()),
                    _ => Box::new(Expr::Add(l, r)),
                }
            }

            Expr::Sub(l, r) => {
                let l = l.simplify();
                let r = r.simplify();
                match (&*l, &*r) {
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a - b)),
                    // x - 0 -> x
                    (e, Expr::Const(c)) if *c == 0.0 => Box::new(e.clone()),
                    // 0 - x -> -x
                    (Expr::Const(c), e) if *c == 0.0 => Box::new(Expr::Neg(Box::new(e.clone()))),
                    // x - x -> 0
                    (a, b) if a == b => Box::new(Expr::Const(0.0)),
                    _ => Box::new(Expr::Sub(l, r)),
                }
            }

            Expr::Mul(l, r) => {
                let l = l.simplify();
                let r = r.simplify();
                match (&*l, &*r) {
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a * b)),
                    // x * 0 -> 0
                    (_, Expr::Const(c)) | (Expr::Const(c), _) if *c == 0.0 => {
                        Box::new(Expr::Const(0.0))
                    }
                    // x * 1 -> x
                    (e, Expr::Const(c)) | (Expr::Const(c), e) if *c == 1.0 => Box::new(e.clone()),
                    // x * -1 -> -x
                    (e, Expr::Const(c)) | (Expr::Const(c), e) if *c == -1.0 => {
                        Box::new(Expr::Neg(Box::new(e.clone())))
                    }
                    // x * x -> x^2
                    (a, b) if a == b => Box::new(Expr::Pow(Box::new(a.clone()), 2)),
                    // x^a * x^b -> x^(a+b)
                    (Expr::Pow(b1, e1), Expr::Pow(b2, e2)) if b1 == b2 => {
                        Box::new(Expr::Pow(b1.clone(), e1 + e2))
                    }
                    _ => Box::new(Expr::Mul(l, r)),
                }
            }

            Expr::Div(l, r) => {
                let l = l.simplify();
                let r = r.simplify();
                match (&*l, &*r) {
                    (Expr::Const(a), Expr::Const(b)) if *b != 0.0 => Box::new(Expr::Const(a / b)),
                    // 0 / x -> 0
                    (Expr::Const(c), _) if *c == 0.0 => Box::new(Expr::Const(0.0)),
                    // x / 1 -> x
                    (e, Expr::Const(c)) if *c == 1.0 => Box::new(e.clone()),
                    // x / x -> 1
                    (a, b) if a == b => Box::new(Expr::Const(1.0)),
                    // x^a / x^b -> x^(a-b)
                    (Expr::Pow(b1, e1), Expr::Pow(b2, e2)) if b1 == b2 => {
                        Box::new(Expr::Pow(b1.clone(), e1 - e2))
                    }
                    _ => Box::new(Expr::Div(l, r)),
                }
            }

            Expr::Neg(e) => {
                let e = e.simplify();
                match &*e {
                    Expr::Const(a) => Box::new(Expr::Const(-a)),
                    // -(-x) -> x
                    Expr::Neg(inner) => inner.clone(),
                    _ => Box::new(Expr::Neg(e)),
                }
            }

            Expr::Abs(e) => {
                let e = e.simplify();
                match &*e {
                    Expr::Const(a) => Box::new(Expr::Const(a.abs())),
                    // ||x|| -> |x|
                    Expr::Abs(inner) => Box::new(Expr::Abs(inner.clone())),
                    // |-x| -> |x|
                    Expr::Neg(inner) => Box::new(Expr::Abs(inner.clone())),
                    _ => Box::new(Expr::Abs(e)),
                }
            }

            Expr::Pow(b, n) => {
                let b = b.simplify();
                match (&*b, n) {
                    // x^0 -> 1, 0^0 = 1 by convention
                    (_, 0) => Box::new(Expr::Const(1.0)),
                    (expr, 1) => Box::new(expr.clone()),
                    (Expr::Const(a), n) => Box::new(Expr::Const(a.powi(*n as i32))),
                    // (x^a)^b -> x^(a*b)
                    (Expr::Pow(inner, m), n) => Box::new(Expr::Pow(inner.clone(), m * n)),
                    _ => Box::new(Expr::Pow(b, *n)),
                }
            }

            Expr::PowFloat(b, c) => {
                let b = b.simplify();
                match (&*b, c) {
                    (_, c) if *c == 0.0 => Box::new(Expr::Const(1.0)),
                    (expr, c) if *c == 1.0 => Box::new(expr.clone()),
                    (Expr::Const(a), c) => Box::new(Expr::Const(a.powf(*c))),
                    // integral exponents go through the cheaper Pow path
                    (expr, c) if c.fract() == 0.0 => {
                        Box::new(Expr::Pow(Box::new(expr.clone()), *c as i64))
                    }
                    _ => Box::new(Expr::PowFloat(b, *c)),
                }
            }

            Expr::PowExpr(b, e) => {
                let b = b.simplify();
                let e = e.simplify();
                match (&*b, &*e) {
                    (Expr::Const(a), Expr::Const(c)) => Box::new(Expr::Const(a.powf(*c))),
                    (expr, Expr::Const(c)) if c.fract() == 0.0 => {
                        Box::new(Expr::Pow(Box::new(expr.clone()), *c as i64)).simplify()
                    }
                    (expr, Expr::Const(c)) => Box::new(Expr::PowFloat(Box::new(expr.clone()), *c)),
                    _ => Box::new(Expr::PowExpr(b, e)),
                }
            }

            Expr::Exp(e) => {
                let e = e.simplify();
                match &*e {
                    Expr::Const(a) => Box::new(Expr::Const(a.exp())),
                    // exp(ln x) -> x
                    Expr::Ln(inner) => inner.clone(),
                    _ => Box::new(Expr::Exp(e)),
                }
            }

            Expr::Ln(e) => {
                let e = e.simplify();
                match &*e {
                    Expr::Const(a) if *a > 0.0 => Box::new(Expr::Const(a.ln())),
                    // ln(exp x) -> x
                    Expr::Exp(inner) => inner.clone(),
                    _ => Box::new(Expr::Ln(e)),
                }
            }

            Expr::Sqrt(e) => {
                let e = e.simplify();
                match &*e {
                    Expr::Const(a) if *a >= 0.0 => Box::new(Expr::Const(a.sqrt())),
                    // sqrt(x^2) -> |x|
                    Expr::Pow(inner, 2) => Box::new(Expr::Abs(inner.clone())),
                    _ => Box::new(Expr::Sqrt(e)),
                }
            }

            Expr::Sin(e) => {
                let e = e.simplify();
                match &*e {
                    Expr::Const(a) => Box::new(Expr::Const(a.sin())),
                    _ => Box::new(Expr::Sin(e)),
                }
            }

            Expr::Cos(e) => {
                let e = e.simplify();
                match &*e {
                    Expr::Const(a) => Box::new(Expr::Const(a.cos())),
                    _ => Box::new(Expr::Cos(e)),
                }
            }
        }
    }

    /// Returns a copy of this expression with every occurrence of `target`
    /// replaced by `replacement`.
    pub fn substitute(&self, target: &Symbol, replacement: &Expr) -> Expr {
        match self {
            Expr::Const(_) => self.clone(),
            Expr::Var(sym) => {
                if sym == target {
                    replacement.clone()
                } else {
                    self.clone()
                }
            }
            Expr::Add(l, r) => Expr::Add(
                Box::new(l.substitute(target, replacement)),
                Box::new(r.substitute(target, replacement)),
            ),
            Expr::Sub(l, r) => Expr::Sub(
                Box::new(l.substitute(target, replacement)),
                Box::new(r.substitute(target, replacement)),
            ),
            Expr::Mul(l, r) => Expr::Mul(
                Box::new(l.substitute(target, replacement)),
                Box::new(r.substitute(target, replacement)),
            ),
            Expr::Div(l, r) => Expr::Div(
                Box::new(l.substitute(target, replacement)),
                Box::new(r.substitute(target, replacement)),
            ),
            Expr::PowExpr(l, r) => Expr::PowExpr(
                Box::new(l.substitute(target, replacement)),
                Box::new(r.substitute(target, replacement)),
            ),
            Expr::Neg(e) => Expr::Neg(Box::new(e.substitute(target, replacement))),
            Expr::Abs(e) => Expr::Abs(Box::new(e.substitute(target, replacement))),
            Expr::Exp(e) => Expr::Exp(Box::new(e.substitute(target, replacement))),
            Expr::Ln(e) => Expr::Ln(Box::new(e.substitute(target, replacement))),
            Expr::Sqrt(e) => Expr::Sqrt(Box::new(e.substitute(target, replacement))),
            Expr::Sin(e) => Expr::Sin(Box::new(e.substitute(target, replacement))),
            Expr::Cos(e) => Expr::Cos(Box::new(e.substitute(target, replacement))),
            Expr::Pow(b, n) => Expr::Pow(Box::new(b.substitute(target, replacement)), *n),
            Expr::PowFloat(b, c) => Expr::PowFloat(Box::new(b.substitute(target, replacement)), *c),
        }
    }

    /// Integer power.
    pub fn pow(self, n: i64) -> Expr {
        Expr::Pow(Box::new(self), n)
    }

    /// Floating point power.
    pub fn powf(self, c: f64) -> Expr {
        Expr::PowFloat(Box::new(self), c)
    }

    /// Power with an expression exponent.
    pub fn pow_expr(self, e: Expr) -> Expr {
        Expr::PowExpr(Box::new(self), Box::new(e))
    }

    pub fn exp(self) -> Expr {
        Expr::Exp(Box::new(self))
    }

    pub fn ln(self) -> Expr {
        Expr::Ln(Box::new(self))
    }

    pub fn sqrt(self) -> Expr {
        Expr::Sqrt(Box::new(self))
    }

    pub fn sin(self) -> Expr {
        Expr::Sin(Box::new(self))
    }

    pub fn cos(self) -> Expr {
        Expr::Cos(Box::new(self))
    }

    pub fn abs(self) -> Expr {
        Expr::Abs(Box::new(self))
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Const(v)
    }
}

impl From<Symbol> for Expr {
    fn from(sym: Symbol) -> Self {
        Expr::Var(sym)
    }
}

impl From<&Symbol> for Expr {
    fn from(sym: &Symbol) -> Self {
        Expr::Var(sym.clone())
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Var(sym) => write!(f, "{sym}"),
            Expr::Add(l, r) => write!(f, "({l} + {r})"),
            Expr::Sub(l, r) => write!(f, "({l} - {r})"),
            Expr::Mul(l, r) => write!(f, "({l} * {r})"),
            Expr::Div(l, r) => write!(f, "({l} / {r})"),
            Expr::Neg(e) => write!(f, "-({e})"),
            Expr::Abs(e) => write!(f, "|{e}|"),
            Expr::Pow(b, n) => write!(f, "({b}^{n})"),
            Expr::PowFloat(b, c) => write!(f, "({b}^{c})"),
            Expr::PowExpr(b, e) => write!(f, "({b}^{e})"),
            Expr::Exp(e) => write!(f, "exp({e})"),
            Expr::Ln(e) => write!(f, "ln({e})"),
            Expr::Sqrt(e) => write!(f, "sqrt({e})"),
            Expr::Sin(e) => write!(f, "sin({e})"),
            Expr::Cos(e) => write!(f, "cos({e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var(Symbol::independent(name))
    }

    #[test]
    fn free_symbols_first_appearance_order() {
        let x = Symbol::independent("x");
        let a = Symbol::parameter("a");
        // a*x + x: a appears before x, each reported once
        let e = Expr::from(&a) * Expr::from(&x) + Expr::from(&x);
        assert_eq!(e.free_symbols(), vec![a, x]);
    }

    #[test]
    fn derivative_basic_rules() {
        let x = Symbol::independent("x");

        assert_eq!(*Expr::Const(5.0).derivative(&x), Expr::Const(0.0));
        assert_eq!(*Expr::from(&x).derivative(&x), Expr::Const(1.0));
        assert_eq!(*var("y").derivative(&x), Expr::Const(0.0));

        // d/dx x^3 = 3*x^2 after simplification
        let d = Expr::from(&x).pow(3).derivative(&x).simplify();
        assert_eq!(
            *d,
            Expr::Mul(
                Box::new(Expr::Const(3.0)),
                Box::new(Expr::Pow(Box::new(Expr::from(&x)), 2))
            )
        );
    }

    #[test]
    fn derivative_respects_role() {
        // x as parameter and x as independent are distinct symbols
        let xi = Symbol::independent("x");
        let xp = Symbol::parameter("x");
        assert_eq!(*Expr::from(&xi).derivative(&xp), Expr::Const(0.0));
        assert_eq!(*Expr::from(&xp).derivative(&xp), Expr::Const(1.0));
    }

    #[test]
    fn simplify_identities() {
        let e = var("x") + Expr::Const(0.0);
        assert_eq!(*e.simplify(), var("x"));

        let e = var("x") * Expr::Const(1.0);
        assert_eq!(*e.simplify(), var("x"));

        let e = var("x") * Expr::Const(0.0);
        assert_eq!(*e.simplify(), Expr::Const(0.0));

        let e = -(-var("x"));
        assert_eq!(*e.simplify(), var("x"));

        let e = var("x").pow(2).sqrt();
        assert_eq!(*e.simplify(), var("x").abs());

        let e = var("x") / var("x");
        assert_eq!(*e.simplify(), Expr::Const(1.0));
    }

    #[test]
    fn simplify_folds_constants() {
        let e = (Expr::Const(2.0) + Expr::Const(3.0)) * var("x");
        assert_eq!(
            *e.simplify(),
            Expr::Mul(Box::new(Expr::Const(5.0)), Box::new(var("x")))
        );
        assert_eq!(*Expr::Const(0.0).exp().simplify(), Expr::Const(1.0));
        assert_eq!(*Expr::Const(1.0).ln().simplify(), Expr::Const(0.0));
    }

    #[test]
    fn substitute_replaces_symbol() {
        let y = Symbol::output("y");
        let x = Symbol::independent("x");
        let e = Expr::from(&y).pow(2) + Expr::from(&y);
        let s = e.substitute(&y, &Expr::Var(x.clone()));
        assert_eq!(s, Expr::from(&x).pow(2) + Expr::from(&x));
    }

    #[test]
    fn display_notation() {
        let x = Symbol::independent("x");
        let a = Symbol::parameter("a");
        let e = Expr::from(&a) * Expr::from(&x).pow(2) + Expr::Const(1.0);
        assert_eq!(e.to_string(), "((a * (x^2)) + 1)");
    }
}
