//! Conversion of parsed evalexpr trees into [`Expr`].
//!
//! The string front end parses each right-hand side with
//! `evalexpr::build_operator_tree` and hands the resulting AST to
//! [`build_ast`], which maps operators and function calls onto our expression
//! type. Identifier roles are resolved through a name table: output keys and
//! declared parameters resolve to their symbols, everything else becomes an
//! independent variable.

use std::collections::HashMap;

use evalexpr::{DefaultNumericTypes, Node, Operator, Value};

use crate::errors::ConvertError;
use crate::expr::Expr;
use crate::symbol::Symbol;

/// Converts an evalexpr AST node into our internal expression representation.
///
/// `roles` maps identifier names to known symbols (model outputs and declared
/// parameters). Names absent from the table are treated as independent
/// variables, so the caller never has to enumerate them up front.
pub fn build_ast(
    node: &Node<DefaultNumericTypes>,
    roles: &HashMap<String, Symbol>,
) -> Result<Expr, ConvertError> {
    match node.operator() {
        // n-ary in evalexpr, folded into a chain of binary nodes
        Operator::Add => {
            let children = node.children();
            children
                .iter()
                .skip(1)
                .try_fold(build_ast(&children[0], roles)?, |acc, child| {
                    Ok(Expr::Add(
                        Box::new(acc),
                        Box::new(build_ast(child, roles)?),
                    ))
                })
        }
        Operator::Mul => {
            let children = node.children();
            children
                .iter()
                .skip(1)
                .try_fold(build_ast(&children[0], roles)?, |acc, child| {
                    Ok(Expr::Mul(
                        Box::new(acc),
                        Box::new(build_ast(child, roles)?),
                    ))
                })
        }
        Operator::Sub => {
            let children = node.children();
            Ok(Expr::Sub(
                Box::new(build_ast(&children[0], roles)?),
                Box::new(build_ast(&children[1], roles)?),
            ))
        }
        Operator::Div => {
            let children = node.children();
            Ok(Expr::Div(
                Box::new(build_ast(&children[0], roles)?),
                Box::new(build_ast(&children[1], roles)?),
            ))
        }
        Operator::Neg => {
            let children = node.children();
            Ok(Expr::Neg(Box::new(build_ast(&children[0], roles)?)))
        }
        Operator::Const { value } => match value {
            Value::Float(f) => Ok(Expr::Const(*f)),
            Value::Int(i) => Ok(Expr::Const(*i as f64)),
            _ => Err(ConvertError::ConstOperator(format!(
                "expected numeric constant: {value:?}"
            ))),
        },
        Operator::VariableIdentifierRead { identifier } => {
            let sym = roles
                .get(identifier.as_str())
                .cloned()
                .unwrap_or_else(|| Symbol::independent(identifier.as_str()));
            Ok(Expr::Var(sym))
        }
        // `^` parses as Exp; the exponent kind picks the cheapest Expr variant
        Operator::Exp => {
            let children = node.children();
            let base = build_ast(&children[0], roles)?;
            match children[1].operator() {
                Operator::Const {
                    value: Value::Int(exp),
                } => Ok(Expr::Pow(Box::new(base), *exp)),
                Operator::Const {
                    value: Value::Float(exp),
                } => Ok(Expr::PowFloat(Box::new(base), *exp)),
                _ => Ok(Expr::PowExpr(
                    Box::new(base),
                    Box::new(build_ast(&children[1], roles)?),
                )),
            }
        }
        Operator::FunctionIdentifier { identifier } => {
            let children = node.children();
            let arg = Box::new(build_ast(&children[0], roles)?);
            match identifier.as_str() {
                "abs" => Ok(Expr::Abs(arg)),
                "exp" => Ok(Expr::Exp(arg)),
                "ln" | "log" => Ok(Expr::Ln(arg)),
                "sqrt" => Ok(Expr::Sqrt(arg)),
                "sin" => Ok(Expr::Sin(arg)),
                "cos" => Ok(Expr::Cos(arg)),
                _ => Err(ConvertError::UnsupportedFunction(format!(
                    "unsupported function: {identifier:?}"
                ))),
            }
        }
        Operator::RootNode => {
            let children = node.children();
            if children.len() == 1 {
                build_ast(&children[0], roles)
            } else {
                Err(ConvertError::RootNode(format!(
                    "expected single child for root node: {children:?}"
                )))
            }
        }
        other => Err(ConvertError::UnsupportedOperator(format!(
            "unsupported operator: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalexpr::build_operator_tree;

    fn parse(src: &str, roles: &HashMap<String, Symbol>) -> Expr {
        let tree = build_operator_tree::<DefaultNumericTypes>(src).unwrap();
        build_ast(&tree, roles).unwrap()
    }

    #[test]
    fn resolves_roles_from_table() {
        let mut roles = HashMap::new();
        roles.insert("a".to_string(), Symbol::parameter("a"));
        roles.insert("y".to_string(), Symbol::output("y"));

        let e = parse("a * x + y", &roles);
        assert_eq!(
            e.free_symbols(),
            vec![
                Symbol::parameter("a"),
                Symbol::independent("x"),
                Symbol::output("y"),
            ]
        );
    }

    #[test]
    fn integer_exponent_becomes_pow() {
        let roles = HashMap::new();
        let e = parse("x^3", &roles);
        assert_eq!(
            e,
            Expr::Pow(Box::new(Expr::Var(Symbol::independent("x"))), 3)
        );
    }

    #[test]
    fn float_exponent_becomes_powfloat() {
        let roles = HashMap::new();
        let e = parse("x^1.5", &roles);
        assert_eq!(
            e,
            Expr::PowFloat(Box::new(Expr::Var(Symbol::independent("x"))), 1.5)
        );
    }

    #[test]
    fn functions_are_mapped() {
        let roles = HashMap::new();
        let x = || Box::new(Expr::Var(Symbol::independent("x")));
        assert_eq!(parse("exp(x)", &roles), Expr::Exp(x()));
        assert_eq!(parse("ln(x)", &roles), Expr::Ln(x()));
        assert_eq!(parse("sqrt(x)", &roles), Expr::Sqrt(x()));
        assert_eq!(parse("sin(x)", &roles), Expr::Sin(x()));
        assert_eq!(parse("cos(x)", &roles), Expr::Cos(x()));
        assert_eq!(parse("abs(x)", &roles), Expr::Abs(x()));
    }

    #[test]
    fn unsupported_function_is_rejected() {
        let roles = HashMap::new();
        let tree = build_operator_tree::<DefaultNumericTypes>("tan(x)").unwrap();
        assert!(matches!(
            build_ast(&tree, &roles),
            Err(ConvertError::UnsupportedFunction(_))
        ));
    }
}
