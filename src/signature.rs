//! Synthesized call signatures.
//!
//! Every model exposes a [`CallSignature`] derived from its connectivity:
//! the independent variables first, then the parameters, each group in the
//! order the analyzer produced. Two models with the same inputs therefore
//! present the same signature regardless of how they were constructed, which
//! is what lets a numeric model stand in for a symbolic one.

use std::collections::HashMap;

use itertools::Itertools;

use crate::errors::ModelError;
use crate::symbol::Symbol;

/// The positional argument list of a model call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSignature {
    args: Vec<Symbol>,
    n_independent: usize,
}

impl CallSignature {
    pub(crate) fn new(independent: &[Symbol], params: &[Symbol]) -> Self {
        let mut args = Vec::with_capacity(independent.len() + params.len());
        args.extend_from_slice(independent);
        args.extend_from_slice(params);
        Self {
            args,
            n_independent: independent.len(),
        }
    }

    /// All argument symbols, independent variables first.
    pub fn args(&self) -> &[Symbol] {
        &self.args
    }

    /// The independent-variable prefix of the argument list.
    pub fn independent(&self) -> &[Symbol] {
        &self.args[..self.n_independent]
    }

    /// The parameter suffix of the argument list.
    pub fn parameters(&self) -> &[Symbol] {
        &self.args[self.n_independent..]
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Checks a set of provided argument names against the signature.
    ///
    /// Every missing, unexpected and duplicated name is reported, not just
    /// the first one found, so a caller can fix a whole call site in one go.
    pub fn check_names(&self, provided: &[&str]) -> Result<(), ModelError> {
        let duplicated = provided
            .iter()
            .enumerate()
            .filter(|&(i, name)| provided[..i].contains(name))
            .map(|(_, name)| *name)
            .unique()
            .join(", ");
        if !duplicated.is_empty() {
            return Err(ModelError::DuplicateArguments(duplicated));
        }

        let missing = self
            .args
            .iter()
            .map(|s| s.name())
            .filter(|name| !provided.contains(name))
            .join(", ");
        if !missing.is_empty() {
            return Err(ModelError::MissingArguments(missing));
        }

        let unexpected = provided
            .iter()
            .filter(|name| !self.args.iter().any(|s| s.name() == **name))
            .join(", ");
        if !unexpected.is_empty() {
            return Err(ModelError::UnexpectedArguments(unexpected));
        }
        Ok(())
    }

    /// Maps each signature position to its index in `provided`, after
    /// validating the names.
    pub(crate) fn bind_order(&self, provided: &[&str]) -> Result<Vec<usize>, ModelError> {
        self.check_names(provided)?;
        let positions: HashMap<&str, usize> = provided
            .iter()
            .enumerate()
            .map(|(i, name)| (*name, i))
            .collect();
        self.args
            .iter()
            .map(|sym| {
                positions
                    .get(sym.name())
                    .copied()
                    .ok_or_else(|| ModelError::MissingArguments(sym.name().to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> CallSignature {
        CallSignature::new(
            &[Symbol::independent("x")],
            &[Symbol::parameter("a"), Symbol::parameter("b")],
        )
    }

    #[test]
    fn independent_variables_come_first() {
        let s = sig();
        assert_eq!(
            s.args(),
            &[
                Symbol::independent("x"),
                Symbol::parameter("a"),
                Symbol::parameter("b"),
            ]
        );
        assert_eq!(s.independent(), &[Symbol::independent("x")]);
        assert_eq!(s.parameters().len(), 2);
    }

    #[test]
    fn reports_all_missing_names() {
        let err = sig().check_names(&["x"]).unwrap_err();
        match err {
            ModelError::MissingArguments(names) => assert_eq!(names, "a, b"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reports_unexpected_names() {
        let err = sig().check_names(&["x", "a", "b", "c"]).unwrap_err();
        match err {
            ModelError::UnexpectedArguments(names) => assert_eq!(names, "c"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reports_duplicated_names() {
        let err = sig().check_names(&["x", "x", "a", "b"]).unwrap_err();
        match err {
            ModelError::DuplicateArguments(names) => assert_eq!(names, "x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bind_order_follows_signature_positions() -> Result<(), ModelError> {
        let order = sig().bind_order(&["b", "x", "a"])?;
        assert_eq!(order, vec![1, 2, 0]);
        Ok(())
    }

    #[test]
    fn signatures_compare_structurally() {
        assert_eq!(sig(), sig());
        let other = CallSignature::new(&[Symbol::independent("t")], &[Symbol::parameter("a")]);
        assert_ne!(sig(), other);
    }
}
