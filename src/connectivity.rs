//! Dependency analysis between model outputs.
//!
//! Given the declared output keys and the symbols each output's component
//! consumes, [`analyze`] partitions every symbol into exactly one role bucket,
//! records the per-output dependency mapping, and fixes a single evaluation
//! order: the interdependent outputs topologically sorted (declaration order
//! breaking ties), followed by the remaining outputs in declaration order.
//!
//! Output references on a right-hand side that do not match any key are
//! demoted to independent variables; the caller has to supply them like any
//! other input.

use crate::errors::ModelError;
use crate::symbol::{Role, Symbol};

/// The result of dependency analysis over a model's entries.
///
/// All symbol lists preserve first-appearance order over the declared
/// entries, which keeps signatures and output ordering deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Connectivity {
    /// Independent variables consumed anywhere in the model
    pub independent: Vec<Symbol>,
    /// All output keys, in declaration order
    pub outputs: Vec<Symbol>,
    /// Output keys consumed only externally
    pub dependent: Vec<Symbol>,
    /// Output keys consumed by at least one other output
    pub interdependent: Vec<Symbol>,
    /// Parameters consumed anywhere in the model
    pub params: Vec<Symbol>,
    /// Per output key, the symbols its component directly consumes
    pub mapping: Vec<(Symbol, Vec<Symbol>)>,
    /// The order outputs must be evaluated in
    pub eval_order: Vec<Symbol>,
    /// `eval_order` as positions into the declared entries
    pub(crate) eval_indices: Vec<usize>,
}

impl Connectivity {
    /// Direct dependencies of one output, if it exists.
    pub fn dependencies_of(&self, key: &Symbol) -> Option<&[Symbol]> {
        self.mapping
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, deps)| deps.as_slice())
    }
}

/// Analyzes the dependency structure of `entries`, each an output key paired
/// with the symbols its component consumes.
pub fn analyze(entries: &[(Symbol, Vec<Symbol>)]) -> Result<Connectivity, ModelError> {
    let keys: Vec<Symbol> = entries.iter().map(|(k, _)| k.clone()).collect();

    for (key, deps) in entries {
        if key.role() == Role::Parameter {
            return Err(ModelError::ParameterAsOutput(key.name().to_string()));
        }
        if keys.iter().filter(|k| *k == key).count() > 1 {
            return Err(ModelError::DuplicateOutput(key.name().to_string()));
        }
        if deps.contains(key) {
            return Err(ModelError::SelfReference(key.name().to_string()));
        }
    }

    let mut independent = Vec::new();
    let mut params = Vec::new();
    let mut interdependent = Vec::new();
    let mut mapping = Vec::with_capacity(entries.len());

    for (key, deps) in entries {
        for dep in deps {
            match dep.role() {
                Role::Independent => {
                    if !independent.contains(dep) {
                        independent.push(dep.clone());
                    }
                }
                Role::Parameter => {
                    if !params.contains(dep) {
                        params.push(dep.clone());
                    }
                }
                Role::Output => {
                    if keys.contains(dep) {
                        if !interdependent.contains(dep) {
                            interdependent.push(dep.clone());
                        }
                    } else {
                        // an undefined output reference is just another input
                        let as_input = Symbol::independent(dep.name());
                        if !independent.contains(&as_input) {
                            independent.push(as_input);
                        }
                    }
                }
            }
        }
        mapping.push((key.clone(), deps.clone()));
    }

    let eval_indices = evaluation_order(entries, &keys, &interdependent)?;
    let eval_order = eval_indices.iter().map(|&i| keys[i].clone()).collect();

    // dependent and interdependent partition the keys exactly
    let dependent = keys
        .iter()
        .filter(|k| !interdependent.contains(k))
        .cloned()
        .collect();

    Ok(Connectivity {
        independent,
        outputs: keys,
        dependent,
        interdependent,
        params,
        mapping,
        eval_order,
        eval_indices,
    })
}

/// Computes the evaluation order as entry indices: interdependent keys
/// topologically sorted with declaration-order tie-breaking, then the rest in
/// declaration order.
///
/// An output consumed by another output can itself only consume outputs that
/// are consumed too, so the interdependent set is closed under dependencies
/// and can be ordered on its own.
fn evaluation_order(
    entries: &[(Symbol, Vec<Symbol>)],
    keys: &[Symbol],
    interdependent: &[Symbol],
) -> Result<Vec<usize>, ModelError> {
    let mut order = Vec::with_capacity(keys.len());
    let mut placed = vec![false; keys.len()];

    // Kahn-style repeated selection over the interdependent keys
    let inter_indices: Vec<usize> = keys
        .iter()
        .enumerate()
        .filter(|(_, k)| interdependent.contains(k))
        .map(|(i, _)| i)
        .collect();

    while order.len() < inter_indices.len() {
        let next = inter_indices.iter().copied().find(|&i| {
            !placed[i]
                && entries[i].1.iter().all(|dep| {
                    !interdependent.contains(dep)
                        || keys.iter().position(|k| k == dep).is_some_and(|j| placed[j])
                })
        });
        match next {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                let stuck = inter_indices
                    .iter()
                    .filter(|&&i| !placed[i])
                    .map(|&i| keys[i].name())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ModelError::CyclicDependency(stuck));
            }
        }
    }

    for i in 0..keys.len() {
        if !placed[i] {
            order.push(i);
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &Symbol, deps: &[&Symbol]) -> (Symbol, Vec<Symbol>) {
        (key.clone(), deps.iter().map(|s| (*s).clone()).collect())
    }

    #[test]
    fn partitions_roles() -> Result<(), ModelError> {
        let x = Symbol::independent("x");
        let a = Symbol::parameter("a");
        let b = Symbol::parameter("b");
        let y = Symbol::output("y");
        let z = Symbol::output("z");

        // y = f(x, a); z = g(y, a, b)
        let conn = analyze(&[entry(&y, &[&x, &a]), entry(&z, &[&y, &a, &b])])?;

        assert_eq!(conn.independent, vec![x]);
        assert_eq!(conn.outputs, vec![y.clone(), z.clone()]);
        assert_eq!(conn.dependent, vec![z.clone()]);
        assert_eq!(conn.interdependent, vec![y.clone()]);
        assert_eq!(conn.params, vec![a, b]);
        assert_eq!(conn.eval_order, vec![y, z]);
        Ok(())
    }

    #[test]
    fn dependent_and_interdependent_partition_the_keys() -> Result<(), ModelError> {
        let x = Symbol::independent("x");
        let u = Symbol::output("u");
        let v = Symbol::output("v");
        let w = Symbol::output("w");

        let conn = analyze(&[entry(&u, &[&x]), entry(&v, &[&u]), entry(&w, &[&u])])?;
        assert_eq!(conn.interdependent, vec![u.clone()]);
        assert_eq!(conn.dependent, vec![v, w]);
        for key in &conn.outputs {
            assert_ne!(
                conn.dependent.contains(key),
                conn.interdependent.contains(key)
            );
        }
        assert_eq!(
            conn.dependent.len() + conn.interdependent.len(),
            conn.outputs.len()
        );
        Ok(())
    }

    #[test]
    fn orders_chain_against_declaration() -> Result<(), ModelError> {
        let x = Symbol::independent("x");
        let u = Symbol::output("u");
        let v = Symbol::output("v");
        let w = Symbol::output("w");

        // declared w, v, u but the dependencies force u, v, w
        let conn = analyze(&[entry(&w, &[&v]), entry(&v, &[&u]), entry(&u, &[&x])])?;
        assert_eq!(conn.eval_order, vec![u, v, w]);
        Ok(())
    }

    #[test]
    fn eval_indices_point_at_the_declared_entries() -> Result<(), ModelError> {
        let x = Symbol::independent("x");
        let u = Symbol::output("u");
        let v = Symbol::output("v");
        let w = Symbol::output("w");

        let conn = analyze(&[entry(&w, &[&v]), entry(&v, &[&u]), entry(&u, &[&x])])?;
        assert_eq!(conn.eval_indices, vec![2, 1, 0]);
        for (&i, key) in conn.eval_indices.iter().zip(&conn.eval_order) {
            assert_eq!(&conn.outputs[i], key);
        }
        Ok(())
    }

    #[test]
    fn declaration_order_breaks_ties() -> Result<(), ModelError> {
        let x = Symbol::independent("x");
        let p = Symbol::output("p");
        let q = Symbol::output("q");
        let r = Symbol::output("r");

        // p and q are both ready immediately; r needs both
        let conn = analyze(&[entry(&q, &[&x]), entry(&p, &[&x]), entry(&r, &[&p, &q])])?;
        assert_eq!(conn.eval_order, vec![q, p, r]);
        Ok(())
    }

    #[test]
    fn rejects_parameter_as_output() {
        let a = Symbol::parameter("a");
        let x = Symbol::independent("x");
        let err = analyze(&[entry(&a, &[&x])]).unwrap_err();
        assert!(matches!(err, ModelError::ParameterAsOutput(_)));
    }

    #[test]
    fn rejects_self_reference() {
        let y = Symbol::output("y");
        let err = analyze(&[entry(&y, &[&y])]).unwrap_err();
        assert!(matches!(err, ModelError::SelfReference(_)));
    }

    #[test]
    fn rejects_cycles() {
        let y = Symbol::output("y");
        let z = Symbol::output("z");
        let err = analyze(&[entry(&y, &[&z]), entry(&z, &[&y])]).unwrap_err();
        assert!(matches!(err, ModelError::CyclicDependency(_)));
    }

    #[test]
    fn undefined_output_reference_becomes_independent() -> Result<(), ModelError> {
        let y = Symbol::output("y");
        let w = Symbol::output("w"); // never defined
        let conn = analyze(&[entry(&y, &[&w])])?;
        assert_eq!(conn.independent, vec![Symbol::independent("w")]);
        assert!(conn.interdependent.is_empty());
        Ok(())
    }
}
