// src/sid/matcher.rs
//
// Structural pattern matching of an `Expr` against a diagram node. A `Var`
// binds to a node id the first time it is seen and must agree with that
// binding on every later occurrence in the same pattern (consistency).
// `Literal` arguments are checked against the candidate node's degrees of
// freedom rather than consuming an input slot, since atoms are not
// themselves diagram nodes: for `P` nodes that means `dof_refs`, and for
// every other operator kind it means the `atom_args` metadata slot.

use crate::sid::diagram::{Diagram, Operator};
use crate::sid::expr::Expr;
use std::collections::HashMap;

pub type Bindings = HashMap<String, String>;

pub fn match_expr(diagram: &Diagram, pattern: &Expr, node_id: &str) -> Option<Bindings> {
    let mut bindings = Bindings::new();
    if match_inner(diagram, pattern, node_id, &mut bindings) {
        Some(bindings)
    } else {
        None
    }
}

fn match_inner(diagram: &Diagram, pattern: &Expr, node_id: &str, bindings: &mut Bindings) -> bool {
    match pattern {
        Expr::Var(name) => match bindings.get(name) {
            Some(existing) => existing == node_id,
            None => {
                bindings.insert(name.clone(), node_id.to_string());
                true
            }
        },
        Expr::Literal(_) => false,
        Expr::Op(op, args) => {
            let node = match diagram.node(node_id) {
                Some(n) => n,
                None => return false,
            };
            if node.op != *op {
                return false;
            }

            let (sub_patterns, literal_atoms): (Vec<&Expr>, Vec<&str>) =
                args.iter().fold((Vec::new(), Vec::new()), |mut acc, a| {
                    match a {
                        Expr::Literal(atom) => acc.1.push(atom.as_str()),
                        other => acc.0.push(other),
                    }
                    acc
                });

            let dof_pool: &[String] = if node.op == Operator::P {
                &node.dof_refs
            } else {
                &node.atom_args
            };
            if !literal_atoms
                .iter()
                .all(|atom| dof_pool.iter().any(|a| a == atom))
            {
                return false;
            }

            if sub_patterns.len() != node.inputs.len() {
                return false;
            }

            for (sub_pattern, input_id) in sub_patterns.iter().zip(node.inputs.iter()) {
                if !match_inner(diagram, sub_pattern, input_id, bindings) {
                    return false;
                }
            }

            true
        }
    }
}

/// Finds the first node (in diagram iteration order) that matches `pattern`.
pub fn find_first_match(diagram: &Diagram, pattern: &Expr) -> Option<(String, Bindings)> {
    diagram.nodes_in_order().find_map(|node| {
        match_expr(diagram, pattern, &node.id).map(|bindings| (node.id.clone(), bindings))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sid::diagram::{Operator, SidNode};

    fn node(id: &str, op: Operator, inputs: &[&str], atoms: &[&str]) -> SidNode {
        SidNode {
            id: id.to_string(),
            op,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            dof_refs: vec![],
            atom_args: atoms.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn matches_operator_shape_and_binds_variable() {
        let mut d = Diagram::new();
        d.upsert_node(node("a", Operator::P, &[], &[]));
        d.upsert_node(node("b", Operator::O, &["a"], &[]));

        let pattern = crate::sid::expr::parse("O($x)").unwrap();
        let bindings = match_expr(&d, &pattern, "b").unwrap();
        assert_eq!(bindings.get("x").unwrap(), "a");
    }

    #[test]
    fn rejects_inconsistent_variable_binding() {
        let mut d = Diagram::new();
        d.upsert_node(node("a", Operator::P, &[], &[]));
        d.upsert_node(node("b", Operator::P, &[], &[]));
        d.upsert_node(node("c", Operator::C, &["a", "b"], &[]));

        let pattern = crate::sid::expr::parse("C($x, $x)").unwrap();
        assert!(match_expr(&d, &pattern, "c").is_none());
    }

    #[test]
    fn literal_must_be_present_in_atom_args() {
        let mut d = Diagram::new();
        d.upsert_node(node("a", Operator::T, &[], &["photon"]));
        let ok = crate::sid::expr::parse("T(lit:photon)").unwrap();
        let bad = crate::sid::expr::parse("T(lit:electron)").unwrap();
        assert!(match_expr(&d, &ok, "a").is_some());
        assert!(match_expr(&d, &bad, "a").is_none());
    }

    #[test]
    fn literal_on_a_p_node_checks_dof_refs_not_atom_args() {
        let mut d = Diagram::new();
        let mut p_node = node("a", Operator::P, &[], &["not_a_dof"]);
        p_node.dof_refs = vec!["spin_up".to_string()];
        d.upsert_node(p_node);

        let matches_dof = crate::sid::expr::parse("P(lit:spin_up)").unwrap();
        let matches_only_atom_args = crate::sid::expr::parse("P(lit:not_a_dof)").unwrap();
        assert!(match_expr(&d, &matches_dof, "a").is_some());
        assert!(match_expr(&d, &matches_only_atom_args, "a").is_none());
    }
}
