// src/sid/rewriter.rs
//
// Applies a single pattern -> replacement rewrite to a diagram, rolling the
// diagram back to its pre-rewrite state if the rewrite would introduce a
// cycle. `apply_rewrites_until_fixed` repeatedly sweeps a rule set until no
// rule matches anywhere, bounded by `MAX_REWRITE_ITERATIONS` so a
// non-confluent rule set cannot hang the engine.

use crate::sid::diagram::{Diagram, SidNode};
use crate::sid::expr::Expr;
use crate::sid::matcher::{find_first_match, Bindings};

pub const MAX_REWRITE_ITERATIONS: usize = 1000;

pub struct RewriteOutcome {
    pub applied: bool,
    pub message: String,
}

/// Finds the first node matching `pattern`, replaces it with the subgraph
/// described by `replacement`, and rewires any node that referenced the
/// matched root onto the new root. Rolls back and reports failure if the
/// result is not acyclic.
pub fn apply_expr_rewrite(
    diagram: &mut Diagram,
    pattern: &Expr,
    replacement: &Expr,
    rule_id: &str,
) -> RewriteOutcome {
    let (matched_root, bindings) = match find_first_match(diagram, pattern) {
        Some(found) => found,
        None => {
            return RewriteOutcome {
                applied: false,
                message: format!("rule '{}' did not match any node", rule_id),
            }
        }
    };

    let before = diagram.clone();
    let mut counter = 0usize;
    let new_root = instantiate(diagram, replacement, &bindings, rule_id, &mut counter);

    retarget_references(diagram, &matched_root, &new_root);
    if matched_root != new_root {
        diagram.remove_node(&matched_root);
    }

    if !diagram.is_acyclic() {
        *diagram = before;
        return RewriteOutcome {
            applied: false,
            message: format!(
                "rule '{}' was rolled back: the rewrite would introduce a cycle",
                rule_id
            ),
        };
    }

    RewriteOutcome {
        applied: true,
        message: format!("rule '{}' applied at node '{}'", rule_id, matched_root),
    }
}

fn instantiate(
    diagram: &mut Diagram,
    expr: &Expr,
    bindings: &Bindings,
    rule_id: &str,
    counter: &mut usize,
) -> String {
    match expr {
        Expr::Var(name) => bindings
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("{}_unbound_{}", rule_id, name)),
        Expr::Literal(atom) => {
            // A bare literal replacement has no host node; synthesize a
            // zero-input `O` node carrying the atom so it can still be
            // referenced as an input elsewhere in the replacement tree.
            let id = fresh_id(rule_id, counter);
            diagram.upsert_node(SidNode {
                id: id.clone(),
                op: crate::sid::diagram::Operator::O,
                inputs: vec![],
                dof_refs: vec![],
                atom_args: vec![atom.clone()],
            });
            id
        }
        Expr::Op(op, args) => {
            let mut atom_args = Vec::new();
            let mut inputs = Vec::new();
            for arg in args {
                match arg {
                    Expr::Literal(atom) => atom_args.push(atom.clone()),
                    other => inputs.push(instantiate(diagram, other, bindings, rule_id, counter)),
                }
            }
            let id = fresh_id(rule_id, counter);
            diagram.upsert_node(SidNode {
                id: id.clone(),
                op: *op,
                inputs,
                dof_refs: vec![],
                atom_args,
            });
            id
        }
    }
}

fn fresh_id(rule_id: &str, counter: &mut usize) -> String {
    let id = format!("{}_rw_{}", rule_id, counter);
    *counter += 1;
    id
}

fn retarget_references(diagram: &mut Diagram, old_id: &str, new_id: &str) {
    if old_id == new_id {
        return;
    }
    let ids: Vec<String> = diagram.nodes_in_order().map(|n| n.id.clone()).collect();
    for id in ids {
        if let Some(node) = diagram.node_mut(&id) {
            for input in node.inputs.iter_mut() {
                if input == old_id {
                    *input = new_id.to_string();
                }
            }
        }
    }
}

/// Sweeps `rules` (pattern, replacement, rule_id) against `diagram` until a
/// full pass applies nothing, or `MAX_REWRITE_ITERATIONS` sweeps have run.
/// Returns the outcome of the last rewrite attempted.
pub fn apply_rewrites_until_fixed(
    diagram: &mut Diagram,
    rules: &[(Expr, Expr, String)],
) -> RewriteOutcome {
    let mut last = RewriteOutcome {
        applied: false,
        message: "no rules supplied".to_string(),
    };

    for _ in 0..MAX_REWRITE_ITERATIONS {
        let mut any_applied = false;
        for (pattern, replacement, rule_id) in rules {
            let outcome = apply_expr_rewrite(diagram, pattern, replacement, rule_id);
            if outcome.applied {
                any_applied = true;
            }
            last = outcome;
        }
        if !any_applied {
            break;
        }
    }

    last
}
