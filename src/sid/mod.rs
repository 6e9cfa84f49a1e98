// src/sid/mod.rs
//
// SID: the ternary semantic processor. Owns a conserved I/N/U mass
// economy (enforced by `mixer::Mixer`) and a rewrite diagram describing how
// those masses are produced and consumed. The diagram and the mass arrays
// are deliberately separate: rewrites mutate the diagram's shape, `step`
// and `collapse` mutate the mass arrays, and `mixer::Mixer::commit` is the
// only bridge between the two, run after every mutating operation.

pub mod diagram;
pub mod expr;
pub mod matcher;
pub mod mixer;
pub mod processor;
pub mod rewriter;

use crate::error::{EngineError, EngineResult};
use diagram::Diagram;
use mixer::Mixer;

const DEFAULT_CELLS: usize = 64;

pub struct SidEngine {
    i: Vec<f64>,
    n: Vec<f64>,
    u: Vec<f64>,
    mixer: Mixer,
    diagram: Diagram,
    last_rewrite_applied: bool,
    last_rewrite_message: String,
    rewrite_events: Vec<String>,
}

impl SidEngine {
    pub fn new(capacity: f64) -> EngineResult<Self> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(EngineError::invalid_parameter(
                "capacity must be a positive finite number",
            ));
        }
        let mut engine = Self {
            i: vec![0.0; DEFAULT_CELLS],
            n: vec![0.0; DEFAULT_CELLS],
            u: vec![capacity; DEFAULT_CELLS],
            mixer: Mixer::new(capacity),
            diagram: Diagram::new(),
            last_rewrite_applied: false,
            last_rewrite_message: String::new(),
            rewrite_events: Vec::new(),
        };
        // scale the initial uniform U fill so totals equal capacity exactly
        let u_total: f64 = engine.u.iter().sum();
        if u_total > 0.0 {
            let scale = capacity / u_total;
            for cell in engine.u.iter_mut() {
                *cell *= scale;
            }
        }
        engine.commit()?;
        Ok(engine)
    }

    fn commit(&mut self) -> EngineResult<()> {
        self.mixer.commit(&mut self.i, &mut self.n, &mut self.u)
    }

    fn field_mut(&mut self, name: &str) -> EngineResult<&mut Vec<f64>> {
        match name {
            "I" => Ok(&mut self.i),
            "N" => Ok(&mut self.n),
            "U" => Ok(&mut self.u),
            other => Err(EngineError::invalid_parameter(format!(
                "unknown field '{}'; expected one of I, N, U",
                other
            ))),
        }
    }

    fn field(&self, name: &str) -> EngineResult<&[f64]> {
        match name {
            "I" => Ok(&self.i),
            "N" => Ok(&self.n),
            "U" => Ok(&self.u),
            other => Err(EngineError::invalid_parameter(format!(
                "unknown field '{}'; expected one of I, N, U",
                other
            ))),
        }
    }

    pub fn field_metrics(&self, name: &str) -> EngineResult<processor::ProcessorMetrics> {
        Ok(processor::metrics(self.field(name)?, self.mixer.capacity))
    }

    /// `apply_collapse(mask, alpha)` on role-`U` (SS4.E).
    pub fn apply_collapse(&mut self, mask: &[f64], alpha: f64) -> EngineResult<()> {
        processor::apply_collapse(&mut self.u, mask, alpha)?;
        self.commit()
    }

    /// `apply_collapse_mask(dual_mask, alpha)` on role-`U` (SS4.E).
    pub fn apply_collapse_mask(&mut self, m_i: &[f64], m_n: &[f64], alpha: f64) -> EngineResult<()> {
        processor::apply_collapse_mask(&mut self.u, m_i, m_n, alpha)?;
        self.commit()
    }

    /// `route_from_field(src, mask, alpha)`: routes mass from `src_field`
    /// into `dst_field` (SS4.E).
    pub fn route_from_field(&mut self, dst_field: &str, src_field: &str, mask: &[f64], alpha: f64) -> EngineResult<()> {
        let src = self.field(src_field)?.to_vec();
        processor::route_from_field(self.field_mut(dst_field)?, &src, mask, alpha)?;
        self.commit()
    }

    pub fn scale_all(&mut self, field_name: &str, s: f64) -> EngineResult<()> {
        processor::scale_all(self.field_mut(field_name)?, s)?;
        self.commit()
    }

    pub fn add_uniform(&mut self, field_name: &str, c: f64) -> EngineResult<()> {
        processor::add_uniform(self.field_mut(field_name)?, c)?;
        self.commit()
    }

    /// One semantic "flow" tick: routes an `alpha` fraction of the
    /// admissible mass (I) into the excluded/processing mass (N), then
    /// re-enforces the conservation invariant via the mixer.
    pub fn step(&mut self, alpha: f64) -> EngineResult<()> {
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            return Err(EngineError::invalid_parameter(
                "alpha must be a finite number in [0, 1]",
            ));
        }
        for (i_cell, n_cell) in self.i.iter_mut().zip(self.n.iter_mut()) {
            let flow = *i_cell * alpha;
            *i_cell -= flow;
            *n_cell += flow;
        }
        self.commit()
    }

    /// Collapses an `alpha` fraction of the undecided mass (U) uniformly.
    /// The mixer redistributes the shortfall back into U from the total
    /// budget on the next commit, so overall conservation is preserved.
    pub fn collapse(&mut self, alpha: f64) -> EngineResult<()> {
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            return Err(EngineError::invalid_parameter(
                "alpha must be a finite number in [0, 1]",
            ));
        }
        for cell in self.u.iter_mut() {
            *cell -= *cell * alpha;
        }
        self.commit()
    }

    pub fn apply_rewrite(&mut self, pattern_src: &str, replacement_src: &str, rule_id: &str) -> EngineResult<()> {
        let pattern = expr::parse(pattern_src)
            .map_err(|e| EngineError::invalid_parameter(format!("pattern: {}", e)))?;
        let replacement = expr::parse(replacement_src)
            .map_err(|e| EngineError::invalid_parameter(format!("replacement: {}", e)))?;

        let outcome = rewriter::apply_expr_rewrite(&mut self.diagram, &pattern, &replacement, rule_id);
        self.last_rewrite_applied = outcome.applied;
        self.last_rewrite_message = outcome.message.clone();
        self.rewrite_events.push(outcome.message);
        Ok(())
    }

    pub fn set_diagram_expr(&mut self, src: &str, rule_id: &str) -> EngineResult<()> {
        let expr = expr::parse(src).map_err(|e| EngineError::invalid_parameter(format!("expr: {}", e)))?;
        let mut counter = 0usize;
        let bindings = matcher::Bindings::new();
        let root_id = instantiate_fresh(&mut self.diagram, &expr, &bindings, rule_id, &mut counter);
        self.last_rewrite_applied = true;
        self.last_rewrite_message = format!("diagram root set to node '{}'", root_id);
        Ok(())
    }

    pub fn set_diagram_json(&mut self, value: &serde_json::Value) -> EngineResult<()> {
        let parsed: Diagram = serde_json::from_value(value.clone())
            .map_err(|e| EngineError::invalid_parameter(format!("diagram: {}", e)))?;
        if !parsed.is_acyclic() {
            return Err(EngineError::invariant_fail(
                "supplied diagram contains a cycle",
            ));
        }
        let missing = parsed.dangling_references();
        if !missing.is_empty() {
            return Err(EngineError::invalid_parameter(format!(
                "diagram references unknown node ids: {:?}",
                missing
            )));
        }
        self.diagram = parsed;
        Ok(())
    }

    pub fn get_diagram_json(&self) -> EngineResult<serde_json::Value> {
        serde_json::to_value(&self.diagram).map_err(|e| EngineError::internal(e.to_string()))
    }

    pub fn i_mass(&self) -> f64 {
        self.i.iter().sum()
    }

    pub fn n_mass(&self) -> f64 {
        self.n.iter().sum()
    }

    pub fn u_mass(&self) -> f64 {
        self.u.iter().sum()
    }

    pub fn instantaneous_gain(&self) -> f64 {
        self.mixer.metrics.loop_gain
    }

    pub fn is_conserved(&self, tol: f64) -> bool {
        self.mixer.is_conserved(tol)
    }

    pub fn metrics(&self) -> mixer::MixerMetrics {
        self.mixer.metrics
    }

    pub fn last_rewrite_applied(&self) -> bool {
        self.last_rewrite_applied
    }

    pub fn last_rewrite_message(&self) -> &str {
        &self.last_rewrite_message
    }

    pub fn rewrite_events(&self) -> &[String] {
        &self.rewrite_events
    }
}

// `rewriter::apply_expr_rewrite` anchors its replacement to a match;
// `set_diagram_expr` has no match to anchor to, so it builds a fresh
// subgraph the same way a rewrite replacement would, with every `Var`
// in the expression treated as unbound.
fn instantiate_fresh(
    diagram: &mut Diagram,
    expr: &expr::Expr,
    bindings: &matcher::Bindings,
    rule_id: &str,
    counter: &mut usize,
) -> String {
    match expr {
        expr::Expr::Var(name) => bindings
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("{}_unbound_{}", rule_id, name)),
        expr::Expr::Literal(atom) => {
            let id = format!("{}_lit_{}", rule_id, counter);
            *counter += 1;
            diagram.upsert_node(diagram::SidNode {
                id: id.clone(),
                op: diagram::Operator::O,
                inputs: vec![],
                dof_refs: vec![],
                atom_args: vec![atom.clone()],
            });
            id
        }
        expr::Expr::Op(op, args) => {
            let mut atom_args = Vec::new();
            let mut inputs = Vec::new();
            for arg in args {
                match arg {
                    expr::Expr::Literal(atom) => atom_args.push(atom.clone()),
                    other => inputs.push(instantiate_fresh(diagram, other, bindings, rule_id, counter)),
                }
            }
            let id = format!("{}_node_{}", rule_id, counter);
            *counter += 1;
            diagram.upsert_node(diagram::SidNode {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_engine_is_conserved_from_the_start() {
        let engine = SidEngine::new(1.0).unwrap();
        assert!(engine.is_conserved(1e-9));
        assert!((engine.u_mass() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn step_then_collapse_preserves_total_mass() {
        let mut engine = SidEngine::new(2.0).unwrap();
        engine.step(0.3).unwrap();
        engine.collapse(0.5).unwrap();
        let total = engine.i_mass() + engine.n_mass() + engine.u_mass();
        assert!((total - 2.0).abs() < 1e-6);
    }

    #[test]
    fn first_step_is_never_transport_ready() {
        let mut engine = SidEngine::new(1.0).unwrap();
        engine.step(0.1).unwrap();
        assert!(!engine.metrics().transport_ready);
    }

    #[test]
    fn out_of_range_alpha_is_rejected() {
        let mut engine = SidEngine::new(1.0).unwrap();
        assert!(engine.step(1.5).is_err());
        assert!(engine.collapse(-0.1).is_err());
    }

    #[test]
    fn set_and_get_diagram_round_trip() {
        let mut engine = SidEngine::new(1.0).unwrap();
        engine.set_diagram_expr("C($a, $b)", "seed").unwrap();
        let json = engine.get_diagram_json().unwrap();
        assert!(json.get("nodes").is_some() || json.is_object());
    }

    #[test]
    fn rewrite_on_empty_diagram_reports_no_match() {
        let mut engine = SidEngine::new(1.0).unwrap();
        engine.apply_rewrite("C($a, $b)", "T($a)", "rule1").unwrap();
        assert!(!engine.last_rewrite_applied());
    }

    #[test]
    fn field_level_collapse_preserves_conservation() {
        let mut engine = SidEngine::new(1.0).unwrap();
        let mask = vec![1.0; DEFAULT_CELLS];
        engine.apply_collapse(&mask, 0.1).unwrap();
        let total = engine.i_mass() + engine.n_mass() + engine.u_mass();
        assert!((total - 1.0).abs() <= 1e-6);
    }

    #[test]
    fn route_from_field_moves_mass_and_stays_conserved() {
        let mut engine = SidEngine::new(1.0).unwrap();
        let mask = vec![1.0; DEFAULT_CELLS];
        engine.route_from_field("I", "U", &mask, 0.1).unwrap();
        assert!(engine.i_mass() > 0.0);
        let total = engine.i_mass() + engine.n_mass() + engine.u_mass();
        assert!((total - 1.0).abs() <= 1e-6);
    }

    #[test]
    fn scale_all_rejects_unknown_field() {
        let mut engine = SidEngine::new(1.0).unwrap();
        assert!(engine.scale_all("Q", 1.0).is_err());
    }

    #[test]
    fn add_uniform_rejects_negative_constant() {
        let mut engine = SidEngine::new(1.0).unwrap();
        assert!(engine.add_uniform("I", -1.0).is_err());
    }
}
