// src/router.rs
//
// The JSON command router: one function maps a `{command, params}`
// object onto a `{status, result|error, error_code}` envelope. Parameter
// extraction/validation happens here, before any engine is touched, so a
// malformed request never partially mutates engine state.

use crate::capabilities;
use crate::cellular::CellularEngine;
use crate::error::{EngineError, EngineResult};
use crate::igsoa::IgsoaEngine;
use crate::manager::{EngineInstance, EngineManager};
use crate::satp::SatpEngine;
use crate::sid::SidEngine;
use serde_json::{json, Value};

const RECOGNIZED_COMMANDS: &[&str] = &[
    "get_capabilities",
    "describe_engine",
    "list_engines",
    "create_engine",
    "destroy_engine",
    "run_mission",
    "get_metrics",
    "get_state",
    "set_igsoa_state",
    "set_satp_state",
    "get_satp_state",
    "get_center_of_mass",
    "sid_step",
    "sid_collapse",
    "sid_apply_rewrite",
    "sid_set_diagram_expr",
    "sid_set_diagram_json",
    "sid_get_diagram_json",
    "sid_rewrite_events",
    "benchmark",
];

const ENGINE_TYPES: &[&str] = &[
    "phase4b",
    "igsoa_complex",
    "igsoa_complex_2d",
    "igsoa_complex_3d",
    "satp_higgs_1d",
    "satp_higgs_2d",
    "satp_higgs_3d",
    "sid_ternary",
    "igsoa_gw",
];

pub struct Router {
    manager: EngineManager,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            manager: EngineManager::new(),
        }
    }

    /// Dispatches one already-parsed request object and returns the
    /// envelope, including the measured `execution_time_ms`. Never panics:
    /// any handler error is caught and folded into the error envelope.
    pub fn handle(&mut self, request: &Value) -> Value {
        let t0 = std::time::Instant::now();
        let command = match request.get("command").and_then(Value::as_str) {
            Some(c) => c.to_string(),
            None => {
                return error_envelope(
                    "",
                    t0.elapsed(),
                    &EngineError::missing_parameter("command"),
                )
            }
        };
        let empty = json!({});
        let params = request.get("params").unwrap_or(&empty);

        let result = self.dispatch(&command, params);
        match result {
            Ok(value) => success_envelope(&command, t0.elapsed(), value),
            Err(e) => error_envelope(&command, t0.elapsed(), &e),
        }
    }

    fn dispatch(&mut self, command: &str, params: &Value) -> EngineResult<Value> {
        match command {
            "get_capabilities" => Ok(self.get_capabilities()),
            "describe_engine" => self.describe_engine(params),
            "list_engines" => Ok(self.list_engines()),
            "create_engine" => self.create_engine(params),
            "destroy_engine" => self.destroy_engine(params),
            "run_mission" => self.run_mission(params),
            "get_metrics" => self.get_metrics(params),
            "get_state" => self.get_state(params),
            "set_igsoa_state" => self.set_igsoa_state(params),
            "set_satp_state" => self.set_satp_state(params),
            "get_satp_state" => self.get_satp_state(params),
            "get_center_of_mass" => self.get_center_of_mass(params),
            "sid_step" => self.sid_step(params),
            "sid_collapse" => self.sid_collapse(params),
            "sid_apply_rewrite" => self.sid_apply_rewrite(params),
            "sid_set_diagram_expr" => self.sid_set_diagram_expr(params),
            "sid_set_diagram_json" => self.sid_set_diagram_json(params),
            "sid_get_diagram_json" => self.sid_get_diagram_json(params),
            "sid_rewrite_events" => self.sid_rewrite_events(params),
            "benchmark" => Ok(json!({"status": "stub", "message": "benchmark is a diagnostic stub and reports no metrics."})),
            other => Err(EngineError::unknown_command(other)),
        }
    }

    fn get_capabilities(&self) -> Value {
        let caps = capabilities::detect();
        json!({
            "engine_types": ENGINE_TYPES,
            "commands": RECOGNIZED_COMMANDS,
            "avx2": caps.avx2,
            "fma": caps.fma,
            "avx512": caps.avx512,
            "logical_cores": caps.logical_cores,
        })
    }

    fn describe_engine(&self, params: &Value) -> EngineResult<Value> {
        let engine_type = required_str(params, "engine_type")?;
        if !ENGINE_TYPES.contains(&engine_type.as_str()) {
            return Err(EngineError::invalid_parameter(format!(
                "Unknown engine type '{}'.",
                engine_type
            )));
        }
        let description = match engine_type.as_str() {
            "phase4b" => "Scalar or SIMD-accelerated cellular engine running the Phase 4A/4B/4C node kernel.",
            "igsoa_complex" | "igsoa_complex_2d" | "igsoa_complex_3d" => {
                "Complex-valued IGSOA lattice engine with a real auxiliary phi field."
            }
            "satp_higgs_1d" | "satp_higgs_2d" | "satp_higgs_3d" => {
                "Coupled phi/Higgs real scalar field engine with a derived vacuum expectation value."
            }
            "sid_ternary" => "Conserved I/N/U semantic processor with a rewrite diagram.",
            "igsoa_gw" => "Reserved engine type; no distinct physics or observables are defined yet.",
            _ => unreachable!(),
        };
        Ok(json!({"engine_type": engine_type, "description": description}))
    }

    fn list_engines(&self) -> Value {
        let engines: Vec<Value> = self
            .manager
            .list_ids()
            .into_iter()
            .map(|(id, ty)| json!({"engine_id": id, "engine_type": ty}))
            .collect();
        json!({"engines": engines})
    }

    fn create_engine(&mut self, params: &Value) -> EngineResult<Value> {
        let engine_type = required_str(params, "engine_type")?;

        let instance = match engine_type.as_str() {
            "phase4b" => {
                let num_nodes = required_u64(params, "num_nodes")? as usize;
                if num_nodes == 0 || num_nodes > crate::cellular::MAX_NODES {
                    return Err(EngineError::invalid_parameter(format!(
                        "num_nodes must be in 1..={}",
                        crate::cellular::MAX_NODES
                    )));
                }
                EngineInstance::Cellular(CellularEngine::new(num_nodes))
            }
            "igsoa_complex" | "igsoa_complex_2d" | "igsoa_complex_3d" => {
                let (r_c, kappa, gamma, dt) = physics_quad(params)?;
                let engine = match engine_type.as_str() {
                    "igsoa_complex" => {
                        let n = required_u64(params, "num_nodes")? as usize;
                        IgsoaEngine::validate_params(n, r_c, kappa, gamma, dt)?;
                        IgsoaEngine::new_1d(n, r_c, kappa, gamma, dt)
                    }
                    "igsoa_complex_2d" => {
                        let nx = required_u64(params, "N_x")? as usize;
                        let ny = required_u64(params, "N_y")? as usize;
                        IgsoaEngine::validate_params(nx * ny, r_c, kappa, gamma, dt)?;
                        IgsoaEngine::new_2d(nx, ny, r_c, kappa, gamma, dt)
                    }
                    _ => {
                        let nx = required_u64(params, "N_x")? as usize;
                        let ny = required_u64(params, "N_y")? as usize;
                        let nz = required_u64(params, "N_z")? as usize;
                        IgsoaEngine::validate_params(nx * ny * nz, r_c, kappa, gamma, dt)?;
                        IgsoaEngine::new_3d(nx, ny, nz, r_c, kappa, gamma, dt)
                    }
                };
                EngineInstance::Igsoa(engine)
            }
            "satp_higgs_1d" | "satp_higgs_2d" | "satp_higgs_3d" => {
                let c = required_f64(params, "c")?;
                let gamma_phi = optional_f64(params, "gamma_phi", 0.0);
                let gamma_h = optional_f64(params, "gamma_h", 0.0);
                let lambda = optional_f64(params, "lambda", 0.0);
                let mu2 = optional_f64(params, "mu2", 0.0);
                let lambda_h = optional_f64(params, "lambda_h", 0.0);
                let dx = params.get("dx").and_then(Value::as_f64);
                let dt_opt = params.get("dt").and_then(Value::as_f64);
                let dt = dt_opt.unwrap_or(0.001);

                let (nx, ny, nz, ndim) = match engine_type.as_str() {
                    "satp_higgs_1d" => (required_u64(params, "num_nodes")? as usize, 1, 1, 1u8),
                    "satp_higgs_2d" => (
                        required_u64(params, "N_x")? as usize,
                        required_u64(params, "N_y")? as usize,
                        1,
                        2,
                    ),
                    _ => (
                        required_u64(params, "N_x")? as usize,
                        required_u64(params, "N_y")? as usize,
                        required_u64(params, "N_z")? as usize,
                        3,
                    ),
                };
                SatpEngine::validate_params(nx * ny * nz, c, dt)?;
                EngineInstance::Satp(SatpEngine::new(
                    nx, ny, nz, ndim, c, gamma_phi, gamma_h, lambda, mu2, lambda_h, dx, dt_opt,
                ))
            }
            "sid_ternary" => {
                let capacity = optional_f64(params, "capacity", 1.0);
                EngineInstance::Sid(SidEngine::new(capacity)?)
            }
            "igsoa_gw" => {
                return Err(EngineError::invalid_parameter(
                    "igsoa_gw is a reserved engine type with no defined creation parameters.",
                ))
            }
            other => {
                return Err(EngineError::invalid_parameter(format!(
                    "Unknown engine type '{}'.",
                    other
                )))
            }
        };

        let id = self.manager.generate_engine_id();
        self.manager.insert(id.clone(), instance);
        Ok(json!({"engine_id": id, "engine_type": engine_type}))
    }

    fn destroy_engine(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        self.manager.destroy(&id)?;
        Ok(json!({"engine_id": id, "destroyed": true}))
    }

    fn run_mission(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let num_steps = optional_u64(params, "num_steps", 0) as usize;
        let iterations_per_node = optional_u64(params, "iterations_per_node", 1) as usize;
        let input_signals = f64_array(params, "input_signals");
        let control_patterns = f64_array(params, "control_patterns");

        match self.manager.get_mut(&id)? {
            EngineInstance::Cellular(engine) => {
                if num_steps == 0 {
                    return Err(EngineError::invalid_parameter(
                        "num_steps must be greater than 0",
                    ));
                }
                let optimized = params.get("optimized").and_then(Value::as_bool).unwrap_or(false);
                if optimized {
                    engine.run_mission_optimized_phase4c(
                        num_steps,
                        &input_signals,
                        &control_patterns,
                        iterations_per_node,
                    );
                } else {
                    engine.run_mission(num_steps, &input_signals, &control_patterns, iterations_per_node);
                }
                Ok(json!({"engine_id": id}))
            }
            EngineInstance::Igsoa(engine) => {
                engine.run_mission(num_steps, &input_signals, &control_patterns, iterations_per_node)?;
                Ok(json!({"engine_id": id}))
            }
            EngineInstance::Satp(engine) => {
                engine.evolve(num_steps)?;
                Ok(json!({"engine_id": id}))
            }
            EngineInstance::Sid(_) => Err(EngineError::wrong_engine_type(&id, "sid_ternary")),
        }
    }

    fn get_metrics(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let metrics = match self.manager.get(&id)? {
            EngineInstance::Cellular(e) => e.metrics,
            EngineInstance::Igsoa(e) => e.metrics,
            EngineInstance::Satp(e) => e.metrics,
            EngineInstance::Sid(_) => return Err(EngineError::wrong_engine_type(&id, "sid_ternary")),
        };
        Ok(json!({
            "ns_per_op": metrics.ns_per_op,
            "ops_per_sec": metrics.ops_per_sec,
            "speedup": metrics.speedup,
            "total_operations": metrics.total_operations,
        }))
    }

    fn get_state(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let engine = self.manager.igsoa_mut(&id)?;
        let mut dims = json!({"N_x": engine.nx});
        if engine.ndim >= 2 {
            dims["N_y"] = json!(engine.ny);
        }
        if engine.ndim >= 3 {
            dims["N_z"] = json!(engine.nz);
        }
        Ok(json!({
            "psi_r": engine.psi_r,
            "psi_i": engine.psi_i,
            "phi": engine.phi,
            "dimensions": dims,
        }))
    }

    fn set_igsoa_state(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let profile = required_str(params, "profile_type")?;
        let mode = params.get("mode").and_then(Value::as_str).unwrap_or("overwrite");
        let empty = json!({});
        let inner_params = params.get("params").unwrap_or(&empty);
        let engine = self.manager.igsoa_mut(&id)?;
        engine.set_state(&profile, mode, inner_params)?;
        Ok(json!({"engine_id": id}))
    }

    fn set_satp_state(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let profile = required_str(params, "profile_type")?;
        let mode = params.get("mode").and_then(Value::as_str).unwrap_or("overwrite");
        let empty = json!({});
        let inner_params = params.get("params").unwrap_or(&empty);
        let engine = self.manager.satp_mut(&id)?;
        engine.set_state(&profile, mode, inner_params)?;
        Ok(json!({"engine_id": id}))
    }

    fn get_satp_state(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let engine = self.manager.satp_mut(&id)?;
        let (phi_rms, h_rms) = engine.get_state_rms();
        Ok(json!({
            "phi": engine.phi,
            "phi_dot": engine.phi_dot,
            "h": engine.h,
            "h_dot": engine.h_dot,
            "phi_rms": phi_rms,
            "h_rms": h_rms,
        }))
    }

    fn get_center_of_mass(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let engine = self.manager.igsoa_mut(&id)?;
        let (cx, cy, cz) = engine.compute_center_of_mass()?;
        let mut dims = json!({"N_x": engine.nx});
        if engine.ndim >= 2 {
            dims["N_y"] = json!(engine.ny);
        }
        if engine.ndim >= 3 {
            dims["N_z"] = json!(engine.nz);
        }
        let mut result = json!({"dimensions": dims});
        result["center_x"] = json!(cx);
        if engine.ndim >= 2 {
            result["center_y"] = json!(cy);
        }
        if engine.ndim >= 3 {
            result["center_z"] = json!(cz);
        }
        Ok(result)
    }

    fn sid_step(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let alpha = required_f64(params, "alpha")?;
        let engine = self.manager.sid_mut(&id)?;
        engine.step(alpha)?;
        Ok(sid_snapshot(engine))
    }

    fn sid_collapse(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let alpha = required_f64(params, "alpha")?;
        let engine = self.manager.sid_mut(&id)?;
        engine.collapse(alpha)?;
        Ok(sid_snapshot(engine))
    }

    fn sid_apply_rewrite(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let pattern = required_str(params, "pattern")?;
        let replacement = required_str(params, "replacement")?;
        let rule_id = required_str(params, "rule_id")?;
        let engine = self.manager.sid_mut(&id)?;
        engine.apply_rewrite(&pattern, &replacement, &rule_id)?;
        Ok(json!({
            "engine_id": id,
            "applied": engine.last_rewrite_applied(),
            "message": engine.last_rewrite_message(),
        }))
    }

    fn sid_set_diagram_expr(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let expr = required_str(params, "expr")?;
        let rule_id = required_str(params, "rule_id")?;
        let engine = self.manager.sid_mut(&id)?;
        engine.set_diagram_expr(&expr, &rule_id)?;
        Ok(json!({"engine_id": id}))
    }

    fn sid_set_diagram_json(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let diagram = params
            .get("diagram")
            .ok_or_else(|| EngineError::missing_parameter("diagram"))?;
        let engine = self.manager.sid_mut(&id)?;
        engine.set_diagram_json(diagram)?;
        Ok(json!({"engine_id": id}))
    }

    fn sid_get_diagram_json(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let engine = self.manager.sid_mut(&id)?;
        Ok(json!({"diagram": engine.get_diagram_json()?}))
    }

    fn sid_rewrite_events(&mut self, params: &Value) -> EngineResult<Value> {
        let id = required_str(params, "engine_id")?;
        let engine = self.manager.sid_mut(&id)?;
        Ok(json!({"events": engine.rewrite_events()}))
    }
}

fn sid_snapshot(engine: &SidEngine) -> Value {
    let m = engine.metrics();
    json!({
        "i_mass": engine.i_mass(),
        "n_mass": engine.n_mass(),
        "u_mass": engine.u_mass(),
        "instantaneous_gain": engine.instantaneous_gain(),
        "conservation_error": m.conservation_error,
        "collapse_ratio": m.collapse_ratio,
        "transport_ready": m.transport_ready,
    })
}

fn required_str(params: &Value, name: &str) -> EngineResult<String> {
    params
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::missing_parameter(name))
}

fn required_u64(params: &Value, name: &str) -> EngineResult<u64> {
    params
        .get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| EngineError::missing_parameter(name))
}

fn required_f64(params: &Value, name: &str) -> EngineResult<f64> {
    params
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| EngineError::missing_parameter(name))
}

fn optional_f64(params: &Value, name: &str, default: f64) -> f64 {
    params.get(name).and_then(Value::as_f64).unwrap_or(default)
}

fn optional_u64(params: &Value, name: &str, default: u64) -> u64 {
    params.get(name).and_then(Value::as_u64).unwrap_or(default)
}

fn f64_array(params: &Value, name: &str) -> Vec<f64> {
    params
        .get(name)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

/// The shared `(R_c, kappa, gamma, dt)` validation rule applied at the
/// router, before any engine is constructed (SS4.G).
fn physics_quad(params: &Value) -> EngineResult<(f64, f64, f64, f64)> {
    let r_c = optional_f64(params, "R_c", 4.0);
    let kappa = required_f64(params, "kappa")?;
    let gamma = optional_f64(params, "gamma", 0.0);
    let dt = required_f64(params, "dt")?;

    for (name, v) in [("R_c", r_c), ("kappa", kappa), ("dt", dt)] {
        if !v.is_finite() || v <= 0.0 {
            return Err(EngineError::invalid_parameter(format!(
                "{} must be positive and finite",
                name
            )));
        }
    }
    if !gamma.is_finite() || gamma < 0.0 {
        return Err(EngineError::invalid_parameter(
            "gamma must be non-negative and finite",
        ));
    }
    Ok((r_c, kappa, gamma, dt))
}

fn success_envelope(command: &str, elapsed: std::time::Duration, result: Value) -> Value {
    json!({
        "command": command,
        "status": "success",
        "execution_time_ms": elapsed.as_secs_f64() * 1000.0,
        "result": result,
    })
}

fn error_envelope(command: &str, elapsed: std::time::Duration, err: &EngineError) -> Value {
    json!({
        "command": command,
        "status": "error",
        "execution_time_ms": elapsed.as_secs_f64() * 1000.0,
        "error": err.to_string(),
        "error_code": err.code(),
    })
}
