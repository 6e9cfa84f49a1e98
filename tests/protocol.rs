// tests/protocol.rs
//
// End-to-end tests over the JSON command protocol (SS8 testable properties
// and the concrete S1-S6 scenarios), driven through `Router::handle`
// directly rather than a spawned `dase_cli` process -- exercising the
// wire shape without paying for a subprocess per test.

use dase::router::Router;
use serde_json::{json, Value};

fn send(router: &mut Router, req: Value) -> Value {
    router.handle(&req)
}

fn create(router: &mut Router, engine_type: &str, params: Value) -> String {
    let mut full = json!({"engine_type": engine_type});
    if let Value::Object(extra) = params {
        for (k, v) in extra {
            full[k] = v;
        }
    }
    let resp = send(router, json!({"command": "create_engine", "params": full}));
    assert_eq!(resp["status"], "success", "create_engine failed: {:?}", resp);
    resp["result"]["engine_id"].as_str().unwrap().to_string()
}

// --- SS8 property 1: round-trip JSON ---------------------------------

#[test]
fn every_response_carries_command_status_and_timing() {
    let mut router = Router::new();
    for command in ["get_capabilities", "list_engines", "benchmark"] {
        let resp = send(&mut router, json!({"command": command}));
        assert_eq!(resp["command"], command);
        assert!(resp["status"] == "success" || resp["status"] == "error");
        assert!(resp["execution_time_ms"].is_number());
    }
}

// --- SS8 property 2: determinism / seed reproducibility ---------------

#[test]
fn identical_seeded_random_fills_produce_identical_state() {
    let mut router = Router::new();
    let id_a = create(
        &mut router,
        "igsoa_complex",
        json!({"num_nodes": 32, "kappa": 1.0, "dt": 0.01}),
    );
    let id_b = create(
        &mut router,
        "igsoa_complex",
        json!({"num_nodes": 32, "kappa": 1.0, "dt": 0.01}),
    );

    for id in [&id_a, &id_b] {
        let resp = send(
            &mut router,
            json!({
                "command": "set_igsoa_state",
                "params": {"engine_id": id, "profile_type": "random", "params": {"amplitude": 1.0, "seed": 42}}
            }),
        );
        assert_eq!(resp["status"], "success");
    }

    let state_a = send(&mut router, json!({"command": "get_state", "params": {"engine_id": id_a}}));
    let state_b = send(&mut router, json!({"command": "get_state", "params": {"engine_id": id_b}}));
    assert_eq!(state_a["result"]["psi_r"], state_b["result"]["psi_r"]);
    assert_eq!(state_a["result"]["psi_i"], state_b["result"]["psi_i"]);
}

// --- SS8 property 3: identifier monotonicity --------------------------

#[test]
fn engine_ids_are_minted_in_order_and_never_reused() {
    let mut router = Router::new();
    let first = create(&mut router, "phase4b", json!({"num_nodes": 4}));
    let second = create(&mut router, "phase4b", json!({"num_nodes": 4}));
    assert_eq!(first, "engine_001");
    assert_eq!(second, "engine_002");

    send(&mut router, json!({"command": "destroy_engine", "params": {"engine_id": first}}));
    let third = create(&mut router, "phase4b", json!({"num_nodes": 4}));
    assert_eq!(third, "engine_003");
}

// --- SS8 property 4: double-destroy ------------------------------------

#[test]
fn destroying_an_unknown_engine_never_crashes() {
    let mut router = Router::new();
    let id = create(&mut router, "phase4b", json!({"num_nodes": 4}));
    let first = send(&mut router, json!({"command": "destroy_engine", "params": {"engine_id": id.clone()}}));
    assert_eq!(first["status"], "success");
    let second = send(&mut router, json!({"command": "destroy_engine", "params": {"engine_id": id}}));
    assert_eq!(second["error_code"], "ENGINE_NOT_FOUND");
}

// --- SS8 property 5: numeric invariants ---------------------------------

#[test]
fn satp_rms_is_zero_on_an_empty_lattice_not_a_crash() {
    let mut router = Router::new();
    let id = create(&mut router, "satp_higgs_1d", json!({"num_nodes": 1, "c": 1.0, "dt": 0.001}));
    let resp = send(&mut router, json!({"command": "get_satp_state", "params": {"engine_id": id}}));
    assert_eq!(resp["status"], "success");
    assert!(resp["result"]["phi_rms"].as_f64().unwrap().is_finite());
    assert!(resp["result"]["h_rms"].as_f64().unwrap().is_finite());
}

// --- SS8 property 6: SID conservation -----------------------------------

#[test]
fn sid_mass_is_conserved_across_repeated_steps_and_collapses() {
    let mut router = Router::new();
    let id = create(&mut router, "sid_ternary", json!({"capacity": 1.0}));

    for alpha in [0.1, 0.3, 0.05, 0.2] {
        send(&mut router, json!({"command": "sid_step", "params": {"engine_id": id, "alpha": alpha}}));
        let resp = send(&mut router, json!({"command": "sid_collapse", "params": {"engine_id": id, "alpha": alpha}}));
        let total = resp["result"]["i_mass"].as_f64().unwrap()
            + resp["result"]["n_mass"].as_f64().unwrap()
            + resp["result"]["u_mass"].as_f64().unwrap();
        assert!((total - 1.0).abs() < 1e-6, "mass not conserved: {}", total);
    }
}

// --- SS8 property 7: SID cycle rejection --------------------------------

#[test]
fn loading_a_cyclic_diagram_is_rejected_and_leaves_the_prior_diagram_intact() {
    let mut router = Router::new();
    let id = create(&mut router, "sid_ternary", json!({"capacity": 1.0}));

    // a -> b is a valid acyclic diagram.
    let acyclic = json!({
        "nodes": {
            "a": {"id": "a", "op": "P", "inputs": []},
            "b": {"id": "b", "op": "O", "inputs": ["a"]}
        },
        "order": ["a", "b"]
    });
    let set_ok = send(&mut router, json!({"command": "sid_set_diagram_json", "params": {"engine_id": id, "diagram": acyclic}}));
    assert_eq!(set_ok["status"], "success");
    let before = send(&mut router, json!({"command": "sid_get_diagram_json", "params": {"engine_id": id}}));

    // x -> y -> x is a self-referential cycle; ingestion must reject it
    // and leave the previously loaded diagram untouched.
    let cyclic = json!({
        "nodes": {
            "x": {"id": "x", "op": "O", "inputs": ["y"]},
            "y": {"id": "y", "op": "O", "inputs": ["x"]}
        },
        "order": ["x", "y"]
    });
    let set_bad = send(&mut router, json!({"command": "sid_set_diagram_json", "params": {"engine_id": id, "diagram": cyclic}}));
    assert_eq!(set_bad["error_code"], "INVARIANT_FAIL");

    let after = send(&mut router, json!({"command": "sid_get_diagram_json", "params": {"engine_id": id}}));
    assert_eq!(before["result"], after["result"]);
}

#[test]
fn a_rewrite_with_no_matching_node_reports_no_match_and_changes_nothing() {
    let mut router = Router::new();
    let id = create(&mut router, "sid_ternary", json!({"capacity": 1.0}));

    let diagram = json!({
        "nodes": {"a": {"id": "a", "op": "P", "inputs": []}},
        "order": ["a"]
    });
    send(&mut router, json!({"command": "sid_set_diagram_json", "params": {"engine_id": id, "diagram": diagram}}));
    let before = send(&mut router, json!({"command": "sid_get_diagram_json", "params": {"engine_id": id}}));

    let rewrite = send(
        &mut router,
        json!({
            "command": "sid_apply_rewrite",
            "params": {"engine_id": id, "pattern": "C($x, $y)", "replacement": "T($x)", "rule_id": "no_match"}
        }),
    );
    assert_eq!(rewrite["status"], "success");
    assert_eq!(rewrite["result"]["applied"], false);

    let after = send(&mut router, json!({"command": "sid_get_diagram_json", "params": {"engine_id": id}}));
    assert_eq!(before["result"], after["result"]);
}

// --- SS8 property 8: lattice dimension echo -----------------------------

#[test]
fn igsoa_3d_echoes_its_creation_dimensions() {
    let mut router = Router::new();
    let id = create(
        &mut router,
        "igsoa_complex_3d",
        json!({"N_x": 8, "N_y": 8, "N_z": 8, "kappa": 1.0, "dt": 0.01}),
    );
    let state = send(&mut router, json!({"command": "get_state", "params": {"engine_id": id}}));
    assert_eq!(state["result"]["dimensions"]["N_x"], 8);
    assert_eq!(state["result"]["dimensions"]["N_y"], 8);
    assert_eq!(state["result"]["dimensions"]["N_z"], 8);
    assert_eq!(state["result"]["psi_r"].as_array().unwrap().len(), 512);

    let com = send(&mut router, json!({"command": "get_center_of_mass", "params": {"engine_id": id}}));
    assert_eq!(com["result"]["dimensions"]["N_z"], 8);
}

// --- SS8 property 9: parameter validation -------------------------------

#[test]
fn invalid_physics_parameters_are_rejected_before_engine_creation() {
    let mut router = Router::new();
    for params in [
        json!({"engine_type": "igsoa_complex", "num_nodes": 16, "kappa": 0.0, "dt": 0.01}),
        json!({"engine_type": "igsoa_complex", "num_nodes": 16, "kappa": 1.0, "dt": -0.01}),
        json!({"engine_type": "igsoa_complex", "num_nodes": 16, "kappa": 1.0, "dt": 0.01, "gamma": -1.0}),
    ] {
        let resp = send(&mut router, json!({"command": "create_engine", "params": params}));
        assert_eq!(resp["error_code"], "INVALID_PARAMETER");
    }

    // Rejected creations must not have minted an id.
    let list = send(&mut router, json!({"command": "list_engines"}));
    assert!(list["result"]["engines"].as_array().unwrap().is_empty());
}

// --- SS8 property 10: out-of-domain guard -------------------------------

#[test]
fn lattice_exceeding_the_node_cap_is_rejected_cleanly() {
    let mut router = Router::new();
    let resp = send(
        &mut router,
        json!({
            "command": "create_engine",
            "params": {"engine_type": "igsoa_complex_2d", "N_x": 2000, "N_y": 2000, "kappa": 1.0, "dt": 0.01}
        }),
    );
    assert_eq!(resp["error_code"], "INVALID_PARAMETER");
}

// --- Concrete scenario S1: Phase 4C performance sanity ------------------

#[test]
fn s1_phase4c_mission_reports_the_exact_operation_count() {
    let mut router = Router::new();
    let id = create(&mut router, "phase4b", json!({"num_nodes": 2048}));
    let run = send(
        &mut router,
        json!({
            "command": "run_mission",
            "params": {"engine_id": id, "num_steps": 2000, "iterations_per_node": 20, "optimized": true,
                       "input_signals": [0.5], "control_patterns": [1.0]}
        }),
    );
    assert_eq!(run["status"], "success");
    let metrics = send(&mut router, json!({"command": "get_metrics", "params": {"engine_id": id}}));
    assert_eq!(metrics["result"]["total_operations"], 2000u64 * 2048 * 20);
    assert!(metrics["result"]["ns_per_op"].as_f64().unwrap() > 0.0);
}

// --- Concrete scenario S2: IGSOA 2D Gaussian centroid -------------------

#[test]
fn s2_igsoa_2d_gaussian_centroid_lands_near_its_center() {
    let mut router = Router::new();
    let id = create(
        &mut router,
        "igsoa_complex_2d",
        json!({"N_x": 32, "N_y": 32, "kappa": 1.0, "dt": 0.01}),
    );
    send(
        &mut router,
        json!({
            "command": "set_igsoa_state",
            "params": {"engine_id": id, "profile_type": "circular_gaussian",
                       "params": {"amplitude": 1.0, "center_x": 16, "center_y": 16, "sigma": 3.0}}
        }),
    );
    let com = send(&mut router, json!({"command": "get_center_of_mass", "params": {"engine_id": id}}));
    assert_eq!(com["status"], "success");
    let cx = com["result"]["center_x"].as_f64().unwrap();
    let cy = com["result"]["center_y"].as_f64().unwrap();
    assert!((cx - 16.0).abs() < 2.0, "center_x = {}", cx);
    assert!((cy - 16.0).abs() < 2.0, "center_y = {}", cy);
}

// --- Concrete scenario S3: IGSOA 3D state shape -------------------------

#[test]
fn s3_igsoa_3d_state_is_shaped_8_cubed() {
    let mut router = Router::new();
    let id = create(
        &mut router,
        "igsoa_complex_3d",
        json!({"N_x": 8, "N_y": 8, "N_z": 8, "kappa": 1.0, "dt": 0.01}),
    );
    let state = send(&mut router, json!({"command": "get_state", "params": {"engine_id": id}}));
    assert_eq!(state["result"]["psi_r"].as_array().unwrap().len(), 512);
    assert_eq!(state["result"]["psi_i"].as_array().unwrap().len(), 512);
    assert_eq!(state["result"]["phi"].as_array().unwrap().len(), 512);
}

// --- Concrete scenario S4: SATP vacuum ----------------------------------

#[test]
fn s4_satp_vacuum_profile_sets_h_to_its_vev() {
    let mut router = Router::new();
    let id = create(
        &mut router,
        "satp_higgs_1d",
        json!({"num_nodes": 16, "c": 1.0, "dt": 0.001, "mu2": -1.0, "lambda_h": 1.0}),
    );
    send(
        &mut router,
        json!({"command": "set_satp_state", "params": {"engine_id": id, "profile_type": "vacuum"}}),
    );
    let state = send(&mut router, json!({"command": "get_satp_state", "params": {"engine_id": id}}));
    let expected_vev = (1.0_f64).sqrt(); // sqrt(-mu2/lambda_h) = sqrt(1/1)
    for h in state["result"]["h"].as_array().unwrap() {
        assert!((h.as_f64().unwrap() - expected_vev).abs() < 1e-9);
    }
    for phi in state["result"]["phi"].as_array().unwrap() {
        assert_eq!(phi.as_f64().unwrap(), 0.0);
    }
}

// --- Concrete scenario S5: SID conservation under collapse --------------

#[test]
fn s5_sid_collapse_keeps_total_mass_at_capacity() {
    let mut router = Router::new();
    let id = create(&mut router, "sid_ternary", json!({"capacity": 4.0}));
    send(&mut router, json!({"command": "sid_step", "params": {"engine_id": id, "alpha": 0.5}}));
    let resp = send(&mut router, json!({"command": "sid_collapse", "params": {"engine_id": id, "alpha": 0.9}}));
    let total = resp["result"]["i_mass"].as_f64().unwrap()
        + resp["result"]["n_mass"].as_f64().unwrap()
        + resp["result"]["u_mass"].as_f64().unwrap();
    assert!((total - 4.0).abs() < 1e-6);
}

// --- Concrete scenario S6: SID cycle rejection reports and survives -----

#[test]
fn s6_repeated_cycle_inducing_rewrites_never_corrupt_the_engine() {
    let mut router = Router::new();
    let id = create(&mut router, "sid_ternary", json!({"capacity": 1.0}));
    send(
        &mut router,
        json!({"command": "sid_set_diagram_expr", "params": {"engine_id": id, "expr": "C($a, $b)", "rule_id": "seed"}}),
    );
    for _ in 0..3 {
        let resp = send(
            &mut router,
            json!({
                "command": "sid_apply_rewrite",
                "params": {"engine_id": id, "pattern": "C($x, $y)", "replacement": "C($y, $x)", "rule_id": "flip"}
            }),
        );
        assert_eq!(resp["status"], "success");
    }
    // The engine must still answer requests after repeated rewrite attempts.
    let events = send(&mut router, json!({"command": "sid_rewrite_events", "params": {"engine_id": id}}));
    assert_eq!(events["status"], "success");
    assert!(!events["result"]["events"].as_array().unwrap().is_empty());
}
