// src/cabi.rs
//
// The stable C-ABI surface for the Phase 4C kernel (SS4.B, SS6). These
// `extern "C"` exports let this crate itself be built as a `cdylib` and
// loaded by another process the same way `kernel_lib` loads a *different*
// shared library into this one -- the contract is symmetric.

use crate::cellular::CellularEngine;
use std::os::raw::{c_double, c_longlong};

/// Opaque handle; callers across the FFI boundary never see the layout.
pub type EngineHandle = *mut CellularEngine;

#[no_mangle]
pub extern "C" fn dase_create_engine(num_nodes: c_longlong) -> EngineHandle {
    if num_nodes <= 0 || num_nodes as usize > crate::cellular::MAX_NODES {
        return std::ptr::null_mut();
    }
    let engine = Box::new(CellularEngine::new(num_nodes as usize));
    Box::into_raw(engine)
}

/// SAFETY: `handle` must be a pointer previously returned by
/// `dase_create_engine` and not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn dase_destroy_engine(handle: EngineHandle) {
    if handle.is_null() {
        return;
    }
    drop(Box::from_raw(handle));
}

/// SAFETY: `handle` must be live; `input`/`control` must point to at least
/// `input_len`/`control_len` contiguous `f64`s.
#[no_mangle]
pub unsafe extern "C" fn dase_run_mission_optimized_phase4c(
    handle: EngineHandle,
    input: *const c_double,
    input_len: c_longlong,
    control: *const c_double,
    control_len: c_longlong,
    num_steps: c_longlong,
    iters: c_longlong,
) {
    if handle.is_null() || num_steps <= 0 {
        return;
    }
    let engine = &mut *handle;
    let input_slice = if input.is_null() || input_len <= 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(input, input_len as usize)
    };
    let control_slice = if control.is_null() || control_len <= 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(control, control_len as usize)
    };
    engine.run_mission_optimized_phase4c(
        num_steps as usize,
        input_slice,
        control_slice,
        iters.max(1) as usize,
    );
}

/// SAFETY: `handle` may be null or dangling from the caller's perspective;
/// this function must never crash on a missing handle (SS4.B failure
/// semantics) and instead writes neutral zeros.
#[no_mangle]
pub unsafe extern "C" fn dase_get_metrics(
    handle: EngineHandle,
    ns_per_op: *mut c_double,
    ops_per_sec: *mut c_double,
    speedup: *mut c_double,
    total_ops: *mut c_longlong,
) {
    let metrics = if handle.is_null() {
        crate::cellular::MissionMetrics::default()
    } else {
        (*handle).metrics
    };
    if !ns_per_op.is_null() {
        *ns_per_op = metrics.ns_per_op;
    }
    if !ops_per_sec.is_null() {
        *ops_per_sec = metrics.ops_per_sec;
    }
    if !speedup.is_null() {
        *speedup = metrics.speedup;
    }
    if !total_ops.is_null() {
        *total_ops = metrics.total_operations as c_longlong;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_out_of_range_counts() {
        assert!(dase_create_engine(0).is_null());
        assert!(dase_create_engine(-1).is_null());
        assert!(dase_create_engine((crate::cellular::MAX_NODES as i64 + 1)).is_null());
    }

    #[test]
    fn metrics_on_null_handle_are_neutral_zeros() {
        let mut ns = -1.0;
        let mut ops = -1.0;
        let mut speedup = -1.0;
        let mut total: i64 = -1;
        unsafe {
            dase_get_metrics(std::ptr::null_mut(), &mut ns, &mut ops, &mut speedup, &mut total);
        }
        assert_eq!(ns, 0.0);
        assert_eq!(ops, 0.0);
        assert_eq!(speedup, 0.0);
        assert_eq!(total, 0);
    }

    #[test]
    fn round_trip_through_the_c_abi() {
        let handle = dase_create_engine(64);
        assert!(!handle.is_null());
        let input = [1.0, 0.5];
        let control = [1.0];
        unsafe {
            dase_run_mission_optimized_phase4c(
                handle,
                input.as_ptr(),
                input.len() as i64,
                control.as_ptr(),
                control.len() as i64,
                10,
                2,
            );
            let mut ns = 0.0;
            let mut ops = 0.0;
            let mut speedup = 0.0;
            let mut total: i64 = 0;
            dase_get_metrics(handle, &mut ns, &mut ops, &mut speedup, &mut total);
            assert_eq!(total, 10 * 64 * 2);
            dase_destroy_engine(handle);
        }
    }
}
