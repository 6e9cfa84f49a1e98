// src/kernel_lib.rs
//
// Process-wide singleton for the dynamically loaded Phase 4C shared
// library (SS5, SS9 "Global singletons"). Lazily initialized, explicitly
// cleaned up; construction inside hot paths is forbidden by convention --
// nothing in `cellular.rs`/`manager.rs` touches this module per-step.

use libloading::{Library, Symbol};
use once_cell::sync::OnceCell;
use std::os::raw::{c_double, c_longlong, c_void};
use std::sync::Mutex;

type CreateEngineFn = unsafe extern "C" fn(c_longlong) -> *mut c_void;
type DestroyEngineFn = unsafe extern "C" fn(*mut c_void);
type RunMissionFn = unsafe extern "C" fn(
    *mut c_void,
    *const c_double,
    c_longlong,
    *const c_double,
    c_longlong,
    c_longlong,
    c_longlong,
);
type GetMetricsFn = unsafe extern "C" fn(
    *mut c_void,
    *mut c_double,
    *mut c_double,
    *mut c_double,
    *mut c_longlong,
);

/// Resolved function pointers for one loaded library. `Library` itself is
/// kept alive in `KERNEL` alongside this so the symbols never dangle.
pub struct KernelSymbols {
    pub create_engine: CreateEngineFn,
    pub destroy_engine: DestroyEngineFn,
    pub run_mission_optimized_phase4c: RunMissionFn,
    pub get_metrics: GetMetricsFn,
}

struct LoadedKernel {
    _library: Library,
    symbols: KernelSymbols,
}

static KERNEL: OnceCell<Mutex<Option<LoadedKernel>>> = OnceCell::new();

fn slot() -> &'static Mutex<Option<LoadedKernel>> {
    KERNEL.get_or_init(|| Mutex::new(None))
}

/// Attempts to load `path` and resolve the Phase 4C symbol set, probing
/// fallback names in the priority order the shared library contract
/// specifies (SS6): `..._phase4c` -> `..._phase4b` -> `..._optimized`.
///
/// Returns `true` if a usable kernel is now loaded. Never panics; a missing
/// library or missing symbols leaves the fallback in-process kernel as the
/// only implementation of `phase4b` (SS4.B).
pub fn initialize(path: &str) -> bool {
    let mut guard = slot().lock().unwrap_or_else(|e| e.into_inner());
    if guard.is_some() {
        return true;
    }

    let library = match unsafe { Library::new(path) } {
        Ok(lib) => lib,
        Err(e) => {
            log::warn!("Failed to load Phase 4C shared library '{}': {}.", path, e);
            return false;
        }
    };

    let run_mission = unsafe {
        find_symbol::<RunMissionFn>(
            &library,
            &[
                "dase_run_mission_optimized_phase4c",
                "dase_run_mission_optimized_phase4b",
                "dase_run_mission_optimized",
            ],
        )
    };
    let create_engine = unsafe { find_symbol::<CreateEngineFn>(&library, &["dase_create_engine"]) };
    let destroy_engine =
        unsafe { find_symbol::<DestroyEngineFn>(&library, &["dase_destroy_engine"]) };
    let get_metrics = unsafe { find_symbol::<GetMetricsFn>(&library, &["dase_get_metrics"]) };

    match (run_mission, create_engine, destroy_engine, get_metrics) {
        (Some(run_mission_optimized_phase4c), Some(create_engine), Some(destroy_engine), Some(get_metrics)) => {
            *guard = Some(LoadedKernel {
                _library: library,
                symbols: KernelSymbols {
                    create_engine,
                    destroy_engine,
                    run_mission_optimized_phase4c,
                    get_metrics,
                },
            });
            true
        }
        _ => {
            log::warn!(
                "Phase 4C shared library '{}' is missing one or more required symbols.",
                path
            );
            false
        }
    }
}

pub const PHASE4C_LIBRARY_ENV: &str = "DASE_PHASE4C_LIBRARY";

/// Best-effort startup probe (SS4.F): loads the Phase 4C kernel from the
/// path named by `DASE_PHASE4C_LIBRARY` if that variable is set. Called
/// from `EngineManager::new`. An unset variable or an unloadable library
/// is not an error -- `phase4b` keeps running on the in-process kernel
/// either way (SS6 "Environment variables: none required").
pub fn initialize_from_env() -> bool {
    match std::env::var(PHASE4C_LIBRARY_ENV) {
        Ok(path) => initialize(&path),
        Err(_) => false,
    }
}

unsafe fn find_symbol<T: Copy>(library: &Library, names: &[&str]) -> Option<T> {
    for name in names {
        if let Ok(sym) = library.get::<T>(name.as_bytes()) {
            let sym: Symbol<T> = sym;
            return Some(*sym);
        }
    }
    None
}

pub fn is_loaded() -> bool {
    slot().lock().map(|g| g.is_some()).unwrap_or(false)
}

pub fn with_symbols<R>(f: impl FnOnce(&KernelSymbols) -> R) -> Option<R> {
    let guard = slot().lock().unwrap_or_else(|e| e.into_inner());
    guard.as_ref().map(|k| f(&k.symbols))
}

/// Frees the loaded library (if any), dropping its resolved function
/// pointers along with it, and runs the FFT wisdom cleanup hook. Each step
/// is independently fallible and logged rather than propagated, so a
/// failure in one does not skip the others (SS4.F).
pub fn cleanup() {
    let mut guard = slot().lock().unwrap_or_else(|e| e.into_inner());
    if guard.take().is_some() {
        log::info!("Phase 4C kernel library unloaded.");
    }
    cleanup_fft_wisdom();
}

/// Placeholder for the FFTW wisdom cache cleanup hook. Real wisdom-file
/// management lives in the external Python/analysis collaborator; this
/// crate only preserves the hook point and its ordering relative to
/// library unload (SS4.F, SS5).
fn cleanup_fft_wisdom() {
    log::debug!("FFT wisdom cache cleanup hook ran (no-op in-process).");
}
