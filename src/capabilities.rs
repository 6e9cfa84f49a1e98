// src/capabilities.rs
//
// CPU capability detection for `get_capabilities` (SS6, GLOSSARY
// "Capability set"). Cheap but not free, so the result is cached behind a
// `OnceLock` -- the set of ISA features a process can use never changes
// for the lifetime of that process.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CpuCapabilities {
    pub avx2: bool,
    pub fma: bool,
    pub avx512: bool,
    /// Logical core count, as reported by `num_cpus::get()` -- the same
    /// figure the Phase 4B/4C mission kernels size their worker count from.
    pub logical_cores: usize,
}

static CAPS: OnceLock<CpuCapabilities> = OnceLock::new();

pub fn detect() -> CpuCapabilities {
    *CAPS.get_or_init(|| {
        let logical_cores = num_cpus::get();
        #[cfg(target_arch = "x86_64")]
        {
            CpuCapabilities {
                avx2: std::is_x86_feature_detected!("avx2"),
                fma: std::is_x86_feature_detected!("fma"),
                avx512: std::is_x86_feature_detected!("avx512f"),
                logical_cores,
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            CpuCapabilities {
                avx2: false,
                fma: false,
                avx512: false,
                logical_cores,
            }
        }
    })
}
