// src/lib.rs
//
// =============================================================================
// DASE: LIBRARY ROOT
// =============================================================================
//
// This file declares the module tree and exports the public API: the
// command router that `dase_cli` drives, the engine manager it sits on top
// of, and the four engine families (cellular, IGSOA, SATP+Higgs, SID).

pub mod cabi;
pub mod capabilities;
pub mod cellular;
pub mod error;
pub mod igsoa;
pub mod kernel_lib;
pub mod manager;
pub mod node;
pub mod rng;
pub mod router;
pub mod satp;
pub mod sid;

pub use error::{EngineError, EngineResult};
pub use manager::{EngineInstance, EngineManager};
pub use router::Router;
