// src/manager.rs
//
// Owns every live engine instance behind a single map keyed by a minted
// engine id. Dispatch across the four engine families is a tagged union
// matched explicitly, not a trait object -- the four families have little
// behavior in common beyond "has a mission" and forcing them through one
// trait would just relocate the match statement into the trait impls.

use crate::cellular::CellularEngine;
use crate::error::{EngineError, EngineResult};
use crate::igsoa::IgsoaEngine;
use crate::satp::SatpEngine;
use crate::sid::SidEngine;
use std::collections::HashMap;

pub enum EngineInstance {
    Cellular(CellularEngine),
    Igsoa(IgsoaEngine),
    Satp(SatpEngine),
    Sid(SidEngine),
}

impl EngineInstance {
    pub fn type_name(&self) -> &'static str {
        match self {
            EngineInstance::Cellular(_) => "cellular",
            EngineInstance::Igsoa(_) => "igsoa",
            EngineInstance::Satp(_) => "satp",
            EngineInstance::Sid(_) => "sid_ternary",
        }
    }
}

pub struct EngineManager {
    engines: HashMap<String, EngineInstance>,
    next_id: u64,
}

impl EngineManager {
    pub fn new() -> Self {
        if !crate::kernel_lib::is_loaded() {
            crate::kernel_lib::initialize_from_env();
        }
        Self {
            engines: HashMap::new(),
            next_id: 1,
        }
    }

    /// Monotonic, never-reused id minting: a plain counter is sufficient
    /// because the command loop is single-threaded -- there is never a
    /// concurrent `create_engine` call to race against.
    pub fn generate_engine_id(&mut self) -> String {
        let id = format!("engine_{:03}", self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, id: String, instance: EngineInstance) {
        self.engines.insert(id, instance);
    }

    pub fn get(&self, id: &str) -> EngineResult<&EngineInstance> {
        self.engines
            .get(id)
            .ok_or_else(|| EngineError::engine_not_found(id))
    }

    pub fn get_mut(&mut self, id: &str) -> EngineResult<&mut EngineInstance> {
        self.engines
            .get_mut(id)
            .ok_or_else(|| EngineError::engine_not_found(id))
    }

    pub fn destroy(&mut self, id: &str) -> EngineResult<()> {
        self.engines
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::engine_not_found(id))
    }

    pub fn list_ids(&self) -> Vec<(String, &'static str)> {
        let mut out: Vec<(String, &'static str)> = self
            .engines
            .iter()
            .map(|(id, inst)| (id.clone(), inst.type_name()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn cellular_mut(&mut self, id: &str) -> EngineResult<&mut CellularEngine> {
        match self.get_mut(id)? {
            EngineInstance::Cellular(e) => Ok(e),
            other => Err(EngineError::wrong_engine_type(id, other.type_name())),
        }
    }

    pub fn igsoa_mut(&mut self, id: &str) -> EngineResult<&mut IgsoaEngine> {
        match self.get_mut(id)? {
            EngineInstance::Igsoa(e) => Ok(e),
            other => Err(EngineError::wrong_engine_type(id, other.type_name())),
        }
    }

    pub fn satp_mut(&mut self, id: &str) -> EngineResult<&mut SatpEngine> {
        match self.get_mut(id)? {
            EngineInstance::Satp(e) => Ok(e),
            other => Err(EngineError::wrong_engine_type(id, other.type_name())),
        }
    }

    /// Coordinate-addressed single-node read for 2D/3D IGSOA engines,
    /// rejecting any `(x, y, z)` outside the engine's lattice bounds.
    pub fn get_node_psi(&mut self, id: &str, x: usize, y: usize, z: usize) -> EngineResult<(f64, f64, f64)> {
        let engine = self.igsoa_mut(id)?;
        if x >= engine.nx || y >= engine.ny || z >= engine.nz {
            return Err(EngineError::invalid_parameter(format!(
                "coordinate ({}, {}, {}) is out of range for a {}x{}x{} lattice",
                x, y, z, engine.nx, engine.ny, engine.nz
            )));
        }
        let idx = engine.idx_of(x, y, z);
        Ok((engine.psi_r[idx], engine.psi_i[idx], engine.phi[idx]))
    }

    pub fn set_node_psi(
        &mut self,
        id: &str,
        x: usize,
        y: usize,
        z: usize,
        psi_r: f64,
        psi_i: f64,
        phi: f64,
    ) -> EngineResult<()> {
        let engine = self.igsoa_mut(id)?;
        if x >= engine.nx || y >= engine.ny || z >= engine.nz {
            return Err(EngineError::invalid_parameter(format!(
                "coordinate ({}, {}, {}) is out of range for a {}x{}x{} lattice",
                x, y, z, engine.nx, engine.ny, engine.nz
            )));
        }
        let idx = engine.idx_of(x, y, z);
        engine.psi_r[idx] = psi_r;
        engine.psi_i[idx] = psi_i;
        engine.phi[idx] = phi;
        Ok(())
    }

    pub fn sid_mut(&mut self, id: &str) -> EngineResult<&mut SidEngine> {
        match self.get_mut(id)? {
            EngineInstance::Sid(e) => Ok(e),
            other => Err(EngineError::wrong_engine_type(id, other.type_name())),
        }
    }
}

impl Default for EngineManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EngineManager {
    /// Unloads any dynamically loaded kernel library exactly once, at
    /// process shutdown, regardless of how many engines were live.
    fn drop(&mut self) {
        crate::kernel_lib::cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut mgr = EngineManager::new();
        let a = mgr.generate_engine_id();
        let b = mgr.generate_engine_id();
        assert_ne!(a, b);
        assert_eq!(a, "engine_001");
        assert_eq!(b, "engine_002");
    }

    #[test]
    fn destroy_unknown_id_is_engine_not_found() {
        let mut mgr = EngineManager::new();
        let err = mgr.destroy("engine_999").unwrap_err();
        assert_eq!(err.code(), "ENGINE_NOT_FOUND");
    }

    #[test]
    fn wrong_engine_type_is_reported() {
        let mut mgr = EngineManager::new();
        let id = mgr.generate_engine_id();
        mgr.insert(id.clone(), EngineInstance::Cellular(CellularEngine::new(4)));
        let err = mgr.igsoa_mut(&id).unwrap_err();
        assert_eq!(err.code(), "WRONG_ENGINE_TYPE");
    }

    #[test]
    fn node_psi_round_trips_and_rejects_out_of_range() {
        let mut mgr = EngineManager::new();
        let id = mgr.generate_engine_id();
        mgr.insert(
            id.clone(),
            EngineInstance::Igsoa(IgsoaEngine::new_2d(4, 4, 4.0, 1.0, 0.1, 0.01)),
        );
        mgr.set_node_psi(&id, 1, 2, 0, 0.5, -0.25, 0.1).unwrap();
        let (psi_r, psi_i, phi) = mgr.get_node_psi(&id, 1, 2, 0).unwrap();
        assert_eq!((psi_r, psi_i, phi), (0.5, -0.25, 0.1));
        assert!(mgr.get_node_psi(&id, 10, 0, 0).is_err());
    }

    #[test]
    fn list_ids_is_sorted() {
        let mut mgr = EngineManager::new();
        let a = mgr.generate_engine_id();
        let b = mgr.generate_engine_id();
        mgr.insert(b.clone(), EngineInstance::Cellular(CellularEngine::new(1)));
        mgr.insert(a.clone(), EngineInstance::Cellular(CellularEngine::new(1)));
        let ids: Vec<String> = mgr.list_ids().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }
}
