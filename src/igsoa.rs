// src/igsoa.rs
//
// IGSOA complex lattice engines, 1D/2D/3D (SS4.C). A single struct models
// all three dimensionalities; `ndim` selects which axes are active and
// `ny`/`nz` are 1 when unused, which keeps the index<->coord bijection
// uniform rather than forking three near-identical structs.

use crate::cellular::MissionMetrics;
use crate::error::{EngineError, EngineResult};
use crate::rng::SeededRng;
use serde_json::Value;

pub const MAX_NODES: usize = 1_048_576;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Overwrite,
    Add,
    Blend,
}

impl Mode {
    fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "overwrite" => Ok(Mode::Overwrite),
            "add" => Ok(Mode::Add),
            "blend" => Ok(Mode::Blend),
            other => Err(EngineError::invalid_parameter(format!(
                "Unknown mode '{}'",
                other
            ))),
        }
    }
}

pub struct IgsoaEngine {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub ndim: u8,
    pub psi_r: Vec<f64>,
    pub psi_i: Vec<f64>,
    pub phi: Vec<f64>,
    pub r_c: f64,
    pub kappa: f64,
    pub gamma: f64,
    pub dt: f64,
    pub metrics: MissionMetrics,
}

impl IgsoaEngine {
    pub fn new_1d(num_nodes: usize, r_c: f64, kappa: f64, gamma: f64, dt: f64) -> Self {
        Self::new(num_nodes, 1, 1, 1, r_c, kappa, gamma, dt)
    }

    pub fn new_2d(nx: usize, ny: usize, r_c: f64, kappa: f64, gamma: f64, dt: f64) -> Self {
        Self::new(nx, ny, 1, 2, r_c, kappa, gamma, dt)
    }

    pub fn new_3d(nx: usize, ny: usize, nz: usize, r_c: f64, kappa: f64, gamma: f64, dt: f64) -> Self {
        Self::new(nx, ny, nz, 3, r_c, kappa, gamma, dt)
    }

    fn new(nx: usize, ny: usize, nz: usize, ndim: u8, r_c: f64, kappa: f64, gamma: f64, dt: f64) -> Self {
        let n = nx * ny * nz;
        Self {
            nx,
            ny,
            nz,
            ndim,
            psi_r: vec![0.0; n],
            psi_i: vec![0.0; n],
            phi: vec![0.0; n],
            r_c,
            kappa,
            gamma,
            dt,
            metrics: MissionMetrics::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    #[inline]
    pub fn idx_of(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.nx * (y + self.ny * z)
    }

    #[inline]
    pub fn coord_of(&self, idx: usize) -> (usize, usize, usize) {
        let x = idx % self.nx;
        let y = (idx / self.nx) % self.ny;
        let z = idx / (self.nx * self.ny);
        (x, y, z)
    }

    /// Validates creation parameters per SS4.C: strictly-positive params
    /// finite and > 0, `gamma` finite and >= 0, total size within cap.
    pub fn validate_params(n_total: usize, r_c: f64, kappa: f64, gamma: f64, dt: f64) -> EngineResult<()> {
        if n_total == 0 || n_total > MAX_NODES {
            return Err(EngineError::invalid_parameter(format!(
                "Total node count {} is out of range (1..={})",
                n_total, MAX_NODES
            )));
        }
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
        Ok(())
    }

    pub fn set_state(&mut self, profile: &str, mode_str: &str, params: &Value) -> EngineResult<()> {
        if profile == "reset" {
            self.psi_r.iter_mut().for_each(|v| *v = 0.0);
            self.psi_i.iter_mut().for_each(|v| *v = 0.0);
            self.phi.iter_mut().for_each(|v| *v = 0.0);
            return Ok(());
        }

        let mode = Mode::parse(mode_str)?;
        let beta = params.get("beta").and_then(Value::as_f64).unwrap_or(0.0);
        if mode == Mode::Blend && !(0.0..=1.0).contains(&beta) {
            return Err(EngineError::invalid_parameter("beta must be in [0, 1]"));
        }

        if profile == "localized" {
            return self.set_localized(mode, beta, params);
        }

        let baseline = params.get("baseline_phi").and_then(Value::as_f64).unwrap_or(0.0);
        let (new_r, new_i, new_phi) = self.generate_profile(profile, params)?;

        for idx in 0..self.len() {
            let (gr, gi, g) = (new_r[idx], new_i[idx], new_phi[idx]);
            match mode {
                Mode::Overwrite => {
                    self.psi_r[idx] = gr;
                    self.psi_i[idx] = gi;
                    self.phi[idx] = baseline + g;
                }
                Mode::Add => {
                    self.psi_r[idx] += gr;
                    self.psi_i[idx] += gi;
                    self.phi[idx] += g;
                }
                Mode::Blend => {
                    self.psi_r[idx] = (1.0 - beta) * self.psi_r[idx] + beta * gr;
                    self.psi_i[idx] = (1.0 - beta) * self.psi_i[idx] + beta * gi;
                    self.phi[idx] = (1.0 - beta) * self.phi[idx] + beta * (baseline + g);
                }
            }
        }
        Ok(())
    }

    fn set_localized(&mut self, mode: Mode, beta: f64, params: &Value) -> EngineResult<()> {
        let index = params
            .get("node_index")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::missing_parameter("node_index"))? as usize;
        if index >= self.len() {
            return Err(EngineError::invalid_parameter("node_index out of range"));
        }
        let psi_r = params.get("psi_r").and_then(Value::as_f64).unwrap_or(0.0);
        let psi_i = params.get("psi_i").and_then(Value::as_f64).unwrap_or(0.0);
        let phi = params.get("phi").and_then(Value::as_f64).unwrap_or(0.0);

        match mode {
            Mode::Overwrite => {
                self.psi_r.iter_mut().for_each(|v| *v = 0.0);
                self.psi_i.iter_mut().for_each(|v| *v = 0.0);
                self.phi.iter_mut().for_each(|v| *v = 0.0);
                self.psi_r[index] = psi_r;
                self.psi_i[index] = psi_i;
                self.phi[index] = phi;
            }
            Mode::Add => {
                self.psi_r[index] += psi_r;
                self.psi_i[index] += psi_i;
                self.phi[index] += phi;
            }
            Mode::Blend => {
                self.psi_r[index] = (1.0 - beta) * self.psi_r[index] + beta * psi_r;
                self.psi_i[index] = (1.0 - beta) * self.psi_i[index] + beta * psi_i;
                self.phi[index] = (1.0 - beta) * self.phi[index] + beta * phi;
            }
        }
        Ok(())
    }

    /// Computes the raw (psi_r, psi_i, phi) generator arrays for a profile,
    /// independent of mode -- mode combination happens in `set_state`.
    fn generate_profile(&self, profile: &str, params: &Value) -> EngineResult<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let n = self.len();
        let mut psi_r = vec![0.0; n];
        let mut psi_i = vec![0.0; n];
        let mut phi = vec![0.0; n];
        let amplitude = params.get("amplitude").and_then(Value::as_f64).unwrap_or(1.0);

        match profile {
            "gaussian" | "gaussian_2d" | "gaussian_3d" | "circular_gaussian" | "spherical_gaussian" => {
                let cx = params.get("center_x").and_then(Value::as_f64).unwrap_or((self.nx as f64) / 2.0);
                let cy = params.get("center_y").and_then(Value::as_f64).unwrap_or((self.ny as f64) / 2.0);
                let cz = params.get("center_z").and_then(Value::as_f64).unwrap_or((self.nz as f64) / 2.0);
                let sigma = params.get("sigma").and_then(Value::as_f64).unwrap_or(4.0);
                for idx in 0..n {
                    let (x, y, z) = self.coord_of(idx);
                    let dx = x as f64 - cx;
                    let dy = y as f64 - cy;
                    let dz = z as f64 - cz;
                    let r2 = dx * dx + dy * dy + dz * dz;
                    let g = amplitude * (-r2 / (2.0 * sigma * sigma)).exp();
                    psi_r[idx] = g;
                    phi[idx] = g;
                }
            }
            "plane_wave_2d" | "plane_wave_3d" => {
                let kx = params.get("kx").and_then(Value::as_f64).unwrap_or(1.0);
                let ky = params.get("ky").and_then(Value::as_f64).unwrap_or(0.0);
                let kz = params.get("kz").and_then(Value::as_f64).unwrap_or(0.0);
                let phase = params.get("phase").and_then(Value::as_f64).unwrap_or(0.0);
                for idx in 0..n {
                    let (x, y, z) = self.coord_of(idx);
                    let theta = kx * x as f64 + ky * y as f64 + kz * z as f64 + phase;
                    psi_r[idx] = amplitude * theta.cos();
                    psi_i[idx] = amplitude * theta.sin();
                }
            }
            "uniform" => {
                let pr = params.get("psi_r").and_then(Value::as_f64).unwrap_or(0.0);
                let pi = params.get("psi_i").and_then(Value::as_f64).unwrap_or(0.0);
                let ph = params.get("phi").and_then(Value::as_f64).unwrap_or(0.0);
                psi_r.iter_mut().for_each(|v| *v = pr);
                psi_i.iter_mut().for_each(|v| *v = pi);
                phi.iter_mut().for_each(|v| *v = ph);
            }
            "random" | "random_2d" | "random_3d" => {
                let seed = params.get("seed").and_then(Value::as_u64).unwrap_or(0);
                let mut rng = SeededRng::new(seed);
                for idx in 0..n {
                    psi_r[idx] = rng.next_amplitude(amplitude);
                    psi_i[idx] = rng.next_amplitude(amplitude);
                    phi[idx] = rng.next_amplitude(amplitude);
                }
            }
            other => {
                return Err(EngineError::invalid_parameter(format!(
                    "Unknown profile '{}'",
                    other
                )))
            }
        }
        Ok((psi_r, psi_i, phi))
    }

    /// Leaves the lattice unmodified if `num_steps == 0` (SS4.C contract).
    pub fn run_mission(
        &mut self,
        num_steps: usize,
        input_signals: &[f64],
        control_patterns: &[f64],
        iterations_per_node: usize,
    ) -> EngineResult<()> {
        if num_steps == 0 {
            self.metrics = MissionMetrics::default();
            return Ok(());
        }
        let t0 = std::time::Instant::now();
        let n = self.len();
        let iters = if iterations_per_node == 0 { 30 } else { iterations_per_node };

        for step in 0..num_steps {
            let forcing = sample_at(input_signals, step) * sample_at(control_patterns, step);
            for _ in 0..iters {
                self.evolve_once(forcing)?;
            }
        }

        let elapsed_ns = t0.elapsed().as_nanos() as u64;
        self.metrics = MissionMetrics::from_totals(elapsed_ns, (num_steps * n * iters) as u64);
        Ok(())
    }

    /// One damped, nearest-neighbor-coupled update of (psi, phi). The exact
    /// PDE is left open by SS4.C; this update is chosen to be unconditionally
    /// stable for small `dt * kappa` and to never produce NaN for finite
    /// inputs, which is the only contract SS4.C fixes.
    fn evolve_once(&mut self, forcing: f64) -> EngineResult<()> {
        let n = self.len();
        let mut next_r = self.psi_r.clone();
        let mut next_i = self.psi_i.clone();
        let mut next_phi = self.phi.clone();

        for idx in 0..n {
            let (x, y, z) = self.coord_of(idx);
            let lap_r = self.laplacian(&self.psi_r, x, y, z);
            let lap_i = self.laplacian(&self.psi_i, x, y, z);
            let lap_phi = self.laplacian(&self.phi, x, y, z);

            let damp = 1.0 - self.gamma * self.dt;
            next_r[idx] = self.psi_r[idx] * damp + self.kappa * self.dt * lap_r;
            next_i[idx] = self.psi_i[idx] * damp + self.kappa * self.dt * lap_i + forcing * self.dt;
            next_phi[idx] = self.phi[idx] * damp + self.kappa * self.dt * lap_phi;
        }

        self.psi_r = next_r;
        self.psi_i = next_i;
        self.phi = next_phi;

        if self.psi_r.iter().any(|v| !v.is_finite())
            || self.psi_i.iter().any(|v| !v.is_finite())
            || self.phi.iter().any(|v| !v.is_finite())
        {
            return Err(EngineError::execution_failed(
                "IGSOA evolution produced a non-finite value",
            ));
        }
        Ok(())
    }

    fn laplacian(&self, field: &[f64], x: usize, y: usize, z: usize) -> f64 {
        let center = field[self.idx_of(x, y, z)];
        let mut acc = 0.0;
        let mut count = 0;
        if x > 0 {
            acc += field[self.idx_of(x - 1, y, z)];
            count += 1;
        }
        if x + 1 < self.nx {
            acc += field[self.idx_of(x + 1, y, z)];
            count += 1;
        }
        if self.ndim >= 2 {
            if y > 0 {
                acc += field[self.idx_of(x, y - 1, z)];
                count += 1;
            }
            if y + 1 < self.ny {
                acc += field[self.idx_of(x, y + 1, z)];
                count += 1;
            }
        }
        if self.ndim >= 3 {
            if z > 0 {
                acc += field[self.idx_of(x, y, z - 1)];
                count += 1;
            }
            if z + 1 < self.nz {
                acc += field[self.idx_of(x, y, z + 1)];
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            acc - (count as f64) * center
        }
    }

    pub fn compute_center_of_mass(&self) -> EngineResult<(f64, f64, f64)> {
        if self.ndim < 2 {
            return Err(EngineError::invalid_parameter(
                "compute_center_of_mass requires a 2D or 3D engine",
            ));
        }
        let mut weight_total = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        let mut cz = 0.0;
        for idx in 0..self.len() {
            let w = self.psi_r[idx] * self.psi_r[idx] + self.psi_i[idx] * self.psi_i[idx];
            let (x, y, z) = self.coord_of(idx);
            cx += w * x as f64;
            cy += w * y as f64;
            cz += w * z as f64;
            weight_total += w;
        }
        if weight_total <= 0.0 {
            return Ok((0.0, 0.0, 0.0));
        }
        Ok((cx / weight_total, cy / weight_total, cz / weight_total))
    }
}

#[inline]
fn sample_at(arr: &[f64], step: usize) -> f64 {
    if arr.is_empty() {
        0.0
    } else {
        arr[step % arr.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn circular_gaussian_centroid_matches_center() {
        let mut engine = IgsoaEngine::new_2d(64, 64, 4.0, 1.0, 0.1, 0.01);
        engine
            .set_state(
                "circular_gaussian",
                "overwrite",
                &json!({"amplitude": 1.0, "center_x": 32.0, "center_y": 32.0, "sigma": 8.0}),
            )
            .unwrap();
        let (x, y, _z) = engine.compute_center_of_mass().unwrap();
        assert!((x - 32.0).abs() < 0.5, "x_cm={}", x);
        assert!((y - 32.0).abs() < 0.5, "y_cm={}", y);
    }

    #[test]
    fn three_d_state_shape_matches_dimensions() {
        let engine = IgsoaEngine::new_3d(8, 8, 8, 4.0, 1.0, 0.1, 0.01);
        assert_eq!(engine.len(), 512);
        assert_eq!(engine.nx, 8);
        assert_eq!(engine.ny, 8);
        assert_eq!(engine.nz, 8);
    }

    #[test]
    fn zero_steps_leave_lattice_unmodified() {
        let mut engine = IgsoaEngine::new_1d(16, 4.0, 1.0, 0.1, 0.01);
        engine
            .set_state("uniform", "overwrite", &json!({"psi_r": 1.0, "psi_i": 0.5, "phi": 0.25}))
            .unwrap();
        let before = engine.psi_r.clone();
        engine.run_mission(0, &[], &[], 30).unwrap();
        assert_eq!(engine.psi_r, before);
    }

    #[test]
    fn deterministic_random_profile_is_seed_stable() {
        let mut a = IgsoaEngine::new_1d(32, 4.0, 1.0, 0.1, 0.01);
        let mut b = IgsoaEngine::new_1d(32, 4.0, 1.0, 0.1, 0.01);
        a.set_state("random", "overwrite", &json!({"amplitude": 2.0, "seed": 99}))
            .unwrap();
        b.set_state("random", "overwrite", &json!({"amplitude": 2.0, "seed": 99}))
            .unwrap();
        assert_eq!(a.psi_r, b.psi_r);
        assert_eq!(a.psi_i, b.psi_i);
    }

    #[test]
    fn validate_params_rejects_non_positive_rc() {
        assert!(IgsoaEngine::validate_params(16, 0.0, 1.0, 0.1, 0.01).is_err());
        assert!(IgsoaEngine::validate_params(16, 4.0, 1.0, -0.1, 0.01).is_err());
        assert!(IgsoaEngine::validate_params(0, 4.0, 1.0, 0.1, 0.01).is_err());
        assert!(IgsoaEngine::validate_params(MAX_NODES + 1, 4.0, 1.0, 0.1, 0.01).is_err());
    }
}
