// src/satp.rs
//
// SATP+Higgs coupled-field engines, 1D/2D/3D (SS4.D). Two real fields with
// first-derivative state, evolved as damped coupled wave equations.

use crate::cellular::MissionMetrics;
use crate::error::{EngineError, EngineResult};
use crate::rng::SeededRng;
use serde_json::Value;

pub const MAX_NODES: usize = 1_048_576;

#[derive(Debug, Clone, Copy)]
pub struct ThreeZoneSource {
    pub zones: [(usize, usize); 3],
    pub amplitudes: [f64; 3],
    pub frequency: f64,
    pub window_start_step: u64,
    pub window_end_step: u64,
}

pub struct SatpEngine {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub ndim: u8,
    pub phi: Vec<f64>,
    pub phi_dot: Vec<f64>,
    pub h: Vec<f64>,
    pub h_dot: Vec<f64>,
    pub c: f64,
    pub gamma_phi: f64,
    pub gamma_h: f64,
    pub lambda: f64,
    pub mu2: f64,
    pub lambda_h: f64,
    pub h_vev: f64,
    pub dx: f64,
    pub dt: f64,
    pub metrics: MissionMetrics,
    pub three_zone_source: Option<ThreeZoneSource>,
    step_counter: u64,
}

impl SatpEngine {
    pub fn new(
        nx: usize,
        ny: usize,
        nz: usize,
        ndim: u8,
        c: f64,
        gamma_phi: f64,
        gamma_h: f64,
        lambda: f64,
        mu2: f64,
        lambda_h: f64,
        dx: Option<f64>,
        dt: Option<f64>,
    ) -> Self {
        let n = nx * ny * nz;
        let h_vev = if mu2 < 0.0 && lambda_h > 0.0 {
            (-mu2 / lambda_h).sqrt()
        } else {
            0.0
        };
        Self {
            nx,
            ny,
            nz,
            ndim,
            phi: vec![0.0; n],
            phi_dot: vec![0.0; n],
            h: vec![h_vev; n],
            h_dot: vec![0.0; n],
            c,
            gamma_phi,
            gamma_h,
            lambda,
            mu2,
            lambda_h,
            h_vev,
            dx: dx.unwrap_or(0.1),
            dt: dt.unwrap_or(0.001),
            metrics: MissionMetrics::default(),
            three_zone_source: None,
            step_counter: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    #[inline]
    fn idx_of(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.nx * (y + self.ny * z)
    }

    #[inline]
    fn coord_of(&self, idx: usize) -> (usize, usize, usize) {
        let x = idx % self.nx;
        let y = (idx / self.nx) % self.ny;
        let z = idx / (self.nx * self.ny);
        (x, y, z)
    }

    pub fn validate_params(n_total: usize, c: f64, dt: f64) -> EngineResult<()> {
        if n_total == 0 || n_total > MAX_NODES {
            return Err(EngineError::invalid_parameter(format!(
                "Total node count {} is out of range (1..={})",
                n_total, MAX_NODES
            )));
        }
        if !c.is_finite() || c <= 0.0 {
            return Err(EngineError::invalid_parameter("c must be positive and finite"));
        }
        if !dt.is_finite() || dt <= 0.0 {
            return Err(EngineError::invalid_parameter("dt must be positive and finite"));
        }
        Ok(())
    }

    pub fn set_state(&mut self, profile: &str, mode_str: &str, params: &Value) -> EngineResult<()> {
        match profile {
            "vacuum" => {
                self.phi.iter_mut().for_each(|v| *v = 0.0);
                self.phi_dot.iter_mut().for_each(|v| *v = 0.0);
                self.h.iter_mut().for_each(|v| *v = self.h_vev);
                self.h_dot.iter_mut().for_each(|v| *v = 0.0);
                Ok(())
            }
            "uniform" => {
                let phi = params.get("phi").and_then(Value::as_f64).unwrap_or(0.0);
                let phi_dot = params.get("phi_dot").and_then(Value::as_f64).unwrap_or(0.0);
                let h = params.get("h").and_then(Value::as_f64).unwrap_or(self.h_vev);
                let h_dot = params.get("h_dot").and_then(Value::as_f64).unwrap_or(0.0);
                self.phi.iter_mut().for_each(|v| *v = phi);
                self.phi_dot.iter_mut().for_each(|v| *v = phi_dot);
                self.h.iter_mut().for_each(|v| *v = h);
                self.h_dot.iter_mut().for_each(|v| *v = h_dot);
                Ok(())
            }
            "phi_gaussian" | "phi_circular_gaussian" | "phi_spherical_gaussian" => {
                self.apply_gaussian(mode_str, params, true)
            }
            "higgs_gaussian" | "higgs_circular_gaussian" | "higgs_spherical_gaussian" => {
                self.apply_gaussian(mode_str, params, false)
            }
            "three_zone_source" => self.apply_three_zone_source(params),
            "random_perturbation" => self.apply_random_perturbation(params),
            other => Err(EngineError::invalid_parameter(format!(
                "Unknown profile '{}'",
                other
            ))),
        }
    }

    fn apply_gaussian(&mut self, mode_str: &str, params: &Value, is_phi: bool) -> EngineResult<()> {
        let mode = mode_str;
        let amplitude = params.get("amplitude").and_then(Value::as_f64).unwrap_or(1.0);
        let cx = params.get("center_x").and_then(Value::as_f64).unwrap_or((self.nx as f64) / 2.0);
        let cy = params.get("center_y").and_then(Value::as_f64).unwrap_or((self.ny as f64) / 2.0);
        let cz = params.get("center_z").and_then(Value::as_f64).unwrap_or((self.nz as f64) / 2.0);
        let sigma = params.get("sigma").and_then(Value::as_f64).unwrap_or(4.0);
        let velocity = params.get("velocity").and_then(Value::as_f64).unwrap_or(0.0);
        let beta = params.get("beta").and_then(Value::as_f64).unwrap_or(0.0);
        if mode == "blend" && !(0.0..=1.0).contains(&beta) {
            return Err(EngineError::invalid_parameter("beta must be in [0, 1]"));
        }

        let base = if is_phi { 0.0 } else { self.h_vev };
        let (field, field_dot) = if is_phi {
            (&mut self.phi, &mut self.phi_dot)
        } else {
            (&mut self.h, &mut self.h_dot)
        };

        for idx in 0..field.len() {
            let x = idx % self.nx;
            let y = (idx / self.nx) % self.ny;
            let z = idx / (self.nx * self.ny);
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let dz = z as f64 - cz;
            let r2 = dx * dx + dy * dy + dz * dz;
            let g = amplitude * (-r2 / (2.0 * sigma * sigma)).exp();
            match mode {
                "overwrite" => {
                    field[idx] = base + g;
                    field_dot[idx] = velocity;
                }
                "add" => {
                    field[idx] += g;
                    field_dot[idx] += velocity;
                }
                "blend" => {
                    field[idx] = (1.0 - beta) * field[idx] + beta * (base + g);
                    field_dot[idx] = (1.0 - beta) * field_dot[idx] + beta * velocity;
                }
                other => {
                    return Err(EngineError::invalid_parameter(format!(
                        "Unknown mode '{}'",
                        other
                    )))
                }
            }
        }
        Ok(())
    }

    fn apply_three_zone_source(&mut self, params: &Value) -> EngineResult<()> {
        if self.ndim != 1 {
            return Err(EngineError::invalid_parameter(
                "three_zone_source is only defined for 1D SATP engines",
            ));
        }
        let zones = params
            .get("zones")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::missing_parameter("zones"))?;
        if zones.len() != 3 {
            return Err(EngineError::invalid_parameter("zones must contain exactly 3 entries"));
        }
        let mut parsed_zones = [(0usize, 0usize); 3];
        let mut amplitudes = [0.0; 3];
        for (i, zone) in zones.iter().enumerate() {
            let start = zone.get("start").and_then(Value::as_u64).unwrap_or(0) as usize;
            let end = zone.get("end").and_then(Value::as_u64).unwrap_or(0) as usize;
            let amp = zone.get("amplitude").and_then(Value::as_f64).unwrap_or(0.0);
            parsed_zones[i] = (start, end.min(self.nx));
            amplitudes[i] = amp;
        }
        let frequency = params.get("frequency").and_then(Value::as_f64).unwrap_or(1.0);
        let window_start_step = params.get("window_start_step").and_then(Value::as_u64).unwrap_or(0);
        let window_end_step = params
            .get("window_end_step")
            .and_then(Value::as_u64)
            .unwrap_or(u64::MAX);

        self.three_zone_source = Some(ThreeZoneSource {
            zones: parsed_zones,
            amplitudes,
            frequency,
            window_start_step,
            window_end_step,
        });
        Ok(())
    }

    fn apply_random_perturbation(&mut self, params: &Value) -> EngineResult<()> {
        let amp_phi = params.get("amplitude_phi").and_then(Value::as_f64).unwrap_or(0.1);
        let amp_h = params.get("amplitude_h").and_then(Value::as_f64).unwrap_or(0.1);
        let seed = params
            .get("seed")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::missing_parameter("seed"))?;
        let mut rng = SeededRng::new(seed);
        for i in 0..self.phi.len() {
            self.phi[i] += rng.next_amplitude(amp_phi);
        }
        for i in 0..self.h.len() {
            self.h[i] += rng.next_amplitude(amp_h);
        }
        Ok(())
    }

    pub fn get_state_rms(&self) -> (f64, f64) {
        let n = self.phi.len();
        if n == 0 {
            return (0.0, 0.0);
        }
        let phi_rms = (self.phi.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
        let h_rms = (self.h.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
        (phi_rms, h_rms)
    }

    /// `iterations_per_node` is ignored for SATP (SS4.D).
    pub fn evolve(&mut self, num_steps: usize) -> EngineResult<()> {
        if num_steps == 0 {
            self.metrics = MissionMetrics::default();
            return Ok(());
        }
        let t0 = std::time::Instant::now();
        let n = self.len();

        for _ in 0..num_steps {
            self.evolve_one_step()?;
            self.step_counter += 1;
        }

        let elapsed_ns = t0.elapsed().as_nanos() as u64;
        self.metrics = MissionMetrics::from_totals(elapsed_ns, (num_steps * n) as u64);
        Ok(())
    }

    fn evolve_one_step(&mut self) -> EngineResult<()> {
        let n = self.len();
        let mut next_phi = self.phi.clone();
        let mut next_phi_dot = self.phi_dot.clone();
        let mut next_h = self.h.clone();
        let mut next_h_dot = self.h_dot.clone();

        let source_forcing = self.three_zone_forcing();

        for idx in 0..n {
            let (x, y, z) = self.coord_of(idx);
            let lap_phi = self.laplacian(&self.phi, x, y, z);
            let lap_h = self.laplacian(&self.h, x, y, z);

            let phi_val = self.phi[idx];
            let h_val = self.h[idx];

            let phi_accel = self.c * self.c * lap_phi - self.gamma_phi * self.phi_dot[idx]
                - self.lambda * h_val * phi_val
                + source_forcing[idx];
            let h_accel = self.c * self.c * lap_h - self.gamma_h * self.h_dot[idx]
                - (self.mu2 * h_val + self.lambda_h * h_val.powi(3))
                - self.lambda * phi_val * phi_val;

            next_phi_dot[idx] = self.phi_dot[idx] + phi_accel * self.dt;
            next_h_dot[idx] = self.h_dot[idx] + h_accel * self.dt;
            next_phi[idx] = phi_val + next_phi_dot[idx] * self.dt;
            next_h[idx] = h_val + next_h_dot[idx] * self.dt;
        }

        self.phi = next_phi;
        self.phi_dot = next_phi_dot;
        self.h = next_h;
        self.h_dot = next_h_dot;

        if self.phi.iter().any(|v| !v.is_finite()) || self.h.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::execution_failed(
                "SATP evolution produced a non-finite value",
            ));
        }
        Ok(())
    }

    fn three_zone_forcing(&self) -> Vec<f64> {
        let n = self.len();
        let mut forcing = vec![0.0; n];
        let Some(src) = &self.three_zone_source else {
            return forcing;
        };
        if self.step_counter < src.window_start_step || self.step_counter > src.window_end_step {
            return forcing;
        }
        let phase = (self.step_counter as f64) * src.frequency;
        for (zone, amp) in src.zones.iter().zip(src.amplitudes.iter()) {
            let (start, end) = *zone;
            for x in start..end.min(self.nx) {
                forcing[x] += amp * phase.sin();
            }
        }
        forcing
    }

    fn laplacian(&self, field: &[f64], x: usize, y: usize, z: usize) -> f64 {
        let dx2 = self.dx * self.dx;
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
            (acc - (count as f64) * center) / dx2
        }
    }
}
