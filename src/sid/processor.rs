// src/sid/processor.rs
//
// Per-field semantic processor (SS4.E "Semantic processor"). `SidEngine`
// holds three mass fields (I, N, U); this module is the set of field-level
// operations and metrics the spec assigns to "each processor" rather than
// to the mixer. The mixer (SS4.E "Mixer") enforces conservation *across*
// the three fields after any of these run; it is not re-derived here.

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessorMetrics {
    pub stability: f64,
    pub coherence: f64,
    pub divergence: f64,
}

/// Computes `stability`, `coherence`, `divergence` for a single field
/// against a shared capacity, per SS4.E's per-processor metric trio.
pub fn metrics(field: &[f64], capacity: f64) -> ProcessorMetrics {
    let total: f64 = field.iter().sum();
    let stability = if capacity > 0.0 {
        1.0 - (total / capacity).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let n = field.len();
    let coherence = if n == 0 {
        1.0
    } else {
        let mean = total / n as f64;
        let variance = field.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        1.0 / (1.0 + variance)
    };

    let divergence = if n < 2 {
        0.0
    } else {
        field.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (n - 1) as f64
    };

    ProcessorMetrics {
        stability,
        coherence,
        divergence,
    }
}

fn validate_mask(mask: &[f64], expected_len: usize) -> EngineResult<()> {
    if mask.len() != expected_len {
        return Err(EngineError::invalid_parameter(
            "mask length must match field length",
        ));
    }
    if mask.iter().any(|m| !m.is_finite() || !(0.0..=1.0).contains(m)) {
        return Err(EngineError::invalid_parameter(
            "mask values must be finite and within [0, 1]",
        ));
    }
    Ok(())
}

/// `apply_collapse(mask, alpha)`: subtracts `clamp(mask_i * alpha, 0, f_i)`
/// from each cell of `field`, in place.
pub fn apply_collapse(field: &mut [f64], mask: &[f64], alpha: f64) -> EngineResult<()> {
    validate_mask(mask, field.len())?;
    if !alpha.is_finite() {
        return Err(EngineError::invalid_parameter("alpha must be finite"));
    }
    for (cell, m) in field.iter_mut().zip(mask) {
        let drop = (m * alpha).clamp(0.0, *cell);
        *cell -= drop;
    }
    Ok(())
}

/// `apply_collapse_mask(dual_mask, alpha)`: subtracts
/// `alpha * (m_i + m_n)_x * f_x` per cell. Requires `m_i(x) + m_n(x) <= 1`
/// at every point; `alpha` is clamped into `[0, 1]` rather than rejected.
pub fn apply_collapse_mask(
    field: &mut [f64],
    m_i: &[f64],
    m_n: &[f64],
    alpha: f64,
) -> EngineResult<()> {
    if m_i.len() != field.len() || m_n.len() != field.len() {
        return Err(EngineError::invalid_parameter(
            "dual mask length must match field length",
        ));
    }
    for (a, b) in m_i.iter().zip(m_n.iter()) {
        if !a.is_finite() || !b.is_finite() || a + b > 1.0 + 1e-9 {
            return Err(EngineError::invariant_fail(
                "dual mask violates M_I(x) + M_N(x) <= 1",
            ));
        }
    }
    let alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 0.0 };
    for ((cell, a), b) in field.iter_mut().zip(m_i.iter()).zip(m_n.iter()) {
        *cell -= alpha * (a + b) * *cell;
    }
    Ok(())
}

/// `route_from_field(src, mask, alpha)`: adds `alpha * mask_i * src_i` to
/// `field`. Negative mask values, a negative `alpha`, or a non-`[0,1]` mask
/// are hard errors.
pub fn route_from_field(field: &mut [f64], src: &[f64], mask: &[f64], alpha: f64) -> EngineResult<()> {
    if src.len() != field.len() {
        return Err(EngineError::invalid_parameter(
            "source field length must match destination field length",
        ));
    }
    validate_mask(mask, field.len())?;
    if !alpha.is_finite() || alpha < 0.0 {
        return Err(EngineError::invalid_parameter(
            "alpha must be non-negative and finite",
        ));
    }
    for ((cell, s), m) in field.iter_mut().zip(src).zip(mask) {
        *cell += alpha * m * s;
    }
    Ok(())
}

/// `scale_all(s)`: multiplies every cell by `s`. Requires `s >= 0`.
pub fn scale_all(field: &mut [f64], s: f64) -> EngineResult<()> {
    if !s.is_finite() || s < 0.0 {
        return Err(EngineError::invalid_parameter(
            "scale factor must be non-negative and finite",
        ));
    }
    for cell in field.iter_mut() {
        *cell *= s;
    }
    Ok(())
}

/// `add_uniform(c)`: adds the constant `c` to every cell. Requires `c >= 0`.
pub fn add_uniform(field: &mut [f64], c: f64) -> EngineResult<()> {
    if !c.is_finite() || c < 0.0 {
        return Err(EngineError::invalid_parameter(
            "additive constant must be non-negative and finite",
        ));
    }
    for cell in field.iter_mut() {
        *cell += c;
    }
    Ok(())
}
