// src/cellular.rs
//
// Phase 4B/4C cellular engine (SS4.B): owns a contiguous node array and runs
// mission loops under a single parallel region so there is exactly one
// barrier per mission, not one per step.

use crate::kernel_lib;
use crate::node::{self, simd::NodeLaneBlock, Node};
use rayon::prelude::*;
use std::os::raw::{c_longlong, c_void};

pub const MAX_NODES: usize = 1_048_576;
const BASELINE_NS_PER_OP: f64 = 15500.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct MissionMetrics {
    pub total_wall_ns: u64,
    pub total_operations: u64,
    pub ns_per_op: f64,
    pub ops_per_sec: f64,
    pub speedup: f64,
}

impl MissionMetrics {
    pub(crate) fn from_totals(total_wall_ns: u64, total_operations: u64) -> Self {
        if total_operations == 0 {
            return Self::default();
        }
        let ns_per_op = total_wall_ns as f64 / total_operations as f64;
        let ops_per_sec = if ns_per_op > 0.0 {
            1.0e9 / ns_per_op
        } else {
            0.0
        };
        let speedup = if ns_per_op > 0.0 {
            BASELINE_NS_PER_OP / ns_per_op
        } else {
            0.0
        };
        Self {
            total_wall_ns,
            total_operations,
            ns_per_op,
            ops_per_sec,
            speedup,
        }
    }
}

pub struct CellularEngine {
    pub nodes: Vec<Node>,
    pub metrics: MissionMetrics,
    /// Handle into a dynamically loaded Phase 4C kernel (SS4.B, SS4.F), when
    /// one is loaded. `None` means the in-process rayon/SIMD kernel below is
    /// this engine's sole implementation.
    external: Option<*mut c_void>,
}

impl CellularEngine {
    pub fn new(num_nodes: usize) -> Self {
        let nodes = (0..num_nodes)
            .map(|i| Node::new(i as u32, 0, 0, 0))
            .collect();
        let external = kernel_lib::with_symbols(|s| unsafe {
            (s.create_engine)(num_nodes as c_longlong)
        })
        .filter(|handle| !handle.is_null());
        Self {
            nodes,
            metrics: MissionMetrics::default(),
            external,
        }
    }

    /// Phase 4B: single parallel region, scalar inner kernel. Each worker
    /// owns a contiguous slice and walks every step within it; there is no
    /// inter-worker communication and no per-step barrier (SS5).
    pub fn run_mission(
        &mut self,
        num_steps: usize,
        input_signals: &[f64],
        control_patterns: &[f64],
        iterations_per_node: usize,
    ) {
        let t0 = std::time::Instant::now();
        let n = self.nodes.len();

        self.nodes.par_chunks_mut(chunk_size(n)).for_each(|slice| {
            for step in 0..num_steps {
                let input = sample_at(input_signals, step);
                let control = sample_at(control_patterns, step);
                for cell in slice.iter_mut() {
                    for _ in 0..iterations_per_node {
                        node::process_signal_hot(cell, input, control, 0.0);
                    }
                }
            }
        });

        let elapsed_ns = t0.elapsed().as_nanos() as u64;
        let total_ops = (num_steps * n * iterations_per_node) as u64;
        self.metrics = MissionMetrics::from_totals(elapsed_ns, total_ops);
    }

    /// Phase 4C: prefers a dynamically loaded external kernel when one is
    /// loaded (SS4.B, SS4.F), falling back to the in-process single-region
    /// SIMD kernel otherwise. Same single-region structure either way, but
    /// the in-process inner loop processes four nodes at a time through
    /// `NodeLaneBlock`.
    pub fn run_mission_optimized_phase4c(
        &mut self,
        num_steps: usize,
        input_signals: &[f64],
        control_patterns: &[f64],
        iterations_per_node: usize,
    ) {
        if let Some(handle) = self.external {
            if let Some(metrics) = kernel_lib::with_symbols(|s| unsafe {
                (s.run_mission_optimized_phase4c)(
                    handle,
                    input_signals.as_ptr(),
                    input_signals.len() as c_longlong,
                    control_patterns.as_ptr(),
                    control_patterns.len() as c_longlong,
                    num_steps as c_longlong,
                    iterations_per_node.max(1) as c_longlong,
                );
                let (mut ns_per_op, mut ops_per_sec, mut speedup, mut total_ops) =
                    (0.0, 0.0, 0.0, 0i64);
                (s.get_metrics)(
                    handle,
                    &mut ns_per_op,
                    &mut ops_per_sec,
                    &mut speedup,
                    &mut total_ops,
                );
                MissionMetrics {
                    total_wall_ns: (ns_per_op * total_ops as f64) as u64,
                    total_operations: total_ops as u64,
                    ns_per_op,
                    ops_per_sec,
                    speedup,
                }
            }) {
                self.metrics = metrics;
                return;
            }
        }

        let t0 = std::time::Instant::now();
        let n = self.nodes.len();

        self.nodes.par_chunks_mut(chunk_size(n)).for_each(|slice| {
            for step in 0..num_steps {
                let input_v = sample_at(input_signals, step);
                let control_v = sample_at(control_patterns, step);
                let input = [input_v; 4];
                let control = [control_v; 4];

                let mut idx = 0;
                while idx + 4 <= slice.len() {
                    for _ in 0..iterations_per_node {
                        let mut lane: [Node; 4] = [
                            slice[idx],
                            slice[idx + 1],
                            slice[idx + 2],
                            slice[idx + 3],
                        ];
                        let mut block = NodeLaneBlock::load(&lane);
                        block.step(&mut lane, &input, &control);
                        slice[idx..idx + 4].copy_from_slice(&lane);
                    }
                    idx += 4;
                }
                // Remainder nodes: scalar-style.
                for cell in slice[idx..].iter_mut() {
                    for _ in 0..iterations_per_node {
                        node::process_signal_hot(cell, input_v, control_v, 0.0);
                    }
                }
            }
        });

        let elapsed_ns = t0.elapsed().as_nanos() as u64;
        let total_ops = (num_steps * n * iterations_per_node) as u64;
        self.metrics = MissionMetrics::from_totals(elapsed_ns, total_ops);
    }
}

impl Drop for CellularEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.external.take() {
            kernel_lib::with_symbols(|s| unsafe { (s.destroy_engine)(handle) });
        }
    }
}

fn chunk_size(n: usize) -> usize {
    let workers = rayon::current_num_threads().max(1);
    (n / workers).max(1)
}

#[inline]
fn sample_at(arr: &[f64], step: usize) -> f64 {
    if arr.is_empty() {
        0.0
    } else {
        arr[step % arr.len()]
    }
}
