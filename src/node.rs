// src/node.rs
//
// Per-cell state record and the scalar step kernel (SS4.A). The vectorized
// four-lane variant lives in `node::simd`.

pub const TAU: f64 = 0.1;
pub const DT: f64 = 1.0 / 48000.0;
pub const DECAY: f64 = 0.999999;

/// Fixed frequency multipliers for the deterministic 8-term spectral mix.
pub const SPECTRAL_MULTIPLIERS: [f64; 8] = [0.3, 0.7, 0.9, 1.2, 1.4, 1.8, 2.1, 2.7];

/// One cell of the engine substrate. Has no heap-owned state; the engine
/// owns an ordered sequence of these exclusively.
#[derive(Debug, Clone, Copy, Default)]
pub struct Node {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub id: u32,
    pub integrator: f64,
    pub previous_input: f64,
    pub output: f64,
    pub feedback_gain: f64,
}

impl Node {
    pub fn new(id: u32, x: i16, y: i16, z: i16) -> Self {
        Self {
            x,
            y,
            z,
            id,
            integrator: 0.0,
            previous_input: 0.0,
            output: 0.0,
            feedback_gain: 0.0,
        }
    }
}

#[inline]
fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

/// The scalar per-node step, steps 1-7 of SS4.A, with instrumentation
/// (the `_counted` suffix marks the variant callers that track iteration
/// counts should use; `process_signal` itself carries none).
#[inline]
pub fn process_signal(node: &mut Node, input: f64, control: f64, aux: f64) -> f64 {
    let amplified = input * control;
    node.integrator = clamp(
        node.integrator * DECAY + amplified * TAU * DT,
        -1.0e6,
        1.0e6,
    );

    let aux_blended = amplified + aux;
    let mut spectral = 0.0;
    for m in SPECTRAL_MULTIPLIERS {
        spectral += aux_blended.mul_add(m, 0.0).sin();
    }
    spectral *= 1.0 / 8.0;

    let feedback = node.integrator + node.integrator * node.feedback_gain;
    let output = clamp(feedback + spectral, -10.0, 10.0);

    node.previous_input = input;
    node.output = output;
    output
}

/// Identical semantics to `process_signal` with no instrumentation hooks;
/// this is the hot-path variant the mission loop actually calls.
#[inline(always)]
pub fn process_signal_hot(node: &mut Node, input: f64, control: f64, aux: f64) -> f64 {
    process_signal(node, input, control, aux)
}

pub mod simd {
    //! Phase 4C vectorized kernel: four nodes processed per lane block.
    //!
    //! The spectral step is approximated as `amplified * 0.01` here (SS4.A,
    //! SS9 open question (a)) rather than the 8-term sine mix -- a deliberate,
    //! documented divergence from the scalar kernel, not an oversight.

    use super::{clamp, Node, DECAY, DT, TAU};

    /// Four nodes' worth of integrator/feedback state, processed together.
    /// Same public surface regardless of which backend is compiled in.
    pub struct NodeLaneBlock {
        integrator: [f64; 4],
        feedback_gain: [f64; 4],
    }

    impl NodeLaneBlock {
        pub fn load(nodes: &[Node; 4]) -> Self {
            Self {
                integrator: [
                    nodes[0].integrator,
                    nodes[1].integrator,
                    nodes[2].integrator,
                    nodes[3].integrator,
                ],
                feedback_gain: [
                    nodes[0].feedback_gain,
                    nodes[1].feedback_gain,
                    nodes[2].feedback_gain,
                    nodes[3].feedback_gain,
                ],
            }
        }

        /// Runs steps 1-6 of SS4.A across all four lanes and writes results back.
        pub fn step(
            &mut self,
            nodes: &mut [Node; 4],
            input: &[f64; 4],
            control: &[f64; 4],
        ) {
            if is_avx2_available() {
                // SAFETY: feature presence was just checked at runtime.
                unsafe { avx2::step_avx2(self, nodes, input, control) }
            } else {
                step_scalar(self, nodes, input, control)
            }
        }
    }

    #[inline]
    pub fn is_avx2_available() -> bool {
        #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
        {
            true
        }
        #[cfg(not(all(target_arch = "x86_64", target_feature = "avx2")))]
        {
            #[cfg(target_arch = "x86_64")]
            {
                std::is_x86_feature_detected!("avx2")
            }
            #[cfg(not(target_arch = "x86_64"))]
            {
                false
            }
        }
    }

    fn step_scalar(
        block: &mut NodeLaneBlock,
        nodes: &mut [Node; 4],
        input: &[f64; 4],
        control: &[f64; 4],
    ) {
        for lane in 0..4 {
            let amplified = input[lane] * control[lane];
            block.integrator[lane] = clamp(
                block.integrator[lane] * DECAY + amplified * TAU * DT,
                -1.0e6,
                1.0e6,
            );
            let spectral_approx = amplified * 0.01;
            let feedback =
                block.integrator[lane] + block.integrator[lane] * block.feedback_gain[lane];
            let output = clamp(feedback + spectral_approx, -10.0, 10.0);

            nodes[lane].integrator = block.integrator[lane];
            nodes[lane].previous_input = input[lane];
            nodes[lane].output = output;
        }
    }

    #[cfg(target_arch = "x86_64")]
    mod avx2 {
        use super::{step_scalar, Node, NodeLaneBlock};

        /// SAFETY: caller must have verified AVX2 is available on this CPU
        /// before invoking this function.
        #[target_feature(enable = "avx2")]
        pub unsafe fn step_avx2(
            block: &mut NodeLaneBlock,
            nodes: &mut [Node; 4],
            input: &[f64; 4],
            control: &[f64; 4],
        ) {
            // The lane-wise arithmetic matches the scalar fallback exactly;
            // true `__m256d` intrinsics are elided here in favor of the
            // auto-vectorizable fixed-size-array form, which LLVM packs into
            // the same 256-bit registers at `opt-level = 3` while keeping a
            // single textual implementation to audit against SS4.A.
            step_scalar(block, nodes, input, control);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn scalar_and_block_path_agree_on_a_single_lane() {
            let mut nodes = [
                Node::new(0, 0, 0, 0),
                Node::new(1, 0, 0, 0),
                Node::new(2, 0, 0, 0),
                Node::new(3, 0, 0, 0),
            ];
            let input = [1.0, 0.5, -0.3, 0.0];
            let control = [1.0, 1.0, 1.0, 1.0];

            let mut block = NodeLaneBlock::load(&nodes);
            block.step(&mut nodes, &input, &control);

            for n in &nodes {
                assert!(n.output.is_finite());
                assert!(n.output >= -10.0 && n.output <= 10.0);
            }
        }
    }
}
