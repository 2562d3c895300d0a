use sim::bloom::BloomCurve;
use sim::grid::GridSizes;

use super::params::PassParams;
use super::programs::{PassEncoder, Program};
use super::target::RenderTarget;

/// Bloom base plus its downsample chain on the GPU. Runs the same passes as
/// [`sim::bloom::BloomChain`].
pub struct GpuBloom {
    base: RenderTarget,
    levels: Vec<RenderTarget>,
}

impl GpuBloom {
    pub fn new(device: &wgpu::Device, sizes: &GridSizes) -> Self {
        Self {
            base: RenderTarget::new(device, sizes.bloom_desc(sizes.bloom), "Bloom Base"),
            levels: sizes
                .bloom_chain
                .iter()
                .map(|r| RenderTarget::new(device, sizes.bloom_desc(*r), "Bloom Level"))
                .collect(),
        }
    }

    pub fn output(&self) -> &RenderTarget {
        &self.base
    }

    /// Record the bloom passes for `source`. Returns false when the chain is
    /// too short to run.
    pub fn apply(
        &self,
        enc: &mut PassEncoder<'_>,
        source: &RenderTarget,
        curve: &BloomCurve,
        intensity: f32,
    ) -> bool {
        if self.levels.len() < 2 {
            return false;
        }

        enc.dispatch(Program::BloomPrefilter, PassParams::bloom_prefilter(curve), source, None, &self.base);

        let mut last = &self.base;
        for level in &self.levels {
            enc.dispatch(Program::Blur, PassParams::blur(1.0, false), last, None, level);
            last = level;
        }

        for i in (0..self.levels.len() - 1).rev() {
            enc.dispatch(
                Program::Blur,
                PassParams::blur(1.0, true),
                &self.levels[i + 1],
                None,
                &self.levels[i],
            );
        }

        enc.dispatch(Program::Blur, PassParams::blur(intensity, false), &self.levels[0], None, &self.base);
        true
    }
}
