//! Typed block of decoded audio handed over by the external decoder.

/// Interleaved PCM at a known channel count and sample rate.
///
/// Allocated by the decoder thread; never touched by the render thread.
#[derive(Debug, Clone)]
pub struct DecodedChunk<S = f32> {
    /// Interleaved samples (`L0 R0 L1 R1 …` when stereo).
    pub samples: Vec<S>,
    pub channels: usize,
    /// Sample rate in Hz. Carried for diagnostics only; no conversion happens.
    pub sample_rate: u32,
}

impl<S> DecodedChunk<S> {
    pub fn new(samples: Vec<S>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Whole frames in this chunk. A trailing partial frame is ignored.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}
