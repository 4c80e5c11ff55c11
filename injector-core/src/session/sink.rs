//! Ingest handle for the external decoder.

use std::sync::{atomic::Ordering, Arc};

use tracing::warn;

use crate::{
    buffering::{chunk::DecodedChunk, Observer, Producer, Sample, StagingProducer},
    error::{InjectorError, Result},
    session::feeder::FeederDiagnostics,
};

/// Accepts decoded audio and stages it for the feeder.
///
/// Held by whichever thread decodes the incoming stream. Only whole frames
/// are ever staged, so the feeder never sees a torn frame.
pub struct SampleSink<S: Sample> {
    producer: StagingProducer<S>,
    channels: usize,
    diagnostics: Arc<FeederDiagnostics>,
}

impl<S: Sample> SampleSink<S> {
    pub fn new(
        producer: StagingProducer<S>,
        channels: usize,
        diagnostics: Arc<FeederDiagnostics>,
    ) -> Self {
        Self {
            producer,
            channels: channels.max(1),
            diagnostics,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames that can be staged right now.
    pub fn vacant_frames(&self) -> usize {
        self.producer.vacant_len() / self.channels
    }

    /// Frames staged but not yet moved into the ring.
    pub fn staged_frames(&self) -> usize {
        self.producer.occupied_len() / self.channels
    }

    /// Stage a decoded chunk in full, or not at all.
    ///
    /// # Errors
    /// - `ChannelMismatch` if the chunk's layout differs from the session's.
    /// - `StagingFull` if the chunk does not fit yet; nothing is staged and
    ///   the caller may retry once the feeder has drained.
    pub fn push_chunk(&mut self, chunk: &DecodedChunk<S>) -> Result<usize> {
        if chunk.channels != self.channels {
            return Err(InjectorError::ChannelMismatch {
                expected: self.channels,
                got: chunk.channels,
            });
        }
        let frames = chunk.frames();
        if frames > self.vacant_frames() {
            return Err(InjectorError::StagingFull);
        }
        Ok(self.stage(&chunk.samples[..frames * self.channels]))
    }

    /// Stage as many whole frames of interleaved `samples` as fit; the rest
    /// is dropped and counted. Returns frames staged.
    pub fn push_interleaved(&mut self, samples: &[S]) -> usize {
        let offered = samples.len() / self.channels;
        let frames = offered.min(self.vacant_frames());
        let staged = self.stage(&samples[..frames * self.channels]);

        let dropped = offered - staged;
        if dropped > 0 {
            warn!(dropped, "staging queue full: dropped decoded frames");
            self.diagnostics
                .frames_dropped
                .fetch_add(dropped, Ordering::Relaxed);
        }
        staged
    }

    fn stage(&mut self, samples: &[S]) -> usize {
        let pushed = self.producer.push_slice(samples) / self.channels;
        self.diagnostics
            .frames_staged
            .fetch_add(pushed, Ordering::Relaxed);
        pushed
    }
}
