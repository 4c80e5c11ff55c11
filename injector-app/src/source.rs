//! WAV file reader standing in for the streamed decoder.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use injector_core::DecodedChunk;

pub struct WavSource {
    reader: hound::WavReader<BufReader<File>>,
    channels: usize,
    sample_rate: u32,
    /// Scale applied to integer samples; `None` for float files.
    int_scale: Option<f32>,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let spec = reader.spec();
        if spec.channels == 0 {
            bail!("{} declares zero channels", path.display());
        }
        let int_scale = match spec.sample_format {
            hound::SampleFormat::Float => None,
            hound::SampleFormat::Int => {
                Some(((1_i64 << (spec.bits_per_sample.max(1) - 1)) - 1).max(1) as f32)
            }
        };
        Ok(Self {
            reader,
            channels: usize::from(spec.channels),
            sample_rate: spec.sample_rate,
            int_scale,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total frames in the file.
    pub fn total_frames(&self) -> u32 {
        self.reader.duration()
    }

    /// Decode up to `frames` frames. Returns `None` at end of file.
    pub fn next_chunk(&mut self, frames: usize) -> Result<Option<DecodedChunk>> {
        let wanted = frames * self.channels;
        let mut samples = Vec::with_capacity(wanted);
        match self.int_scale {
            None => {
                for s in self.reader.samples::<f32>().take(wanted) {
                    samples.push(s?);
                }
            }
            Some(scale) => {
                for s in self.reader.samples::<i32>().take(wanted) {
                    samples.push(s? as f32 / scale);
                }
            }
        }

        // Drop a trailing partial frame from a truncated file.
        samples.truncate(samples.len() - samples.len() % self.channels);
        if samples.is_empty() {
            return Ok(None);
        }
        Ok(Some(DecodedChunk::new(
            samples,
            self.channels,
            self.sample_rate,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(name: &str, channels: u16, frames: usize) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.wav", std::process::id()));
        let spec = hound::WavSpec {
            channels,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
        for i in 0..frames * channels as usize {
            writer.write_sample((i as i16) * 8).expect("write sample");
        }
        writer.finalize().expect("finalize");
        path
    }

    #[test]
    fn reads_chunks_until_end_of_file() {
        let path = write_wav("injector-src-chunks", 2, 100);
        let mut source = WavSource::open(&path).expect("open");
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 48_000);
        assert_eq!(source.total_frames(), 100);

        let first = source.next_chunk(64).expect("read").expect("chunk");
        assert_eq!(first.frames(), 64);
        assert_eq!(first.channels, 2);
        let second = source.next_chunk(64).expect("read").expect("chunk");
        assert_eq!(second.frames(), 36);
        assert!(source.next_chunk(64).expect("read").is_none());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn integer_samples_are_scaled_to_unit_range() {
        let path = write_wav("injector-src-scale", 1, 4);
        let mut source = WavSource::open(&path).expect("open");
        let chunk = source.next_chunk(4).expect("read").expect("chunk");
        assert_eq!(chunk.samples[0], 0.0);
        assert!((chunk.samples[1] - 8.0 / i16::MAX as f32).abs() < 1e-6);
        let _ = std::fs::remove_file(path);
    }
}
