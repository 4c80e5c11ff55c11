//! Host output via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread at elevated priority.
//! It hands the device buffer to a [`RenderCallback`] and does nothing else:
//! no locks, no I/O, no allocation. Channel and format conversion go through a
//! scratch buffer sized once from the device's largest period. A callback
//! handed more frames than that is rendered in scratch-sized pieces.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! `AudioOutput` therefore must be created and dropped on the same thread.
//!
//! # Teardown
//!
//! Drop the `AudioOutput` before the session that produced its callback. The
//! callback holds its own reference to the shared ring, so the reverse order is
//! memory-safe, but the host would keep pulling silence from a stopped session.

pub mod device;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    error::{InjectorError, Result},
    render::RenderCallback,
};

/// Scratch frames used when the device does not report a period range.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
const DEFAULT_SCRATCH_FRAMES: usize = 4096;

/// Upper bound on the scratch, whatever the device claims.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
const MAX_SCRATCH_FRAMES: usize = 16_384;
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active output stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread on Windows/macOS.
pub struct AudioOutput {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    stream: Stream,
    /// Sample rate reported by the device (Hz).
    pub sample_rate: u32,
    /// Channel count of the device stream.
    pub device_channels: usize,
}

impl AudioOutput {
    /// Open an output device by preferred name, otherwise fall back to the
    /// default output device and then the first available one.
    ///
    /// `channels` is the session's interleaved channel count. The stream is
    /// playing when this returns, so the processor starts polling its port
    /// immediately.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference<R: RenderCallback<f32>>(
        mut callback: R,
        channels: usize,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.output_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });
                    if selected_device.is_none() {
                        warn!(
                            "preferred output device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list output devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_output_device() {
            default
        } else {
            let mut devices = host
                .output_devices()
                .map_err(|e| InjectorError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(InjectorError::NoDefaultOutputDevice)?;
            warn!("no default output device, falling back to first available output");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let supported = device
            .default_output_config()
            .map_err(|e| InjectorError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let device_channels = supported.channels() as usize;
        let session_channels = channels.max(1);

        info!(
            sample_rate,
            device_channels, session_channels, "output config selected"
        );

        let scratch_frames = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { max, .. } => {
                (*max as usize).clamp(1, MAX_SCRATCH_FRAMES)
            }
            cpal::SupportedBufferSize::Unknown => DEFAULT_SCRATCH_FRAMES,
        };

        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let mut scratch = vec![0.0f32; scratch_frames * session_channels];
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _info| {
                        if device_channels == session_channels {
                            let frames = data.len() / device_channels;
                            data.fill(0.0);
                            callback.render(data, frames);
                            return;
                        }
                        render_mapped(
                            &mut callback,
                            &mut scratch,
                            session_channels,
                            data,
                            device_channels,
                            |s| s,
                        );
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I16 => {
                let mut scratch = vec![0.0f32; scratch_frames * session_channels];
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _info| {
                        render_mapped(
                            &mut callback,
                            &mut scratch,
                            session_channels,
                            data,
                            device_channels,
                            |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16,
                        );
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(InjectorError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| InjectorError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| InjectorError::AudioStream(e.to_string()))?;

        Ok(Self {
            stream,
            sample_rate,
            device_channels,
        })
    }

    /// Open the system default output device.
    ///
    /// # Errors
    /// Returns `InjectorError::NoDefaultOutputDevice` when no output exists,
    /// or `InjectorError::AudioStream` if cpal fails to build the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default<R: RenderCallback<f32>>(callback: R, channels: usize) -> Result<Self> {
        Self::open_with_preference(callback, channels, None)
    }

    /// Reconnect the stream; the host resumes invoking the callback.
    #[cfg(feature = "audio-cpal")]
    pub fn play(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| InjectorError::AudioStream(e.to_string()))
    }

    /// Disconnect the stream; the callback is not invoked until `play()`.
    #[cfg(feature = "audio-cpal")]
    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| InjectorError::AudioStream(e.to_string()))
    }
}

/// Fill a device buffer from `callback` through a fixed `scratch`, converting
/// channel count and sample format on the way. Never allocates: a device
/// buffer longer than the scratch is rendered in consecutive pieces.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn render_mapped<R, T, F>(
    callback: &mut R,
    scratch: &mut [f32],
    session_ch: usize,
    data: &mut [T],
    device_ch: usize,
    convert: F,
) where
    R: RenderCallback<f32>,
    F: Fn(f32) -> T,
{
    let chunk_frames = scratch.len() / session_ch;
    if chunk_frames == 0 || device_ch == 0 {
        return;
    }
    for out in data.chunks_mut(chunk_frames * device_ch) {
        let frames = out.len() / device_ch;
        let staged = &mut scratch[..frames * session_ch];
        staged.fill(0.0);
        callback.render(staged, frames);
        map_channels(staged, session_ch, out, device_ch, &convert);
    }
}

/// Spread interleaved session frames over a device buffer with a different
/// channel count. Extra device channels repeat the last session channel;
/// surplus session channels are dropped.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn map_channels<T, F>(src: &[f32], src_ch: usize, dst: &mut [T], dst_ch: usize, convert: F)
where
    F: Fn(f32) -> T,
{
    for (out, frame) in dst.chunks_exact_mut(dst_ch).zip(src.chunks_exact(src_ch)) {
        for (c, slot) in out.iter_mut().enumerate() {
            *slot = convert(frame[c.min(src_ch - 1)]);
        }
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioOutput {
    pub fn open_with_preference<R: RenderCallback<f32>>(
        _callback: R,
        _channels: usize,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(InjectorError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default<R: RenderCallback<f32>>(callback: R, channels: usize) -> Result<Self> {
        Self::open_with_preference(callback, channels, None)
    }

    pub fn play(&self) -> Result<()> {
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        Ok(())
    }
}
