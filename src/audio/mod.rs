//! Microphone capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It keeps its work minimal: downmix into a reused scratch buffer, feed the
//! resampler, and hand completed blocks to the crossbeam sender (whose send
//! on an unbounded channel never blocks). When the armed flag is clear the
//! callback no-ops, so audio captured between sessions never reaches the
//! queue.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` therefore must be created and dropped on the same
//! thread. The engine accomplishes this by opening it inside
//! `spawn_blocking`.

pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use crate::buffering::BlockSender;
use crate::error::Result;
#[cfg(not(feature = "audio-cpal"))]
use crate::error::SottoError;
#[cfg(feature = "audio-cpal")]
use resample::BlockResampler;

/// Pipeline blocks are 100 ms long.
#[cfg(feature = "audio-cpal")]
const BLOCK_SECS_INV: u32 = 10;

/// Handle to an active capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — cleared to make the callback no-op.
    armed: Arc<AtomicBool>,
    /// Capture rate reported by the device (Hz), before resampling.
    pub device_sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available one. Captured audio
    /// is downmixed to mono, resampled to `pipeline_rate`, and pushed into
    /// `sender` as 100 ms blocks.
    ///
    /// Must be called from the thread that will also drop this value.
    ///
    /// # Errors
    /// Returns `SottoError::NoDefaultInputDevice` when no microphone is
    /// available, or `SottoError::AudioStream` if cpal fails to build the
    /// stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        sender: BlockSender,
        armed: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
        pipeline_rate: u32,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;
        use crate::error::SottoError;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });
                    if selected_device.is_none() {
                        warn!(
                            "preferred input device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| SottoError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(SottoError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| SottoError::AudioDevice(e.to_string()))?;

        let device_sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(device_sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(device_sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let block_samples = (pipeline_rate / BLOCK_SECS_INV) as usize;
        let resampler = BlockResampler::new(device_sample_rate, pipeline_rate, block_samples)?;

        // Pre-clone one Arc per sample format branch so each closure owns
        // its flag.
        let armed_f32 = Arc::clone(&armed);
        let armed_i16 = Arc::clone(&armed);
        let armed_u8 = Arc::clone(&armed);

        let ch = channels as usize;
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let mut forwarder = Forwarder::new(resampler, sender);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !armed_f32.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix(data, ch, &mut mix_buf, |s| s);
                        forwarder.forward(&mix_buf);
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I16 => {
                let mut forwarder = Forwarder::new(resampler, sender);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !armed_i16.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix(data, ch, &mut mix_buf, |s| s as f32 / 32768.0);
                        forwarder.forward(&mix_buf);
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::U8 => {
                let mut forwarder = Forwarder::new(resampler, sender);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _info| {
                        if !armed_u8.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix(data, ch, &mut mix_buf, |s| (s as f32 - 128.0) / 128.0);
                        forwarder.forward(&mix_buf);
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(SottoError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| SottoError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SottoError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            armed,
            device_sample_rate,
        })
    }

    /// Open the system default microphone.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(
        sender: BlockSender,
        armed: Arc<AtomicBool>,
        pipeline_rate: u32,
    ) -> Result<Self> {
        Self::open_with_preference(sender, armed, None, pipeline_rate)
    }

    /// Stop: signal the callback to no-op on its next invocation.
    #[cfg(feature = "audio-cpal")]
    pub fn stop(&self) {
        self.armed.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _sender: BlockSender,
        _armed: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
        _pipeline_rate: u32,
    ) -> Result<Self> {
        Err(SottoError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(
        sender: BlockSender,
        armed: Arc<AtomicBool>,
        pipeline_rate: u32,
    ) -> Result<Self> {
        Self::open_with_preference(sender, armed, None, pipeline_rate)
    }

    pub fn stop(&self) {
        self.armed.store(false, Ordering::Release);
    }
}

/// Resample and enqueue mono samples from inside the capture callback.
#[cfg(feature = "audio-cpal")]
struct Forwarder {
    resampler: BlockResampler,
    sender: BlockSender,
    disconnected: bool,
}

#[cfg(feature = "audio-cpal")]
impl Forwarder {
    fn new(resampler: BlockResampler, sender: BlockSender) -> Self {
        Self {
            resampler,
            sender,
            disconnected: false,
        }
    }

    fn forward(&mut self, mono: &[f32]) {
        for block in self.resampler.push(mono) {
            if self.sender.send(block).is_err() {
                if !self.disconnected {
                    warn!("block queue disconnected — consumer gone");
                    self.disconnected = true;
                }
                return;
            }
        }
    }
}


/// Interleaved-to-mono downmix into a reused scratch buffer.
#[cfg(feature = "audio-cpal")]
fn downmix<T: Copy>(data: &[T], channels: usize, mix_buf: &mut Vec<f32>, to_f32: impl Fn(T) -> f32) {
    let frames = data.len() / channels.max(1);
    mix_buf.clear();
    mix_buf.reserve(frames);
    if channels <= 1 {
        mix_buf.extend(data.iter().map(|&s| to_f32(s)));
        return;
    }
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
        mix_buf.push(sum / channels as f32);
    }
}
