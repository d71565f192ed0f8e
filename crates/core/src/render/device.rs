use super::chain::{ChainOutput, ChainSource, SoftwareGraph};
use super::{AudioBackend, PitchSupport, PlaybackHandle, RenderError};
use crate::decode::AudioAsset;
use rodio::cpal::traits::DeviceTrait;
use rodio::cpal::traits::HostTrait;
use rodio::source::Source;
use rodio::{OutputStream, OutputStreamBuilder, Sink, StreamError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A minimal, poison-tolerant, lazy initializer for a single value.
///
/// [`rodio::OutputStream`] must outlive every sink connected to it; opening
/// one per clip makes rodio drop the stream and cut playback short.
struct LazyInit<T> {
    value: Mutex<Option<T>>,
}

impl<T> LazyInit<T> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    fn get_or_try_init_with<R, E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
        f: impl FnOnce(&T) -> R,
        invariant_err: impl FnOnce() -> E,
    ) -> Result<R, E> {
        let mut guard = match self.value.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("output stream cache lock was poisoned; recovering and continuing");
                poisoned.into_inner()
            }
        };

        if guard.is_none() {
            *guard = Some(init()?);
        }

        match guard.as_ref() {
            Some(v) => Ok(f(v)),
            None => Err(invariant_err()),
        }
    }
}

/// Plays rendered speech on a local output device through rodio.
///
/// The signal chain runs in software, so independent pitch shifting is
/// available unless the backend was built with [`RodioBackend::tempo_only`].
#[derive(Clone)]
pub struct RodioBackend {
    output_device_name: Option<String>,
    pitch: PitchSupport,

    // Clones share a single stream.
    output_stream: Arc<LazyInit<OutputStream>>,
    output_stream_open_attempts: Arc<AtomicUsize>,
}

impl RodioBackend {
    pub fn new() -> Self {
        Self {
            output_device_name: None,
            pitch: PitchSupport::Independent,
            output_stream: Arc::new(LazyInit::new()),
            output_stream_open_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn tempo_only() -> Self {
        Self {
            pitch: PitchSupport::Unavailable,
            ..Self::new()
        }
    }

    pub fn with_output_device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.output_device_name = Some(name.into());
        self
    }

    pub fn pitch_support(&self) -> PitchSupport {
        self.pitch
    }

    fn open_output_stream(&self) -> Result<OutputStream, RenderError> {
        let attempt = self
            .output_stream_open_attempts
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        tracing::debug!(
            attempt,
            configured_output_device = %self.output_device_name.as_deref().unwrap_or("<default>"),
            "opening rodio OutputStream"
        );

        let fallback = |wanted: &str, context: &str| {
            OutputStreamBuilder::open_default_stream().map_err(|e| RenderError::OutputUnavailable {
                details: format_stream_error_details(e, Some(wanted), context),
            })
        };

        match self.output_device_name.as_deref() {
            Some(wanted) => match open_named_output_stream(wanted) {
                Ok(stream) => Ok(stream),
                Err(NamedDeviceStreamError::DeviceNotFound { wanted, available }) => {
                    tracing::warn!(
                        wanted_device = %wanted,
                        available_devices = %format_device_list(&available),
                        "configured output device not found; falling back to default output device"
                    );
                    fallback(&wanted, "default-device fallback after named device not found")
                }
                Err(NamedDeviceStreamError::OpenFailed {
                    wanted,
                    error,
                    available,
                }) => {
                    tracing::warn!(
                        wanted_device = %wanted,
                        error = %error,
                        available_devices = %format_device_list(&available),
                        "failed to open configured output device; falling back to default output device"
                    );
                    fallback(&wanted, "default-device fallback after named device open failed")
                }
            },
            None => OutputStreamBuilder::open_default_stream().map_err(|e| {
                RenderError::OutputUnavailable {
                    details: format_stream_error_details(e, None, "open default output stream"),
                }
            }),
        }
    }

    fn connect_sink(&self) -> Result<Sink, RenderError> {
        self.output_stream.get_or_try_init_with(
            || self.open_output_stream(),
            |stream| {
                let mixer = stream.mixer();
                Sink::connect_new(&mixer)
            },
            || RenderError::OutputUnavailable {
                details: "internal error: output stream cache invariant violated".to_owned(),
            },
        )
    }

    fn play_source<S>(&self, source: S) -> Result<RodioPlayback, RenderError>
    where
        S: Source + Send + 'static,
    {
        let sink = self.connect_sink()?;
        sink.append(source);
        Ok(RodioPlayback {
            sink: Arc::new(sink),
        })
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainOutput for RodioBackend {
    type Handle = RodioPlayback;

    fn play_chain(&self, source: ChainSource) -> Result<RodioPlayback, RenderError> {
        self.play_source(source)
    }
}

impl AudioBackend for RodioBackend {
    type Handle = RodioPlayback;
    type Graph = SoftwareGraph<RodioBackend>;

    fn play_direct(&self, audio: AudioAsset) -> Result<RodioPlayback, RenderError> {
        self.play_source(PcmSource::new(audio))
    }

    fn create_graph(&self, audio: AudioAsset) -> Result<Self::Graph, RenderError> {
        Ok(SoftwareGraph::new(self.clone(), audio, self.pitch))
    }
}

/// Handle to one clip queued on the shared output stream.
#[derive(Clone)]
pub struct RodioPlayback {
    sink: Arc<Sink>,
}

impl RodioPlayback {
    pub async fn finished(&self) {
        let sink = Arc::clone(&self.sink);
        if let Err(e) = tokio::task::spawn_blocking(move || sink.sleep_until_end()).await {
            tracing::warn!(error = %e, "playback wait task failed");
        }
    }
}

impl PlaybackHandle for RodioPlayback {
    fn stop(&self) {
        self.sink.stop();
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}

#[derive(Debug)]
enum NamedDeviceStreamError {
    DeviceNotFound {
        wanted: String,
        available: Vec<String>,
    },
    OpenFailed {
        wanted: String,
        error: StreamError,
        available: Vec<String>,
    },
}

fn normalize_device_name(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn open_named_output_stream(wanted: &str) -> Result<OutputStream, NamedDeviceStreamError> {
    let wanted_norm = normalize_device_name(wanted);

    let host = rodio::cpal::default_host();
    let mut available: Vec<String> = Vec::new();
    let mut selected = None;

    if let Ok(devices) = host.output_devices() {
        for d in devices {
            let name = d.name().unwrap_or_else(|_| "<unnamed>".to_owned());
            if normalize_device_name(&name) == wanted_norm {
                selected = Some(d);
            }
            available.push(name);
        }
    }

    let Some(device) = selected else {
        return Err(NamedDeviceStreamError::DeviceNotFound {
            wanted: wanted.to_owned(),
            available,
        });
    };

    OutputStreamBuilder::from_device(device)
        .and_then(|b| b.open_stream_or_fallback())
        .map_err(|error| NamedDeviceStreamError::OpenFailed {
            wanted: wanted.to_owned(),
            error,
            available,
        })
}

fn format_device_list(devices: &[String]) -> String {
    if devices.is_empty() {
        return "<unknown>".to_owned();
    }
    devices.join(", ")
}

fn format_stream_error_details(err: StreamError, wanted: Option<&str>, context: &str) -> String {
    let mut s = format!("{context}: {err}");
    if let Some(w) = wanted {
        s.push_str(&format!(" (configured_device={w})"));
    }
    #[cfg(feature = "playback-device-enum")]
    {
        if let Ok(devices) = enumerate_output_device_names() {
            if devices.is_empty() {
                s.push_str("; available_output_devices=<none>");
            } else {
                s.push_str("; available_output_devices=");
                s.push_str(&devices.join(", "));
            }
        }
    }
    s
}

#[cfg(feature = "playback-device-enum")]
pub fn enumerate_output_device_names() -> Result<Vec<String>, RenderError> {
    let host = rodio::cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| RenderError::OutputUnavailable {
            details: format!("failed to list output devices: {e}"),
        })?;

    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "<unnamed>".to_owned()))
        .collect())
}

/// Unmodified decoded samples, for the neutral path.
struct PcmSource {
    samples: std::vec::IntoIter<f32>,
    sample_rate: u32,
    channels: u16,
    duration: Duration,
}

impl PcmSource {
    fn new(audio: AudioAsset) -> Self {
        let duration = audio.duration();
        Self {
            samples: audio.samples.into_iter(),
            sample_rate: audio.sample_rate_hz,
            channels: audio.channels,
            duration,
        }
    }
}

impl Iterator for PcmSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        self.samples.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.samples.size_hint()
    }
}

impl Source for PcmSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.duration)
    }
}
