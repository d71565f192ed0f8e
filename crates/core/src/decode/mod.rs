use crate::tts::{EncodedAudio, MIME_MPEG, MIME_WAV};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded, interleaved PCM ready for rendering.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioAsset {
    pub sample_rate_hz: u32,
    pub channels: u16,
    /// Interleaved samples in `[-1, 1]`.
    pub samples: Vec<f32>,
}

impl AudioAsset {
    pub fn new(sample_rate_hz: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate_hz,
            channels,
            samples,
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration(&self) -> Duration {
        duration_from_frames(self.sample_rate_hz, self.frames())
    }

    pub fn is_playable(&self) -> bool {
        self.sample_rate_hz > 0
            && self.channels > 0
            && !self.samples.is_empty()
            && self.samples.len() % usize::from(self.channels) == 0
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    #[error("malformed audio stream: {0}")]
    Malformed(String),

    #[error("no decodable audio track")]
    NoTrack,

    #[error("decoded stream contained no samples")]
    Empty,

    #[error("decoder task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

pub trait AudioDecoder: Send + Sync {
    fn decode(&self, audio: EncodedAudio) -> BoxFuture<'_, Result<AudioAsset>>;
}

/// Decodes MP3 and WAV (and anything else symphonia's enabled codecs
/// recognise) on the blocking thread pool.
#[derive(Clone, Debug, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }

    fn hint_for(content_type: &str) -> Hint {
        let mut hint = Hint::new();
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            MIME_MPEG | "audio/mp3" => {
                hint.with_extension("mp3");
            }
            MIME_WAV | "audio/x-wav" | "audio/wave" => {
                hint.with_extension("wav");
            }
            _ => {}
        }
        if !mime.is_empty() {
            hint.mime_type(&mime);
        }
        hint
    }

    pub fn decode_blocking(bytes: Bytes, content_type: &str) -> Result<AudioAsset> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let stream = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &Self::hint_for(content_type),
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoTrack)?;
        let track_id = track.id;
        let mut sample_rate_hz = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate_hz = spec.rate;
                    channels = spec.channels.count() as u16;
                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                // A corrupt frame is skipped; the rest of the stream may still be fine.
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::debug!(error = %msg, "skipping undecodable audio packet");
                }
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            }
        }

        let asset = AudioAsset::new(sample_rate_hz, channels, samples);
        if !asset.is_playable() {
            return Err(DecodeError::Empty);
        }
        Ok(asset)
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, audio: EncodedAudio) -> BoxFuture<'_, Result<AudioAsset>> {
        async move {
            let encoded_bytes = audio.bytes.len();
            let asset = tokio::task::spawn_blocking(move || {
                Self::decode_blocking(audio.bytes, &audio.content_type)
            })
            .await
            .map_err(|e| DecodeError::Task(e.to_string()))??;

            tracing::debug!(
                encoded_bytes,
                sample_rate_hz = asset.sample_rate_hz,
                channels = asset.channels,
                duration_ms = asset.duration().as_millis() as u64,
                "audio decoded"
            );
            Ok(asset)
        }
        .boxed()
    }
}

pub fn duration_from_frames(sample_rate_hz: u32, frames: usize) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::from_secs(0);
    }
    let micros = (u128::from(frames as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}
