use crate::tts::{EncodedAudio, TtsClient, TtsError, TtsRequest, MIME_WAV};
use crate::util::encode_wav;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::f32::consts::PI;

const SAMPLE_RATE_HZ: u32 = 22_050;
const MS_PER_CHAR: usize = 60;
const MIN_DURATION_MS: usize = 500;
const MAX_DURATION_MS: usize = 10_000;
const TONE_HZ: f32 = 440.0;

/// Offline stand-in for a synthesis provider: answers every request with a
/// WAV-encoded sine tone whose length follows the text length.
#[derive(Clone, Debug)]
pub struct ToneTtsClient;

impl ToneTtsClient {
    pub fn new() -> Self {
        Self
    }

    fn render(&self, text: &str) -> Vec<f32> {
        let duration_ms = (text.chars().count() * MS_PER_CHAR).clamp(MIN_DURATION_MS, MAX_DURATION_MS);
        let frames = duration_ms * SAMPLE_RATE_HZ as usize / 1000;
        (0..frames)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE_HZ as f32;
                0.5 * (2.0 * PI * TONE_HZ * t).sin()
            })
            .collect()
    }
}

impl Default for ToneTtsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TtsClient for ToneTtsClient {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<EncodedAudio, TtsError>> {
        async move {
            if request.text.trim().is_empty() {
                return Err(TtsError::EmptyText);
            }
            let samples = self.render(&request.text);
            let wav = encode_wav(&samples, SAMPLE_RATE_HZ, 1)
                .map_err(|e| TtsError::Other(format!("wav encode failed: {e}")))?;
            Ok(EncodedAudio::new(wav, MIME_WAV))
        }
        .boxed()
    }
}
