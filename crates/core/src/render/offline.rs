use super::chain::{ChainOutput, ChainSource, SoftwareGraph};
use super::{AudioBackend, PitchSupport, PlaybackHandle, RenderError};
use crate::decode::{duration_from_frames, AudioAsset};
use crate::util::write_wav;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Renders the whole chain into memory instead of a device.
///
/// Used for `--out` WAV export and for checking what a profile does to a
/// signal without audio hardware.
#[derive(Clone, Debug)]
pub struct OfflineBackend {
    pitch: PitchSupport,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self {
            pitch: PitchSupport::Independent,
        }
    }

    /// Backend without independent pitch shifting.
    pub fn tempo_only() -> Self {
        Self {
            pitch: PitchSupport::Unavailable,
        }
    }

    pub fn pitch_support(&self) -> PitchSupport {
        self.pitch
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainOutput for OfflineBackend {
    type Handle = OfflinePlayback;

    fn play_chain(&self, source: ChainSource) -> Result<OfflinePlayback, RenderError> {
        let sample_rate_hz = rodio::Source::sample_rate(&source);
        let channels = rodio::Source::channels(&source);
        Ok(OfflinePlayback::new(
            sample_rate_hz,
            channels,
            source.collect(),
        ))
    }
}

impl AudioBackend for OfflineBackend {
    type Handle = OfflinePlayback;
    type Graph = SoftwareGraph<OfflineBackend>;

    fn play_direct(&self, audio: AudioAsset) -> Result<OfflinePlayback, RenderError> {
        Ok(OfflinePlayback::new(
            audio.sample_rate_hz,
            audio.channels,
            audio.samples,
        ))
    }

    fn create_graph(&self, audio: AudioAsset) -> Result<Self::Graph, RenderError> {
        Ok(SoftwareGraph::new(self.clone(), audio, self.pitch))
    }
}

struct Rendered {
    sample_rate_hz: u32,
    channels: u16,
    samples: Vec<f32>,
    stopped: AtomicBool,
}

/// Fully rendered output. Clones share the same buffer.
#[derive(Clone)]
pub struct OfflinePlayback {
    inner: Arc<Rendered>,
}

impl OfflinePlayback {
    fn new(sample_rate_hz: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            inner: Arc::new(Rendered {
                sample_rate_hz,
                channels,
                samples,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.inner.sample_rate_hz
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn frames(&self) -> usize {
        self.inner.samples.len() / usize::from(self.inner.channels.max(1))
    }

    pub fn duration(&self) -> Duration {
        duration_from_frames(self.inner.sample_rate_hz, self.frames())
    }

    pub fn was_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let file = BufWriter::new(File::create(path)?);
        write_wav(
            file,
            &self.inner.samples,
            self.inner.sample_rate_hz,
            self.inner.channels,
        )?;
        tracing::info!(
            path = %path.display(),
            duration_ms = self.duration().as_millis() as u64,
            "rendered audio written"
        );
        Ok(())
    }
}

impl std::fmt::Debug for OfflinePlayback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflinePlayback")
            .field("sample_rate_hz", &self.inner.sample_rate_hz)
            .field("channels", &self.inner.channels)
            .field("frames", &self.frames())
            .finish()
    }
}

impl PlaybackHandle for OfflinePlayback {
    fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::EmotionAudioRenderer;
    use std::f32::consts::PI;

    fn tone(freq_hz: f32, sample_rate_hz: u32, seconds: f32, amplitude: f32) -> AudioAsset {
        let frames = (sample_rate_hz as f32 * seconds) as usize;
        AudioAsset::new(
            sample_rate_hz,
            1,
            (0..frames)
                .map(|i| amplitude * (2.0 * PI * freq_hz * i as f32 / sample_rate_hz as f32).sin())
                .collect(),
        )
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn middle(samples: &[f32]) -> &[f32] {
        let skip = samples.len() / 10;
        &samples[skip..samples.len() - skip]
    }

    #[test]
    fn neutral_output_is_bit_identical() {
        let input = tone(440.0, 22_050, 0.5, 0.3);
        let renderer = EmotionAudioRenderer::new(OfflineBackend::new());
        let out = renderer.render(input.clone(), "neutral").unwrap();
        assert_eq!(out.samples(), input.samples.as_slice());
        assert_eq!(out.duration(), input.duration());
    }

    #[test]
    fn sad_on_tempo_only_backend_is_slower_and_quieter() {
        let input = tone(2_000.0, 48_000, 2.0, 0.5);
        let renderer = EmotionAudioRenderer::new(OfflineBackend::tempo_only());
        let out = renderer.render(input.clone(), "sad").unwrap();

        let expected = Duration::from_secs_f32(2.0 / 0.9);
        let diff = out.duration().as_secs_f32() - expected.as_secs_f32();
        assert!(diff.abs() < 0.005, "duration {:?}", out.duration());

        let ratio = rms(middle(out.samples())) / rms(middle(&input.samples));
        let expected_ratio = 10f32.powf(-2.0 / 20.0);
        assert!(
            (ratio / expected_ratio - 1.0).abs() < 0.02,
            "rms ratio {ratio}, expected about {expected_ratio}"
        );
    }

    #[test]
    fn happy_is_shorter() {
        let input = tone(300.0, 16_000, 1.0, 0.4);
        let renderer = EmotionAudioRenderer::new(OfflineBackend::tempo_only());
        let out = renderer.render(input, "happy").unwrap();
        assert!((out.duration().as_secs_f32() - 1.0 / 1.1).abs() < 0.005);
    }

    #[test]
    fn pitch_shift_keeps_tempo_driven_length_plus_flush() {
        let input = tone(220.0, 16_000, 1.0, 0.4);
        let renderer = EmotionAudioRenderer::new(OfflineBackend::new());
        let shifted = renderer.render(input.clone(), "sad").unwrap();

        let tempo_only = EmotionAudioRenderer::new(OfflineBackend::tempo_only())
            .render(input, "sad")
            .unwrap();
        let flush = crate::render::PitchShifter::new(-100, 16_000).latency_frames();
        assert_eq!(shifted.frames(), tempo_only.frames() + flush);
        assert!(rms(middle(shifted.samples())) > 0.05);
    }

    #[test]
    fn rendered_audio_writes_a_readable_wav() {
        let input = tone(440.0, 8_000, 0.25, 0.5);
        let out = EmotionAudioRenderer::new(OfflineBackend::new())
            .render(input, "calm")
            .unwrap();

        let path = std::env::temp_dir().join(format!(
            "voice-translator-offline-{}.wav",
            std::process::id()
        ));
        out.write_wav(&path).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.len() as usize, out.samples().len());
        let _ = std::fs::remove_file(&path);
    }
}
