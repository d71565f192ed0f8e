//! Emotion-shaped playback of decoded speech.
//!
//! [`EmotionAudioRenderer`] turns an emotion name into a signal chain on an
//! [`AudioBackend`]: spectral tilt, gain, tempo and (where the backend can)
//! an independent pitch shift. Neutral audio skips the chain entirely.

mod biquad;
mod chain;
mod device;
mod offline;
mod pitch;

use crate::decode::{AudioAsset, AudioDecoder, DecodeError};
use crate::emotion::{EmotionId, EmotionProfile, TILT_CENTER_HZ, TILT_Q};
use crate::tts::EncodedAudio;
use std::sync::{Mutex, MutexGuard};

pub use biquad::Biquad;
pub use chain::{ChainOutput, ChainSettings, ChainSource, SoftwareGraph};
pub use device::{RodioBackend, RodioPlayback};
pub use offline::{OfflineBackend, OfflinePlayback};
pub use pitch::{cents_to_ratio, PitchShifter};

#[cfg(feature = "playback-device-enum")]
pub use device::enumerate_output_device_names;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("audio output unavailable: {details}")]
    OutputUnavailable { details: String },

    #[error("audio cannot be rendered: {details}")]
    InvalidAudio { details: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Peaking,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub frequency_hz: f32,
    pub q: f32,
    pub gain_db: f32,
}

impl FilterSpec {
    /// Broad low-mid bell used to tilt a voice warmer or brighter.
    pub fn spectral_tilt(gain_db: f32) -> Self {
        Self {
            kind: FilterKind::Peaking,
            frequency_hz: TILT_CENTER_HZ,
            q: TILT_Q,
            gain_db,
        }
    }
}

/// Whether a backend can move pitch independently of tempo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PitchSupport {
    Independent,
    Unavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PitchShift {
    Applied,
    Unsupported,
}

pub trait PlaybackHandle: Clone + Send + Sync + 'static {
    /// Halts output and releases the playback resources. Idempotent.
    fn stop(&self);

    fn is_finished(&self) -> bool;
}

/// A not-yet-started processing chain for one asset.
///
/// Filters run in insertion order, then gain; tempo and pitch act on the
/// source before either.
pub trait SignalGraph: Send {
    type Handle: PlaybackHandle;

    fn set_tempo(&mut self, rate: f32);

    fn set_pitch_offset(&mut self, cents: i32) -> PitchShift;

    fn insert_filter(&mut self, filter: FilterSpec);

    fn set_gain(&mut self, gain: f32);

    /// Connects the chain to the output and begins playback.
    fn start(self) -> Result<Self::Handle, RenderError>;
}

pub trait AudioBackend: Send + Sync {
    type Handle: PlaybackHandle;
    type Graph: SignalGraph<Handle = Self::Handle>;

    /// Plays the asset unmodified, without building a graph.
    fn play_direct(&self, audio: AudioAsset) -> Result<Self::Handle, RenderError>;

    fn create_graph(&self, audio: AudioAsset) -> Result<Self::Graph, RenderError>;
}

struct ActiveRender<H> {
    generation: u64,
    handle: Option<H>,
}

/// Renders one asset at a time: starting a render stops whatever the
/// previous one left playing.
pub struct EmotionAudioRenderer<B: AudioBackend> {
    backend: B,
    active: Mutex<ActiveRender<B::Handle>>,
}

impl<B: AudioBackend> EmotionAudioRenderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: Mutex::new(ActiveRender {
                generation: 0,
                handle: None,
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Plays `audio` shaped by `emotion`. Unknown names render as neutral.
    pub fn render(&self, audio: AudioAsset, emotion: &str) -> Result<B::Handle, RenderError> {
        self.render_profile(audio, EmotionId::resolve(emotion).profile())
    }

    pub fn render_profile(
        &self,
        audio: AudioAsset,
        profile: &EmotionProfile,
    ) -> Result<B::Handle, RenderError> {
        let mut active = self.lock_active();
        active.generation += 1;
        self.start_locked(&mut active, audio, profile)
    }

    /// Decodes `audio` and renders it.
    ///
    /// Returns `Ok(None)` when [`stop`](Self::stop) or another render happened
    /// while decoding; the late asset is dropped rather than played.
    pub async fn render_encoded<D>(
        &self,
        decoder: &D,
        audio: EncodedAudio,
        emotion: &str,
    ) -> Result<Option<B::Handle>, RenderError>
    where
        D: AudioDecoder + ?Sized,
    {
        let ticket = {
            let mut active = self.lock_active();
            active.generation += 1;
            active.generation
        };

        let asset = decoder.decode(audio).await?;

        let mut active = self.lock_active();
        if active.generation != ticket {
            tracing::debug!(emotion, "decode finished after a newer request; discarding");
            return Ok(None);
        }
        self.start_locked(&mut active, asset, EmotionId::resolve(emotion).profile())
            .map(Some)
    }

    /// Stops the active playback, if any, and invalidates in-flight decodes.
    pub fn stop(&self) {
        let mut active = self.lock_active();
        active.generation += 1;
        if let Some(handle) = active.handle.take() {
            handle.stop();
            tracing::debug!("playback stopped");
        }
    }

    /// The handle still playing, if any. A clip that ended on its own is
    /// released here rather than held until the next render.
    pub fn active(&self) -> Option<B::Handle> {
        let mut active = self.lock_active();
        if active.handle.as_ref().is_some_and(|h| h.is_finished()) {
            active.handle = None;
        }
        active.handle.clone()
    }

    fn start_locked(
        &self,
        active: &mut ActiveRender<B::Handle>,
        audio: AudioAsset,
        profile: &EmotionProfile,
    ) -> Result<B::Handle, RenderError> {
        if !audio.is_playable() {
            return Err(RenderError::InvalidAudio {
                details: format!(
                    "sample_rate_hz={} channels={} samples={}",
                    audio.sample_rate_hz,
                    audio.channels,
                    audio.samples.len()
                ),
            });
        }

        if let Some(previous) = active.handle.take() {
            previous.stop();
        }

        let handle = if profile.is_neutral() {
            tracing::debug!(duration_ms = audio.duration().as_millis() as u64, "direct playback");
            self.backend.play_direct(audio)?
        } else {
            self.shape(audio, profile)?
        };
        active.handle = Some(handle.clone());
        Ok(handle)
    }

    fn shape(&self, audio: AudioAsset, profile: &EmotionProfile) -> Result<B::Handle, RenderError> {
        let mut graph = self.backend.create_graph(audio)?;
        graph.insert_filter(FilterSpec::spectral_tilt(profile.spectral_tilt_db));
        graph.set_gain(profile.linear_gain());
        graph.set_tempo(profile.playback_rate);
        let pitch = graph.set_pitch_offset(profile.pitch_shift_cents);
        if pitch == PitchShift::Unsupported && profile.pitch_shift_cents != 0 {
            tracing::debug!(
                emotion = %profile.id,
                cents = profile.pitch_shift_cents,
                "pitch shift unavailable; shaping with tempo only"
            );
        }

        tracing::info!(
            emotion = %profile.id,
            playback_rate = profile.playback_rate,
            gain_db = profile.gain_db,
            tilt_db = profile.spectral_tilt_db,
            pitch_applied = pitch == PitchShift::Applied,
            "rendering with emotion profile"
        );
        graph.start()
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveRender<B::Handle>> {
        match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("render state lock was poisoned; recovering and continuing");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::PROFILES;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Clone, Debug, PartialEq)]
    enum Event {
        Direct,
        Graph(ChainSettings),
    }

    #[derive(Clone, Debug, Default)]
    struct RecordingHandle {
        id: usize,
        stopped: Arc<AtomicBool>,
    }

    impl PlaybackHandle for RecordingHandle {
        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }

        fn is_finished(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }
    }

    #[derive(Clone)]
    struct RecordingBackend {
        pitch: PitchSupport,
        events: Arc<Mutex<Vec<Event>>>,
        started: Arc<AtomicUsize>,
    }

    impl RecordingBackend {
        fn new(pitch: PitchSupport) -> Self {
            Self {
                pitch,
                events: Arc::new(Mutex::new(Vec::new())),
                started: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn next_handle(&self) -> RecordingHandle {
            RecordingHandle {
                id: self.started.fetch_add(1, Ordering::SeqCst),
                stopped: Arc::default(),
            }
        }
    }

    struct RecordingGraph {
        backend: RecordingBackend,
        settings: ChainSettings,
    }

    impl SignalGraph for RecordingGraph {
        type Handle = RecordingHandle;

        fn set_tempo(&mut self, rate: f32) {
            self.settings.tempo = rate;
        }

        fn set_pitch_offset(&mut self, cents: i32) -> PitchShift {
            match self.backend.pitch {
                PitchSupport::Independent => {
                    self.settings.pitch_cents = Some(cents);
                    PitchShift::Applied
                }
                PitchSupport::Unavailable => PitchShift::Unsupported,
            }
        }

        fn insert_filter(&mut self, filter: FilterSpec) {
            self.settings.filters.push(filter);
        }

        fn set_gain(&mut self, gain: f32) {
            self.settings.gain = gain;
        }

        fn start(self) -> Result<RecordingHandle, RenderError> {
            self.backend
                .events
                .lock()
                .unwrap()
                .push(Event::Graph(self.settings));
            Ok(self.backend.next_handle())
        }
    }

    impl AudioBackend for RecordingBackend {
        type Handle = RecordingHandle;
        type Graph = RecordingGraph;

        fn play_direct(&self, _audio: AudioAsset) -> Result<RecordingHandle, RenderError> {
            self.events.lock().unwrap().push(Event::Direct);
            Ok(self.next_handle())
        }

        fn create_graph(&self, _audio: AudioAsset) -> Result<RecordingGraph, RenderError> {
            Ok(RecordingGraph {
                backend: self.clone(),
                settings: ChainSettings::default(),
            })
        }
    }

    fn asset() -> AudioAsset {
        AudioAsset::new(8_000, 1, vec![0.1; 800])
    }

    fn renderer(pitch: PitchSupport) -> EmotionAudioRenderer<RecordingBackend> {
        EmotionAudioRenderer::new(RecordingBackend::new(pitch))
    }

    #[test]
    fn neutral_plays_directly() {
        let r = renderer(PitchSupport::Independent);
        r.render(asset(), "neutral").unwrap();
        assert_eq!(r.backend().events(), vec![Event::Direct]);
    }

    #[test]
    fn every_other_emotion_builds_a_graph_from_its_profile() {
        for profile in PROFILES.iter().filter(|p| !p.is_neutral()) {
            let r = renderer(PitchSupport::Independent);
            r.render(asset(), profile.id.as_str()).unwrap();
            let events = r.backend().events();
            assert_eq!(events.len(), 1);
            let Event::Graph(settings) = &events[0] else {
                panic!("{} played directly", profile.id);
            };
            assert_eq!(settings.tempo, profile.playback_rate);
            assert_eq!(settings.gain, profile.linear_gain());
            assert_eq!(settings.pitch_cents, Some(profile.pitch_shift_cents));
            assert_eq!(
                settings.filters,
                vec![FilterSpec::spectral_tilt(profile.spectral_tilt_db)]
            );
        }
    }

    #[test]
    fn sad_without_pitch_support_still_shapes_tempo_and_level() {
        let r = renderer(PitchSupport::Unavailable);
        r.render(asset(), "sad").unwrap();
        let events = r.backend().events();
        let Event::Graph(settings) = &events[0] else {
            panic!("sad played directly");
        };
        assert_eq!(settings.tempo, 0.9);
        assert_eq!(settings.pitch_cents, None);
        assert!((settings.gain - 0.794_328).abs() < 1e-5);
        assert_eq!(settings.filters[0].gain_db, 2.0);
    }

    #[test]
    fn unknown_emotion_renders_like_neutral() {
        let r = renderer(PitchSupport::Independent);
        r.render(asset(), "melancholic").unwrap();
        r.render(asset(), "").unwrap();
        assert_eq!(r.backend().events(), vec![Event::Direct, Event::Direct]);
    }

    #[test]
    fn new_render_stops_the_previous_one() {
        let r = renderer(PitchSupport::Independent);
        let first = r.render(asset(), "happy").unwrap();
        assert!(!first.is_finished());
        let second = r.render(asset(), "calm").unwrap();
        assert!(first.is_finished());
        assert!(!second.is_finished());
        assert_eq!(r.active().map(|h| h.id), Some(second.id));
    }

    #[test]
    fn stop_halts_active_playback() {
        let r = renderer(PitchSupport::Independent);
        let h = r.render(asset(), "energetic").unwrap();
        r.stop();
        assert!(h.is_finished());
        assert!(r.active().is_none());
        // Idempotent.
        r.stop();
    }

    #[test]
    fn finished_playback_is_released() {
        let r = renderer(PitchSupport::Independent);
        let h = r.render(asset(), "calm").unwrap();
        assert_eq!(r.active().map(|a| a.id), Some(h.id));

        // The clip runs out on its own.
        h.stopped.store(true, Ordering::SeqCst);
        assert!(r.active().is_none());
        assert!(r.lock_active().handle.is_none());
    }

    #[test]
    fn unplayable_audio_is_rejected_before_touching_the_backend() {
        let r = renderer(PitchSupport::Independent);
        let err = r.render(AudioAsset::new(8_000, 1, Vec::new()), "happy").unwrap_err();
        assert!(matches!(err, RenderError::InvalidAudio { .. }));
        assert!(r.backend().events().is_empty());
    }

    struct FailingDecoder;

    impl AudioDecoder for FailingDecoder {
        fn decode(&self, _audio: EncodedAudio) -> BoxFuture<'_, Result<AudioAsset, DecodeError>> {
            async { Err(DecodeError::Malformed("truncated frame".to_owned())) }.boxed()
        }
    }

    /// Returns a fixed asset once released.
    struct GatedDecoder {
        gate: Arc<Notify>,
    }

    impl AudioDecoder for GatedDecoder {
        fn decode(&self, _audio: EncodedAudio) -> BoxFuture<'_, Result<AudioAsset, DecodeError>> {
            let gate = self.gate.clone();
            async move {
                gate.notified().await;
                Ok(asset())
            }
            .boxed()
        }
    }

    fn encoded() -> EncodedAudio {
        EncodedAudio::new(bytes::Bytes::from_static(b"ID3"), crate::tts::MIME_MPEG)
    }

    #[tokio::test]
    async fn decode_failure_builds_nothing() {
        let r = renderer(PitchSupport::Independent);
        let err = r
            .render_encoded(&FailingDecoder, encoded(), "happy")
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Decode(_)));
        assert!(r.backend().events().is_empty());
    }

    #[tokio::test]
    async fn decode_finishing_after_stop_is_discarded() {
        let r = renderer(PitchSupport::Independent);
        let gate = Arc::new(Notify::new());
        let decoder = GatedDecoder { gate: gate.clone() };

        let pending = r.render_encoded(&decoder, encoded(), "happy");
        let release = async {
            tokio::task::yield_now().await;
            r.stop();
            gate.notify_one();
        };
        let (outcome, ()) = tokio::join!(pending, release);

        assert!(outcome.unwrap().is_none());
        assert!(r.backend().events().is_empty());
    }

    #[tokio::test]
    async fn decode_finishing_after_newer_render_is_discarded() {
        let r = renderer(PitchSupport::Independent);
        let gate = Arc::new(Notify::new());
        let decoder = GatedDecoder { gate: gate.clone() };

        let pending = r.render_encoded(&decoder, encoded(), "happy");
        let newer = async {
            tokio::task::yield_now().await;
            let h = r.render(asset(), "calm").unwrap();
            gate.notify_one();
            h
        };
        let (outcome, newer) = tokio::join!(pending, newer);

        assert!(outcome.unwrap().is_none());
        assert!(!newer.is_finished());
        assert_eq!(r.backend().events().len(), 1);
    }

    #[tokio::test]
    async fn encoded_render_plays_when_uncontested() {
        let r = renderer(PitchSupport::Independent);
        let gate = Arc::new(Notify::new());
        gate.notify_one();
        let decoder = GatedDecoder { gate };
        let handle = r.render_encoded(&decoder, encoded(), "neutral").await.unwrap();
        assert!(handle.is_some());
        assert_eq!(r.backend().events(), vec![Event::Direct]);
    }
}
