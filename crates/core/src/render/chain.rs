use super::biquad::Biquad;
use super::pitch::PitchShifter;
use super::{FilterKind, FilterSpec, PitchShift, PitchSupport, PlaybackHandle, RenderError, SignalGraph};
use crate::decode::{duration_from_frames, AudioAsset};
use rodio::source::Source;
use std::time::Duration;

/// Parameters collected by a [`SoftwareGraph`] before it starts.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainSettings {
    /// Varispeed factor; `> 1` is faster and shorter.
    pub tempo: f32,
    /// `None` when no independent pitch shift was applied.
    pub pitch_cents: Option<i32>,
    pub filters: Vec<FilterSpec>,
    pub gain: f32,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            tempo: 1.0,
            pitch_cents: None,
            filters: Vec::new(),
            gain: 1.0,
        }
    }
}

/// Where a started chain's samples go.
pub trait ChainOutput: Send + Sync {
    type Handle: PlaybackHandle;

    fn play_chain(&self, source: ChainSource) -> Result<Self::Handle, RenderError>;
}

/// Signal graph computed in software and handed to a [`ChainOutput`].
pub struct SoftwareGraph<O> {
    output: O,
    asset: AudioAsset,
    pitch: PitchSupport,
    settings: ChainSettings,
}

impl<O> SoftwareGraph<O> {
    pub fn new(output: O, asset: AudioAsset, pitch: PitchSupport) -> Self {
        Self {
            output,
            asset,
            pitch,
            settings: ChainSettings::default(),
        }
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }
}

impl<O: ChainOutput + Send> SignalGraph for SoftwareGraph<O> {
    type Handle = O::Handle;

    fn set_tempo(&mut self, rate: f32) {
        if rate.is_finite() && rate > 0.0 {
            self.settings.tempo = rate;
        } else {
            tracing::warn!(rate, "ignoring non-positive playback rate");
        }
    }

    fn set_pitch_offset(&mut self, cents: i32) -> PitchShift {
        match self.pitch {
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

    fn start(self) -> Result<O::Handle, RenderError> {
        let source = ChainSource::new(self.asset, &self.settings);
        self.output.play_chain(source)
    }
}

/// Interleaved sample stream: varispeed, then pitch, then filters, then gain.
pub struct ChainSource {
    samples: Vec<f32>,
    channels: usize,
    sample_rate_hz: u32,
    tempo: f64,
    source_frames: usize,
    // Frames read from the source; anything past this feeds silence to flush
    // the pitch shifters' delay lines.
    resampled_frames: usize,
    output_frames: usize,
    next_frame: usize,
    frame: Vec<f32>,
    cursor: usize,
    shifters: Vec<PitchShifter>,
    // Channel-major: `filters_per_channel` sections for channel 0, then channel 1, ...
    filters: Vec<Biquad>,
    filters_per_channel: usize,
    gain: f32,
}

impl ChainSource {
    pub fn new(asset: AudioAsset, settings: &ChainSettings) -> Self {
        let channels = usize::from(asset.channels.max(1));
        let sample_rate_hz = asset.sample_rate_hz;
        let source_frames = asset.samples.len() / channels;
        let tempo = f64::from(settings.tempo);

        let shifters: Vec<PitchShifter> = match settings.pitch_cents {
            Some(cents) if cents != 0 && source_frames > 0 => (0..channels)
                .map(|_| PitchShifter::new(cents, sample_rate_hz))
                .collect(),
            _ => Vec::new(),
        };
        let resampled_frames = output_frames(source_frames, tempo);
        let tail_frames = shifters.first().map_or(0, PitchShifter::latency_frames);
        let filters = (0..channels)
            .flat_map(|_| {
                settings.filters.iter().map(|f| match f.kind {
                    FilterKind::Peaking => {
                        Biquad::peaking(sample_rate_hz, f.frequency_hz, f.q, f.gain_db)
                    }
                })
            })
            .collect();

        Self {
            samples: asset.samples,
            channels,
            sample_rate_hz,
            tempo,
            source_frames,
            resampled_frames,
            output_frames: resampled_frames + tail_frames,
            next_frame: 0,
            frame: vec![0.0; channels],
            cursor: channels,
            shifters,
            filters,
            filters_per_channel: settings.filters.len(),
            gain: settings.gain,
        }
    }

    /// Output length in frames once fully drained.
    pub fn frames(&self) -> usize {
        self.output_frames
    }

    pub fn duration(&self) -> Duration {
        duration_from_frames(self.sample_rate_hz, self.output_frames)
    }

    fn render_frame(&mut self) {
        let in_tail = self.next_frame >= self.resampled_frames;
        let pos = self.next_frame as f64 * self.tempo;
        let last = self.source_frames - 1;
        let i0 = (pos.floor() as usize).min(last);
        let i1 = (i0 + 1).min(last);
        let frac = (pos - i0 as f64).clamp(0.0, 1.0) as f32;

        for ch in 0..self.channels {
            let mut x = if in_tail {
                0.0
            } else {
                let a = self.samples[i0 * self.channels + ch];
                let b = self.samples[i1 * self.channels + ch];
                a + (b - a) * frac
            };
            if let Some(shifter) = self.shifters.get_mut(ch) {
                x = shifter.process(x);
            }
            let start = ch * self.filters_per_channel;
            for filter in &mut self.filters[start..start + self.filters_per_channel] {
                x = filter.process(x);
            }
            self.frame[ch] = x * self.gain;
        }
        self.next_frame += 1;
        self.cursor = 0;
    }
}

fn output_frames(source_frames: usize, tempo: f64) -> usize {
    if source_frames == 0 {
        return 0;
    }
    ((source_frames - 1) as f64 / tempo).floor() as usize + 1
}

impl Iterator for ChainSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.cursor >= self.channels {
            if self.next_frame >= self.output_frames {
                return None;
            }
            self.render_frame();
        }
        let sample = self.frame[self.cursor];
        self.cursor += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let buffered = self.channels - self.cursor.min(self.channels);
        let left = (self.output_frames - self.next_frame) * self.channels + buffered;
        (left, Some(left))
    }
}

impl Source for ChainSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels as u16
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate_hz
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> AudioAsset {
        AudioAsset::new(
            1_000,
            1,
            (0..frames).map(|i| i as f32 / frames as f32).collect(),
        )
    }

    #[test]
    fn default_settings_pass_audio_through() {
        let asset = ramp(100);
        let out: Vec<f32> = ChainSource::new(asset.clone(), &ChainSettings::default()).collect();
        assert_eq!(out, asset.samples);
    }

    #[test]
    fn tempo_changes_length_inversely() {
        for (tempo, expected) in [(0.5, 199), (2.0, 50), (1.25, 80), (0.75, 133)] {
            let settings = ChainSettings {
                tempo,
                ..ChainSettings::default()
            };
            let source = ChainSource::new(ramp(100), &settings);
            assert_eq!(source.frames(), expected, "tempo {tempo}");
            assert_eq!(source.count(), expected);
        }
    }

    #[test]
    fn slowing_down_interpolates_between_frames() {
        let asset = AudioAsset::new(1_000, 1, vec![0.0, 1.0, 0.0]);
        let settings = ChainSettings {
            tempo: 0.5,
            ..ChainSettings::default()
        };
        let out: Vec<f32> = ChainSource::new(asset, &settings).collect();
        assert_eq!(out, vec![0.0, 0.5, 1.0, 0.5, 0.0]);
    }

    #[test]
    fn stereo_stays_interleaved() {
        let samples: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let asset = AudioAsset::new(8_000, 2, samples);
        let settings = ChainSettings {
            tempo: 1.2,
            gain: 2.0,
            ..ChainSettings::default()
        };
        let source = ChainSource::new(asset, &settings);
        assert_eq!(Source::channels(&source), 2);
        let out: Vec<f32> = source.collect();
        assert_eq!(out.len() % 2, 0);
        for pair in out.chunks(2) {
            assert!((pair[0] - 1.0).abs() < 1e-6);
            assert!((pair[1] + 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn pitch_shift_adds_only_the_delay_line_tail() {
        let settings = ChainSettings {
            pitch_cents: Some(-100),
            ..ChainSettings::default()
        };
        let latency = PitchShifter::new(-100, 1_000).latency_frames();
        let source = ChainSource::new(ramp(500), &settings);
        assert_eq!(source.frames(), 500 + latency);
        assert_eq!(source.count(), 500 + latency);
    }

    #[test]
    fn pitch_shifted_clip_keeps_its_ending() {
        let sr = 16_000;
        let mut samples = vec![0.0; sr as usize];
        // 20 ms of 200 Hz right at the end of the clip.
        samples.extend(
            (0..320).map(|i| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / sr as f32).sin()),
        );
        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>();
        let burst = energy(&samples[sr as usize..]);

        for cents in [100, -100, 50] {
            let settings = ChainSettings {
                pitch_cents: Some(cents),
                ..ChainSettings::default()
            };
            let asset = AudioAsset::new(sr, 1, samples.clone());
            let out: Vec<f32> = ChainSource::new(asset, &settings).collect();
            let kept = energy(&out[sr as usize..]) / burst;
            assert!(kept > 0.45, "cents {cents}: kept {kept}");
        }
    }

    #[test]
    fn size_hint_tracks_consumption() {
        let mut source = ChainSource::new(
            AudioAsset::new(8_000, 2, vec![0.0; 20]),
            &ChainSettings::default(),
        );
        assert_eq!(source.size_hint(), (20, Some(20)));
        source.next();
        assert_eq!(source.size_hint(), (19, Some(19)));
    }

    #[test]
    fn graph_records_pitch_only_when_supported() {
        struct Nowhere;
        impl ChainOutput for Nowhere {
            type Handle = crate::render::OfflinePlayback;
            fn play_chain(&self, _source: ChainSource) -> Result<Self::Handle, RenderError> {
                Err(RenderError::OutputUnavailable {
                    details: "test".to_owned(),
                })
            }
        }

        let mut g = SoftwareGraph::new(Nowhere, ramp(10), PitchSupport::Unavailable);
        assert_eq!(g.set_pitch_offset(100), PitchShift::Unsupported);
        assert_eq!(g.settings().pitch_cents, None);

        let mut g = SoftwareGraph::new(Nowhere, ramp(10), PitchSupport::Independent);
        assert_eq!(g.set_pitch_offset(100), PitchShift::Applied);
        g.set_tempo(0.0);
        assert_eq!(g.settings().pitch_cents, Some(100));
        assert_eq!(g.settings().tempo, 1.0);
    }
}
