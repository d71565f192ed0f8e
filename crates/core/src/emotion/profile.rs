use crate::emotion::EmotionId;
use serde::Serialize;

/// Center frequency of the warmth/brightness filter.
pub const TILT_CENTER_HZ: f32 = 200.0;
pub const TILT_Q: f32 = 0.7;

/// Fixed shaping parameters for one emotion.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct EmotionProfile {
    pub id: EmotionId,
    pub label: &'static str,
    pub playback_rate: f32,
    pub pitch_shift_cents: i32,
    pub gain_db: f32,
    /// Positive adds warmth, negative adds brightness.
    pub spectral_tilt_db: f32,
}

impl EmotionProfile {
    pub fn linear_gain(&self) -> f32 {
        10f32.powf(self.gain_db / 20.0)
    }

    pub fn is_neutral(&self) -> bool {
        self.id == EmotionId::Neutral
    }
}

pub const NEUTRAL: EmotionProfile = EmotionProfile {
    id: EmotionId::Neutral,
    label: "Neutral",
    playback_rate: 1.00,
    pitch_shift_cents: 0,
    gain_db: 0.0,
    spectral_tilt_db: 0.0,
};

pub const HAPPY: EmotionProfile = EmotionProfile {
    id: EmotionId::Happy,
    label: "Happy",
    playback_rate: 1.10,
    pitch_shift_cents: 100,
    gain_db: 1.5,
    spectral_tilt_db: -2.0,
};

pub const SAD: EmotionProfile = EmotionProfile {
    id: EmotionId::Sad,
    label: "Sad",
    playback_rate: 0.90,
    pitch_shift_cents: -100,
    gain_db: -2.0,
    spectral_tilt_db: 2.0,
};

pub const CALM: EmotionProfile = EmotionProfile {
    id: EmotionId::Calm,
    label: "Calm",
    playback_rate: 0.95,
    pitch_shift_cents: 0,
    gain_db: 0.0,
    spectral_tilt_db: 1.0,
};

pub const ENERGETIC: EmotionProfile = EmotionProfile {
    id: EmotionId::Energetic,
    label: "Energetic",
    playback_rate: 1.20,
    pitch_shift_cents: 50,
    gain_db: 2.0,
    spectral_tilt_db: -1.0,
};

pub const PROFILES: [EmotionProfile; 5] = [NEUTRAL, HAPPY, SAD, CALM, ENERGETIC];
