mod profile;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use profile::{
    EmotionProfile, CALM, ENERGETIC, HAPPY, NEUTRAL, PROFILES, SAD, TILT_CENTER_HZ, TILT_Q,
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EmotionId {
    #[default]
    Neutral,
    Happy,
    Sad,
    Calm,
    Energetic,
}

impl EmotionId {
    pub const ALL: [EmotionId; 5] = [
        EmotionId::Neutral,
        EmotionId::Happy,
        EmotionId::Sad,
        EmotionId::Calm,
        EmotionId::Energetic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionId::Neutral => "neutral",
            EmotionId::Happy => "happy",
            EmotionId::Sad => "sad",
            EmotionId::Calm => "calm",
            EmotionId::Energetic => "energetic",
        }
    }

    /// Parses `value`, degrading anything unrecognised to [`EmotionId::Neutral`].
    pub fn resolve(value: &str) -> Self {
        match value.parse() {
            Ok(id) => id,
            Err(UnknownEmotion(raw)) => {
                tracing::debug!(emotion = %raw, "unknown emotion id; using neutral");
                EmotionId::Neutral
            }
        }
    }

    pub fn profile(&self) -> &'static EmotionProfile {
        match self {
            EmotionId::Neutral => &NEUTRAL,
            EmotionId::Happy => &HAPPY,
            EmotionId::Sad => &SAD,
            EmotionId::Calm => &CALM,
            EmotionId::Energetic => &ENERGETIC,
        }
    }
}

impl fmt::Display for EmotionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown emotion: {0:?}")]
pub struct UnknownEmotion(pub String);

impl FromStr for EmotionId {
    type Err = UnknownEmotion;

    // Lenient: "Happy" and " happy " both shape audio, where an exact match
    // on the lowercase names would play them as neutral.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        EmotionId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownEmotion(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Happy".parse::<EmotionId>(), Ok(EmotionId::Happy));
        assert_eq!(" ENERGETIC ".parse::<EmotionId>(), Ok(EmotionId::Energetic));
        assert!("angry".parse::<EmotionId>().is_err());
    }

    #[test]
    fn unknown_ids_resolve_to_neutral() {
        assert_eq!(EmotionId::resolve("furious"), EmotionId::Neutral);
        assert_eq!(EmotionId::resolve(""), EmotionId::Neutral);
        assert_eq!(EmotionId::resolve("sad"), EmotionId::Sad);
    }

    #[test]
    fn every_id_maps_to_its_own_profile() {
        for id in EmotionId::ALL {
            assert_eq!(id.profile().id, id);
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&EmotionId::Calm).unwrap(), "\"calm\"");
        let id: EmotionId = serde_json::from_str("\"energetic\"").unwrap();
        assert_eq!(id, EmotionId::Energetic);
    }
}
