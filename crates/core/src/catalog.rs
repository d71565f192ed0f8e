//! Voices offered by the synthesis provider.

use serde::Serialize;

pub const DEFAULT_VOICE: &str = "alloy";

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct Voice {
    pub id: &'static str,
    pub label: &'static str,
    pub note: &'static str,
}

pub static VOICES: [Voice; 6] = [
    Voice {
        id: "alloy",
        label: "Alloy",
        note: "Clear and natural",
    },
    Voice {
        id: "echo",
        label: "Echo",
        note: "Warm, conversational",
    },
    Voice {
        id: "fable",
        label: "Fable",
        note: "Narrative, light",
    },
    Voice {
        id: "onyx",
        label: "Onyx",
        note: "Deep, striking",
    },
    Voice {
        id: "nova",
        label: "Nova",
        note: "Bright, expressive",
    },
    Voice {
        id: "shimmer",
        label: "Shimmer",
        note: "Soft, modern",
    },
];

pub fn find_voice(id: &str) -> Option<&'static Voice> {
    VOICES.iter().find(|v| v.id.eq_ignore_ascii_case(id.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_voice_is_in_catalog() {
        assert!(find_voice(DEFAULT_VOICE).is_some());
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find_voice("Nova").map(|v| v.label), Some("Nova"));
        assert!(find_voice("robot").is_none());
    }
}
