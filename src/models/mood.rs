use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::error::AppError;

/// Coarse preference signal that drives genre selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Melancholic,
    Excited,
    Relaxed,
    Romantic,
    Tense,
    Thoughtful,
    Playful,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Happy,
        Mood::Melancholic,
        Mood::Excited,
        Mood::Relaxed,
        Mood::Romantic,
        Mood::Tense,
        Mood::Thoughtful,
        Mood::Playful,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Melancholic => "melancholic",
            Mood::Excited => "excited",
            Mood::Relaxed => "relaxed",
            Mood::Romantic => "romantic",
            Mood::Tense => "tense",
            Mood::Thoughtful => "thoughtful",
            Mood::Playful => "playful",
        }
    }
}

impl Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mood {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        Mood::ALL
            .into_iter()
            .find(|mood| mood.as_str() == tag)
            .ok_or_else(|| AppError::UnknownMood(s.to_string()))
    }
}
