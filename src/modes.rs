//! Conversational personas.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoCreateError;

/// One of the three fixed personas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Creative storytelling.
    #[default]
    Story,
    /// Brainstorming partner.
    Idea,
    /// Educational assistant.
    Tutor,
}

/// Sampling preferences attached to a mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModePreferences {
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token budget.
    pub max_tokens: u32,
}

impl Mode {
    /// All modes, in display order.
    pub const ALL: [Self; 3] = [Self::Story, Self::Idea, Self::Tutor];

    /// Lowercase name used on the wire and in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Idea => "idea",
            Self::Tutor => "tutor",
        }
    }

    /// Parse a mode name, falling back to [`Mode::Story`] for anything unknown.
    #[must_use]
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// System instruction for this persona.
    #[must_use]
    pub const fn system_prompt(self) -> &'static str {
        match self {
            Self::Story => {
                "You are a creative storytelling assistant. Continue the user's story with vivid descriptions, engaging dialogue, and compelling narrative. Match their tone and style while adding creative elements."
            }
            Self::Idea => {
                "You are an innovation brainstorming partner. Expand on the user's ideas with fresh perspectives, practical applications, and creative solutions. Think big but keep it actionable."
            }
            Self::Tutor => {
                "You are a patient and knowledgeable educational assistant. Help explain concepts clearly, provide examples, and guide learning. Make complex topics accessible and engaging."
            }
        }
    }

    /// Sampling preferences for this persona.
    #[must_use]
    pub const fn preferences(self) -> ModePreferences {
        match self {
            Self::Story | Self::Idea => ModePreferences {
                temperature: 0.9,
                max_tokens: 800,
            },
            Self::Tutor => ModePreferences {
                temperature: 0.7,
                max_tokens: 800,
            },
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CoCreateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "story" => Ok(Self::Story),
            "idea" => Ok(Self::Idea),
            "tutor" => Ok(Self::Tutor),
            other => Err(CoCreateError::InvalidInput(format!("unknown mode: {other}"))),
        }
    }
}
