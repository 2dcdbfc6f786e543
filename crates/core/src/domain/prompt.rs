use serde::{Deserialize, Serialize};

/// Outbound instruction for the voice gateway. Exactly one is produced per turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoicePrompt {
    /// Speak the text and hang up.
    SpeakAndEnd { text: String },
    /// Speak the text, gather speech and post it to `action`. `fallback` is spoken when
    /// the gather collects nothing.
    SpeakAndGather { text: String, action: String, fallback: Option<String> },
}

impl VoicePrompt {
    pub fn speak_and_end(text: impl Into<String>) -> Self {
        Self::SpeakAndEnd { text: text.into() }
    }

    pub fn speak_and_gather(
        text: impl Into<String>,
        action: impl Into<String>,
        fallback: Option<String>,
    ) -> Self {
        Self::SpeakAndGather { text: text.into(), action: action.into(), fallback }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::SpeakAndEnd { text } | Self::SpeakAndGather { text, .. } => text,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SpeakAndEnd { .. })
    }
}
