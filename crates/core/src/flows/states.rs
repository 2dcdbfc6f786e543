use serde::{Deserialize, Serialize};

use crate::domain::call::{CallIntent, CallStatus, ConfirmationAnswer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    /// No pending record exists for the caller.
    New,
    PendingClarification,
    Confirmed,
    NeedsNegotiation,
    NoResponse,
    Error,
    Completed,
}

impl ConversationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::New | Self::PendingClarification)
    }
}

impl From<CallStatus> for ConversationState {
    fn from(status: CallStatus) -> Self {
        match status {
            CallStatus::PendingClarification => Self::PendingClarification,
            CallStatus::Confirmed => Self::Confirmed,
            CallStatus::NeedsNegotiation => Self::NeedsNegotiation,
            CallStatus::NoResponse => Self::NoResponse,
            CallStatus::Error => Self::Error,
            CallStatus::Completed => Self::Completed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnEvent {
    Silence,
    Affirmed,
    Declined,
    Ambiguous,
}

impl From<ConfirmationAnswer> for TurnEvent {
    fn from(answer: ConfirmationAnswer) -> Self {
        match answer {
            ConfirmationAnswer::Yes => Self::Affirmed,
            ConfirmationAnswer::No => Self::Declined,
            ConfirmationAnswer::Unclear => Self::Ambiguous,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnContext {
    /// Clarification round-trips already recorded on the pending conversation.
    pub retry_count: u32,
    /// `None` leaves the clarification loop unbounded.
    pub max_clarification_retries: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    Insert,
    Amend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptKind {
    Acceptance,
    Escalation,
    RetryLimitEscalation,
    Goodbye,
    RepeatOffer,
}

impl PromptKind {
    pub fn gathers_speech(&self) -> bool {
        matches!(self, Self::RepeatOffer)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationState,
    pub to: ConversationState,
    pub event: TurnEvent,
    pub intent: CallIntent,
    pub status: CallStatus,
    pub write: WriteMode,
    pub prompt: PromptKind,
    pub retry_count: u32,
}

impl TransitionOutcome {
    pub fn is_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}
