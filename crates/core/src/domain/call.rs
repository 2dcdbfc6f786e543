use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator placed between utterances when a conversation transcript is amended.
pub const TRANSCRIPT_SEPARATOR: &str = " → ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallRecordId(pub i64);

impl fmt::Display for CallRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerId(pub String);

impl CallerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unrecognized {kind} value `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallIntent {
    WillingToPay,
    NeedsNegotiation,
    Refuses,
    Unclear,
    NoResponse,
    Error,
    Unknown,
}

impl CallIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WillingToPay => "willing_to_pay",
            Self::NeedsNegotiation => "needs_negotiation",
            Self::Refuses => "refuses",
            Self::Unclear => "unclear",
            Self::NoResponse => "no_response",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for CallIntent {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "willing_to_pay" => Ok(Self::WillingToPay),
            "needs_negotiation" => Ok(Self::NeedsNegotiation),
            "refuses" => Ok(Self::Refuses),
            "unclear" => Ok(Self::Unclear),
            "no_response" => Ok(Self::NoResponse),
            "error" => Ok(Self::Error),
            "unknown" => Ok(Self::Unknown),
            other => Err(UnknownVariant { kind: "intent", value: other.to_string() }),
        }
    }
}

/// Conversation disposition. Only `PendingClarification` is non-terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    PendingClarification,
    Confirmed,
    NeedsNegotiation,
    NoResponse,
    Error,
    Completed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingClarification => "pending_clarification",
            Self::Confirmed => "confirmed",
            Self::NeedsNegotiation => "needs_negotiation",
            Self::NoResponse => "no_response",
            Self::Error => "error",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PendingClarification)
    }
}

impl FromStr for CallStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending_clarification" => Ok(Self::PendingClarification),
            "confirmed" => Ok(Self::Confirmed),
            "needs_negotiation" => Ok(Self::NeedsNegotiation),
            "no_response" => Ok(Self::NoResponse),
            "error" => Ok(Self::Error),
            "completed" => Ok(Self::Completed),
            other => Err(UnknownVariant { kind: "status", value: other.to_string() }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationAnswer {
    Yes,
    No,
    Unclear,
}

impl ConfirmationAnswer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Unclear => "unclear",
        }
    }
}

impl FromStr for ConfirmationAnswer {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "unclear" => Ok(Self::Unclear),
            other => Err(UnknownVariant { kind: "confirmation answer", value: other.to_string() }),
        }
    }
}

/// One conversation with a caller. Amended across clarification turns, frozen once terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallRecordId,
    pub caller_id: CallerId,
    pub transcript: String,
    pub offered_plan: String,
    pub intent: CallIntent,
    pub reply_text: String,
    pub confidence: u8,
    pub status: CallStatus,
    pub confirmation_response: Option<ConfirmationAnswer>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCallRecord {
    pub caller_id: CallerId,
    pub transcript: String,
    pub offered_plan: String,
    pub intent: CallIntent,
    pub reply_text: String,
    pub confidence: u8,
    pub status: CallStatus,
    pub confirmation_response: Option<ConfirmationAnswer>,
    pub retry_count: u32,
}

impl NewCallRecord {
    pub fn into_record(self, id: CallRecordId, created_at: DateTime<Utc>) -> CallRecord {
        CallRecord {
            id,
            caller_id: self.caller_id,
            transcript: self.transcript,
            offered_plan: self.offered_plan,
            intent: self.intent,
            reply_text: self.reply_text,
            confidence: self.confidence,
            status: self.status,
            confirmation_response: self.confirmation_response,
            retry_count: self.retry_count,
            created_at,
        }
    }
}

/// Amendment applied to a pending conversation. Fields not listed here are never touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecordUpdate {
    pub transcript_delta: String,
    pub intent: CallIntent,
    pub status: CallStatus,
    pub confirmation_response: Option<ConfirmationAnswer>,
    pub confidence: u8,
    pub retry_count: u32,
}

impl CallRecord {
    pub fn apply_update(&mut self, update: &CallRecordUpdate) {
        self.transcript = append_transcript(&self.transcript, &update.transcript_delta);
        self.intent = update.intent;
        self.status = update.status;
        self.confirmation_response = update.confirmation_response;
        self.confidence = update.confidence;
        self.retry_count = update.retry_count;
    }
}

/// Call record in the shape the dashboard and the `calls` command print.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallView {
    pub id: i64,
    pub timestamp: String,
    pub caller_phone: String,
    pub transcript: String,
    pub intent: &'static str,
    pub payment_plan: String,
    pub reply_text: String,
    pub confidence: u8,
    pub status: &'static str,
    pub confirmation_response: Option<&'static str>,
    pub retry_count: u32,
}

impl From<CallRecord> for CallView {
    fn from(record: CallRecord) -> Self {
        Self {
            id: record.id.0,
            timestamp: record.created_at.to_rfc3339(),
            caller_phone: record.caller_id.0,
            transcript: record.transcript,
            intent: record.intent.as_str(),
            payment_plan: record.offered_plan,
            reply_text: record.reply_text,
            confidence: record.confidence,
            status: record.status.as_str(),
            confirmation_response: record.confirmation_response.map(|answer| answer.as_str()),
            retry_count: record.retry_count,
        }
    }
}

pub fn append_transcript(existing: &str, delta: &str) -> String {
    format!("{existing}{TRANSCRIPT_SEPARATOR}{delta}")
}
