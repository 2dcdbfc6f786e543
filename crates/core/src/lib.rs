pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::call::{
    CallIntent, CallRecord, CallRecordId, CallRecordUpdate, CallStatus, CallView, CallerId,
    ConfirmationAnswer, NewCallRecord,
};
pub use domain::offer::RepaymentOffer;
pub use domain::prompt::VoicePrompt;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{CallFlow, ConversationState, FlowEngine, TurnContext, TurnEvent};
