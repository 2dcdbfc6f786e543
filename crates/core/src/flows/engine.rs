use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::call::{CallIntent, CallStatus};
use crate::flows::states::{
    ConversationState, PromptKind, TransitionOutcome, TurnContext, TurnEvent, WriteMode,
};

pub trait FlowDefinition {
    fn initial_state(&self) -> ConversationState;
    fn transition(
        &self,
        current: &ConversationState,
        event: &TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Offer → response → optional clarification → disposition.
#[derive(Clone, Debug, Default)]
pub struct CallFlow;

impl FlowDefinition for CallFlow {
    fn initial_state(&self) -> ConversationState {
        ConversationState::New
    }

    fn transition(
        &self,
        current: &ConversationState,
        event: &TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_call(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> ConversationState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &ConversationState,
        event: &TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConversationState,
        event: &TurnEvent,
        context: &TurnContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "call.disposition_reached",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event))
                    .with_metadata("status", outcome.status.as_str())
                    .with_metadata("write", format!("{:?}", outcome.write))
                    .with_metadata("retry_count", outcome.retry_count.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "call.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<CallFlow> {
    fn default() -> Self {
        Self::new(CallFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("conversation in terminal state {state:?} cannot accept event {event:?}")]
    TerminalState { state: ConversationState, event: TurnEvent },
}

fn transition_call(
    current: &ConversationState,
    event: &TurnEvent,
    context: &TurnContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationState::{Confirmed, NeedsNegotiation, New, NoResponse, PendingClarification};
    use PromptKind::{Acceptance, Escalation, Goodbye, RepeatOffer, RetryLimitEscalation};
    use TurnEvent::{Affirmed, Ambiguous, Declined, Silence};

    let write = match current {
        New => WriteMode::Insert,
        PendingClarification => WriteMode::Amend,
        terminal => {
            return Err(FlowTransitionError::TerminalState { state: *terminal, event: *event });
        }
    };

    let mut retry_count = context.retry_count;
    let (to, status, intent, prompt) = match event {
        Silence => (NoResponse, CallStatus::NoResponse, CallIntent::NoResponse, Goodbye),
        Affirmed => (Confirmed, CallStatus::Confirmed, CallIntent::WillingToPay, Acceptance),
        Declined => {
            (NeedsNegotiation, CallStatus::NeedsNegotiation, CallIntent::NeedsNegotiation, Escalation)
        }
        Ambiguous if retry_limit_reached(context) => (
            NeedsNegotiation,
            CallStatus::NeedsNegotiation,
            CallIntent::NeedsNegotiation,
            RetryLimitEscalation,
        ),
        Ambiguous => {
            retry_count = context.retry_count.saturating_add(1);
            (PendingClarification, CallStatus::PendingClarification, CallIntent::Unclear, RepeatOffer)
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, intent, status, write, prompt, retry_count })
}

fn retry_limit_reached(context: &TurnContext) -> bool {
    context.max_clarification_retries.is_some_and(|limit| context.retry_count >= limit)
}
