use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use parley_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use parley_core::config::AppConfig;
use parley_core::domain::call::{
    CallRecordId, CallRecordUpdate, CallerId, ConfirmationAnswer, NewCallRecord,
};
use parley_core::domain::offer::RepaymentOffer;
use parley_core::domain::prompt::VoicePrompt;
use parley_core::errors::{ApplicationError, DomainError};
use parley_core::flows::{
    CallFlow, ConversationState, FlowEngine, FlowTransitionError, PromptKind, TransitionOutcome,
    TurnContext, TurnEvent, WriteMode,
};
use parley_db::repositories::{CallRecordRepository, RepositoryError};

use crate::classifier::{CallClassifier, ConfirmationJudgment};
use crate::locks::CallerLocks;

const ACTOR: &str = "call-runtime";
const NO_RESPONSE_REPLY: &str = "No response received";
const CLARIFICATION_REPLY: &str = "Customer asked for clarification - repeating offer";

#[derive(Clone, Debug)]
pub struct TurnSettings {
    pub offer: RepaymentOffer,
    pub action_path: String,
    pub max_clarification_retries: Option<u32>,
    pub turn_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            offer: RepaymentOffer::default(),
            action_path: "/process-response".to_string(),
            max_clarification_retries: None,
            turn_timeout: Duration::from_secs(15),
        }
    }
}

impl TurnSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            offer: config.offer.clone(),
            action_path: config.voice.action_path.clone(),
            max_clarification_retries: config.dialogue.max_clarification_retries,
            turn_timeout: Duration::from_secs(config.dialogue.turn_timeout_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnInput {
    pub caller_id: CallerId,
    /// Transcribed speech. `None` or blank means the caller said nothing.
    pub utterance: Option<String>,
    /// Speech recognizer confidence, 0.0 to 1.0. Logged only.
    pub asr_confidence: f32,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub call_id: CallRecordId,
    pub transition: TransitionOutcome,
    pub confirmation_response: Option<ConfirmationAnswer>,
    pub confidence: u8,
    pub prompt: VoicePrompt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnResponse {
    pub prompt: VoicePrompt,
    /// Absent when the turn failed and the caller was put on hold.
    pub outcome: Option<TurnOutcome>,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("call store failure: {0}")]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
}

impl From<TurnError> for ApplicationError {
    fn from(value: TurnError) -> Self {
        match value {
            TurnError::Persistence(error) => Self::Persistence(error.to_string()),
            TurnError::Flow(error) => Self::Domain(DomainError::FlowTransition(error)),
        }
    }
}

pub struct CallTurnRuntime {
    repository: Arc<dyn CallRecordRepository>,
    classifier: Arc<dyn CallClassifier>,
    audit: Arc<dyn AuditSink>,
    engine: FlowEngine<CallFlow>,
    locks: CallerLocks,
    settings: TurnSettings,
}

impl CallTurnRuntime {
    pub fn new(
        repository: Arc<dyn CallRecordRepository>,
        classifier: Arc<dyn CallClassifier>,
        audit: Arc<dyn AuditSink>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            repository,
            classifier,
            audit,
            engine: FlowEngine::default(),
            locks: CallerLocks::default(),
            settings,
        }
    }

    /// Opening instruction for a new inbound call.
    pub fn opening_prompt(&self) -> VoicePrompt {
        VoicePrompt::speak_and_gather(
            self.settings.offer.opening_script(),
            self.settings.action_path.clone(),
            Some(self.settings.offer.opening_fallback_script().to_string()),
        )
    }

    /// Runs one turn: reads the caller's open conversation, judges the utterance, applies the
    /// transition and performs exactly one write.
    pub async fn handle_turn(&self, input: TurnInput) -> Result<TurnOutcome, TurnError> {
        let _turn = self.locks.acquire(&input.caller_id).await;

        let mut audit = AuditContext::new(
            None,
            Some(input.caller_id.as_str().to_string()),
            input.correlation_id.clone(),
            ACTOR,
        );
        self.audit.emit(
            AuditEvent::new(&audit, "call.turn_started", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("has_utterance", input.utterance.is_some().to_string())
                .with_metadata("asr_confidence", format!("{:.2}", input.asr_confidence)),
        );

        let pending = self.repository.find_pending_clarification(&input.caller_id).await?;
        let (state, retry_count) = match pending {
            Some(id) => {
                let record =
                    self.repository.find_by_id(id).await?.ok_or(RepositoryError::NotFound(id))?;
                audit = audit.with_call_id(id);
                (ConversationState::from(record.status), record.retry_count)
            }
            None => (self.engine.initial_state(), 0),
        };

        let utterance = input.utterance.as_deref().map(str::trim).filter(|text| !text.is_empty());
        let judgment = match utterance {
            Some(text) => {
                let judgment = self.classifier.classify_confirmation(text).await;
                self.audit.emit(
                    AuditEvent::new(
                        &audit,
                        "call.classifier_invoked",
                        AuditCategory::Classifier,
                        AuditOutcome::Success,
                    )
                    .with_metadata("answer", judgment.answer.as_str())
                    .with_metadata("confidence", judgment.confidence.to_string()),
                );
                Some(judgment)
            }
            None => None,
        };
        let event = judgment.map(|j| TurnEvent::from(j.answer)).unwrap_or(TurnEvent::Silence);

        let context = TurnContext {
            retry_count,
            max_clarification_retries: self.settings.max_clarification_retries,
        };
        let transition =
            self.engine.apply_with_audit(&state, &event, &context, self.audit.as_ref(), &audit)?;

        let call_id = self.write(&input.caller_id, pending, utterance, judgment, &transition).await?;
        self.audit.emit(
            AuditEvent::new(
                &audit.clone().with_call_id(call_id),
                "call.write_committed",
                AuditCategory::Persistence,
                AuditOutcome::Success,
            )
            .with_metadata("write", format!("{:?}", transition.write))
            .with_metadata("status", transition.status.as_str()),
        );

        info!(
            event_name = "call.turn_completed",
            correlation_id = %input.correlation_id,
            call_id = %call_id,
            caller_id = %input.caller_id,
            status = transition.status.as_str(),
            retry_count = transition.retry_count,
            "call turn completed"
        );

        Ok(TurnOutcome {
            call_id,
            confirmation_response: judgment.map(|j| j.answer),
            confidence: judgment.map(|j| j.confidence).unwrap_or(0),
            prompt: self.prompt_for(transition.prompt),
            transition,
        })
    }

    /// Like [`handle_turn`](Self::handle_turn) but bounded by the turn timeout and infallible:
    /// failures are audited and the caller hears the hold message.
    pub async fn respond(&self, input: TurnInput) -> TurnResponse {
        let caller_id = input.caller_id.clone();
        let correlation_id = input.correlation_id.clone();

        let failure = match tokio::time::timeout(self.settings.turn_timeout, self.handle_turn(input))
            .await
        {
            Ok(Ok(outcome)) => {
                return TurnResponse { prompt: outcome.prompt.clone(), outcome: Some(outcome) };
            }
            Ok(Err(error)) => ApplicationError::from(error),
            Err(_) => ApplicationError::TurnTimeout(self.settings.turn_timeout),
        };

        // The audit sink logs failed outcomes at error level.
        let audit =
            AuditContext::new(None, Some(caller_id.as_str().to_string()), correlation_id, ACTOR);
        self.audit.emit(
            AuditEvent::new(&audit, "call.turn_failed", AuditCategory::System, AuditOutcome::Failed)
                .with_metadata("error_class", failure.error_class())
                .with_metadata("error", failure.to_string()),
        );

        TurnResponse {
            prompt: VoicePrompt::speak_and_end(self.settings.offer.hold_script()),
            outcome: None,
        }
    }

    async fn write(
        &self,
        caller_id: &CallerId,
        pending: Option<CallRecordId>,
        utterance: Option<&str>,
        judgment: Option<ConfirmationJudgment>,
        transition: &TransitionOutcome,
    ) -> Result<CallRecordId, TurnError> {
        let transcript = utterance.unwrap_or_default().to_string();
        let confirmation_response = judgment.map(|j| j.answer);
        let confidence = judgment.map(|j| j.confidence).unwrap_or(0);

        match (transition.write, pending) {
            (WriteMode::Amend, Some(id)) => {
                self.repository
                    .update(
                        id,
                        CallRecordUpdate {
                            transcript_delta: transcript,
                            intent: transition.intent,
                            status: transition.status,
                            confirmation_response,
                            confidence,
                            retry_count: transition.retry_count,
                        },
                    )
                    .await?;
                Ok(id)
            }
            _ => {
                let record = NewCallRecord {
                    caller_id: caller_id.clone(),
                    transcript,
                    offered_plan: self.settings.offer.plan_label(),
                    intent: transition.intent,
                    reply_text: self.reply_text(transition.prompt),
                    confidence,
                    status: transition.status,
                    confirmation_response,
                    retry_count: transition.retry_count,
                };
                Ok(self.repository.insert(record).await?)
            }
        }
    }

    fn reply_text(&self, prompt: PromptKind) -> String {
        let offer = &self.settings.offer;
        match prompt {
            PromptKind::Acceptance => offer.acceptance_script(),
            PromptKind::Escalation => offer.escalation_script().to_string(),
            PromptKind::RetryLimitEscalation => offer.retry_limit_script().to_string(),
            PromptKind::Goodbye => NO_RESPONSE_REPLY.to_string(),
            PromptKind::RepeatOffer => CLARIFICATION_REPLY.to_string(),
        }
    }

    fn prompt_for(&self, prompt: PromptKind) -> VoicePrompt {
        let offer = &self.settings.offer;
        match prompt {
            PromptKind::Acceptance => VoicePrompt::speak_and_end(offer.acceptance_script()),
            PromptKind::Escalation => VoicePrompt::speak_and_end(offer.escalation_script()),
            PromptKind::RetryLimitEscalation => {
                VoicePrompt::speak_and_end(offer.retry_limit_script())
            }
            PromptKind::Goodbye => VoicePrompt::speak_and_end(offer.goodbye_script()),
            PromptKind::RepeatOffer => VoicePrompt::speak_and_gather(
                offer.repeat_script(),
                self.settings.action_path.clone(),
                Some(offer.repeat_fallback_script().to_string()),
            ),
        }
    }
}
