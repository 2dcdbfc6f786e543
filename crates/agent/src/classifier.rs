use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use parley_core::domain::call::{CallIntent, ConfirmationAnswer};

use crate::llm::LlmClient;

/// Confirmation answers below this confidence are treated as unclear.
pub const CONFIRMATION_CONFIDENCE_FLOOR: u8 = 70;

const INITIAL_INTENT_PROMPT: &str = r#"You are a debt collection negotiation AI.
Customer owes: {amount}
Customer transcript: {transcript}

Extract intent and propose a payment plan. Then create a SHORT confirmation question.

1. Intent: "willing_to_pay" | "needs_negotiation" | "refuses"
2. Payment plan: "X dollars per month for Y months"
3. Summary: One short sentence summarizing the plan
4. Confirmation question: Ask a simple YES/NO question
5. Confidence: 0-100%

Example:
{"intent": "needs_negotiation", "payment_plan": "$150/month for 6 months", "summary": "I can set up monthly payments of one-fifty for six months.", "confirmation_question": "Does that work for you?", "confidence": 85}

Respond as JSON:
{"intent": "...", "payment_plan": "...", "summary": "...", "confirmation_question": "...", "confidence": 95}"#;

const CONFIRMATION_PROMPT: &str = r#"Analyze this YES/NO response to determine if the customer accepted the payment plan.

Customer said: "{response}"

Determine:
1. Answer: "yes" | "no" | "unclear"
2. Confidence: 0-100%

If unclear (confidence < 70), respond with "unclear".

Respond as JSON:
{"answer": "...", "confidence": 85}"#;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InitialIntentJudgment {
    pub intent: CallIntent,
    pub payment_plan: String,
    pub summary: String,
    pub confirmation_question: String,
    pub confidence: u8,
}

impl InitialIntentJudgment {
    pub fn fallback() -> Self {
        Self {
            intent: CallIntent::Error,
            payment_plan: String::new(),
            summary: "I'm having trouble processing your request.".to_string(),
            confirmation_question: "Can I transfer you to a specialist?".to_string(),
            confidence: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ConfirmationJudgment {
    pub answer: ConfirmationAnswer,
    pub confidence: u8,
}

impl ConfirmationJudgment {
    pub fn fallback() -> Self {
        Self { answer: ConfirmationAnswer::Unclear, confidence: 0 }
    }
}

/// Judges caller utterances. Both operations always produce a judgment; failures degrade
/// to the documented fallback values.
#[async_trait]
pub trait CallClassifier: Send + Sync {
    async fn classify_initial_intent(
        &self,
        transcript: &str,
        amount_owed: Decimal,
    ) -> InitialIntentJudgment;

    async fn classify_confirmation(&self, utterance: &str) -> ConfirmationJudgment;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("language model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("language model call failed: {0}")]
    Transport(String),
    #[error("reply did not contain a JSON object")]
    NotJson,
    #[error("reply JSON was not an object")]
    NotObject,
}

pub struct LlmClassifier<L> {
    client: L,
    timeout: Duration,
}

impl<L> LlmClassifier<L>
where
    L: LlmClient,
{
    pub fn new(client: L, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn ask(&self, prompt: &str) -> Result<String, ClassifierError> {
        match tokio::time::timeout(self.timeout, self.client.complete(prompt)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(error)) => Err(ClassifierError::Transport(format!("{error:#}"))),
            Err(_) => Err(ClassifierError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl<L> CallClassifier for LlmClassifier<L>
where
    L: LlmClient,
{
    async fn classify_initial_intent(
        &self,
        transcript: &str,
        amount_owed: Decimal,
    ) -> InitialIntentJudgment {
        let prompt = render_initial_intent_prompt(transcript, amount_owed);
        let result = match self.ask(&prompt).await {
            Ok(reply) => parse_initial_intent(&reply),
            Err(error) => Err(error),
        };

        match result {
            Ok(judgment) => {
                debug!(
                    event_name = "classifier.initial_intent",
                    provider = self.client.provider_name(),
                    intent = judgment.intent.as_str(),
                    confidence = judgment.confidence,
                    "initial intent classified"
                );
                judgment
            }
            Err(error) => {
                warn!(
                    event_name = "classifier.fallback",
                    operation = "initial_intent",
                    provider = self.client.provider_name(),
                    error = %error,
                    "initial intent classification failed, using fallback"
                );
                InitialIntentJudgment::fallback()
            }
        }
    }

    async fn classify_confirmation(&self, utterance: &str) -> ConfirmationJudgment {
        let prompt = render_confirmation_prompt(utterance);
        let result = match self.ask(&prompt).await {
            Ok(reply) => parse_confirmation(&reply),
            Err(error) => Err(error),
        };

        match result {
            Ok(judgment) => {
                debug!(
                    event_name = "classifier.confirmation",
                    provider = self.client.provider_name(),
                    answer = judgment.answer.as_str(),
                    confidence = judgment.confidence,
                    "confirmation classified"
                );
                judgment
            }
            Err(error) => {
                warn!(
                    event_name = "classifier.fallback",
                    operation = "confirmation",
                    provider = self.client.provider_name(),
                    error = %error,
                    "confirmation classification failed, using fallback"
                );
                ConfirmationJudgment::fallback()
            }
        }
    }
}

pub fn render_initial_intent_prompt(transcript: &str, amount_owed: Decimal) -> String {
    let amount = format!("${:.2}", amount_owed.round_dp(2));
    INITIAL_INTENT_PROMPT.replacen("{amount}", &amount, 1).replacen("{transcript}", transcript, 1)
}

pub fn render_confirmation_prompt(utterance: &str) -> String {
    CONFIRMATION_PROMPT.replacen("{response}", utterance, 1)
}

pub fn parse_initial_intent(reply: &str) -> Result<InitialIntentJudgment, ClassifierError> {
    let object = extract_object(reply)?;

    Ok(InitialIntentJudgment {
        intent: string_field(&object, "intent")
            .and_then(|value| value.trim().to_ascii_lowercase().parse::<CallIntent>().ok())
            .unwrap_or(CallIntent::Unknown),
        payment_plan: string_field(&object, "payment_plan").unwrap_or_default(),
        summary: string_field(&object, "summary")
            .unwrap_or_else(|| "Let me help you with a payment plan.".to_string()),
        confirmation_question: string_field(&object, "confirmation_question")
            .unwrap_or_else(|| "Does that work for you?".to_string()),
        confidence: confidence_field(&object),
    })
}

pub fn parse_confirmation(reply: &str) -> Result<ConfirmationJudgment, ClassifierError> {
    let object = extract_object(reply)?;

    let confidence = confidence_field(&object);
    let answer = string_field(&object, "answer")
        .and_then(|value| value.trim().to_ascii_lowercase().parse::<ConfirmationAnswer>().ok())
        .unwrap_or(ConfirmationAnswer::Unclear);
    let answer =
        if confidence < CONFIRMATION_CONFIDENCE_FLOOR { ConfirmationAnswer::Unclear } else { answer };

    Ok(ConfirmationJudgment { answer, confidence })
}

/// Finds the first JSON object in a model reply, tolerating prose and code fences around it.
fn extract_object(reply: &str) -> Result<Map<String, Value>, ClassifierError> {
    if let Ok(value) = serde_json::from_str::<Value>(reply.trim()) {
        return match value {
            Value::Object(object) => Ok(object),
            _ => Err(ClassifierError::NotObject),
        };
    }

    let start = reply.find('{').ok_or(ClassifierError::NotJson)?;
    let candidate = balanced_object(&reply[start..]).ok_or(ClassifierError::NotJson)?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ClassifierError::NotObject),
        Err(_) => Err(ClassifierError::NotJson),
    }
}

fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=index]);
                }
            }
            _ => {}
        }
    }

    None
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn confidence_field(object: &Map<String, Value>) -> u8 {
    let raw = match object.get("confidence") {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(value) if value.is_finite() => value.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}
