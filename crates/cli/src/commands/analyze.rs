use std::time::Duration;

use parley_agent::classifier::{CallClassifier, LlmClassifier};
use parley_agent::llm::HttpLlmClient;
use serde_json::json;

use crate::commands::{async_runtime, load_config, CommandResult};

/// Runs initial-intent analysis on one transcript against the configured balance.
///
/// Classifier failures are absorbed into the fallback judgment, so this only fails on setup.
pub fn run(transcript: &str) -> CommandResult {
    let config = match load_config("analyze") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let client = match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(
                "analyze",
                "llm_client",
                format!("failed to build llm client: {error:#}"),
                3,
            );
        }
    };
    let runtime = match async_runtime("analyze") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let classifier = LlmClassifier::new(client, Duration::from_secs(config.llm.timeout_secs));
    let judgment = runtime
        .block_on(classifier.classify_initial_intent(transcript.trim(), config.offer.amount_owed));

    let payload = json!({
        "command": "analyze",
        "status": "ok",
        "amount_owed": config.offer.amount_owed.to_string(),
        "intent": judgment.intent.as_str(),
        "payment_plan": judgment.payment_plan,
        "summary": judgment.summary,
        "confirmation_question": judgment.confirmation_question,
        "confidence": judgment.confidence,
    });
    CommandResult { exit_code: 0, output: payload.to_string() }
}
