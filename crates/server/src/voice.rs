//! Voice gateway webhooks.
//!
//! - `GET|POST /voice`: opening offer, gathers the caller's reply
//! - `POST /process-response`: runs one call turn for the gathered speech

use std::sync::Arc;

use axum::{
    extract::{Form, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use parley_agent::runtime::{CallTurnRuntime, TurnInput};
use parley_core::config::VoiceConfig;
use parley_core::domain::call::CallerId;

use crate::twiml;

#[derive(Clone)]
pub struct VoiceState {
    pub runtime: Arc<CallTurnRuntime>,
    pub voice: VoiceConfig,
}

/// Form fields posted by the gateway after a speech gather. Other fields are ignored.
#[derive(Debug, Deserialize)]
pub struct GatherResult {
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Confidence", default)]
    pub confidence: f32,
}

pub fn router(state: VoiceState) -> Router {
    let action_path = state.voice.action_path.clone();
    Router::new()
        .route("/voice", get(voice).post(voice))
        .route(&action_path, post(process_response))
        .with_state(state)
}

fn xml(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, twiml::CONTENT_TYPE)], body)
}

async fn voice(State(state): State<VoiceState>) -> impl IntoResponse {
    info!(event_name = "call.inbound", "inbound call answered with opening offer");
    xml(twiml::render_prompt(&state.runtime.opening_prompt(), &state.voice))
}

async fn process_response(
    State(state): State<VoiceState>,
    Form(form): Form<GatherResult>,
) -> impl IntoResponse {
    let input = TurnInput {
        caller_id: CallerId::new(form.from),
        utterance: form.speech_result,
        asr_confidence: form.confidence,
        correlation_id: Uuid::new_v4().to_string(),
    };

    let response = state.runtime.respond(input).await;
    xml(twiml::render_prompt(&response.prompt, &state.voice))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    use parley_agent::classifier::{CallClassifier, ConfirmationJudgment, InitialIntentJudgment};
    use parley_agent::runtime::{CallTurnRuntime, TurnSettings};
    use parley_core::audit::InMemoryAuditSink;
    use parley_core::config::AppConfig;
    use parley_core::domain::call::{CallStatus, ConfirmationAnswer};
    use parley_db::repositories::{CallRecordRepository, InMemoryCallRecordRepository};

    use super::{router, VoiceState};

    struct QueuedClassifier(Mutex<VecDeque<ConfirmationJudgment>>);

    #[async_trait]
    impl CallClassifier for QueuedClassifier {
        async fn classify_initial_intent(&self, _: &str, _: Decimal) -> InitialIntentJudgment {
            InitialIntentJudgment::fallback()
        }

        async fn classify_confirmation(&self, _: &str) -> ConfirmationJudgment {
            self.0.lock().expect("queue").pop_front().unwrap_or_else(ConfirmationJudgment::fallback)
        }
    }

    fn app(answers: &[(ConfirmationAnswer, u8)]) -> (Router, Arc<InMemoryCallRecordRepository>) {
        let config = AppConfig::default();
        let store = Arc::new(InMemoryCallRecordRepository::default());
        let classifier = QueuedClassifier(Mutex::new(
            answers
                .iter()
                .map(|(answer, confidence)| ConfirmationJudgment { answer: *answer, confidence: *confidence })
                .collect(),
        ));
        let runtime = CallTurnRuntime::new(
            store.clone(),
            Arc::new(classifier),
            Arc::new(InMemoryAuditSink::default()),
            TurnSettings::from_config(&config),
        );
        (router(VoiceState { runtime: Arc::new(runtime), voice: config.voice }), store)
    }

    async fn post_form(app: &Router, body: &str) -> (StatusCode, String, String) {
        let response = app
            .clone()
            .oneshot(
                Request::post("/process-response")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, content_type, String::from_utf8(bytes.to_vec()).expect("utf8"))
    }

    #[tokio::test]
    async fn voice_webhook_gathers_speech_for_get_and_post() {
        let (app, _) = app(&[]);

        for method in ["GET", "POST"] {
            let response = app
                .clone()
                .oneshot(Request::builder().method(method).uri("/voice").body(Body::empty()).expect("request"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");

            let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
            let body = String::from_utf8(bytes.to_vec()).expect("utf8");
            assert!(body.contains(r#"<Gather input="speech" action="/process-response" method="POST" speechTimeout="3" language="en-US">"#));
            assert!(body.contains("outstanding balance of $1,000"));
            assert!(body.contains("<Say>We didn&apos;t receive a response."));
        }
    }

    #[tokio::test]
    async fn clarification_then_acceptance_over_http() {
        let (app, store) = app(&[(ConfirmationAnswer::Unclear, 40), (ConfirmationAnswer::Yes, 93)]);

        let (status, content_type, body) =
            post_form(&app, "SpeechResult=what%3F&From=%2B15550100&Confidence=0.61&CallSid=CA1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/xml");
        assert!(body.contains("<Gather"), "unclear answer repeats the offer");

        let (_, _, body) = post_form(&app, "SpeechResult=yes&From=%2B15550100&Confidence=0.92").await;
        assert!(!body.contains("<Gather"));
        assert!(body.contains("Excellent!"));

        let calls = store.list_all().await.expect("list");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].caller_id.as_str(), "+15550100");
        assert_eq!(calls[0].transcript, "what? → yes");
        assert_eq!(calls[0].status, CallStatus::Confirmed);
    }

    #[tokio::test]
    async fn missing_speech_ends_the_call() {
        let (app, store) = app(&[]);

        let (status, _, body) = post_form(&app, "From=%2B15550100").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("We didn&apos;t catch your response."));
        let calls = store.list_all().await.expect("list");
        assert_eq!(calls[0].status, CallStatus::NoResponse);
    }

    #[tokio::test]
    async fn missing_caller_is_rejected() {
        let (app, store) = app(&[]);

        let (status, _, _) = post_form(&app, "SpeechResult=yes").await;

        assert!(status.is_client_error());
        assert!(store.list_all().await.expect("list").is_empty());
    }
}
