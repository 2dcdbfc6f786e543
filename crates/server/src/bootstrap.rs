use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use parley_agent::classifier::LlmClassifier;
use parley_agent::llm::HttpLlmClient;
use parley_agent::runtime::{CallTurnRuntime, TurnSettings};
use parley_core::audit::TracingAuditSink;
use parley_core::config::{AppConfig, ConfigError, LoadOptions};
use parley_db::repositories::{CallRecordRepository, SqlCallRecordRepository};
use parley_db::{DbPool, OpenError};
use thiserror::Error;
use tracing::info;

use crate::{api, health, voice};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub repository: Arc<dyn CallRecordRepository>,
    pub runtime: Arc<CallTurnRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] OpenError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = parley_db::open(&config.database).await?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        "call store connected and migrated"
    );

    let client =
        HttpLlmClient::from_config(&config.llm).map_err(|error| BootstrapError::Llm(format!("{error:#}")))?;
    let classifier = LlmClassifier::new(client, Duration::from_secs(config.llm.timeout_secs));
    info!(
        event_name = "system.bootstrap.classifier_ready",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        "classifier initialized"
    );

    let repository: Arc<dyn CallRecordRepository> =
        Arc::new(SqlCallRecordRepository::new(db_pool.clone()));
    let runtime = CallTurnRuntime::new(
        repository.clone(),
        Arc::new(classifier),
        Arc::new(TracingAuditSink),
        TurnSettings::from_config(&config),
    );

    Ok(Application { config, db_pool, repository, runtime: Arc::new(runtime) })
}

impl Application {
    /// Voice webhooks, dashboard API and health check on one router.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(voice::router(voice::VoiceState {
                runtime: self.runtime.clone(),
                voice: self.config.voice.clone(),
            }))
            .merge(api::router(api::ApiState { repository: self.repository.clone() }))
            .merge(health::router(health::HealthState {
                db_pool: self.db_pool.clone(),
                classifier: format!("{}/{}", self.config.llm.provider.as_str(), self.config.llm.model),
            }))
    }
}
