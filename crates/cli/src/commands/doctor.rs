use parley_agent::llm::HttpLlmClient;
use parley_core::config::{AppConfig, LlmProvider};
use parley_db::{CallRecordRepository, DbPool, SqlCallRecordRepository};
use serde::Serialize;

use crate::commands::{async_runtime, load_config};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match load_config("doctor") {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_classifier_client(&config));
            checks.push(check_call_store(&config));
        }
        Err(result) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: failure_message(&result.output),
            });
            for name in ["classifier_client", "call_store"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn failure_message(output: &str) -> String {
    serde_json::from_str::<serde_json::Value>(output)
        .ok()
        .and_then(|payload| payload["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| output.to_string())
}

fn check_classifier_client(config: &AppConfig) -> DoctorCheck {
    match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => {
            let credentials = match config.llm.provider {
                LlmProvider::Ollama => "no api key required",
                LlmProvider::OpenAi | LlmProvider::Anthropic => "api key present",
            };
            DoctorCheck {
                name: "classifier_client",
                status: CheckStatus::Pass,
                details: format!(
                    "{}/{} at {} ({credentials})",
                    config.llm.provider.as_str(),
                    client.model_name(),
                    config.llm.effective_base_url()
                ),
            }
        }
        Err(error) => DoctorCheck {
            name: "classifier_client",
            status: CheckStatus::Fail,
            details: format!("failed to build llm client: {error:#}"),
        },
    }
}

fn check_call_store(config: &AppConfig) -> DoctorCheck {
    let runtime = match async_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(result) => {
            return DoctorCheck {
                name: "call_store",
                status: CheckStatus::Fail,
                details: failure_message(&result.output),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = parley_db::open(&config.database)
            .await
            .map_err(|error| format!("failed to open call store: {error}"))?;
        let count = read_call_store(&pool).await;
        parley_db::close(pool).await;
        count
    });

    match result {
        Ok(count) => DoctorCheck {
            name: "call_store",
            status: CheckStatus::Pass,
            details: format!("opened `{}` ({count} calls recorded)", config.database.url),
        },
        Err(error) => DoctorCheck { name: "call_store", status: CheckStatus::Fail, details: error },
    }
}

/// Reads every record back so a schema or decode mismatch fails the check.
async fn read_call_store(pool: &DbPool) -> Result<usize, String> {
    let repository = SqlCallRecordRepository::new(pool.clone());
    repository
        .list_all()
        .await
        .map(|records| records.len())
        .map_err(|error| format!("failed to read call records: {error}"))
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
