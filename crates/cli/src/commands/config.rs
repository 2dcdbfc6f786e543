use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parley_core::config::AppConfig;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::load_config;

/// Effective configuration with the source of every value. The API key is never printed.
pub fn run() -> String {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(result) => return result.output,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source =
            field_source(entry.key, entry.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

struct ConfigEntry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn entry(key: &'static str, value: String, env_keys: &'static [&'static str]) -> ConfigEntry {
    ConfigEntry { key, value, env_keys }
}

fn entries(config: &AppConfig) -> Vec<ConfigEntry> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let retries = config
        .dialogue
        .max_clarification_retries
        .map(|limit| limit.to_string())
        .unwrap_or_else(|| "<unbounded>".to_string());

    vec![
        entry("database.url", config.database.url.clone(), &["PARLEY_DATABASE_URL"]),
        entry("database.max_connections", config.database.max_connections.to_string(), &["PARLEY_DATABASE_MAX_CONNECTIONS"]),
        entry("database.timeout_secs", config.database.timeout_secs.to_string(), &["PARLEY_DATABASE_TIMEOUT_SECS"]),
        entry("llm.provider", config.llm.provider.as_str().to_string(), &["PARLEY_LLM_PROVIDER"]),
        entry("llm.model", config.llm.model.clone(), &["PARLEY_LLM_MODEL"]),
        entry("llm.base_url", config.llm.effective_base_url(), &["PARLEY_LLM_BASE_URL"]),
        entry("llm.api_key", api_key, &["PARLEY_LLM_API_KEY"]),
        entry("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["PARLEY_LLM_TIMEOUT_SECS"]),
        entry("llm.max_retries", config.llm.max_retries.to_string(), &["PARLEY_LLM_MAX_RETRIES"]),
        entry("server.bind_address", config.server.bind_address.clone(), &["PARLEY_SERVER_BIND_ADDRESS"]),
        entry("server.port", config.server.port.to_string(), &["PARLEY_SERVER_PORT"]),
        entry("voice.action_path", config.voice.action_path.clone(), &["PARLEY_VOICE_ACTION_PATH"]),
        entry("voice.speech_timeout_secs", config.voice.speech_timeout_secs.to_string(), &["PARLEY_VOICE_SPEECH_TIMEOUT_SECS"]),
        entry("voice.tts_voice", config.voice.tts_voice.clone(), &["PARLEY_VOICE_TTS_VOICE"]),
        entry("offer.amount_owed", config.offer.amount_owed.to_string(), &["PARLEY_OFFER_AMOUNT_OWED"]),
        entry("offer.monthly_payment", config.offer.monthly_payment.to_string(), &["PARLEY_OFFER_MONTHLY_PAYMENT"]),
        entry("offer.months", config.offer.months.to_string(), &["PARLEY_OFFER_MONTHS"]),
        entry("dialogue.max_clarification_retries", retries, &["PARLEY_DIALOGUE_MAX_CLARIFICATION_RETRIES"]),
        entry("dialogue.turn_timeout_secs", config.dialogue.turn_timeout_secs.to_string(), &["PARLEY_DIALOGUE_TURN_TIMEOUT_SECS"]),
        entry("logging.level", config.logging.level.clone(), &["PARLEY_LOGGING_LEVEL", "PARLEY_LOG_LEVEL"]),
        entry("logging.format", format!("{:?}", config.logging.format).to_ascii_lowercase(), &["PARLEY_LOGGING_FORMAT", "PARLEY_LOG_FORMAT"]),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["parley.toml", "config/parley.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    // Keep vendor prefixes like `sk-ant-` recognizable.
    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn api_keys_keep_only_their_prefix() {
        assert_eq!(redact_token("sk-ant-abc123"), "sk-***");
        assert_eq!(redact_token("plainsecret"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_config_file() {
        let doc: Value = "[offer]\nmonths = 4\n".parse().expect("toml");

        assert!(contains_path(&doc, "offer.months"));
        assert!(!contains_path(&doc, "offer.amount_owed"));
        assert!(!contains_path(&doc, "voice.language"));
    }
}
