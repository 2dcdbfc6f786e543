use parley_agent::llm::HttpLlmClient;

use crate::commands::{async_runtime, load_config, open_failure, CommandResult};

/// Startup preflight: config, call store and classifier client, in the order the server boots them.
pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("start") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let opened = runtime.block_on(async {
        let pool = parley_db::open(&config.database).await?;
        parley_db::close(pool).await;
        Ok::<(), parley_db::OpenError>(())
    });
    if let Err(error) = opened {
        return open_failure("start", &error);
    }

    let client = match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(
                "start",
                "llm_client",
                format!("failed to build llm client: {error:#}"),
                3,
            );
        }
    };

    CommandResult::success(
        "start",
        format!(
            "preflight passed: call store `{}` migrated, classifier {}/{} configured, voice webhook {}:{}{}",
            config.database.url,
            config.llm.provider.as_str(),
            client.model_name(),
            config.server.bind_address,
            config.server.port,
            config.voice.action_path
        ),
    )
}
