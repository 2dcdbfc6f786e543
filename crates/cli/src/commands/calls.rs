use parley_core::domain::call::CallView;
use parley_db::{CallRecordRepository, SqlCallRecordRepository};
use serde_json::json;

use crate::commands::{async_runtime, load_config, open_failure, CommandResult};

/// Most recent call records, newest first, as one JSON document.
pub fn run(limit: u32) -> CommandResult {
    let config = match load_config("calls") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("calls") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = parley_db::open(&config.database).await.map_err(|error| open_failure("calls", &error))?;
        let records = SqlCallRecordRepository::new(pool.clone()).list_recent(limit).await.map_err(|error| {
            CommandResult::failure("calls", "call_store", format!("failed to list call records: {error}"), 4)
        });
        parley_db::close(pool).await;
        records
    });

    match result {
        Ok(records) => {
            let calls: Vec<CallView> = records.into_iter().map(CallView::from).collect();
            let payload = json!({ "command": "calls", "status": "ok", "count": calls.len(), "calls": calls });
            CommandResult { exit_code: 0, output: payload.to_string() }
        }
        Err(result) => result,
    }
}
