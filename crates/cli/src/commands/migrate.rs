use parley_db::migrations;

use crate::commands::{async_runtime, load_config, open_failure, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = parley_db::open(&config.database).await.map_err(|error| open_failure("migrate", &error))?;
        let versions = migrations::applied_versions(&pool).await.map_err(|error| {
            CommandResult::failure("migrate", "migration", error.to_string(), 5)
        });
        parley_db::close(pool).await;
        versions
    });

    match result {
        Ok(versions) => {
            let listed = versions.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
            CommandResult::success("migrate", format!("applied pending migrations (schema versions: {listed})"))
        }
        Err(result) => result,
    }
}
