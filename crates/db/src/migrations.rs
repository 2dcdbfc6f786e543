use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Versions recorded as applied, oldest first.
pub async fn applied_versions(pool: &DbPool) -> Result<Vec<i64>, sqlx::Error> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if exists == 0 {
        return Ok(Vec::new());
    }

    sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version")
        .fetch_all(pool)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{applied_versions, run_pending};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] =
        &["calls", "idx_calls_caller_created_at", "idx_calls_pending_caller"];

    async fn migrated_pool() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn migrations_create_calls_table() {
        let pool = migrated_pool().await;

        let calls_count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = 'calls'",
        )
        .fetch_one(&pool)
        .await
        .expect("check calls table")
        .get::<i64, _>("count");

        assert_eq!(calls_count, 1);
        assert_eq!(applied_versions(&pool).await.expect("versions"), vec![1]);
    }

    #[tokio::test]
    async fn applied_versions_is_empty_before_migrating() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert!(applied_versions(&pool).await.expect("versions").is_empty());
    }

    #[tokio::test]
    async fn schema_rejects_out_of_range_values() {
        let pool = migrated_pool().await;

        let bad_status = sqlx::query(
            "INSERT INTO calls (caller_phone, transcript, intent, payment_plan, reply_text,
                                confidence, status, retry_count, created_at)
             VALUES ('555-0100', 'hi', 'unclear', 'plan', 'reply', 0, 'on_hold', 0, '2024-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(bad_status.is_err(), "unknown status must violate CHECK");

        let bad_confidence = sqlx::query(
            "INSERT INTO calls (caller_phone, transcript, intent, payment_plan, reply_text,
                                confidence, status, retry_count, created_at)
             VALUES ('555-0100', 'hi', 'unclear', 'plan', 'reply', 101, 'confirmed', 0, '2024-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(bad_confidence.is_err(), "confidence above 100 must violate CHECK");
    }

    #[tokio::test]
    async fn partial_index_allows_one_pending_row_per_caller() {
        let pool = migrated_pool().await;
        let insert = "INSERT INTO calls (caller_phone, transcript, intent, payment_plan, reply_text,
                                         confidence, status, retry_count, created_at)
                      VALUES ('555-0100', 'hmm', 'unclear', 'plan', 'reply', 0, ?, 0, '2024-01-01T00:00:00Z')";

        sqlx::query(insert).bind("confirmed").execute(&pool).await.expect("terminal row");
        sqlx::query(insert).bind("confirmed").execute(&pool).await.expect("second terminal row");
        sqlx::query(insert).bind("pending_clarification").execute(&pool).await.expect("pending");

        let duplicate = sqlx::query(insert).bind("pending_clarification").execute(&pool).await;
        assert!(duplicate.is_err(), "second pending row for the same caller must be rejected");
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = migrated_pool().await;

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let calls_count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = 'calls'",
        )
        .fetch_one(&pool)
        .await
        .expect("check calls table removed")
        .get::<i64, _>("count");

        assert_eq!(calls_count, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = migrated_pool().await;

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
