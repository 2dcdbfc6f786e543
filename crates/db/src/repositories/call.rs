use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use parley_core::domain::call::{
    CallIntent, CallRecord, CallRecordId, CallRecordUpdate, CallStatus, CallerId,
    ConfirmationAnswer, NewCallRecord, TRANSCRIPT_SEPARATOR,
};

use super::{CallRecordRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT id, caller_phone, transcript, intent, payment_plan, reply_text,
                                     confidence, status, confirmation_response, retry_count, created_at
                              FROM calls";

pub struct SqlCallRecordRepository {
    pool: DbPool,
}

impl SqlCallRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_call(row: &sqlx::sqlite::SqliteRow) -> Result<CallRecord, RepositoryError> {
    let id: i64 = decode(row.try_get("id"))?;
    let caller_phone: String = decode(row.try_get("caller_phone"))?;
    let transcript: String = decode(row.try_get("transcript"))?;
    let intent_str: String = decode(row.try_get("intent"))?;
    let payment_plan: String = decode(row.try_get("payment_plan"))?;
    let reply_text: String = decode(row.try_get("reply_text"))?;
    let confidence: i64 = decode(row.try_get("confidence"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let confirmation_str: Option<String> = decode(row.try_get("confirmation_response"))?;
    let retry_count: i64 = decode(row.try_get("retry_count"))?;
    let created_at_str: String = decode(row.try_get("created_at"))?;

    let intent = intent_str
        .parse::<CallIntent>()
        .map_err(|e| RepositoryError::Decode(format!("call {id}: {e}")))?;
    let status = status_str
        .parse::<CallStatus>()
        .map_err(|e| RepositoryError::Decode(format!("call {id}: {e}")))?;
    let confirmation_response = confirmation_str
        .map(|value| value.parse::<ConfirmationAnswer>())
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("call {id}: {e}")))?;
    let confidence = u8::try_from(confidence)
        .ok()
        .filter(|value| *value <= 100)
        .ok_or_else(|| RepositoryError::Decode(format!("call {id}: confidence {confidence}")))?;
    let retry_count = u32::try_from(retry_count)
        .map_err(|_| RepositoryError::Decode(format!("call {id}: retry_count {retry_count}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("call {id}: created_at {e}")))?;

    Ok(CallRecord {
        id: CallRecordId(id),
        caller_id: CallerId(caller_phone),
        transcript,
        offered_plan: payment_plan,
        intent,
        reply_text,
        confidence,
        status,
        confirmation_response,
        retry_count,
        created_at,
    })
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl CallRecordRepository for SqlCallRecordRepository {
    async fn insert(&self, record: NewCallRecord) -> Result<CallRecordId, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO calls (caller_phone, transcript, intent, payment_plan, reply_text,
                                confidence, status, confirmation_response, retry_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.caller_id.as_str())
        .bind(&record.transcript)
        .bind(record.intent.as_str())
        .bind(&record.offered_plan)
        .bind(&record.reply_text)
        .bind(i64::from(record.confidence))
        .bind(record.status.as_str())
        .bind(record.confirmation_response.map(|answer| answer.as_str()))
        .bind(i64::from(record.retry_count))
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(CallRecordId(done.last_insert_rowid())),
            Err(error) if is_unique_violation(&error) => {
                Err(RepositoryError::DuplicatePending(record.caller_id))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn update(
        &self,
        id: CallRecordId,
        update: CallRecordUpdate,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE calls
             SET transcript = transcript || ? || ?,
                 intent = ?,
                 status = ?,
                 confirmation_response = ?,
                 confidence = ?,
                 retry_count = ?
             WHERE id = ? AND status = 'pending_clarification'",
        )
        .bind(TRANSCRIPT_SEPARATOR)
        .bind(&update.transcript_delta)
        .bind(update.intent.as_str())
        .bind(update.status.as_str())
        .bind(update.confirmation_response.map(|answer| answer.as_str()))
        .bind(i64::from(update.confidence))
        .bind(i64::from(update.retry_count))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM calls WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match status {
            None => Err(RepositoryError::NotFound(id)),
            Some(value) => {
                let status = value
                    .parse::<CallStatus>()
                    .map_err(|e| RepositoryError::Decode(format!("call {id}: {e}")))?;
                Err(RepositoryError::Conflict { id, status })
            }
        }
    }

    async fn find_pending_clarification(
        &self,
        caller_id: &CallerId,
    ) -> Result<Option<CallRecordId>, RepositoryError> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM calls
             WHERE caller_phone = ? AND status = 'pending_clarification'
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(caller_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(CallRecordId))
    }

    async fn find_by_id(&self, id: CallRecordId) -> Result<Option<CallRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_call(r)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<CallRecord>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> =
            sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC"))
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_call).collect::<Result<Vec<_>, _>>()
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<CallRecord>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> =
            sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT ?"))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_call).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use parley_core::domain::call::{
        CallIntent, CallRecordId, CallRecordUpdate, CallStatus, CallerId, ConfirmationAnswer,
        NewCallRecord,
    };

    use super::SqlCallRecordRepository;
    use crate::repositories::{CallRecordRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlCallRecordRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlCallRecordRepository::new(pool)
    }

    fn pending(caller: &str, transcript: &str) -> NewCallRecord {
        NewCallRecord {
            caller_id: CallerId::new(caller),
            transcript: transcript.to_string(),
            offered_plan: "$200/month for 5 months".to_string(),
            intent: CallIntent::Unclear,
            reply_text: "Customer asked for clarification - repeating offer".to_string(),
            confidence: 40,
            status: CallStatus::PendingClarification,
            confirmation_response: Some(ConfirmationAnswer::Unclear),
            retry_count: 1,
        }
    }

    fn confirm(delta: &str) -> CallRecordUpdate {
        CallRecordUpdate {
            transcript_delta: delta.to_string(),
            intent: CallIntent::WillingToPay,
            status: CallStatus::Confirmed,
            confirmation_response: Some(ConfirmationAnswer::Yes),
            confidence: 92,
            retry_count: 1,
        }
    }

    #[tokio::test]
    async fn insert_then_find_by_id() {
        let repo = setup().await;
        let id = repo.insert(pending("555-0100", "what?")).await.expect("insert");

        let record = repo.find_by_id(id).await.expect("find").expect("record exists");
        assert_eq!(record.id, id);
        assert_eq!(record.caller_id, CallerId::new("555-0100"));
        assert_eq!(record.status, CallStatus::PendingClarification);
        assert_eq!(record.confirmation_response, Some(ConfirmationAnswer::Unclear));
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.offered_plan, "$200/month for 5 months");
    }

    #[tokio::test]
    async fn update_appends_transcript_and_overwrites_judgment() {
        let repo = setup().await;
        let id = repo.insert(pending("555-0100", "what?")).await.expect("insert");

        repo.update(id, confirm("yes please")).await.expect("update");

        let record = repo.find_by_id(id).await.expect("find").expect("record exists");
        assert_eq!(record.transcript, "what? → yes please");
        assert_eq!(record.intent, CallIntent::WillingToPay);
        assert_eq!(record.status, CallStatus::Confirmed);
        assert_eq!(record.confirmation_response, Some(ConfirmationAnswer::Yes));
        assert_eq!(record.confidence, 92);
        assert_eq!(
            record.reply_text, "Customer asked for clarification - repeating offer",
            "reply text is owned by the inserting turn"
        );
    }

    #[tokio::test]
    async fn terminal_records_are_never_amended() {
        let repo = setup().await;
        let id = repo.insert(pending("555-0100", "what?")).await.expect("insert");
        repo.update(id, confirm("yes")).await.expect("first update");

        let error = repo.update(id, confirm("actually no")).await.expect_err("terminal");
        assert!(matches!(
            error,
            RepositoryError::Conflict { id: conflict_id, status: CallStatus::Confirmed }
                if conflict_id == id
        ));

        let record = repo.find_by_id(id).await.expect("find").expect("record exists");
        assert_eq!(record.transcript, "what? → yes");
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let repo = setup().await;
        let error = repo.update(CallRecordId(99), confirm("yes")).await.expect_err("missing");
        assert!(matches!(error, RepositoryError::NotFound(CallRecordId(99))));
    }

    #[tokio::test]
    async fn second_pending_record_for_caller_is_rejected() {
        let repo = setup().await;
        repo.insert(pending("555-0100", "what?")).await.expect("first insert");

        let error = repo.insert(pending("555-0100", "huh?")).await.expect_err("duplicate");
        assert!(matches!(error, RepositoryError::DuplicatePending(ref caller) if caller.as_str() == "555-0100"));

        repo.insert(pending("555-0199", "huh?")).await.expect("other caller is independent");
    }

    #[tokio::test]
    async fn find_pending_ignores_terminal_records_and_other_callers() {
        let repo = setup().await;
        let caller = CallerId::new("555-0100");
        let first = repo.insert(pending("555-0100", "what?")).await.expect("insert");
        repo.update(first, confirm("yes")).await.expect("finalize");

        assert_eq!(repo.find_pending_clarification(&caller).await.expect("find"), None);

        let second = repo.insert(pending("555-0100", "again?")).await.expect("insert");
        repo.insert(pending("555-0199", "other")).await.expect("insert other");

        assert_eq!(repo.find_pending_clarification(&caller).await.expect("find"), Some(second));
    }

    #[tokio::test]
    async fn listings_are_most_recent_first() {
        let repo = setup().await;
        let mut ids = Vec::new();
        for caller in ["555-0001", "555-0002", "555-0003"] {
            ids.push(repo.insert(pending(caller, "hello")).await.expect("insert"));
        }

        let all: Vec<_> = repo.list_all().await.expect("list").into_iter().map(|r| r.id).collect();
        ids.reverse();
        assert_eq!(all, ids);

        let recent: Vec<_> =
            repo.list_recent(2).await.expect("recent").into_iter().map(|r| r.id).collect();
        assert_eq!(recent, ids[..2].to_vec());
    }

    #[tokio::test]
    async fn unknown_stored_status_is_a_decode_error() {
        let repo = setup().await;
        let id = repo.insert(pending("555-0100", "what?")).await.expect("insert");
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(&repo.pool)
            .await
            .expect("disable checks");
        sqlx::query("UPDATE calls SET status = 'on_hold' WHERE id = ?")
            .bind(id.0)
            .execute(&repo.pool)
            .await
            .expect("corrupt row");

        let error = repo.find_by_id(id).await.expect_err("decode must fail");
        assert!(matches!(error, RepositoryError::Decode(_)));
    }
}
