use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use parley_core::domain::call::{
    CallRecord, CallRecordId, CallRecordUpdate, CallStatus, CallerId, NewCallRecord,
};

use super::{CallRecordRepository, RepositoryError};

#[derive(Default)]
struct CallTable {
    last_id: i64,
    rows: BTreeMap<CallRecordId, CallRecord>,
}

/// Same contract as the SQL store, held in process memory.
#[derive(Default)]
pub struct InMemoryCallRecordRepository {
    table: RwLock<CallTable>,
}

fn most_recent_first(mut records: Vec<CallRecord>) -> Vec<CallRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    records
}

#[async_trait::async_trait]
impl CallRecordRepository for InMemoryCallRecordRepository {
    async fn insert(&self, record: NewCallRecord) -> Result<CallRecordId, RepositoryError> {
        let mut table = self.table.write().await;

        if record.status == CallStatus::PendingClarification {
            let duplicate = table.rows.values().any(|existing| {
                existing.caller_id == record.caller_id
                    && existing.status == CallStatus::PendingClarification
            });
            if duplicate {
                return Err(RepositoryError::DuplicatePending(record.caller_id));
            }
        }

        table.last_id += 1;
        let id = CallRecordId(table.last_id);
        table.rows.insert(id, record.into_record(id, Utc::now()));
        Ok(id)
    }

    async fn update(
        &self,
        id: CallRecordId,
        update: CallRecordUpdate,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write().await;
        let record = table.rows.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;

        if record.status.is_terminal() {
            return Err(RepositoryError::Conflict { id, status: record.status });
        }

        record.apply_update(&update);
        Ok(())
    }

    async fn find_pending_clarification(
        &self,
        caller_id: &CallerId,
    ) -> Result<Option<CallRecordId>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|record| {
                &record.caller_id == caller_id
                    && record.status == CallStatus::PendingClarification
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|record| record.id))
    }

    async fn find_by_id(&self, id: CallRecordId) -> Result<Option<CallRecord>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<CallRecord>, RepositoryError> {
        let table = self.table.read().await;
        Ok(most_recent_first(table.rows.values().cloned().collect()))
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<CallRecord>, RepositoryError> {
        let mut records = self.list_all().await?;
        records.truncate(limit as usize);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use parley_core::domain::call::{
        CallIntent, CallRecordId, CallRecordUpdate, CallStatus, CallerId, ConfirmationAnswer,
        NewCallRecord,
    };

    use crate::repositories::{CallRecordRepository, InMemoryCallRecordRepository, RepositoryError};

    fn record(caller: &str, status: CallStatus) -> NewCallRecord {
        NewCallRecord {
            caller_id: CallerId::new(caller),
            transcript: "I'm not sure".to_string(),
            offered_plan: "$200/month for 5 months".to_string(),
            intent: CallIntent::Unclear,
            reply_text: "Customer asked for clarification - repeating offer".to_string(),
            confidence: 35,
            status,
            confirmation_response: Some(ConfirmationAnswer::Unclear),
            retry_count: 1,
        }
    }

    fn decline() -> CallRecordUpdate {
        CallRecordUpdate {
            transcript_delta: "no thanks".to_string(),
            intent: CallIntent::NeedsNegotiation,
            status: CallStatus::NeedsNegotiation,
            confirmation_response: Some(ConfirmationAnswer::No),
            confidence: 88,
            retry_count: 1,
        }
    }

    #[tokio::test]
    async fn in_memory_repo_amends_pending_record_once() {
        let repo = InMemoryCallRecordRepository::default();
        let caller = CallerId::new("555-0100");
        let id = repo.insert(record("555-0100", CallStatus::PendingClarification)).await.expect("insert");

        assert_eq!(repo.find_pending_clarification(&caller).await.expect("find"), Some(id));

        repo.update(id, decline()).await.expect("update");
        let stored = repo.find_by_id(id).await.expect("find").expect("exists");
        assert_eq!(stored.transcript, "I'm not sure → no thanks");
        assert_eq!(stored.status, CallStatus::NeedsNegotiation);
        assert_eq!(repo.find_pending_clarification(&caller).await.expect("find"), None);

        let error = repo.update(id, decline()).await.expect_err("terminal");
        assert!(matches!(error, RepositoryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn in_memory_repo_enforces_single_pending_record() {
        let repo = InMemoryCallRecordRepository::default();
        repo.insert(record("555-0100", CallStatus::PendingClarification)).await.expect("insert");

        let error = repo
            .insert(record("555-0100", CallStatus::PendingClarification))
            .await
            .expect_err("duplicate pending");
        assert!(matches!(error, RepositoryError::DuplicatePending(_)));

        repo.insert(record("555-0100", CallStatus::Confirmed)).await.expect("terminal insert");
    }

    #[tokio::test]
    async fn in_memory_repo_reports_missing_records() {
        let repo = InMemoryCallRecordRepository::default();
        let error = repo.update(CallRecordId(7), decline()).await.expect_err("missing");
        assert!(matches!(error, RepositoryError::NotFound(CallRecordId(7))));
        assert_eq!(repo.find_by_id(CallRecordId(7)).await.expect("find"), None);
    }

    #[tokio::test]
    async fn in_memory_repo_lists_most_recent_first() {
        let repo = InMemoryCallRecordRepository::default();
        let first = repo.insert(record("555-0001", CallStatus::Confirmed)).await.expect("insert");
        let second = repo.insert(record("555-0002", CallStatus::Confirmed)).await.expect("insert");
        let third = repo.insert(record("555-0003", CallStatus::Confirmed)).await.expect("insert");

        let ids: Vec<_> = repo.list_all().await.expect("list").into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third, second, first]);

        let recent = repo.list_recent(1).await.expect("recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, third);
    }
}
