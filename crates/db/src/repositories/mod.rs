use async_trait::async_trait;
use thiserror::Error;

use parley_core::domain::call::{
    CallRecord, CallRecordId, CallRecordUpdate, CallStatus, CallerId, NewCallRecord,
};

pub mod call;
pub mod memory;

pub use call::SqlCallRecordRepository;
pub use memory::InMemoryCallRecordRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("call record {0} not found")]
    NotFound(CallRecordId),
    #[error("call record {id} is already {} and cannot be amended", status.as_str())]
    Conflict { id: CallRecordId, status: CallStatus },
    #[error("caller {0} already has a conversation pending clarification")]
    DuplicatePending(CallerId),
}

/// Durable log of conversations, one record per conversation.
#[async_trait]
pub trait CallRecordRepository: Send + Sync {
    async fn insert(&self, record: NewCallRecord) -> Result<CallRecordId, RepositoryError>;

    /// Amends a record that is still pending clarification. Terminal records are never touched.
    async fn update(
        &self,
        id: CallRecordId,
        update: CallRecordUpdate,
    ) -> Result<(), RepositoryError>;

    async fn find_pending_clarification(
        &self,
        caller_id: &CallerId,
    ) -> Result<Option<CallRecordId>, RepositoryError>;

    async fn find_by_id(&self, id: CallRecordId) -> Result<Option<CallRecord>, RepositoryError>;

    /// Every record, most recent first.
    async fn list_all(&self) -> Result<Vec<CallRecord>, RepositoryError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<CallRecord>, RepositoryError>;
}
