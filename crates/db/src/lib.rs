pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{close, connect_with_settings, open, DbPool, OpenError};
pub use repositories::{
    CallRecordRepository, InMemoryCallRecordRepository, RepositoryError, SqlCallRecordRepository,
};
