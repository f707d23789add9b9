//! Persistence seams for the intake path.
//!
//! [`ContactStore`] owns `contact_requests`; [`DressCatalog`] is the read-only view of the
//! catalog the CMS maintains. Both have an in-memory and a Postgres implementation.
use crate::models::{ContactRequest, DressSummary, NewContactRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result of an atomic check-and-insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Created(ContactRequest),
    /// A request with the same phone already exists inside the window; nothing was written.
    Duplicate(ContactRequest),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactListFilter {
    pub processed: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ContactListFilter {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Oldest-first match on `phone` with `created_at >= since`.
    async fn find_recent_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<ContactRequest>, StoreError>;

    /// Inserts `new` unless a request with the same phone was created at or after `since`.
    /// The check and the insert are one atomic step.
    async fn insert_unless_recent(
        &self,
        new: NewContactRequest,
        since: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError>;

    /// Newest first.
    async fn list(&self, filter: &ContactListFilter) -> Result<Vec<ContactRequest>, StoreError>;

    async fn set_processed(
        &self,
        id: Uuid,
        processed: bool,
    ) -> Result<Option<ContactRequest>, StoreError>;
}

#[async_trait]
pub trait DressCatalog: Send + Sync {
    async fn find_dress(&self, id: &str) -> Result<Option<DressSummary>, StoreError>;
}
