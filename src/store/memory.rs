use super::{ContactListFilter, ContactStore, DressCatalog, InsertOutcome, StoreError};
use crate::models::{ContactRequest, DressSummary, NewContactRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Process-local store used when no database is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    requests: Mutex<Vec<ContactRequest>>,
    dresses: HashMap<String, DressSummary>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dresses(dresses: impl IntoIterator<Item = DressSummary>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            dresses: dresses.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    /// Inserts a row as-is, bypassing the duplicate check.
    pub async fn seed(&self, record: ContactRequest) {
        self.requests.lock().await.push(record);
    }

    pub async fn all(&self) -> Vec<ContactRequest> {
        self.requests.lock().await.clone()
    }
}

fn first_recent<'a>(
    requests: &'a [ContactRequest],
    phone: &str,
    since: DateTime<Utc>,
) -> Option<&'a ContactRequest> {
    requests
        .iter()
        .filter(|r| r.phone == phone && r.created_at >= since)
        .min_by_key(|r| r.created_at)
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn find_recent_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<ContactRequest>, StoreError> {
        let requests = self.requests.lock().await;
        Ok(first_recent(&requests, phone, since).cloned())
    }

    async fn insert_unless_recent(
        &self,
        new: NewContactRequest,
        since: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError> {
        let mut requests = self.requests.lock().await;
        if let Some(existing) = first_recent(&requests, &new.phone, since) {
            return Ok(InsertOutcome::Duplicate(existing.clone()));
        }
        let record = new.into_record();
        requests.push(record.clone());
        Ok(InsertOutcome::Created(record))
    }

    async fn list(&self, filter: &ContactListFilter) -> Result<Vec<ContactRequest>, StoreError> {
        let requests = self.requests.lock().await;
        let mut rows: Vec<ContactRequest> = requests
            .iter()
            .filter(|r| filter.processed.map_or(true, |p| r.is_processed == p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn set_processed(
        &self,
        id: Uuid,
        processed: bool,
    ) -> Result<Option<ContactRequest>, StoreError> {
        let mut requests = self.requests.lock().await;
        Ok(requests.iter_mut().find(|r| r.id == id).map(|r| {
            r.is_processed = processed;
            r.clone()
        }))
    }
}

#[async_trait]
impl DressCatalog for MemoryStore {
    async fn find_dress(&self, id: &str) -> Result<Option<DressSummary>, StoreError> {
        Ok(self.dresses.get(id).cloned())
    }
}
