use crate::models::ContactRequest;
use crate::store::{ContactStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Short-window suppression of repeat submissions from one phone number. Only the phone
/// is compared; a resubmission with different text is still a duplicate.
#[derive(Clone)]
pub struct DuplicateDetector {
    store: Arc<dyn ContactStore>,
    window: Duration,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn ContactStore>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Lower bound (inclusive) of the window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    pub async fn find_recent_duplicate(
        &self,
        phone: &str,
    ) -> Result<Option<ContactRequest>, StoreError> {
        self.find_recent_duplicate_at(phone, Utc::now()).await
    }

    pub async fn find_recent_duplicate_at(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ContactRequest>, StoreError> {
        self.store
            .find_recent_by_phone(phone, self.window_start(now))
            .await
    }
}
