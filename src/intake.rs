//! Contact-request intake: validation, throttling, duplicate suppression, persistence and
//! notification hand-off, in that order. Every rejection happens before anything is written.
use crate::dispatch::NotificationQueue;
use crate::duplicate::DuplicateDetector;
use crate::models::{DressSummary, NewContactRequest};
use crate::rate_limit::{ip_key, phone_key, RateLimitPolicy, RateLimiter};
use crate::store::{ContactStore, DressCatalog, InsertOutcome, StoreError};
use crate::telegram::ContactNotice;
use crate::validate::{validate, ContactInput, FieldIssues, FormProfile, ValidContact};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakePolicies {
    pub ip: RateLimitPolicy,
    pub phone: RateLimitPolicy,
    pub duplicate_window: Duration,
}

impl Default for IntakePolicies {
    fn default() -> Self {
        Self {
            ip: RateLimitPolicy::new(5, Duration::hours(1)),
            phone: RateLimitPolicy::new(3, Duration::hours(1)),
            duplicate_window: Duration::minutes(5),
        }
    }
}

/// Where a submission came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeSource {
    /// Server-side form action. No client address is available, so only the phone axis applies.
    Action,
    /// Public HTTP endpoint. Honeypot and the per-IP axis apply.
    Api {
        ip: String,
        user_agent: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { id: Uuid },
    /// Honeypot hit: reported as success, nothing stored or sent.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitAxis {
    Ip,
    Phone,
}

impl fmt::Display for LimitAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitAxis::Ip => f.write_str("ip"),
            LimitAxis::Phone => f.write_str("phone"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("contact request failed validation")]
    Validation(FieldIssues),

    #[error("rate limit exceeded on the {axis} axis")]
    RateLimited {
        axis: LimitAxis,
        /// Set for the per-IP axis only.
        retry_after_secs: Option<u64>,
    },

    #[error("a request from this phone number was submitted recently")]
    Duplicate,

    #[error("failed to store contact request: {0}")]
    Submit(#[from] StoreError),
}

impl IntakeError {
    pub fn code(&self) -> &'static str {
        match self {
            IntakeError::Validation(_) => "VALIDATION_ERROR",
            IntakeError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            IntakeError::Duplicate => "DUPLICATE_REQUEST",
            IntakeError::Submit(_) => "SUBMIT_ERROR",
        }
    }
}

pub struct IntakeService {
    limiter: Arc<dyn RateLimiter>,
    store: Arc<dyn ContactStore>,
    dresses: Arc<dyn DressCatalog>,
    duplicates: DuplicateDetector,
    notifications: NotificationQueue,
    policies: IntakePolicies,
}

impl IntakeService {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        store: Arc<dyn ContactStore>,
        dresses: Arc<dyn DressCatalog>,
        notifications: NotificationQueue,
        policies: IntakePolicies,
    ) -> Self {
        let duplicates = DuplicateDetector::new(store.clone(), policies.duplicate_window);
        Self {
            limiter,
            store,
            dresses,
            duplicates,
            notifications,
            policies,
        }
    }

    pub fn policies(&self) -> &IntakePolicies {
        &self.policies
    }

    pub async fn submit(
        &self,
        input: &ContactInput,
        profile: FormProfile,
        source: IntakeSource,
    ) -> Result<SubmitOutcome, IntakeError> {
        if let IntakeSource::Api { ip, .. } = &source {
            if input.honeypot_filled() {
                warn!(ip = %ip, "Honeypot field filled; discarding submission as bot traffic");
                return Ok(SubmitOutcome::Ignored);
            }
        }

        let contact = validate(input, profile).map_err(IntakeError::Validation)?;
        let phone_tag = phone_fingerprint(&contact.phone);

        if let IntakeSource::Api { ip, .. } = &source {
            let now = Utc::now();
            let decision = self.limiter.check(&ip_key(ip), self.policies.ip).await;
            if !decision.allowed {
                warn!(ip = %ip, "Contact rate limit exceeded for IP");
                return Err(IntakeError::RateLimited {
                    axis: LimitAxis::Ip,
                    retry_after_secs: Some(decision.retry_after_secs(now)),
                });
            }
        }

        let decision = self
            .limiter
            .check(&phone_key(&contact.phone), self.policies.phone)
            .await;
        if !decision.allowed {
            warn!(phone = %phone_tag, "Contact rate limit exceeded for phone");
            return Err(IntakeError::RateLimited {
                axis: LimitAxis::Phone,
                retry_after_secs: None,
            });
        }

        let now = Utc::now();
        let existing = self
            .duplicates
            .find_recent_duplicate_at(&contact.phone, now)
            .await
            .map_err(|e| {
                error!("Duplicate lookup failed: {}", e);
                IntakeError::Submit(e)
            })?;
        if let Some(existing) = existing {
            info!(
                phone = %phone_tag,
                existing_id = %existing.id,
                "Rejecting duplicate contact request"
            );
            return Err(IntakeError::Duplicate);
        }

        let dress = self.resolve_dress(contact.dress_id.as_deref()).await;
        let new = build_request(&contact, dress.as_ref(), &source, now);
        let id = new.id;

        let created = match self
            .store
            .insert_unless_recent(new, self.duplicates.window_start(now))
            .await
        {
            Ok(InsertOutcome::Created(created)) => created,
            Ok(InsertOutcome::Duplicate(existing)) => {
                info!(
                    phone = %phone_tag,
                    existing_id = %existing.id,
                    "Concurrent duplicate detected at insert"
                );
                return Err(IntakeError::Duplicate);
            }
            Err(e) => {
                error!(request_id = %id, "Failed to store contact request: {}", e);
                return Err(IntakeError::Submit(e));
            }
        };
        info!(request_id = %created.id, "Contact request captured");

        self.notifications.enqueue(ContactNotice {
            request_id: created.id,
            name: created.name,
            phone: created.phone,
            email: created.email,
            dress_name: dress.map(|d| d.name),
            message: created.message,
            locale: created.locale,
        });

        Ok(SubmitOutcome::Accepted { id: created.id })
    }

    /// The dress only enriches the notification, so lookup problems are logged and ignored.
    async fn resolve_dress(&self, dress_id: Option<&str>) -> Option<DressSummary> {
        let dress_id = dress_id?;
        match self.dresses.find_dress(dress_id).await {
            Ok(Some(dress)) => Some(dress),
            Ok(None) => {
                debug!(dress_id = %dress_id, "Referenced dress not found; continuing without it");
                None
            }
            Err(e) => {
                warn!(dress_id = %dress_id, "Dress lookup failed; continuing without it: {}", e);
                None
            }
        }
    }
}

fn build_request(
    contact: &ValidContact,
    dress: Option<&DressSummary>,
    source: &IntakeSource,
    now: chrono::DateTime<Utc>,
) -> NewContactRequest {
    let (ip_address, user_agent) = match source {
        IntakeSource::Action => (None, None),
        IntakeSource::Api { ip, user_agent } => (Some(ip.clone()), user_agent.clone()),
    };
    NewContactRequest {
        id: Uuid::new_v4(),
        name: contact.name.clone(),
        phone: contact.phone.clone(),
        email: contact.email.clone(),
        message: contact.message.clone(),
        // Only a resolved dress is referenced, keeping the foreign key valid.
        dress_id: dress.map(|d| d.id.clone()),
        locale: contact.locale,
        ip_address,
        user_agent,
        created_at: now,
    }
}

/// Short, stable tag for a phone number so logs can correlate submissions without
/// recording the number itself.
pub fn phone_fingerprint(phone: &str) -> String {
    let digest = Sha256::digest(phone.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContactRequest;
    use crate::rate_limit::MemoryRateLimiter;
    use crate::store::{ContactListFilter, MemoryStore};
    use crate::telegram::Notifier;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingNotifier {
        calls: Mutex<Vec<ContactNotice>>,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, notice: &ContactNotice) -> bool {
            self.calls.lock().unwrap().push(notice.clone());
            true
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ContactStore for BrokenStore {
        async fn find_recent_by_phone(
            &self,
            _phone: &str,
            _since: chrono::DateTime<Utc>,
        ) -> Result<Option<ContactRequest>, StoreError> {
            Ok(None)
        }

        async fn insert_unless_recent(
            &self,
            _new: NewContactRequest,
            _since: chrono::DateTime<Utc>,
        ) -> Result<InsertOutcome, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn list(
            &self,
            _filter: &ContactListFilter,
        ) -> Result<Vec<ContactRequest>, StoreError> {
            Ok(Vec::new())
        }

        async fn set_processed(
            &self,
            _id: Uuid,
            _processed: bool,
        ) -> Result<Option<ContactRequest>, StoreError> {
            Ok(None)
        }
    }

    struct Harness {
        service: IntakeService,
        store: Arc<MemoryStore>,
        limiter: Arc<MemoryRateLimiter>,
        notifier: Arc<CountingNotifier>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::with_dresses([DressSummary {
            id: "dress-1".to_string(),
            name: "Aurora".to_string(),
        }]));
        let limiter = Arc::new(MemoryRateLimiter::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (queue, _worker) = NotificationQueue::spawn(notifier.clone(), 16);
        let service = IntakeService::new(
            limiter.clone(),
            store.clone(),
            store.clone(),
            queue,
            IntakePolicies::default(),
        );
        Harness {
            service,
            store,
            limiter,
            notifier,
        }
    }

    fn input(name: &str, phone: &str) -> ContactInput {
        ContactInput {
            name: Some(name.to_string()),
            phone: Some(phone.to_string()),
            ..Default::default()
        }
    }

    fn api(ip: &str) -> IntakeSource {
        IntakeSource::Api {
            ip: ip.to_string(),
            user_agent: Some("test-agent".to_string()),
        }
    }

    async fn wait_for_notifications(notifier: &CountingNotifier, expected: usize) {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while notifier.calls.lock().unwrap().len() < expected {
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {} notifications", expected);
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn accepts_and_stores_from_api() {
        let h = harness();
        let outcome = h
            .service
            .submit(&input("Jane Doe", "+15551234567"), FormProfile::Contact, api("1.1.1.1"))
            .await
            .unwrap();
        let SubmitOutcome::Accepted { id } = outcome else {
            panic!("expected acceptance");
        };
        let rows = h.store.all().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].ip_address.as_deref(), Some("1.1.1.1"));
        assert_eq!(rows[0].user_agent.as_deref(), Some("test-agent"));
        wait_for_notifications(&h.notifier, 1).await;
    }

    #[tokio::test]
    async fn honeypot_is_silent_on_api_only() {
        let h = harness();
        let mut data = input("Bot", "+15551234567");
        data.website = Some("http://spam".to_string());
        let outcome = h
            .service
            .submit(&data, FormProfile::Contact, api("6.6.6.6"))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Ignored);
        assert!(h.store.all().await.is_empty());
        assert!(h.limiter.record("ip:6.6.6.6").await.is_none());

        // The server action has no honeypot field; the value is simply ignored.
        let outcome = h
            .service
            .submit(&data, FormProfile::Contact, IntakeSource::Action)
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn validation_failure_touches_nothing() {
        let h = harness();
        let err = h
            .service
            .submit(&input("Jane", "abc"), FormProfile::Contact, api("1.1.1.1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(h.limiter.len().await, 0);
        assert!(h.store.all().await.is_empty());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(h.notifier.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn phone_axis_limits_after_three() {
        let h = harness();
        let service = IntakeService::new(
            h.limiter.clone(),
            h.store.clone(),
            h.store.clone(),
            NotificationQueue::spawn(h.notifier.clone(), 16).0,
            IntakePolicies {
                duplicate_window: Duration::milliseconds(1),
                ..IntakePolicies::default()
            },
        );
        for i in 0..3 {
            let source = api(&format!("10.0.0.{i}"));
            service
                .submit(&input("Jane", "+15551234567"), FormProfile::Contact, source)
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let err = service
            .submit(&input("Jane", "+15551234567"), FormProfile::Contact, api("10.0.0.9"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IntakeError::RateLimited {
                axis: LimitAxis::Phone,
                retry_after_secs: None
            }
        ));
    }

    #[tokio::test]
    async fn ip_axis_reports_retry_after() {
        let h = harness();
        for i in 0..5 {
            h.service
                .submit(
                    &input("Jane", &format!("+1555123456{i}")),
                    FormProfile::Contact,
                    api("2.2.2.2"),
                )
                .await
                .unwrap();
        }
        let err = h
            .service
            .submit(&input("Jane", "+15559999999"), FormProfile::Contact, api("2.2.2.2"))
            .await
            .unwrap_err();
        match err {
            IntakeError::RateLimited {
                axis: LimitAxis::Ip,
                retry_after_secs: Some(secs),
            } => assert!(secs > 3500 && secs <= 3600),
            other => panic!("unexpected {other:?}"),
        }
        // The rejected phone never reached its own counter.
        assert!(h.limiter.record("phone:+15559999999").await.is_none());
    }

    #[tokio::test]
    async fn action_source_skips_ip_axis() {
        let h = harness();
        for i in 0..7 {
            h.service
                .submit(
                    &input("Jane", &format!("+1555123450{i}")),
                    FormProfile::Contact,
                    IntakeSource::Action,
                )
                .await
                .unwrap();
        }
        assert_eq!(h.store.all().await.len(), 7);
        assert!(h.store.all().await.iter().all(|r| r.ip_address.is_none()));
    }

    #[tokio::test]
    async fn duplicate_phone_is_rejected() {
        let h = harness();
        h.service
            .submit(&input("Jane", "+15551234567"), FormProfile::Contact, api("1.1.1.1"))
            .await
            .unwrap();
        let err = h
            .service
            .submit(&input("Janet", "+15551234567"), FormProfile::Contact, api("3.3.3.3"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_REQUEST");
        assert_eq!(h.store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_dress_is_tolerated() {
        let h = harness();
        let mut data = input("Jane", "+15551234567");
        data.dress_id = Some("missing".to_string());
        h.service
            .submit(&data, FormProfile::Booking, IntakeSource::Action)
            .await
            .unwrap();
        wait_for_notifications(&h.notifier, 1).await;
        assert!(h.notifier.calls.lock().unwrap()[0].dress_name.is_none());
        assert!(h.store.all().await[0].dress_id.is_none());
    }

    #[tokio::test]
    async fn known_dress_enriches_notification() {
        let h = harness();
        let mut data = input("Jane", "+15551234567");
        data.dress_id = Some("dress-1".to_string());
        h.service
            .submit(&data, FormProfile::Booking, IntakeSource::Action)
            .await
            .unwrap();
        wait_for_notifications(&h.notifier, 1).await;
        assert_eq!(
            h.notifier.calls.lock().unwrap()[0].dress_name.as_deref(),
            Some("Aurora")
        );
        assert_eq!(h.store.all().await[0].dress_id.as_deref(), Some("dress-1"));
    }

    #[tokio::test]
    async fn storage_failure_is_a_submit_error() {
        let store = Arc::new(BrokenStore);
        let notifier = Arc::new(CountingNotifier::default());
        let (queue, _worker) = NotificationQueue::spawn(notifier.clone(), 4);
        let service = IntakeService::new(
            Arc::new(MemoryRateLimiter::new()),
            store,
            Arc::new(MemoryStore::new()),
            queue,
            IntakePolicies::default(),
        );
        let err = service
            .submit(&input("Jane", "+15551234567"), FormProfile::Contact, IntakeSource::Action)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SUBMIT_ERROR");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(notifier.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = phone_fingerprint("+15551234567");
        assert_eq!(a.len(), 12);
        assert_eq!(a, phone_fingerprint("+15551234567"));
        assert_ne!(a, phone_fingerprint("+15551234568"));
    }
}
