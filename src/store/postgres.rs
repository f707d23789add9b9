use super::{ContactListFilter, ContactStore, DressCatalog, InsertOutcome, StoreError};
use crate::models::{ContactRequest, DressSummary, NewContactRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const CONTACT_COLUMNS: &str = "\
    id, name, phone, email, message, dress_id, locale, \
    ip_address, user_agent, is_processed, created_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl ContactStore for PgStore {
    async fn find_recent_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<ContactRequest>, StoreError> {
        let query = format!(
            "SELECT {CONTACT_COLUMNS} FROM contact_requests \
             WHERE phone = $1 AND created_at >= $2 \
             ORDER BY created_at ASC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ContactRequest>(&query)
            .bind(phone)
            .bind(since)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_unless_recent(
        &self,
        new: NewContactRequest,
        since: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialises concurrent submissions for the same phone until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(&new.phone)
            .execute(&mut *tx)
            .await?;

        let query = format!(
            "SELECT {CONTACT_COLUMNS} FROM contact_requests \
             WHERE phone = $1 AND created_at >= $2 \
             ORDER BY created_at ASC LIMIT 1"
        );
        let existing = sqlx::query_as::<_, ContactRequest>(&query)
            .bind(&new.phone)
            .bind(since)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(existing) = existing {
            tx.rollback().await?;
            return Ok(InsertOutcome::Duplicate(existing));
        }

        let query = format!(
            "INSERT INTO contact_requests (\
                id, name, phone, email, message, dress_id, locale, \
                ip_address, user_agent, is_processed, created_at\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, $10) \
             RETURNING {CONTACT_COLUMNS}"
        );
        let created = sqlx::query_as::<_, ContactRequest>(&query)
            .bind(new.id)
            .bind(&new.name)
            .bind(&new.phone)
            .bind(new.email.as_deref())
            .bind(new.message.as_deref())
            .bind(new.dress_id.as_deref())
            .bind(new.locale.map(|l| l.as_str()))
            .bind(new.ip_address.as_deref())
            .bind(new.user_agent.as_deref())
            .bind(new.created_at)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(InsertOutcome::Created(created))
    }

    async fn list(&self, filter: &ContactListFilter) -> Result<Vec<ContactRequest>, StoreError> {
        let query = format!(
            "SELECT {CONTACT_COLUMNS} FROM contact_requests \
             WHERE ($1::BOOLEAN IS NULL OR is_processed = $1) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, ContactRequest>(&query)
            .bind(filter.processed)
            .bind(filter.limit())
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn set_processed(
        &self,
        id: Uuid,
        processed: bool,
    ) -> Result<Option<ContactRequest>, StoreError> {
        let query = format!(
            "UPDATE contact_requests SET is_processed = $2 WHERE id = $1 \
             RETURNING {CONTACT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ContactRequest>(&query)
            .bind(id)
            .bind(processed)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl DressCatalog for PgStore {
    async fn find_dress(&self, id: &str) -> Result<Option<DressSummary>, StoreError> {
        let row = sqlx::query_as::<_, DressSummary>("SELECT id, name FROM dresses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
