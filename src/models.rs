use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A captured lead, as stored in `contact_requests`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub message: Option<String>,
    pub dress_id: Option<String>,
    pub locale: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
}

/// Row about to be inserted. `id` and `created_at` are fixed by the caller so the
/// duplicate window and the stored timestamp agree.
#[derive(Debug, Clone)]
pub struct NewContactRequest {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub message: Option<String>,
    pub dress_id: Option<String>,
    pub locale: Option<Locale>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewContactRequest {
    pub fn into_record(self) -> ContactRequest {
        ContactRequest {
            id: self.id,
            name: self.name,
            phone: self.phone,
            email: self.email,
            message: self.message,
            dress_id: self.dress_id,
            locale: self.locale.map(|l| l.as_str().to_string()),
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            is_processed: false,
            created_at: self.created_at,
        }
    }
}

/// The only part of a catalog dress the intake path needs.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DressSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Uk,
}

impl Locale {
    /// Unknown locales are dropped rather than rejected: the field is informational.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Locale::En),
            "uk" | "ua" => Some(Locale::Uk),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Uk => "uk",
        }
    }
}
