//! Fixed-window request counters keyed by identity (`ip:<addr>`, `phone:<number>`).
//!
//! The in-memory limiter is per-process. Deployments running several instances plug a
//! shared implementation in behind [`RateLimiter`].
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// End of the window the decision was made in.
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window closes, never less than one.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let secs = (self.reset_at - now).num_seconds();
        secs.max(1) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str, policy: RateLimitPolicy) -> RateLimitDecision;
}

pub fn ip_key(ip: &str) -> String {
    format!("ip:{ip}")
}

pub fn phone_key(phone: &str) -> String {
    format!("phone:{phone}")
}

#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn check_at(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.reset_at >= now);
        if records.len() != before {
            debug!("Evicted {} expired rate-limit entries", before - records.len());
        }

        let record = records
            .entry(key.to_string())
            .or_insert(RateLimitRecord {
                count: 0,
                reset_at: now + policy.window,
            });
        if now > record.reset_at {
            record.count = 0;
            record.reset_at = now + policy.window;
        }

        if record.count >= policy.max_requests {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: record.reset_at,
            };
        }
        record.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: policy.max_requests - record.count,
            reset_at: record.reset_at,
        }
    }

    pub async fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, key: &str, policy: RateLimitPolicy) -> RateLimitDecision {
        self.check_at(key, policy, Utc::now()).await
    }
}
