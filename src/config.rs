use crate::intake::IntakePolicies;
use crate::rate_limit::RateLimitPolicy;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3146";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub admin_api_token: Option<String>,
    pub policies: IntakePolicies,
    pub notify_queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("BIND_ADDR is not a socket address: {}", bind_addr))?;

        let ip = RateLimitPolicy::new(
            parse_positive(&get, "CONTACT_IP_LIMIT", 5)?,
            window(&get, "CONTACT_IP_WINDOW_SECS", 3600)?,
        );
        let phone = RateLimitPolicy::new(
            parse_positive(&get, "CONTACT_PHONE_LIMIT", 3)?,
            window(&get, "CONTACT_PHONE_WINDOW_SECS", 3600)?,
        );
        let duplicate_window = window(&get, "CONTACT_DUPLICATE_WINDOW_SECS", 300)?;

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_positive(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
            admin_api_token: get("ADMIN_API_TOKEN"),
            policies: IntakePolicies {
                ip,
                phone,
                duplicate_window,
            },
            notify_queue_capacity: parse_positive(&get, "NOTIFY_QUEUE_CAPACITY", 256)?,
        })
    }
}

fn window(get: &impl Fn(&str) -> Option<String>, key: &str, default: i64) -> Result<Duration> {
    let secs = parse_positive(get, key, default)?;
    Duration::try_seconds(secs).ok_or_else(|| anyhow!("{} is out of range", key))
}

fn parse_positive<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + PartialOrd + Default + Copy,
    T::Err: std::fmt::Display,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow!("{} has an invalid value '{}': {}", key, raw, e))?;
    if value <= T::default() {
        bail!("{} must be greater than zero", key);
    }
    Ok(value)
}
