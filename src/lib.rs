pub mod admin;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod duplicate;
pub mod error;
pub mod intake;
pub mod models;
pub mod rate_limit;
pub mod store;
pub mod telegram;
pub mod validate;
