use crate::admin::{self, AdminToken};
use crate::config::Config;
use crate::dispatch::NotificationQueue;
use crate::error::ApiFailure;
use crate::intake::{IntakeService, IntakeSource, SubmitOutcome};
use crate::models::Locale;
use crate::rate_limit::MemoryRateLimiter;
use crate::store::{ContactStore, DressCatalog, MemoryStore, PgStore};
use crate::telegram::TelegramNotifier;
use crate::validate::{ContactInput, FormProfile};
use anyhow::{Context, Result};
use axum::{
    extract::{FromRequest, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::TypedHeader;
use headers::UserAgent;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
const MAX_USER_AGENT_CHARS: usize = 512;
const WORKER_DRAIN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<IntakeService>,
    pub contacts: Arc<dyn ContactStore>,
    pub admin_token: Option<AdminToken>,
}

impl AppState {
    pub fn new(
        intake: IntakeService,
        contacts: Arc<dyn ContactStore>,
        admin_token: Option<&str>,
    ) -> Self {
        Self {
            intake: Arc::new(intake),
            contacts,
            admin_token: admin_token.map(AdminToken::new),
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let (contacts, dresses): (Arc<dyn ContactStore>, Arc<dyn DressCatalog>) =
        match config.database_url.as_deref() {
            Some(url) => {
                let store = PgStore::connect(url, config.database_max_connections)
                    .await
                    .context("Failed to connect to the database")?;
                store.migrate().await.context("Failed to run migrations")?;
                info!("Using Postgres contact store");
                let store = Arc::new(store);
                (store.clone() as Arc<dyn ContactStore>, store as Arc<dyn DressCatalog>)
            }
            None => {
                warn!("DATABASE_URL not set; contact requests are kept in memory only");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn ContactStore>, store as Arc<dyn DressCatalog>)
            }
        };

    let notifier = TelegramNotifier::new(
        config.telegram_bot_token.clone(),
        config.telegram_chat_id.clone(),
    )?;
    if !notifier.is_configured() {
        warn!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set; lead notifications are disabled");
    }
    let (notifications, worker) =
        NotificationQueue::spawn(Arc::new(notifier), config.notify_queue_capacity);

    let intake = IntakeService::new(
        Arc::new(MemoryRateLimiter::new()),
        contacts.clone(),
        dresses,
        notifications,
        config.policies,
    );
    if config.admin_api_token.is_none() {
        info!("ADMIN_API_TOKEN not set; admin routes are disabled");
    }
    let state = AppState::new(intake, contacts, config.admin_api_token.as_deref());
    let app = build_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last queue handle; the worker now drains what is left.
    match tokio::time::timeout(WORKER_DRAIN_GRACE, worker).await {
        Ok(_) => info!("Notification worker drained"),
        Err(_) => warn!("Notification worker did not drain in time; pending notices dropped"),
    }
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/api/contact", post(submit_contact))
        .route("/api/fitting", post(submit_fitting))
        .route("/health", get(health));
    if state.admin_token.is_some() {
        router = router.merge(admin::routes(state.clone()));
    }
    router
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn submit_contact(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    request: Request,
) -> Response {
    handle_submission(&state, FormProfile::Contact, user_agent, request).await
}

async fn submit_fitting(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    request: Request,
) -> Response {
    handle_submission(&state, FormProfile::Booking, user_agent, request).await
}

async fn handle_submission(
    state: &AppState,
    profile: FormProfile,
    user_agent: Option<TypedHeader<UserAgent>>,
    request: Request,
) -> Response {
    let ip = extract_ip(request.headers());
    let input = match read_input(request).await {
        Ok(input) => input,
        Err(failure) => return failure.into_response(),
    };
    let locale = input.locale().unwrap_or_default();
    let source = IntakeSource::Api {
        ip,
        user_agent: user_agent
            .map(|TypedHeader(ua)| truncate_chars(ua.as_str(), MAX_USER_AGENT_CHARS)),
    };

    match state.intake.submit(&input, profile, source).await {
        Ok(SubmitOutcome::Accepted { id }) => {
            (StatusCode::OK, Json(json!({ "success": true, "id": id }))).into_response()
        }
        Ok(SubmitOutcome::Ignored) => {
            (StatusCode::OK, Json(json!({ "success": true }))).into_response()
        }
        Err(err) => ApiFailure::from_intake(err, locale).into_response(),
    }
}

/// Decodes a JSON or urlencoded body. Anything else is a 415.
async fn read_input(request: Request) -> Result<ContactInput, ApiFailure> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        Json::<ContactInput>::from_request(request, &())
            .await
            .map(|Json(input)| input)
            .map_err(|rejection| {
                warn!("Rejecting contact submission: unreadable JSON body: {}", rejection);
                ApiFailure::unreadable(body_status(rejection.status()), Locale::En)
            })
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        Form::<ContactInput>::from_request(request, &())
            .await
            .map(|Form(input)| input)
            .map_err(|rejection| {
                warn!("Rejecting contact submission: unreadable form body: {}", rejection);
                ApiFailure::unreadable(body_status(rejection.status()), Locale::En)
            })
    } else {
        warn!(
            "Rejecting contact submission: unsupported content-type {:?}",
            content_type
        );
        Err(ApiFailure::unreadable(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Locale::En,
        ))
    }
}

/// Oversized bodies keep their 413; every other decode failure is reported as 400.
fn body_status(rejection: StatusCode) -> StatusCode {
    if rejection == StatusCode::PAYLOAD_TOO_LARGE {
        rejection
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// Client address as reported by the fronting proxy: first `x-forwarded-for` hop, then
/// `x-real-ip`, else `"unknown"`. A blank or non-ASCII header falls through to the next one.
pub fn extract_ip(headers: &HeaderMap) -> String {
    ["x-forwarded-for", "x-real-ip"]
        .into_iter()
        .find_map(|name| {
            let raw = headers.get(name)?.to_str().ok()?;
            let first = raw.split(',').next().unwrap_or(raw).trim();
            (!first.is_empty()).then(|| first.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
