//! Token-protected admin endpoints over captured leads.
use crate::app::AppState;
use crate::error::ApiFailure;
use crate::models::ContactRequest;
use crate::store::ContactListFilter;
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use constant_time_eq::constant_time_eq;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Holds only a digest of the configured token; comparisons are constant-time.
#[derive(Clone)]
pub struct AdminToken {
    digest: [u8; 32],
}

impl AdminToken {
    pub fn new(token: &str) -> Self {
        Self {
            digest: Sha256::digest(token.as_bytes()).into(),
        }
    }

    pub fn verify(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        constant_time_eq(&presented, &self.digest)
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken(..)")
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/contact-requests", get(list_requests))
        .route("/api/admin/contact-requests/:id", patch(update_request))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(token) = state.admin_token.as_ref() else {
        return ApiFailure::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Not found").into_response();
    };
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match presented {
        Some(p) if token.verify(p) => next.run(req).await,
        _ => {
            warn!("Rejected admin request with missing or invalid token");
            ApiFailure::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Invalid or missing token")
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    processed: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ContactRequest>>, ApiFailure> {
    let filter = ContactListFilter {
        processed: query.processed,
        limit: query.limit,
        offset: query.offset,
    };
    let rows = state.contacts.list(&filter).await.map_err(|e| {
        error!("Failed to list contact requests: {}", e);
        internal()
    })?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBody {
    is_processed: bool,
}

async fn update_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<ContactRequest>, ApiFailure> {
    let id = Uuid::parse_str(&id).map_err(|_| {
        ApiFailure::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", "Malformed request id")
    })?;
    let updated = state
        .contacts
        .set_processed(id, body.is_processed)
        .await
        .map_err(|e| {
            error!(request_id = %id, "Failed to update contact request: {}", e);
            internal()
        })?;
    match updated {
        Some(row) => {
            info!(request_id = %id, processed = row.is_processed, "Contact request updated");
            Ok(Json(row))
        }
        None => Err(ApiFailure::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Contact request not found",
        )),
    }
}

fn internal() -> ApiFailure {
    ApiFailure::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_configured_token() {
        let token = AdminToken::new("s3cret");
        assert!(token.verify("s3cret"));
        assert!(!token.verify("s3cret "));
        assert!(!token.verify(""));
    }

    #[test]
    fn debug_does_not_leak_digest() {
        assert_eq!(format!("{:?}", AdminToken::new("x")), "AdminToken(..)");
    }
}
