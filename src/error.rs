//! JSON failure envelope shared by the public and admin endpoints:
//! `{ "success": false, "error": { "message", "code", "details"? } }`.
use crate::intake::IntakeError;
use crate::models::Locale;
use crate::validate::FieldIssues;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<FieldIssues>,
    pub retry_after_secs: Option<u64>,
}

impl ApiFailure {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    pub fn from_intake(err: IntakeError, locale: Locale) -> Self {
        let code = err.code();
        let message = user_message(code, locale).to_string();
        match err {
            IntakeError::Validation(issues) => Self {
                details: Some(issues),
                ..Self::new(StatusCode::BAD_REQUEST, code, message)
            },
            IntakeError::RateLimited {
                retry_after_secs, ..
            } => Self {
                retry_after_secs,
                ..Self::new(StatusCode::TOO_MANY_REQUESTS, code, message)
            },
            IntakeError::Duplicate => Self::new(StatusCode::TOO_MANY_REQUESTS, code, message),
            IntakeError::Submit(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message),
        }
    }

    /// A body the server could not read at all; reported as a validation failure.
    pub fn unreadable(status: StatusCode, locale: Locale) -> Self {
        Self::new(
            status,
            "VALIDATION_ERROR",
            user_message("VALIDATION_ERROR", locale),
        )
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let mut error = json!({
            "message": self.message,
            "code": self.code,
        });
        if let Some(details) = self.details {
            error["details"] = json!(details);
        }
        let body = json!({ "success": false, "error": error });

        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Text shown to the visitor. Throttling and duplicates get distinct guidance so the form
/// can tell "wait" apart from "we already have your request".
pub fn user_message(code: &str, locale: Locale) -> &'static str {
    match (code, locale) {
        ("VALIDATION_ERROR", Locale::En) => "Please check the highlighted fields and try again.",
        ("VALIDATION_ERROR", Locale::Uk) => "Перевірте виділені поля та спробуйте ще раз.",
        ("RATE_LIMIT_EXCEEDED", Locale::En) => "Too many requests. Please try again later.",
        ("RATE_LIMIT_EXCEEDED", Locale::Uk) => "Забагато запитів. Спробуйте пізніше.",
        ("DUPLICATE_REQUEST", Locale::En) => {
            "You have already sent a request recently. We will contact you soon."
        }
        ("DUPLICATE_REQUEST", Locale::Uk) => {
            "Ви вже надіслали заявку нещодавно. Ми зв'яжемося з вами найближчим часом."
        }
        (_, Locale::En) => "Something went wrong. Please try again.",
        (_, Locale::Uk) => "Щось пішло не так. Спробуйте ще раз.",
    }
}
