use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;

use crate::domain::tenant::{ErrorKind, TenantError};

/// Envelope shared by every tenant API response.
#[derive(Debug, Serialize)]
pub struct ResponseFormat<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    pub data: Option<T>,
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> HttpResponse {
    HttpResponse::Ok().json(ResponseFormat {
        status: "success",
        message: message.into(),
        data: Some(data),
    })
}

pub fn error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ResponseFormat::<()> {
        status: "error",
        message: message.into(),
        data: None,
    })
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a lifecycle error to a response. Server-side failures are logged in
/// full but only reported as a generic message.
pub fn render_error(err: &TenantError) -> HttpResponse {
    let status = status_for(err.kind());
    if status.is_server_error() {
        tracing::error!(error = %err, kind = ?err.kind(), "API error");
        error(status, "Internal Server Error")
    } else {
        tracing::warn!(error = %err, kind = ?err.kind(), "API error");
        error(status, err.to_string())
    }
}
