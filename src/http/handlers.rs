use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::health::{ComponentHealth, HealthStatus, SystemHealth};

use super::response::{error, ok, render_error};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessPayloadRequest {
    #[serde(default)]
    pub payload: serde_json::Value,
}

pub async fn create_tenant(state: web::Data<AppState>, body: web::Json<CreateTenantRequest>) -> HttpResponse {
    let request = body.into_inner();
    if request.name.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "name is required");
    }

    match state.lifecycle.create_tenant(&request.name).await {
        Ok(tenant) => ok(
            "Tenant created successfully",
            serde_json::json!({ "tenant": tenant }),
        ),
        Err(e) => render_error(&e),
    }
}

pub async fn get_tenant(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let client_id = path.into_inner();

    match state.lifecycle.get_tenant(&client_id).await {
        Ok(tenant) => ok("OK", serde_json::json!({ "tenant": tenant })),
        Err(e) => render_error(&e),
    }
}

pub async fn delete_tenant(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let client_id = path.into_inner();

    match state.lifecycle.delete_tenant(&client_id).await {
        Ok(()) => ok("Tenant deleted successfully", serde_json::json!({})),
        Err(e) => render_error(&e),
    }
}

pub async fn process_payload(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ProcessPayloadRequest>,
) -> HttpResponse {
    let client_id = path.into_inner();
    let request = body.into_inner();
    if request.payload.is_null() {
        return error(StatusCode::BAD_REQUEST, "payload is required");
    }

    match state.lifecycle.process_payload(&client_id, &request.payload).await {
        Ok(()) => ok("Payload processed successfully", serde_json::json!({})),
        Err(e) => render_error(&e),
    }
}

pub async fn ping() -> impl Responder {
    HttpResponse::Ok().body("pong")
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let database = match state.repo.ping().await {
        Ok(()) => ComponentHealth::new("database", HealthStatus::Healthy),
        Err(e) => ComponentHealth::new("database", HealthStatus::Unhealthy(e.to_string())),
    };

    let report = SystemHealth::from_components(vec![state.broker.check_health(), database]);
    if report.healthy {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}

pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    match state.metrics.encode() {
        Ok(buffer) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}
