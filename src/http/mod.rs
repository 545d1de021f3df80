// ============================================================================
// HTTP API
// ============================================================================
//
// Tenant routes are served both bare and under /v1:
//   POST   /tenants                      create
//   GET    /tenants/{client_id}          lookup
//   DELETE /tenants/{client_id}          delete
//   POST   /tenants/{client_id}/process  publish payload
// plus /ping, /health and /metrics.
//
// ============================================================================

mod handlers;
mod response;

use actix_web::http::StatusCode;
use actix_web::{error, middleware, web, App, HttpServer};
use std::sync::Arc;

use crate::db::TenantRepository;
use crate::domain::tenant::TenantLifecycle;
use crate::health::HealthCheckable;
use crate::metrics::Metrics;

pub struct AppState {
    pub lifecycle: Arc<TenantLifecycle>,
    pub repo: Arc<dyn TenantRepository>,
    pub broker: Arc<dyn HealthCheckable + Send + Sync>,
    pub metrics: Arc<Metrics>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/ping", web::get().to(handlers::ping))
        .route("/health", web::get().to(handlers::health))
        .route("/metrics", web::get().to(handlers::metrics))
        .service(web::scope("/v1").configure(tenant_routes))
        .configure(tenant_routes);
}

fn tenant_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tenants")
            .route("", web::post().to(handlers::create_tenant))
            .route("/{client_id}", web::get().to(handlers::get_tenant))
            .route("/{client_id}", web::delete().to(handlers::delete_tenant))
            .route("/{client_id}/process", web::post().to(handlers::process_payload)),
    );
}

/// Malformed JSON bodies get the same envelope as every other error.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let resp = response::error(StatusCode::BAD_REQUEST, format!("Bad Request: {}", err));
        error::InternalError::from_response(err, resp).into()
    })
}

pub async fn serve(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(state);

    tracing::info!("Starting HTTP API on http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::new("%r %s %Dms"))
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await
}
