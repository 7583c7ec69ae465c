mod admin;
mod health;
mod inventory;
mod trade;
mod wants;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{middleware, routing::get, Router};
use barter_loop_engine::error::EngineError;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::auth::{admin_auth, tenant_auth};

/// Wraps [`EngineError`] so the bin crate can give it an `IntoResponse`
/// impl without running into the orphan rule.
pub(crate) struct ApiError(pub(crate) EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self.0)).into_response()
    }
}

pub(crate) async fn launch(app: App) -> Result<()> {
    let bind = app.opt.bind;
    let app = Arc::new(app);

    let tenant_routes = Router::new()
        .route("/inventory/submit", axum::routing::post(inventory::submit))
        .route("/wants/submit", axum::routing::post(wants::submit))
        .route("/trade/discover", axum::routing::post(trade::discover))
        .layer(middleware::from_fn_with_state(app.clone(), tenant_auth));

    let admin_routes = Router::new()
        .route("/admin/tenants", axum::routing::post(admin::create_tenant))
        .route("/admin/tenants/:tenant_id", axum::routing::delete(admin::destroy_tenant))
        .layer(middleware::from_fn_with_state(app.clone(), admin_auth));

    let router = Router::new()
        .route("/health", get(health::health))
        .merge(tenant_routes)
        .merge(admin_routes)
        .with_state(app)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("cannot bind HTTP listener to {bind}"))?;
    tracing::info!(%bind, "barter loop engine listening");
    axum::serve(listener, router).await?;
    Ok(())
}
