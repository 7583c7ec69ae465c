//! Maps `X-API-Key` / `Authorization: Bearer` to a tenant id (spec §6
//! "Authentication"). Unknown key -> 401. Admin routes additionally check
//! the process-wide admin key rather than a tenant key.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use barter_loop_engine::error::EngineError;
use barter_loop_engine::model::TenantId;

use crate::app::App;

/// Extracted by downstream handlers via `request.extensions()`.
#[derive(Clone)]
pub(crate) struct AuthenticatedTenant(pub(crate) TenantId);

fn extract_key(request: &Request) -> Option<String> {
    if let Some(key) = request.headers().get("X-API-Key") {
        return key.to_str().ok().map(str::to_owned);
    }
    let auth = request.headers().get(header::AUTHORIZATION)?;
    let auth = auth.to_str().ok()?;
    auth.strip_prefix("Bearer ").map(str::to_owned)
}

pub(crate) async fn tenant_auth(State(app): State<Arc<App>>, mut request: Request, next: Next) -> Response {
    let Some(key) = extract_key(&request) else {
        return unauthorized();
    };
    match app.registry.resolve_api_key(&key) {
        Some(tenant_id) => {
            request.extensions_mut().insert(AuthenticatedTenant(tenant_id));
            next.run(request).await
        }
        None => unauthorized(),
    }
}

pub(crate) async fn admin_auth(State(app): State<Arc<App>>, request: Request, next: Next) -> Response {
    match extract_key(&request) {
        Some(key) if key == app.admin_key => next.run(request).await,
        _ => unauthorized(),
    }
}

fn unauthorized() -> Response {
    let err = EngineError::Unauthorized;
    (StatusCode::UNAUTHORIZED, axum::Json(err)).into_response()
}
