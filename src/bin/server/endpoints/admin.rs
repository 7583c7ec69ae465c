use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use barter_loop_engine::model::TenantId;
use serde::{Deserialize, Serialize};

use crate::app::App;
use crate::endpoints::ApiError;

#[derive(Deserialize)]
pub(crate) struct CreateTenantBody {
    #[serde(rename = "tenantId")]
    tenant_id: String,
}

#[derive(Serialize)]
pub(crate) struct CreateTenantResponse {
    #[serde(rename = "apiKey")]
    api_key: String,
}

pub(crate) async fn create_tenant(
    State(app): State<Arc<App>>,
    Json(body): Json<CreateTenantBody>,
) -> Result<Json<CreateTenantResponse>, ApiError> {
    let api_key = app.registry.create_tenant(TenantId(body.tenant_id))?;
    Ok(Json(CreateTenantResponse { api_key }))
}

pub(crate) async fn destroy_tenant(State(app): State<Arc<App>>, Path(tenant_id): Path<String>) -> StatusCodeOk {
    let tenant_id = TenantId(tenant_id);
    app.registry.destroy_tenant(&tenant_id);
    if let Some(store) = &app.snapshots {
        let _ = store.delete(&tenant_id);
    }
    StatusCodeOk
}

/// A bare `204 No Content` — destroying a tenant is idempotent and never
/// fails at the HTTP boundary (spec §3: "destroyed by admin call which
/// must release all owned memory").
pub(crate) struct StatusCodeOk;

impl axum::response::IntoResponse for StatusCodeOk {
    fn into_response(self) -> axum::response::Response {
        axum::http::StatusCode::NO_CONTENT.into_response()
    }
}
