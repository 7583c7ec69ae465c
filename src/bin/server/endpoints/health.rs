use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app::App;

#[derive(Serialize)]
pub(crate) struct HealthBody {
    status: &'static str,
    tenants: usize,
}

pub(crate) async fn health(State(app): State<Arc<App>>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        tenants: app.registry.tenant_count(),
    })
}
