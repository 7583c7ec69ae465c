use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};
use barter_loop_engine::model::{CollectionId, NftId, NftMetadata, WalletId};
use barter_loop_engine::mutation::{submit_inventory, NftSubmission};
use serde::Deserialize;

use crate::app::App;
use crate::auth::AuthenticatedTenant;
use crate::endpoints::ApiError;

#[derive(Deserialize)]
pub(crate) struct SubmitInventoryBody {
    #[serde(rename = "walletId")]
    wallet_id: String,
    nfts: Vec<NftEntry>,
}

#[derive(Deserialize)]
pub(crate) struct NftEntry {
    id: String,
    #[serde(default)]
    metadata: NftMetadata,
    ownership: Ownership,
    collection: Collection,
}

#[derive(Deserialize)]
pub(crate) struct Ownership {
    #[serde(rename = "ownerId")]
    owner_id: String,
}

#[derive(Deserialize)]
pub(crate) struct Collection {
    id: String,
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
}

pub(crate) async fn submit(
    State(app): State<Arc<App>>,
    Extension(AuthenticatedTenant(tenant_id)): Extension<AuthenticatedTenant>,
    Json(body): Json<SubmitInventoryBody>,
) -> Result<(), ApiError> {
    let _ = body.wallet_id;
    let tenant = app.registry.get(&tenant_id)?;
    let batch = body
        .nfts
        .into_iter()
        .map(|entry| NftSubmission {
            id: NftId(entry.id),
            owner: WalletId(entry.ownership.owner_id),
            collection: CollectionId(entry.collection.id),
            metadata: entry.metadata,
        })
        .collect();
    submit_inventory(&tenant, app.registry.limits(), batch)?;
    Ok(())
}
