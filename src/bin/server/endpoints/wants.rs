use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};
use barter_loop_engine::model::{CollectionId, NftId, WalletId};
use barter_loop_engine::mutation::{submit_wants, WantDelta};
use serde::Deserialize;

use crate::app::App;
use crate::auth::AuthenticatedTenant;
use crate::endpoints::ApiError;

#[derive(Deserialize)]
pub(crate) struct SubmitWantsBody {
    #[serde(rename = "walletId")]
    wallet_id: String,
    #[serde(rename = "wantedNFTs", default)]
    wanted_nfts: Vec<String>,
    #[serde(rename = "wantedCollections", default)]
    wanted_collections: Vec<String>,
}

pub(crate) async fn submit(
    State(app): State<Arc<App>>,
    Extension(AuthenticatedTenant(tenant_id)): Extension<AuthenticatedTenant>,
    Json(body): Json<SubmitWantsBody>,
) -> Result<(), ApiError> {
    let tenant = app.registry.get(&tenant_id)?;
    let mut deltas: Vec<WantDelta> = body.wanted_nfts.into_iter().map(NftId).map(WantDelta::AddNft).collect();
    deltas.extend(
        body.wanted_collections
            .into_iter()
            .map(CollectionId)
            .map(WantDelta::AddCollection),
    );
    submit_wants(&tenant, app.registry.limits(), WalletId(body.wallet_id), deltas)?;
    Ok(())
}
