use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};
use barter_loop_engine::config::DiscoverySettings;
use barter_loop_engine::discover::{discover as run_discover, Seed};
use barter_loop_engine::model::{LoopStep, NftId, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::App;
use crate::auth::AuthenticatedTenant;
use crate::endpoints::ApiError;

#[derive(Deserialize)]
pub(crate) struct DiscoverBody {
    #[serde(rename = "walletId")]
    wallet_id: String,
    #[serde(rename = "nftId")]
    nft_id: Option<String>,
    #[serde(default)]
    settings: Option<SettingsBody>,
}

#[derive(Deserialize)]
pub(crate) struct SettingsBody {
    #[serde(rename = "maxDepth")]
    max_depth: Option<u32>,
    #[serde(rename = "minEfficiency")]
    min_efficiency: Option<f64>,
    #[serde(rename = "considerCollections")]
    consider_collections: Option<bool>,
    #[serde(rename = "maxResults")]
    max_results: Option<usize>,
    #[serde(rename = "timeoutMs")]
    timeout_ms: Option<u64>,
}

impl SettingsBody {
    fn into_settings(self) -> DiscoverySettings {
        let defaults = DiscoverySettings::default();
        DiscoverySettings {
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            min_efficiency: self.min_efficiency.unwrap_or(defaults.min_efficiency),
            consider_collections: self.consider_collections.unwrap_or(defaults.consider_collections),
            max_results: self.max_results.unwrap_or(defaults.max_results),
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct DiscoverResponse {
    loops: Vec<LoopBody>,
    truncated: bool,
    #[serde(rename = "fromCache")]
    from_cache: bool,
}

#[derive(Serialize)]
pub(crate) struct LoopBody {
    id: String,
    participants: Vec<WalletId>,
    steps: Vec<LoopStep>,
    #[serde(rename = "totalValueUSD")]
    total_value_usd: f64,
    score: f64,
    #[serde(rename = "expiresAt")]
    expires_at: DateTime<Utc>,
}

pub(crate) async fn discover(
    State(app): State<Arc<App>>,
    Extension(AuthenticatedTenant(tenant_id)): Extension<AuthenticatedTenant>,
    Json(body): Json<DiscoverBody>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    let tenant = app.registry.get(&tenant_id)?;
    let settings = body.settings.map(SettingsBody::into_settings).unwrap_or_default();
    let seed = match body.nft_id {
        Some(nft_id) => Seed::WalletNft(WalletId(body.wallet_id), NftId(nft_id)),
        None => Seed::Wallet(WalletId(body.wallet_id)),
    };
    let outcome = run_discover(&tenant, seed, settings).await;
    Ok(Json(DiscoverResponse {
        loops: outcome
            .loops
            .into_iter()
            .map(|l| LoopBody {
                id: l.fingerprint,
                participants: l.participants,
                steps: l.steps,
                total_value_usd: l.total_value_usd,
                score: l.score,
                expires_at: l.expires_at,
            })
            .collect(),
        truncated: outcome.truncated,
        from_cache: outcome.from_cache,
    }))
}
