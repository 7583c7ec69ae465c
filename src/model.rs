//! Core entities (spec §3): tenants, wallets, NFTs, wants edges, trade loops.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tenant-scoped opaque string identifier. Newtyped so wallet/NFT/tenant ids
/// can never be accidentally swapped at a call site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NftId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub String);

impl std::fmt::Display for WalletId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for NftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Estimated value of an NFT in USD. Nullable at the data-model level: an
/// NFT may be indexed before a value oracle has priced it.
pub type EstimatedValueUsd = Option<f64>;

/// Opaque metadata fields named in spec §6. Anything beyond these three is
/// rejected at the HTTP boundary, not silently stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NftMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "estimatedValueUSD")]
    pub estimated_value_usd: EstimatedValueUsd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Nft {
    pub id: NftId,
    pub owner: WalletId,
    pub collection: CollectionId,
    pub metadata: NftMetadata,
}

impl Nft {
    pub fn value(&self) -> f64 {
        self.metadata.estimated_value_usd.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Wallet {
    pub id: WalletId,
    pub inventory: BTreeSet<NftId>,
    pub wants: BTreeSet<NftId>,
    pub collection_wants: BTreeSet<CollectionId>,
    /// Subset of `wants` that arrived solely through collection-want
    /// expansion rather than an explicit `addWant(wallet, nft)` call.
    /// Lets discovery exclude collection-derived edges when
    /// `considerCollections` is false without losing the explicit want.
    pub collection_derived_wants: BTreeSet<NftId>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl Wallet {
    pub fn new(id: WalletId) -> Self {
        Wallet {
            id,
            ..Default::default()
        }
    }

    /// spec §3: "A wallet with empty inventory AND empty wants may be
    /// garbage-collected."
    pub fn is_collectible(&self) -> bool {
        self.inventory.is_empty() && self.wants.is_empty() && self.collection_wants.is_empty()
    }
}

/// A single step of a trade loop: `from` gives up `nft` to `to`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopStep {
    pub from: WalletId,
    pub to: WalletId,
    pub nft: NftId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeLoop {
    pub fingerprint: String,
    pub steps: Vec<LoopStep>,
    pub participants: Vec<WalletId>,
    pub total_value_usd: f64,
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TradeLoop {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Reasons a wallet can be marked dirty (spec §3 "Dirty marker").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirtyReason {
    InventoryChanged,
    WantsChanged,
    OwnershipTransferred,
}

#[derive(Debug, Clone)]
pub struct DirtyMarker {
    pub wallet: WalletId,
    pub reason: DirtyReason,
    pub enqueued_at: DateTime<Utc>,
}

/// A mutation target: either a specific NFT or an entire collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WantTarget {
    Nft(NftId),
    Collection(CollectionId),
}
