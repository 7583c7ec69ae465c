//! [ADDED] C11: persistence adapter. A tenant snapshot is the dictionary
//! named in spec.md §6 — wallets (inventory/wants/collectionWants/
//! lastActivity) and NFTs (owner/collection/value/metadata). The loop
//! cache is never persisted; it is reconstructed by the background worker
//! after restart, per the same section.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::model::{CollectionId, NftId, NftMetadata, TenantId, WalletId};
use crate::tenant::Tenant;

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub inventory: Vec<NftId>,
    pub wants: Vec<NftId>,
    pub collection_wants: Vec<CollectionId>,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NftSnapshot {
    pub owner: WalletId,
    pub collection: CollectionId,
    pub metadata: NftMetadata,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct TenantSnapshot {
    pub wallets: std::collections::BTreeMap<WalletId, WalletSnapshot>,
    pub nfts: std::collections::BTreeMap<NftId, NftSnapshot>,
}

pub fn snapshot_tenant(tenant: &Tenant) -> TenantSnapshot {
    let mut snapshot = TenantSnapshot::default();
    for wallet_id in tenant.graph.all_vertices() {
        if let Some(w) = tenant.graph.get_wallet(&wallet_id) {
            snapshot.wallets.insert(
                wallet_id,
                WalletSnapshot {
                    inventory: w.inventory.into_iter().collect(),
                    wants: w.wants.into_iter().collect(),
                    collection_wants: w.collection_wants.into_iter().collect(),
                    last_activity: w.last_activity,
                },
            );
        }
    }
    for nft_id in snapshot
        .wallets
        .values()
        .flat_map(|w| w.inventory.iter().cloned())
        .collect::<Vec<_>>()
    {
        if let Some(nft) = tenant.graph.get_nft(&nft_id) {
            snapshot.nfts.insert(
                nft_id,
                NftSnapshot {
                    owner: nft.owner,
                    collection: nft.collection,
                    metadata: nft.metadata,
                },
            );
        }
    }
    snapshot
}

/// Applies a snapshot onto a freshly created, empty tenant graph.
pub fn restore_tenant(tenant: &Tenant, snapshot: TenantSnapshot) -> EngineResult<()> {
    for (nft_id, nft) in snapshot.nfts {
        tenant.graph.add_nft(nft_id, nft.owner, nft.collection, nft.metadata)?;
    }
    for (wallet_id, wallet) in snapshot.wallets {
        for nft in wallet.wants {
            tenant.graph.add_want_nft(wallet_id.clone(), nft);
        }
        for collection in wallet.collection_wants {
            tenant.graph.add_want_collection(wallet_id.clone(), collection);
        }
    }
    Ok(())
}

/// A storage backend for tenant snapshots. The filesystem implementation
/// below is the only one shipped; the trait seam exists so a future
/// Redis/disk-at-scale backend (spec.md §1 Non-goal) can be substituted
/// without touching the engine.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, tenant: &TenantId, snapshot: &TenantSnapshot) -> EngineResult<()>;
    fn load(&self, tenant: &TenantId) -> EngineResult<Option<TenantSnapshot>>;
    fn delete(&self, tenant: &TenantId) -> EngineResult<()>;
    /// Every tenant id with a persisted snapshot, for startup restore.
    fn list_tenants(&self) -> EngineResult<Vec<TenantId>>;
}

pub struct FsSnapshotStore {
    data_dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(data_dir: PathBuf) -> EngineResult<Self> {
        fs::create_dir_all(&data_dir).map_err(|e| EngineError::internal("create snapshot dir", e))?;
        Ok(FsSnapshotStore { data_dir })
    }

    fn path_for(&self, tenant: &TenantId) -> PathBuf {
        self.data_dir.join(format!("{}.json", tenant.0))
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn save(&self, tenant: &TenantId, snapshot: &TenantSnapshot) -> EngineResult<()> {
        let body = serde_json::to_vec_pretty(snapshot).map_err(|e| EngineError::internal("serialize snapshot", e))?;
        fs::write(self.path_for(tenant), body).map_err(|e| EngineError::internal("write snapshot", e))?;
        Ok(())
    }

    fn load(&self, tenant: &TenantId) -> EngineResult<Option<TenantSnapshot>> {
        let path = self.path_for(tenant);
        if !path.exists() {
            return Ok(None);
        }
        let body = fs::read(path).map_err(|e| EngineError::internal("read snapshot", e))?;
        let snapshot =
            serde_json::from_slice(&body).map_err(|e| EngineError::internal("deserialize snapshot", e))?;
        Ok(Some(snapshot))
    }

    fn delete(&self, tenant: &TenantId) -> EngineResult<()> {
        let path = self.path_for(tenant);
        if path.exists() {
            fs::remove_file(path).map_err(|e| EngineError::internal("remove snapshot", e))?;
        }
        Ok(())
    }

    fn list_tenants(&self) -> EngineResult<Vec<TenantId>> {
        let entries = fs::read_dir(&self.data_dir).map_err(|e| EngineError::internal("list snapshot dir", e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::internal("read snapshot dir entry", e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(TenantId(stem.to_owned()));
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineLimits;

    #[test]
    fn snapshot_round_trips_through_fs_store() {
        let dir = std::env::temp_dir().join(format!("barter-loop-engine-test-{}", std::process::id()));
        let store = FsSnapshotStore::new(dir.clone()).unwrap();
        let tenant_id = TenantId("t1".into());
        let limits = EngineLimits::default();
        let tenant = Tenant::new(tenant_id.clone(), &limits);
        tenant
            .graph
            .add_nft(NftId("n1".into()), WalletId("a".into()), CollectionId("c".into()), NftMetadata::default())
            .unwrap();
        tenant.graph.add_want_nft(WalletId("b".into()), NftId("n1".into()));

        let snapshot = snapshot_tenant(&tenant);
        store.save(&tenant_id, &snapshot).unwrap();

        let restored_tenant = Tenant::new(TenantId("t2".into()), &limits);
        let loaded = store.load(&tenant_id).unwrap().unwrap();
        restore_tenant(&restored_tenant, loaded).unwrap();
        assert_eq!(restored_tenant.graph.owner_of(&NftId("n1".into())), Some(WalletId("a".into())));

        store.delete(&tenant_id).unwrap();
        assert!(store.load(&tenant_id).unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }
}
