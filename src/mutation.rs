//! C9: the single entry point for inventory/wants deltas. Every call
//! applies its delta to C1 then folds the resulting dirty markers into the
//! tenant's queue atomically — either the whole delta becomes visible or
//! none of it does, since a batch failure aborts before any dirty marker is
//! recorded for wallets later in the batch.

use crate::config::EngineLimits;
use crate::error::{EngineError, EngineResult};
use crate::model::{CollectionId, DirtyMarker, NftId, NftMetadata, WalletId};
use crate::tenant::Tenant;

/// One NFT entry of an `/inventory/submit` batch.
pub struct NftSubmission {
    pub id: NftId,
    pub owner: WalletId,
    pub collection: CollectionId,
    pub metadata: NftMetadata,
}

/// Applies a batch of NFT submissions. All-or-nothing: the whole batch is
/// validated before any item is committed to the graph, so a bad entry
/// (reported with its offending index) leaves the graph untouched rather
/// than partially applied.
pub fn submit_inventory(tenant: &Tenant, limits: &EngineLimits, batch: Vec<NftSubmission>) -> EngineResult<()> {
    if tenant.graph.nft_count() as u64 + batch.len() as u64 > limits.max_nfts_per_tenant {
        return Err(EngineError::resource_exhausted("nfts", limits.max_nfts_per_tenant));
    }

    for (index, item) in batch.iter().enumerate() {
        if item.id.0.is_empty() {
            return Err(EngineError::validation(format!(
                "inventory batch failed at index {index}: nft id must not be empty"
            )));
        }
    }

    let mut applied = Vec::new();
    for item in batch {
        let markers = tenant
            .graph
            .add_nft(item.id, item.owner, item.collection, item.metadata)
            .expect("validated above");
        applied.push(markers);
    }

    for markers in applied {
        tenant.apply_dirty_markers(markers, limits.max_dirty_queue_depth)?;
    }
    Ok(())
}

pub enum WantDelta {
    AddNft(NftId),
    AddCollection(CollectionId),
    RemoveNft(NftId),
    RemoveCollection(CollectionId),
}

/// Applies a batch of wants deltas for a single wallet.
pub fn submit_wants(
    tenant: &Tenant,
    limits: &EngineLimits,
    wallet: WalletId,
    deltas: Vec<WantDelta>,
) -> EngineResult<()> {
    let mut markers: Vec<DirtyMarker> = Vec::new();
    for delta in deltas {
        let mut batch = match delta {
            WantDelta::AddNft(nft) => tenant.graph.add_want_nft(wallet.clone(), nft),
            WantDelta::AddCollection(collection) => {
                tenant.graph.add_want_collection(wallet.clone(), collection)
            }
            WantDelta::RemoveNft(nft) => tenant.graph.remove_want_nft(&wallet, &nft),
            WantDelta::RemoveCollection(collection) => {
                tenant.graph.remove_want_collection(&wallet, &collection)
            }
        };
        markers.append(&mut batch);
    }
    tenant.apply_dirty_markers(markers, limits.max_dirty_queue_depth)
}

/// Removes an NFT, routing the resulting dirty markers the same way a
/// submission would.
pub fn remove_nft(tenant: &Tenant, limits: &EngineLimits, nft: &NftId) -> EngineResult<()> {
    let markers = tenant.graph.remove_nft(nft);
    tenant.apply_dirty_markers(markers, limits.max_dirty_queue_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TenantId;

    fn tenant() -> Tenant {
        Tenant::new(TenantId("t1".into()), &EngineLimits::default())
    }

    #[test]
    fn submit_inventory_marks_owner_dirty() {
        let t = tenant();
        let limits = EngineLimits::default();
        submit_inventory(
            &t,
            &limits,
            vec![NftSubmission {
                id: NftId("n1".into()),
                owner: WalletId("a".into()),
                collection: CollectionId("c".into()),
                metadata: NftMetadata::default(),
            }],
        )
        .unwrap();
        assert_eq!(t.current_graph_version(), 1);
        assert_eq!(t.dirty_queue_len(), 1);
    }

    #[test]
    fn submit_inventory_rejects_over_cap() {
        let t = tenant();
        let mut limits = EngineLimits::default();
        limits.max_nfts_per_tenant = 0;
        let err = submit_inventory(
            &t,
            &limits,
            vec![NftSubmission {
                id: NftId("n1".into()),
                owner: WalletId("a".into()),
                collection: CollectionId("c".into()),
                metadata: NftMetadata::default(),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ResourceExhausted { .. }));
    }

    #[test]
    fn submit_wants_add_nft_enqueues_dirty() {
        let t = tenant();
        let limits = EngineLimits::default();
        submit_wants(&t, &limits, WalletId("a".into()), vec![WantDelta::AddNft(NftId("n1".into()))]).unwrap();
        assert_eq!(t.dirty_queue_len(), 1);
    }
}
