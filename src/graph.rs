//! C1: the persistent per-tenant graph store (spec §4.1).
//!
//! Three indices backed by one `parking_lot::RwLock`-guarded struct:
//! wallet → inventory, wallet → wants (explicit + collection), NFT →
//! owner. The derived wants-graph adjacency (`owner → [(wanter, nft)]`) is
//! rebuilt lazily whenever a read observes the dirty bit, per spec.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::model::{
    CollectionId, DirtyMarker, DirtyReason, Nft, NftId, NftMetadata, Wallet, WalletId,
};

/// One adjacency entry of the derived wants-graph: `owner(nft)` has an
/// outgoing edge to `wanter` carrying `nft`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WantEdge {
    pub wanter: WalletId,
    pub nft: NftId,
    /// Set when `wanter`'s want for `nft` arrived solely through
    /// collection-want expansion rather than an explicit `addWant(nft)`.
    pub via_collection: bool,
}

#[derive(Default)]
struct Indices {
    wallets: BTreeMap<WalletId, Wallet>,
    nfts: BTreeMap<NftId, Nft>,
    /// Collection membership, needed to expand collection-level wants as
    /// new NFTs arrive (spec §9 Open Question: "automatic expansion on new
    /// NFT arrival ... implementers should treat this as a contract").
    collection_members: BTreeMap<CollectionId, BTreeSet<NftId>>,
    /// Reverse index: which wallets subscribe to a collection want.
    collection_subscribers: BTreeMap<CollectionId, BTreeSet<WalletId>>,
    /// Derived wants-graph adjacency, rebuilt when `dirty` is set.
    adjacency: BTreeMap<WalletId, Vec<WantEdge>>,
    dirty: bool,
}

/// Per-tenant graph store. All mutation methods take the exclusive lock
/// internally; callers never hold the lock across an `.await` (spec §5).
pub struct TenantGraph {
    inner: RwLock<Indices>,
}

impl Default for TenantGraph {
    fn default() -> Self {
        TenantGraph {
            inner: RwLock::new(Indices::default()),
        }
    }
}

impl TenantGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_wallet<'a>(wallets: &'a mut BTreeMap<WalletId, Wallet>, id: &WalletId) -> &'a mut Wallet {
        wallets
            .entry(id.clone())
            .or_insert_with(|| Wallet::new(id.clone()))
    }

    /// Stamps `last_activity` for a wallet actively participating in a
    /// mutation (owner of a submitted NFT, wallet submitting a want delta).
    fn touch(wallets: &mut BTreeMap<WalletId, Wallet>, id: &WalletId, now: chrono::DateTime<Utc>) {
        Self::ensure_wallet(wallets, id).last_activity = Some(now);
    }

    /// `addNFT(nft, owner)` (spec §4.1). Returns the set of wallets newly
    /// marked dirty (empty unless ownership was transferred).
    pub fn add_nft(
        &self,
        id: NftId,
        owner: WalletId,
        collection: CollectionId,
        metadata: NftMetadata,
    ) -> EngineResult<Vec<DirtyMarker>> {
        if id.0.is_empty() {
            return Err(EngineError::validation("nft id must not be empty"));
        }
        let mut guard = self.inner.write();
        let mut dirty = Vec::new();
        let now = Utc::now();

        let previous_owner = guard.nfts.get(&id).map(|n| n.owner.clone());
        if let Some(prev) = &previous_owner {
            if *prev != owner {
                Self::ensure_wallet(&mut guard.wallets, prev).inventory.remove(&id);
                dirty.push(DirtyMarker {
                    wallet: prev.clone(),
                    reason: DirtyReason::OwnershipTransferred,
                    enqueued_at: now,
                });
            }
        }

        guard.collection_members.entry(collection.clone()).or_default().insert(id.clone());
        Self::ensure_wallet(&mut guard.wallets, &owner).inventory.insert(id.clone());
        Self::touch(&mut guard.wallets, &owner, now);
        guard.nfts.insert(
            id.clone(),
            Nft {
                id: id.clone(),
                owner: owner.clone(),
                collection: collection.clone(),
                metadata,
            },
        );
        dirty.push(DirtyMarker {
            wallet: owner.clone(),
            reason: DirtyReason::OwnershipTransferred,
            enqueued_at: now,
        });

        // Expand any collection-level wants subscribed to this collection
        // (the open-question contract: new arrivals auto-expand).
        if let Some(subscribers) = guard.collection_subscribers.get(&collection).cloned() {
            for wanter in subscribers {
                if wanter != owner {
                    {
                        let w = Self::ensure_wallet(&mut guard.wallets, &wanter);
                        w.wants.insert(id.clone());
                        w.collection_derived_wants.insert(id.clone());
                    }
                    dirty.push(DirtyMarker {
                        wallet: wanter,
                        reason: DirtyReason::WantsChanged,
                        enqueued_at: now,
                    });
                }
            }
        }

        guard.dirty = true;
        Ok(dirty)
    }

    /// `removeNFT(nft)`: removes the NFT and every wants edge referencing
    /// it (invariant 2).
    pub fn remove_nft(&self, id: &NftId) -> Vec<DirtyMarker> {
        let mut guard = self.inner.write();
        let mut dirty = Vec::new();
        let now = Utc::now();

        let Some(nft) = guard.nfts.remove(id) else {
            return dirty;
        };
        if let Some(owner_wallet) = guard.wallets.get_mut(&nft.owner) {
            owner_wallet.inventory.remove(id);
        }
        Self::touch(&mut guard.wallets, &nft.owner, now);
        if let Some(members) = guard.collection_members.get_mut(&nft.collection) {
            members.remove(id);
        }
        let wanters: Vec<WalletId> = guard
            .wallets
            .iter()
            .filter(|(_, w)| w.wants.contains(id))
            .map(|(wid, _)| wid.clone())
            .collect();
        for wanter in wanters {
            if let Some(w) = guard.wallets.get_mut(&wanter) {
                w.wants.remove(id);
                w.collection_derived_wants.remove(id);
            }
            dirty.push(DirtyMarker {
                wallet: wanter,
                reason: DirtyReason::WantsChanged,
                enqueued_at: now,
            });
        }
        dirty.push(DirtyMarker {
            wallet: nft.owner,
            reason: DirtyReason::InventoryChanged,
            enqueued_at: now,
        });
        guard.dirty = true;
        dirty
    }

    /// `addWant(wallet, nft)`. An explicit want always supersedes a
    /// collection-derived one for the same NFT.
    pub fn add_want_nft(&self, wallet: WalletId, nft: NftId) -> Vec<DirtyMarker> {
        let mut guard = self.inner.write();
        let now = Utc::now();
        {
            let w = Self::ensure_wallet(&mut guard.wallets, &wallet);
            w.wants.insert(nft.clone());
            w.collection_derived_wants.remove(&nft);
        }
        Self::touch(&mut guard.wallets, &wallet, now);
        guard.dirty = true;
        vec![DirtyMarker {
            wallet,
            reason: DirtyReason::WantsChanged,
            enqueued_at: now,
        }]
    }

    /// `addWant(wallet, collection)`: expands against current membership
    /// and records the subscription for future arrivals. Expanded members
    /// are marked collection-derived so discovery can exclude them when
    /// `considerCollections` is false.
    pub fn add_want_collection(&self, wallet: WalletId, collection: CollectionId) -> Vec<DirtyMarker> {
        let mut guard = self.inner.write();
        let now = Utc::now();
        guard
            .collection_subscribers
            .entry(collection.clone())
            .or_default()
            .insert(wallet.clone());
        let members = guard
            .collection_members
            .get(&collection)
            .cloned()
            .unwrap_or_default();
        {
            let w = Self::ensure_wallet(&mut guard.wallets, &wallet);
            w.collection_wants.insert(collection);
            for nft in members {
                w.wants.insert(nft.clone());
                w.collection_derived_wants.insert(nft);
            }
        }
        Self::touch(&mut guard.wallets, &wallet, now);
        guard.dirty = true;
        vec![DirtyMarker {
            wallet,
            reason: DirtyReason::WantsChanged,
            enqueued_at: now,
        }]
    }

    /// `removeWant(wallet, nft)`.
    pub fn remove_want_nft(&self, wallet: &WalletId, nft: &NftId) -> Vec<DirtyMarker> {
        let mut guard = self.inner.write();
        let now = Utc::now();
        if let Some(w) = guard.wallets.get_mut(wallet) {
            w.wants.remove(nft);
            w.collection_derived_wants.remove(nft);
        }
        Self::touch(&mut guard.wallets, wallet, now);
        guard.dirty = true;
        vec![DirtyMarker {
            wallet: wallet.clone(),
            reason: DirtyReason::WantsChanged,
            enqueued_at: now,
        }]
    }

    /// `removeWant(wallet, collection)`.
    pub fn remove_want_collection(&self, wallet: &WalletId, collection: &CollectionId) -> Vec<DirtyMarker> {
        let mut guard = self.inner.write();
        let now = Utc::now();
        if let Some(subs) = guard.collection_subscribers.get_mut(collection) {
            subs.remove(wallet);
        }
        let members = guard
            .collection_members
            .get(collection)
            .cloned()
            .unwrap_or_default();
        if let Some(w) = guard.wallets.get_mut(wallet) {
            w.collection_wants.remove(collection);
            for nft in &members {
                w.wants.remove(nft);
                w.collection_derived_wants.remove(nft);
            }
        }
        Self::touch(&mut guard.wallets, wallet, now);
        guard.dirty = true;
        vec![DirtyMarker {
            wallet: wallet.clone(),
            reason: DirtyReason::WantsChanged,
            enqueued_at: now,
        }]
    }

    pub fn owner_of(&self, nft: &NftId) -> Option<WalletId> {
        self.inner.read().nfts.get(nft).map(|n| n.owner.clone())
    }

    pub fn get_nft(&self, nft: &NftId) -> Option<Nft> {
        self.inner.read().nfts.get(nft).cloned()
    }

    pub fn get_wallet(&self, wallet: &WalletId) -> Option<Wallet> {
        self.inner.read().wallets.get(wallet).cloned()
    }

    pub fn wallet_count(&self) -> usize {
        self.inner.read().wallets.len()
    }

    /// Number of distinct wallets currently wanting `nft` (its in-degree in
    /// the wants graph), used by the `demand_density` sub-score.
    pub fn want_count_for_nft(&self, nft: &NftId) -> usize {
        self.inner.read().wallets.values().filter(|w| w.wants.contains(nft)).count()
    }

    /// Median want-count across every NFT currently wanted by at least one
    /// wallet, the normalisation base for `demand_density`. `1.0` when
    /// nothing is wanted, so a lone candidate loop isn't divided by zero.
    pub fn median_nft_want_count(&self) -> f64 {
        let guard = self.inner.read();
        let mut counts: BTreeMap<&NftId, usize> = BTreeMap::new();
        for w in guard.wallets.values() {
            for nft in &w.wants {
                *counts.entry(nft).or_insert(0) += 1;
            }
        }
        if counts.is_empty() {
            return 1.0;
        }
        let mut values: Vec<usize> = counts.into_values().collect();
        values.sort_unstable();
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) as f64 / 2.0
        } else {
            values[mid] as f64
        };
        median.max(1.0)
    }

    pub fn nft_count(&self) -> usize {
        self.inner.read().nfts.len()
    }

    /// Rebuilds the derived wants-graph adjacency if the dirty bit is set.
    /// Iteration order over wallets is the `BTreeMap` key order (wallet id)
    /// so SCC discovery downstream is deterministic (spec §4.2).
    fn rebuild_adjacency_if_needed(&self) {
        let needs_rebuild = self.inner.read().dirty;
        if !needs_rebuild {
            return;
        }
        let mut guard = self.inner.write();
        if !guard.dirty {
            return; // lost the race with another rebuilder, already fresh
        }
        let mut adjacency: BTreeMap<WalletId, Vec<WantEdge>> = BTreeMap::new();
        let wallets: Vec<(WalletId, BTreeSet<NftId>, BTreeSet<NftId>)> = guard
            .wallets
            .iter()
            .map(|(id, w)| (id.clone(), w.wants.clone(), w.collection_derived_wants.clone()))
            .collect();
        for (wanter, wants, collection_derived) in wallets {
            for nft in wants {
                let Some(nft_record) = guard.nfts.get(&nft) else {
                    continue;
                };
                let owner = nft_record.owner.clone();
                if owner == wanter {
                    continue;
                }
                let via_collection = collection_derived.contains(&nft);
                adjacency.entry(owner).or_default().push(WantEdge {
                    wanter: wanter.clone(),
                    nft,
                    via_collection,
                });
            }
        }
        guard.adjacency = adjacency;
        guard.dirty = false;
    }

    /// Returns the out-edges of the derived wants-graph for `wallet`,
    /// including collection-derived ones.
    pub fn edges_from(&self, wallet: &WalletId) -> Vec<WantEdge> {
        self.rebuild_adjacency_if_needed();
        self.inner
            .read()
            .adjacency
            .get(wallet)
            .cloned()
            .unwrap_or_default()
    }

    /// `edges_from`, optionally excluding wants edges that arrived solely
    /// through collection-want expansion (spec §6 `considerCollections`).
    pub fn edges_from_considering(&self, wallet: &WalletId, consider_collections: bool) -> Vec<WantEdge> {
        let edges = self.edges_from(wallet);
        if consider_collections {
            edges
        } else {
            edges.into_iter().filter(|e| !e.via_collection).collect()
        }
    }

    /// Every wallet id that currently has at least one outgoing or
    /// incoming derived wants edge, in stable (wallet id) order.
    pub fn all_vertices(&self) -> Vec<WalletId> {
        self.rebuild_adjacency_if_needed();
        let guard = self.inner.read();
        let mut set: BTreeSet<WalletId> = BTreeSet::new();
        for (owner, edges) in &guard.adjacency {
            set.insert(owner.clone());
            for edge in edges {
                set.insert(edge.wanter.clone());
            }
        }
        set.into_iter().collect()
    }

    /// `neighborhood(seed, depth)` (spec §4.1): wallets reachable from
    /// `seed` within `depth` hops of the *undirected* wants-graph (a trade
    /// loop can traverse an edge in either direction relative to the
    /// seed), including the seed itself. Collection-derived edges are
    /// excluded from traversal when `consider_collections` is false.
    pub fn neighborhood(&self, seed: &WalletId, depth: u32, consider_collections: bool) -> HashSet<WalletId> {
        self.rebuild_adjacency_if_needed();
        let guard = self.inner.read();
        let mut undirected: HashMap<WalletId, Vec<WalletId>> = HashMap::new();
        for (owner, edges) in &guard.adjacency {
            for edge in edges {
                if edge.via_collection && !consider_collections {
                    continue;
                }
                undirected.entry(owner.clone()).or_default().push(edge.wanter.clone());
                undirected.entry(edge.wanter.clone()).or_default().push(owner.clone());
            }
        }
        drop(guard);

        let mut visited = HashSet::new();
        visited.insert(seed.clone());
        let mut frontier = vec![seed.clone()];
        for _ in 0..depth {
            let mut next = Vec::new();
            for node in &frontier {
                if let Some(neighbors) = undirected.get(node) {
                    for n in neighbors {
                        if visited.insert(n.clone()) {
                            next.push(n.clone());
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        visited
    }

    /// Garbage-collects wallets with no inventory and no wants (spec §3).
    pub fn collect_garbage(&self) {
        let mut guard = self.inner.write();
        guard.wallets.retain(|_, w| !w.is_collectible());
    }
}
