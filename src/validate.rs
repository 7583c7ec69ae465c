//! C4: loop validator (spec §4.4). Rejects raw cycles that fail the trade
//! semantic; a failed validation silently drops the cycle (no error
//! surfaced — this runs inside the miss-path of `discover`, not at a
//! client-facing boundary).

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::cycles::RawCycle;
use crate::graph::TenantGraph;
use crate::model::{DirtyReason, LoopStep, NftId, WalletId};

/// A cycle that has passed every check in spec §4.4.
#[derive(Debug, Clone)]
pub struct ValidLoop {
    pub steps: Vec<LoopStep>,
}

/// Tracks the most recent `inventory-changed` dirty timestamp per wallet,
/// supplied by the caller (spec §4.4 condition 5: re-discovery is forced if
/// a participant was marked dirty after the snapshot was taken).
pub trait DirtySince {
    fn inventory_dirty_since(&self, wallet: &WalletId) -> Option<DateTime<Utc>>;
}

pub fn validate(
    graph: &TenantGraph,
    cycle: &RawCycle,
    k: usize,
    snapshot_time: DateTime<Utc>,
    dirty: &impl DirtySince,
) -> Option<ValidLoop> {
    let steps = &cycle.steps;

    // Condition 4: length bounds.
    if steps.len() < 2 || steps.len() > k {
        return None;
    }

    // Condition 1: no wallet repeats (the cycle representation here never
    // repeats the closing vertex literally, each step's `from` is distinct).
    let mut wallets_seen: HashSet<&WalletId> = HashSet::new();
    for step in steps {
        if !wallets_seen.insert(&step.from) {
            return None;
        }
    }

    // Condition 2: no NFT repeats.
    let mut nfts_seen: HashSet<&NftId> = HashSet::new();
    for step in steps {
        if !nfts_seen.insert(&step.nft) {
            return None;
        }
    }

    // Structural closure: step i's `to` must equal step i+1's `from`, and
    // the last step's `to` must equal the first step's `from`.
    for i in 0..steps.len() {
        let next_from = &steps[(i + 1) % steps.len()].from;
        if steps[i].to != *next_from {
            return None;
        }
    }

    // Condition 3: owner(n) == W_i, n in wants(W_{i+1}), W_i != W_{i+1}.
    for step in steps {
        if step.from == step.to {
            return None;
        }
        let Some(owner) = graph.owner_of(&step.nft) else {
            return None;
        };
        if owner != step.from {
            return None;
        }
        let Some(wanter) = graph.get_wallet(&step.to) else {
            return None;
        };
        if !wanter.wants.contains(&step.nft) {
            return None;
        }
    }

    // Condition 5: no participant dirtied by an inventory change after the
    // snapshot was taken.
    for step in steps {
        if let Some(dirtied_at) = dirty.inventory_dirty_since(&step.from) {
            if dirtied_at > snapshot_time {
                return None;
            }
        }
    }

    Some(ValidLoop {
        steps: steps.clone(),
    })
}

/// Marker type naming which dirty reasons force invalidation, kept here so
/// callers constructing a `DirtySince` impl know the contract explicitly.
pub const FORCES_REVALIDATION: DirtyReason = DirtyReason::InventoryChanged;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CollectionId, NftMetadata};

    struct NoDirty;
    impl DirtySince for NoDirty {
        fn inventory_dirty_since(&self, _wallet: &WalletId) -> Option<DateTime<Utc>> {
            None
        }
    }

    fn w(id: &str) -> WalletId {
        WalletId(id.into())
    }
    fn n(id: &str) -> NftId {
        NftId(id.into())
    }

    fn two_cycle_graph() -> TenantGraph {
        let g = TenantGraph::new();
        g.add_nft(n("n1"), w("a"), CollectionId("c".into()), NftMetadata::default()).unwrap();
        g.add_nft(n("n2"), w("b"), CollectionId("c".into()), NftMetadata::default()).unwrap();
        g.add_want_nft(w("a"), n("n2"));
        g.add_want_nft(w("b"), n("n1"));
        g
    }

    #[test]
    fn accepts_valid_two_cycle() {
        let g = two_cycle_graph();
        let cycle = RawCycle {
            steps: vec![
                LoopStep { from: w("a"), to: w("b"), nft: n("n1") },
                LoopStep { from: w("b"), to: w("a"), nft: n("n2") },
            ],
        };
        assert!(validate(&g, &cycle, 10, Utc::now(), &NoDirty).is_some());
    }

    #[test]
    fn rejects_when_owner_mismatched() {
        let g = two_cycle_graph();
        // n1 is actually owned by "a", not "b" - this step is structurally
        // nonsensical and must be rejected.
        let cycle = RawCycle {
            steps: vec![
                LoopStep { from: w("b"), to: w("a"), nft: n("n1") },
                LoopStep { from: w("a"), to: w("b"), nft: n("n2") },
            ],
        };
        assert!(validate(&g, &cycle, 10, Utc::now(), &NoDirty).is_none());
    }

    #[test]
    fn rejects_repeated_nft() {
        let g = two_cycle_graph();
        let cycle = RawCycle {
            steps: vec![
                LoopStep { from: w("a"), to: w("b"), nft: n("n1") },
                LoopStep { from: w("b"), to: w("a"), nft: n("n1") },
            ],
        };
        assert!(validate(&g, &cycle, 10, Utc::now(), &NoDirty).is_none());
    }

    #[test]
    fn rejects_dirty_after_snapshot() {
        let g = two_cycle_graph();
        struct Dirty;
        impl DirtySince for Dirty {
            fn inventory_dirty_since(&self, wallet: &WalletId) -> Option<DateTime<Utc>> {
                if wallet.0 == "a" {
                    Some(Utc::now())
                } else {
                    None
                }
            }
        }
        let cycle = RawCycle {
            steps: vec![
                LoopStep { from: w("a"), to: w("b"), nft: n("n1") },
                LoopStep { from: w("b"), to: w("a"), nft: n("n2") },
            ],
        };
        let old_snapshot = Utc::now() - chrono::Duration::seconds(10);
        assert!(validate(&g, &cycle, 10, old_snapshot, &Dirty).is_none());
    }
}
