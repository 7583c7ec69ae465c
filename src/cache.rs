//! C7: per-tenant loop cache. Keyed by fingerprint, with secondary indices
//! over wallet and NFT so a mutation affecting one entity can invalidate
//! exactly the cached loops it touches rather than flushing everything.
//! TTL expiry and an LRU size cap bound memory; concurrent misses for the
//! same discovery request coalesce onto a single in-flight build via
//! `tokio::sync::Notify`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;

use crate::model::{NftId, TradeLoop, WalletId};

struct Entry {
    loop_: TradeLoop,
    inserted_at: DateTime<Utc>,
    last_touched: DateTime<Utc>,
}

/// The result of a prior `discover` query, indexed by `(seed, settings
/// canonical form)`: which fingerprints it produced and at what
/// `graphVersion`. A query hit is only honoured while every fingerprint
/// still resolves in `entries` (dirtying a participant evicts the
/// fingerprint, which implicitly invalidates every query pointing at it).
struct QueryEntry {
    fingerprints: Vec<String>,
    graph_version: u64,
    truncated: bool,
}

/// Per-tenant cache of discovered loops. Cheap to clone (`Arc`-backed);
/// intended to live on [`crate::tenant::Tenant`].
#[derive(Clone)]
pub struct LoopCache {
    inner: Arc<Inner>,
}

struct Inner {
    entries: DashMap<String, Entry>,
    by_wallet: DashMap<WalletId, HashSet<String>>,
    by_nft: DashMap<NftId, HashSet<String>>,
    max_entries: usize,
    default_ttl: Duration,
    /// Coalesces concurrent misses on the same cache key (spec §4.7: "at
    /// most one discovery build runs per key at a time").
    in_flight: DashMap<String, Arc<Notify>>,
    queries: DashMap<String, QueryEntry>,
}

impl LoopCache {
    pub fn new(max_entries: usize, default_ttl_secs: i64) -> Self {
        LoopCache {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                by_wallet: DashMap::new(),
                by_nft: DashMap::new(),
                max_entries,
                default_ttl: Duration::seconds(default_ttl_secs),
                in_flight: DashMap::new(),
                queries: DashMap::new(),
            }),
        }
    }

    /// `get(seed, settings-canonical)` (spec §4.7): returns the previously
    /// discovered loops for this query key, as long as every fingerprint it
    /// produced is still live in the cache (a live entry is, by
    /// construction, not dirtier than its `inserted_at`).
    pub fn get_query(&self, query_key: &str) -> Option<(Vec<TradeLoop>, bool)> {
        let entry = self.inner.queries.get(query_key)?;
        let mut loops = Vec::with_capacity(entry.fingerprints.len());
        for fp in &entry.fingerprints {
            match self.get(fp) {
                Some(l) => loops.push(l),
                None => return None,
            }
        }
        Some((loops, entry.truncated))
    }

    /// `put(fingerprint, loop, seeds, graphVersion)` at the query level:
    /// records which fingerprints answer `query_key` as of `graph_version`.
    pub fn put_query(&self, query_key: String, fingerprints: Vec<String>, graph_version: u64, truncated: bool) {
        self.inner.queries.insert(
            query_key,
            QueryEntry {
                fingerprints,
                graph_version,
                truncated,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<TradeLoop> {
        let now = Utc::now();
        let mut expired = false;
        let result = self.inner.entries.get_mut(key).and_then(|mut e| {
            if e.loop_.expires_at < now {
                expired = true;
                None
            } else {
                e.last_touched = now;
                Some(e.loop_.clone())
            }
        });
        if expired {
            self.remove(key);
        }
        result
    }

    pub fn insert(&self, key: String, loop_: TradeLoop) {
        let now = Utc::now();
        for p in &loop_.participants {
            self.inner
                .by_wallet
                .entry(p.clone())
                .or_default()
                .insert(key.clone());
        }
        for step in &loop_.steps {
            self.inner
                .by_nft
                .entry(step.nft.clone())
                .or_default()
                .insert(key.clone());
        }
        self.inner.entries.insert(
            key,
            Entry {
                loop_,
                inserted_at: now,
                last_touched: now,
            },
        );
        self.evict_if_over_capacity();
    }

    /// Default expiry for a freshly built loop, per `default_ttl_secs`.
    pub fn default_expiry(&self) -> DateTime<Utc> {
        Utc::now() + self.inner.default_ttl
    }

    fn remove(&self, key: &str) {
        if let Some((_, entry)) = self.inner.entries.remove(key) {
            for p in &entry.loop_.participants {
                if let Some(mut set) = self.inner.by_wallet.get_mut(p) {
                    set.remove(key);
                }
            }
            for step in &entry.loop_.steps {
                if let Some(mut set) = self.inner.by_nft.get_mut(&step.nft) {
                    set.remove(key);
                }
            }
        }
    }

    /// Invalidates every cached loop touching `wallet` (spec §4.9: a
    /// mutation to a wallet's inventory/wants must invalidate loops it
    /// participates in, not just the ones it directly edits).
    pub fn invalidate_wallet(&self, wallet: &WalletId) {
        if let Some((_, keys)) = self.inner.by_wallet.remove(wallet) {
            for key in keys {
                self.remove(&key);
            }
        }
    }

    pub fn invalidate_nft(&self, nft: &NftId) {
        if let Some((_, keys)) = self.inner.by_nft.remove(nft) {
            for key in keys {
                self.remove(&key);
            }
        }
    }

    pub fn sweep_expired(&self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|e| e.loop_.expires_at < now)
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            self.remove(&key);
        }
        let stale_queries: Vec<String> = self
            .inner
            .queries
            .iter()
            .filter(|e| e.fingerprints.iter().any(|fp| !self.inner.entries.contains_key(fp)))
            .map(|e| e.key().clone())
            .collect();
        for key in stale_queries {
            self.inner.queries.remove(&key);
        }
    }

    fn evict_if_over_capacity(&self) {
        if self.inner.entries.len() <= self.inner.max_entries {
            return;
        }
        let mut by_age: Vec<(String, DateTime<Utc>)> = self
            .inner
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.last_touched))
            .collect();
        by_age.sort_by_key(|(_, t)| *t);
        let overflow = self.inner.entries.len() - self.inner.max_entries;
        for (key, _) in by_age.into_iter().take(overflow) {
            self.remove(&key);
        }
    }

    /// How many currently-cached loops `wallet` participates in — used by
    /// [`crate::score`] as a proxy for "how often has this wallet shown up
    /// in recent discovery results" (novelty sub-score).
    pub fn wallet_appearance_count(&self, wallet: &WalletId) -> u32 {
        self.inner
            .by_wallet
            .get(wallet)
            .map(|keys| keys.len() as u32)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Registers this call as the (possibly sole) builder for `key`. Returns
    /// `Builder::Leader` if this caller must perform the build and notify
    /// waiters when done, or `Builder::Follower(notify)` if another caller
    /// is already building and this one should await the notification and
    /// re-check [`LoopCache::get`].
    pub fn begin_build(&self, key: &str) -> Builder {
        if let Some(existing) = self.inner.in_flight.get(key) {
            return Builder::Follower(existing.clone());
        }
        match self.inner.in_flight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(occ) => Builder::Follower(occ.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(vac) => {
                let notify = Arc::new(Notify::new());
                vac.insert(notify.clone());
                Builder::Leader(notify)
            }
        }
    }

    /// Called by the leader once the build completes (success or failure)
    /// to release the coalescing slot and wake any followers.
    pub fn finish_build(&self, key: &str) {
        if let Some((_, notify)) = self.inner.in_flight.remove(key) {
            notify.notify_waiters();
        }
    }
}

pub enum Builder {
    Leader(Arc<Notify>),
    Follower(Arc<Notify>),
}

impl Builder {
    pub fn notify(&self) -> &Notify {
        match self {
            Builder::Leader(n) | Builder::Follower(n) => n,
        }
    }

    pub fn is_leader(&self) -> bool {
        matches!(self, Builder::Leader(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LoopStep;

    fn sample_loop(key_suffix: &str, expires_at: DateTime<Utc>) -> TradeLoop {
        TradeLoop {
            fingerprint: format!("fp-{key_suffix}"),
            steps: vec![LoopStep {
                from: WalletId("a".into()),
                to: WalletId("b".into()),
                nft: NftId("n1".into()),
            }],
            participants: vec![WalletId("a".into()), WalletId("b".into())],
            total_value_usd: 10.0,
            score: 0.5,
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let cache = LoopCache::new(10, 600);
        let l = sample_loop("1", Utc::now() + Duration::seconds(60));
        cache.insert("k1".into(), l.clone());
        assert_eq!(cache.get("k1").unwrap().fingerprint, l.fingerprint);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = LoopCache::new(10, 600);
        let l = sample_loop("2", Utc::now() - Duration::seconds(1));
        cache.insert("k2".into(), l);
        assert!(cache.get("k2").is_none());
    }

    #[test]
    fn invalidate_wallet_drops_participating_loops() {
        let cache = LoopCache::new(10, 600);
        let l = sample_loop("3", Utc::now() + Duration::seconds(60));
        cache.insert("k3".into(), l);
        cache.invalidate_wallet(&WalletId("a".into()));
        assert!(cache.get("k3").is_none());
    }

    #[test]
    fn lru_evicts_oldest_when_over_capacity() {
        let cache = LoopCache::new(1, 600);
        cache.insert("k1".into(), sample_loop("1", Utc::now() + Duration::seconds(60)));
        cache.insert("k2".into(), sample_loop("2", Utc::now() + Duration::seconds(60)));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("k2").is_some());
    }

    #[test]
    fn second_builder_for_same_key_follows() {
        let cache = LoopCache::new(10, 600);
        let leader = cache.begin_build("k1");
        assert!(leader.is_leader());
        let follower = cache.begin_build("k1");
        assert!(!follower.is_leader());
        cache.finish_build("k1");
        let next = cache.begin_build("k1");
        assert!(next.is_leader());
    }
}
