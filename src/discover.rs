//! C6: the discovery orchestrator. Composes the graph store, SCC
//! partitioner, cycle enumerator, validator, and scorer into the single
//! public query `discover(tenant, seed, settings)`, consulting the loop
//! cache first and populating it on a miss.

use std::time::{Duration, Instant};

use chrono::Utc;

use crate::cache::Builder;
use crate::config::DiscoverySettings;
use crate::cycles::enumerate;
use crate::fingerprint::fingerprint;
use crate::scc::partition;
use crate::score::{score, TenantScoringContext};
use crate::tenant::{DirtySinceTracker, Tenant};
use crate::validate::validate;
use crate::model::{NftId, TradeLoop, WalletId};

/// What a query is anchored on (spec §4.6: "wallet id, wallet+nft, or
/// tenant-wide — background mode only").
#[derive(Debug, Clone)]
pub enum Seed {
    Wallet(WalletId),
    WalletNft(WalletId, NftId),
    TenantWide,
}

impl Seed {
    fn anchor(&self) -> Option<&WalletId> {
        match self {
            Seed::Wallet(w) | Seed::WalletNft(w, _) => Some(w),
            Seed::TenantWide => None,
        }
    }

    fn cache_key(&self, settings_canonical: &str) -> String {
        match self {
            Seed::Wallet(w) => format!("w:{w}|{settings_canonical}"),
            Seed::WalletNft(w, n) => format!("wn:{w}:{n}|{settings_canonical}"),
            Seed::TenantWide => format!("t:*|{settings_canonical}"),
        }
    }
}

pub struct DiscoveryOutcome {
    pub loops: Vec<TradeLoop>,
    pub truncated: bool,
    pub from_cache: bool,
}

/// Runs `discover(tenant, seed, settings)` (spec §4.6). Concurrent callers
/// for an identical `(seed, settings)` key coalesce: only the first caller
/// (the "leader") computes the miss path, everyone else waits on its
/// `Notify` and then re-reads the now-populated cache (spec §4.7's
/// at-most-one-build guarantee; this is the one permitted suspension point
/// besides C3's budget checks, per the concurrency model).
pub async fn discover(tenant: &Tenant, seed: Seed, settings: DiscoverySettings) -> DiscoveryOutcome {
    let settings = settings.clamped();
    let query_key = seed.cache_key(&settings.canonical_form());

    if let Some((loops, truncated)) = tenant.cache.get_query(&query_key) {
        return DiscoveryOutcome {
            loops,
            truncated,
            from_cache: true,
        };
    }

    let builder = tenant.cache.begin_build(&query_key);
    if !builder.is_leader() {
        builder.notify().notified().await;
        if let Some((loops, truncated)) = tenant.cache.get_query(&query_key) {
            return DiscoveryOutcome {
                loops,
                truncated,
                from_cache: true,
            };
        }
        // The leader's build vanished without populating the cache (e.g. it
        // found zero loops); fall through and compute it ourselves.
    }

    let graph_version = tenant.current_graph_version();
    let result = run_miss_path(tenant, &seed, &settings, graph_version);
    tenant.cache.put_query(
        query_key.clone(),
        result.loops.iter().map(|l| l.fingerprint.clone()).collect(),
        graph_version,
        result.truncated,
    );
    tenant.cache.finish_build(&query_key);

    result
}

fn run_miss_path(tenant: &Tenant, seed: &Seed, settings: &DiscoverySettings, graph_version: u64) -> DiscoveryOutcome {
    let started = Instant::now();
    let timeout = Duration::from_millis(settings.timeout_ms);

    let seeds: Vec<WalletId> = match seed.anchor() {
        Some(w) => vec![w.clone()],
        None => tenant.graph.all_vertices(),
    };
    if seeds.is_empty() {
        return DiscoveryOutcome { loops: Vec::new(), truncated: false, from_cache: false };
    }

    let mut neighborhood = std::collections::HashSet::new();
    for s in &seeds {
        neighborhood.extend(tenant.graph.neighborhood(s, settings.max_depth, settings.consider_collections));
    }

    let sccs = partition(&tenant.graph, &neighborhood, settings.consider_collections);
    let tracker = DirtySinceTracker {
        tenant,
        last_dirty_at: dashmap::DashMap::new(),
    };
    let snapshot_time = Utc::now();
    let scoring_ctx = TenantScoringContext::new(&tenant.graph, &tenant.cache);

    let mut candidates: Vec<TradeLoop> = Vec::new();
    let mut truncated = false;

    for scc in &sccs {
        if started.elapsed() > timeout {
            truncated = true;
            break;
        }
        let query_remaining = timeout.saturating_sub(started.elapsed());
        let per_scc_budget = Duration::from_millis(tenant.limits.enumerator.time_budget_ms_per_scc);
        let enum_result = enumerate(
            scc,
            settings.max_depth as usize,
            query_remaining.min(per_scc_budget),
            tenant.limits.enumerator.cycle_count_budget_per_scc,
        );
        if enum_result.truncated {
            truncated = true;
        }
        for raw in &enum_result.cycles {
            if started.elapsed() > timeout {
                truncated = true;
                break;
            }
            let Some(valid) = validate(&tenant.graph, raw, settings.max_depth as usize, snapshot_time, &tracker)
            else {
                continue;
            };
            let fp = fingerprint(&valid.steps);
            let s = score(&tenant.graph, &valid.steps, &tenant.limits.scorer, &scoring_ctx);
            if s < settings.min_efficiency {
                continue;
            }
            let participants: Vec<WalletId> = valid.steps.iter().map(|st| st.from.clone()).collect();
            let total_value: f64 = valid
                .steps
                .iter()
                .filter_map(|st| tenant.graph.get_nft(&st.nft))
                .map(|n| n.value())
                .sum();
            candidates.push(TradeLoop {
                fingerprint: fp,
                steps: valid.steps,
                participants,
                total_value_usd: total_value,
                score: s,
                created_at: Utc::now(),
                expires_at: tenant.cache.default_expiry(),
            });
        }
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.fingerprint.cmp(&b.fingerprint)));
    candidates.truncate(settings.max_results);

    for l in &candidates {
        tenant.cache.insert(l.fingerprint.clone(), l.clone());
    }

    let _ = graph_version;
    DiscoveryOutcome {
        loops: candidates,
        truncated,
        from_cache: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineLimits;
    use crate::model::{CollectionId, NftId as NftIdModel, NftMetadata, TenantId};

    fn w(id: &str) -> WalletId {
        WalletId(id.into())
    }
    fn n(id: &str) -> NftIdModel {
        NftIdModel(id.into())
    }

    fn two_cycle_tenant() -> Tenant {
        let t = Tenant::new(TenantId("t1".into()), &EngineLimits::default());
        t.graph.add_nft(n("n1"), w("a"), CollectionId("c".into()), NftMetadata::default()).unwrap();
        t.graph.add_nft(n("n2"), w("b"), CollectionId("c".into()), NftMetadata::default()).unwrap();
        t.graph.add_want_nft(w("a"), n("n2"));
        t.graph.add_want_nft(w("b"), n("n1"));
        t
    }

    #[tokio::test]
    async fn discovers_two_cycle() {
        let t = two_cycle_tenant();
        let mut settings = DiscoverySettings::default();
        settings.min_efficiency = 0.0;
        let outcome = discover(&t, Seed::Wallet(w("a")), settings).await;
        assert!(!outcome.from_cache);
        assert_eq!(outcome.loops.len(), 1);
        assert_eq!(outcome.loops[0].steps.len(), 2);
    }

    #[tokio::test]
    async fn second_identical_query_hits_cache() {
        let t = two_cycle_tenant();
        let mut settings = DiscoverySettings::default();
        settings.min_efficiency = 0.0;
        let first = discover(&t, Seed::Wallet(w("a")), settings.clone()).await;
        assert!(!first.from_cache);
        let second = discover(&t, Seed::Wallet(w("a")), settings).await;
        assert!(second.from_cache);
        assert_eq!(second.loops.len(), first.loops.len());
    }

    #[tokio::test]
    async fn no_cycle_returns_empty() {
        let t = Tenant::new(TenantId("t1".into()), &EngineLimits::default());
        t.graph.add_nft(n("n1"), w("a"), CollectionId("c".into()), NftMetadata::default()).unwrap();
        let outcome = discover(&t, Seed::Wallet(w("a")), DiscoverySettings::default()).await;
        assert!(outcome.loops.is_empty());
    }
}
