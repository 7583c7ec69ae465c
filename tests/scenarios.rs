//! End-to-end scenarios from spec.md §8 "Concrete scenarios" (S1-S6),
//! exercised against an in-process `TenantRegistry` rather than mocking
//! any of C1-C9 individually.

use std::sync::Arc;
use std::time::{Duration, Instant};

use barter_loop_engine::config::{DiscoverySettings, EngineLimits};
use barter_loop_engine::discover::{discover, Seed};
use barter_loop_engine::model::{CollectionId, NftId, NftMetadata, TenantId, WalletId};
use barter_loop_engine::mutation::{remove_nft, submit_inventory, submit_wants, NftSubmission, WantDelta};
use barter_loop_engine::tenant::{Tenant, TenantRegistry};

fn registry() -> TenantRegistry {
    TenantRegistry::new(EngineLimits::default(), 1_000)
}

fn wallet(id: &str) -> WalletId {
    WalletId(id.into())
}

fn nft(id: &str) -> NftId {
    NftId(id.into())
}

fn collection(id: &str) -> CollectionId {
    CollectionId(id.into())
}

fn zero_efficiency_settings() -> DiscoverySettings {
    let mut settings = DiscoverySettings::default();
    settings.min_efficiency = 0.0;
    settings
}

/// S1: two wallets, each holding what the other wants, discover a single
/// 2-cycle with score >= 0.6.
#[tokio::test]
async fn s1_two_cycle() {
    let reg = registry();
    reg.create_tenant(TenantId("t1".into())).unwrap();
    let tenant = reg.get(&TenantId("t1".into())).unwrap();
    let limits = reg.limits();

    submit_inventory(
        &tenant,
        limits,
        vec![
            NftSubmission {
                id: nft("n1"),
                owner: wallet("a"),
                collection: collection("c"),
                metadata: NftMetadata::default(),
            },
            NftSubmission {
                id: nft("n2"),
                owner: wallet("b"),
                collection: collection("c"),
                metadata: NftMetadata::default(),
            },
        ],
    )
    .unwrap();
    submit_wants(&tenant, limits, wallet("a"), vec![WantDelta::AddNft(nft("n2"))]).unwrap();
    submit_wants(&tenant, limits, wallet("b"), vec![WantDelta::AddNft(nft("n1"))]).unwrap();

    let outcome = discover(&tenant, Seed::Wallet(wallet("a")), DiscoverySettings::default()).await;
    assert_eq!(outcome.loops.len(), 1, "expected exactly one loop");
    let found = &outcome.loops[0];
    assert_eq!(found.steps.len(), 2);
    assert!(found.score >= 0.6, "score {} should be >= 0.6", found.score);
}

/// S2: a 3-cycle A->B->C->A yields exactly one loop of length 3.
#[tokio::test]
async fn s2_three_cycle() {
    let reg = registry();
    reg.create_tenant(TenantId("t1".into())).unwrap();
    let tenant = reg.get(&TenantId("t1".into())).unwrap();
    let limits = reg.limits();

    submit_inventory(
        &tenant,
        limits,
        vec![
            NftSubmission { id: nft("n1"), owner: wallet("a"), collection: collection("c"), metadata: NftMetadata::default() },
            NftSubmission { id: nft("n2"), owner: wallet("b"), collection: collection("c"), metadata: NftMetadata::default() },
            NftSubmission { id: nft("n3"), owner: wallet("c"), collection: collection("c"), metadata: NftMetadata::default() },
        ],
    )
    .unwrap();
    submit_wants(&tenant, limits, wallet("b"), vec![WantDelta::AddNft(nft("n1"))]).unwrap();
    submit_wants(&tenant, limits, wallet("c"), vec![WantDelta::AddNft(nft("n2"))]).unwrap();
    submit_wants(&tenant, limits, wallet("a"), vec![WantDelta::AddNft(nft("n3"))]).unwrap();

    let outcome = discover(&tenant, Seed::Wallet(wallet("a")), zero_efficiency_settings()).await;
    assert_eq!(outcome.loops.len(), 1);
    assert_eq!(outcome.loops[0].steps.len(), 3);
}

/// S3: A wants an NFT owned by B, but B wants nothing back - no cycle.
#[tokio::test]
async fn s3_no_cycle() {
    let reg = registry();
    reg.create_tenant(TenantId("t1".into())).unwrap();
    let tenant = reg.get(&TenantId("t1".into())).unwrap();
    let limits = reg.limits();

    submit_inventory(
        &tenant,
        limits,
        vec![NftSubmission { id: nft("n2"), owner: wallet("b"), collection: collection("c"), metadata: NftMetadata::default() }],
    )
    .unwrap();
    submit_wants(&tenant, limits, wallet("a"), vec![WantDelta::AddNft(nft("n2"))]).unwrap();

    let outcome = discover(&tenant, Seed::Wallet(wallet("a")), zero_efficiency_settings()).await;
    assert!(outcome.loops.is_empty());
}

/// S4: 100 concurrent identical `discover` calls on the same snapshot
/// coalesce to one cycle-enumeration pass and return 100 identical
/// responses (spec §4.7 at-most-one-build; §8 invariant 5).
#[tokio::test]
async fn s4_concurrent_discovery_coalesces() {
    let reg = registry();
    reg.create_tenant(TenantId("t1".into())).unwrap();
    let tenant = reg.get(&TenantId("t1".into())).unwrap();
    let limits = reg.limits();

    submit_inventory(
        &tenant,
        limits,
        vec![
            NftSubmission { id: nft("n1"), owner: wallet("a"), collection: collection("c"), metadata: NftMetadata::default() },
            NftSubmission { id: nft("n2"), owner: wallet("b"), collection: collection("c"), metadata: NftMetadata::default() },
        ],
    )
    .unwrap();
    submit_wants(&tenant, limits, wallet("a"), vec![WantDelta::AddNft(nft("n2"))]).unwrap();
    submit_wants(&tenant, limits, wallet("b"), vec![WantDelta::AddNft(nft("n1"))]).unwrap();

    let settings = zero_efficiency_settings();
    let mut handles = Vec::new();
    for _ in 0..100 {
        let tenant = tenant.clone();
        let settings = settings.clone();
        handles.push(tokio::spawn(async move {
            discover(&tenant, Seed::Wallet(wallet("a")), settings).await
        }));
    }

    let mut fingerprints: Vec<String> = Vec::new();
    for h in handles {
        let outcome = h.await.unwrap();
        assert_eq!(outcome.loops.len(), 1);
        fingerprints.push(outcome.loops[0].fingerprint.clone());
    }
    assert!(fingerprints.iter().all(|fp| fp == &fingerprints[0]), "all 100 responses must agree on the loop");
}

/// S5: after a successful discovery, removing one of the loop's NFTs must
/// invalidate the cached entry and force re-discovery, which no longer
/// returns the now-invalid loop.
#[tokio::test]
async fn s5_dirty_invalidation_after_removal() {
    let reg = registry();
    reg.create_tenant(TenantId("t1".into())).unwrap();
    let tenant = reg.get(&TenantId("t1".into())).unwrap();
    let limits = reg.limits();

    submit_inventory(
        &tenant,
        limits,
        vec![
            NftSubmission { id: nft("n1"), owner: wallet("a"), collection: collection("c"), metadata: NftMetadata::default() },
            NftSubmission { id: nft("n2"), owner: wallet("b"), collection: collection("c"), metadata: NftMetadata::default() },
            NftSubmission { id: nft("n3"), owner: wallet("c"), collection: collection("c"), metadata: NftMetadata::default() },
        ],
    )
    .unwrap();
    submit_wants(&tenant, limits, wallet("b"), vec![WantDelta::AddNft(nft("n1"))]).unwrap();
    submit_wants(&tenant, limits, wallet("c"), vec![WantDelta::AddNft(nft("n2"))]).unwrap();
    submit_wants(&tenant, limits, wallet("a"), vec![WantDelta::AddNft(nft("n3"))]).unwrap();

    let settings = zero_efficiency_settings();
    let first = discover(&tenant, Seed::Wallet(wallet("a")), settings.clone()).await;
    assert_eq!(first.loops.len(), 1);
    assert!(!first.from_cache);

    remove_nft(&tenant, limits, &nft("n2")).unwrap();

    let second = discover(&tenant, Seed::Wallet(wallet("a")), settings).await;
    assert!(!second.from_cache, "removal must force a fresh miss-path run");
    assert!(second.loops.is_empty(), "the loop through the removed NFT must not be returned");
}

/// S6: a large, densely connected wants-graph under a tight timeout
/// returns promptly with `truncated = true`, and anything it does return
/// is still a structurally valid loop.
#[tokio::test]
async fn s6_timeout_returns_partial_results_promptly() {
    let reg = registry();
    reg.create_tenant(TenantId("t1".into())).unwrap();
    let tenant = reg.get(&TenantId("t1".into())).unwrap();
    let limits = reg.limits();

    const N: usize = 500;
    let mut submissions = Vec::with_capacity(N);
    for i in 0..N {
        submissions.push(NftSubmission {
            id: nft(&format!("n{i}")),
            owner: wallet(&format!("w{i}")),
            collection: collection("c"),
            metadata: NftMetadata::default(),
        });
    }
    submit_inventory(&tenant, limits, submissions).unwrap();

    // Every wallet wants every other wallet's NFT: a fully connected
    // wants-graph, the worst case for cycle enumeration.
    for i in 0..N {
        let wants: Vec<WantDelta> = (0..N)
            .filter(|&j| j != i)
            .map(|j| WantDelta::AddNft(nft(&format!("n{j}"))))
            .collect();
        submit_wants(&tenant, limits, wallet(&format!("w{i}")), wants).unwrap();
    }

    let mut settings = DiscoverySettings::default();
    settings.timeout_ms = 50;
    settings.min_efficiency = 0.0;

    let started = Instant::now();
    let outcome = discover(&tenant, Seed::Wallet(wallet("w0")), settings).await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(500), "discover took {elapsed:?}, expected a prompt return");
    assert!(outcome.truncated, "a 500-wallet fully connected graph under a 50ms budget must report truncated");
    for l in &outcome.loops {
        assert!(l.steps.len() >= 2);
        let mut seen_wallets = std::collections::HashSet::new();
        let mut seen_nfts = std::collections::HashSet::new();
        for step in &l.steps {
            assert!(seen_wallets.insert(step.from.clone()), "wallet repeated within a returned loop");
            assert!(seen_nfts.insert(step.nft.clone()), "nft repeated within a returned loop");
        }
    }
}

/// §8 invariant 6: inserting then removing a wallet/NFT round-trips to an
/// identical graph state.
#[tokio::test]
async fn invariant6_insert_remove_round_trips() {
    let tenant = Tenant::new(TenantId("t1".into()), &EngineLimits::default());
    let limits = EngineLimits::default();

    assert_eq!(tenant.graph.nft_count(), 0);
    submit_inventory(
        &tenant,
        &limits,
        vec![NftSubmission { id: nft("n1"), owner: wallet("a"), collection: collection("c"), metadata: NftMetadata::default() }],
    )
    .unwrap();
    assert_eq!(tenant.graph.nft_count(), 1);

    remove_nft(&tenant, &limits, &nft("n1")).unwrap();
    assert_eq!(tenant.graph.nft_count(), 0);
    assert!(tenant.graph.owner_of(&nft("n1")).is_none());
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn tenant_is_send_sync() {
    assert_send_sync::<Arc<Tenant>>();
}
