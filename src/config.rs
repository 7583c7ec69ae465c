//! Engine-internal tunables: resource caps (spec §5), discovery defaults
//! (spec §4.6), enumerator budgets (spec §4.3), and scorer weights (spec
//! §4.5). Mirrors the teacher's `perps-exes/src/config.rs` layered
//! `#[derive(serde::Deserialize)]` structs with documented field defaults.

use serde::{Deserialize, Serialize};

/// Per-tenant resource caps (spec §5 "Resource caps"). Exceeding any of
/// these fails the offending mutation with `ResourceExhausted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineLimits {
    pub max_wallets_per_tenant: u64,
    pub max_nfts_per_tenant: u64,
    pub max_loops_per_tenant: u64,
    pub max_dirty_queue_depth: u64,
    pub discovery: DiscoverySettings,
    pub enumerator: EnumeratorBudget,
    pub cache: CacheSettings,
    pub worker: WorkerSettings,
    pub scorer: ScoreWeights,
}

impl Default for EngineLimits {
    fn default() -> Self {
        EngineLimits {
            max_wallets_per_tenant: 1_000_000,
            max_nfts_per_tenant: 1_000_000,
            max_loops_per_tenant: 10_000,
            max_dirty_queue_depth: 100_000,
            discovery: DiscoverySettings::default(),
            enumerator: EnumeratorBudget::default(),
            cache: CacheSettings::default(),
            worker: WorkerSettings::default(),
            scorer: ScoreWeights::default(),
        }
    }
}

/// Settings recognised by `discover` (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoverySettings {
    pub max_depth: u32,
    pub min_efficiency: f64,
    pub consider_collections: bool,
    pub max_results: usize,
    pub timeout_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        DiscoverySettings {
            max_depth: 5,
            min_efficiency: 0.6,
            consider_collections: true,
            max_results: 50,
            timeout_ms: 500,
        }
    }
}

impl DiscoverySettings {
    pub const MIN_DEPTH: u32 = 2;
    pub const MAX_DEPTH: u32 = 15;
    pub const MAX_TIMEOUT_MS: u64 = 2_000;

    /// Clamps caller-supplied settings into the bounds spec §4.6 requires.
    pub fn clamped(mut self) -> Self {
        self.max_depth = self.max_depth.clamp(Self::MIN_DEPTH, Self::MAX_DEPTH);
        self.min_efficiency = self.min_efficiency.clamp(0.0, 1.0);
        self.timeout_ms = self.timeout_ms.min(Self::MAX_TIMEOUT_MS);
        self
    }

    /// Canonical form used as part of the cache key (spec §4.6 step 2):
    /// stable field ordering so two semantically-identical settings values
    /// always produce the same string.
    pub fn canonical_form(&self) -> String {
        format!(
            "d{}:e{:.4}:c{}:r{}:t{}",
            self.max_depth,
            self.min_efficiency,
            self.consider_collections,
            self.max_results,
            self.timeout_ms
        )
    }
}

/// Budgets for the Johnson cycle enumerator (spec §4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EnumeratorBudget {
    pub time_budget_ms_per_scc: u64,
    pub cycle_count_budget_per_scc: usize,
}

impl Default for EnumeratorBudget {
    fn default() -> Self {
        EnumeratorBudget {
            time_budget_ms_per_scc: 500,
            cycle_count_budget_per_scc: 10_000,
        }
    }
}

/// Loop-cache sizing (spec §4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheSettings {
    pub max_loops_per_tenant: usize,
    pub default_ttl_secs: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            max_loops_per_tenant: 10_000,
            default_ttl_secs: 600,
        }
    }
}

/// Background worker sizing (spec §4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WorkerSettings {
    pub active_set_watermark: usize,
    pub idle_sleep_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            active_set_watermark: 10_000,
            idle_sleep_ms: 250,
        }
    }
}

/// Weights for the 18-metric composite score (spec §4.5, Open Question:
/// "weights are not publicly normalised ... expose as configuration and
/// validate that they sum to 1"). Seven weights correspond to the
/// spec-named sub-scores; the remaining eleven cover the generic
/// per-participant/per-edge normalised metrics implemented in
/// [`crate::score`] (see that module's doc comment for the full list).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScoreWeights {
    pub directness: f64,
    pub value_balance: f64,
    pub fairness: f64,
    pub demand_density: f64,
    pub collection_coherence: f64,
    pub recency: f64,
    pub novelty: f64,
    pub participant_count_penalty: f64,
    pub max_single_delta_penalty: f64,
    pub median_delta_penalty: f64,
    pub value_utilization: f64,
    pub collection_diversity: f64,
    pub wanter_diversity: f64,
    pub owner_diversity: f64,
    pub nft_liquidity: f64,
    pub wallet_dormancy_penalty: f64,
    pub edge_symmetry: f64,
    pub price_confidence: f64,
    /// Threshold for the `fairness` sub-score (spec §4.5): a participant's
    /// absolute value delta must fall within this fraction of the loop's
    /// mean per-participant value to count as "fair". Not a weight, so it
    /// is excluded from the sum-to-1.0 validation below.
    pub fairness_band: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        // 18 weights summing to 1.0 exactly: 12+10+8+8+6+6+5+5+5+5+5+4+4+4+4+3+3+3 = 100 (in hundredths).
        ScoreWeights {
            directness: 0.12,
            value_balance: 0.10,
            fairness: 0.08,
            demand_density: 0.08,
            collection_coherence: 0.06,
            recency: 0.06,
            novelty: 0.05,
            participant_count_penalty: 0.05,
            max_single_delta_penalty: 0.05,
            median_delta_penalty: 0.05,
            value_utilization: 0.05,
            collection_diversity: 0.04,
            wanter_diversity: 0.04,
            owner_diversity: 0.04,
            nft_liquidity: 0.04,
            wallet_dormancy_penalty: 0.03,
            edge_symmetry: 0.03,
            price_confidence: 0.03,
            fairness_band: 0.10,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.directness
            + self.value_balance
            + self.fairness
            + self.demand_density
            + self.collection_coherence
            + self.recency
            + self.novelty
            + self.participant_count_penalty
            + self.max_single_delta_penalty
            + self.median_delta_penalty
            + self.value_utilization
            + self.collection_diversity
            + self.wanter_diversity
            + self.owner_diversity
            + self.nft_liquidity
            + self.wallet_dormancy_penalty
            + self.edge_symmetry
            + self.price_confidence
    }

    /// Validates the weight table per spec's Open Question requirement.
    pub fn validate(&self) -> Result<(), String> {
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("score weights must sum to 1.0, got {sum}"));
        }
        Ok(())
    }
}
