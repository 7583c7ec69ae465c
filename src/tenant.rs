//! Tenant bookkeeping: each tenant owns exactly one graph, one loop cache,
//! and one dirty queue, created/destroyed only by an admin call. The
//! registry enforces the process-wide tenant cap and hands out API keys.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;

use crate::cache::LoopCache;
use crate::config::EngineLimits;
use crate::error::{EngineError, EngineResult};
use crate::graph::TenantGraph;
use crate::model::{DirtyMarker, DirtyReason, TenantId, WalletId};

/// Where a wallet sits in the dirty-queue state machine (spec §4.9):
/// `clean -> dirty(reason) -> in-flight -> clean`, with re-dirtying while
/// `in-flight` forcing another run once the current one completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    Dirty(DirtyReason),
    InFlight,
    InFlightThenDirty(DirtyReason),
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct QueueItem {
    enqueued_at: DateTime<Utc>,
    wallet: WalletId,
    reason: DirtyReason,
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; the worker wants the OLDEST entry first,
        // so invert the ordering on enqueue time.
        other.enqueued_at.cmp(&self.enqueued_at)
    }
}
impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One tenant's owned state: graph, cache, dirty queue, and a monotonic
/// `graphVersion` bumped by every committed mutation.
pub struct Tenant {
    pub id: TenantId,
    pub graph: TenantGraph,
    pub cache: LoopCache,
    pub limits: Arc<EngineLimits>,
    pub graph_version: AtomicU64,
    queue: Mutex<BinaryHeap<QueueItem>>,
    states: DashMap<WalletId, DirtyState>,
    /// Signalled whenever a mutation enqueues at least one dirty wallet, so
    /// the background worker can sleep between iterations instead of
    /// busy-polling (spec §4.8 step 3).
    pub dirty_signal: Notify,
}

impl Tenant {
    pub fn new(id: TenantId, limits: &EngineLimits) -> Self {
        Tenant {
            id,
            graph: TenantGraph::new(),
            cache: LoopCache::new(limits.cache.max_loops_per_tenant, limits.cache.default_ttl_secs),
            limits: Arc::new(limits.clone()),
            graph_version: AtomicU64::new(0),
            queue: Mutex::new(BinaryHeap::new()),
            states: DashMap::new(),
            dirty_signal: Notify::new(),
        }
    }

    pub fn current_graph_version(&self) -> u64 {
        self.graph_version.load(Ordering::SeqCst)
    }

    /// Applies dirty markers produced by a C1 mutation: advances each
    /// wallet's state-machine, pushes it onto the priority queue, and bumps
    /// `graphVersion`. Called under the tenant's conceptual exclusive lock
    /// (mutation.rs serialises callers via the graph's own write lock).
    pub fn apply_dirty_markers(&self, markers: Vec<DirtyMarker>, max_queue_depth: u64) -> EngineResult<()> {
        if markers.is_empty() {
            return Ok(());
        }
        let mut queue = self.queue.lock();
        for marker in markers {
            self.cache.invalidate_wallet(&marker.wallet);
            match self.states.get(&marker.wallet).map(|e| *e) {
                Some(DirtyState::InFlight) | Some(DirtyState::InFlightThenDirty(_)) => {
                    self.states
                        .insert(marker.wallet.clone(), DirtyState::InFlightThenDirty(marker.reason));
                }
                _ => {
                    self.states.insert(marker.wallet.clone(), DirtyState::Dirty(marker.reason));
                    if (queue.len() as u64) >= max_queue_depth {
                        return Err(EngineError::resource_exhausted("dirty-queue", max_queue_depth));
                    }
                    queue.push(QueueItem {
                        enqueued_at: marker.enqueued_at,
                        wallet: marker.wallet,
                        reason: marker.reason,
                    });
                }
            }
        }
        self.graph_version.fetch_add(1, Ordering::SeqCst);
        drop(queue);
        self.dirty_signal.notify_waiters();
        Ok(())
    }

    /// Pulls the oldest dirty wallet, transitioning it to `InFlight`.
    pub fn pop_dirty(&self) -> Option<(WalletId, DirtyReason)> {
        let mut queue = self.queue.lock();
        let item = queue.pop()?;
        self.states.insert(item.wallet.clone(), DirtyState::InFlight);
        Some((item.wallet, item.reason))
    }

    /// Marks a wallet's in-flight discovery run complete. If it was
    /// re-dirtied while in flight, re-enqueues it immediately instead of
    /// going clean.
    pub fn complete_in_flight(&self, wallet: &WalletId) {
        let next = match self.states.get(wallet).map(|e| *e) {
            Some(DirtyState::InFlightThenDirty(reason)) => Some(reason),
            _ => None,
        };
        match next {
            Some(reason) => {
                self.states.insert(wallet.clone(), DirtyState::Dirty(reason));
                self.queue.lock().push(QueueItem {
                    enqueued_at: Utc::now(),
                    wallet: wallet.clone(),
                    reason,
                });
                self.dirty_signal.notify_waiters();
            }
            None => {
                self.states.remove(wallet);
            }
        }
    }

    pub fn dirty_queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drops the oldest entries once the active set exceeds `watermark`
    /// (spec §4.8 backpressure), rather than growing unbounded.
    pub fn enforce_watermark(&self, watermark: usize) {
        let mut queue = self.queue.lock();
        if queue.len() <= watermark {
            return;
        }
        let mut items: Vec<QueueItem> = std::mem::take(&mut *queue).into_sorted_vec();
        // into_sorted_vec is ascending by Ord, and our Ord is inverted
        // (oldest = greatest), so the vec here is newest-first; truncate
        // from the back to drop the oldest.
        items.truncate(watermark);
        for item in items {
            queue.push(item);
        }
    }
}

/// Records a wallet's most-recent dirty timestamp, used by [`crate::validate`]
/// to reject loops whose participants were dirtied after the query snapshot.
pub struct DirtySinceTracker<'a> {
    pub tenant: &'a Tenant,
    pub last_dirty_at: DashMap<WalletId, DateTime<Utc>>,
}

impl<'a> crate::validate::DirtySince for DirtySinceTracker<'a> {
    fn inventory_dirty_since(&self, wallet: &WalletId) -> Option<DateTime<Utc>> {
        self.last_dirty_at.get(wallet).map(|e| *e)
    }
}

/// Process-wide tenant registry: creation, lookup, destruction, and API-key
/// to tenant-id resolution for the HTTP auth layer.
pub struct TenantRegistry {
    tenants: DashMap<TenantId, Arc<Tenant>>,
    api_keys: DashMap<String, TenantId>,
    limits: EngineLimits,
    max_tenants: u64,
}

impl TenantRegistry {
    pub fn new(limits: EngineLimits, max_tenants: u64) -> Self {
        TenantRegistry {
            tenants: DashMap::new(),
            api_keys: DashMap::new(),
            limits,
            max_tenants,
        }
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// Creates a tenant and returns its freshly minted API key.
    pub fn create_tenant(&self, id: TenantId) -> EngineResult<String> {
        if self.tenants.len() as u64 >= self.max_tenants {
            return Err(EngineError::resource_exhausted("tenants", self.max_tenants));
        }
        if self.tenants.contains_key(&id) {
            return Err(EngineError::validation(format!("tenant {id} already exists")));
        }
        let tenant = Arc::new(Tenant::new(id.clone(), &self.limits));
        self.tenants.insert(id.clone(), tenant);
        let api_key = generate_api_key();
        self.api_keys.insert(api_key.clone(), id);
        Ok(api_key)
    }

    /// Recreates a tenant from a persisted snapshot (spec §6 "Persisted
    /// state layout") and mints it a fresh API key — keys themselves are
    /// never part of the snapshot, so a tenant coming back after a restart
    /// is handed a new one, the same way [`App`](crate) hands out a fresh
    /// admin key when none is configured.
    pub fn restore_tenant(&self, id: TenantId, snapshot: crate::snapshot::TenantSnapshot) -> EngineResult<String> {
        if self.tenants.len() as u64 >= self.max_tenants {
            return Err(EngineError::resource_exhausted("tenants", self.max_tenants));
        }
        if self.tenants.contains_key(&id) {
            return Err(EngineError::validation(format!("tenant {id} already exists")));
        }
        let tenant = Tenant::new(id.clone(), &self.limits);
        crate::snapshot::restore_tenant(&tenant, snapshot)?;
        let tenant = Arc::new(tenant);
        self.tenants.insert(id.clone(), tenant);
        let api_key = generate_api_key();
        self.api_keys.insert(api_key.clone(), id);
        Ok(api_key)
    }

    /// Releases all memory owned by `id`. Idempotent.
    pub fn destroy_tenant(&self, id: &TenantId) {
        self.tenants.remove(id);
        self.api_keys.retain(|_, v| v != id);
    }

    pub fn get(&self, id: &TenantId) -> EngineResult<Arc<Tenant>> {
        self.tenants
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| EngineError::not_found("tenant", id.0.clone()))
    }

    pub fn resolve_api_key(&self, key: &str) -> Option<TenantId> {
        self.api_keys.get(key).map(|e| e.clone())
    }

    pub fn all_tenant_ids(&self) -> Vec<TenantId> {
        self.tenants.iter().map(|e| e.key().clone()).collect()
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }
}

fn generate_api_key() -> String {
    let bytes: [u8; 24] = rand::thread_rng().gen();
    hex::encode(bytes)
}
