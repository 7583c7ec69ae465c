//! Spawns and retires one background discovery task (C8, [`barter_loop_engine::worker`])
//! per tenant, the server binary's generalization of the teacher's
//! `watcher.rs` `Watcher`/`JoinSet` machinery. The teacher's watcher is
//! wired up once at startup against a fixed set of markets; tenants here
//! are created and destroyed at runtime by admin calls, so the watcher
//! instead polls the registry on an interval and reconciles its spawned
//! set against it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use barter_loop_engine::model::TenantId;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::App;

/// How often the watcher reconciles its spawned workers against the live
/// tenant set. Tenant creation/destruction is infrequent relative to
/// discovery traffic, so this need not be tight.
const RECONCILE_INTERVAL: Duration = Duration::from_millis(500);

struct Spawned {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runs until `shutdown` fires, reconciling the set of spawned per-tenant
/// workers against `registry.all_tenant_ids()` every tick: new tenants get
/// a worker spawned, destroyed tenants have theirs signalled to stop.
pub(crate) async fn run(app: Arc<App>, mut shutdown: watch::Receiver<bool>) {
    let mut workers: HashMap<TenantId, Spawned> = HashMap::new();

    loop {
        reconcile(&app, &mut workers);

        tokio::select! {
            _ = tokio::time::sleep(RECONCILE_INTERVAL) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(tenants = workers.len(), "watcher shutting down, stopping per-tenant workers");
    for (_, spawned) in workers {
        let _ = spawned.shutdown.send(true);
        let _ = spawned.handle.await;
    }
}

fn reconcile(app: &Arc<App>, workers: &mut HashMap<TenantId, Spawned>) {
    let registry = &app.registry;
    let live: std::collections::HashSet<TenantId> = registry.all_tenant_ids().into_iter().collect();

    workers.retain(|id, spawned| {
        if live.contains(id) {
            true
        } else {
            tracing::debug!(tenant = %id, "tenant destroyed, stopping its worker");
            let _ = spawned.shutdown.send(true);
            false
        }
    });

    for id in &live {
        if workers.contains_key(id) {
            continue;
        }
        let Ok(tenant) = registry.get(id) else { continue };
        let settings = registry.limits().worker.clone();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(barter_loop_engine::worker::run(tenant, settings, rx));
        tracing::debug!(tenant = %id, "spawned background discovery worker");
        workers.insert(id.clone(), Spawned { shutdown: tx, handle });
    }
}
