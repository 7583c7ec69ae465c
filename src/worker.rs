//! C8: the background discovery worker. One logical cooperative task per
//! tenant, modeled on the teacher's `watch_periodic` pattern: wake on a
//! signal or a timeout, do one unit of work, yield.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::WorkerSettings;
use crate::discover::{discover, Seed};
use crate::tenant::Tenant;

/// Runs until `shutdown` fires. Intended to be spawned with
/// `tokio::spawn` once per tenant at creation time (or as one task that
/// round-robins tenants in a simpler single-process deployment — the
/// server binary's `watcher.rs` chooses which).
pub async fn run(tenant: Arc<Tenant>, settings: WorkerSettings, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        tenant.enforce_watermark(settings.active_set_watermark);

        match tenant.pop_dirty() {
            Some((wallet, reason)) => {
                debug!(tenant = %tenant.id, %wallet, ?reason, "worker refilling cache for dirty wallet");
                let outcome = discover(&tenant, Seed::Wallet(wallet.clone()), Default::default()).await;
                if outcome.truncated {
                    warn!(tenant = %tenant.id, %wallet, "worker discovery truncated by budget");
                }
                tenant.complete_in_flight(&wallet);
            }
            None => {
                tokio::select! {
                    _ = tenant.dirty_signal.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(settings.idle_sleep_ms)) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!(tenant = %tenant.id, "worker shutting down");
                            return;
                        }
                    }
                }
            }
        }

        if *shutdown.borrow() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineLimits;
    use crate::model::{CollectionId, NftId, NftMetadata, TenantId, WalletId};

    #[tokio::test]
    async fn worker_drains_dirty_queue_and_warms_cache() {
        let limits = EngineLimits::default();
        let tenant = Arc::new(Tenant::new(TenantId("t1".into()), &limits));
        tenant
            .graph
            .add_nft(NftId("n1".into()), WalletId("a".into()), CollectionId("c".into()), NftMetadata::default())
            .unwrap();
        tenant
            .graph
            .add_nft(NftId("n2".into()), WalletId("b".into()), CollectionId("c".into()), NftMetadata::default())
            .unwrap();
        tenant.graph.add_want_nft(WalletId("a".into()), NftId("n2".into()));
        let markers = tenant.graph.add_want_nft(WalletId("b".into()), NftId("n1".into()));
        tenant.apply_dirty_markers(markers, limits.max_dirty_queue_depth).unwrap();
        assert_eq!(tenant.dirty_queue_len(), 1);

        let (tx, rx) = tokio::sync::watch::channel(false);
        let worker_tenant = tenant.clone();
        let handle = tokio::spawn(run(worker_tenant, limits.worker.clone(), rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let _ = handle.await;

        assert_eq!(tenant.dirty_queue_len(), 0);
    }
}
