#![deny(clippy::as_conversions)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use parking_lot::deadlock;
use pid1::Pid1Settings;

mod app;
mod auth;
mod cli;
mod config;
mod endpoints;
mod watcher;

use app::App;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    Pid1Settings::new().enable_log(true).launch()?;
    main_inner()
}

fn main_inner() -> Result<()> {
    dotenvy::dotenv().ok();

    let opt = cli::Opt::parse();
    opt.init_logger()?;

    // Background thread that checks for lock-order deadlocks every 10s.
    std::thread::spawn(move || loop {
        std::thread::sleep(std::time::Duration::from_secs(10));
        let deadlocks = deadlock::check_deadlock();
        if deadlocks.is_empty() {
            continue;
        }
        tracing::error!("{} deadlocks detected", deadlocks.len());
        for (i, threads) in deadlocks.iter().enumerate() {
            tracing::error!("Deadlock #{}", i);
            for t in threads {
                tracing::error!("Thread Id {:#?}", t.thread_id());
                tracing::error!("{:#?}", t.backtrace());
            }
        }
    });

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(16)
        .enable_all()
        .build()
        .unwrap()
        .block_on(run(opt))
}

async fn run(opt: cli::Opt) -> Result<()> {
    let limits = config::load_engine_limits(&opt)?;
    let admin_key = opt.admin_api_key.clone().unwrap_or_else(|| {
        use rand::Rng;
        let bytes: [u8; 24] = rand::thread_rng().gen();
        let generated = hex::encode(bytes);
        tracing::warn!(admin_api_key = %generated, "no ADMIN_API_KEY configured, generated one for this process");
        generated
    });

    let app = Arc::new(App::new(opt, limits, admin_key)?);

    if let Some(store) = app.snapshots.clone() {
        restore_tenants(&app, store.as_ref());
    }

    let (watcher_shutdown_tx, watcher_shutdown_rx) = tokio::sync::watch::channel(false);
    let watcher_app = app.clone();
    let watcher_handle = tokio::spawn(watcher::run(watcher_app, watcher_shutdown_rx));

    let result = endpoints::launch(app).await;

    let _ = watcher_shutdown_tx.send(true);
    let _ = watcher_handle.await;

    result
}

/// Best-effort restore of every tenant snapshot found in the persistence
/// store at startup (spec §6 "Persisted state layout"; the loop cache
/// itself is deliberately not restored — C8 rewarms it).
fn restore_tenants(app: &App, store: &dyn barter_loop_engine::snapshot::SnapshotStore) {
    let ids = match store.list_tenants() {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(error = %e, "failed to list persisted tenants, starting with an empty registry");
            return;
        }
    };
    for id in ids {
        let snapshot = match store.load(&id) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(tenant = %id, error = %e, "failed to load tenant snapshot, skipping");
                continue;
            }
        };
        match app.registry.restore_tenant(id.clone(), snapshot) {
            Ok(api_key) => {
                tracing::info!(tenant = %id, %api_key, "restored tenant from snapshot, minted new api key");
            }
            Err(e) => {
                tracing::error!(tenant = %id, error = %e, "failed to restore tenant snapshot, skipping");
            }
        }
    }
}
