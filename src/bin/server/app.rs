use std::sync::Arc;

use anyhow::Result;
use barter_loop_engine::config::EngineLimits;
use barter_loop_engine::snapshot::{FsSnapshotStore, SnapshotStore};
use barter_loop_engine::tenant::TenantRegistry;

use crate::cli::Opt;

pub(crate) struct App {
    pub(crate) opt: Opt,
    pub(crate) registry: TenantRegistry,
    pub(crate) snapshots: Option<Arc<dyn SnapshotStore>>,
    /// Admin-scoped key; a separate, out-of-band secret rather than a
    /// tenant key, checked by the `/admin/*` routes.
    pub(crate) admin_key: String,
}

impl App {
    pub(crate) fn new(opt: Opt, limits: EngineLimits, admin_key: String) -> Result<Self> {
        let snapshots: Option<Arc<dyn SnapshotStore>> = if opt.enable_persistence {
            Some(Arc::new(FsSnapshotStore::new(opt.data_dir.clone())?))
        } else {
            None
        };
        let registry = TenantRegistry::new(limits, opt.max_tenants);
        Ok(App {
            opt,
            registry,
            snapshots,
            admin_key,
        })
    }
}
