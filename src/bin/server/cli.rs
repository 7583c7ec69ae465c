use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Process-level settings (spec §6 "CLI/env"). Everything engine-internal
/// (resource caps, discovery defaults, scorer weights) lives in
/// [`crate::config`]'s layered file, not here.
#[derive(clap::Parser, Clone)]
pub(crate) struct Opt {
    #[clap(long, short)]
    pub(crate) verbose: bool,

    #[clap(long, default_value = "0.0.0.0:3000", env = "PORT", global = true)]
    pub(crate) bind: SocketAddr,

    #[clap(long, env = "DATA_DIR", default_value = "./data")]
    pub(crate) data_dir: PathBuf,

    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub(crate) log_level: String,

    #[clap(long, env = "ENABLE_PERSISTENCE", default_value_t = false)]
    pub(crate) enable_persistence: bool,

    #[clap(long, env = "MAX_TENANTS", default_value_t = 1_000)]
    pub(crate) max_tenants: u64,

    #[clap(long, env = "DEFAULT_TIMEOUT_MS", default_value_t = 500)]
    pub(crate) default_timeout_ms: u64,

    /// Optional TOML file layered between the engine's built-in defaults
    /// and the `BARTER_`-prefixed environment overrides.
    #[clap(long, env = "ENGINE_CONFIG_FILE")]
    pub(crate) engine_config_file: Option<PathBuf>,

    /// Admin-scoped API key required by `/admin/*` routes. Generated
    /// randomly and logged once at startup if not provided.
    #[clap(long, env = "ADMIN_API_KEY")]
    pub(crate) admin_api_key: Option<String>,
}

impl Opt {
    pub(crate) fn init_logger(&self) -> anyhow::Result<()> {
        let env_directive = if self.verbose {
            format!("{}=debug,info", env!("CARGO_CRATE_NAME")).parse()?
        } else {
            self.log_level.parse().unwrap_or(Level::INFO.into())
        };

        tracing_subscriber::registry()
            .with(
                fmt::Layer::default()
                    .log_internal_errors(true)
                    .and_then(EnvFilter::from_default_env().add_directive(env_directive)),
            )
            .init();
        tracing::info!("logging initialized");
        Ok(())
    }
}
