//! Server-side configuration layering: engine defaults, optionally
//! overridden by a TOML file, then by `BARTER_`-prefixed environment
//! variables — the same `figment` composition the teacher's config
//! loading uses.

use anyhow::Result;
use barter_loop_engine::config::EngineLimits;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::cli::Opt;

pub(crate) fn load_engine_limits(opt: &Opt) -> Result<EngineLimits> {
    let mut figment = Figment::from(Serialized::defaults(EngineLimits::default()));
    if let Some(path) = &opt.engine_config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed("BARTER_").split("_"));
    let limits: EngineLimits = figment.extract()?;
    limits
        .scorer
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid scorer weights in configuration: {e}"))?;
    Ok(limits)
}
