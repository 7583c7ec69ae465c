//! Barter loop discovery engine: a multi-tenant directed "wants" graph over
//! NFT ownership, with a pipeline that finds, validates, scores, and caches
//! closed trade cycles.
//!
//! Module map (spec component names in parens):
//! - [`model`] — core entities
//! - [`error`] — error taxonomy
//! - [`config`] — engine-internal tunables
//! - [`graph`] — per-tenant graph store (C1)
//! - [`scc`] — strongly-connected-components partitioner (C2)
//! - [`cycles`] — elementary-cycle enumerator (C3)
//! - [`validate`] — loop validator (C4)
//! - [`score`] — composite loop scorer (C5)
//! - [`discover`] — discovery orchestrator (C6)
//! - [`cache`] — loop cache (C7)
//! - [`worker`] — background discovery worker (C8)
//! - [`mutation`] — mutation router (C9)
//! - [`tenant`] — tenant registry and dirty-queue state machine
//! - [`fingerprint`] — canonical loop fingerprinting
//! - [`snapshot`] — persistence adapter

pub mod cache;
pub mod config;
pub mod cycles;
pub mod discover;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod model;
pub mod mutation;
pub mod scc;
pub mod score;
pub mod snapshot;
pub mod tenant;
pub mod validate;
pub mod worker;
