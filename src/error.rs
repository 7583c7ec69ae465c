//! Error taxonomy for the barter engine (spec §7).
//!
//! `Timeout` is deliberately absent here: a wall-clock cap on `discover` is
//! not a failure, it is a partial result with `truncated = true` (see
//! [`crate::discover::DiscoveryOutcome`]).

use serde::Serialize;

/// Opaque id attached to `Internal` errors so an operator can correlate a
/// 500 response with the corresponding log line without leaking internals.
pub type IncidentId = String;

#[derive(thiserror::Error, Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error_id")]
pub enum EngineError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("resource exhausted: {resource} limit of {limit} reached for tenant")]
    ResourceExhausted { resource: &'static str, limit: u64 },

    #[error("internal error (incident {incident_id})")]
    Internal { incident_id: IncidentId },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn resource_exhausted(resource: &'static str, limit: u64) -> Self {
        EngineError::ResourceExhausted { resource, limit }
    }

    /// Builds an `Internal` error, logging the real cause under a fresh
    /// incident id. Any occurrence is a bug (spec §7); this is the only
    /// place the engine intentionally obscures a message from the caller.
    pub fn internal(context: &str, cause: impl std::fmt::Debug) -> Self {
        let incident_id = generate_incident_id();
        tracing::error!(incident_id = %incident_id, context, ?cause, "internal invariant violation");
        EngineError::Internal { incident_id }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Validation { .. } => 400,
            EngineError::NotFound { .. } => 404,
            EngineError::Unauthorized => 401,
            EngineError::ResourceExhausted { .. } => 429,
            EngineError::Internal { .. } => 500,
        }
    }
}

fn generate_incident_id() -> IncidentId {
    use rand::Rng;
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec() {
        assert_eq!(EngineError::validation("bad").http_status(), 400);
        assert_eq!(EngineError::not_found("wallet", "w1").http_status(), 404);
        assert_eq!(EngineError::Unauthorized.http_status(), 401);
        assert_eq!(
            EngineError::resource_exhausted("wallets", 10_000).http_status(),
            429
        );
    }

    #[test]
    fn serializes_with_error_id_tag() {
        let err = EngineError::validation("empty nft id");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error_id"], "validation");
        assert_eq!(json["message"], "empty nft id");
    }
}
