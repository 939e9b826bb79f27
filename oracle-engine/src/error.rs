use thiserror::Error;

/// Validation failures raised by the draw and derivation core.
///
/// Every variant is detected before any seeded selection happens, and none of
/// them is transient: retrying the same call yields the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("invalid calendar date {input:?} (expected YYYY-MM-DD)")]
    InvalidDate { input: String },
    #[error("spread {spread} needs {requested} cards but the deck holds {available}")]
    SpreadTooLarge {
        spread: String,
        requested: usize,
        available: usize,
    },
    #[error("unknown topic {topic:?}")]
    UnknownTopic { topic: String },
    #[error("unknown spread {spread:?}")]
    UnknownSpread { spread: String },
    #[error("no cards left to draw ({excluded} of {deck} excluded)")]
    ExhaustedPool { deck: usize, excluded: usize },
}

/// Problems found while loading or validating catalog data.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse {source_name}: {error}")]
    Parse {
        source_name: &'static str,
        #[source]
        error: serde_json::Error,
    },
    #[error("card at position {position} has id {id}; ids must run 0..N in order")]
    CardOrder { position: usize, id: u16 },
    #[error("expected {expected} hexagrams, found {found}")]
    HexagramCount { expected: usize, found: usize },
    #[error("spread {spread} has no positions")]
    EmptySpread { spread: String },
    #[error(transparent)]
    Spread(#[from] OracleError),
    #[error("topic {topic} is missing a wuxing analysis for {phase}")]
    MissingAnalysis { topic: String, phase: &'static str },
    #[error("{pool} pool is empty")]
    EmptyPool { pool: &'static str },
    #[error("dream keyword entry references unknown card {card_id}")]
    UnknownDreamCard { card_id: u16 },
}

/// Compatibility session state transitions that were refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompatError {
    #[error("session {code} already has a second party")]
    AlreadyJoined { code: String },
    #[error("session {code} expired")]
    Expired { code: String },
    #[error("session {code} not found")]
    NotFound { code: String },
}

/// Rejected configuration documents or overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("environment variable {var} has unusable value {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Failures of the bundled store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors surfaced by services that combine the engine with a store.
#[derive(Debug, Error)]
pub enum ServiceError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Compat(#[from] CompatError),
    #[error("store request failed: {0}")]
    Store(#[source] E),
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A narration request the completion backend could not serve.
#[derive(Debug, Error)]
pub enum NarrativeError<E>
where
    E: std::error::Error + 'static,
{
    #[error("text completion failed: {0}")]
    Backend(#[source] E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = OracleError::InvalidDate {
            input: "2024-13-01".to_string(),
        };
        assert!(err.to_string().contains("2024-13-01"));

        let err = OracleError::SpreadTooLarge {
            spread: "grand".to_string(),
            requested: 30,
            available: 22,
        };
        assert_eq!(
            err.to_string(),
            "spread grand needs 30 cards but the deck holds 22"
        );
    }

    #[test]
    fn catalog_error_wraps_spread_errors() {
        let inner = OracleError::SpreadTooLarge {
            spread: "grand".to_string(),
            requested: 30,
            available: 22,
        };
        let err = CatalogError::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
    }
}
