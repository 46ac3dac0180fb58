//! Error types for XbrlKit.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored blob content does not match its recorded hash. Indicates
    /// corruption, never retried.
    #[error("Integrity error: hash mismatch for {0}")]
    Integrity(String),

    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    /// Fetch failure that may succeed on retry (timeout, 5xx, connection).
    #[error("Transient fetch failure for {url}: {reason}")]
    FetchTransient { url: String, reason: String },

    /// Fetch failure that will not succeed on retry (404, 4xx, bad URL).
    #[error("Permanent fetch failure for {url}: {reason}")]
    FetchPermanent { url: String, reason: String },

    /// A DTS resolution pass visited more nodes than its configured budget.
    /// Kept distinct so operators can tell pathological taxonomies apart
    /// from ordinary failures.
    #[error("Resolution budget exceeded: visited {visited} nodes (budget {budget})")]
    BudgetExceeded { visited: usize, budget: usize },

    /// A registry state transition that the lifecycle does not allow.
    #[error("Invalid status transition: {entity} {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a bounded retry is worthwhile for this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::FetchTransient { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let t = Error::FetchTransient {
            url: "http://example.com/a.xsd".into(),
            reason: "timeout".into(),
        };
        let p = Error::FetchPermanent {
            url: "http://example.com/a.xsd".into(),
            reason: "404".into(),
        };
        assert!(t.is_transient());
        assert!(!p.is_transient());
        assert!(!Error::Integrity("abc".into()).is_transient());
    }
}
