//! Collaborator interfaces used by the crawl engine
//!
//! The engine never talks to the network or the DOM directly. It is handed a
//! `Transport`, a `Parser` and optionally a `Discovery`, so a different
//! source is a different set of implementations rather than a different
//! control flow.

use crate::storage::{ResultRecord, StorageError};
use async_trait::async_trait;
use thiserror::Error;

/// Failure performing one physical fetch
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Cannot build request for key {key}: {reason}")]
    InvalidKey { key: String, reason: String },
}

/// Failure turning fetched content into records
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed content: {0}")]
    Malformed(String),

    #[error("Invalid selector: {0}")]
    Selector(String),
}

/// Why a single item's attempt failed
///
/// Every variant ends up as `report_failure` on the item; none of them stop
/// the crawl.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("no content extracted")]
    EmptyContent,

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("stale claim: processing since {0}")]
    StaleClaim(String),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Fetches raw content for a key
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<String, TransportError>;
}

/// Turns raw content into zero or more records
pub trait Parser: Send + Sync {
    fn parse(&self, raw: &str, key: &str) -> Result<Vec<ResultRecord>, ParseError>;
}

/// Produces the initial keys for a start point
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn seed(&self, start: &str) -> crate::Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_error_messages() {
        assert_eq!(WorkerError::EmptyContent.to_string(), "no content extracted");

        let err = WorkerError::from(TransportError::Status {
            status: 503,
            url: "https://example.com/a".to_string(),
        });
        assert_eq!(err.to_string(), "HTTP 503 from https://example.com/a");

        let err = WorkerError::Panicked("index out of bounds".to_string());
        assert!(err.to_string().starts_with("worker panicked"));
    }
}
