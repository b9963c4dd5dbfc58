//! Error types for comet.
//!
//! Per-descriptor and per-item failures are classified here so the writer can tell a store
//! rejection (isolated to one descriptor) from a local I/O failure (aborts the item).

use thiserror::Error;

/// Cooperative cancellation: a stop was requested or the owning pool is shutting down.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stop requested")]
pub struct Cancelled;

#[derive(Error, Debug)]
pub enum CometError {
    /// Invalid or conflicting configuration; raised before any worker starts.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("stop requested")]
    Cancelled,

    /// Store replied with an unexpected status.
    #[error("unexpected status returned from {method} ({status}: {reason})")]
    Store {
        method: &'static str,
        status: u16,
        reason: String,
    },

    #[error("expected HTTP header {0} is missing from response")]
    MissingHeader(&'static str),

    #[error("unexpected {header} header format: {value}")]
    MalformedHeader { header: &'static str, value: String },

    #[error("hash algorithm not supported: {0}")]
    UnsupportedHash(String),

    #[error("store hash ({expected}) does not match computed hash ({computed})")]
    HashMismatch { expected: String, computed: String },

    #[error("descriptor uses named annotations but the store version does not support them")]
    AnnotationsUnsupported,

    /// Host is not of the form `namespace.tenant.store-name`.
    #[error("invalid store host: {0}")]
    InvalidHost(String),

    #[error("cannot map {0} onto a destination path")]
    Unmappable(String),

    #[error("listing line rejected: {0}")]
    Listing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<Cancelled> for CometError {
    fn from(_: Cancelled) -> Self {
        CometError::Cancelled
    }
}

impl CometError {
    /// True for failures of the local source (unreadable, vanished) rather than the store.
    pub fn is_local_io(&self) -> bool {
        matches!(self, CometError::Io(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CometError::Cancelled)
    }
}
