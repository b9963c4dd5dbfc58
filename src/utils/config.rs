//! Application configuration constants.
//! Polling intervals, protocol names and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    config_filename: String,
    stop_filename: String,
    pause_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                config_filename: format!("{pkg}.toml"),
                stop_filename: format!("{pkg}.stop"),
                pause_filename: format!("{pkg}.pause"),
            }
        })
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Default stop sentinel (presence requests a stop).
    pub fn stop_filename(&self) -> &str {
        &self.stop_filename
    }

    /// Default pause sentinel (presence pauses all workers).
    pub fn pause_filename(&self) -> &str {
        &self.pause_filename
    }
}

// ---- Polling ----

/// Intervals for the poll-with-sleep loops that keep workers responsive to stop requests.
pub struct PollConsts;

impl PollConsts {
    /// How often a blocked queue operation re-checks its cancellation token.
    pub const QUEUE_POLL: Duration = Duration::from_millis(100);
    /// How often a bounded join checks whether a thread has finished.
    pub const JOIN_POLL: Duration = Duration::from_millis(50);
    /// Slice used for the inter-loop sleep; stop is re-checked between slices.
    pub const SLEEP_SLICE: Duration = Duration::from_secs(5);
}

// ---- Remote store protocol ----

/// Header and path names of the HCP-style REST protocol.
pub struct StoreProtocol;

impl StoreProtocol {
    pub const GATEWAY: &'static str = "/rest";
    pub const LEGACY_AUTH_COOKIE: &'static str = "hcp-ns-auth";
    pub const AUTH_SCHEME: &'static str = "HCP";
    pub const VERSION_HEADER: &'static str = "X-HCP-SoftwareVersion";
    pub const CUSTOM_METADATA_HEADER: &'static str = "X-HCP-Custom-Metadata";
    pub const ANNOTATIONS_HEADER: &'static str = "X-HCP-CustomMetadataAnnotations";
    pub const HASH_HEADER: &'static str = "X-HCP-Hash";
    pub const SIZE_HEADER: &'static str = "X-HCP-Size";
    /// Store version from which combined object+metadata writes are accepted.
    pub const WHOLE_OBJECT_MIN_VERSION: (u32, u32) = (4, 1);
    /// Store version from which named annotations and the Authorization header are accepted.
    pub const ANNOTATIONS_MIN_VERSION: (u32, u32) = (6, 0);
}

/// Annotation name used when a store or generator does not name one.
pub const DEFAULT_ANNOTATION: &str = "default";

/// Read buffer for hashing source content (bytes).
pub const HASH_READ_BUFFER_SIZE: usize = 8 * 1024;
