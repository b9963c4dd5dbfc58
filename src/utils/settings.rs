//! Resolved run configuration. Built once at startup (file + CLI) and shared by every component.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::format::{Item, StrftimeItems};
use md5::{Digest, Md5};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CometError;
use crate::generator::Destination;
use crate::utils::config::{DEFAULT_ANNOTATION, PackagePaths};

/// Loop count meaning "run until stopped".
pub const INFINITE_LOOPS: i64 = -1;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CometConfig {
    #[serde(rename = "comet")]
    pub run: RunSettings,
    pub scanner: ScannerSettings,
    pub processor: ProcessorSettings,
    pub generator: GeneratorSettings,
}

/// One configured source container and its optional resume point.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SourceSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub start_trigger: Option<PathBuf>,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SourceSpec {
            path: path.into(),
            start_trigger: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub sources: Vec<SourceSpec>,
    /// Number of passes over the sources; [`INFINITE_LOOPS`] runs until stopped.
    pub loop_count: i64,
    pub loop_sleep_secs: u64,
    pub stop_file: PathBuf,
    pub pause_file: PathBuf,
    pub pause_sleep_secs: u64,
    /// Poll interval while waiting for container completions.
    pub completion_poll_ms: u64,
    /// Log periodic statistics every N completed items.
    pub stats_threshold: u64,
    pub delete_on_success: bool,
    pub delete_on_not_attempted: bool,
    pub verbose: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        let paths = PackagePaths::get();
        RunSettings {
            sources: Vec::new(),
            loop_count: INFINITE_LOOPS,
            loop_sleep_secs: 60,
            stop_file: PathBuf::from(paths.stop_filename()),
            pause_file: PathBuf::from(paths.pause_filename()),
            pause_sleep_secs: 5,
            completion_poll_ms: 500,
            stats_threshold: 1000,
            delete_on_success: false,
            delete_on_not_attempted: false,
            verbose: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ScannerKind {
    #[default]
    Tree,
    Listing,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    pub kind: ScannerKind,
    /// Listing file read by the listing scanner.
    pub listing_file: Option<PathBuf>,
    pub max_threads: usize,
    /// Capacity of each scanner worker's completion channel.
    pub task_queue_size: usize,
    pub max_submit_wait_secs: u64,
    pub completion_poll_ms: u64,
    /// Outstanding count above which completions are drained proactively.
    pub check_complete_threshold: u64,
    /// Max completions drained per drain call.
    pub completion_processing_threshold: u64,
    pub max_join_wait_secs: u64,
    pub load_sleep_ms: u64,
    pub item_inclusion: Vec<String>,
    pub item_exclusion: Vec<String>,
    pub write_last: Vec<String>,
    pub sort_items: bool,
    pub sort_containers: bool,
    pub force_delete: bool,
    pub delete_empty_containers: bool,
    pub follow_links: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        ScannerSettings {
            kind: ScannerKind::Tree,
            listing_file: None,
            max_threads: 5,
            task_queue_size: 100,
            max_submit_wait_secs: 2,
            completion_poll_ms: 500,
            check_complete_threshold: 50,
            completion_processing_threshold: 100,
            max_join_wait_secs: 20,
            load_sleep_ms: 0,
            item_inclusion: Vec::new(),
            item_exclusion: Vec::new(),
            write_last: Vec::new(),
            sort_items: true,
            sort_containers: true,
            force_delete: false,
            delete_empty_containers: false,
            follow_links: false,
        }
    }
}

impl ScannerSettings {
    pub fn submit_wait(&self) -> Duration {
        Duration::from_secs(self.max_submit_wait_secs)
    }

    pub fn completion_poll(&self) -> Duration {
        Duration::from_millis(self.completion_poll_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessorKind {
    Echo,
    #[default]
    Remote,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: Option<u64>,
    pub max_connections_per_route: Option<usize>,
    /// Log every store response's headers at debug level.
    pub dump_headers: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProcessorSettings {
    pub kind: ProcessorKind,
    pub threads: usize,
    pub task_queue_size: usize,
    pub max_join_wait_secs: u64,
    pub load_sleep_ms: u64,
    pub validate_hash: bool,
    pub http: HttpSettings,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        ProcessorSettings {
            kind: ProcessorKind::Remote,
            threads: 25,
            task_queue_size: 1000,
            max_join_wait_secs: 20,
            load_sleep_ms: 0,
            validate_hash: false,
            http: HttpSettings::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GeneratorKind {
    FileInfo,
    CallRecord,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// Generators consulted in order; the first non-empty result wins.
    pub modules: Vec<GeneratorKind>,
    /// chrono format string for `MetaDataWriteTime`.
    pub date_format: String,
    pub shred_pattern: String,
    pub retention_pattern: String,
    pub retention_value: String,
    pub destinations: Vec<DestinationSettings>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            modules: vec![GeneratorKind::FileInfo],
            date_format: "%Y/%m/%d %H:%M:%S%z".to_string(),
            shred_pattern: String::new(),
            retention_pattern: String::new(),
            retention_value: String::new(),
            destinations: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DestinationSettings {
    /// e.g. `https://ns1.tenant.hcp.example.com/rest/ingest`
    pub root_path: String,
    pub user: String,
    pub password: String,
    /// Password is already the store's hex digest form.
    pub password_encoded: bool,
    pub index: Option<bool>,
    pub hold: Option<bool>,
    pub annotation: String,
    pub append_trailing_folder: bool,
    pub delete_metadata_on_empty: bool,
    pub update_custom_metadata: bool,
    pub update_system_metadata: bool,
}

impl Default for DestinationSettings {
    fn default() -> Self {
        DestinationSettings {
            root_path: String::new(),
            user: String::new(),
            password: String::new(),
            password_encoded: false,
            index: None,
            hold: None,
            annotation: DEFAULT_ANNOTATION.to_string(),
            append_trailing_folder: false,
            delete_metadata_on_empty: false,
            update_custom_metadata: false,
            update_system_metadata: false,
        }
    }
}

impl DestinationSettings {
    /// `base64(user):md5hex(password)` as the store expects in its auth header and cookie.
    pub fn credentials(&self) -> String {
        let digest = if self.password_encoded {
            self.password.clone()
        } else {
            format!("{:x}", Md5::digest(self.password.as_bytes()))
        };
        format!("{}:{}", BASE64.encode(self.user.as_bytes()), digest)
    }
}

fn check_date_format(format: &str) -> Result<(), CometError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(CometError::Config(format!(
            "generator.date_format is not a valid strftime format: {:?}",
            format
        )));
    }
    Ok(())
}

impl CometConfig {
    /// Pre-flight checks. Any error here aborts before a single worker starts.
    pub fn validate(&self) -> Result<(), CometError> {
        let run = &self.run;
        if run.loop_count < INFINITE_LOOPS {
            return Err(CometError::Config(format!(
                "loop_count must be -1 (infinite) or >= 0, got {}",
                run.loop_count
            )));
        }
        if run.loop_count == INFINITE_LOOPS && !run.delete_on_success {
            return Err(CometError::Config(
                "infinite loop_count requires delete_on_success = true; otherwise every pass re-sends the same items"
                    .to_string(),
            ));
        }
        if self.scanner.kind == ScannerKind::Listing && self.scanner.listing_file.is_none() {
            return Err(CometError::Config(
                "listing scanner requires scanner.listing_file".to_string(),
            ));
        }
        if self.processor.threads == 0 || self.processor.task_queue_size == 0 {
            return Err(CometError::Config(
                "processor.threads and processor.task_queue_size must be positive".to_string(),
            ));
        }
        if self.scanner.task_queue_size == 0 {
            return Err(CometError::Config(
                "scanner.task_queue_size must be positive".to_string(),
            ));
        }
        if self.processor.kind == ProcessorKind::Remote {
            if self.generator.destinations.is_empty() {
                return Err(CometError::Config(
                    "remote processor requires at least one [[generator.destinations]] entry"
                        .to_string(),
                ));
            }
            for dest in &self.generator.destinations {
                Destination::from_settings(dest)?;
            }
        }
        check_date_format(&self.generator.date_format)?;
        Ok(())
    }
}
