//! Work items and their transfer status.

use crossbeam_channel::Sender;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::error::CometError;
use crate::processor::store::{Auth, RemoteStore};
use crate::source::listing::CallRecord;

/// Outcome of one write category (object content or custom metadata) for an item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WriteStatus {
    #[default]
    NotSet,
    NotAttempted,
    Success,
    /// Only meaningful for metadata: some annotations written before one failed.
    PartialSuccess,
    Failure,
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriteStatus::NotSet => "NOT_SET",
            WriteStatus::NotAttempted => "WRITE_NOT_ATTEMPTED",
            WriteStatus::Success => "WRITE_SUCCESS",
            WriteStatus::PartialSuccess => "WRITE_PARTIAL_SUCCESS",
            WriteStatus::Failure => "WRITE_FAILURE",
        };
        f.write_str(s)
    }
}

/// Dual status of an item plus the first captured failure cause.
#[derive(Debug, Default)]
pub struct ItemStatus {
    pub object: WriteStatus,
    pub metadata: WriteStatus,
    error: Option<anyhow::Error>,
}

impl ItemStatus {
    /// Record the failure cause. Only the first one per run is kept.
    pub fn set_error(&mut self, err: impl Into<anyhow::Error>) {
        if self.error.is_none() {
            self.error = Some(err.into());
        }
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    /// Mark whichever category the processor never touched as failed.
    pub fn fail_unset(&mut self) {
        if self.object == WriteStatus::NotSet {
            self.object = WriteStatus::Failure;
        }
        if self.metadata == WriteStatus::NotSet {
            self.metadata = WriteStatus::Failure;
        }
    }

    /// Status classification without the error, for comparisons across runs.
    pub fn pair(&self) -> (WriteStatus, WriteStatus) {
        (self.object, self.metadata)
    }
}

/// Object in the remote store used as a source item.
#[derive(Clone)]
pub struct RemoteObject {
    pub url: Url,
    pub credentials: String,
    pub store: Arc<dyn RemoteStore>,
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

/// The source entity an item refers to.
#[derive(Clone, Debug)]
pub enum ItemHandle {
    /// Absolute file path and the base directory it is relative to.
    File { path: PathBuf, base: PathBuf },
    Remote(RemoteObject),
}

/// Unit of work flowing from a scanner to a processor and back through its completion channel.
#[derive(Debug)]
pub struct WorkItem {
    pub handle: ItemHandle,
    pub status: ItemStatus,
    /// Parsed listing record, when the item came from a listing file.
    pub record: Option<CallRecord>,
    completion: Option<Sender<WorkItem>>,
}

impl WorkItem {
    pub fn file(path: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self::new(ItemHandle::File {
            path: path.into(),
            base: base.into(),
        })
    }

    pub fn remote(url: Url, credentials: impl Into<String>, store: Arc<dyn RemoteStore>) -> Self {
        Self::new(ItemHandle::Remote(RemoteObject {
            url,
            credentials: credentials.into(),
            store,
        }))
    }

    fn new(handle: ItemHandle) -> Self {
        WorkItem {
            handle,
            status: ItemStatus::default(),
            record: None,
            completion: None,
        }
    }

    pub fn with_record(mut self, record: CallRecord) -> Self {
        self.record = Some(record);
        self
    }

    pub fn set_completion(&mut self, tx: Sender<WorkItem>) {
        self.completion = Some(tx);
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// Hand the item to whoever owns its completion channel. Consumes the item so it can only happen once.
    pub fn mark_processed(mut self) {
        if let Some(tx) = self.completion.take() {
            let name = self.name();
            if tx.send(self).is_err() {
                log::debug!("Completion receiver gone, dropping notification for {}", name);
            }
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        match &self.handle {
            ItemHandle::File { path, .. } => Some(path),
            ItemHandle::Remote(_) => None,
        }
    }

    pub fn base(&self) -> Option<&Path> {
        match &self.handle {
            ItemHandle::File { base, .. } => Some(base),
            ItemHandle::Remote(_) => None,
        }
    }

    pub fn name(&self) -> String {
        match &self.handle {
            ItemHandle::File { path, .. } => path.display().to_string(),
            ItemHandle::Remote(obj) => obj.url.to_string(),
        }
    }

    pub fn exists(&self) -> Result<bool, CometError> {
        match &self.handle {
            ItemHandle::File { path, .. } => Ok(path.exists()),
            ItemHandle::Remote(obj) => {
                let resp = obj
                    .store
                    .head(&obj.url, &Auth::Authorization(obj.credentials.clone()))?;
                if resp.status == 404 {
                    return Ok(false);
                }
                resp.ensure_success("HEAD")?;
                Ok(true)
            }
        }
    }

    pub fn delete(&self) -> Result<(), CometError> {
        match &self.handle {
            ItemHandle::File { path, .. } if path.is_dir() => Ok(std::fs::remove_dir(path)?),
            ItemHandle::File { path, .. } => Ok(std::fs::remove_file(path)?),
            ItemHandle::Remote(obj) => {
                let resp = obj
                    .store
                    .delete(&obj.url, &Auth::Authorization(obj.credentials.clone()))?;
                resp.ensure_success("DELETE")
            }
        }
    }

    /// Make the source writable so a retried delete can succeed. Returns false when unsupported.
    pub fn set_writable(&self) -> Result<bool, CometError> {
        match &self.handle {
            ItemHandle::File { path, .. } => {
                let mut perms = std::fs::metadata(path)?.permissions();
                make_owner_writable(&mut perms);
                std::fs::set_permissions(path, perms)?;
                Ok(true)
            }
            ItemHandle::Remote(_) => Ok(false),
        }
    }

    pub fn is_container(&self) -> bool {
        match &self.handle {
            ItemHandle::File { path, .. } => path.is_dir(),
            ItemHandle::Remote(_) => true,
        }
    }

    /// True when this item's path lies under `parent`'s path. Remote objects have no parent.
    pub fn is_child_of(&self, parent: &WorkItem) -> bool {
        match (self.file_path(), parent.file_path()) {
            (Some(child), Some(parent)) => child.starts_with(parent),
            _ => false,
        }
    }

    pub fn open_content(&self) -> Result<Box<dyn Read + Send>, CometError> {
        match &self.handle {
            ItemHandle::File { path, .. } => Ok(Box::new(File::open(path)?)),
            ItemHandle::Remote(obj) => Err(CometError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("no content stream for remote object {}", obj.url),
            ))),
        }
    }

    pub fn content_len(&self) -> Result<u64, CometError> {
        match &self.handle {
            ItemHandle::File { path, .. } => Ok(std::fs::metadata(path)?.len()),
            ItemHandle::Remote(_) => Ok(0),
        }
    }
}

#[cfg(unix)]
fn make_owner_writable(perms: &mut std::fs::Permissions) {
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(perms.mode() | 0o200);
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn make_owner_writable(perms: &mut std::fs::Permissions) {
    perms.set_readonly(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_wins() {
        let mut status = ItemStatus::default();
        status.set_error(anyhow::anyhow!("first"));
        status.set_error(anyhow::anyhow!("second"));
        assert_eq!(status.error().unwrap().to_string(), "first");
    }

    #[test]
    fn fail_unset_keeps_recorded_outcomes() {
        let mut status = ItemStatus {
            object: WriteStatus::Success,
            ..Default::default()
        };
        status.fail_unset();
        assert_eq!(status.pair(), (WriteStatus::Success, WriteStatus::Failure));
    }

    #[test]
    fn mark_processed_notifies_once() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut item = WorkItem::file("/tmp/a", "/tmp");
        item.set_completion(tx);
        item.mark_processed();
        let back = rx.try_recv().unwrap();
        assert!(!back.has_completion());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn child_of_compares_components() {
        let parent = WorkItem::file("/data/in", "/data/in");
        assert!(WorkItem::file("/data/in/2023/a.wav", "/data/in").is_child_of(&parent));
        assert!(!WorkItem::file("/data/input/a.wav", "/data/input").is_child_of(&parent));
    }
}
