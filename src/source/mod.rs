//! Item sources: where a scanner worker gets the items of one container.

pub mod listing;
pub mod tree_walker;

use std::path::Path;

use crate::error::{Cancelled, CometError};
use crate::types::WorkItem;
use crate::utils::settings::{ScannerKind, ScannerSettings};

pub use listing::{CallDirection, CallRecord, ListingReader};
pub use tree_walker::TreeWalker;

/// Lets a source wait for outstanding items before yielding something order-sensitive.
pub trait CompletionDrain {
    /// Block until every submitted item has come back; returns how many were processed.
    fn finalize_complete_items(&mut self) -> Result<u64, Cancelled>;
}

pub enum ItemSource {
    Tree(TreeWalker),
    Listing(ListingReader),
}

impl ItemSource {
    pub fn build(settings: &ScannerSettings) -> Result<Self, CometError> {
        match settings.kind {
            ScannerKind::Tree => Ok(ItemSource::Tree(TreeWalker::new(settings))),
            ScannerKind::Listing => {
                let file = settings.listing_file.as_ref().ok_or_else(|| {
                    CometError::Config("listing scanner requires scanner.listing_file".to_string())
                })?;
                Ok(ItemSource::Listing(ListingReader::new(file, settings)))
            }
        }
    }

    /// Reset for a new container. Errors here fail the whole assignment.
    pub fn initialize(&mut self, base: &Path, start_trigger: Option<&Path>) -> Result<(), CometError> {
        match self {
            ItemSource::Tree(w) => {
                w.initialize(base, start_trigger);
                Ok(())
            }
            ItemSource::Listing(r) => r.initialize(base, start_trigger),
        }
    }

    /// Next item, or `None` once the container is exhausted.
    pub fn next_item(
        &mut self,
        drain: &mut dyn CompletionDrain,
    ) -> Result<Option<WorkItem>, CometError> {
        match self {
            ItemSource::Tree(w) => w.next_item(drain),
            ItemSource::Listing(r) => r.next_item(),
        }
    }
}

/// Delete a source entity; with `force`, make it writable and try once more.
pub fn delete_source_item(item: &WorkItem, force: bool) -> Result<(), CometError> {
    match item.delete() {
        Ok(()) => Ok(()),
        Err(first) if force => {
            log::debug!("Delete of {} failed ({}); retrying writable", item.name(), first);
            if item.set_writable()? {
                item.delete()
            } else {
                Err(first)
            }
        }
        Err(e) => Err(e),
    }
}
