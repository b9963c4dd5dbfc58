//! Per-assignment and global write statistics.

use log::Level;

use crate::types::WriteStatus;

/// Counters for one status category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub success: u64,
    pub partial_success: u64,
    pub failure: u64,
    pub not_processed: u64,
}

impl StatusCounts {
    fn merge(&mut self, other: &StatusCounts) {
        self.success += other.success;
        self.partial_success += other.partial_success;
        self.failure += other.failure;
        self.not_processed += other.not_processed;
    }

    fn subtract(&mut self, other: &StatusCounts) {
        self.success = self.success.saturating_sub(other.success);
        self.partial_success = self.partial_success.saturating_sub(other.partial_success);
        self.failure = self.failure.saturating_sub(other.failure);
        self.not_processed = self.not_processed.saturating_sub(other.not_processed);
    }

    pub fn total(&self) -> u64 {
        self.success + self.partial_success + self.failure + self.not_processed
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub object: StatusCounts,
    pub metadata: StatusCounts,
}

impl Statistics {
    /// Count one completed item. Partial success is a metadata-only outcome; `NotSet` is not counted.
    pub fn update(&mut self, object: WriteStatus, metadata: WriteStatus) {
        match object {
            WriteStatus::Success => self.object.success += 1,
            WriteStatus::Failure => self.object.failure += 1,
            WriteStatus::NotAttempted => self.object.not_processed += 1,
            WriteStatus::PartialSuccess | WriteStatus::NotSet => {}
        }
        match metadata {
            WriteStatus::Success => self.metadata.success += 1,
            WriteStatus::PartialSuccess => self.metadata.partial_success += 1,
            WriteStatus::Failure => self.metadata.failure += 1,
            WriteStatus::NotAttempted => self.metadata.not_processed += 1,
            WriteStatus::NotSet => {}
        }
    }

    pub fn merge(&mut self, other: &Statistics) {
        self.object.merge(&other.object);
        self.metadata.merge(&other.metadata);
    }

    /// Counts accumulated since `earlier` was taken.
    pub fn subtract(&mut self, earlier: &Statistics) {
        self.object.subtract(&earlier.object);
        self.metadata.subtract(&earlier.metadata);
    }

    pub fn reset(&mut self) {
        *self = Statistics::default();
    }

    pub fn log_stats(&self, label: &str) {
        self.log_stats_at(Level::Info, label);
    }

    pub fn log_stats_at(&self, level: Level, label: &str) {
        let o = &self.object;
        let m = &self.metadata;
        log::log!(
            level,
            "{}:\n                     (Success, Partial Success, Failure, Not Processed)\n    Object:          ({}, {}, {}, {})\n    Custom Metadata: ({}, {}, {}, {})",
            label,
            o.success,
            o.partial_success,
            o.failure,
            o.not_processed,
            m.success,
            m.partial_success,
            m.failure,
            m.not_processed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_each_category_independently() {
        let mut s = Statistics::default();
        s.update(WriteStatus::Success, WriteStatus::Failure);
        s.update(WriteStatus::NotAttempted, WriteStatus::PartialSuccess);
        s.update(WriteStatus::NotSet, WriteStatus::NotSet);
        assert_eq!(s.object.success, 1);
        assert_eq!(s.object.not_processed, 1);
        assert_eq!(s.object.total(), 2);
        assert_eq!(s.metadata.failure, 1);
        assert_eq!(s.metadata.partial_success, 1);
    }

    #[test]
    fn merge_adds_counts() {
        let mut total = Statistics::default();
        let mut a = Statistics::default();
        a.update(WriteStatus::Success, WriteStatus::Success);
        total.merge(&a);
        total.merge(&a);
        assert_eq!(total.object.success, 2);
        assert_eq!(total.metadata.success, 2);
        total.reset();
        assert_eq!(total, Statistics::default());
    }
}
