//! Depth-first filesystem source.
//!
//! Each directory becomes a frame holding its filtered files, deferred write-last files and
//! subdirectories. Files are yielded before write-last files, which are yielded before descending.
//! An optional start trigger skips everything ordered before a resume path.

use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{CompletionDrain, delete_source_item};
use crate::error::CometError;
use crate::types::WorkItem;
use crate::utils::patterns::{ItemFilter, compile_globs};
use crate::utils::settings::ScannerSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WalkState {
    NoContext,
    InFrame,
    Exhausted,
}

#[derive(Debug)]
struct Frame {
    dir: PathBuf,
    files: VecDeque<PathBuf>,
    write_last: VecDeque<PathBuf>,
    subdirs: VecDeque<PathBuf>,
    files_sorted: bool,
}

pub struct TreeWalker {
    filter: ItemFilter,
    write_last: Option<Regex>,
    sort_items: bool,
    sort_containers: bool,
    delete_empty_containers: bool,
    force_delete: bool,
    follow_links: bool,
    base: PathBuf,
    /// Pending resume point; `None` once it fired or when none was configured.
    trigger: Option<PathBuf>,
    stack: Vec<Frame>,
    state: WalkState,
}

impl TreeWalker {
    pub fn new(settings: &ScannerSettings) -> Self {
        TreeWalker {
            filter: ItemFilter::new(&settings.item_inclusion, &settings.item_exclusion),
            write_last: compile_globs(&settings.write_last),
            sort_items: settings.sort_items,
            sort_containers: settings.sort_containers,
            delete_empty_containers: settings.delete_empty_containers,
            force_delete: settings.force_delete,
            follow_links: settings.follow_links,
            base: PathBuf::new(),
            trigger: None,
            stack: Vec::new(),
            state: WalkState::Exhausted,
        }
    }

    pub fn initialize(&mut self, base: &Path, start_trigger: Option<&Path>) {
        self.base = base.to_path_buf();
        self.stack.clear();
        self.state = WalkState::NoContext;
        self.trigger = match start_trigger {
            Some(t) if t.starts_with(base) => Some(t.to_path_buf()),
            Some(t) => {
                log::warn!(
                    "Start trigger {} is not under {}; scanning from the beginning",
                    t.display(),
                    base.display()
                );
                None
            }
            None => None,
        };
    }

    pub fn next_item(
        &mut self,
        drain: &mut dyn CompletionDrain,
    ) -> Result<Option<WorkItem>, CometError> {
        match self.state {
            WalkState::Exhausted => return Ok(None),
            WalkState::NoContext => {
                if !self.base.is_dir() {
                    log::warn!(
                        "Source {} does not exist or is not a directory",
                        self.base.display()
                    );
                    self.state = WalkState::Exhausted;
                    return Ok(None);
                }
                let frame = self.open_frame(self.base.clone());
                self.stack.push(frame);
                self.state = WalkState::InFrame;
            }
            WalkState::InFrame => {}
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                self.state = WalkState::Exhausted;
                return Ok(None);
            };
            if let Some(file) = frame.files.pop_front() {
                return Ok(Some(WorkItem::file(file, &self.base)));
            }
            if !frame.write_last.is_empty() {
                drain.finalize_complete_items()?;
                if let Some(file) = frame.write_last.pop_front() {
                    return Ok(Some(WorkItem::file(file, &self.base)));
                }
            }
            if let Some(sub) = frame.subdirs.pop_front() {
                let child = self.open_frame(sub);
                self.stack.push(child);
                continue;
            }
            let Some(done) = self.stack.pop() else {
                continue;
            };
            if self.delete_empty_containers && done.dir != self.base {
                drain.finalize_complete_items()?;
                let dir = WorkItem::file(&done.dir, &self.base);
                match delete_source_item(&dir, self.force_delete) {
                    Ok(()) => log::debug!("Removed empty directory {}", done.dir.display()),
                    Err(e) => log::debug!("Kept directory {}: {}", done.dir.display(), e),
                }
            }
        }
    }

    fn open_frame(&mut self, dir: PathBuf) -> Frame {
        let mut files = Vec::new();
        let mut write_last = Vec::new();
        let mut subdirs = Vec::new();
        let walker = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_links);
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let file_type = entry.file_type();
            let path = entry.into_path();
            if file_type.is_dir() {
                subdirs.push(path);
            } else if file_type.is_file() {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !self.filter.accepts(&name) {
                    continue;
                }
                if self.write_last.as_ref().is_some_and(|re| re.is_match(&name)) {
                    write_last.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        if self.sort_items {
            files.sort();
            write_last.sort();
        }
        if self.sort_containers {
            subdirs.sort();
        }
        let mut frame = Frame {
            dir,
            files: files.into(),
            write_last: write_last.into(),
            subdirs: subdirs.into(),
            files_sorted: self.sort_items,
        };
        self.apply_trigger(&mut frame);
        frame
    }

    /// Prune a fresh frame so the walk resumes at the trigger path.
    fn apply_trigger(&mut self, frame: &mut Frame) {
        let Some(trigger) = self.trigger.as_ref() else {
            return;
        };
        if frame.dir == *trigger {
            log::info!("Start trigger {} reached", trigger.display());
            self.trigger = None;
            return;
        }
        let Some(first) = trigger
            .strip_prefix(&frame.dir)
            .ok()
            .and_then(|rest| rest.components().next())
        else {
            return;
        };
        let next = frame.dir.join(first);

        // Trigger names a file in this directory: resume at it.
        if let Some(pos) = frame.files.iter().position(|f| *f == next) {
            if frame.files_sorted {
                frame.files.drain(..pos);
            } else {
                frame.files.retain(|f| *f >= next);
            }
            frame.subdirs.clear();
            log::info!("Start trigger {} reached", trigger.display());
            self.trigger = None;
            return;
        }

        frame.files.clear();
        frame.write_last.clear();
        frame.subdirs.retain(|d| *d >= next);
        match frame.subdirs.iter().position(|d| *d == next) {
            Some(pos) => {
                if let Some(d) = frame.subdirs.remove(pos) {
                    frame.subdirs.push_front(d);
                }
            }
            None => {
                log::info!(
                    "Start trigger {} does not exist; resuming after it",
                    trigger.display()
                );
                self.trigger = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Cancelled;

    struct NoDrain;

    impl CompletionDrain for NoDrain {
        fn finalize_complete_items(&mut self) -> Result<u64, Cancelled> {
            Ok(0)
        }
    }

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, b"x").unwrap();
    }

    fn walk_all(walker: &mut TreeWalker, base: &Path) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = walker.next_item(&mut NoDrain).unwrap() {
            let rel = item.file_path().unwrap().strip_prefix(base).unwrap();
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
        out
    }

    #[test]
    fn missing_base_is_exhausted() {
        let mut w = TreeWalker::new(&ScannerSettings::default());
        w.initialize(Path::new("/nonexistent/comet/base"), None);
        assert!(w.next_item(&mut NoDrain).unwrap().is_none());
        assert!(w.next_item(&mut NoDrain).unwrap().is_none());
    }

    #[test]
    fn trigger_file_resumes_inside_directory() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["d/a.wav", "d/b.wav", "d/c.wav", "e/z.wav"] {
            touch(dir.path(), f);
        }
        let mut w = TreeWalker::new(&ScannerSettings::default());
        w.initialize(dir.path(), Some(&dir.path().join("d/b.wav")));
        assert_eq!(walk_all(&mut w, dir.path()), vec!["d/b.wav", "d/c.wav", "e/z.wav"]);
    }

    #[test]
    fn trigger_outside_base_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.wav");
        let mut w = TreeWalker::new(&ScannerSettings::default());
        w.initialize(dir.path(), Some(Path::new("/elsewhere/x")));
        assert_eq!(walk_all(&mut w, dir.path()), vec!["a.wav"]);
    }
}
