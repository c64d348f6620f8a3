//! Single pass over the nested archives of an application archive.
//!
//! Steady-state restarts take the fast path: when every observer already has
//! its cache, the archive is not even opened.

use std::io::Read;
use std::path::Path;

use crate::archive::{ApplicationArchive, open_application_archive, read_module_paths};
use crate::error::Result;
use crate::filter::ArchiveFilter;
use crate::observer::Observer;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WalkSummary {
    pub skipped: bool,
    pub modules_walked: usize,
    pub modules_filtered: usize,
    pub entries_seen: usize,
    pub entries_claimed: usize,
}

pub struct ClasspathWalker {
    observers: Vec<Box<dyn Observer>>,
    filter: Box<dyn ArchiveFilter>,
}

impl ClasspathWalker {
    pub fn new(observers: Vec<Box<dyn Observer>>, filter: Box<dyn ArchiveFilter>) -> Self {
        Self { observers, filter }
    }

    pub fn observers(&self) -> &[Box<dyn Observer>] {
        &self.observers
    }

    /// Walks the archive (file or exploded directory) at `base`.
    pub fn walk(&mut self, base: &Path, cache_root: &Path) -> Result<WalkSummary> {
        if self.prepare(cache_root) {
            return Ok(skipped());
        }
        tracing::debug!(base = %base.display(), "building the classpath index(es)");
        let mut archive = open_application_archive(base)?;
        self.walk_modules(archive.as_mut())
    }

    pub fn walk_archive(
        &mut self,
        archive: &mut dyn ApplicationArchive,
        cache_root: &Path,
    ) -> Result<WalkSummary> {
        if self.prepare(cache_root) {
            return Ok(skipped());
        }
        self.walk_modules(archive)
    }

    /// Initializes every observer; true when all caches are already present.
    fn prepare(&mut self, cache_root: &Path) -> bool {
        for observer in self.observers.iter_mut() {
            observer.initialize(cache_root);
        }

        for observer in self.observers.iter() {
            if observer.needs_rebuild() {
                tracing::debug!(observer = observer.name(), "observer needs to rebuild its cache");
                return false;
            }
        }
        tracing::debug!("skipping classpath walk, every observer has its cache");
        true
    }

    fn walk_modules(&mut self, archive: &mut dyn ApplicationArchive) -> Result<WalkSummary> {
        let mut summary = WalkSummary::default();
        let modules = read_module_paths(archive)?;

        for module in modules.iter() {
            if !self.filter.allowed(module) {
                tracing::debug!(module = %module, "skipping nested archive");
                summary.modules_filtered += 1;
                continue;
            }

            tracing::debug!(module = %module, base = %archive.location().display(), "walking nested archive");
            let mut nested = archive.open_module(module)?;
            let observers = &mut self.observers;
            nested.for_each_entry(|entry_path, content| {
                summary.entries_seen += 1;
                if dispatch(observers, entry_path, module, content)? {
                    summary.entries_claimed += 1;
                }
                Ok(())
            })?;

            for observer in self.observers.iter_mut() {
                observer.on_module_boundary(module);
            }
            summary.modules_walked += 1;
        }

        for observer in self.observers.iter_mut() {
            observer.finalize()?;
        }

        tracing::info!(
            modules = summary.modules_walked,
            filtered = summary.modules_filtered,
            entries = summary.entries_seen,
            claimed = summary.entries_claimed,
            "classpath walk complete"
        );
        Ok(summary)
    }
}

/// Hands the entry to the first relevant observer. Returns whether one claimed it.
fn dispatch(
    observers: &mut [Box<dyn Observer>],
    entry_path: &str,
    module: &str,
    content: &mut dyn Read,
) -> Result<bool> {
    for observer in observers.iter_mut() {
        if observer.is_relevant(entry_path) {
            tracing::debug!(entry_path, module, observer = observer.name(), "visiting entry");
            observer.consume(entry_path, module, content)?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn skipped() -> WalkSummary {
    WalkSummary {
        skipped: true,
        ..WalkSummary::default()
    }
}
