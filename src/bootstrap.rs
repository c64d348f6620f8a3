//! Startup sequence: walk (or reuse caches), load the flag declarations, build
//! the filter handed to the injection container.
//!
//! Runs once per process; callers keep the returned [`ClasspathIndex`] and pass
//! it by reference to whatever enumerates candidate classes.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::filter::ArchiveFilter;
use crate::finder::IndexedComponents;
use crate::flags::FlagDeclarationIndex;
use crate::index::IndexCache;
use crate::observer::{FEATURE_FLAG_INDEX, default_observers};
use crate::properties::ConfigurationSnapshot;
use crate::resolver::FlagResolver;
use crate::walker::{ClasspathWalker, WalkSummary};

pub struct ClasspathIndex {
    cache_root: PathBuf,
    summary: WalkSummary,
    flags: FlagDeclarationIndex,
    resolver: FlagResolver,
}

pub fn bootstrap(
    archive: &Path,
    cache_root: &Path,
    archive_filter: Box<dyn ArchiveFilter>,
    config: &dyn ConfigurationSnapshot,
) -> Result<ClasspathIndex> {
    let mut walker = ClasspathWalker::new(default_observers(), archive_filter);
    let summary = walker.walk(archive, cache_root)?;
    ClasspathIndex::from_caches(cache_root, summary, config)
}

impl ClasspathIndex {
    /// Builds the filter from caches that are already on disk.
    pub fn from_caches(
        cache_root: &Path,
        summary: WalkSummary,
        config: &dyn ConfigurationSnapshot,
    ) -> Result<Self> {
        let flags = FlagDeclarationIndex::load(&IndexCache::new(cache_root, FEATURE_FLAG_INDEX))?;
        let resolver = FlagResolver::new(&flags, config);
        tracing::info!(
            declarations = flags.len(),
            disabled_packages = resolver.disabled_packages().len(),
            conflicts = resolver.conflicts().len(),
            "feature flag filter ready"
        );
        Ok(Self {
            cache_root: cache_root.to_path_buf(),
            summary,
            flags,
            resolver,
        })
    }

    pub fn summary(&self) -> &WalkSummary {
        &self.summary
    }

    pub fn flags(&self) -> &FlagDeclarationIndex {
        &self.flags
    }

    pub fn filter(&self) -> &FlagResolver {
        &self.resolver
    }

    pub fn allowed(&self, class_path: &str) -> bool {
        self.resolver.allowed(class_path)
    }

    /// Loadable components recorded in the named cache.
    pub fn components(&self, cache_name: &str) -> Result<Vec<String>> {
        let indexed = IndexedComponents::load(&IndexCache::new(&self.cache_root, cache_name))?;
        Ok(indexed.find_components(&self.resolver))
    }
}
