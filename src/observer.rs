//! Observers watch the entries of every walked nested archive.
//!
//! The walker offers each entry to the registered observers in order and the
//! first relevant one consumes it; the entry stream can only be read once.
//! Each observer accumulates in memory and persists its own [`IndexCache`] in
//! [`Observer::finalize`]. An observer that found nothing writes no cache and is
//! walked again on the next startup.

use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{Error, Result};
use crate::flags::FlagDeclaration;
use crate::index::{IndexCache, is_module_marker, module_marker};

pub const NAMED_COMPONENTS_RESOURCE: &str = "META-INF/sisu/javax.inject.Named";
pub const FEATURE_FLAG_RESOURCE: &str = "sonatype/org.sonatype.nexus.common.app.FeatureFlag";

pub const COMPONENT_INDEX: &str = "sisu/component.index";
pub const DAO_INDEX: &str = "mybatis/daos.index";
pub const CONFIGURATION_INDEX: &str = "jetty/configurations.index";
pub const FEATURE_FLAG_INDEX: &str = "sisu/feature-flags.index";

pub trait Observer {
    fn name(&self) -> &str;

    /// Cache file name, relative to the cache root.
    fn cache_name(&self) -> &str;

    /// Must run before any other call.
    fn initialize(&mut self, cache_root: &Path);

    /// True exactly when the cache file is absent.
    fn needs_rebuild(&self) -> bool;

    fn is_relevant(&self, entry_path: &str) -> bool;

    fn consume(&mut self, entry_path: &str, module: &str, content: &mut dyn Read) -> Result<()>;

    /// Called after the last entry of `module` was dispatched.
    fn on_module_boundary(&mut self, _module: &str) {}

    /// Persists what was accumulated. A no-op when nothing was.
    fn finalize(&mut self) -> Result<()>;
}

/// The observers a default bootstrap registers, in dispatch order.
pub fn default_observers() -> Vec<Box<dyn Observer>> {
    vec![
        Box::new(ComponentIndexObserver::named_components()),
        Box::new(ClassNameIndexObserver::data_access()),
        Box::new(ClassNameIndexObserver::connector_configurations()),
        Box::new(FlagDeclarationObserver::new()),
    ]
}

/// Trimmed non-blank lines of an entry, numbered as they appear in it.
fn read_numbered_lines(
    entry_path: &str,
    module: &str,
    content: &mut dyn Read,
) -> Result<Vec<(usize, String)>> {
    let origin = format!("{module}!/{entry_path}");
    let mut lines = Vec::new();
    for (idx, line) in BufReader::new(content).lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(Error::parse(&origin, idx + 1, "not valid UTF-8"));
            }
            Err(e) => return Err(Error::io(&origin, e)),
        };
        let line = line.trim();
        if !line.is_empty() {
            lines.push((idx + 1, line.to_string()));
        }
    }
    Ok(lines)
}

fn read_content_lines(
    entry_path: &str,
    module: &str,
    content: &mut dyn Read,
) -> Result<Vec<String>> {
    Ok(read_numbered_lines(entry_path, module, content)?
        .into_iter()
        .map(|(_, line)| line)
        .collect())
}

fn cache_for<'a>(cache: &'a Option<IndexCache>, cache_name: &str) -> Result<&'a IndexCache> {
    cache.as_ref().ok_or_else(|| {
        Error::io(
            cache_name,
            std::io::Error::other("observer finalized before initialize"),
        )
    })
}

/// Ordered-sequence index: the content lines of a well-known resource, grouped
/// under a marker line per nested archive.
pub struct ComponentIndexObserver {
    name: String,
    cache_name: String,
    resource: String,
    cache: Option<IndexCache>,
    lines: Vec<String>,
    module_open: bool,
}

impl ComponentIndexObserver {
    pub fn new(name: &str, cache_name: &str, resource: &str) -> Self {
        Self {
            name: name.to_string(),
            cache_name: cache_name.to_string(),
            resource: resource.to_string(),
            cache: None,
            lines: Vec::new(),
            module_open: false,
        }
    }

    pub fn named_components() -> Self {
        Self::new(
            "Named component index",
            COMPONENT_INDEX,
            NAMED_COMPONENTS_RESOURCE,
        )
    }
}

impl Observer for ComponentIndexObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn cache_name(&self) -> &str {
        &self.cache_name
    }

    fn initialize(&mut self, cache_root: &Path) {
        self.cache = Some(IndexCache::new(cache_root, &self.cache_name));
    }

    fn needs_rebuild(&self) -> bool {
        self.cache.as_ref().is_none_or(|c| !c.exists())
    }

    fn is_relevant(&self, entry_path: &str) -> bool {
        entry_path.ends_with(&self.resource)
    }

    fn consume(&mut self, entry_path: &str, module: &str, content: &mut dyn Read) -> Result<()> {
        let components = read_content_lines(entry_path, module, content)?;
        tracing::debug!(module, count = components.len(), "found indexed components");

        if !self.module_open {
            self.lines.push(module_marker(module));
            self.module_open = true;
        }
        self.lines.extend(components);
        Ok(())
    }

    fn on_module_boundary(&mut self, _module: &str) {
        self.module_open = false;
    }

    fn finalize(&mut self) -> Result<()> {
        let lines = std::mem::take(&mut self.lines);
        if lines.is_empty() {
            return Ok(());
        }
        cache_for(&self.cache, &self.cache_name)?.write_lines(&lines)
    }
}

/// Records the path of every entry whose name ends with a suffix, for class
/// families that are discovered by naming convention.
pub struct ClassNameIndexObserver {
    name: String,
    cache_name: String,
    suffix: String,
    excluded: Vec<String>,
    cache: Option<IndexCache>,
    classes: Vec<String>,
}

impl ClassNameIndexObserver {
    pub fn new(name: &str, cache_name: &str, suffix: &str) -> Self {
        Self {
            name: name.to_string(),
            cache_name: cache_name.to_string(),
            suffix: suffix.to_string(),
            excluded: Vec::new(),
            cache: None,
            classes: Vec::new(),
        }
    }

    pub fn excluding(mut self, entry_path: &str) -> Self {
        self.excluded.push(entry_path.to_string());
        self
    }

    pub fn data_access() -> Self {
        Self::new("Data access class index", DAO_INDEX, "DAO.class")
    }

    pub fn connector_configurations() -> Self {
        Self::new(
            "Connector configuration index",
            CONFIGURATION_INDEX,
            "ConnectorConfiguration.class",
        )
        .excluding("org/sonatype/nexus/bootstrap/jetty/ConnectorConfiguration.class")
    }
}

impl Observer for ClassNameIndexObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn cache_name(&self) -> &str {
        &self.cache_name
    }

    fn initialize(&mut self, cache_root: &Path) {
        self.cache = Some(IndexCache::new(cache_root, &self.cache_name));
    }

    fn needs_rebuild(&self) -> bool {
        self.cache.as_ref().is_none_or(|c| !c.exists())
    }

    fn is_relevant(&self, entry_path: &str) -> bool {
        entry_path.ends_with(&self.suffix) && !self.excluded.iter().any(|e| entry_path.ends_with(e))
    }

    fn consume(&mut self, entry_path: &str, _module: &str, _content: &mut dyn Read) -> Result<()> {
        tracing::debug!(entry_path, index = %self.cache_name, "adding class to index");
        self.classes.push(entry_path.to_string());
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let classes = std::mem::take(&mut self.classes);
        if classes.is_empty() {
            return Ok(());
        }
        cache_for(&self.cache, &self.cache_name)?.write_lines(&classes)
    }
}

/// Per-module set of validated flag declarations.
pub struct FlagDeclarationObserver {
    cache: Option<IndexCache>,
    modules: Vec<(String, BTreeSet<String>)>,
}

impl FlagDeclarationObserver {
    pub fn new() -> Self {
        Self {
            cache: None,
            modules: Vec::new(),
        }
    }
}

impl Default for FlagDeclarationObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for FlagDeclarationObserver {
    fn name(&self) -> &str {
        "Feature flag declaration index"
    }

    fn cache_name(&self) -> &str {
        FEATURE_FLAG_INDEX
    }

    fn initialize(&mut self, cache_root: &Path) {
        self.cache = Some(IndexCache::new(cache_root, FEATURE_FLAG_INDEX));
    }

    fn needs_rebuild(&self) -> bool {
        self.cache.as_ref().is_none_or(|c| !c.exists())
    }

    fn is_relevant(&self, entry_path: &str) -> bool {
        entry_path.ends_with(FEATURE_FLAG_RESOURCE)
    }

    fn consume(&mut self, entry_path: &str, module: &str, content: &mut dyn Read) -> Result<()> {
        let origin = format!("{module}!/{entry_path}");
        let mut found = BTreeSet::new();
        for (line_no, line) in read_numbered_lines(entry_path, module, content)? {
            // removal markers from module-level aggregation are not declarations
            if is_module_marker(&line) {
                continue;
            }
            let declaration = FlagDeclaration::parse(&line, &origin, line_no)?;
            found.insert(declaration.to_string());
        }
        tracing::debug!(module, count = found.len(), "found feature flagged components");

        match self.modules.iter_mut().find(|(m, _)| m == module) {
            Some((_, existing)) => existing.extend(found),
            None => self.modules.push((module.to_string(), found)),
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let modules = std::mem::take(&mut self.modules);
        let mut lines = Vec::new();
        for (module, declarations) in modules {
            if declarations.is_empty() {
                continue;
            }
            lines.push(module_marker(&module));
            lines.extend(declarations);
        }
        if lines.is_empty() {
            return Ok(());
        }
        cache_for(&self.cache, FEATURE_FLAG_INDEX)?.write_lines(&lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn component_observer_marks_each_module_once() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = ComponentIndexObserver::named_components();
        observer.initialize(dir.path());
        assert!(observer.needs_rebuild());

        let resource = NAMED_COMPONENTS_RESOURCE;
        observer.consume(resource, "lib/a.jar", &mut "com.x.Foo\n\ncom.x.Bar\n".as_bytes())?;
        observer.on_module_boundary("lib/a.jar");
        observer.on_module_boundary("lib/empty.jar");
        observer.consume(resource, "lib/b.jar", &mut "com.y.Baz".as_bytes())?;
        observer.on_module_boundary("lib/b.jar");
        observer.finalize()?;

        assert!(!observer.needs_rebuild());
        let lines = IndexCache::new(dir.path(), COMPONENT_INDEX).read_lines()?.unwrap();
        assert_eq!(
            lines,
            vec!["- lib/a.jar", "com.x.Foo", "com.x.Bar", "- lib/b.jar", "com.y.Baz"]
        );
        Ok(())
    }

    #[test]
    fn class_name_observer_honours_exclusions() {
        let observer = ClassNameIndexObserver::connector_configurations();
        assert!(observer.is_relevant("org/example/HttpsConnectorConfiguration.class"));
        assert!(!observer.is_relevant("org/sonatype/nexus/bootstrap/jetty/ConnectorConfiguration.class"));
        assert!(!observer.is_relevant("org/example/Connector.class"));
    }

    #[test]
    fn finalize_without_findings_writes_nothing() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = ClassNameIndexObserver::data_access();
        observer.initialize(dir.path());
        observer.finalize()?;
        observer.finalize()?;
        assert!(observer.needs_rebuild());
        assert!(!dir.path().join(DAO_INDEX).exists());
        Ok(())
    }

    #[test]
    fn flag_observer_dedupes_and_sorts_per_module() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = FlagDeclarationObserver::new();
        observer.initialize(dir.path());

        let content = "com.x.Zed/flag.z/false/false\ncom.x.Foo/flag.a/false/false\n- stale\ncom.x.Foo/flag.a/false/false\n";
        observer.consume(FEATURE_FLAG_RESOURCE, "lib/a.jar", &mut content.as_bytes())?;
        observer.finalize()?;

        let lines = IndexCache::new(dir.path(), FEATURE_FLAG_INDEX).read_lines()?.unwrap();
        assert_eq!(
            lines,
            vec!["- lib/a.jar", "com.x.Foo/flag.a/false/false", "com.x.Zed/flag.z/false/false"]
        );
        Ok(())
    }

    #[test]
    fn flag_observer_fails_on_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = FlagDeclarationObserver::new();
        observer.initialize(dir.path());

        let err = observer
            .consume(FEATURE_FLAG_RESOURCE, "lib/a.jar", &mut "com.x.Foo/flag.a".as_bytes())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);
    }

    #[test]
    fn flag_errors_name_the_manifest_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = FlagDeclarationObserver::new();
        observer.initialize(dir.path());

        let content = "com.x.Foo/flag.a/false/false\n\n\ncom.x.Bar/flag.b\n";
        let err = observer
            .consume(FEATURE_FLAG_RESOURCE, "lib/a.jar", &mut content.as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("line 4"), "{err}");
    }

    #[test]
    fn invalid_utf8_manifest_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = FlagDeclarationObserver::new();
        observer.initialize(dir.path());

        let content: &[u8] = b"com.x.Foo/flag.a/false/false\ncom.x.\xff/flag.b/false/false\n";
        let err = observer
            .consume(FEATURE_FLAG_RESOURCE, "lib/a.jar", &mut &content[..])
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);
        assert!(err.to_string().contains("line 2"), "{err}");
    }
}
