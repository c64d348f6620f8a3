//! On-disk index caches.
//!
//! Every observer owns exactly one cache file below the cache root. The file is
//! UTF-8 text, one record per line; a line starting with [`MODULE_MARKER`] opens
//! the section of one nested archive. Presence of the file is the only validity
//! signal: an updated archive that keeps its name is not detected, and operators
//! delete the cache root to force a rebuild.

use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const MODULE_MARKER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum CacheStatus {
    Missing,
    Valid,
    Corrupt,
}

#[derive(Debug, Clone)]
pub struct IndexCache {
    name: String,
    path: PathBuf,
}

impl IndexCache {
    pub fn new(cache_root: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: cache_root.join(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn status(&self) -> CacheStatus {
        match std::fs::read(&self.path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) if !text.trim().is_empty() => CacheStatus::Valid,
                _ => CacheStatus::Corrupt,
            },
            Err(e) if e.kind() == ErrorKind::NotFound => CacheStatus::Missing,
            Err(_) => CacheStatus::Corrupt,
        }
    }

    /// Reads all lines, or `None` when the cache has not been built.
    pub fn read_lines(&self) -> Result<Option<Vec<String>>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&self.path, e)),
        };
        let text = String::from_utf8(bytes).map_err(|e| {
            let valid = &e.as_bytes()[..e.utf8_error().valid_up_to()];
            let line = valid.iter().filter(|b| **b == b'\n').count() + 1;
            Error::parse(self.path.display().to_string(), line, "not valid UTF-8")
        })?;
        Ok(Some(text.lines().map(str::to_string).collect()))
    }

    /// Replaces the cache with `lines`. Readers see either the old file or the
    /// complete new one.
    pub fn write_lines(&self, lines: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let mut content = lines.join("\n");
        content.push('\n');

        let mut tmp_os = self.path.as_os_str().to_os_string();
        tmp_os.push(".tmp");
        let tmp = PathBuf::from(tmp_os);
        std::fs::write(&tmp, content).map_err(|e| Error::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Error::io(&self.path, e))?;
        Ok(())
    }

    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    pub fn digest(&self) -> Result<Option<String>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&self.path, e)),
        };
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Some(hex::encode(hasher.finalize())))
    }
}

pub fn module_marker(module: &str) -> String {
    format!("{MODULE_MARKER} {module}")
}

pub fn is_module_marker(line: &str) -> bool {
    line.starts_with(MODULE_MARKER)
}

/// Module path named by a marker line.
pub fn marker_module(line: &str) -> Option<&str> {
    line.strip_prefix(MODULE_MARKER).map(str::trim)
}
