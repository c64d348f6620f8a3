//! The configuration snapshot feature flags are resolved against.
//!
//! Assembled once per process from layered `.properties` files and command
//! line overrides; later layers win.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Point lookup of resolved settings by key.
pub trait ConfigurationSnapshot {
    fn get(&self, key: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PropertyMap {
    entries: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PropertySource {
    pub path: PathBuf,
    pub required: bool,
}

impl PropertySource {
    pub fn required(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: true,
        }
    }

    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: false,
        }
    }
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn extend(&mut self, other: PropertyMap) {
        self.entries.extend(other.entries);
    }

    /// Parses `key=value` / `key:value` lines; `#` and `!` start comments.
    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        let mut map = Self::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some(split) = line.find(['=', ':']) else {
                return Err(Error::parse(
                    origin,
                    idx + 1,
                    format!("expected key=value: {line}"),
                ));
            };
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            if key.is_empty() {
                return Err(Error::parse(origin, idx + 1, "empty property key"));
            }
            map.insert(key, value);
        }
        Ok(map)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Applies the sources in order. Missing optional sources are skipped.
    pub fn load_layers(sources: &[PropertySource]) -> Result<Self> {
        let mut map = Self::new();
        for source in sources {
            if !source.required && !source.path.exists() {
                tracing::debug!(path = %source.path.display(), "skipping missing optional properties");
                continue;
            }
            let layer = Self::load(&source.path)?;
            tracing::debug!(path = %source.path.display(), keys = layer.len(), "loaded properties");
            map.extend(layer);
        }
        Ok(map)
    }

    /// Applies `key=value` overrides, as given with `-D` on the command line.
    pub fn apply_overrides<I, S>(&mut self, overrides: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (idx, raw) in overrides.into_iter().enumerate() {
            let raw = raw.as_ref();
            let Some((key, value)) = raw.split_once('=') else {
                return Err(Error::parse(
                    "command line",
                    idx + 1,
                    format!("expected key=value: {raw}"),
                ));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::parse("command line", idx + 1, "empty property key"));
            }
            tracing::debug!(key, value, "overriding property from command line");
            self.insert(key, value.trim());
        }
        Ok(())
    }
}

impl ConfigurationSnapshot for PropertyMap {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl<S: std::hash::BuildHasher> ConfigurationSnapshot for std::collections::HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        std::collections::HashMap::get(self, key).map(String::as_str)
    }
}
