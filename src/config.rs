use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::filter::PrefixArchiveFilter;
use crate::properties::{PropertyMap, PropertySource};

pub const DATA_DIR_ENV: &str = "CLASSPATH_INDEX_DATA";

pub fn resolve_data_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.data_dir.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var(DATA_DIR_ENV)
        && !p.is_empty()
    {
        return Ok(PathBuf::from(p));
    }

    classpath_index_home()
}

pub fn cache_root(data_dir: &Path) -> PathBuf {
    data_dir.join("cache")
}

pub fn resolve_cache_root(cli: &Cli) -> Result<PathBuf> {
    Ok(cache_root(&resolve_data_dir(cli)?))
}

/// Property files in the order given, then `-D` overrides.
pub fn resolve_properties(cli: &Cli) -> Result<PropertyMap> {
    let sources: Vec<PropertySource> = cli
        .properties
        .iter()
        .map(|p| PropertySource::required(p.clone()))
        .collect();
    let mut properties = PropertyMap::load_layers(&sources)?;
    properties.apply_overrides(&cli.define)?;
    Ok(properties)
}

pub fn archive_filter(include: &[String]) -> PrefixArchiveFilter {
    PrefixArchiveFilter::new(include.iter().cloned())
}

/// Deletes every cache; the next walk rebuilds all of them.
pub fn clear_cache(cache_root: &Path) -> Result<bool> {
    if !cache_root.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(cache_root).map_err(|e| Error::io(cache_root, e))?;
    Ok(true)
}

fn classpath_index_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| {
            Error::io(
                "<data directory>",
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "failed to resolve data directory",
                ),
            )
        })?;
    Ok(base.join("classpath-index"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::ConfigurationSnapshot;
    use clap::Parser;

    #[test]
    fn explicit_data_dir_wins() {
        let cli = Cli::parse_from(["classpath-index", "--data-dir", "/srv/node1", "status"]);
        assert_eq!(resolve_data_dir(&cli).unwrap(), PathBuf::from("/srv/node1"));
        assert_eq!(
            resolve_cache_root(&cli).unwrap(),
            PathBuf::from("/srv/node1/cache")
        );
    }

    #[test]
    fn clear_cache_removes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        std::fs::create_dir_all(root.join("sisu")).unwrap();
        std::fs::write(root.join("sisu/component.index"), "x\n").unwrap();

        assert!(clear_cache(&root).unwrap());
        assert!(!root.exists());
        assert!(!clear_cache(&root).unwrap());
    }

    #[test]
    fn defines_layer_over_property_files() {
        let dir = tempfile::tempdir().unwrap();
        let props = dir.path().join("nexus.properties");
        std::fs::write(&props, "flag.a=false\n").unwrap();

        let cli = Cli::parse_from([
            "classpath-index",
            "--properties",
            props.to_str().unwrap(),
            "-D",
            "flag.a=true",
            "status",
        ]);
        let resolved = resolve_properties(&cli).unwrap();
        assert_eq!(resolved.get("flag.a"), Some("true"));
    }
}
