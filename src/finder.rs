use rayon::prelude::*;

use crate::error::Result;
use crate::index::{IndexCache, is_module_marker, marker_module};
use crate::resolver::ComponentFilter;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ModuleComponents {
    /// `None` for entries of caches written without module markers.
    pub module: Option<String>,
    pub components: Vec<String>,
}

/// Components recorded by one observer cache, grouped by nested archive.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexedComponents {
    modules: Vec<ModuleComponents>,
}

impl IndexedComponents {
    pub fn load(cache: &IndexCache) -> Result<Self> {
        match cache.read_lines()? {
            Some(lines) => {
                tracing::debug!(entries = lines.len(), cache = %cache.path().display(), "read index cache");
                Ok(Self::from_lines(&lines))
            }
            None => {
                tracing::debug!(cache = %cache.path().display(), "index cache absent, no components");
                Ok(Self::default())
            }
        }
    }

    pub fn from_lines(lines: &[String]) -> Self {
        let mut modules: Vec<ModuleComponents> = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if is_module_marker(line) {
                modules.push(ModuleComponents {
                    module: marker_module(line).map(str::to_string),
                    components: Vec::new(),
                });
                continue;
            }
            match modules.last_mut() {
                Some(group) => group.components.push(line.to_string()),
                None => modules.push(ModuleComponents {
                    module: None,
                    components: vec![line.to_string()],
                }),
            }
        }
        Self { modules }
    }

    pub fn modules(&self) -> &[ModuleComponents] {
        &self.modules
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.modules
            .iter()
            .flat_map(|m| m.components.iter().map(String::as_str))
    }

    /// Components the filter allows, in index order.
    pub fn find_components(&self, filter: &dyn ComponentFilter) -> Vec<String> {
        let all: Vec<&str> = self.components().collect();
        all.par_iter()
            .filter(|c| filter.allowed(c))
            .map(|c| c.to_string())
            .collect()
    }
}
