//! Feature-flag resolution.
//!
//! For every declaration, `effective = (configured ?? enabled_by_default) XOR inverse`.
//! Disabled targets land in a class set or a package prefix list; everything
//! else, including classes nobody declared a flag on, stays loadable.
//!
//! The first declaration seen for a flag name decides the flag's value when it
//! is not configured. Later declarations of the same flag reuse that value (each
//! still applies its own `inverse`), and one whose default disagrees is recorded
//! as a conflict, once per flag.

use std::collections::{HashMap, HashSet};

use crate::flags::{FlagDeclaration, FlagDeclarationIndex, TargetKind, parse_boolean};
use crate::properties::ConfigurationSnapshot;

/// Decides whether a discovered class may be loaded. Implementations are pure
/// and safe to query from several threads.
pub trait ComponentFilter: Sync {
    fn allowed(&self, class_path: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllComponents;

impl ComponentFilter for AllowAllComponents {
    fn allowed(&self, _class_path: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FlagConflict {
    pub flag: String,
    pub first: FlagDeclaration,
    pub conflicting: FlagDeclaration,
}

#[derive(Debug, Clone, Default)]
pub struct FlagResolver {
    disabled_classes: HashSet<String>,
    disabled_packages: Vec<String>,
    conflicts: Vec<FlagConflict>,
}

impl FlagResolver {
    pub fn new(index: &FlagDeclarationIndex, config: &dyn ConfigurationSnapshot) -> Self {
        let mut resolver = Self::default();
        // flag name -> (first declaration, flag value)
        let mut governing: HashMap<&str, (&FlagDeclaration, bool)> = HashMap::new();
        let mut conflicted: HashSet<&str> = HashSet::new();

        for declaration in index.declarations() {
            let value = match governing.get(declaration.flag.as_str()) {
                Some((first, value)) => {
                    if first.enabled_by_default != declaration.enabled_by_default
                        && conflicted.insert(declaration.flag.as_str())
                    {
                        tracing::warn!(
                            flag = %declaration.flag,
                            first = %first,
                            conflicting = %declaration,
                            "multiple uses of the same feature flag with different default values"
                        );
                        resolver.conflicts.push(FlagConflict {
                            flag: declaration.flag.clone(),
                            first: (*first).clone(),
                            conflicting: declaration.clone(),
                        });
                    }
                    *value
                }
                None => {
                    let value = flag_value(declaration, config);
                    governing.insert(declaration.flag.as_str(), (declaration, value));
                    value
                }
            };

            let enabled = value != declaration.inverse;
            if enabled {
                tracing::debug!(declaration = %declaration, "feature flag enabled");
                continue;
            }
            resolver.disable(declaration);
        }

        resolver
    }

    fn disable(&mut self, declaration: &FlagDeclaration) {
        let path = declaration.target.replace('.', "/");
        match declaration.kind() {
            TargetKind::Class => {
                let class = format!("/{path}.class");
                tracing::debug!(flag = %declaration.flag, class = %class, "feature flag disabled for class");
                self.disabled_classes.insert(class);
            }
            TargetKind::Package => {
                let package = format!("/{path}/");
                tracing::debug!(flag = %declaration.flag, package = %package, "feature flag disabled for package");
                if !self.disabled_packages.contains(&package) {
                    self.disabled_packages.push(package);
                }
            }
        }
    }

    pub fn allowed(&self, class_path: &str) -> bool {
        let class = class_resource_path(class_path);
        if self.disabled_classes.contains(&class) {
            tracing::debug!(class = %class, "filtering out class, its feature flag is not enabled");
            return false;
        }
        if self.disabled_packages.iter().any(|p| class.starts_with(p.as_str())) {
            tracing::debug!(class = %class, "filtering out class, its package feature flag is not enabled");
            return false;
        }
        true
    }

    pub fn disabled_classes(&self) -> impl Iterator<Item = &str> {
        self.disabled_classes.iter().map(String::as_str)
    }

    pub fn disabled_packages(&self) -> &[String] {
        &self.disabled_packages
    }

    pub fn conflicts(&self) -> &[FlagConflict] {
        &self.conflicts
    }
}

impl ComponentFilter for FlagResolver {
    fn allowed(&self, class_path: &str) -> bool {
        FlagResolver::allowed(self, class_path)
    }
}

/// Configured value of the declaration's flag, or its default.
fn flag_value(declaration: &FlagDeclaration, config: &dyn ConfigurationSnapshot) -> bool {
    match config.get(&declaration.flag) {
        Some(configured) => parse_boolean(configured),
        None => declaration.enabled_by_default,
    }
}

/// Canonical `/a/b/C.class` form of a class reference.
///
/// Accepts dotted names (`a.b.C`), entry paths (`a/b/C.class`) and nested
/// archive URLs (`jar:file:app.jar!/BOOT-INF/lib/x.jar!/a/b/C.class`).
pub fn class_resource_path(class_path: &str) -> String {
    let last = class_path.rsplit('!').next().unwrap_or(class_path);
    let last = last.trim().trim_start_matches('/');
    let dotted = match last.strip_suffix(".class") {
        Some(stem) => stem.replace(['/', '\\'], "."),
        None => last.replace(['/', '\\'], "."),
    };
    format!("/{}.class", dotted.replace('.', "/"))
}
