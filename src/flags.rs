//! Feature-flag declarations.
//!
//! A declaration line reads `qualifiedName/flagName/enabledByDefault/inverse`,
//! for example `org.example.jwt.JwtModule/nexus.jwt.enabled/false/false`.

use std::fmt;

use crate::error::{Error, Result};
use crate::index::{IndexCache, is_module_marker};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct FlagDeclaration {
    pub target: String,
    pub flag: String,
    pub enabled_by_default: bool,
    pub inverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Class,
    Package,
}

impl FlagDeclaration {
    pub fn new(target: &str, flag: &str, enabled_by_default: bool, inverse: bool) -> Self {
        Self {
            target: target.to_string(),
            flag: flag.to_string(),
            enabled_by_default,
            inverse,
        }
    }

    /// Parses one declaration line. `origin` and `line_no` only feed the error.
    pub fn parse(line: &str, origin: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split('/').collect();
        if fields.len() != 4 {
            return Err(Error::parse(
                origin,
                line_no,
                format!("expected 4 '/'-separated fields, found {}: {line}", fields.len()),
            ));
        }
        if fields[0].is_empty() || fields[1].is_empty() {
            return Err(Error::parse(
                origin,
                line_no,
                format!("empty target or flag name: {line}"),
            ));
        }

        Ok(Self {
            target: fields[0].to_string(),
            flag: fields[1].to_string(),
            enabled_by_default: parse_boolean(fields[2]),
            inverse: parse_boolean(fields[3]),
        })
    }

    /// A target whose last segment starts lowercase names a package.
    pub fn kind(&self) -> TargetKind {
        let last = self.target.rsplit('.').next().unwrap_or(&self.target);
        match last.chars().next() {
            Some(c) if c.is_lowercase() => TargetKind::Package,
            _ => TargetKind::Class,
        }
    }

    pub fn is_package(&self) -> bool {
        self.kind() == TargetKind::Package
    }
}

impl fmt::Display for FlagDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.target, self.flag, self.enabled_by_default, self.inverse
        )
    }
}

/// `true` in any letter case is true; anything else, including garbage, is false.
pub fn parse_boolean(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// All flag declarations known to this process, in cache order.
#[derive(Debug, Clone, Default)]
pub struct FlagDeclarationIndex {
    declarations: Vec<FlagDeclaration>,
}

impl FlagDeclarationIndex {
    pub fn new(declarations: Vec<FlagDeclaration>) -> Self {
        Self { declarations }
    }

    /// Loads the index from its cache. An absent cache means no archive declared
    /// any flag, which is an empty index.
    pub fn load(cache: &IndexCache) -> Result<Self> {
        match cache.read_lines()? {
            Some(lines) => Self::from_lines(cache.name(), &lines),
            None => {
                tracing::debug!(cache = %cache.path().display(), "no flag declaration cache, nothing is flagged");
                Ok(Self::default())
            }
        }
    }

    pub fn from_lines(origin: &str, lines: &[String]) -> Result<Self> {
        let mut declarations = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() || is_module_marker(line) {
                continue;
            }
            declarations.push(FlagDeclaration::parse(line, origin, idx + 1)?);
        }
        Ok(Self { declarations })
    }

    pub fn declarations(&self) -> &[FlagDeclaration] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}
