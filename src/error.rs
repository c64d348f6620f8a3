use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::result::ZipError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures raised while walking archives, reading caches or parsing declarations.
///
/// All of them are fatal for the bootstrap that raised them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("module index {resource} not found in {}", archive.display())]
    MissingModuleIndex { archive: PathBuf, resource: String },

    #[error("malformed module index: {0}")]
    MalformedModuleIndex(String),

    #[error("nested archive {module} is listed in the module index but missing from {}", archive.display())]
    MissingNestedArchive { archive: PathBuf, module: String },

    #[error("parse error in {origin} line {line}: {reason}")]
    Parse {
        origin: String,
        line: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorCategory {
    Io,
    Index,
    Parse,
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn archive(path: impl AsRef<Path>, source: ZipError) -> Self {
        Self::Archive {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(origin: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.into(),
            line,
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io { .. } | Self::Archive { .. } => ErrorCategory::Io,
            Self::MissingModuleIndex { .. }
            | Self::MalformedModuleIndex(_)
            | Self::MissingNestedArchive { .. } => ErrorCategory::Index,
            Self::Parse { .. } => ErrorCategory::Parse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_failure_class() {
        let io = Error::io("/tmp/x", std::io::Error::other("boom"));
        assert_eq!(io.category(), ErrorCategory::Io);

        let missing = Error::MissingNestedArchive {
            archive: PathBuf::from("app.jar"),
            module: "BOOT-INF/lib/a.jar".to_string(),
        };
        assert_eq!(missing.category(), ErrorCategory::Index);
        assert!(missing.to_string().contains("BOOT-INF/lib/a.jar"));

        let parse = Error::parse("feature-flags", 3, "expected 4 fields");
        assert_eq!(parse.category(), ErrorCategory::Parse);
        assert_eq!(
            parse.to_string(),
            "parse error in feature-flags line 3: expected 4 fields"
        );
    }
}
