//! Which nested archives are worth walking.
//!
//! Skipping an archive that does carry declarations silently loses them, so
//! filters here stay broad: when in doubt, walk.

pub trait ArchiveFilter {
    fn allowed(&self, nested_archive_path: &str) -> bool;
}

impl<F> ArchiveFilter for F
where
    F: Fn(&str) -> bool,
{
    fn allowed(&self, nested_archive_path: &str) -> bool {
        self(nested_archive_path)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllArchives;

impl ArchiveFilter for AllowAllArchives {
    fn allowed(&self, _nested_archive_path: &str) -> bool {
        true
    }
}

/// Walks archives whose file name starts with one of the prefixes, e.g.
/// `nexus-` for the product's own modules. No prefixes walks everything.
#[derive(Debug, Clone, Default)]
pub struct PrefixArchiveFilter {
    prefixes: Vec<String>,
}

impl PrefixArchiveFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }
}

impl ArchiveFilter for PrefixArchiveFilter {
    fn allowed(&self, nested_archive_path: &str) -> bool {
        if self.prefixes.is_empty() {
            return true;
        }
        let file_name = nested_archive_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(nested_archive_path);
        self.prefixes.iter().any(|p| file_name.starts_with(p.as_str()))
    }
}
