use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};

pub const MODULE_INDEX_RESOURCE: &str = "BOOT-INF/classpath.idx";

/// Upper bound on the buffer reserved up front for a nested archive; the
/// recorded size comes from the central directory and is not trusted.
const MAX_PREALLOCATION: u64 = 64 << 20;

fn preallocation(recorded_size: u64) -> usize {
    recorded_size.min(MAX_PREALLOCATION) as usize
}

/// The outer application archive: a module index plus the nested archives it lists.
pub trait ApplicationArchive {
    fn location(&self) -> &Path;

    /// Raw text of the module index resource.
    fn read_module_index(&mut self) -> Result<String>;

    fn open_module(&mut self, module: &str) -> Result<NestedArchive>;
}

/// Ordered nested archive paths named by the module index.
pub fn read_module_paths(archive: &mut dyn ApplicationArchive) -> Result<Vec<String>> {
    let text = archive.read_module_index()?;
    parse_module_index(&text)
}

/// One path per line, optionally quoted and prefixed with `- `.
pub fn parse_module_index(text: &str) -> Result<Vec<String>> {
    let mut modules = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let module = line.strip_prefix("- ").unwrap_or(line).replace('"', "");
        let module = module.trim();
        if !module.ends_with(".jar") {
            return Err(Error::MalformedModuleIndex(format!(
                "line {}: not a nested archive path: {line}",
                idx + 1
            )));
        }
        modules.push(module.to_string());
    }
    Ok(modules)
}

pub fn open_application_archive(base: &Path) -> Result<Box<dyn ApplicationArchive>> {
    if base.is_file() {
        Ok(Box::new(JarArchive::open(base)?))
    } else if base.is_dir() {
        Ok(Box::new(ExplodedArchive::new(base)))
    } else {
        Err(Error::io(
            base,
            std::io::Error::new(std::io::ErrorKind::NotFound, "application archive not found"),
        ))
    }
}

/// A packaged archive, memory-mapped and read with `zip`.
pub struct JarArchive {
    path: PathBuf,
    archive: ZipArchive<Cursor<Mmap>>,
}

impl JarArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        // SAFETY: The file is opened read-only and is not modified while the walk runs.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io(path, e))?;
        let archive = ZipArchive::new(Cursor::new(mmap)).map_err(|e| Error::archive(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }
}

impl ApplicationArchive for JarArchive {
    fn location(&self) -> &Path {
        &self.path
    }

    fn read_module_index(&mut self) -> Result<String> {
        let mut entry = match self.archive.by_name(MODULE_INDEX_RESOURCE) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(Error::MissingModuleIndex {
                    archive: self.path.clone(),
                    resource: MODULE_INDEX_RESOURCE.to_string(),
                });
            }
            Err(e) => return Err(Error::archive(&self.path, e)),
        };
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::io(&self.path, e))?;
        String::from_utf8(bytes).map_err(|_| {
            Error::MalformedModuleIndex(format!("{MODULE_INDEX_RESOURCE} is not valid UTF-8"))
        })
    }

    fn open_module(&mut self, module: &str) -> Result<NestedArchive> {
        let mut entry = match self.archive.by_name(module) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(Error::MissingNestedArchive {
                    archive: self.path.clone(),
                    module: module.to_string(),
                });
            }
            Err(e) => return Err(Error::archive(&self.path, e)),
        };
        let mut bytes = Vec::with_capacity(preallocation(entry.size()));
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::io(&self.path, e))?;
        NestedArchive::from_bytes(module, bytes)
    }
}

/// An unpacked application: the module index and nested archives are plain files.
pub struct ExplodedArchive {
    root: PathBuf,
}

impl ExplodedArchive {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl ApplicationArchive for ExplodedArchive {
    fn location(&self) -> &Path {
        &self.root
    }

    fn read_module_index(&mut self) -> Result<String> {
        let index = self.root.join(MODULE_INDEX_RESOURCE);
        if !index.is_file() {
            return Err(Error::MissingModuleIndex {
                archive: self.root.clone(),
                resource: MODULE_INDEX_RESOURCE.to_string(),
            });
        }
        let bytes = std::fs::read(&index).map_err(|e| Error::io(&index, e))?;
        String::from_utf8(bytes).map_err(|_| {
            Error::MalformedModuleIndex(format!("{} is not valid UTF-8", index.display()))
        })
    }

    fn open_module(&mut self, module: &str) -> Result<NestedArchive> {
        let path = self.root.join(module);
        if !path.is_file() {
            return Err(Error::MissingNestedArchive {
                archive: self.root.clone(),
                module: module.to_string(),
            });
        }
        let bytes = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
        NestedArchive::from_bytes(module, bytes)
    }
}

/// One module, held in memory for a single sequential pass over its entries.
pub struct NestedArchive {
    module: String,
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl NestedArchive {
    pub fn from_bytes(module: &str, bytes: Vec<u8>) -> Result<Self> {
        let archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::archive(module, e))?;
        Ok(Self {
            module: module.to_string(),
            archive,
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Visits file entries in physical order. Each entry stream is handed out once.
    pub fn for_each_entry<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, &mut dyn Read) -> Result<()>,
    {
        for i in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(i)
                .map_err(|e| Error::archive(&self.module, e))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            visit(&name, &mut entry)?;
        }
        Ok(())
    }
}
