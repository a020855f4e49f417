//! Tree sources: the (path, bytes) enumeration backends the walker runs over.
//!
//! A directory, a single plain file and a zip or tar archive all look the same
//! to the walker: a tree of `/`-separated relative paths that can be listed one
//! directory at a time and opened for reading.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::errors::{Result, ScanError};
use crate::scanner::archive::{HEADER_LEN, detect_archive};

/// Kind of an entry as reported by its source, without following links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub kind: EntryKind,
    pub len: u64,
}

impl SourceEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EntryKind, len: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            len,
        }
    }
}

/// Backend enumerating a tree of entries.
///
/// Paths are relative to the root and `/`-separated; the root directory
/// itself is the empty string.
pub trait TreeSource: Send + Sync + fmt::Debug {
    /// List the direct children of `dir`.
    fn read_dir(&self, dir: &str) -> io::Result<Vec<SourceEntry>>;

    /// Open the regular file at `path` for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Human-readable description used in logs and error messages.
    fn describe(&self) -> String;

    /// Read the whole entry at `path`.
    fn read_all(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// On-disk location of the file at `path`, when it has one.
    fn local_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }

    /// A problem found while indexing that hid part of the tree, such as a
    /// truncated archive stream. The entries that were indexed stay usable.
    fn fault(&self) -> Option<String> {
        None
    }
}

/// Join a parent directory and a child name.
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

// ──────────────────── filesystem ────────────────────

/// A directory on disk. Symlinks are reported, never followed.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

impl TreeSource for FsSource {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<SourceEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(dir))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let (kind, len) = match entry.file_type() {
                Ok(ft) if ft.is_symlink() => (EntryKind::Symlink, 0),
                Ok(ft) if ft.is_dir() => (EntryKind::Dir, 0),
                Ok(ft) if ft.is_file() => {
                    // DirEntry::metadata does not traverse symlinks.
                    let len = entry.metadata().map_or(0, |m| m.len());
                    (EntryKind::File, len)
                }
                Ok(_) | Err(_) => (EntryKind::Other, 0),
            };
            entries.push(SourceEntry { name, kind, len });
        }
        Ok(entries)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(self.resolve(path))?))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        Some(self.resolve(path))
    }
}

// ──────────────────── single file ────────────────────

/// A plain file given as the input: a root holding exactly one entry.
#[derive(Debug, Clone)]
pub struct SingleFileSource {
    path: PathBuf,
    name: String,
    len: u64,
}

impl SingleFileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, len: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy())
            .into_owned();
        Self { path, name, len }
    }
}

impl TreeSource for SingleFileSource {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<SourceEntry>> {
        if dir.is_empty() {
            Ok(vec![SourceEntry::new(
                self.name.clone(),
                EntryKind::File,
                self.len,
            )])
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, dir.to_string()))
        }
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        if path == self.name {
            Ok(Box::new(File::open(&self.path)?))
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()))
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        (path == self.name).then(|| self.path.clone())
    }
}

/// Open the session input as a tree source.
///
/// Directories are walked in place, recognized archives become virtual
/// roots and any other file is a root holding just that file.
pub fn open_input(path: &Path) -> Result<Arc<dyn TreeSource>> {
    let meta = fs::metadata(path).map_err(|e| ScanError::io(path, e))?;
    if meta.is_dir() {
        return Ok(Arc::new(FsSource::new(path)));
    }

    let mut file = File::open(path).map_err(|e| ScanError::io(path, e))?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    file.by_ref()
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)
        .map_err(|e| ScanError::io(path, e))?;

    match detect_archive(path, &header) {
        #[cfg(feature = "archives")]
        Some(kind) => {
            io::Seek::rewind(&mut file).map_err(|e| ScanError::io(path, e))?;
            crate::scanner::archive::open_archive(kind, file, path)
        }
        _ => Ok(Arc::new(SingleFileSource::new(path, meta.len()))),
    }
}
