//! Archive-backed tree sources: zip, tar, tar.gz and tar.xz.
//!
//! Archives are flat member lists; [`ArchiveIndex`] rebuilds the directory
//! tree the walker expects. Zip members are read through the central
//! directory. Tar members are located by offset inside a seekable copy of the
//! uncompressed stream, so member bytes are never held in memory.

#![allow(missing_docs)]

use std::path::Path;

#[cfg(feature = "archives")]
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::PathBuf,
    sync::Arc,
};

#[cfg(feature = "archives")]
use parking_lot::Mutex;
#[cfg(feature = "archives")]
use tracing::{debug, warn};

#[cfg(feature = "archives")]
use crate::core::errors::{Result, ScanError};
#[cfg(feature = "archives")]
use crate::scanner::source::{EntryKind, SourceEntry, TreeSource, join};

// ──────────────────── detection ────────────────────

/// Archive formats accepted as input roots and descended into during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarXz,
}

const TAR_MAGIC_OFFSET: usize = 257;
const XZ_MAGIC: &[u8] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];

/// Leading bytes needed to recognize every supported format.
pub const HEADER_LEN: usize = TAR_MAGIC_OFFSET + 8;

impl ArchiveKind {
    /// Recognize an archive by its leading bytes.
    #[must_use]
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
            Some(Self::Zip)
        } else if header.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else if header.starts_with(XZ_MAGIC) {
            Some(Self::TarXz)
        } else if header
            .get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5)
            .is_some_and(|magic| magic == b"ustar")
        {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Recognize an archive by file name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Recognize an archive by magic bytes, then by file extension.
#[must_use]
pub fn detect_archive(path: &Path, header: &[u8]) -> Option<ArchiveKind> {
    ArchiveKind::from_magic(header).or_else(|| {
        path.file_name()
            .and_then(|name| ArchiveKind::from_name(&name.to_string_lossy()))
    })
}

// ──────────────────── archive index ────────────────────

/// Directory listing reconstructed from a flat archive member list.
#[cfg(feature = "archives")]
#[derive(Debug, Default)]
struct ArchiveIndex {
    dirs: BTreeMap<String, BTreeMap<String, SourceEntry>>,
}

#[cfg(feature = "archives")]
impl ArchiveIndex {
    fn new() -> Self {
        let mut index = Self::default();
        index.dirs.insert(String::new(), BTreeMap::new());
        index
    }

    /// Record a member, creating any missing parent directories.
    fn insert(&mut self, path: &str, kind: EntryKind, len: u64) {
        let mut parent = String::new();
        let mut components = path.split('/').peekable();
        while let Some(component) = components.next() {
            let is_leaf = components.peek().is_none();
            let current = join(&parent, component);
            let entry_kind = if is_leaf { kind } else { EntryKind::Dir };
            let children = self.dirs.entry(parent).or_default();
            children
                .entry(component.to_string())
                .and_modify(|existing| {
                    if is_leaf && existing.kind != EntryKind::Dir {
                        *existing = SourceEntry::new(component, kind, len);
                    }
                })
                .or_insert_with(|| SourceEntry::new(component, entry_kind, len));
            if entry_kind == EntryKind::Dir {
                self.dirs.entry(current.clone()).or_default();
            }
            parent = current;
        }
    }

    fn read_dir(&self, dir: &str) -> io::Result<Vec<SourceEntry>> {
        self.dirs.get(dir).map_or_else(
            || Err(io::Error::new(io::ErrorKind::NotFound, dir.to_string())),
            |children| Ok(children.values().cloned().collect()),
        )
    }
}

/// Normalize an archive member name; `None` for names that escape the root.
#[cfg(feature = "archives")]
fn normalize_member(raw: &str) -> Option<String> {
    let raw = raw.replace('\\', "/");
    let mut parts = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            other => parts.push(other),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(feature = "archives")]
fn archive_error(path: &Path, err: &dyn std::error::Error) -> ScanError {
    ScanError::Archive {
        path: path.to_path_buf(),
        details: err.to_string(),
    }
}

// ──────────────────── zip ────────────────────

/// Zip archive with random access by member name.
#[cfg(feature = "archives")]
pub struct ZipSource {
    path: PathBuf,
    archive: Mutex<zip::ZipArchive<File>>,
    index: ArchiveIndex,
    // normalized path -> name as stored in the archive
    names: HashMap<String, String>,
}

#[cfg(feature = "archives")]
impl fmt::Debug for ZipSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipSource")
            .field("path", &self.path)
            .field("members", &self.names.len())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "archives")]
impl ZipSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_file(file, path)
    }

    /// Index an already opened zip; `path` labels it in errors and logs.
    pub fn from_file(file: File, path: &Path) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(file).map_err(|e| archive_error(path, &e))?;

        let mut index = ArchiveIndex::new();
        let mut names = HashMap::new();
        for i in 0..archive.len() {
            let member = archive
                .by_index_raw(i)
                .map_err(|e| archive_error(path, &e))?;
            let raw = member.name().to_string();
            let Some(normalized) = normalize_member(&raw) else {
                debug!(archive = %path.display(), member = %raw, "skipping unsafe member path");
                continue;
            };
            let kind = if member.is_dir() {
                EntryKind::Dir
            } else if member
                .unix_mode()
                .is_some_and(|mode| mode & 0o170_000 == 0o120_000)
            {
                EntryKind::Symlink
            } else {
                EntryKind::File
            };
            index.insert(&normalized, kind, member.size());
            if kind == EntryKind::File {
                names.insert(normalized, raw);
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
            index,
            names,
        })
    }
}

#[cfg(feature = "archives")]
impl TreeSource for ZipSource {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<SourceEntry>> {
        self.index.read_dir(dir)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let raw = self
            .names
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        let mut archive = self.archive.lock();
        let mut member = archive.by_name(raw).map_err(io::Error::other)?;
        let mut buf = Vec::with_capacity(usize::try_from(member.size()).unwrap_or(0));
        member.read_to_end(&mut buf)?;
        Ok(Box::new(io::Cursor::new(buf)))
    }

    fn describe(&self) -> String {
        format!("zip:{}", self.path.display())
    }
}

// ──────────────────── tar ────────────────────

#[cfg(feature = "archives")]
#[derive(Debug, Clone, Copy)]
struct Span {
    offset: u64,
    len: u64,
}

/// Plain, gzip or xz compressed tar.
///
/// Compressed streams are decompressed once into an anonymous temporary
/// file; a plain tar is read in place. Either way the listing is built up
/// front and members are read by seeking to their data.
#[cfg(feature = "archives")]
pub struct TarSource {
    path: PathBuf,
    data: Arc<Mutex<File>>,
    index: ArchiveIndex,
    spans: HashMap<String, Span>,
    fault: Option<String>,
}

#[cfg(feature = "archives")]
impl fmt::Debug for TarSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarSource")
            .field("path", &self.path)
            .field("members", &self.spans.len())
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "archives")]
impl TarSource {
    pub fn open(path: &Path, kind: ArchiveKind) -> Result<Self> {
        let file = File::open(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_file(file, kind, path)
    }

    /// Index an already opened tar of the given flavor; `path` labels it.
    pub fn from_file(file: File, kind: ArchiveKind, path: &Path) -> Result<Self> {
        let (data, stream_fault) = match kind {
            ArchiveKind::TarGz => {
                let mut decoder = flate2::read::MultiGzDecoder::new(io::BufReader::new(file));
                spool(path, |out| io::copy(&mut decoder, out).map(drop).map_err(|e| e.to_string()))?
            }
            ArchiveKind::TarXz => {
                let mut input = io::BufReader::new(file);
                spool(path, |out| lzma_rs::xz_decompress(&mut input, out).map_err(|e| e.to_string()))?
            }
            ArchiveKind::Tar | ArchiveKind::Zip => (file, None),
        };
        let members = index_members(&data, path)?;

        Ok(Self {
            path: path.to_path_buf(),
            data: Arc::new(Mutex::new(data)),
            index: members.index,
            spans: members.spans,
            fault: stream_fault.or(members.fault),
        })
    }
}

/// Decompress into an anonymous temporary file.
///
/// A stream that breaks off part way keeps what was recovered and returns
/// the failure alongside it; nothing recovered at all is an error.
#[cfg(feature = "archives")]
fn spool<F>(path: &Path, decompress: F) -> Result<(File, Option<String>)>
where
    F: FnOnce(&mut File) -> std::result::Result<(), String>,
{
    let mut out = tempfile::tempfile().map_err(|e| ScanError::io(path, e))?;
    let fault = decompress(&mut out).err();
    let written = out.stream_position().map_err(|e| ScanError::io(path, e))?;
    if written == 0
        && let Some(details) = fault
    {
        return Err(ScanError::Archive {
            path: path.to_path_buf(),
            details,
        });
    }
    out.rewind().map_err(|e| ScanError::io(path, e))?;
    Ok((out, fault))
}

#[cfg(feature = "archives")]
struct Members {
    index: ArchiveIndex,
    spans: HashMap<String, Span>,
    fault: Option<String>,
}

#[cfg(feature = "archives")]
fn index_members(data: &File, path: &Path) -> Result<Members> {
    let mut archive = tar::Archive::new(data);
    let entries = archive
        .entries_with_seek()
        .map_err(|e| archive_error(path, &e))?;

    let mut index = ArchiveIndex::new();
    let mut spans = HashMap::new();
    let mut links = Vec::new();
    let mut fault = None;
    for (position, entry) in entries.enumerate() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if position == 0 => return Err(archive_error(path, &err)),
            Err(err) => {
                warn!(archive = %path.display(), error = %err, "tar stream ends in a damaged header");
                fault = Some(err.to_string());
                break;
            }
        };
        let raw = match entry.path() {
            Ok(raw) => raw.to_string_lossy().into_owned(),
            Err(err) => {
                debug!(archive = %path.display(), error = %err, "skipping member with undecodable name");
                continue;
            }
        };
        let Some(name) = normalize_member(&raw) else {
            debug!(archive = %path.display(), member = %raw, "skipping unsafe member path");
            continue;
        };

        let header_type = entry.header().entry_type();
        if header_type.is_file() {
            let span = Span {
                offset: entry.raw_file_position(),
                len: entry.size(),
            };
            index.insert(&name, EntryKind::File, span.len);
            spans.insert(name, span);
        } else if header_type.is_hard_link() {
            let target = entry
                .link_name()
                .ok()
                .flatten()
                .and_then(|target| normalize_member(&target.to_string_lossy()));
            match target {
                Some(target) => links.push((name, target)),
                None => index.insert(&name, EntryKind::Other, 0),
            }
        } else if header_type.is_dir() {
            index.insert(&name, EntryKind::Dir, 0);
        } else if header_type.is_symlink() {
            index.insert(&name, EntryKind::Symlink, 0);
        } else {
            index.insert(&name, EntryKind::Other, 0);
        }
    }

    // Hard links share the data of an earlier member.
    for (name, target) in links {
        if let Some(span) = spans.get(&target).copied() {
            index.insert(&name, EntryKind::File, span.len);
            spans.insert(name, span);
        } else {
            debug!(archive = %path.display(), member = %name, %target, "hard link target not in archive");
            index.insert(&name, EntryKind::Other, 0);
        }
    }

    Ok(Members {
        index,
        spans,
        fault,
    })
}

/// Reads one member's bytes out of the shared tar data file.
#[cfg(feature = "archives")]
struct SpanReader {
    data: Arc<Mutex<File>>,
    pos: u64,
    end: u64,
}

#[cfg(feature = "archives")]
impl Read for SpanReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = {
            let mut file = self.data.lock();
            file.seek(SeekFrom::Start(self.pos))?;
            file.read(&mut buf[..want])?
        };
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("member data ends {remaining} bytes early"),
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(feature = "archives")]
impl TreeSource for TarSource {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<SourceEntry>> {
        self.index.read_dir(dir)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let span = self
            .spans
            .get(path)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        Ok(Box::new(SpanReader {
            data: Arc::clone(&self.data),
            pos: span.offset,
            end: span.offset + span.len,
        }))
    }

    fn describe(&self) -> String {
        format!("tar:{}", self.path.display())
    }

    fn fault(&self) -> Option<String> {
        self.fault.clone()
    }
}

// ──────────────────── opening ────────────────────

/// Open an archive of a known kind as a tree source.
#[cfg(feature = "archives")]
pub fn open_archive(kind: ArchiveKind, file: File, path: &Path) -> Result<Arc<dyn TreeSource>> {
    Ok(match kind {
        ArchiveKind::Zip => Arc::new(ZipSource::from_file(file, path)?),
        tar_kind => Arc::new(TarSource::from_file(file, tar_kind, path)?),
    })
}

/// Open the member `key` of `parent` as an archive root of its own.
///
/// `path` is the member's path as the walk reports it. Members without a
/// local file are copied to an anonymous temporary file first.
#[cfg(feature = "archives")]
pub fn open_nested(parent: &dyn TreeSource, key: &str, path: &str) -> Result<Arc<dyn TreeSource>> {
    let label = Path::new(path);
    let io_error = |e: io::Error| ScanError::io(label, e);

    let mut file = match parent.local_path(key) {
        Some(local) => File::open(local).map_err(io_error)?,
        None => {
            let mut spool = tempfile::tempfile().map_err(io_error)?;
            let mut member = parent.open(key).map_err(io_error)?;
            io::copy(&mut member, &mut spool).map_err(io_error)?;
            spool
        }
    };
    file.rewind().map_err(io_error)?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    file.by_ref()
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)
        .map_err(io_error)?;
    file.rewind().map_err(io_error)?;

    let kind = detect_archive(label, &header).ok_or_else(|| ScanError::Archive {
        path: label.to_path_buf(),
        details: "not a recognized archive".to_string(),
    })?;
    open_archive(kind, file, label)
}
