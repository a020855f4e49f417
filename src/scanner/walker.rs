//! Lazy depth-first walker over a [`TreeSource`].
//!
//! The walker is an explicit cursor: a stack of sorted directory listings.
//! Each pull advances until the next matching regular file, sniffs its
//! leading bytes and yields it. Directories are listed only when the cursor
//! reaches them, so stopping after the first match leaves the rest of the
//! tree unread. Archive members are descended into the same way, under the
//! archive's own path.

#![allow(missing_docs)]
#![allow(clippy::cast_possible_truncation)]

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::ScanOptions;
use crate::core::errors::{Result, ScanError};
use crate::decoders::DecodeOptions;
use crate::scanner::item::ContentItem;
use crate::scanner::matcher::PathMatcher;
use crate::scanner::overrides::TypeOverrides;
use crate::scanner::sniff::classify;
use crate::scanner::source::{EntryKind, SourceEntry, TreeSource, join};

/// Archives nested deeper than this are treated as plain files.
pub const MAX_ARCHIVE_DEPTH: usize = 8;

/// Counters describing how far a walk got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Non-directory entries seen.
    pub visited: usize,
    /// Entries yielded as matches.
    pub matched: usize,
    /// Entries or items dropped because of an error.
    pub skipped: usize,
}

/// One step of the walk.
#[derive(Debug)]
pub enum WalkEvent {
    /// A regular file matched the filter.
    Matched(ContentItem),
    /// A regular file did not match the filter.
    Unmatched { path: String },
    /// A symlink or special file; never followed or yielded.
    NotRegular { path: String, kind: EntryKind },
    /// Listing or reading an entry failed; the walk continues.
    Failed { path: String, error: ScanError },
}

#[derive(Debug)]
struct PendingDir {
    source: Arc<dyn TreeSource>,
    // walk path of the archive holding this listing; empty for the input root
    prefix: Arc<str>,
    depth: usize,
    dir: String,
    entries: std::vec::IntoIter<SourceEntry>,
}

#[derive(Debug)]
pub struct Walker {
    matcher: PathMatcher,
    overrides: TypeOverrides,
    decode_options: Arc<DecodeOptions>,
    sniff_window: usize,
    #[cfg_attr(not(feature = "archives"), allow(dead_code))]
    expand_archives: bool,
    stack: Vec<PendingDir>,
    queued: Option<WalkEvent>,
    stats: ScanStats,
}

impl Walker {
    /// Start a walk. Only the root listing is read here; failing to read it
    /// is an error for the whole walk.
    pub fn new(
        source: Arc<dyn TreeSource>,
        matcher: PathMatcher,
        options: &ScanOptions,
    ) -> Result<Self> {
        let overrides = TypeOverrides::compile(options)?;
        let root = source.read_dir("").map_err(|e| ScanError::Io {
            path: PathBuf::from(source.describe()),
            source: e,
        })?;
        let mut walker = Self {
            matcher,
            overrides,
            decode_options: Arc::new(DecodeOptions::from(options)),
            sniff_window: options.sniff_window,
            expand_archives: options.expand_archives,
            stack: Vec::new(),
            queued: None,
            stats: ScanStats::default(),
        };
        walker.queued = walker.fault_event(source.as_ref(), source.describe());
        walker.push_dir(source, Arc::from(""), 0, String::new(), root);
        Ok(walker)
    }

    #[must_use]
    pub const fn stats(&self) -> ScanStats {
        self.stats
    }

    pub(crate) fn note_skipped(&mut self) {
        self.stats.skipped += 1;
    }

    /// Advance to the next event, or `None` once the tree is exhausted.
    pub fn next_event(&mut self) -> Option<WalkEvent> {
        if let Some(event) = self.queued.take() {
            return Some(event);
        }
        loop {
            let top = self.stack.last_mut()?;
            let Some(entry) = top.entries.next() else {
                self.stack.pop();
                continue;
            };
            let source = Arc::clone(&top.source);
            let prefix = Arc::clone(&top.prefix);
            let depth = top.depth;
            let key = join(&top.dir, &entry.name);
            let path = join(&prefix, &key);

            match entry.kind {
                EntryKind::Dir => match source.read_dir(&key) {
                    Ok(children) => self.push_dir(source, prefix, depth, key, children),
                    Err(error) => {
                        let error = ScanError::io(&path, error);
                        return Some(self.failed(path, error));
                    }
                },
                #[cfg(feature = "archives")]
                EntryKind::File if self.descends_into(&entry.name, depth) => {
                    if let Some(event) = self.descend(source.as_ref(), &key, path, depth) {
                        return Some(event);
                    }
                }
                EntryKind::File => {
                    self.stats.visited += 1;
                    if !self.matcher.matches(&path) {
                        return Some(WalkEvent::Unmatched { path });
                    }
                    return Some(match self.sniff(source.as_ref(), &key) {
                        Ok(head) => {
                            self.stats.matched += 1;
                            let sniffed = self
                                .overrides
                                .resolve(&path)
                                .unwrap_or_else(|| classify(&head));
                            WalkEvent::Matched(ContentItem::new(
                                source,
                                Arc::clone(&self.decode_options),
                                key,
                                path,
                                sniffed,
                                entry.len,
                            ))
                        }
                        Err(error) => {
                            let error = ScanError::io(&path, error);
                            self.failed(path, error)
                        }
                    });
                }
                kind @ (EntryKind::Symlink | EntryKind::Other) => {
                    self.stats.visited += 1;
                    return Some(WalkEvent::NotRegular { path, kind });
                }
            }
        }
    }

    #[cfg(feature = "archives")]
    fn descends_into(&self, name: &str, depth: usize) -> bool {
        self.expand_archives
            && depth < MAX_ARCHIVE_DEPTH
            && crate::scanner::archive::ArchiveKind::from_name(name).is_some()
    }

    /// Push the root listing of the archive at `key`. Returns an event when
    /// the archive cannot be opened or was only partly indexed.
    #[cfg(feature = "archives")]
    fn descend(
        &mut self,
        parent: &dyn TreeSource,
        key: &str,
        path: String,
        depth: usize,
    ) -> Option<WalkEvent> {
        let child = match crate::scanner::archive::open_nested(parent, key, &path) {
            Ok(child) => child,
            Err(error) => return Some(self.failed(path, error)),
        };
        let root = match child.read_dir("") {
            Ok(root) => root,
            Err(error) => {
                let error = ScanError::io(&path, error);
                return Some(self.failed(path, error));
            }
        };
        tracing::debug!(archive = %path, "descending into nested archive");
        let fault = self.fault_event(child.as_ref(), path.clone());
        self.push_dir(child, Arc::from(path), depth + 1, String::new(), root);
        fault
    }

    fn fault_event(&mut self, source: &dyn TreeSource, path: String) -> Option<WalkEvent> {
        let details = source.fault()?;
        let error = ScanError::Archive {
            path: PathBuf::from(&path),
            details,
        };
        Some(self.failed(path, error))
    }

    fn failed(&mut self, path: String, error: ScanError) -> WalkEvent {
        self.stats.skipped += 1;
        WalkEvent::Failed { path, error }
    }

    fn push_dir(
        &mut self,
        source: Arc<dyn TreeSource>,
        prefix: Arc<str>,
        depth: usize,
        dir: String,
        mut entries: Vec<SourceEntry>,
    ) {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        self.stack.push(PendingDir {
            source,
            prefix,
            depth,
            dir,
            entries: entries.into_iter(),
        });
    }

    fn sniff(&self, source: &dyn TreeSource, key: &str) -> std::io::Result<Vec<u8>> {
        let reader = source.open(key)?;
        let mut prefix = Vec::with_capacity(self.sniff_window.min(64 * 1024));
        reader.take(self.sniff_window as u64).read_to_end(&mut prefix)?;
        Ok(prefix)
    }
}

impl Iterator for Walker {
    type Item = ContentItem;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(event) = self.next_event() {
            if let WalkEvent::Matched(item) = event {
                return Some(item);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::sniff::ContentType;
    use crate::scanner::source::FsSource;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("b/nested/z.json"), br#"{"z": 1}"#).unwrap();
        fs::write(root.join("b/m.txt"), b"plain").unwrap();
        fs::write(root.join("a/y.json"), b"[1]").unwrap();
        fs::write(root.join("top.json"), b"{}").unwrap();
        fs::write(root.join("A.bin"), [0u8, 1, 2]).unwrap();
        tmp
    }

    fn walker(root: &std::path::Path, patterns: &[&str]) -> Walker {
        Walker::new(
            Arc::new(FsSource::new(root)),
            PathMatcher::compile(patterns, true).unwrap(),
            &ScanOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn yields_matches_depth_first_in_lexicographic_order() {
        let tmp = tree();
        let paths: Vec<String> = walker(tmp.path(), &["**/*.json"])
            .map(|item| item.path().to_string())
            .collect();
        assert_eq!(paths, vec!["a/y.json", "b/nested/z.json", "top.json"]);
    }

    #[test]
    fn sniffs_each_match() {
        let tmp = tree();
        let types: Vec<(String, ContentType)> = walker(tmp.path(), &["**"])
            .map(|item| (item.path().to_string(), item.sniffed_type()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("A.bin".to_string(), ContentType::Unknown),
                ("a/y.json".to_string(), ContentType::Json),
                ("b/m.txt".to_string(), ContentType::Text),
                ("b/nested/z.json".to_string(), ContentType::Json),
                ("top.json".to_string(), ContentType::Json),
            ]
        );
    }

    #[test]
    fn reports_unmatched_without_changing_matches() {
        let tmp = tree();
        let mut w = walker(tmp.path(), &["b/*.txt"]);
        let mut matched = Vec::new();
        let mut unmatched = Vec::new();
        while let Some(event) = w.next_event() {
            match event {
                WalkEvent::Matched(item) => matched.push(item.path().to_string()),
                WalkEvent::Unmatched { path } => unmatched.push(path),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(matched, vec!["b/m.txt"]);
        assert_eq!(unmatched.len(), 4);
        assert_eq!(
            w.stats(),
            ScanStats {
                visited: 5,
                matched: 1,
                skipped: 0
            }
        );
    }

    #[test]
    fn sniff_window_bounds_the_prefix() {
        let tmp = TempDir::new().unwrap();
        let mut body = b"SQLite format 3\0".to_vec();
        body.extend(std::iter::repeat_n(b'x', 10_000));
        fs::write(tmp.path().join("db"), &body).unwrap();

        let options = ScanOptions {
            sniff_window: 16,
            ..ScanOptions::default()
        };
        let w = Walker::new(
            Arc::new(FsSource::new(tmp.path())),
            PathMatcher::compile(&["db"], true).unwrap(),
            &options,
        )
        .unwrap();
        let items: Vec<_> = w.collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sniffed_type(), ContentType::Sqlite);
        assert_eq!(items[0].len(), body.len() as u64);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let tmp = tree();
        std::os::unix::fs::symlink(tmp.path().join("b"), tmp.path().join("loop")).unwrap();
        let mut w = walker(tmp.path(), &["**/*.json"]);
        let mut not_regular = Vec::new();
        let mut matched = 0;
        while let Some(event) = w.next_event() {
            match event {
                WalkEvent::Matched(_) => matched += 1,
                WalkEvent::NotRegular { path, kind } => not_regular.push((path, kind)),
                _ => {}
            }
        }
        assert_eq!(matched, 3);
        assert_eq!(not_regular, vec![("loop".to_string(), EntryKind::Symlink)]);
    }

    /// In-memory tree whose listed `bad_dirs` and `bad_files` fail to read.
    #[derive(Debug, Default)]
    struct FlakySource {
        dirs: std::collections::BTreeMap<String, Vec<SourceEntry>>,
        bad_dirs: Vec<String>,
        bad_files: Vec<String>,
        fault: Option<String>,
    }

    impl FlakySource {
        fn entry(mut self, dir: &str, name: &str, kind: EntryKind) -> Self {
            self.dirs
                .entry(dir.to_string())
                .or_default()
                .push(SourceEntry::new(name, kind, 4));
            self
        }
    }

    impl TreeSource for FlakySource {
        fn read_dir(&self, dir: &str) -> std::io::Result<Vec<SourceEntry>> {
            if self.bad_dirs.iter().any(|d| d == dir) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "listing denied",
                ));
            }
            Ok(self.dirs.get(dir).cloned().unwrap_or_default())
        }

        fn open(&self, path: &str) -> std::io::Result<Box<dyn Read + Send>> {
            if self.bad_files.iter().any(|f| f == path) {
                return Err(std::io::Error::other("read failed"));
            }
            Ok(Box::new(std::io::Cursor::new(b"text".to_vec())))
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }

        fn fault(&self) -> Option<String> {
            self.fault.clone()
        }
    }

    fn flaky_tree() -> FlakySource {
        FlakySource {
            bad_dirs: vec!["b".into()],
            bad_files: vec!["a/bad.log".into()],
            ..FlakySource::default()
        }
        .entry("", "a", EntryKind::Dir)
        .entry("", "b", EntryKind::Dir)
        .entry("", "c", EntryKind::Dir)
        .entry("a", "bad.log", EntryKind::File)
        .entry("a", "good.log", EntryKind::File)
        .entry("c", "late.log", EntryKind::File)
    }

    #[test]
    fn per_entry_failures_are_reported_and_the_walk_continues() {
        let mut w = Walker::new(
            Arc::new(flaky_tree()),
            PathMatcher::compile(&["**/*.log"], true).unwrap(),
            &ScanOptions::default(),
        )
        .unwrap();

        let mut matched = Vec::new();
        let mut failed = Vec::new();
        while let Some(event) = w.next_event() {
            match event {
                WalkEvent::Matched(item) => matched.push(item.path().to_string()),
                WalkEvent::Failed { path, error } => failed.push((path, error.code())),
                other => panic!("unexpected event {other:?}"),
            }
        }

        assert_eq!(matched, vec!["a/good.log", "c/late.log"]);
        assert_eq!(
            failed,
            vec![
                ("a/bad.log".to_string(), "SCN-2001"),
                ("b".to_string(), "SCN-2001"),
            ]
        );
        assert_eq!(
            w.stats(),
            ScanStats {
                visited: 3,
                matched: 2,
                skipped: 2
            }
        );
    }

    #[test]
    fn source_fault_is_reported_before_the_first_entry() {
        let source = FlakySource {
            fault: Some("unexpected end of stream".into()),
            ..FlakySource::default()
        }
        .entry("", "kept.log", EntryKind::File);
        let mut w = Walker::new(
            Arc::new(source),
            PathMatcher::compile(&["**"], true).unwrap(),
            &ScanOptions::default(),
        )
        .unwrap();

        let Some(WalkEvent::Failed { path, error }) = w.next_event() else {
            panic!("expected the fault first");
        };
        assert_eq!(path, "flaky");
        assert!(matches!(error, ScanError::Archive { details, .. } if details.contains("end of stream")));
        assert!(matches!(w.next_event(), Some(WalkEvent::Matched(item)) if item.path() == "kept.log"));
        assert_eq!(w.stats().skipped, 1);
    }

    #[test]
    fn overrides_replace_the_sniffed_type() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cache.stub"), b"hello").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"hello").unwrap();
        let options = ScanOptions {
            profile: crate::core::config::Profile::Sysdiagnose,
            ..ScanOptions::default()
        };
        let types: Vec<(String, ContentType)> = Walker::new(
            Arc::new(FsSource::new(tmp.path())),
            PathMatcher::compile(&["*"], true).unwrap(),
            &options,
        )
        .unwrap()
        .map(|item| (item.path().to_string(), item.sniffed_type()))
        .collect();
        assert_eq!(
            types,
            vec![
                ("cache.stub".to_string(), ContentType::Plist),
                ("notes.txt".to_string(), ContentType::Text),
            ]
        );
    }

    #[cfg(feature = "archives")]
    fn write_zip(path: &std::path::Path, members: &[(&str, &[u8])]) {
        use std::io::Write;
        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        for (name, bytes) in members {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    #[cfg(feature = "archives")]
    #[test]
    fn nested_archives_are_walked_under_their_own_path() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("logs")).unwrap();
        write_zip(
            &tmp.path().join("logs/crash.zip"),
            &[("b/state.json", br#"{"ok": true}"#), ("a.txt", b"first")],
        );
        fs::write(tmp.path().join("logs/z.txt"), b"after").unwrap();
        fs::write(tmp.path().join("logs/broken.zip"), b"not a zip at all").unwrap();

        let mut w = walker(tmp.path(), &["**"]);
        let mut matched = Vec::new();
        let mut failed = Vec::new();
        while let Some(event) = w.next_event() {
            match event {
                WalkEvent::Matched(mut item) => {
                    matched.push((item.path().to_string(), item.json_string().unwrap()));
                }
                WalkEvent::Failed { path, .. } => failed.push(path),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(
            matched,
            vec![
                ("logs/crash.zip/a.txt".to_string(), r#""first""#.to_string()),
                ("logs/crash.zip/b/state.json".to_string(), r#"{"ok":true}"#.to_string()),
                ("logs/z.txt".to_string(), r#""after""#.to_string()),
            ]
        );
        assert_eq!(failed, vec!["logs/broken.zip"]);
        assert_eq!(w.stats().skipped, 1);
    }

    #[cfg(feature = "archives")]
    #[test]
    fn archive_expansion_can_be_turned_off() {
        let tmp = TempDir::new().unwrap();
        write_zip(&tmp.path().join("crash.zip"), &[("a.txt", b"first")]);
        let options = ScanOptions {
            expand_archives: false,
            ..ScanOptions::default()
        };
        let items: Vec<_> = Walker::new(
            Arc::new(FsSource::new(tmp.path())),
            PathMatcher::compile(&["**"], true).unwrap(),
            &options,
        )
        .unwrap()
        .map(|item| item.path().to_string())
        .collect();
        assert_eq!(items, vec!["crash.zip"]);
    }

    #[test]
    fn missing_root_fails_up_front() {
        let err = Walker::new(
            Arc::new(FsSource::new("/definitely/not/here")),
            PathMatcher::compile(&["**"], true).unwrap(),
            &ScanOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }
}
