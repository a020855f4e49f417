//! Scans read no more of the tree than the consumer pulls.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use artiscan::prelude::*;
use artiscan::scanner::source::{EntryKind, SourceEntry};

/// In-memory tree that counts every listing and every byte handed out.
#[derive(Debug, Default)]
struct CountingSource {
    dirs: BTreeMap<String, Vec<SourceEntry>>,
    files: BTreeMap<String, Arc<[u8]>>,
    listings: Arc<AtomicUsize>,
    bytes_read: Arc<AtomicUsize>,
}

impl CountingSource {
    fn with_file(mut self, dir: &str, name: &str, bytes: &[u8]) -> Self {
        self.dirs
            .entry(dir.to_string())
            .or_default()
            .push(SourceEntry::new(name, EntryKind::File, bytes.len() as u64));
        let path = if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        };
        self.files.insert(path, Arc::from(bytes));
        self
    }

    fn with_dir(mut self, parent: &str, name: &str) -> Self {
        self.dirs
            .entry(parent.to_string())
            .or_default()
            .push(SourceEntry::new(name, EntryKind::Dir, 0));
        self
    }
}

struct CountingReader {
    inner: Cursor<Arc<[u8]>>,
    counter: Arc<AtomicUsize>,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }
}

impl TreeSource for CountingSource {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<SourceEntry>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.dirs.get(dir).cloned().unwrap_or_default())
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let bytes = self
            .files
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        Ok(Box::new(CountingReader {
            inner: Cursor::new(Arc::clone(bytes)),
            counter: Arc::clone(&self.bytes_read),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

fn big_text(len: usize) -> Vec<u8> {
    std::iter::repeat_n(b'a', len).collect()
}

fn tree() -> CountingSource {
    CountingSource::default()
        .with_dir("", "a")
        .with_dir("", "b")
        .with_dir("", "c")
        .with_file("a", "first.log", &big_text(1024 * 1024))
        .with_file("b", "second.log", &big_text(1024 * 1024))
        .with_file("c", "third.log", &big_text(1024 * 1024))
}

#[test]
fn first_item_touches_only_its_branch_and_a_bounded_prefix() {
    let source = tree();
    let listings = Arc::clone(&source.listings);
    let bytes_read = Arc::clone(&source.bytes_read);

    let mut scan = Session::with_source(Arc::new(source))
        .filter(&["**/*.log"])
        .scan()
        .unwrap();
    let first = scan.next().expect("one match");

    assert_eq!(first.path(), "a/first.log");
    assert_eq!(first.sniffed_type(), ContentType::Text);
    // Root plus `a`; `b` and `c` are still unlisted.
    assert_eq!(listings.load(Ordering::SeqCst), 2);
    let window = ScanOptions::default().sniff_window;
    assert!(bytes_read.load(Ordering::SeqCst) <= window);
}

#[test]
fn decoding_reads_the_full_item_once() {
    let source = CountingSource::default().with_file("", "state.json", br#"{"ok": true}"#);
    let bytes_read = Arc::clone(&source.bytes_read);

    let mut scan = Session::with_source(Arc::new(source))
        .filter(&["*.json"])
        .scan()
        .unwrap();
    let mut item = scan.next().unwrap();
    let after_sniff = bytes_read.load(Ordering::SeqCst);

    assert_eq!(item.json().unwrap(), serde_json::json!({"ok": true}));
    assert_eq!(item.json().unwrap(), serde_json::json!({"ok": true}));
    assert_eq!(bytes_read.load(Ordering::SeqCst), after_sniff + 12);
}

#[test]
fn unmatched_files_are_never_opened() {
    let source = tree();
    let bytes_read = Arc::clone(&source.bytes_read);

    let found: Vec<_> = Session::with_source(Arc::new(source))
        .filter(&["**/*.json"])
        .scan()
        .unwrap()
        .collect();

    assert!(found.is_empty());
    assert_eq!(bytes_read.load(Ordering::SeqCst), 0);
}
