//! Scan and query sessions: the two public iteration operations.
//!
//! A session validates everything that can fail before any artifact is
//! read (filters first, then the query, then configuration, then the
//! input root) and afterwards yields results one pull at a time. Problems
//! with individual artifacts never end a session; they are counted,
//! optionally reported and the artifact is skipped.
//!
//! [`Session::extract`] drives a scan to completion and writes each decoded
//! artifact below an output directory.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::config::ScanOptions;
use crate::core::errors::{Result, ScanError};
use crate::core::value::Value;
use crate::query::Query;
use crate::scanner::item::ContentItem;
use crate::scanner::matcher::PathMatcher;
use crate::scanner::sniff::ContentType;
use crate::scanner::source::{EntryKind, TreeSource, open_input};
use crate::scanner::walker::{WalkEvent, Walker};

pub use crate::query::DEFAULT_QUERY;
pub use crate::scanner::walker::ScanStats;

/// Scan `input` and yield every regular file matching one of `filter`.
///
/// `query` is validated but has no effect on the items yielded. `verbose`
/// only controls diagnostics.
pub fn scan<P, S>(input: P, filter: &[S], query: Option<&str>, verbose: bool) -> Result<Scan>
where
    P: Into<PathBuf>,
    S: AsRef<str>,
{
    let mut session = Session::new(input).filter(filter).verbose(verbose);
    if let Some(query) = query {
        session = session.query(query);
    }
    session.scan()
}

/// Decode every match of `filter` under `input` and yield the results of
/// `query` applied to each, in walk order.
pub fn jq<P, S>(query: &str, input: P, filter: &[S], verbose: bool) -> Result<Jq>
where
    P: Into<PathBuf>,
    S: AsRef<str>,
{
    Session::new(input).filter(filter).verbose(verbose).jq(query)
}

/// Write every match of `filter` under `input` into `dest`, decoded.
///
/// `dest` must be empty or missing unless `force` is set.
pub fn extract<P, S, D>(input: P, filter: &[S], dest: D, force: bool, verbose: bool) -> Result<ExtractSummary>
where
    P: Into<PathBuf>,
    S: AsRef<str>,
    D: AsRef<Path>,
{
    Session::new(input)
        .filter(filter)
        .verbose(verbose)
        .extract(dest.as_ref(), force)
}

/// Per-item event surfaced to observers and, in verbose sessions, the log.
#[derive(Debug)]
pub enum Diagnostic {
    /// A regular file was visited but matched no filter.
    Unmatched { path: String },
    /// A symlink or special file was passed over.
    NotRegular { path: String, kind: EntryKind },
    /// An entry or item was dropped because of an error.
    Skipped { path: String, error: ScanError },
}

impl Diagnostic {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Unmatched { path } | Self::NotRegular { path, .. } | Self::Skipped { path, .. } => {
                path
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmatched { path } => write!(f, "unmatched: {path}"),
            Self::NotRegular { path, kind } => write!(f, "not a regular file ({kind:?}): {path}"),
            Self::Skipped { path, error } => write!(f, "skipped {path}: {error}"),
        }
    }
}

type Observer = Box<dyn FnMut(&Diagnostic) + Send>;

enum Input {
    Path(PathBuf),
    Source(Arc<dyn TreeSource>),
}

/// Builder for a scan or query session.
pub struct Session {
    input: Input,
    filter: Vec<String>,
    query: Option<String>,
    options: ScanOptions,
    verbose: Option<bool>,
    observer: Option<Observer>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input = match &self.input {
            Input::Path(path) => path.display().to_string(),
            Input::Source(source) => source.describe(),
        };
        f.debug_struct("Session")
            .field("input", &input)
            .field("filter", &self.filter)
            .field("query", &self.query)
            .field("options", &self.options)
            .field("verbose", &self.verbose)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Session {
    /// Session over a directory, archive or single file.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self::with_input(Input::Path(input.into()))
    }

    /// Session over an already opened tree source.
    pub fn with_source(source: Arc<dyn TreeSource>) -> Self {
        Self::with_input(Input::Source(source))
    }

    fn with_input(input: Input) -> Self {
        Self {
            input,
            filter: Vec::new(),
            query: None,
            options: ScanOptions::default(),
            verbose: None,
            observer: None,
        }
    }

    #[must_use]
    pub fn filter<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        self.filter = patterns.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    /// Query validated by [`Session::scan`]; reserved, it does not change the items.
    #[must_use]
    pub fn query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    /// Replace the scan options. An explicit [`Session::verbose`] still wins,
    /// whichever order the two are set in.
    #[must_use]
    pub fn options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Receive every skipped item, and in verbose sessions every unmatched entry.
    #[must_use]
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&Diagnostic) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn scan(mut self) -> Result<Scan> {
        let query = self.query.take();
        let (walker, reporter, _) = self.start(query.as_deref())?;
        Ok(Scan { walker, reporter })
    }

    pub fn jq(self, query: &str) -> Result<Jq> {
        let (walker, reporter, query) = self.start(Some(query))?;
        Ok(Jq {
            walker,
            reporter,
            query: query.unwrap_or_default(),
            pending: VecDeque::new(),
        })
    }

    /// Run the scan to the end, writing each decoded match to
    /// `dest/<item path>`.
    ///
    /// Text is written as-is, opaque binary as its raw bytes and everything
    /// else as pretty-printed JSON. Items that fail to decode are skipped
    /// like in [`Session::jq`]; failing to write is fatal.
    pub fn extract(self, dest: &Path, force: bool) -> Result<ExtractSummary> {
        let mut scan = self.scan()?;
        prepare_output(dest, force)?;

        let mut summary = ExtractSummary::default();
        while let Some(item) = scan.next() {
            let path = item.path().to_string();
            let content = match render(&item) {
                Ok(content) => content,
                Err(error) => {
                    scan.walker.note_skipped();
                    scan.reporter.item_failed(path, error);
                    continue;
                }
            };
            let target = dest.join(&path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| ScanError::io(parent, e))?;
            }
            fs::write(&target, &content).map_err(|e| ScanError::io(&target, e))?;
            debug!(%path, target = %target.display(), bytes = content.len(), "extracted");
            summary.written += 1;
            summary.bytes += content.len() as u64;
        }
        summary.stats = scan.finish()?;
        Ok(summary)
    }

    fn start(self, query: Option<&str>) -> Result<(Walker, Reporter, Option<Query>)> {
        let mut options = self.options;
        if let Some(verbose) = self.verbose {
            options.verbose = verbose;
        }
        let matcher = PathMatcher::compile(&self.filter, options.case_sensitive)?;
        let query = query.map(Query::parse).transpose()?;
        options.validate()?;

        let source = match self.input {
            Input::Path(path) => open_input(&path)?,
            Input::Source(source) => source,
        };
        debug!(
            source = %source.describe(),
            patterns = ?matcher.patterns().collect::<Vec<_>>(),
            "starting scan"
        );
        let walker = Walker::new(source, matcher, &options)?;
        let reporter = Reporter {
            verbose: options.verbose,
            observer: self.observer,
            errors: 0,
            limit: options.max_item_errors,
            abort: None,
        };
        Ok((walker, reporter, query))
    }
}

/// Counters from [`Session::extract`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Files written.
    pub written: usize,
    /// Bytes written across all files.
    pub bytes: u64,
    /// Walk counters of the underlying scan.
    pub stats: ScanStats,
}

fn prepare_output(dest: &Path, force: bool) -> Result<()> {
    if !force && dest.is_dir() {
        let mut entries = fs::read_dir(dest).map_err(|e| ScanError::io(dest, e))?;
        if entries.next().is_some() {
            return Err(ScanError::OutputNotEmpty {
                path: dest.to_path_buf(),
            });
        }
    }
    fs::create_dir_all(dest).map_err(|e| ScanError::io(dest, e))
}

fn render(item: &ContentItem) -> Result<Vec<u8>> {
    let decoded = item.decode()?;
    Ok(match (decoded.content_type, decoded.value) {
        (ContentType::Text, Value::String(text)) => text.into_bytes(),
        (ContentType::Unknown, Value::Bytes(bytes)) => bytes,
        (_, value) => {
            let mut out = serde_json::to_vec_pretty(&value)?;
            out.push(b'\n');
            out
        }
    })
}

/// Routes diagnostics and enforces the per-session error budget.
struct Reporter {
    verbose: bool,
    observer: Option<Observer>,
    errors: usize,
    limit: Option<usize>,
    abort: Option<ScanError>,
}

impl Reporter {
    fn event(&mut self, event: WalkEvent) -> Option<ContentItem> {
        match event {
            WalkEvent::Matched(item) => return Some(item),
            WalkEvent::Unmatched { path } => {
                if self.verbose {
                    debug!(%path, "entry did not match any filter");
                    self.notify(&Diagnostic::Unmatched { path });
                }
            }
            WalkEvent::NotRegular { path, kind } => {
                if self.verbose {
                    debug!(%path, ?kind, "skipping non-regular entry");
                    self.notify(&Diagnostic::NotRegular { path, kind });
                }
            }
            WalkEvent::Failed { path, error } => self.item_failed(path, error),
        }
        None
    }

    fn item_failed(&mut self, path: String, error: ScanError) {
        self.errors += 1;
        if self.verbose {
            warn!(%path, code = error.code(), %error, "skipping item");
        }
        self.notify(&Diagnostic::Skipped { path, error });

        if let Some(limit) = self.limit
            && self.errors > limit
            && self.abort.is_none()
        {
            warn!(count = self.errors, limit, "error budget exhausted; ending scan");
            self.abort = Some(ScanError::ErrorBudgetExhausted {
                count: self.errors,
                limit,
            });
        }
    }

    fn notify(&mut self, diagnostic: &Diagnostic) {
        if let Some(observer) = self.observer.as_mut() {
            observer(diagnostic);
        }
    }

    const fn aborted(&self) -> bool {
        self.abort.is_some()
    }

    fn finish(self, stats: ScanStats) -> Result<ScanStats> {
        match self.abort {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }
}

/// Lazy sequence of matched items, in depth-first lexicographic order.
pub struct Scan {
    walker: Walker,
    reporter: Reporter,
}

impl Scan {
    #[must_use]
    pub const fn stats(&self) -> ScanStats {
        self.walker.stats()
    }

    /// The error that ended this scan early, if any.
    #[must_use]
    pub const fn abort_error(&self) -> Option<&ScanError> {
        self.reporter.abort.as_ref()
    }

    /// Final counters, or the error that ended the scan early.
    pub fn finish(self) -> Result<ScanStats> {
        self.reporter.finish(self.walker.stats())
    }
}

impl fmt::Debug for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scan")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Iterator for Scan {
    type Item = ContentItem;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.reporter.aborted() {
            let event = self.walker.next_event()?;
            if let Some(item) = self.reporter.event(event) {
                return Some(item);
            }
        }
        None
    }
}

/// Lazy sequence of query results over every matched item.
pub struct Jq {
    walker: Walker,
    reporter: Reporter,
    query: Query,
    pending: VecDeque<Value>,
}

impl Jq {
    #[must_use]
    pub const fn stats(&self) -> ScanStats {
        self.walker.stats()
    }

    #[must_use]
    pub const fn abort_error(&self) -> Option<&ScanError> {
        self.reporter.abort.as_ref()
    }

    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Final counters, or the error that ended the query early.
    pub fn finish(self) -> Result<ScanStats> {
        self.reporter.finish(self.walker.stats())
    }

    fn evaluate(&self, item: ContentItem) -> Result<Vec<Value>> {
        let value = item.into_value()?;
        if self.query.expr().is_identity() {
            return Ok(vec![value]);
        }
        self.query.apply(&value)
    }
}

impl fmt::Debug for Jq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jq")
            .field("query", &self.query.source())
            .field("stats", &self.stats())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Iterator for Jq {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(value) = self.pending.pop_front() {
                return Some(value);
            }
            if self.reporter.aborted() {
                return None;
            }
            let event = self.walker.next_event()?;
            let Some(item) = self.reporter.event(event) else {
                continue;
            };
            let path = item.path().to_string();
            match self.evaluate(item) {
                Ok(values) => self.pending.extend(values),
                Err(error) => {
                    self.walker.note_skipped();
                    self.reporter.item_failed(path, error);
                }
            }
        }
    }
}
