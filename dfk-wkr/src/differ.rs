//! Differential directory scanning.
//!
//! [`scan`] walks a directory tree lazily and yields every regular file a
//! [`FileFilter`] accepts. Relative paths are `/`-separated and start with
//! the root directory's own name (`distfork123/sub/file`); wrap the scan in
//! [`RootCutOff`] to get paths relative to the root's contents instead.

use std::fs::{self, Metadata, ReadDir};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Decides which files make it into a scan.
pub trait FileFilter {
    fn accept(&self, path: &Path, metadata: &Metadata) -> bool;
}

/// Accepts files whose modification time is at or after the reference.
///
/// The comparison is inclusive so that files written in the same clock tick
/// as the reference on coarse-resolution file systems are still captured.
#[derive(Debug, Clone, Copy)]
pub struct ModifiedSince(pub SystemTime);

impl FileFilter for ModifiedSince {
    fn accept(&self, _path: &Path, metadata: &Metadata) -> bool {
        metadata
            .modified()
            .map(|mtime| mtime >= self.0)
            .unwrap_or(false)
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFiles;

impl FileFilter for AllFiles {
    fn accept(&self, _path: &Path, _metadata: &Metadata) -> bool {
        true
    }
}

/// One file found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: PathBuf,
    pub relative: String,
}

/// Lazy depth-first walk over a directory tree.
pub struct Scan<F> {
    stack: Vec<(ReadDir, String)>,
    filter: F,
}

/// Start scanning `root`. Only the root itself is opened up front.
pub fn scan<F: FileFilter>(root: &Path, filter: F) -> io::Result<Scan<F>> {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let entries = fs::read_dir(root)?;
    Ok(Scan {
        stack: vec![(entries, root_name)],
        filter,
    })
}

impl<F: FileFilter> Iterator for Scan<F> {
    type Item = io::Result<DiffEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (entries, prefix) = self.stack.last_mut()?;
            let entry = match entries.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(entry)) => entry,
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            let path = entry.path();

            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => return Some(Err(e)),
            };
            if file_type.is_dir() {
                match fs::read_dir(&path) {
                    Ok(children) => self.stack.push((children, relative)),
                    Err(e) => return Some(Err(e)),
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => return Some(Err(e)),
            };
            if self.filter.accept(&path, &metadata) {
                return Some(Ok(DiffEntry { path, relative }));
            }
        }
    }
}

/// Strip the first path segment. Paths without a separator have nothing
/// left to name and yield `None`.
pub fn cut_root(relative: &str) -> Option<&str> {
    relative
        .split_once('/')
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
}

/// Rewrites scan entries to be relative to the root's contents, dropping any
/// that were not below a root segment.
pub struct RootCutOff<I> {
    inner: I,
}

impl<I> RootCutOff<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> Iterator for RootCutOff<I>
where
    I: Iterator<Item = io::Result<DiffEntry>>,
{
    type Item = io::Result<DiffEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Err(e) => return Some(Err(e)),
                Ok(entry) => {
                    if let Some(rest) = cut_root(&entry.relative) {
                        let relative = rest.to_string();
                        return Some(Ok(DiffEntry {
                            path: entry.path,
                            relative,
                        }));
                    }
                }
            }
        }
    }
}

/// Files under `root` modified at or after `since`, relative to the root's
/// contents.
pub fn changed_since(
    root: &Path,
    since: SystemTime,
) -> io::Result<RootCutOff<Scan<ModifiedSince>>> {
    Ok(RootCutOff::new(scan(root, ModifiedSince(since))?))
}
