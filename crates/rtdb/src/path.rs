//! Path: immutable addressing of a location in the tree.
//!
//! A path is an ordered list of non-empty segments. The empty path is the
//! root. Segments never contain `/`: input containing separators is split,
//! and empty pieces are dropped, so `"a//b"`, `["a", "", "b"]` and
//! `["a/b"]` all address the same location.

use std::fmt;

const SEPARATOR: char = '/';

/// Marker returned by [`Path::key_or_root`] for the root path.
pub const ROOT_KEY: &str = "/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from any list of segments, sanitizing as it goes.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::root().child(segments)
    }

    /// Parse a `/`-separated path string.
    pub fn parse(path: &str) -> Self {
        Self::new([path])
    }

    /// Return a new path with `segments` appended.
    pub fn child<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut next = self.segments.clone();
        for segment in segments {
            next.extend(
                segment
                    .as_ref()
                    .split(SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        Self { segments: next }
    }

    /// All but the last segment, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// The last segment, or `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The last segment, or [`ROOT_KEY`] at the root.
    pub fn key_or_root(&self) -> &str {
        self.key().unwrap_or(ROOT_KEY)
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// `/`-joined segments with exactly one leading `/`.
    ///
    /// Pure function of the segments; doubles as the reference cache key.
    pub fn to_path_string(&self) -> String {
        let mut out = String::with_capacity(
            1 + self.segments.iter().map(|s| s.len() + 1).sum::<usize>(),
        );
        out.push(SEPARATOR);
        out.push_str(&self.segments.join("/"));
        out
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path_string())
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for Path {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl<S: AsRef<str>> From<&[S]> for Path {
    fn from(segments: &[S]) -> Self {
        Self::new(segments)
    }
}

impl<S: AsRef<str>, const N: usize> From<[S; N]> for Path {
    fn from(segments: [S; N]) -> Self {
        Self::new(segments)
    }
}

impl<S: AsRef<str>> From<Vec<S>> for Path {
    fn from(segments: Vec<S>) -> Self {
        Self::new(segments)
    }
}
