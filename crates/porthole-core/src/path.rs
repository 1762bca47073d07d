//! Tree paths
//!
//! Addresses locations in the mirrored state tree using JSON-pointer style
//! paths (RFC 6901): `/package-data/bitcoind/installed/status`. The empty
//! pointer `""` addresses the whole tree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors produced when parsing a tree path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreePathError {
    /// Non-empty paths must start with '/'
    #[error("tree path must start with '/': {0:?}")]
    MissingLeadingSlash(String),
}

/// A path into the mirrored state tree
///
/// Segments address object keys; when the container at a segment is an
/// array, the segment is interpreted as a decimal index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TreePath {
    segments: Vec<String>,
}

impl TreePath {
    /// The root path, addressing the entire tree
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from owned segments
    pub fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Build a path from string-like segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this path addresses the whole tree
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path's segments, in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the root path
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Extend this path with one more segment
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The parent path, or `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The last segment, or `None` for the root
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Whether `prefix` is a (non-strict) prefix of this path
    pub fn starts_with(&self, prefix: &TreePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Whether two paths address overlapping subtrees
    ///
    /// True when either path is a prefix of the other. A change at one of
    /// two intersecting paths is observable from the other.
    pub fn intersects(&self, other: &TreePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// Resolve this path against a tree, returning the addressed subtree
    pub fn resolve<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        let mut current = tree;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve this path against a tree, returning a mutable subtree
    pub fn resolve_mut<'a>(&self, tree: &'a mut Value) -> Option<&'a mut Value> {
        let mut current = tree;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get_mut(segment)?,
                Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            // RFC 6901 escaping: '~' first, then '/'
            let escaped = segment.replace('~', "~0").replace('/', "~1");
            write!(f, "/{}", escaped)?;
        }
        Ok(())
    }
}

impl FromStr for TreePath {
    type Err = TreePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(TreePathError::MissingLeadingSlash(s.to_string()));
        };
        let segments = rest
            .split('/')
            .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
            .collect();
        Ok(Self { segments })
    }
}

impl TryFrom<String> for TreePath {
    type Error = TreePathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TreePath> for String {
    fn from(path: TreePath) -> Self {
        path.to_string()
    }
}
