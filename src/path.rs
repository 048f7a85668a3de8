//! Node addressing shared by the change map and the annotator.
//!
//! A path is a list of segments: object keys as-is, array positions as their
//! decimal index. Displayed dotted (`items.0.name`); the root is the empty path.
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root() -> Self { Self(Vec::new()) }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse the dotted display form. An empty string is the root.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self(dotted.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_root(&self) -> bool { self.0.is_empty() }
    pub fn last(&self) -> Option<&str> { self.0.last().map(String::as_str) }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut out = self.clone();
        out.0.push(segment.into());
        out
    }

    pub fn index(&self, i: usize) -> Self { self.child(i.to_string()) }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Prefix of the first `n` segments.
    pub fn truncated(&self, n: usize) -> Self {
        Self(self.0[..n.min(self.0.len())].to_vec())
    }

    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Array position encoded by a segment, if it is one.
pub fn segment_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
