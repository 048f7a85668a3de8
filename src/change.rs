//! Change records (as produced by a diff collaborator) and the flattened,
//! prefix-indexed change map the annotator queries.
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::path::{NodePath, segment_index};

/// Key a top-level record uses when the whole root value was replaced.
/// Only [`ChangeMap::for_trees`] reads it that way, and only when the two
/// roots are not containers of the same kind.
pub const ROOT_KEY: &str = "$root";

/// `embeddedKey` for arrays matched by position.
pub const INDEX_EMBEDDED_KEY: &str = "$index";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Add,
    Remove,
    Update,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub key: String,
    /// `Some(Value::Null)` is an explicit null; `None` means the field was absent.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<ChangeRecord>>,
}

fn present<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(de).map(Some)
}

impl ChangeRecord {
    pub fn add(key: impl Into<String>, value: Value) -> Self {
        Self::leaf(ChangeKind::Add, key, Some(value), None)
    }
    pub fn remove(key: impl Into<String>, old_value: Value) -> Self {
        Self::leaf(ChangeKind::Remove, key, None, Some(old_value))
    }
    pub fn update(key: impl Into<String>, old_value: Value, value: Value) -> Self {
        Self::leaf(ChangeKind::Update, key, Some(value), Some(old_value))
    }
    /// Container marker: something changed somewhere below `key`.
    pub fn nested(key: impl Into<String>, changes: Vec<ChangeRecord>) -> Self {
        Self {
            kind: ChangeKind::Update,
            key: key.into(),
            value: None,
            old_value: None,
            embedded_key: None,
            changes: Some(changes),
        }
    }

    fn leaf(kind: ChangeKind, key: impl Into<String>, value: Option<Value>, old_value: Option<Value>) -> Self {
        Self { kind, key: key.into(), value, old_value, embedded_key: None, changes: None }
    }

    pub fn with_embedded_key(mut self, embedded_key: impl Into<String>) -> Self {
        self.embedded_key = Some(embedded_key.into());
        self
    }

    pub fn nested_changes(&self) -> Option<&[ChangeRecord]> {
        self.changes.as_deref().filter(|xs| !xs.is_empty())
    }

    pub fn is_leaf(&self) -> bool { self.nested_changes().is_none() }

    fn carries_values(&self) -> bool {
        self.value.is_some() || self.old_value.is_some()
    }
}

// ------------------------------ Change map ------------------------------- //

/// Leaf changes keyed by path, with the two per-node queries pre-indexed.
#[derive(Clone, Debug, Default)]
pub struct ChangeMap {
    entries: BTreeMap<NodePath, ChangeRecord>,
    /// parent path → paths of its direct-child changes
    direct: HashMap<NodePath, Vec<NodePath>>,
    /// every path with a change two or more levels below it
    deep: HashSet<NodePath>,
}

impl ChangeMap {
    /// Flatten nested records. Container records are expanded, never stored;
    /// leaves without `value`/`oldValue` are dropped. Every top-level key,
    /// `$root` included, addresses a child of the root.
    pub fn build(records: &[ChangeRecord]) -> Self {
        Self::from_records(records, false)
    }

    /// [`ChangeMap::build`] for a diff of `before` against `after`. When the
    /// two roots are not containers of the same kind, the root value itself
    /// was replaced and a top-level `$root` record addresses the empty path.
    pub fn for_trees(records: &[ChangeRecord], before: &Value, after: &Value) -> Self {
        let root_replaced = !matches!(
            (before, after),
            (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
        );
        Self::from_records(records, root_replaced)
    }

    fn from_records(records: &[ChangeRecord], root_replaced: bool) -> Self {
        let mut out = Self::default();
        for record in records {
            let path = if root_replaced && record.key == ROOT_KEY {
                NodePath::root()
            } else {
                NodePath::root().child(record.key.as_str())
            };
            out.collect(record, path);
        }
        out.reindex();
        tracing::debug!(leaf_changes = out.entries.len(), root_replaced, "built change map");
        out
    }

    fn collect(&mut self, record: &ChangeRecord, path: NodePath) {
        if let Some(children) = record.nested_changes() {
            for child in children {
                self.collect(child, path.child(child.key.as_str()));
            }
            return;
        }
        if !record.carries_values() {
            return;
        }
        if let Some(prev) = self.entries.insert(path.clone(), record.clone()) {
            tracing::warn!(%path, replaced = ?prev.kind, "duplicate leaf change, keeping the later record");
        }
    }

    fn reindex(&mut self) {
        self.direct.clear();
        self.deep.clear();
        for path in self.entries.keys() {
            if let Some(parent) = path.parent() {
                self.direct.entry(parent).or_default().push(path.clone());
            }
            for depth in 0..path.len().saturating_sub(1) {
                self.deep.insert(path.truncated(depth));
            }
        }
        for bucket in self.direct.values_mut() {
            bucket.sort_by(compare_paths);
        }
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn get(&self, path: &NodePath) -> Option<&ChangeRecord> { self.entries.get(path) }

    pub fn iter(&self) -> impl Iterator<Item = (&NodePath, &ChangeRecord)> {
        self.entries.iter()
    }

    /// Changes exactly one segment below `path`.
    pub fn direct_child_changes(&self, path: &NodePath) -> Vec<(&NodePath, &ChangeRecord)> {
        self.direct
            .get(path)
            .map(|children| {
                children
                    .iter()
                    .filter_map(|p| self.entries.get_key_value(p))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any change sits two or more segments below `path`.
    pub fn has_descendant_changes(&self, path: &NodePath) -> bool {
        self.deep.contains(path)
    }

    /// REMOVE paths in reinsertion order: segment-wise, indices compared numerically.
    pub fn removals(&self) -> Vec<(&NodePath, &ChangeRecord)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, r)| r.kind == ChangeKind::Remove)
            .collect();
        out.sort_by(|(a, _), (b, _)| compare_paths(a, b));
        out
    }
}

fn compare_paths(a: &NodePath, b: &NodePath) -> Ordering {
    for (x, y) in a.segments().iter().zip(b.segments()) {
        let ord = match (segment_index(x), segment_index(y)) {
            (Some(i), Some(j)) => i.cmp(&j),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
