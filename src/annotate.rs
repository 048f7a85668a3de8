//! Diff annotation: merge a change map into a copy of the after-tree.
//!
//! Pipeline: validate both trees → ask the [`Differ`] for records → flatten
//! them into a [`ChangeMap`] → clone the after-tree and splice removed
//! content back in → walk the reconciled tree assigning one [`DiffStatus`]
//! per node.
//!
//! Status per node at path `p`, first rule that applies:
//! 1. leaf UPDATE at `p`      → `updated` (before + after values)
//! 2. leaf ADD at `p`         → `added`; every descendant `nested-add`
//! 3. leaf REMOVE at `p`      → `removed`; every descendant `nested-remove`
//! 4. a change one level down → `contains-changes`
//! 5. a change deeper down    → `contains-nested-changes`
//! 6. otherwise               → `unchanged`
//!
//! Annotations live on [`AnnotatedNode`] next to, never inside, the domain
//! content, so enumerating a node's real children needs no exclusion list.
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::change::{ChangeKind, ChangeMap, ChangeRecord};
use crate::diff::Differ;
use crate::error::{EngineError, Result};
use crate::path::{NodePath, segment_index};
use crate::resolve::{ResolvedType, resolve_type};
use crate::schema::TypeSchema;
use crate::tree::{validate_tree, value_at_mut};

// ------------------------------- Types ----------------------------------- //

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffStatus {
    Unchanged,
    Added,
    Removed,
    Updated,
    NestedAdd,
    NestedRemove,
    ContainsChanges,
    ContainsNestedChanges,
}

impl DiffStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Updated => "updated",
            Self::NestedAdd => "nested-add",
            Self::NestedRemove => "nested-remove",
            Self::ContainsChanges => "contains-changes",
            Self::ContainsNestedChanges => "contains-nested-changes",
        }
    }

    pub fn is_change(self) -> bool { self != Self::Unchanged }
}

/// Domain content of a node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum NodeContent {
    #[serde(rename = "value")]
    Primitive(Value),
    #[serde(rename = "items")]
    Sequence(Vec<AnnotatedNode>),
    #[serde(rename = "fields")]
    Record(IndexMap<String, AnnotatedNode>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedNode {
    pub diff_status: DiffStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_value: Option<Value>,
    /// Raw key of the leaf record that set the status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Resolved type of `before_value`, for updated and removed nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_type: Option<String>,
    /// Direct-child key → the record at that child.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub child_changes: IndexMap<String, ChangeRecord>,
    #[serde(flatten)]
    pub content: NodeContent,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffOutcome {
    pub diff_tree: AnnotatedNode,
    pub changes: Vec<ChangeRecord>,
}

// ----------------------------- Navigation -------------------------------- //

impl AnnotatedNode {
    pub fn child(&self, segment: &str) -> Option<&AnnotatedNode> {
        match &self.content {
            NodeContent::Record(fields) => fields.get(segment),
            NodeContent::Sequence(items) => items.get(segment_index(segment)?),
            NodeContent::Primitive(_) => None,
        }
    }

    pub fn at(&self, path: &NodePath) -> Option<&AnnotatedNode> {
        path.segments().iter().try_fold(self, |node, seg| node.child(seg))
    }

    /// Dotted-path convenience for [`AnnotatedNode::at`].
    pub fn find(&self, dotted: &str) -> Option<&AnnotatedNode> {
        self.at(&NodePath::parse(dotted))
    }

    /// Real children in order, keyed by path segment.
    pub fn children(&self) -> Vec<(String, &AnnotatedNode)> {
        match &self.content {
            NodeContent::Record(fields) => fields.iter().map(|(k, v)| (k.clone(), v)).collect(),
            NodeContent::Sequence(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
            NodeContent::Primitive(_) => Vec::new(),
        }
    }

    /// Depth-first, pre-order, root first.
    pub fn descendants(&self) -> Vec<(NodePath, &AnnotatedNode)> {
        let mut out = Vec::new();
        let mut stack = vec![(NodePath::root(), self)];
        while let Some((path, node)) = stack.pop() {
            let children = node.children();
            out.push((path.clone(), node));
            for (seg, child) in children.into_iter().rev() {
                stack.push((path.child(seg), child));
            }
        }
        out
    }

    /// The plain reconciled tree (after-tree plus reinserted removals).
    pub fn to_value(&self) -> Value {
        match &self.content {
            NodeContent::Primitive(v) => v.clone(),
            NodeContent::Sequence(items) => Value::Array(items.iter().map(AnnotatedNode::to_value).collect()),
            NodeContent::Record(fields) => Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_value())).collect(),
            ),
        }
    }
}

// ------------------------------ Front API -------------------------------- //

/// Diff `before` against `after` and annotate a reconciled copy of `after`.
/// Neither input is modified.
pub fn annotate_diff(before: &Value, after: &Value, differ: &dyn Differ, schema: &TypeSchema) -> Result<DiffOutcome> {
    validate_tree(before)?;
    validate_tree(after)?;
    let changes = normalize_records(differ.diff(before, after)?);
    let change_map = ChangeMap::for_trees(&changes, before, after);
    let diff_tree = annotate(after, &change_map, schema)?;
    Ok(DiffOutcome { diff_tree, changes })
}

/// Annotate a copy of `after` against an already-built change map.
pub fn annotate(after: &Value, changes: &ChangeMap, schema: &TypeSchema) -> Result<AnnotatedNode> {
    validate_tree(after)?;
    let mut reconciled = after.clone();
    if reinsert_removed(&mut reconciled, changes)? > 0 {
        // removed payloads come from the change list and sit below their insertion point
        validate_tree(&reconciled)?;
    }
    let annotator = Annotator { changes, schema };
    Ok(annotator.node(reconciled, NodePath::root(), "", None, Inherited::Nothing))
}

/// Drop empty nested lists and containers whose subtree holds no leaf.
pub fn normalize_records(records: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
    records
        .into_iter()
        .filter_map(|mut record| {
            match record.changes.take() {
                Some(nested) if !nested.is_empty() => {
                    let nested = normalize_records(nested);
                    if nested.is_empty() {
                        return None;
                    }
                    record.changes = Some(nested);
                }
                _ => {
                    if record.value.is_none() && record.old_value.is_none() {
                        return None;
                    }
                }
            }
            Some(record)
        })
        .collect()
}

// ----------------------------- Reinsertion ------------------------------- //

/// Splice every REMOVE leaf back into `tree`, ascending so earlier
/// insertions shift later indices the way the paths expect. Returns how many
/// values went back in.
fn reinsert_removed(tree: &mut Value, changes: &ChangeMap) -> Result<usize> {
    let mut reinserted = 0;
    for (path, record) in changes.removals() {
        let removed = removed_value(record);
        let (Some(parent_path), Some(last)) = (path.parent(), path.last()) else {
            tracing::warn!("ignoring removal of the root value");
            continue;
        };
        let parent = value_at_mut(tree, &parent_path).ok_or_else(|| {
            EngineError::DiffComputation(format!("removal at `{path}` has no parent in the after-tree"))
        })?;
        match parent {
            Value::Object(map) => {
                if map.contains_key(last) {
                    tracing::warn!(%path, "removed key still present in after-tree; keeping after value");
                    continue;
                }
                map.insert(last.to_string(), removed);
            }
            Value::Array(items) => {
                let index = segment_index(last).ok_or_else(|| {
                    EngineError::DiffComputation(format!("removal at `{path}` is not an array index"))
                })?;
                if index > items.len() {
                    tracing::warn!(%path, len = items.len(), "removal index past the end; appending");
                }
                items.insert(index.min(items.len()), removed);
            }
            _ => {
                return Err(EngineError::DiffComputation(format!(
                    "removal at `{path}` targets a scalar parent"
                )));
            }
        }
        reinserted += 1;
        tracing::trace!(%path, "reinserted removed value");
    }
    Ok(reinserted)
}

/// Removed content: `oldValue`, or `value` for tools that report it there.
fn removed_value(record: &ChangeRecord) -> Value {
    record
        .old_value
        .clone()
        .or_else(|| record.value.clone())
        .unwrap_or(Value::Null)
}

// -------------------------------- Walk ----------------------------------- //

/// Status forced on a whole subtree by an ancestor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Inherited {
    Nothing,
    NestedAdd,
    NestedRemove,
}

struct Annotator<'a> {
    changes: &'a ChangeMap,
    schema: &'a TypeSchema,
}

impl Annotator<'_> {
    fn node(&self, value: Value, path: NodePath, key: &str, parent_type: Option<&str>, inherited: Inherited) -> AnnotatedNode {
        let ResolvedType { type_name, kind } = resolve_type(&value, key, parent_type);

        let mut node = AnnotatedNode {
            diff_status: DiffStatus::Unchanged,
            before_value: None,
            after_value: None,
            diff_key: None,
            type_name,
            kind,
            previous_type: None,
            child_changes: IndexMap::new(),
            content: NodeContent::Primitive(Value::Null),
        };

        let below = match inherited {
            Inherited::NestedAdd => {
                node.diff_status = DiffStatus::NestedAdd;
                Inherited::NestedAdd
            }
            Inherited::NestedRemove => {
                node.diff_status = DiffStatus::NestedRemove;
                Inherited::NestedRemove
            }
            Inherited::Nothing => self.own_status(&mut node, &path, key, parent_type),
        };

        let child_parent_type = node.type_name.clone();
        let child_type = |child_key: &str| {
            child_parent_type
                .as_deref()
                .and_then(|t| self.schema.child_inferred_type(t, child_key))
        };
        node.content = match value {
            Value::Array(items) => NodeContent::Sequence(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let seg = i.to_string();
                        let ty = child_type(&seg);
                        self.node(item, path.child(seg.as_str()), &seg, ty.as_deref(), below)
                    })
                    .collect(),
            ),
            Value::Object(map) => NodeContent::Record(
                map.into_iter()
                    .map(|(k, v)| {
                        let ty = child_type(&k);
                        let child = self.node(v, path.child(k.as_str()), &k, ty.as_deref(), below);
                        (k, child)
                    })
                    .collect(),
            ),
            scalar => NodeContent::Primitive(scalar),
        };
        node
    }

    /// Rules 1–6 plus `childChanges`; returns what descendants inherit.
    fn own_status(&self, node: &mut AnnotatedNode, path: &NodePath, key: &str, parent_type: Option<&str>) -> Inherited {
        let direct = self.changes.direct_child_changes(path);
        node.child_changes = direct
            .iter()
            .filter_map(|(p, r)| Some((p.last()?.to_string(), (*r).clone())))
            .collect();

        let Some(record) = self.changes.get(path) else {
            node.diff_status = if !direct.is_empty() {
                DiffStatus::ContainsChanges
            } else if self.changes.has_descendant_changes(path) {
                DiffStatus::ContainsNestedChanges
            } else {
                DiffStatus::Unchanged
            };
            return Inherited::Nothing;
        };

        node.diff_key = Some(record.key.clone());
        match record.kind {
            ChangeKind::Update => {
                node.diff_status = DiffStatus::Updated;
                node.before_value = record.old_value.clone();
                node.after_value = record.value.clone();
                node.previous_type = self.previous_type(node.before_value.as_ref(), key, parent_type);
                Inherited::Nothing
            }
            ChangeKind::Add => {
                node.diff_status = DiffStatus::Added;
                node.after_value = record.value.clone();
                Inherited::NestedAdd
            }
            ChangeKind::Remove => {
                node.diff_status = DiffStatus::Removed;
                node.before_value = Some(removed_value(record));
                node.previous_type = self.previous_type(node.before_value.as_ref(), key, parent_type);
                Inherited::NestedRemove
            }
        }
    }

    fn previous_type(&self, before: Option<&Value>, key: &str, parent_type: Option<&str>) -> Option<String> {
        resolve_type(before?, key, parent_type).type_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MAX_TREE_DEPTH;
    use crate::diff::{PrecomputedChanges, StructuralDiffer};
    use serde_json::json;

    fn run(before: Value, after: Value) -> DiffOutcome {
        annotate_diff(&before, &after, &StructuralDiffer::default(), TypeSchema::bundled()).unwrap()
    }

    fn status(out: &DiffOutcome, path: &str) -> DiffStatus {
        out.diff_tree.find(path).unwrap_or_else(|| panic!("no node at {path}")).diff_status
    }

    #[test]
    fn equal_trees_are_unchanged_everywhere() {
        let t = json!({"a": [1, {"b": "x"}], "c": null});
        let out = run(t.clone(), t.clone());
        assert!(out.changes.is_empty());
        for (path, node) in out.diff_tree.descendants() {
            assert_eq!(node.diff_status, DiffStatus::Unchanged, "{path}");
            assert!(node.before_value.is_none() && node.after_value.is_none());
            assert!(node.child_changes.is_empty());
        }
        assert_eq!(out.diff_tree.to_value(), t);
    }

    #[test]
    fn leaf_update_marks_ancestors() {
        let out = run(json!({"a": {"b": 1}}), json!({"a": {"b": 2}}));
        let b = out.diff_tree.find("a.b").unwrap();
        assert_eq!(b.diff_status, DiffStatus::Updated);
        assert_eq!(b.before_value, Some(json!(1)));
        assert_eq!(b.after_value, Some(json!(2)));
        assert_eq!(b.diff_key.as_deref(), Some("b"));
        assert_eq!(status(&out, "a"), DiffStatus::ContainsChanges);
        assert_eq!(status(&out, ""), DiffStatus::ContainsChanges);
        assert!(out.diff_tree.find("a").unwrap().child_changes.contains_key("b"));
    }

    #[test]
    fn nested_changes_are_distinguished_from_direct_ones() {
        let out = run(json!({"a": {"b": {"c": 1}}}), json!({"a": {"b": {"c": 2}}}));
        assert_eq!(status(&out, ""), DiffStatus::ContainsNestedChanges);
        assert_eq!(status(&out, "a"), DiffStatus::ContainsNestedChanges);
        assert_eq!(status(&out, "a.b"), DiffStatus::ContainsChanges);
        assert_eq!(status(&out, "a.b.c"), DiffStatus::Updated);
    }

    #[test]
    fn added_subtrees_propagate_nested_add() {
        let out = run(json!({}), json!({"x": {"y": {"z": 1}}}));
        let x = out.diff_tree.find("x").unwrap();
        assert_eq!(x.diff_status, DiffStatus::Added);
        assert_eq!(x.after_value, Some(json!({"y": {"z": 1}})));
        for path in ["x.y", "x.y.z"] {
            let n = out.diff_tree.find(path).unwrap();
            assert_eq!(n.diff_status, DiffStatus::NestedAdd, "{path}");
            assert!(n.before_value.is_none() && n.after_value.is_none());
        }
    }

    #[test]
    fn removed_array_items_are_reinserted() {
        let out = run(json!({"items": ["a"]}), json!({"items": []}));
        let item = out.diff_tree.find("items.0").unwrap();
        assert_eq!(item.to_value(), json!("a"));
        assert_eq!(item.diff_status, DiffStatus::Removed);
        assert_eq!(item.before_value, Some(json!("a")));
        assert_eq!(status(&out, "items"), DiffStatus::ContainsChanges);
    }

    #[test]
    fn removed_subtrees_propagate_nested_remove() {
        let out = run(json!({"keep": 1, "gone": {"deep": [true]}}), json!({"keep": 1}));
        assert_eq!(status(&out, "gone"), DiffStatus::Removed);
        assert_eq!(status(&out, "gone.deep"), DiffStatus::NestedRemove);
        assert_eq!(status(&out, "gone.deep.0"), DiffStatus::NestedRemove);
        assert_eq!(status(&out, "keep"), DiffStatus::Unchanged);
    }

    #[test]
    fn multiple_array_removals_land_in_order() {
        let before = json!({"xs": [{"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}]});
        let after = json!({"xs": [{"id": 2}, {"id": 4}]});
        let differ = StructuralDiffer::new(crate::diff::DiffOptions { embedded_keys: vec!["id".into()] });
        let out = annotate_diff(&before, &after, &differ, TypeSchema::bundled()).unwrap();
        assert_eq!(out.diff_tree.to_value(), before);
        let statuses: Vec<_> = (0..4).map(|i| status(&out, &format!("xs.{i}"))).collect();
        assert_eq!(statuses, vec![
            DiffStatus::Removed, DiffStatus::Unchanged, DiffStatus::Removed, DiffStatus::Unchanged,
        ]);
    }

    #[test]
    fn inputs_are_left_untouched() {
        let before = json!({"k": [1, 2]});
        let after = json!({"k": [1]});
        let (b0, a0) = (before.clone(), after.clone());
        let _ = annotate_diff(&before, &after, &StructuralDiffer::default(), TypeSchema::bundled()).unwrap();
        assert_eq!(before, b0);
        assert_eq!(after, a0);
    }

    #[test]
    fn root_replacement_updates_the_root() {
        let out = run(json!(1), json!(2));
        assert_eq!(out.diff_tree.diff_status, DiffStatus::Updated);
        assert_eq!(out.diff_tree.before_value, Some(json!(1)));
    }

    #[test]
    fn dollar_root_property_updates_like_any_other_key() {
        let out = run(json!({"$root": 1}), json!({"$root": 2}));
        assert_eq!(out.diff_tree.diff_status, DiffStatus::ContainsChanges);
        assert_eq!(out.diff_tree.before_value, None);
        let child = out.diff_tree.find("$root").unwrap();
        assert_eq!(child.diff_status, DiffStatus::Updated);
        assert_eq!(child.before_value, Some(json!(1)));
        assert_eq!(child.after_value, Some(json!(2)));
    }

    #[test]
    fn dollar_root_property_removal_is_reinserted() {
        let before = json!({"$root": {"x": 1}, "k": 0});
        let out = run(before.clone(), json!({"k": 0}));
        assert_eq!(out.diff_tree.diff_status, DiffStatus::ContainsChanges);
        assert_eq!(status(&out, "k"), DiffStatus::Unchanged);
        assert_eq!(status(&out, "$root"), DiffStatus::Removed);
        assert_eq!(status(&out, "$root.x"), DiffStatus::NestedRemove);
        assert_eq!(out.diff_tree.to_value(), json!({"k": 0, "$root": {"x": 1}}));
    }

    fn nested_arrays(depth: usize) -> Value {
        let mut v = json!(0);
        for _ in 0..depth {
            v = json!([v]);
        }
        v
    }

    #[test]
    fn annotate_rejects_overly_deep_after_trees() {
        let err = annotate(&nested_arrays(MAX_TREE_DEPTH + 1), &ChangeMap::default(), TypeSchema::bundled()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput { .. }));
    }

    #[test]
    fn annotate_rejects_overly_deep_removed_payloads() {
        let map = ChangeMap::build(&[ChangeRecord::remove("gone", nested_arrays(MAX_TREE_DEPTH))]);
        let err = annotate(&json!({}), &map, TypeSchema::bundled()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput { .. }));
    }

    #[test]
    fn child_changes_follow_numeric_order() {
        let before = json!({"xs": (0..12).collect::<Vec<_>>()});
        let mut after = before.clone();
        after["xs"][2] = json!(-2);
        after["xs"][10] = json!(-10);
        let out = run(before, after);
        let keys: Vec<_> = out.diff_tree.find("xs").unwrap().child_changes.keys().cloned().collect();
        assert_eq!(keys, vec!["2", "10"]);
    }

    #[test]
    fn inconsistent_removals_fail_without_annotation() {
        let changes = PrecomputedChanges(vec![ChangeRecord::nested("missing", vec![
            ChangeRecord::remove("0", json!("x")),
        ])]);
        let err = annotate_diff(&json!({}), &json!({}), &changes, TypeSchema::bundled()).unwrap_err();
        assert!(matches!(err, EngineError::DiffComputation(_)));
    }

    #[test]
    fn failing_differ_propagates() {
        struct Broken;
        impl Differ for Broken {
            fn diff(&self, _: &Value, _: &Value) -> Result<Vec<ChangeRecord>> {
                Err(EngineError::DiffComputation("boom".into()))
            }
        }
        let err = annotate_diff(&json!({}), &json!({}), &Broken, TypeSchema::bundled()).unwrap_err();
        assert_eq!(err.to_string(), "diff computation failed: boom");
    }

    #[test]
    fn types_are_resolved_along_the_walk() {
        let before = json!({"type": "AstStatBlock", "kind": "block", "statements": [
            {"type": "AstStatLocal", "kind": "local", "values": [
                {"node": {"type": "AstExprConstantNumber", "kind": "number", "value": 1}}
            ]},
            {"type": "AstStatBreak", "kind": "break", "text": "break"}
        ]});
        let after = json!({"type": "AstStatBlock", "kind": "block", "statements": [
            {"type": "AstStatLocal", "kind": "local", "values": [
                {"node": {"type": "AstExprConstantNumber", "kind": "number", "value": 2}}
            ]}
        ]});
        let out = run(before, after);
        let tree = &out.diff_tree;
        assert_eq!(tree.type_name.as_deref(), Some("AstStatBlock"));
        assert_eq!(tree.kind, "block");
        assert_eq!(tree.find("statements").unwrap().type_name.as_deref(), Some("{ AstStat }"));
        assert_eq!(tree.find("statements.0.values").unwrap().type_name.as_deref(), Some("Punctuated<AstExpr>"));
        assert_eq!(tree.find("statements.0.values.0").unwrap().type_name.as_deref(), Some("Pair<AstExpr>"));

        let value = tree.find("statements.0.values.0.node.value").unwrap();
        assert_eq!(value.diff_status, DiffStatus::Updated);
        assert_eq!(value.type_name.as_deref(), Some("number"));
        assert_eq!(value.previous_type.as_deref(), Some("number"));

        let removed = tree.find("statements.1").unwrap();
        assert_eq!(removed.diff_status, DiffStatus::Removed);
        assert_eq!(removed.previous_type.as_deref(), Some("AstStatBreak"));
        assert_eq!(removed.kind, "break");
        assert_eq!(status(&out, "statements.1.text"), DiffStatus::NestedRemove);
    }

    #[test]
    fn serialized_form_uses_camel_case_and_kebab_statuses() {
        let out = run(json!({"a": 1}), json!({"a": 2}));
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["diffTree"]["diffStatus"], json!("contains-changes"));
        assert_eq!(v["diffTree"]["fields"]["a"]["diffStatus"], json!("updated"));
        assert_eq!(v["diffTree"]["fields"]["a"]["beforeValue"], json!(1));
        assert_eq!(v["diffTree"]["childChanges"]["a"]["type"], json!("UPDATE"));
        assert_eq!(v["changes"][0]["key"], json!("a"));
    }

    #[test]
    fn normalization_drops_hollow_containers() {
        let records = vec![
            ChangeRecord::nested("a", vec![ChangeRecord::nested("b", vec![])]),
            ChangeRecord::add("c", json!(1)),
        ];
        assert_eq!(normalize_records(records), vec![ChangeRecord::add("c", json!(1))]);
    }
}
