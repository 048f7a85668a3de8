//! Per-node type resolution.
//!
//! Three tiers, first hit wins:
//! 1. arrays: a fixed table of well-known array-valued property names
//! 2. objects carrying an explicit type tag
//! 3. the type implied by the enclosing property's declaration
use serde::Serialize;
use serde_json::Value;

use crate::schema::array_of;

/// Field holding a node's type name.
pub const TYPE_TAG_FIELD: &str = "type";

/// Field holding a node's discriminator within its type (`"call"`, `"list"`, ...).
pub const KIND_FIELD: &str = "kind";

/// Field only type-system table items carry; selects the element type of `entries`.
pub const TYPE_ITEM_MARKER_FIELD: &str = "valueType";

const POLYMORPHIC_ENTRIES_KEY: &str = "entries";
const TYPE_TABLE_ITEM: &str = "AstTypeTableItem";
const EXPR_TABLE_ITEM: &str = "AstExprTableItem";

/// Element types of well-known array-valued properties.
const ARRAY_ELEMENT_TYPES: &[(&str, &str)] = &[
    ("statements", "AstStat"),
    ("attributes", "AstAttribute"),
    ("expressions", "AstExpr"),
    ("strings", "Token"),
    ("leadingTrivia", "Trivia"),
    ("trailingTrivia", "Trivia"),
];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedType {
    /// `None` when no tier applies; callers show the raw path instead.
    pub type_name: Option<String>,
    /// Empty when the node has no discriminator.
    pub kind: String,
}

impl ResolvedType {
    pub fn unresolved() -> Self { Self::default() }
    pub fn is_resolved(&self) -> bool { self.type_name.is_some() }
}

/// Resolve the semantic type of `node` found under `key`.
pub fn resolve_type(node: &Value, key: &str, parent_inferred_type: Option<&str>) -> ResolvedType {
    let resolved = match node {
        Value::Array(items) => resolve_array(items, key),
        Value::Object(map) => map.get(TYPE_TAG_FIELD).and_then(Value::as_str).map(|tag| ResolvedType {
            type_name: Some(tag.to_string()),
            kind: kind_of(node),
        }),
        _ => None,
    };
    if let Some(resolved) = resolved {
        return resolved;
    }
    match parent_inferred_type {
        Some(inferred) => ResolvedType { type_name: Some(inferred.to_string()), kind: kind_of(node) },
        None => {
            tracing::debug!(key, "unresolved node type");
            ResolvedType::unresolved()
        }
    }
}

fn resolve_array(items: &[Value], key: &str) -> Option<ResolvedType> {
    if key == POLYMORPHIC_ENTRIES_KEY {
        let first = items.first();
        let element = match first {
            Some(Value::Object(map)) if map.contains_key(TYPE_ITEM_MARKER_FIELD) => TYPE_TABLE_ITEM,
            _ => EXPR_TABLE_ITEM,
        };
        return Some(ResolvedType {
            type_name: Some(array_of(element)),
            kind: first.map(kind_of).unwrap_or_default(),
        });
    }
    ARRAY_ELEMENT_TYPES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, element)| ResolvedType { type_name: Some(array_of(element)), kind: String::new() })
}

fn kind_of(node: &Value) -> String {
    node.get(KIND_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name(r: &ResolvedType) -> Option<&str> { r.type_name.as_deref() }

    #[test]
    fn well_known_arrays_use_the_fallback_table() {
        let r = resolve_type(&json!([]), "statements", None);
        assert_eq!(name(&r), Some("{ AstStat }"));
        assert_eq!(r.kind, "");
        let r = resolve_type(&json!([{"kind": "whitespace"}]), "leadingTrivia", Some("ignored"));
        assert_eq!(name(&r), Some("{ Trivia }"));
    }

    #[test]
    fn entries_pick_element_type_from_first_item_shape() {
        let ty_items = json!([{"kind": "property", "valueType": {"type": "AstTypeReference"}}]);
        let r = resolve_type(&ty_items, "entries", None);
        assert_eq!(name(&r), Some("{ AstTypeTableItem }"));
        assert_eq!(r.kind, "property");

        let expr_items = json!([{"kind": "list", "value": {"type": "AstExprConstantNil"}}]);
        let r = resolve_type(&expr_items, "entries", None);
        assert_eq!(name(&r), Some("{ AstExprTableItem }"));
        assert_eq!(r.kind, "list");

        let r = resolve_type(&json!([]), "entries", None);
        assert_eq!(name(&r), Some("{ AstExprTableItem }"));
        assert_eq!(r.kind, "");
    }

    #[test]
    fn explicit_tag_wins_over_context() {
        let node = json!({"type": "AstExprCall", "kind": "call"});
        let r = resolve_type(&node, "expression", Some("AstExpr"));
        assert_eq!(name(&r), Some("AstExprCall"));
        assert_eq!(r.kind, "call");

        let r = resolve_type(&json!({"type": "AstStatBreak"}), "0", None);
        assert_eq!(r.kind, "");
    }

    #[test]
    fn untagged_nodes_inherit_the_parent_inferred_type() {
        let pair = json!({"node": {"type": "AstExprLocal"}, "separator": null});
        let r = resolve_type(&pair, "0", Some("Pair<AstExpr>"));
        assert_eq!(name(&r), Some("Pair<AstExpr>"));

        let unknown_array = json!([1, 2]);
        let r = resolve_type(&unknown_array, "arguments", Some("Punctuated<AstExpr>"));
        assert_eq!(name(&r), Some("Punctuated<AstExpr>"));

        let r = resolve_type(&json!("local"), "text", Some("string"));
        assert_eq!(name(&r), Some("string"));
    }

    #[test]
    fn nothing_applies_means_unresolved() {
        let r = resolve_type(&json!({"a": 1}), "a", None);
        assert!(!r.is_resolved());
        assert_eq!(r, ResolvedType::unresolved());
        // non-string tags are not tags
        assert!(!resolve_type(&json!({"type": 3}), "x", None).is_resolved());
    }

    #[test]
    fn resolution_is_repeatable() {
        let node = json!({"type": "AstExprTable", "kind": "table", "entries": []});
        assert_eq!(resolve_type(&node, "k", None), resolve_type(&node, "k", None));
    }
}
