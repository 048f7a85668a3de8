//! Per-node type listing for plain (un-diffed) trees.
//!
//! Each node goes through the same chain a renderer uses:
//! `resolve_type` → `get_type` → `should_auto_collapse`, with children
//! receiving the type their parent's definition declares for them.
use serde::Serialize;
use serde_json::Value;

use crate::collapse::CollapsePolicy;
use crate::path::NodePath;
use crate::resolve::resolve_type;
use crate::schema::TypeSchema;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedNode {
    pub path: String,
    pub key: String,
    pub depth: usize,
    pub type_name: Option<String>,
    pub kind: String,
    pub is_array: bool,
    /// Whether the schema knows `type_name`.
    pub defined: bool,
    pub collapsed: bool,
}

impl TypedNode {
    /// What a renderer shows: the type name, or the raw path when unresolved.
    pub fn label(&self) -> &str {
        match &self.type_name {
            Some(name) => name,
            None if self.path.is_empty() => "<root>",
            None => &self.path,
        }
    }
}

pub struct TypeWalker<'a> {
    schema: &'a TypeSchema,
    policy: CollapsePolicy<'a>,
}

impl<'a> TypeWalker<'a> {
    pub fn new(schema: &'a TypeSchema) -> Self {
        Self { schema, policy: CollapsePolicy::new(schema) }
    }

    /// Type every node of `tree`, depth-first, pre-order.
    pub fn walk(&self, tree: &Value) -> Vec<TypedNode> {
        let mut out = Vec::new();
        self.visit(tree, NodePath::root(), "", None, &mut out);
        out
    }

    pub fn type_node(&self, node: &Value, path: &NodePath, key: &str, parent_inferred: Option<&str>) -> TypedNode {
        let resolved = resolve_type(node, key, parent_inferred);
        let (defined, is_array, collapsed) = match resolved.type_name.as_deref() {
            Some(name) => {
                let lookup = self.schema.get_type(name);
                let collapsed = self.policy.should_auto_collapse(name, lookup.definition.as_deref());
                (lookup.definition.is_some(), lookup.is_array, collapsed)
            }
            None => (false, node.is_array(), false),
        };
        TypedNode {
            path: path.to_string(),
            key: key.to_string(),
            depth: path.len(),
            type_name: resolved.type_name,
            kind: resolved.kind,
            is_array,
            defined,
            collapsed,
        }
    }

    fn visit(&self, node: &Value, path: NodePath, key: &str, parent_inferred: Option<&str>, out: &mut Vec<TypedNode>) {
        let typed = self.type_node(node, &path, key, parent_inferred);
        let own_type = typed.type_name.clone();
        out.push(typed);

        let child_type = |child_key: &str| {
            own_type.as_deref().and_then(|t| self.schema.child_inferred_type(t, child_key))
        };
        match node {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let seg = i.to_string();
                    let ty = child_type(&seg);
                    self.visit(item, path.child(seg.as_str()), &seg, ty.as_deref(), out);
                }
            }
            Value::Object(map) => {
                for (k, v) in map {
                    let ty = child_type(k);
                    self.visit(v, path.child(k.as_str()), k, ty.as_deref(), out);
                }
            }
            _ => {}
        }
    }
}
