//! Input trees are plain `serde_json::Value`s (key order preserved).
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::path::NodePath;

/// Anything nested deeper than this is rejected before the engine touches it.
pub const MAX_TREE_DEPTH: usize = 512;

/// Check that `tree` is something the engine can walk.
pub fn validate_tree(tree: &Value) -> Result<()> {
    let mut stack: Vec<(&Value, NodePath)> = vec![(tree, NodePath::root())];
    while let Some((node, path)) = stack.pop() {
        if path.len() > MAX_TREE_DEPTH {
            return Err(EngineError::malformed(
                path.to_string(),
                format!("nesting exceeds {MAX_TREE_DEPTH} levels"),
            ));
        }
        match node {
            Value::Array(xs) => {
                for (i, x) in xs.iter().enumerate() {
                    stack.push((x, path.index(i)));
                }
            }
            Value::Object(map) => {
                for (k, v) in map {
                    stack.push((v, path.child(k.as_str())));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Follow `path` down from `tree`.
pub fn value_at<'a>(tree: &'a Value, path: &NodePath) -> Option<&'a Value> {
    let mut cur = tree;
    for seg in path.segments() {
        cur = match cur {
            Value::Object(map) => map.get(seg)?,
            Value::Array(xs) => xs.get(crate::path::segment_index(seg)?)?,
            _ => return None,
        };
    }
    Some(cur)
}

pub fn value_at_mut<'a>(tree: &'a mut Value, path: &NodePath) -> Option<&'a mut Value> {
    let mut cur = tree;
    for seg in path.segments() {
        cur = match cur {
            Value::Object(map) => map.get_mut(seg)?,
            Value::Array(xs) => xs.get_mut(crate::path::segment_index(seg)?)?,
            _ => return None,
        };
    }
    Some(cur)
}
