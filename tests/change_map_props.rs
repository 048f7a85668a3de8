use std::collections::BTreeSet;

use ast_delta::{ChangeMap, DiffOptions, Differ, NodePath, StructuralDiffer};
use proptest::prelude::*;
use serde_json::Value;

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-3i64..3).prop_map(Value::from),
        "[a-c]".prop_map(Value::from),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-d]", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Every path worth querying: each change path and all of its prefixes,
/// plus a few that exist nowhere.
fn query_paths(map: &ChangeMap) -> BTreeSet<NodePath> {
    let mut out = BTreeSet::new();
    out.insert(NodePath::root());
    out.insert(NodePath::parse("zz"));
    for (path, _) in map.iter() {
        for depth in 0..=path.len() {
            out.insert(path.truncated(depth));
        }
        out.insert(path.child("zz"));
    }
    out
}

fn naive_direct(map: &ChangeMap, p: &NodePath) -> BTreeSet<NodePath> {
    map.iter()
        .filter(|(k, _)| k.len() == p.len() + 1 && k.starts_with(p))
        .map(|(k, _)| k.clone())
        .collect()
}

fn naive_deep(map: &ChangeMap, p: &NodePath) -> bool {
    map.iter().any(|(k, _)| k.len() > p.len() + 1 && k.starts_with(p))
}

proptest! {
    #[test]
    fn change_queries_match_a_full_scan(before in tree(), after in tree()) {
        let differ = StructuralDiffer::new(DiffOptions { embedded_keys: vec!["a".into()] });
        let records = differ.diff(&before, &after).unwrap();
        let map = ChangeMap::for_trees(&records, &before, &after);

        for p in query_paths(&map) {
            let direct: BTreeSet<NodePath> = map.direct_child_changes(&p).into_iter().map(|(k, _)| k.clone()).collect();
            prop_assert_eq!(&direct, &naive_direct(&map, &p), "direct children of `{}`", p);
            prop_assert_eq!(map.has_descendant_changes(&p), naive_deep(&map, &p), "descendants of `{}`", p);
        }
    }

    #[test]
    fn equal_trees_build_an_empty_map(t in tree()) {
        let records = StructuralDiffer::default().diff(&t, &t).unwrap();
        prop_assert!(ChangeMap::build(&records).is_empty());
    }
}
