//! Structural diff collaborator.
//!
//! The annotator only consumes change records; anything implementing
//! [`Differ`] can supply them. [`StructuralDiffer`] is the bundled one:
//! - objects: ADD / REMOVE per key, recurse into keys present on both sides
//! - arrays: positional, or matched by an identifying field when every
//!   element carries one (recorded as the container's `embeddedKey`)
//! - anything else that differs: a leaf UPDATE
//!
//! Array positions in emitted paths index the *merged* sequence (after
//! elements in order, removed before elements interleaved), so splicing the
//! removals back in ascending order reproduces it exactly.
use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value};

use crate::change::{ChangeRecord, INDEX_EMBEDDED_KEY, ROOT_KEY};
use crate::error::{EngineError, Result};
use crate::path::{NodePath, segment_index};

pub trait Differ {
    fn diff(&self, before: &Value, after: &Value) -> Result<Vec<ChangeRecord>>;
}

/// A change list computed elsewhere (e.g. loaded from a file).
///
/// Array children must be addressed by position (their index in the merged
/// before/after sequence), whatever `embeddedKey` the container reports.
/// Lists keying array children by an identifying value are rejected.
#[derive(Clone, Debug, Default)]
pub struct PrecomputedChanges(pub Vec<ChangeRecord>);

impl Differ for PrecomputedChanges {
    fn diff(&self, _before: &Value, _after: &Value) -> Result<Vec<ChangeRecord>> {
        check_positional(&self.0, &NodePath::root())?;
        Ok(self.0.clone())
    }
}

fn check_positional(records: &[ChangeRecord], parent: &NodePath) -> Result<()> {
    for record in records {
        let path = parent.child(record.key.as_str());
        let Some(children) = record.nested_changes() else { continue };
        if let Some(field) = record.embedded_key.as_deref().filter(|k| *k != INDEX_EMBEDDED_KEY) {
            if let Some(bad) = children.iter().find(|c| segment_index(&c.key).is_none()) {
                return Err(EngineError::DiffComputation(format!(
                    "changes under `{path}` are keyed by `{field}` value `{}`; array children must use positional keys",
                    bad.key
                )));
            }
        }
        check_positional(children, &path)?;
    }
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub struct DiffOptions {
    /// Candidate identifying fields for keyed array matching, tried in order.
    pub embedded_keys: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct StructuralDiffer {
    options: DiffOptions,
}

/// One position of a merged array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    /// after[j], matched from before[i] if `Some(i)`
    After { j: usize, from: Option<usize> },
    /// before[i], gone from after
    Removed(usize),
}

impl StructuralDiffer {
    pub fn new(options: DiffOptions) -> Self { Self { options } }

    fn diff_value(&self, key: String, before: &Value, after: &Value) -> Option<ChangeRecord> {
        if before == after {
            return None;
        }
        match (before, after) {
            (Value::Object(a), Value::Object(b)) => Some(ChangeRecord::nested(key, self.diff_object(a, b))),
            (Value::Array(a), Value::Array(b)) => {
                let (changes, embedded_key) = self.diff_array(a, b);
                Some(ChangeRecord::nested(key, changes).with_embedded_key(embedded_key))
            }
            _ => Some(ChangeRecord::update(key, before.clone(), after.clone())),
        }
    }

    fn diff_object(&self, before: &Map<String, Value>, after: &Map<String, Value>) -> Vec<ChangeRecord> {
        let mut out = Vec::new();
        for (k, b) in after {
            match before.get(k) {
                None => out.push(ChangeRecord::add(k.as_str(), b.clone())),
                Some(a) => out.extend(self.diff_value(k.clone(), a, b)),
            }
        }
        for (k, a) in before {
            if !after.contains_key(k) {
                out.push(ChangeRecord::remove(k.as_str(), a.clone()));
            }
        }
        out
    }

    fn diff_array(&self, before: &[Value], after: &[Value]) -> (Vec<ChangeRecord>, String) {
        let (slots, embedded_key) = match self.identifying_field(before, after) {
            Some(field) => (keyed_slots(before, after, field), field.to_string()),
            None => (positional_slots(before, after), INDEX_EMBEDDED_KEY.to_string()),
        };
        let mut out = Vec::new();
        for (m, slot) in slots.into_iter().enumerate() {
            let key = m.to_string();
            match slot {
                Slot::After { j, from: Some(i) } => out.extend(self.diff_value(key, &before[i], &after[j])),
                Slot::After { j, from: None } => out.push(ChangeRecord::add(key, after[j].clone())),
                Slot::Removed(i) => out.push(ChangeRecord::remove(key, before[i].clone())),
            }
        }
        (out, embedded_key)
    }

    /// First configured field every element on both sides carries, with
    /// unique values per side.
    fn identifying_field(&self, before: &[Value], after: &[Value]) -> Option<&str> {
        self.options
            .embedded_keys
            .iter()
            .map(String::as_str)
            .find(|field| identities(before, field).is_some() && identities(after, field).is_some())
    }
}

impl Differ for StructuralDiffer {
    fn diff(&self, before: &Value, after: &Value) -> Result<Vec<ChangeRecord>> {
        let records = match (before, after) {
            _ if before == after => Vec::new(),
            (Value::Object(a), Value::Object(b)) => self.diff_object(a, b),
            (Value::Array(a), Value::Array(b)) => self.diff_array(a, b).0,
            _ => vec![ChangeRecord::update(ROOT_KEY, before.clone(), after.clone())],
        };
        tracing::debug!(top_level = records.len(), "structural diff computed");
        Ok(records)
    }
}

/// Identity strings of `field` for each element, if all present and unique.
fn identities(items: &[Value], field: &str) -> Option<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let id = item.get(field).filter(|v| !v.is_null())?.to_string();
        if !seen.insert(id.clone()) {
            return None;
        }
        out.push(id);
    }
    Some(out)
}

fn positional_slots(before: &[Value], after: &[Value]) -> Vec<Slot> {
    let common = before.len().min(after.len());
    let mut slots: Vec<Slot> = (0..after.len())
        .map(|j| Slot::After { j, from: (j < common).then_some(j) })
        .collect();
    slots.extend((common..before.len()).map(Slot::Removed));
    slots
}

fn keyed_slots(before: &[Value], after: &[Value], field: &str) -> Vec<Slot> {
    let (Some(before_ids), Some(after_ids)) = (identities(before, field), identities(after, field)) else {
        return positional_slots(before, after);
    };
    let after_pos: HashMap<&str, usize> = after_ids.iter().enumerate().map(|(j, id)| (id.as_str(), j)).collect();
    let mut matched_from: HashMap<usize, usize> = HashMap::new();

    // removed runs are anchored in front of the next matched element's new position
    let mut anchors: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut pending: Vec<usize> = Vec::new();
    for (i, id) in before_ids.iter().enumerate() {
        match after_pos.get(id.as_str()) {
            Some(&j) => {
                matched_from.insert(j, i);
                if !pending.is_empty() {
                    anchors.entry(j).or_default().append(&mut pending);
                }
            }
            None => pending.push(i),
        }
    }
    if !pending.is_empty() {
        anchors.entry(after.len()).or_default().append(&mut pending);
    }

    let mut slots = Vec::with_capacity(before.len() + after.len());
    for j in 0..=after.len() {
        if let Some(removed) = anchors.remove(&j) {
            slots.extend(removed.into_iter().map(Slot::Removed));
        }
        if j < after.len() {
            slots.push(Slot::After { j, from: matched_from.get(&j).copied() });
        }
    }
    slots
}
