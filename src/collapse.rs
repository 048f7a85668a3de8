//! Default expand/collapse state for rendered nodes. Display only: never
//! feeds back into diff status or type resolution.
use std::collections::HashSet;

use crate::schema::{TypeDefinition, TypeSchema, array_element};

/// Types that carry little information on their own.
pub const LOW_INFORMATION_TYPES: &[&str] = &[
    "Whitespace",
    "Comment",
    "Location",
    "Position",
];

pub fn is_low_information(type_name: &str) -> bool {
    LOW_INFORMATION_TYPES.contains(&type_name.trim())
}

#[derive(Clone, Copy, Debug)]
pub struct CollapsePolicy<'a> {
    schema: &'a TypeSchema,
}

impl<'a> CollapsePolicy<'a> {
    pub fn new(schema: &'a TypeSchema) -> Self { Self { schema } }

    pub fn should_auto_collapse(&self, type_name: &str, definition: Option<&TypeDefinition>) -> bool {
        let mut visiting = HashSet::new();
        self.check(type_name, definition, &mut visiting)
    }

    fn check(&self, type_name: &str, definition: Option<&TypeDefinition>, visiting: &mut HashSet<String>) -> bool {
        if is_low_information(type_name) {
            return true;
        }
        if array_element(type_name).is_some_and(|inner| is_low_information(&inner)) {
            return true;
        }
        let Some(def) = definition else {
            return false;
        };
        if def.base_type.as_deref().is_some_and(is_low_information) {
            return true;
        }
        if !visiting.insert(type_name.trim().to_string()) {
            return false;
        }
        def.union_members
            .iter()
            .any(|member| self.check(member, self.schema.lookup(member), visiting))
    }
}
