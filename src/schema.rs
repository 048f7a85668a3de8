//! Static type schema for AST nodes.
//!
//! A registry maps type names to definitions: plain records (`properties`),
//! tagged unions (`unionMembers`) and extensions (`baseType` plus extra
//! properties). Two textual forms are understood on top of plain names:
//! - `{ T }`: array of `T`
//! - `Base<Argument>`: generic reference; `Pair` and `Punctuated` are
//!   synthesized on lookup, any other base yields an empty definition.
//!
//! The bundled Luau-flavoured schema is parsed once per process; everything
//! else receives the registry by reference.
pub mod generic;

use std::borrow::Cow;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use generic::{GenericTypeReference, parse_generic, split_arguments};

use crate::path::segment_index;

// ------------------------------- Policy ---------------------------------- //

const BUNDLED_SCHEMA_SRC: &str = include_str!("schema/luau.json");

/// Guard for `baseType` chains that loop back on themselves.
const MAX_BASE_CHAIN: usize = 32;

static BUNDLED: Lazy<TypeSchema> = Lazy::new(|| {
    TypeSchema::from_json(BUNDLED_SCHEMA_SRC).expect("bundled schema is valid")
});

static ARRAY_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{\s*(.*?)\s*\}$").expect("array form regex")
});

// -------------------------------- Types ---------------------------------- //

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub union_members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PropertyType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// The property's type is the enclosing generic's argument.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub generic: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyType {
    Single(String),
    OneOf(Vec<String>),
}

impl PropertyType {
    /// The type name when exactly one is declared.
    pub fn single(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s),
            Self::OneOf(xs) if xs.len() == 1 => Some(&xs[0]),
            Self::OneOf(_) => None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::OneOf(xs) => xs.iter().map(String::as_str).collect(),
        }
    }
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self { name: name.into(), ty: PropertyType::Single(ty.into()), optional: false, generic: false }
    }
    fn optional(mut self) -> Self { self.optional = true; self }
    fn generic(mut self) -> Self { self.generic = true; self }
}

/// Result of [`TypeSchema::get_type`].
#[derive(Clone, Debug, PartialEq)]
pub struct TypeLookup<'a> {
    pub definition: Option<Cow<'a, TypeDefinition>>,
    pub is_array: bool,
}

#[derive(Clone, Debug, Default)]
pub struct TypeSchema {
    types: IndexMap<String, TypeDefinition>,
}

// ---------------------------- Construction ------------------------------- //

impl TypeSchema {
    /// The schema shipped with the crate.
    pub fn bundled() -> &'static TypeSchema { &BUNDLED }

    /// Load a schema document: a JSON object of type name → definition.
    pub fn from_json(src: &str) -> Result<Self, serde_json::Error> {
        let types = serde_json::from_str::<IndexMap<String, TypeDefinition>>(src)?;
        Ok(Self { types })
    }

    pub fn from_definitions<I>(defs: I) -> Self
    where
        I: IntoIterator<Item = (String, TypeDefinition)>,
    {
        Self { types: defs.into_iter().collect() }
    }

    pub fn len(&self) -> usize { self.types.len() }
    pub fn is_empty(&self) -> bool { self.types.is_empty() }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Plain registry lookup, no textual forms.
    pub fn lookup(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }
}

// ------------------------------- Lookup ---------------------------------- //

impl TypeSchema {
    pub fn get_type<'a>(&'a self, type_name: &str) -> TypeLookup<'a> {
        if let Some(inner) = array_element(type_name) {
            let inner_lookup = self.get_type(&inner);
            return TypeLookup { definition: inner_lookup.definition, is_array: true };
        }
        if let Some(reference) = parse_generic(type_name) {
            return TypeLookup {
                definition: Some(Cow::Owned(synthesize_generic(&reference))),
                is_array: false,
            };
        }
        TypeLookup {
            definition: self.lookup(type_name.trim()).map(Cow::Borrowed),
            is_array: false,
        }
    }

    /// Find `name` on `def` or along its `baseType` chain.
    pub fn find_property<'d>(&'d self, def: &'d TypeDefinition, name: &str) -> Option<&'d PropertyDefinition> {
        let mut current = def;
        for _ in 0..MAX_BASE_CHAIN {
            if let Some(p) = current.properties.iter().find(|p| p.name == name) {
                return Some(p);
            }
            current = self.lookup(current.base_type.as_deref()?)?;
        }
        None
    }

    /// Type a child at `key` inherits from its parent's declared type.
    pub fn child_inferred_type(&self, parent_type: &str, key: &str) -> Option<String> {
        if let Some(inner) = array_element(parent_type) {
            return segment_index(key).map(|_| inner);
        }
        let lookup = self.get_type(parent_type);
        let def = lookup.definition?;
        if segment_index(key).is_some() {
            // Punctuated lists carry their element type on an unnamed property.
            if let Some(list) = def.properties.iter().find(|p| p.name.is_empty()) {
                return list.ty.single().and_then(array_element);
            }
        }
        self.declared_property_type(&def, key, 0)
    }

    /// Declared type of `key`; for unions, the type every declaring member agrees on.
    fn declared_property_type(&self, def: &TypeDefinition, key: &str, depth: usize) -> Option<String> {
        if let Some(p) = self.find_property(def, key) {
            return p.ty.single().map(str::to_string);
        }
        if depth >= MAX_BASE_CHAIN {
            return None;
        }
        let mut found: Option<String> = None;
        for member in &def.union_members {
            let Some(member_def) = self.lookup(member) else { continue };
            if let Some(ty) = self.declared_property_type(member_def, key, depth + 1) {
                match &found {
                    Some(prev) if *prev != ty => return None,
                    _ => found = Some(ty),
                }
            }
        }
        found
    }
}

/// `T` from the `{ T }` array form.
pub fn array_element(type_name: &str) -> Option<String> {
    ARRAY_FORM
        .captures(type_name.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|inner| !inner.is_empty())
}

pub fn array_of(element: &str) -> String { format!("{{ {element} }}") }

fn synthesize_generic(reference: &GenericTypeReference) -> TypeDefinition {
    let args = split_arguments(&reference.argument);
    match (reference.base_type.as_str(), args.as_slice()) {
        ("Pair", [node, rest @ ..]) => {
            let separator = match rest.first() {
                Some(sep) => format!("Token<{sep}>"),
                None => "Token".to_string(),
            };
            TypeDefinition {
                properties: vec![
                    PropertyDefinition::new("node", node.as_str()).generic(),
                    PropertyDefinition::new("separator", separator).optional(),
                ],
                ..TypeDefinition::default()
            }
        }
        ("Punctuated", [_, ..]) => TypeDefinition {
            properties: vec![
                PropertyDefinition::new("", array_of(&format!("Pair<{}>", reference.argument))).generic(),
            ],
            ..TypeDefinition::default()
        },
        _ => TypeDefinition::default(),
    }
}
