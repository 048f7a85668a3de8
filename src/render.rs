//! Plain-text tree view of an annotated diff.
//!
//! One line per node: status marker, key, type label (or the raw path when
//! the type is unresolved), and the value for primitives. Nodes whose type
//! auto-collapses are summarized on one line unless they carry changes or
//! `expand_all` is set.
use std::fmt::Write as _;

use colored::{ColoredString, Colorize};
use serde_json::Value;

use crate::annotate::{AnnotatedNode, DiffStatus, NodeContent};
use crate::collapse::CollapsePolicy;
use crate::path::NodePath;
use crate::schema::TypeSchema;

const INDENT: &str = "  ";

#[derive(Clone, Copy, Debug, Default)]
pub struct RenderOptions {
    pub expand_all: bool,
}

pub struct TreeRenderer<'a> {
    schema: &'a TypeSchema,
    policy: CollapsePolicy<'a>,
    options: RenderOptions,
}

impl<'a> TreeRenderer<'a> {
    pub fn new(schema: &'a TypeSchema, options: RenderOptions) -> Self {
        Self { schema, policy: CollapsePolicy::new(schema), options }
    }

    pub fn render(&self, root: &AnnotatedNode) -> String {
        let mut out = String::new();
        self.line(root, &NodePath::root(), &mut out);
        out
    }

    fn line(&self, node: &AnnotatedNode, path: &NodePath, out: &mut String) {
        let indent = INDENT.repeat(path.len());
        let key = path.last().unwrap_or("$");
        let label = match &node.type_name {
            Some(name) => name.clone(),
            None if path.is_root() => "<root>".to_string(),
            None => path.to_string(),
        };
        let mut text = format!("{key}: {label}");
        if !node.kind.is_empty() {
            let _ = write!(text, " ({})", node.kind);
        }
        if let Some(prev) = node.previous_type.as_deref().filter(|p| Some(*p) != node.type_name.as_deref()) {
            let _ = write!(text, " [was {prev}]");
        }

        let children = node.children();
        match &node.content {
            NodeContent::Primitive(value) => {
                let shown = match (node.diff_status, &node.before_value) {
                    (DiffStatus::Updated, Some(before)) => format!("{} -> {}", short(before), short(value)),
                    _ => short(value),
                };
                let _ = write!(text, " = {shown}");
            }
            _ if self.is_collapsed(node) => {
                let _ = write!(text, " {}", format!("[{} hidden]", children.len()).dimmed());
                let _ = writeln!(out, "{indent}{} {}", marker(node.diff_status), paint(node.diff_status, &text));
                return;
            }
            _ => {}
        }
        let _ = writeln!(out, "{indent}{} {}", marker(node.diff_status), paint(node.diff_status, &text));
        for (seg, child) in children {
            self.line(child, &path.child(seg), out);
        }
    }

    fn is_collapsed(&self, node: &AnnotatedNode) -> bool {
        if self.options.expand_all || node.diff_status.is_change() {
            return false;
        }
        let Some(name) = node.type_name.as_deref() else {
            return false;
        };
        let lookup = self.schema.get_type(name);
        self.policy.should_auto_collapse(name, lookup.definition.as_deref())
    }
}

fn marker(status: DiffStatus) -> ColoredString {
    match status {
        DiffStatus::Unchanged => " ".normal(),
        DiffStatus::Added => "+".green().bold(),
        DiffStatus::NestedAdd => "+".green(),
        DiffStatus::Removed => "-".red().bold(),
        DiffStatus::NestedRemove => "-".red(),
        DiffStatus::Updated => "~".yellow().bold(),
        DiffStatus::ContainsChanges => "*".cyan(),
        DiffStatus::ContainsNestedChanges => ".".cyan(),
    }
}

fn paint(status: DiffStatus, text: &str) -> ColoredString {
    match status {
        DiffStatus::Added | DiffStatus::NestedAdd => text.green(),
        DiffStatus::Removed | DiffStatus::NestedRemove => text.red(),
        DiffStatus::Updated => text.yellow(),
        DiffStatus::ContainsChanges | DiffStatus::ContainsNestedChanges => text.normal(),
        DiffStatus::Unchanged => text.dimmed(),
    }
}

fn short(value: &Value) -> String {
    const MAX: usize = 60;
    let text = value.to_string();
    if text.chars().count() <= MAX {
        return text;
    }
    let head: String = text.chars().take(MAX).collect();
    format!("{head}...")
}
