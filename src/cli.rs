//! CLI: diff two AST documents, or list the resolved type of every node.
use std::borrow::Cow;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;

use ast_delta::{
    DiffOptions, Differ, PrecomputedChanges, RenderOptions, StructuralDiffer, TreeRenderer, TypeSchema,
    TypeWalker, TypedNode, annotate_diff, path_de,
};

// -------------------------------- Types ---------------------------------- //

/// compare two syntax-tree JSON documents and show how every node changed
#[derive(Parser, Debug)]
#[command(name = "ast-delta")]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// annotate the after-tree with per-node diff status
    Diff(DiffOut),
    /// print the resolved type of every node
    Types(TypesOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JSON Pointer to select a subnode in each document (e.g. /root/body)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document; its first output is used
    #[arg(long)]
    jq_expr: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// type schema JSON file (the bundled Luau schema if omitted)
    #[arg(long)]
    schema: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
enum OutputFormat {
    #[default]
    Json,
    Tree,
}

#[derive(clap::Parser, Debug)]
struct DiffOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// the before document
    #[arg(long)]
    before: PathBuf,

    /// the after document
    #[arg(long)]
    after: PathBuf,

    /// precomputed change records (JSON array); skips the structural diff.
    /// Array children must be keyed by position, not by identifying value
    #[arg(long)]
    changes: Option<PathBuf>,

    /// identifying field for matching array elements; repeat to try several
    #[arg(long = "embedded-key")]
    embedded_keys: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// with `--format tree`, show auto-collapsed nodes too
    #[arg(long)]
    expand_all: bool,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct TypesOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// print the listing as JSON
    #[arg(long)]
    json: bool,
}

// ---------------------------- Implementation ----------------------------- //

impl InputSettings {
    fn load_document(&self, source_path: &Path) -> Result<Value> {
        let source_path_str = source_path.to_string_lossy();
        let source = std::fs::read_to_string(source_path)
            .with_context(|| format!("failed to read source file ({source_path_str})"))?;
        let mut json_value = serde_json::from_str::<Value>(&source)
            .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
        if let Some(pointer) = self.json_pointer.as_deref() {
            json_value = json_value
                .pointer(pointer)
                .cloned()
                .with_context(|| format!("JSON pointer `{pointer}` selects nothing in {source_path_str}"))?;
        }
        if let Some(jq_expr) = self.jq_expr.as_deref() {
            json_value = crate::jq_exec::first_output(jq_expr, &json_value)
                .with_context(|| format!("failed to apply jq expression to source file ({source_path_str})"))?;
        }
        Ok(json_value)
    }
}

impl SchemaSettings {
    fn load(&self) -> Result<Cow<'static, TypeSchema>> {
        let Some(path) = self.schema.as_ref() else {
            return Ok(Cow::Borrowed(TypeSchema::bundled()));
        };
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema file ({})", path.display()))?;
        let schema = TypeSchema::from_json(&source)
            .with_context(|| format!("failed to parse schema file ({})", path.display()))?;
        tracing::debug!(types = schema.len(), path = %path.display(), "schema loaded");
        Ok(Cow::Owned(schema))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Diff(target) => target.run(),
            Command::Types(target) => target.run(),
        }
    }
}

impl DiffOut {
    fn run(&self) -> Result<()> {
        let schema = self.schema_settings.load()?;
        let before = self.input_settings.load_document(&self.before)?;
        let after = self.input_settings.load_document(&self.after)?;

        let differ: Box<dyn Differ> = match self.changes.as_ref() {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read changes file ({})", path.display()))?;
                let records = path_de::records_from_str(&source)
                    .with_context(|| format!("invalid changes file ({})", path.display()))?;
                Box::new(PrecomputedChanges(records))
            }
            None => Box::new(StructuralDiffer::new(DiffOptions { embedded_keys: self.embedded_keys.clone() })),
        };

        let outcome = annotate_diff(&before, &after, differ.as_ref(), &schema)?;
        tracing::info!(top_level_changes = outcome.changes.len(), "diff annotated");

        let rendered = match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&outcome)?,
            OutputFormat::Tree => {
                if self.out.is_some() {
                    colored::control::set_override(false);
                }
                TreeRenderer::new(&schema, RenderOptions { expand_all: self.expand_all }).render(&outcome.diff_tree)
            }
        };
        emit(self.out.as_deref(), &rendered)
    }
}

impl TypesOut {
    fn run(&self) -> Result<()> {
        let schema = self.schema_settings.load()?;
        let source_paths = resolve_file_path_patterns(&self.input)?;

        // par_iter + collect keeps input order
        let listings = source_paths
            .par_iter()
            .map(|path| {
                let value = self.input_settings.load_document(path)?;
                let nodes = TypeWalker::new(&schema).walk(&value);
                Ok((path.clone(), nodes))
            })
            .collect::<Result<Vec<(PathBuf, Vec<TypedNode>)>>>()?;

        if self.json {
            let payload: Vec<Value> = listings
                .iter()
                .map(|(path, nodes)| serde_json::json!({"input": path, "nodes": nodes}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&payload)?);
            return Ok(());
        }
        for (path, nodes) in &listings {
            println!("{}", path.display().to_string().cyan().bold());
            for node in nodes {
                println!("{}", format_typed_node(node));
            }
        }
        Ok(())
    }
}

// --------------------------- Internal Helpers ---------------------------- //

fn format_typed_node(node: &TypedNode) -> String {
    let indent = "  ".repeat(node.depth + 1);
    let mut line = format!("{indent}{}: ", if node.key.is_empty() { "$" } else { node.key.as_str() });
    if node.type_name.is_some() && node.defined {
        line.push_str(&node.label().green().to_string());
    } else if node.type_name.is_some() {
        line.push_str(&node.label().yellow().to_string());
    } else {
        line.push_str(&node.label().dimmed().to_string());
    }
    if !node.kind.is_empty() {
        line.push_str(&format!(" ({})", node.kind));
    }
    if node.collapsed {
        line.push_str(&" [collapsed]".dimmed().to_string());
    }
    line
}

fn emit(out: Option<&Path>, rendered: &str) -> Result<()> {
    let Some(out) = out else {
        println!("{rendered}");
        return Ok(());
    };
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory ({})", parent.display()))?;
    }
    std::fs::write(out, rendered).with_context(|| format!("failed to write output ({})", out.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
