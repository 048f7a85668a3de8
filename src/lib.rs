pub mod annotate;
pub mod change;
pub mod collapse;
pub mod diff;
pub mod error;
pub mod path;
pub mod path_de;
pub mod render;
pub mod resolve;
pub mod schema;
pub mod tree;
pub mod walk;

pub use annotate::{AnnotatedNode, DiffOutcome, DiffStatus, NodeContent, annotate, annotate_diff};
pub use change::{ChangeKind, ChangeMap, ChangeRecord};
pub use collapse::CollapsePolicy;
pub use diff::{DiffOptions, Differ, PrecomputedChanges, StructuralDiffer};
pub use error::{EngineError, Result};
pub use path::NodePath;
pub use render::{RenderOptions, TreeRenderer};
pub use resolve::{ResolvedType, resolve_type};
pub use schema::{TypeDefinition, TypeSchema};
pub use walk::{TypeWalker, TypedNode};
