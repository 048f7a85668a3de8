use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Input is not a tree the engine accepts. Raised before anything is cloned.
    #[error("malformed input tree at `{path}`: {reason}")]
    MalformedInput { path: String, reason: String },

    /// The diff collaborator failed or handed back records that do not fit the trees.
    #[error("diff computation failed: {0}")]
    DiffComputation(String),
}

impl EngineError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput { path: path.into(), reason: reason.into() }
    }
}
