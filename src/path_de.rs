use crate::change::ChangeRecord;
use crate::error::{EngineError, Result};

type PathError = serde_path_to_error::Error<serde_json::Error>;

/// Parse a change list produced by an external diff tool. Errors name the
/// offending record by its JSON path.
pub fn records_from_str(src: &str) -> Result<Vec<ChangeRecord>> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize(de).map_err(unparsable)
}

pub fn records_from_slice(bytes: &[u8]) -> Result<Vec<ChangeRecord>> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(de).map_err(unparsable)
}

fn unparsable(err: PathError) -> EngineError {
    let path = err.path().to_string();
    EngineError::DiffComputation(format!("unparsable change record at {path}: {}", err.into_inner()))
}
