use std::path::{Path, PathBuf};

use crate::AmpsymResult;

/// Expand `~` and environment variables in a path which must already exist, and canonicalize it.
pub fn expand_input_path(file_path: &str) -> AmpsymResult<PathBuf> {
    Ok(Path::new(&*shellexpand::full(file_path)?).canonicalize()?)
}

/// Expand `~` and environment variables in a path which may not exist yet.
pub fn expand_output_path(file_path: &str) -> AmpsymResult<PathBuf> {
    Ok(PathBuf::from(&*shellexpand::full(file_path)?))
}
