//! The loader seam between the analysis engine and schema sources.

use std::sync::Arc;

use crate::package::Package;

/// Errors a loader can produce. The analysis engine records these as
/// deferred diagnostics; they never abort a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("no schema found for package '{name}'")]
    NotFound { name: String },

    #[error("failed to read schema for '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema for '{name}': {message}")]
    Invalid { name: String, message: String },
}

/// Loads package schemas by name and optional version.
///
/// Implementations may block: the process-wide cache serializes calls and
/// analysis stages tolerate the wait. Request handlers never call a loader
/// directly.
pub trait SchemaLoader: Send + Sync {
    fn load_package(&self, name: &str, version: Option<&str>) -> Result<Arc<Package>, LoadError>;
}
