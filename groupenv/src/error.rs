//! Environment-level errors.

use std::path::PathBuf;
use std::sync::Arc;

use groupenv_core::LayoutError;
use groupenv_runtime::WiringError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    /// Construction failed. Every caller that waited on the same attempt
    /// receives a clone of the same underlying failure.
    #[error("failed to create environment for group '{group}': {source}")]
    Creation {
        group: String,
        #[source]
        source: Arc<EnvError>,
    },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Wiring(#[from] WiringError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("environment for group '{group}' has been disposed")]
    Disposed { group: String },

    #[error("environment construction for group '{group}' panicked: {message}")]
    Panicked { group: String, message: String },
}

impl EnvError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The innermost error, looking through shared construction failures.
    pub fn root(&self) -> &EnvError {
        match self {
            Self::Creation { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, EnvError>;
