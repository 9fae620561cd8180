use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure to open a plugin library or read its registrations.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to open library {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Library {path} does not export `{symbol}`")]
    MissingSymbol { path: PathBuf, symbol: String },

    #[error("Library {path} was built for plugin ABI {actual}, expected {expected}")]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error("Library {path} failed to register its types: {message}")]
    Registration { path: PathBuf, message: String },
}

/// A type lookup against a loading context failed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("loading context #{id} of group '{group}' is closed")]
    Closed { group: String, id: u64 },

    #[error("type '{type_name}' is not visible in group '{group}'")]
    UnknownType { group: String, type_name: String },
}

/// Wiring a group's components failed.
#[derive(Debug, Error)]
pub enum WiringError {
    #[error("Failed to read wiring descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed wiring descriptor {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Wiring descriptor {path} must be a JSON object of component entries")]
    NotAnObject { path: PathBuf },

    #[error("Component '{component}' is not declared")]
    UnknownComponent { component: String },

    #[error("Component '{component}' of type '{type_name}' cannot be resolved: {source}")]
    Resolve {
        component: String,
        type_name: String,
        #[source]
        source: ResolveError,
    },

    #[error("Component '{component}' of type '{type_name}' failed to initialize: {source}")]
    Instantiate {
        component: String,
        type_name: String,
        #[source]
        source: BoxError,
    },

    #[error("component registry has been disposed")]
    Disposed,
}
