//! Unified configuration layer.
//!
//! All environment reads go through this module; the rest of the workspace
//! consumes the typed structs.
//!
//! - `loader`: `env_or`, `env_optional`, `env_bool`, `.env` loading
//! - `schema`: `PathsConfig`, `BuildToolConfig`, `LibraryConfig`, `RefreshConfig`, `ObservabilityConfig`
//! - `env_keys`: key constants and aliases

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, load_dotenv};
pub use schema::{
    BuildToolConfig, EnvConfig, LibraryConfig, ObservabilityConfig, PathsConfig, RefreshConfig,
};
