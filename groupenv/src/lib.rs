//! Per-group isolated library environments.
//!
//! A group owns a dependency manifest, a set of plugin archives and a
//! component wiring descriptor. [`EnvironmentRegistry`] keeps one
//! [`GroupEnvironment`] per group, and [`EnvironmentService`] exposes the
//! operations callers use to update and inspect them.

pub mod environment;
pub mod error;
pub mod registry;
pub mod service;

pub use environment::{EnvState, GroupEnvironment, ReplacedContextPolicy, Toolchain};
pub use error::{EnvError, Result};
pub use registry::{EnvironmentRegistry, RegistryBuilder};
pub use service::{EnvironmentService, RemovalOutcome, REMOVE_ATTEMPTS, REMOVE_RETRY_DELAY};
