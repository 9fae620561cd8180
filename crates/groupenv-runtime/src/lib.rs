//! Per-group runtime pieces: dependency sync, archive discovery, isolated
//! loading contexts and component wiring.

pub mod component;
pub mod context;
pub mod deps;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod scope;
pub mod wiring;

pub use component::{downcast, Component, ComponentFactory, ComponentRef, ComponentRequest, FactoryTable};
pub use context::{ContextBuilder, LoadingContext, PlatformBase};
pub use deps::DependencySync;
pub use error::{LoadError, ResolveError, WiringError};
pub use loader::{LibraryLoader, LoadedLibrary, NativeLoader};
pub use wiring::{wire, ComponentRegistry, ComponentSpec, WiringDescriptor};
