//! Isolated loading contexts.
//!
//! A [`LoadingContext`] is an arena: the factories of the platform base scope
//! plus those contributed by exactly one group's archives. Host application
//! libraries are never part of it. Closing the arena makes every lookup fail
//! from then on; library code stays mapped until the last factory or
//! component that came from it is dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::component::{Component, ComponentFactory, ComponentRef, ComponentRequest, FactoryTable};
use crate::error::ResolveError;
use crate::loader::{LibraryLoader, LoadedLibrary};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The platform's foundational types, visible to every group.
#[derive(Clone, Default)]
pub struct PlatformBase {
    factories: Arc<FactoryTable>,
}

impl PlatformBase {
    pub fn new(factories: FactoryTable) -> Self {
        Self {
            factories: Arc::new(factories),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn factories(&self) -> &FactoryTable {
        &self.factories
    }
}

impl fmt::Debug for PlatformBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PlatformBase").field(&*self.factories).finish()
    }
}

struct Arena {
    factories: FactoryTable,
    handles: Vec<Arc<dyn LoadedLibrary>>,
    closed: bool,
}

/// One group's isolated set of resolvable types.
pub struct LoadingContext {
    id: u64,
    group: String,
    libraries: Vec<PathBuf>,
    arena: RwLock<Arena>,
}

impl LoadingContext {
    /// Process-unique identity; a rebuilt context always gets a new id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Archives this context was built from, in load order.
    pub fn libraries(&self) -> &[PathBuf] {
        &self.libraries
    }

    /// Archives that actually loaded and are still held by the arena.
    pub fn loaded_libraries(&self) -> Vec<PathBuf> {
        let arena = self.arena.read().unwrap_or_else(|e| e.into_inner());
        arena.handles.iter().map(|h| h.path().to_path_buf()).collect()
    }

    pub fn resolve(&self, type_name: &str) -> Result<Arc<dyn ComponentFactory>, ResolveError> {
        let arena = self.arena.read().unwrap_or_else(|e| e.into_inner());
        if arena.closed {
            return Err(ResolveError::Closed {
                group: self.group.clone(),
                id: self.id,
            });
        }
        arena
            .factories
            .get(type_name)
            .ok_or_else(|| ResolveError::UnknownType {
                group: self.group.clone(),
                type_name: type_name.to_string(),
            })
    }

    /// Sorted type identifiers visible in this context; empty once closed.
    pub fn type_names(&self) -> Vec<String> {
        let arena = self.arena.read().unwrap_or_else(|e| e.into_inner());
        arena.factories.type_names()
    }

    /// Release the arena. Idempotent.
    pub fn close(&self) {
        let mut arena = self.arena.write().unwrap_or_else(|e| e.into_inner());
        if arena.closed {
            return;
        }
        arena.closed = true;
        arena.factories.clear();
        let released = arena.handles.len();
        arena.handles.clear();
        tracing::info!(
            group = %self.group,
            context = self.id,
            libraries = released,
            "Loading context closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.arena.read().unwrap_or_else(|e| e.into_inner()).closed
    }
}

impl fmt::Debug for LoadingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingContext")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("libraries", &self.libraries)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builds fresh loading contexts parented only at the platform base.
#[derive(Clone)]
pub struct ContextBuilder {
    base: PlatformBase,
    loader: Arc<dyn LibraryLoader>,
}

impl ContextBuilder {
    pub fn new(base: PlatformBase, loader: Arc<dyn LibraryLoader>) -> Self {
        Self { base, loader }
    }

    /// Build a new context from `archives`, in the given order.
    ///
    /// Archives that fail to load are skipped with a warning. A type name
    /// keeps its first registration: base types cannot be shadowed, and an
    /// earlier archive wins over a later one.
    pub fn build(&self, group: &str, archives: &[PathBuf]) -> Arc<LoadingContext> {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let mut factories = (*self.base.factories).clone();
        let mut handles = Vec::with_capacity(archives.len());

        for path in archives {
            let library = match self.loader.load(path) {
                Ok(lib) => lib,
                Err(e) => {
                    tracing::warn!(group, archive = %path.display(), "Skipping archive: {}", e);
                    continue;
                }
            };
            let mut contributed = FactoryTable::new();
            if let Err(e) = library.register(&mut contributed) {
                tracing::warn!(group, archive = %path.display(), "Skipping archive: {}", e);
                continue;
            }
            for (type_name, factory) in contributed.drain() {
                let bound = LibraryBound {
                    factory,
                    library: Arc::clone(&library),
                };
                if !factories.register_shared(type_name.clone(), Arc::new(bound)) {
                    tracing::warn!(
                        group,
                        archive = %path.display(),
                        "Type '{}' already defined; keeping the earlier definition",
                        type_name
                    );
                }
            }
            tracing::debug!(group, archive = %path.display(), "Loaded archive");
            handles.push(library);
        }

        tracing::info!(
            group,
            context = id,
            archives = archives.len(),
            loaded = handles.len(),
            types = factories.len(),
            "Built loading context"
        );

        Arc::new(LoadingContext {
            id,
            group: group.to_string(),
            libraries: archives.to_vec(),
            arena: RwLock::new(Arena {
                factories,
                handles,
                closed: false,
            }),
        })
    }
}

/// Factory from a plugin; keeps its library mapped.
struct LibraryBound {
    factory: Arc<dyn ComponentFactory>,
    library: Arc<dyn LoadedLibrary>,
}

impl ComponentFactory for LibraryBound {
    fn create(&self, request: &ComponentRequest<'_>) -> anyhow::Result<ComponentRef> {
        let inner = self.factory.create(request)?;
        Ok(Arc::new(Pinned {
            inner,
            _library: Arc::clone(&self.library),
        }))
    }
}

/// Component from a plugin; keeps its library mapped.
struct Pinned {
    inner: ComponentRef,
    _library: Arc<dyn LoadedLibrary>,
}

impl Component for Pinned {
    fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }

    fn dispose(&self) -> anyhow::Result<()> {
        self.inner.dispose()
    }
}

/// True when `path` has `extension`, compared case-insensitively.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
        .unwrap_or(false)
}
