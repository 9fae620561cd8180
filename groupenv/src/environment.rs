//! One group's isolated runtime: synced dependencies, a loading context over
//! its archives, and the components wired from its descriptor.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use groupenv_core::config::EnvConfig;
use groupenv_core::GroupLayout;
use groupenv_runtime::discovery::discover_archives;
use groupenv_runtime::{
    wire, ComponentRef, ComponentRegistry, ContextBuilder, DependencySync, LibraryLoader,
    LoadingContext, PlatformBase,
};

use crate::error::{EnvError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    Initializing,
    Ready,
    Disposed,
}

/// What happens to the context and components a refresh replaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplacedContextPolicy {
    /// Leave them alone; they go away when the last handle drops.
    #[default]
    Retain,
    /// Dispose the superseded components and close the superseded context.
    Close,
}

/// Shared machinery every environment of a registry uses.
pub struct Toolchain {
    sync: DependencySync,
    builder: ContextBuilder,
    archive_extension: String,
    policy: ReplacedContextPolicy,
}

impl Toolchain {
    pub fn new(cfg: &EnvConfig, base: PlatformBase, loader: Arc<dyn LibraryLoader>) -> Self {
        Self {
            sync: DependencySync::new(cfg.build_tool.clone()),
            builder: ContextBuilder::new(base, loader),
            archive_extension: cfg.library.archive_extension.clone(),
            policy: if cfg.refresh.close_replaced_context {
                ReplacedContextPolicy::Close
            } else {
                ReplacedContextPolicy::Retain
            },
        }
    }

    pub fn archive_extension(&self) -> &str {
        &self.archive_extension
    }

    pub fn policy(&self) -> ReplacedContextPolicy {
        self.policy
    }
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolchain")
            .field("program", &self.sync.resolve_program())
            .field("archive_extension", &self.archive_extension)
            .field("policy", &self.policy)
            .finish()
    }
}

/// The published half of an environment. Always replaced as a whole.
#[derive(Clone)]
struct Runtime {
    libraries: Vec<PathBuf>,
    context: Arc<LoadingContext>,
    components: Arc<ComponentRegistry>,
}

pub struct GroupEnvironment {
    layout: GroupLayout,
    toolchain: Arc<Toolchain>,
    refresh_lock: Mutex<()>,
    state: Mutex<EnvState>,
    runtime: RwLock<Runtime>,
}

impl GroupEnvironment {
    /// Create the environment and run its first refresh.
    ///
    /// The dependency phase never fails; a wiring failure is returned and the
    /// half-built environment is disposed on drop.
    pub fn open(layout: GroupLayout, toolchain: Arc<Toolchain>) -> Result<Self> {
        let placeholder = toolchain.builder.build(&layout.group, &[]);
        let env = Self {
            runtime: RwLock::new(Runtime {
                libraries: Vec::new(),
                components: Arc::new(ComponentRegistry::empty(Arc::clone(&placeholder))),
                context: placeholder,
            }),
            layout,
            toolchain,
            refresh_lock: Mutex::new(()),
            state: Mutex::new(EnvState::Initializing),
        };
        env.refresh()?;
        Ok(env)
    }

    pub fn group(&self) -> &str {
        &self.layout.group
    }

    pub fn layout(&self) -> &GroupLayout {
        &self.layout
    }

    pub fn state(&self) -> EnvState {
        *self.lock_state()
    }

    /// Current loading context. A refresh may replace it at any time.
    pub fn context(&self) -> Arc<LoadingContext> {
        Arc::clone(&self.snapshot().context)
    }

    pub fn components(&self) -> Arc<ComponentRegistry> {
        Arc::clone(&self.snapshot().components)
    }

    /// Archives the current context was built from, in discovery order.
    pub fn resolved_libraries(&self) -> Vec<PathBuf> {
        self.snapshot().libraries
    }

    pub fn library_path_set(&self) -> HashSet<PathBuf> {
        self.snapshot().libraries.into_iter().collect()
    }

    /// Look up a wired component, building it now if it is lazy.
    pub fn component(&self, name: &str) -> Result<ComponentRef> {
        self.ensure_live()?;
        Ok(self.components().get(name)?)
    }

    /// Re-sync dependencies, then rebuild the loading context and components.
    pub fn refresh(&self) -> Result<()> {
        let _guard = self.lock_refresh();
        self.ensure_live()?;

        let output = self
            .toolchain
            .sync
            .sync(&self.layout.library_dir, &self.layout.manifest_path);
        tracing::debug!(group = %self.group(), bytes = output.len(), "Dependency phase finished");

        let libraries = discover_archives(&self.layout.library_dir, &self.toolchain.archive_extension);
        tracing::info!(group = %self.group(), libraries = libraries.len(), "Rebuilding loading context");
        let context = self.toolchain.builder.build(self.group(), &libraries);
        let components = match wire(&self.layout.descriptor_path, &context) {
            Ok(components) => components,
            Err(e) => {
                // Never published; nothing else can hold it.
                context.close();
                return Err(e.into());
            }
        };

        self.install_runtime(Runtime {
            libraries,
            context,
            components: Arc::new(components),
        });
        let mut state = self.lock_state();
        if *state == EnvState::Initializing {
            *state = EnvState::Ready;
            tracing::info!(group = %self.group(), "Environment ready");
        }
        Ok(())
    }

    /// Re-read the wiring descriptor and rebuild components against the current context.
    pub fn rewire(&self) -> Result<()> {
        let _guard = self.lock_refresh();
        self.ensure_live()?;
        let current = self.snapshot();
        let components = wire(&self.layout.descriptor_path, &current.context)?;
        self.install_runtime(Runtime {
            components: Arc::new(components),
            ..current
        });
        Ok(())
    }

    /// Dispose components, then close the context. Safe to call repeatedly.
    pub fn dispose(&self) {
        let _guard = self.lock_refresh();
        {
            let mut state = self.lock_state();
            if *state == EnvState::Disposed {
                return;
            }
            *state = EnvState::Disposed;
        }
        let runtime = self.snapshot();
        guarded(self.group(), "component dispose", || runtime.components.dispose());
        guarded(self.group(), "context close", || runtime.context.close());
        tracing::info!(group = %self.group(), context = runtime.context.id(), "Environment disposed");
    }

    // Callers hold the refresh lock.
    fn install_runtime(&self, next: Runtime) {
        let previous = {
            let mut runtime = self.runtime.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *runtime, next)
        };
        tracing::debug!(
            group = %self.group(),
            previous = previous.context.id(),
            policy = ?self.toolchain.policy,
            "Runtime replaced"
        );
        if self.toolchain.policy == ReplacedContextPolicy::Close {
            guarded(self.group(), "component dispose", || previous.components.dispose());
            if previous.context.id() != self.snapshot().context.id() {
                guarded(self.group(), "context close", || previous.context.close());
            }
        }
    }

    fn snapshot(&self) -> Runtime {
        self.runtime.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state() == EnvState::Disposed {
            return Err(EnvError::Disposed {
                group: self.group().to_string(),
            });
        }
        Ok(())
    }

    fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_state(&self) -> MutexGuard<'_, EnvState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for GroupEnvironment {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for GroupEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runtime = self.snapshot();
        f.debug_struct("GroupEnvironment")
            .field("group", &self.layout.group)
            .field("state", &self.state())
            .field("context", &runtime.context.id())
            .field("libraries", &runtime.libraries)
            .finish()
    }
}

/// Run one teardown step, logging a failure instead of letting it stop the next step.
fn guarded(group: &str, step: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(group, step, "Teardown step panicked: {}", panic_message(&payload));
    }
}

pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
