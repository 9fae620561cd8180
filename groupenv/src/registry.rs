//! Process-wide cache of group environments.
//!
//! Each key is built at most once at a time. Callers that arrive while a
//! build is running wait for it and share its result; a failed build leaves
//! nothing cached. Invalidation disposes the cached instance before the key
//! can be built again.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use groupenv_core::config::EnvConfig;
use groupenv_core::GroupLayout;
use groupenv_runtime::{LibraryLoader, NativeLoader, PlatformBase};

use crate::environment::{panic_message, GroupEnvironment, Toolchain};
use crate::error::{EnvError, Result};

type Outcome = std::result::Result<Arc<GroupEnvironment>, Arc<EnvError>>;
type EvictListener = Box<dyn Fn(&str) + Send + Sync>;

/// A value published once and read by any number of waiters.
struct Pending<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T: Clone> Pending<T> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn complete(&self, value: T) {
        let mut slot = self.value.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(value);
        self.ready.notify_all();
    }

    fn wait(&self) -> T {
        let mut slot = self.value.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(ref value) = *slot {
                return value.clone();
            }
            slot = self.ready.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }
}

enum Slot {
    Building(Arc<Pending<Outcome>>),
    Ready(Arc<GroupEnvironment>),
    Retiring(Arc<Pending<()>>),
}

pub struct RegistryBuilder {
    config: EnvConfig,
    base: PlatformBase,
    loader: Arc<dyn LibraryLoader>,
    listeners: Vec<EvictListener>,
}

impl RegistryBuilder {
    pub fn new(config: EnvConfig) -> Self {
        Self {
            config,
            base: PlatformBase::empty(),
            loader: Arc::new(NativeLoader),
            listeners: Vec::new(),
        }
    }

    /// Factories every group context starts from.
    pub fn platform_base(mut self, base: PlatformBase) -> Self {
        self.base = base;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn LibraryLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Called with the group name after an evicted environment has been disposed.
    pub fn on_evict(mut self, listener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn build(self) -> EnvironmentRegistry {
        EnvironmentRegistry {
            toolchain: Arc::new(Toolchain::new(&self.config, self.base, self.loader)),
            config: self.config,
            slots: Mutex::new(HashMap::new()),
            listeners: self.listeners,
            constructions: AtomicUsize::new(0),
        }
    }
}

pub struct EnvironmentRegistry {
    config: EnvConfig,
    toolchain: Arc<Toolchain>,
    slots: Mutex<HashMap<String, Slot>>,
    listeners: Vec<EvictListener>,
    constructions: AtomicUsize,
}

impl EnvironmentRegistry {
    /// Native plugin loading over an empty platform base.
    pub fn new(config: EnvConfig) -> Self {
        RegistryBuilder::new(config).build()
    }

    pub fn builder(config: EnvConfig) -> RegistryBuilder {
        RegistryBuilder::new(config)
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn layout(&self, group: &str) -> Result<GroupLayout> {
        Ok(GroupLayout::new(&self.config, group)?)
    }

    /// The cached environment for `group`, building it first if needed.
    pub fn get_or_create(&self, group: &str) -> Result<Arc<GroupEnvironment>> {
        let layout = self.layout(group)?;
        loop {
            let mut slots = self.lock_slots();
            match slots.get(group) {
                Some(Slot::Ready(env)) => return Ok(Arc::clone(env)),
                Some(Slot::Building(pending)) => {
                    let pending = Arc::clone(pending);
                    drop(slots);
                    tracing::debug!(group, "Waiting for environment construction");
                    return pending.wait().map_err(|source| EnvError::Creation {
                        group: group.to_string(),
                        source,
                    });
                }
                Some(Slot::Retiring(gate)) => {
                    let gate = Arc::clone(gate);
                    drop(slots);
                    gate.wait();
                }
                None => {
                    let pending = Arc::new(Pending::new());
                    slots.insert(group.to_string(), Slot::Building(Arc::clone(&pending)));
                    drop(slots);
                    return self.construct(layout, &pending);
                }
            }
        }
    }

    /// The cached environment, without building one.
    pub fn get(&self, group: &str) -> Option<Arc<GroupEnvironment>> {
        match self.lock_slots().get(group) {
            Some(Slot::Ready(env)) => Some(Arc::clone(env)),
            _ => None,
        }
    }

    /// Evict and dispose the environment for `group`. Absent keys are a no-op.
    ///
    /// A construction in flight is allowed to finish and is then evicted.
    pub fn invalidate(&self, group: &str) {
        loop {
            let mut slots = self.lock_slots();
            match slots.remove(group) {
                None => return,
                Some(Slot::Building(pending)) => {
                    slots.insert(group.to_string(), Slot::Building(Arc::clone(&pending)));
                    drop(slots);
                    let _ = pending.wait();
                }
                Some(Slot::Retiring(gate)) => {
                    slots.insert(group.to_string(), Slot::Retiring(Arc::clone(&gate)));
                    drop(slots);
                    gate.wait();
                    return;
                }
                Some(Slot::Ready(env)) => {
                    let gate = Arc::new(Pending::new());
                    slots.insert(group.to_string(), Slot::Retiring(Arc::clone(&gate)));
                    drop(slots);
                    self.retire(group, env);
                    self.lock_slots().remove(group);
                    gate.complete(());
                    return;
                }
            }
        }
    }

    pub fn invalidate_all(&self) {
        for group in self.groups() {
            self.invalidate(&group);
        }
    }

    pub fn contains(&self, group: &str) -> bool {
        matches!(self.lock_slots().get(group), Some(Slot::Ready(_)))
    }

    /// Groups with a cached environment, sorted.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .lock_slots()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(group, _)| group.clone())
            .collect();
        groups.sort();
        groups
    }

    /// Number of environment constructions started so far.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    fn construct(&self, layout: GroupLayout, pending: &Arc<Pending<Outcome>>) -> Result<Arc<GroupEnvironment>> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        let group = layout.group.clone();
        tracing::info!(group = %group, "Creating environment");

        let toolchain = Arc::clone(&self.toolchain);
        let outcome: Outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
            GroupEnvironment::open(layout, toolchain)
        })) {
            Ok(Ok(env)) => Ok(Arc::new(env)),
            Ok(Err(e)) => Err(Arc::new(e)),
            Err(payload) => Err(Arc::new(EnvError::Panicked {
                group: group.clone(),
                message: panic_message(&payload),
            })),
        };

        {
            let mut slots = self.lock_slots();
            match &outcome {
                Ok(env) => {
                    slots.insert(group.clone(), Slot::Ready(Arc::clone(env)));
                }
                Err(e) => {
                    tracing::warn!(group = %group, "Environment construction failed: {}", e);
                    slots.remove(&group);
                }
            }
        }
        pending.complete(outcome.clone());
        outcome.map_err(|source| EnvError::Creation { group, source })
    }

    fn retire(&self, group: &str, env: Arc<GroupEnvironment>) {
        tracing::info!(group, "Invalidating environment");
        env.dispose();
        drop(env);
        for listener in &self.listeners {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(group))) {
                tracing::error!(group, "Eviction listener panicked: {}", panic_message(&payload));
            }
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for EnvironmentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentRegistry")
            .field("home", &self.config.paths.home)
            .field("groups", &self.groups())
            .field("toolchain", &self.toolchain)
            .finish()
    }
}
