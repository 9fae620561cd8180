//! Operations exposed to callers: environment lookup, manifest and
//! descriptor updates, library listing and removal.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use groupenv_core::manifest_info::{self, CoordinationStore};
use groupenv_core::GroupLayout;
use groupenv_runtime::context::has_extension;
use groupenv_runtime::discovery::{host_libraries, list_archives};
use groupenv_runtime::WiringDescriptor;

use crate::environment::GroupEnvironment;
use crate::error::{EnvError, Result};
use crate::registry::EnvironmentRegistry;

pub const REMOVE_ATTEMPTS: usize = 10;
pub const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// Not an archive directly in the group's library directory; nothing done.
    Ineligible,
    Removed,
    /// Still on disk after every attempt. The environment was invalidated anyway.
    Incomplete,
}

impl RemovalOutcome {
    /// Whether the request was accepted (the environment was invalidated).
    pub fn accepted(self) -> bool {
        !matches!(self, Self::Ineligible)
    }
}

pub struct EnvironmentService {
    registry: Arc<EnvironmentRegistry>,
    store: Option<Arc<dyn CoordinationStore>>,
    retry_delay: Duration,
}

impl EnvironmentService {
    pub fn new(registry: Arc<EnvironmentRegistry>) -> Self {
        Self {
            registry,
            store: None,
            retry_delay: REMOVE_RETRY_DELAY,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CoordinationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Pause between removal attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn registry(&self) -> &Arc<EnvironmentRegistry> {
        &self.registry
    }

    pub fn get_or_create(&self, group: &str) -> Result<Arc<GroupEnvironment>> {
        self.registry.get_or_create(group)
    }

    pub fn invalidate(&self, group: &str) {
        self.registry.invalidate(group)
    }

    /// Store the dependency manifest and refresh the group.
    pub fn save_dependency_manifest(&self, group: &str, content: &[u8]) -> Result<()> {
        let layout = self.registry.layout(group)?;
        write_file(&layout.manifest_path, content)?;
        tracing::info!(group, manifest = %layout.manifest_path.display(), "Dependency manifest saved");
        self.refresh(group)
    }

    /// The stored dependency manifest, if any.
    pub fn dependency_manifest(&self, group: &str) -> Result<Option<Vec<u8>>> {
        let layout = self.registry.layout(group)?;
        match std::fs::read(&layout.manifest_path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EnvError::io(&layout.manifest_path, e)),
        }
    }

    /// Store the wiring descriptor and rebuild the group's components.
    ///
    /// Malformed content is rejected before anything is written.
    pub fn save_wiring_descriptor(&self, group: &str, content: &str) -> Result<()> {
        let layout = self.registry.layout(group)?;
        WiringDescriptor::parse(content, &layout.descriptor_path)?;
        write_file(&layout.descriptor_path, content.as_bytes())?;
        tracing::info!(group, descriptor = %layout.descriptor_path.display(), "Wiring descriptor saved");
        match self.registry.get(group) {
            Some(env) => env.rewire(),
            None => self.registry.get_or_create(group).map(|_| ()),
        }
    }

    pub fn list_resolved_libraries(&self, group: &str) -> Result<Vec<PathBuf>> {
        Ok(self.registry.get_or_create(group)?.resolved_libraries())
    }

    pub fn current_library_path_set(&self, group: &str) -> Result<HashSet<PathBuf>> {
        Ok(self.registry.get_or_create(group)?.library_path_set())
    }

    pub fn list_host_libraries(&self) -> Vec<PathBuf> {
        host_libraries(&self.registry.config().library)
    }

    /// Archives placed directly in the group's library directory, excluding
    /// anything the build tool fetched.
    pub fn exportable_libraries(&self, group: &str) -> Result<Vec<PathBuf>> {
        let layout = self.registry.layout(group)?;
        Ok(list_archives(
            &layout.library_dir,
            self.registry.toolchain().archive_extension(),
        ))
    }

    /// Delete a user-managed archive and invalidate the group.
    ///
    /// Returns `true` whenever the path was eligible, even if the file could
    /// not be deleted; that case is logged.
    pub fn remove_library(&self, group: &str, path: &Path) -> Result<bool> {
        Ok(self.remove_library_detailed(group, path)?.accepted())
    }

    pub fn remove_library_detailed(&self, group: &str, path: &Path) -> Result<RemovalOutcome> {
        let layout = self.registry.layout(group)?;
        let Some(target) = self.removable_path(&layout, path) else {
            tracing::info!(group, path = %path.display(), "Library not removable");
            return Ok(RemovalOutcome::Ineligible);
        };

        for attempt in 1..=REMOVE_ATTEMPTS {
            if !is_present(&target) {
                break;
            }
            tracing::info!(group, path = %target.display(), attempt, "Deleting library");
            if let Err(e) = std::fs::remove_file(&target) {
                tracing::debug!(group, path = %target.display(), "Delete attempt failed: {}", e);
            }
            if is_present(&target) && attempt < REMOVE_ATTEMPTS {
                thread::sleep(self.retry_delay);
            }
        }

        self.registry.invalidate(group);
        if is_present(&target) {
            tracing::warn!(
                group,
                path = %target.display(),
                attempts = REMOVE_ATTEMPTS,
                "Library still present after removal attempts"
            );
            Ok(RemovalOutcome::Incomplete)
        } else {
            Ok(RemovalOutcome::Removed)
        }
    }

    /// MD5 of the group's manifest as recorded in the coordination store;
    /// empty when there is no record or no store.
    pub fn manifest_digest(&self, group: &str) -> anyhow::Result<String> {
        let Some(store) = self.store.as_deref() else {
            tracing::debug!(group, "No coordination store configured");
            return Ok(String::new());
        };
        manifest_info::manifest_digest(store, group, &self.registry.config().build_tool.manifest_file)
    }

    /// The exact file a removal may touch, or `None` when `path` is not eligible.
    fn removable_path(&self, layout: &GroupLayout, path: &Path) -> Option<PathBuf> {
        layout.user_managed_path(path).filter(|target| {
            !layout.is_tool_managed(target)
                && has_extension(target, self.registry.toolchain().archive_extension())
        })
    }

    fn refresh(&self, group: &str) -> Result<()> {
        match self.registry.get(group) {
            Some(env) => env.refresh(),
            None => self.registry.get_or_create(group).map(|_| ()),
        }
    }
}

/// Presence of the directory entry itself; a dangling symlink still counts.
fn is_present(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EnvError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| EnvError::io(path, e))
}
