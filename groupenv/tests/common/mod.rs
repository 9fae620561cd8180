//! Shared fixtures: a loader that treats each archive as a text file listing
//! the type names it provides, one per line.

#![allow(dead_code)]

use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use groupenv::{EnvironmentRegistry, EnvironmentService, RegistryBuilder};
use groupenv_core::config::EnvConfig;
use groupenv_runtime::{
    scope, Component, ComponentRef, FactoryTable, LibraryLoader, LoadError, LoadedLibrary,
    PlatformBase,
};

pub const EXT: &str = "plug";

/// Built by every factory the text loader registers.
pub struct Marker {
    pub type_name: String,
    pub origin: PathBuf,
    /// Id of the ambient loading context at construction time.
    pub scoped_context: Option<u64>,
    pub disposed: Arc<AtomicUsize>,
}

impl Component for Marker {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dispose(&self) -> anyhow::Result<()> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct TextLoader {
    pub disposed: Arc<AtomicUsize>,
}

struct TextLibrary {
    path: PathBuf,
    types: Vec<String>,
    disposed: Arc<AtomicUsize>,
}

impl LibraryLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn LoadedLibrary>, LoadError> {
        let content = fs::read_to_string(path).map_err(|e| LoadError::Registration {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Arc::new(TextLibrary {
            path: path.to_path_buf(),
            types: content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            disposed: Arc::clone(&self.disposed),
        }))
    }
}

impl LoadedLibrary for TextLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn register(&self, table: &mut FactoryTable) -> Result<(), LoadError> {
        for ty in &self.types {
            let origin = self.path.clone();
            let disposed = Arc::clone(&self.disposed);
            table.register(ty.clone(), move |req| {
                Ok(Arc::new(Marker {
                    type_name: req.type_name.to_string(),
                    origin: origin.clone(),
                    scoped_context: scope::current().map(|ctx| ctx.id()),
                    disposed: Arc::clone(&disposed),
                }) as ComponentRef)
            });
        }
        Ok(())
    }
}

pub struct Fixture {
    pub tmp: tempfile::TempDir,
    pub disposed: Arc<AtomicUsize>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            tmp: tempfile::tempdir().unwrap(),
            disposed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> EnvConfig {
        let mut cfg = EnvConfig::with_home(self.tmp.path());
        cfg.build_tool.program_override = Some(
            self.tmp
                .path()
                .join("missing-build-tool")
                .to_string_lossy()
                .to_string(),
        );
        cfg.library.archive_extension = EXT.to_string();
        cfg.library.host_library_path = vec![self.tmp.path().join("host")];
        cfg
    }

    /// Config whose build tool is `sh`: the clean step runs `clean_script`
    /// and the fetch step fails fast on the missing manifest.
    #[cfg(unix)]
    pub fn shell_tool_config(&self, clean_script: &str) -> EnvConfig {
        let mut cfg = self.config();
        cfg.build_tool.program_override = Some("sh".to_string());
        cfg.build_tool.clean_args = vec!["-c".to_string(), clean_script.to_string()];
        cfg.build_tool.fetch_args = Vec::new();
        cfg
    }

    pub fn builder(&self) -> RegistryBuilder {
        self.builder_for(self.config())
    }

    pub fn builder_for(&self, cfg: EnvConfig) -> RegistryBuilder {
        EnvironmentRegistry::builder(cfg)
            .platform_base(PlatformBase::empty())
            .loader(Arc::new(TextLoader {
                disposed: Arc::clone(&self.disposed),
            }))
    }

    pub fn registry(&self) -> Arc<EnvironmentRegistry> {
        Arc::new(self.builder().build())
    }

    pub fn service(&self) -> EnvironmentService {
        EnvironmentService::new(self.registry()).with_retry_delay(std::time::Duration::from_millis(5))
    }

    pub fn lib_dir(&self, group: &str) -> PathBuf {
        self.tmp.path().join("group").join(group).join("lib")
    }

    /// Write an archive providing `types` into the group's library directory.
    pub fn add_archive(&self, group: &str, rel: &str, types: &[&str]) -> PathBuf {
        let path = self.lib_dir(group).join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, types.join("\n")).unwrap();
        path
    }

    pub fn write_descriptor(&self, group: &str, body: &str) {
        let path = self
            .tmp
            .path()
            .join("group")
            .join(group)
            .join("resource")
            .join("components.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    pub fn create_lib_dir(&self, group: &str) -> PathBuf {
        let dir = self.lib_dir(group);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn disposed_count(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Spin until `cond` holds, failing the test after a few seconds.
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}
