//! Component wiring from a declarative descriptor.
//!
//! The descriptor is a JSON object: component name → `{"type": ..., "lazy": bool, ...}`.
//! Entries with `"lazy": false` are built during [`wire`]; every other entry
//! is built the first time [`ComponentRegistry::get`] asks for it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::component::{ComponentRef, ComponentRequest};
use crate::context::LoadingContext;
use crate::error::WiringError;
use crate::scope;

/// One declared component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSpec {
    pub type_name: String,
    /// `Some(false)` means eager; absent or `true` means on demand.
    pub lazy: Option<bool>,
    /// Construction parameters; never contains `type` or `lazy`.
    pub params: Map<String, Value>,
}

impl ComponentSpec {
    pub fn is_eager(&self) -> bool {
        self.lazy == Some(false)
    }
}

/// Parsed wiring descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WiringDescriptor {
    pub components: BTreeMap<String, ComponentSpec>,
}

impl WiringDescriptor {
    /// Load from `path`. A missing file is an empty descriptor.
    pub fn load(path: &Path) -> Result<Self, WiringError> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Wiring descriptor not found; using an empty component set"
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| WiringError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, origin: &Path) -> Result<Self, WiringError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(content).map_err(|source| WiringError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        let Value::Object(entries) = value else {
            return Err(WiringError::NotAnObject {
                path: origin.to_path_buf(),
            });
        };

        let mut components = BTreeMap::new();
        for (name, entry) in entries {
            let Value::Object(mut fields) = entry else {
                tracing::warn!(component = %name, "Ignoring non-object wiring entry");
                continue;
            };
            let type_name = match fields.remove("type") {
                Some(Value::String(t)) if !t.trim().is_empty() => t,
                _ => {
                    tracing::warn!(component = %name, "Ignoring wiring entry without a type");
                    continue;
                }
            };
            let lazy = match fields.remove("lazy") {
                Some(Value::Bool(b)) => Some(b),
                Some(other) => {
                    tracing::warn!(component = %name, "Non-boolean lazy flag {} treated as lazy", other);
                    None
                }
                None => None,
            };
            components.insert(
                name,
                ComponentSpec {
                    type_name,
                    lazy,
                    params: fields,
                },
            );
        }
        Ok(Self { components })
    }

    pub fn eager_names(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(_, spec)| spec.is_eager())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

type Slot = Arc<Mutex<Option<ComponentRef>>>;

/// Named components of one group, bound to one loading context.
pub struct ComponentRegistry {
    context: Arc<LoadingContext>,
    specs: BTreeMap<String, ComponentSpec>,
    /// One slot per requested name; a slot's lock is held while it is built.
    instances: Mutex<HashMap<String, Slot>>,
    disposed: AtomicBool,
}

impl ComponentRegistry {
    pub fn new(context: Arc<LoadingContext>, descriptor: WiringDescriptor) -> Self {
        Self {
            context,
            specs: descriptor.components,
            instances: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Registry with no declared components.
    pub fn empty(context: Arc<LoadingContext>) -> Self {
        Self::new(context, WiringDescriptor::default())
    }

    pub fn context(&self) -> &Arc<LoadingContext> {
        &self.context
    }

    /// Declared component names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }

    pub fn spec(&self, name: &str) -> Option<&ComponentSpec> {
        self.specs.get(name)
    }

    pub fn is_instantiated(&self, name: &str) -> bool {
        let slot = self.lock_instances().get(name).cloned();
        match slot {
            Some(slot) => {
                let built = lock_slot(&slot).is_some();
                built
            }
            None => false,
        }
    }

    pub fn instantiated_count(&self) -> usize {
        let slots: Vec<Slot> = self.lock_instances().values().cloned().collect();
        slots.iter().filter(|slot| lock_slot(slot).is_some()).count()
    }

    /// Fetch `name`, building it now if it has not been built yet.
    ///
    /// Construction runs with the registry's loading context installed as the
    /// thread's current context. Concurrent first requests for one name build
    /// once; different names build independently, so a factory may look up
    /// other components of the same registry.
    pub fn get(&self, name: &str) -> Result<ComponentRef, WiringError> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| WiringError::UnknownComponent {
                component: name.to_string(),
            })?;
        let slot = {
            let mut instances = self.lock_instances();
            // Checked under the lock: dispose() flips the flag before draining
            if self.is_disposed() {
                return Err(WiringError::Disposed);
            }
            Arc::clone(instances.entry(name.to_string()).or_default())
        };

        let mut built = lock_slot(&slot);
        if let Some(ref existing) = *built {
            return Ok(Arc::clone(existing));
        }
        if self.is_disposed() {
            return Err(WiringError::Disposed);
        }
        let component = self.instantiate(name, spec)?;
        *built = Some(Arc::clone(&component));
        Ok(component)
    }

    fn instantiate(&self, name: &str, spec: &ComponentSpec) -> Result<ComponentRef, WiringError> {
        tracing::info!(group = %self.context.group(), component = name, type_name = %spec.type_name, "Building component");
        scope::with_context(&self.context, || {
            let factory = self
                .context
                .resolve(&spec.type_name)
                .map_err(|source| WiringError::Resolve {
                    component: name.to_string(),
                    type_name: spec.type_name.clone(),
                    source,
                })?;
            let request = ComponentRequest {
                name,
                type_name: &spec.type_name,
                params: &spec.params,
            };
            factory
                .create(&request)
                .map_err(|e| WiringError::Instantiate {
                    component: name.to_string(),
                    type_name: spec.type_name.clone(),
                    source: e.into(),
                })
        })
    }

    /// Dispose every built component, logging individual failures. Idempotent.
    ///
    /// A build still in progress is waited for and then disposed.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<(String, Slot)> = self.lock_instances().drain().collect();
        for (name, slot) in drained {
            let Some(component) = lock_slot(&slot).take() else {
                continue;
            };
            if let Err(e) = component.dispose() {
                tracing::warn!(
                    group = %self.context.group(),
                    component = %name,
                    "Component dispose failed: {:#}",
                    e
                );
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn lock_instances(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.instances.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn lock_slot(slot: &Slot) -> std::sync::MutexGuard<'_, Option<ComponentRef>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("context", &self.context.id())
            .field("components", &self.specs.keys().collect::<Vec<_>>())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Load the descriptor at `descriptor_path` and build every eager component
/// against `context`.
///
/// Fails on the first eager component that cannot be resolved or built;
/// components built before the failure are disposed.
pub fn wire(
    descriptor_path: &Path,
    context: &Arc<LoadingContext>,
) -> Result<ComponentRegistry, WiringError> {
    tracing::info!(group = %context.group(), "Wiring components");
    let descriptor = WiringDescriptor::load(descriptor_path)?;
    let eager: Vec<String> = descriptor.eager_names().into_iter().map(String::from).collect();
    let registry = ComponentRegistry::new(Arc::clone(context), descriptor);
    for name in &eager {
        if let Err(e) = registry.get(name) {
            registry.dispose();
            return Err(e);
        }
    }
    tracing::info!(
        group = %context.group(),
        declared = registry.names().len(),
        eager = eager.len(),
        "Components wired"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{downcast, Component, FactoryTable};
    use crate::context::{ContextBuilder, PlatformBase};
    use crate::loader::NativeLoader;
    use std::any::Any;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{OnceLock, Weak};

    struct Counter {
        label: String,
        disposed: Arc<AtomicUsize>,
    }

    impl Component for Counter {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn dispose(&self) -> anyhow::Result<()> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        context: Arc<LoadingContext>,
        built: Arc<AtomicUsize>,
        disposed: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let built = Arc::new(AtomicUsize::new(0));
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut table = FactoryTable::new();
        {
            let built = Arc::clone(&built);
            let disposed = Arc::clone(&disposed);
            table.register("T", move |req| {
                built.fetch_add(1, Ordering::SeqCst);
                // Factories see the group's context as the ambient one
                let ambient = scope::current().map(|c| c.group().to_string());
                assert_eq!(ambient.as_deref(), Some("wired"));
                let label = req
                    .params
                    .get("label")
                    .and_then(Value::as_str)
                    .unwrap_or(req.name)
                    .to_string();
                Ok(Arc::new(Counter {
                    label,
                    disposed: Arc::clone(&disposed),
                }) as ComponentRef)
            });
        }
        table.register("Broken", |_| {
            anyhow::bail!("no database configured")
        });
        let context =
            ContextBuilder::new(PlatformBase::new(table), Arc::new(NativeLoader)).build("wired", &[]);
        Fixture {
            context,
            built,
            disposed,
        }
    }

    fn write_descriptor(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("components.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_eager_and_lazy_entries() {
        let fx = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let path = write_descriptor(
            tmp.path(),
            r#"{"a":{"type":"T","lazy":false},"b":{"type":"T","lazy":true}}"#,
        );
        let registry = wire(&path, &fx.context).unwrap();
        assert!(registry.is_instantiated("a"));
        assert!(!registry.is_instantiated("b"));
        assert_eq!(fx.built.load(Ordering::SeqCst), 1);

        let b = registry.get("b").unwrap();
        assert_eq!(downcast::<Counter>(&b).unwrap().label, "b");
        assert!(registry.is_instantiated("b"));
        registry.get("b").unwrap();
        assert_eq!(fx.built.load(Ordering::SeqCst), 2);
        assert!(scope::current().is_none());
    }

    #[test]
    fn test_missing_descriptor_is_empty() {
        let fx = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let registry = wire(&tmp.path().join("absent.json"), &fx.context).unwrap();
        assert!(registry.names().is_empty());
        assert_eq!(registry.instantiated_count(), 0);
    }

    #[test]
    fn test_lazy_flag_is_not_forwarded() {
        let descriptor = WiringDescriptor::parse(
            r#"{"a":{"type":"T","lazy":false,"label":"x","pool":4},"nameless":{"lazy":false},"odd":{"type":"T","lazy":"false"}}"#,
            Path::new("inline"),
        )
        .unwrap();
        let a = &descriptor.components["a"];
        assert!(a.is_eager());
        assert!(!a.params.contains_key("lazy"));
        assert!(!a.params.contains_key("type"));
        assert_eq!(a.params["label"], Value::from("x"));
        assert!(!descriptor.components.contains_key("nameless"));
        assert!(!descriptor.components["odd"].is_eager());
        assert_eq!(descriptor.eager_names(), vec!["a"]);
    }

    #[test]
    fn test_unresolvable_eager_type_is_fatal() {
        let fx = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let path = write_descriptor(
            tmp.path(),
            r#"{"a":{"type":"T","lazy":false},"z":{"type":"com.acme.Missing","lazy":false}}"#,
        );
        let err = wire(&path, &fx.context).unwrap_err();
        match err {
            WiringError::Resolve {
                component,
                type_name,
                ..
            } => {
                assert_eq!(component, "z");
                assert_eq!(type_name, "com.acme.Missing");
            }
            other => panic!("unexpected error: {other}"),
        }
        // "a" was built first and torn down again
        assert_eq!(fx.disposed.load(Ordering::SeqCst), 1);
        assert!(scope::current().is_none());
    }

    #[test]
    fn test_unresolvable_lazy_type_only_fails_on_demand() {
        let fx = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let path = write_descriptor(tmp.path(), r#"{"m":{"type":"com.acme.Missing"}}"#);
        let registry = wire(&path, &fx.context).unwrap();
        assert!(matches!(registry.get("m"), Err(WiringError::Resolve { .. })));
        assert!(matches!(
            registry.get("nope"),
            Err(WiringError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn test_factory_failure_names_component() {
        let fx = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let path = write_descriptor(tmp.path(), r#"{"db":{"type":"Broken","lazy":false}}"#);
        let err = wire(&path, &fx.context).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'db'"), "{msg}");
        assert!(msg.contains("no database configured"), "{msg}");
    }

    #[test]
    fn test_malformed_descriptor() {
        let fx = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let path = write_descriptor(tmp.path(), "{ not json");
        assert!(matches!(wire(&path, &fx.context), Err(WiringError::Parse { .. })));
        let path = write_descriptor(tmp.path(), "[1, 2]");
        assert!(matches!(wire(&path, &fx.context), Err(WiringError::NotAnObject { .. })));
    }

    #[test]
    fn test_dispose_once_and_reject_further_lookups() {
        let fx = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let path = write_descriptor(
            tmp.path(),
            r#"{"a":{"type":"T","lazy":false},"b":{"type":"T","lazy":false}}"#,
        );
        let registry = wire(&path, &fx.context).unwrap();
        registry.dispose();
        registry.dispose();
        assert_eq!(fx.disposed.load(Ordering::SeqCst), 2);
        assert!(matches!(registry.get("a"), Err(WiringError::Disposed)));
    }

    #[test]
    fn test_factory_can_fetch_sibling_component() {
        let registry_slot: Arc<OnceLock<Weak<ComponentRegistry>>> = Arc::new(OnceLock::new());
        let mut table = FactoryTable::new();
        table.register("T", |req| {
            Ok(Arc::new(Counter {
                label: req.name.to_string(),
                disposed: Arc::new(AtomicUsize::new(0)),
            }) as ComponentRef)
        });
        {
            let registry_slot = Arc::clone(&registry_slot);
            table.register("Outer", move |_req| {
                let registry = registry_slot
                    .get()
                    .and_then(Weak::upgrade)
                    .ok_or_else(|| anyhow::anyhow!("registry gone"))?;
                let inner = registry.get("inner")?;
                let label = downcast::<Counter>(&inner).unwrap().label.clone();
                Ok(Arc::new(Counter {
                    label: format!("outer({label})"),
                    disposed: Arc::new(AtomicUsize::new(0)),
                }) as ComponentRef)
            });
        }
        let context =
            ContextBuilder::new(PlatformBase::new(table), Arc::new(NativeLoader)).build("wired", &[]);
        let descriptor = WiringDescriptor::parse(
            r#"{"outer":{"type":"Outer"},"inner":{"type":"T"}}"#,
            Path::new("inline"),
        )
        .unwrap();
        let registry = Arc::new(ComponentRegistry::new(context, descriptor));
        registry_slot.set(Arc::downgrade(&registry)).unwrap();

        let outer = registry.get("outer").unwrap();
        assert_eq!(downcast::<Counter>(&outer).unwrap().label, "outer(inner)");
        assert!(registry.is_instantiated("inner"));
        assert_eq!(registry.instantiated_count(), 2);
    }

    #[test]
    fn test_failed_build_is_retried() {
        let fx = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let path = write_descriptor(tmp.path(), r#"{"db":{"type":"Broken"}}"#);
        let registry = wire(&path, &fx.context).unwrap();
        assert!(registry.get("db").is_err());
        assert!(!registry.is_instantiated("db"));
        assert_eq!(registry.instantiated_count(), 0);
        assert!(registry.get("db").is_err());
    }

    #[test]
    fn test_closed_context_fails_wiring() {
        let fx = fixture();
        fx.context.close();
        let tmp = tempfile::tempdir().unwrap();
        let path = write_descriptor(tmp.path(), r#"{"a":{"type":"T","lazy":false}}"#);
        assert!(matches!(
            wire(&path, &fx.context),
            Err(WiringError::Resolve {
                source: crate::error::ResolveError::Closed { .. },
                ..
            })
        ));
    }
}
