//! Components and the factories that build them.
//!
//! A "type" in a wiring descriptor is a key into a [`FactoryTable`]. Tables
//! are filled by the platform base scope and by the plugin libraries of one
//! loading context; nothing is resolved by reflection.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// A wired object owned by a group's component registry.
pub trait Component: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    /// Release resources held by the component. Called once, when the owning
    /// registry is disposed.
    fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub type ComponentRef = Arc<dyn Component>;

/// Downcast a component to its concrete type.
pub fn downcast<T: 'static>(component: &ComponentRef) -> Option<&T> {
    component.as_any().downcast_ref::<T>()
}

/// What a factory is asked to build.
#[derive(Debug, Clone, Copy)]
pub struct ComponentRequest<'a> {
    /// Component name from the descriptor.
    pub name: &'a str,
    /// Type identifier the factory was registered under.
    pub type_name: &'a str,
    /// Remaining descriptor fields (`type` and `lazy` are never included).
    pub params: &'a Map<String, Value>,
}

/// Builds components of one type.
pub trait ComponentFactory: Send + Sync {
    fn create(&self, request: &ComponentRequest<'_>) -> anyhow::Result<ComponentRef>;
}

impl<F> ComponentFactory for F
where
    F: Fn(&ComponentRequest<'_>) -> anyhow::Result<ComponentRef> + Send + Sync,
{
    fn create(&self, request: &ComponentRequest<'_>) -> anyhow::Result<ComponentRef> {
        self(request)
    }
}

/// Type identifier → factory.
#[derive(Clone, Default)]
pub struct FactoryTable {
    factories: HashMap<String, Arc<dyn ComponentFactory>>,
}

impl FactoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `type_name`. The first registration wins;
    /// returns `false` when the name was already taken.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> bool
    where
        F: Fn(&ComponentRequest<'_>) -> anyhow::Result<ComponentRef> + Send + Sync + 'static,
    {
        self.register_shared(type_name, Arc::new(factory))
    }

    pub fn register_shared(
        &mut self,
        type_name: impl Into<String>,
        factory: Arc<dyn ComponentFactory>,
    ) -> bool {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            return false;
        }
        self.factories.insert(type_name, factory);
        true
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn ComponentFactory>> {
        self.factories.get(type_name).cloned()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered type identifiers, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (String, Arc<dyn ComponentFactory>)> + '_ {
        self.factories.drain()
    }

    pub(crate) fn clear(&mut self) {
        self.factories.clear();
    }
}

impl fmt::Debug for FactoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryTable")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter(String);

    impl Component for Greeter {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_first_registration_wins() {
        let mut table = FactoryTable::new();
        assert!(table.register("demo.Greeter", |req| {
            Ok(Arc::new(Greeter(format!("first:{}", req.name))) as ComponentRef)
        }));
        assert!(!table.register("demo.Greeter", |_| {
            Ok(Arc::new(Greeter("second".into())) as ComponentRef)
        }));

        let params = Map::new();
        let request = ComponentRequest {
            name: "hello",
            type_name: "demo.Greeter",
            params: &params,
        };
        let built = table.get("demo.Greeter").unwrap().create(&request).unwrap();
        assert_eq!(downcast::<Greeter>(&built).unwrap().0, "first:hello");
        assert_eq!(table.type_names(), vec!["demo.Greeter".to_string()]);
    }
}
