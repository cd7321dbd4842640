use crate::config::PluginConfig;
use crate::error::EngineError;
use dashmap::DashMap;
use std::sync::Arc;

/// Builds one rule or check instance from its config entry
pub type Factory<T> = Arc<dyn Fn(&PluginConfig) -> anyhow::Result<Arc<T>> + Send + Sync>;

/// Name -> factory map (thread-safe)
///
/// The governance engine and the security scanner each own one of these,
/// pre-filled with the built-ins. Anything registered later is loadable from
/// config exactly like a built-in.
pub struct FactoryRegistry<T: ?Sized> {
    factories: DashMap<String, Factory<T>>,
}

impl<T: ?Sized> FactoryRegistry<T> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Register a factory under `name`
    pub fn register<F>(&self, name: impl Into<String>, factory: F) -> Result<(), EngineError>
    where
        F: Fn(&PluginConfig) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(EngineError::AlreadyRegistered(name));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Register or replace the factory under `name`
    pub fn insert<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&PluginConfig) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Build an instance; `None` when nothing is registered under `name`
    pub fn create(&self, name: &str, config: &PluginConfig) -> Option<anyhow::Result<Arc<T>>> {
        // Clone the factory out so the shard lock is not held while it runs
        let factory = self.factories.get(name).map(|entry| entry.value().clone())?;
        Some(factory(config))
    }

    /// Check if a factory is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.factories.len()
    }
}

impl<T: ?Sized> Default for FactoryRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Fixed(String);

    impl Greeter for Fixed {
        fn greet(&self) -> String {
            self.0.clone()
        }
    }

    #[test]
    fn test_register_and_create() {
        let registry: FactoryRegistry<dyn Greeter> = FactoryRegistry::new();
        registry
            .register("hello", |config: &PluginConfig| {
                let word = config.option::<String>("word")?.unwrap_or_else(|| "hi".into());
                Ok(Arc::new(Fixed(word)) as Arc<dyn Greeter>)
            })
            .unwrap();

        assert!(registry.contains("hello"));
        assert_eq!(registry.count(), 1);

        let config = PluginConfig::enabled().with_option("word", serde_json::json!("hey"));
        let greeter = registry.create("hello", &config).unwrap().unwrap();
        assert_eq!(greeter.greet(), "hey");

        assert!(registry.create("missing", &config).is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry: FactoryRegistry<dyn Greeter> = FactoryRegistry::new();
        let make = |_: &PluginConfig| -> anyhow::Result<Arc<dyn Greeter>> {
            Ok(Arc::new(Fixed("x".into())))
        };
        registry.register("a", make).unwrap();
        assert!(matches!(
            registry.register("a", make),
            Err(EngineError::AlreadyRegistered(_))
        ));
    }
}
