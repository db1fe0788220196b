//! Lookup table from resource types to their platform implementations.
//!
//! This is where the architecture hands off to generators: a generator walks
//! the sorted architecture and asks the registry for the implementation of
//! each resource's type tag on its target platform and engine. The deduction
//! pipeline itself never builds one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Target a resource is provisioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Aws,
    K8s,
    AliCloud,
    Simulator,
}

/// Provisioning engine that drives a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Engine {
    Pulumi,
    Terraform,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("no implementation of '{type_tag}' for platform {platform} with engine {engine}")]
    NotFound {
        type_tag: String,
        platform: Platform,
        engine: Engine,
    },
}

type Key = (String, Platform, Engine);
type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Collects registrations; [`ImplRegistryBuilder::build`] freezes them.
pub struct ImplRegistryBuilder<T> {
    factories: HashMap<Key, Factory<T>>,
}

impl<T> Default for ImplRegistryBuilder<T> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<T> ImplRegistryBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. A later registration for the same key replaces the earlier one.
    pub fn register<F>(
        mut self,
        type_tag: impl Into<String>,
        platform: Platform,
        engine: Engine,
        factory: F,
    ) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factories
            .insert((type_tag.into(), platform, engine), Box::new(factory));
        self
    }

    pub fn build(self) -> ImplRegistry<T> {
        ImplRegistry {
            factories: self.factories,
        }
    }
}

/// Maps (type tag, platform, engine) to a lazily invoked factory.
pub struct ImplRegistry<T> {
    factories: HashMap<Key, Factory<T>>,
}

impl<T> ImplRegistry<T> {
    pub fn builder() -> ImplRegistryBuilder<T> {
        ImplRegistryBuilder::new()
    }

    pub fn contains(&self, type_tag: &str, platform: Platform, engine: Engine) -> bool {
        self.factories
            .contains_key(&(type_tag.to_string(), platform, engine))
    }

    /// Construct the implementation registered for the given coordinates.
    pub fn create(
        &self,
        type_tag: &str,
        platform: Platform,
        engine: Engine,
    ) -> Result<T, RegistryError> {
        self.factories
            .get(&(type_tag.to_string(), platform, engine))
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::NotFound {
                type_tag: type_tag.to_string(),
                platform,
                engine,
            })
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_lookup() {
        let registry = ImplRegistry::builder()
            .register("@plutolang/pluto.Queue", Platform::Aws, Engine::Pulumi, || {
                "SNSQueue".to_string()
            })
            .register("@plutolang/pluto.Queue", Platform::K8s, Engine::Pulumi, || {
                "RedisQueue".to_string()
            })
            .build();

        assert_eq!(
            registry
                .create("@plutolang/pluto.Queue", Platform::K8s, Engine::Pulumi)
                .unwrap(),
            "RedisQueue"
        );
        assert_eq!(
            registry.create("@plutolang/pluto.Queue", Platform::Aws, Engine::Terraform),
            Err(RegistryError::NotFound {
                type_tag: "@plutolang/pluto.Queue".to_string(),
                platform: Platform::Aws,
                engine: Engine::Terraform,
            })
        );
    }

    #[test]
    fn test_factories_are_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = ImplRegistry::builder()
            .register("T", Platform::Simulator, Engine::Pulumi, move || {
                counter.fetch_add(1, Ordering::SeqCst)
            })
            .build();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        registry.create("T", Platform::Simulator, Engine::Pulumi).unwrap();
        registry.create("T", Platform::Simulator, Engine::Pulumi).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
