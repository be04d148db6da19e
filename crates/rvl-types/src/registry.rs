//! Identifier-keyed registries for pluggable strategies.
//!
//! Every stored revision and staged change records the identifier of the
//! strategy that produced it, so a registry must keep resolving an identifier
//! for as long as records referencing it exist. Legacy identifiers can be kept
//! alive with [`StrategyRegistry::register_alias`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::RegistryError;

/// Common surface of every pluggable strategy.
pub trait Strategy: Send + Sync {
    /// Stable name persisted alongside everything the strategy produces.
    fn identifier(&self) -> &str;
}

/// Thread-safe registry mapping identifiers to strategy instances.
pub struct StrategyRegistry<S: ?Sized> {
    kind: &'static str,
    entries: RwLock<BTreeMap<String, Arc<S>>>,
}

impl<S: ?Sized + Strategy> StrategyRegistry<S> {
    /// Create an empty registry. `kind` names the strategy family in errors
    /// (e.g. `"diff"`, `"approval"`).
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// The strategy family served by this registry.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register a strategy under its own identifier.
    pub fn register(&self, strategy: Arc<S>) -> Result<(), RegistryError> {
        let identifier = strategy.identifier().to_string();
        self.insert(identifier, strategy)
    }

    /// Register a strategy under an additional identifier, typically one that
    /// older records were written with before a rename.
    pub fn register_alias(
        &self,
        alias: impl Into<String>,
        strategy: Arc<S>,
    ) -> Result<(), RegistryError> {
        self.insert(alias.into(), strategy)
    }

    /// Resolve an identifier to its strategy.
    pub fn resolve(&self, identifier: &str) -> Result<Arc<S>, RegistryError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RegistryError::Poisoned { kind: self.kind })?;
        entries
            .get(identifier)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownStrategy {
                kind: self.kind,
                identifier: identifier.to_string(),
            })
    }

    /// Returns `true` if the identifier resolves.
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(identifier))
            .unwrap_or(false)
    }

    /// All registered identifiers (aliases included), sorted.
    pub fn list(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn insert(&self, identifier: String, strategy: Arc<S>) -> Result<(), RegistryError> {
        if identifier.trim().is_empty() {
            return Err(RegistryError::BlankIdentifier { kind: self.kind });
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| RegistryError::Poisoned { kind: self.kind })?;
        if entries.contains_key(&identifier) {
            return Err(RegistryError::DuplicateStrategy {
                kind: self.kind,
                identifier,
            });
        }

        tracing::debug!(kind = self.kind, %identifier, "strategy registered");
        entries.insert(identifier, strategy);
        Ok(())
    }
}

impl<S: ?Sized> fmt::Debug for StrategyRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identifiers: Vec<String> = self
            .entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("StrategyRegistry")
            .field("kind", &self.kind)
            .field("identifiers", &identifiers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Strategy {
        fn greet(&self) -> String;
    }

    struct Hello;

    impl Strategy for Hello {
        fn identifier(&self) -> &str {
            "hello"
        }
    }

    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    struct Blank;

    impl Strategy for Blank {
        fn identifier(&self) -> &str {
            " "
        }
    }

    impl Greeter for Blank {
        fn greet(&self) -> String {
            String::new()
        }
    }

    #[test]
    fn register_and_resolve() {
        let registry: StrategyRegistry<dyn Greeter> = StrategyRegistry::new("greeter");
        registry.register(Arc::new(Hello)).unwrap();

        let resolved = registry.resolve("hello").unwrap();
        assert_eq!(resolved.greet(), "hello");
        assert!(registry.contains("hello"));
        assert_eq!(registry.list(), vec!["hello".to_string()]);
    }

    #[test]
    fn unknown_identifier_is_an_error() {
        let registry: StrategyRegistry<dyn Greeter> = StrategyRegistry::new("greeter");
        let error = registry.resolve("missing").err().unwrap();
        assert_eq!(
            error,
            RegistryError::UnknownStrategy {
                kind: "greeter",
                identifier: "missing".into()
            }
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry: StrategyRegistry<dyn Greeter> = StrategyRegistry::new("greeter");
        registry.register(Arc::new(Hello)).unwrap();
        let error = registry.register(Arc::new(Hello)).unwrap_err();
        assert!(matches!(error, RegistryError::DuplicateStrategy { .. }));
    }

    #[test]
    fn aliases_resolve_to_the_same_strategy() {
        let registry: StrategyRegistry<dyn Greeter> = StrategyRegistry::new("greeter");
        let hello: Arc<dyn Greeter> = Arc::new(Hello);
        registry.register(hello.clone()).unwrap();
        registry.register_alias("legacy-hello", hello).unwrap();

        let resolved = registry.resolve("legacy-hello").unwrap();
        assert_eq!(resolved.identifier(), "hello");
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn blank_identifier_is_rejected() {
        let registry: StrategyRegistry<dyn Greeter> = StrategyRegistry::new("greeter");
        let error = registry.register(Arc::new(Blank)).unwrap_err();
        assert_eq!(error, RegistryError::BlankIdentifier { kind: "greeter" });
    }
}
