//! Name-indexed lookup tables.
//!
//! A `RegistryBuilder` is filled once during startup and then frozen into a
//! `Registry`, which only offers reads. Workers share it through an `Arc`.

use std::collections::HashMap;

use crate::error::{ConfigError, ConfigResult};

/// Collects entries and rejects duplicate names.
#[derive(Debug)]
pub struct RegistryBuilder<T> {
    kind: &'static str,
    items: HashMap<String, T>,
}

impl<T> RegistryBuilder<T> {
    /// `kind` names the entries in errors ("condition", "notifier").
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, value: T) -> ConfigResult<()> {
        let name = name.into();
        if self.items.contains_key(&name) {
            return Err(ConfigError::Duplicate {
                kind: self.kind,
                id: name,
            });
        }
        self.items.insert(name, value);
        Ok(())
    }

    pub fn build(self) -> Registry<T> {
        Registry {
            kind: self.kind,
            items: self.items,
        }
    }
}

/// Read-only name → instance table.
#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    items: HashMap<String, T>,
}

impl<T> Registry<T> {
    pub fn builder(kind: &'static str) -> RegistryBuilder<T> {
        RegistryBuilder::new(kind)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.get(name)
    }

    /// Look up `name`, failing with a reference error that names the
    /// referring object.
    pub fn resolve(&self, name: &str, referenced_by: &str) -> ConfigResult<&T> {
        self.items
            .get(name)
            .ok_or_else(|| ConfigError::UnknownReference {
                kind: self.kind,
                id: name.to_string(),
                referenced_by: referenced_by.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.items.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_get() {
        let mut builder = Registry::builder("notifier");
        builder.register("sms", 1).unwrap();
        builder.register("mail", 2).unwrap();
        let registry = builder.build();

        assert_eq!(registry.get("sms"), Some(&1));
        assert_eq!(registry.get("mail"), Some(&2));
        assert_eq!(registry.get("pager"), None);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["mail", "sms"]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut builder = Registry::builder("condition");
        builder.register("api", "a").unwrap();
        let err = builder.register("api", "b").unwrap_err();
        assert_eq!(err.to_string(), "condition with id 'api' already exists");
    }

    #[test]
    fn resolve_names_the_referrer() {
        let registry: Registry<u8> = Registry::builder("notifier").build();
        assert!(registry.is_empty());
        let err = registry.resolve("ops", "service 'api'").unwrap_err();
        assert_eq!(
            err.to_string(),
            "notifier 'ops' referenced by service 'api' not found"
        );
    }

    #[test]
    fn shared_reads_across_tasks() {
        let mut builder = Registry::builder("condition");
        builder.register("a", 10u32).unwrap();
        let registry = std::sync::Arc::new(builder.build());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || *registry.get("a").unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 10);
        }
    }
}
