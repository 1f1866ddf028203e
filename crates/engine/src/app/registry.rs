use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::scene::{Scene, SceneKey};

type SceneFactory = Box<dyn Fn() -> Box<dyn Scene>>;

/// Raised when a scene name is not present in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scene '{name}' (known scenes: {})", .known.join(", "))]
pub struct UnknownScene {
    pub name: String,
    /// Registered scene names, sorted.
    pub known: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("scene name must not be empty")]
    EmptyName,
    #[error("scene '{name}' is registered more than once")]
    DuplicateScene { name: String },
    #[error("no entry scene was designated")]
    MissingEntry,
    #[error("entry scene is not registered: {0}")]
    UnknownEntry(#[source] UnknownScene),
}

/// Read-only mapping from scene name to scene constructor, with one
/// designated entry scene.
pub struct SceneRegistry {
    factories: BTreeMap<SceneKey, SceneFactory>,
    entry: SceneKey,
}

pub struct SceneRegistryBuilder {
    factories: BTreeMap<SceneKey, SceneFactory>,
    entry: Option<SceneKey>,
}

impl SceneRegistry {
    pub fn builder() -> SceneRegistryBuilder {
        SceneRegistryBuilder {
            factories: BTreeMap::new(),
            entry: None,
        }
    }

    pub fn entry_key(&self) -> &SceneKey {
        &self.entry
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&SceneKey::new(name))
    }

    /// Registered scene names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &SceneKey> + '_ {
        self.factories.keys()
    }

    pub fn resolve(&self, name: &str) -> Result<SceneKey, UnknownScene> {
        let key = SceneKey::new(name);
        if self.factories.contains_key(&key) {
            Ok(key)
        } else {
            Err(self.unknown(name))
        }
    }

    /// The scene to start with: the requested one when given, otherwise the
    /// entry scene.
    pub fn resolve_start(&self, requested: Option<&str>) -> Result<SceneKey, UnknownScene> {
        match requested {
            Some(name) => self.resolve(name),
            None => Ok(self.entry.clone()),
        }
    }

    pub fn instantiate(&self, key: &SceneKey) -> Result<Box<dyn Scene>, UnknownScene> {
        self.factories
            .get(key)
            .map(|factory| factory())
            .ok_or_else(|| self.unknown(key.as_str()))
    }

    fn unknown(&self, name: &str) -> UnknownScene {
        UnknownScene {
            name: name.to_string(),
            known: known_names(&self.factories),
        }
    }
}

impl fmt::Debug for SceneRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneRegistry")
            .field("scenes", &known_names(&self.factories))
            .field("entry", &self.entry)
            .finish()
    }
}

impl SceneRegistryBuilder {
    pub fn register<S, F>(mut self, name: &str, factory: F) -> Result<Self, RegistryError>
    where
        S: Scene + 'static,
        F: Fn() -> S + 'static,
    {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let key = SceneKey::new(name);
        if self.factories.contains_key(&key) {
            return Err(RegistryError::DuplicateScene {
                name: name.to_string(),
            });
        }
        let factory: SceneFactory = Box::new(move || -> Box<dyn Scene> { Box::new(factory()) });
        self.factories.insert(key, factory);
        Ok(self)
    }

    pub fn entry(mut self, name: &str) -> Self {
        self.entry = Some(SceneKey::new(name));
        self
    }

    pub fn build(self) -> Result<SceneRegistry, RegistryError> {
        let entry = self.entry.ok_or(RegistryError::MissingEntry)?;
        if !self.factories.contains_key(&entry) {
            return Err(RegistryError::UnknownEntry(UnknownScene {
                name: entry.as_str().to_string(),
                known: known_names(&self.factories),
            }));
        }
        Ok(SceneRegistry {
            factories: self.factories,
            entry,
        })
    }
}

fn known_names(factories: &BTreeMap<SceneKey, SceneFactory>) -> Vec<String> {
    factories.keys().map(|key| key.as_str().to_string()).collect()
}
