use crate::error::RegistryError;
use kiln_gpu::{ShaderProgram, Texture};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name-keyed store of shared studio resources.
#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    entries: BTreeMap<String, T>,
}

/// Programs shared between modules, e.g. `"lit"`.
pub type ProgramRegistry = Registry<Arc<ShaderProgram>>;
/// Loaded textures by name.
pub type AssetRegistry = Registry<Texture>;

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::of_kind("program")
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::of_kind("asset")
    }
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Registry<T> {
    fn of_kind(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Insert under `name`, returning the entry it replaced.
    pub fn load(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        let name = name.into();
        let previous = self.entries.insert(name.clone(), value);
        if previous.is_some() {
            tracing::debug!(kind = self.kind, name, "registry entry replaced");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Result<T, RegistryError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::Missing {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_gpu::{TextureId, TextureKind};

    fn texture(id: u32) -> Texture {
        Texture {
            id: TextureId(id),
            kind: TextureKind::Plane,
            width: 1,
            height: 1,
            mip_levels: 1,
        }
    }

    #[test]
    fn missing_name() {
        let reg = AssetRegistry::new();
        assert_eq!(
            reg.get("missing"),
            Err(RegistryError::Missing {
                kind: "asset",
                name: "missing".into()
            })
        );
    }

    #[test]
    fn last_load_wins() {
        let mut reg = AssetRegistry::new();
        assert!(reg.load("x", texture(1)).is_none());
        assert_eq!(reg.load("x", texture(2)), Some(texture(1)));
        assert_eq!(reg.get("x").unwrap(), texture(2));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn names_sorted_and_clear() {
        let mut reg = AssetRegistry::new();
        reg.load("b", texture(1));
        reg.load("a", texture(2));
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(reg.contains("a"));
        reg.clear();
        assert!(reg.is_empty());
    }

    #[test]
    fn program_registry_kind() {
        let reg = ProgramRegistry::new();
        let err = reg.get("lit").unwrap_err();
        assert_eq!(err.to_string(), "no program registered as `lit`");
    }
}
