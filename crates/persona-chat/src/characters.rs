//! Persona catalogue loaded from `characters.json`

use crate::error::{MemoryError, MemoryResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub platform_type: String,
    pub platform_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub name: String,
    pub platform_type: String,
    pub platform_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct CharacterCatalog {
    characters: BTreeMap<String, CharacterInfo>,
}

impl CharacterCatalog {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read character list at {}", path.display()))?;
        let catalog = Self::from_json(&raw)
            .with_context(|| format!("Invalid character list at {}", path.display()))?;
        info!("Loaded {} characters from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(Self {
            characters: serde_json::from_str(raw)?,
        })
    }

    pub fn get(&self, name: &str) -> MemoryResult<Character> {
        self.characters
            .get(name)
            .map(|info| Character {
                name: name.to_string(),
                platform_type: info.platform_type.clone(),
                platform_name: info.platform_name.clone(),
            })
            .ok_or_else(|| MemoryError::UnknownCharacter(name.to_string()))
    }

    /// Names in alphabetical order
    pub fn names(&self) -> Vec<&str> {
        self.characters.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Goku": {"platform_type": "anime", "platform_name": "Dragon Ball Z"},
        "Mario": {"platform_type": "video game", "platform_name": "Super Mario Bros."}
    }"#;

    #[test]
    fn test_lookup() {
        let catalog = CharacterCatalog::from_json(SAMPLE).unwrap();
        let goku = catalog.get("Goku").unwrap();
        assert_eq!(goku.platform_type, "anime");
        assert_eq!(goku.platform_name, "Dragon Ball Z");
        assert_eq!(catalog.names(), vec!["Goku", "Mario"]);
    }

    #[test]
    fn test_unknown_character() {
        let catalog = CharacterCatalog::from_json(SAMPLE).unwrap();
        assert!(matches!(catalog.get("Vegeta"), Err(MemoryError::UnknownCharacter(name)) if name == "Vegeta"));
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = CharacterCatalog::load(Path::new("/nonexistent/characters.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read character list"));
    }

    #[test]
    fn test_bundled_catalog_parses() {
        let raw = include_str!("../../../characters.json");
        let catalog = CharacterCatalog::from_json(raw).unwrap();
        assert!(catalog.get("Sherlock Holmes").is_ok());
    }
}
