//! Built-in category seed configuration
//!
//! The set of built-in categories (names, MCC codes, which one is the
//! default) is data, not code. It is loaded with a two-layer resolution:
//! 1. Explicit path, or an override in the data dir
//!    (~/.local/share/tally/config/categories.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mcc::MccCodes;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/categories.toml");

/// One built-in category to seed
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinSeed {
    pub name: String,
    pub mcc_codes: MccCodes,
    pub is_default: bool,
}

/// Validated seed set: unique names, exactly one default
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub categories: Vec<BuiltinSeed>,
}

impl SeedConfig {
    /// Load from an explicit path, the data-dir override, or the embedded defaults
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let content = match override_path {
            Some(path) => read_config(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_config(&path)?,
                _ => DEFAULT_CONFIG.to_string(),
            },
        };

        Self::parse(&content)
    }

    /// The embedded defaults
    pub fn embedded() -> Result<Self> {
        Self::parse(DEFAULT_CONFIG)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Invalid seed config TOML: {}", e)))?;

        let categories: Vec<BuiltinSeed> = raw
            .categories
            .into_iter()
            .map(|c| BuiltinSeed {
                name: c.name.trim().to_string(),
                mcc_codes: c.mcc_codes.into(),
                is_default: c.default,
            })
            .collect();

        let config = Self { categories };
        config.validate()?;
        Ok(config)
    }

    /// The entry flagged as default
    pub fn default_seed(&self) -> Option<&BuiltinSeed> {
        self.categories.iter().find(|c| c.is_default)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for seed in &self.categories {
            if seed.name.is_empty() {
                return Err(Error::Configuration(
                    "Seed config contains a category with an empty name".to_string(),
                ));
            }
            if !names.insert(seed.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "Seed config lists '{}' more than once",
                    seed.name
                )));
            }
        }

        let defaults = self.categories.iter().filter(|c| c.is_default).count();
        if defaults != 1 {
            return Err(Error::Configuration(format!(
                "Seed config must mark exactly one default category (found {})",
                defaults
            )));
        }

        for (code, owners) in self.mcc_conflicts() {
            warn!(
                "MCC code {} is claimed by several built-in categories ({}); the first one wins",
                code,
                owners.join(", ")
            );
        }

        debug!("Seed config has {} built-in categories", self.categories.len());
        Ok(())
    }

    /// MCC codes listed under more than one category, with the claiming names
    pub fn mcc_conflicts(&self) -> Vec<(i32, Vec<String>)> {
        let mut claims: Vec<(i32, Vec<String>)> = Vec::new();
        for seed in &self.categories {
            for code in seed.mcc_codes.iter() {
                match claims.iter_mut().find(|(c, _)| c == code) {
                    Some((_, owners)) => owners.push(seed.name.clone()),
                    None => claims.push((*code, vec![seed.name.clone()])),
                }
            }
        }
        claims.retain(|(_, owners)| owners.len() > 1);
        claims
    }
}

/// Get the default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("categories.toml"))
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!(
            "Failed to read seed config {}: {}",
            path.display(),
            e
        ))
    })
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    categories: Vec<RawCategory>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    name: String,
    #[serde(default)]
    mcc_codes: Vec<i32>,
    #[serde(default)]
    default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_is_valid() {
        let config = SeedConfig::embedded().unwrap();
        assert!(!config.categories.is_empty());
        let default = config.default_seed().unwrap();
        assert_eq!(default.name, "Other");
        assert!(config.mcc_conflicts().is_empty());
    }

    #[test]
    fn test_parse_requires_single_default() {
        let none = r#"
            [[categories]]
            name = "Coffee"
            mcc_codes = [5814]
        "#;
        assert!(matches!(
            SeedConfig::parse(none),
            Err(Error::Configuration(_))
        ));

        let two = r#"
            [[categories]]
            name = "Coffee"
            default = true

            [[categories]]
            name = "Other"
            default = true
        "#;
        assert!(matches!(SeedConfig::parse(two), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_parse_rejects_duplicate_names() {
        let content = r#"
            [[categories]]
            name = "Coffee"

            [[categories]]
            name = " Coffee "
            default = true
        "#;
        assert!(matches!(
            SeedConfig::parse(content),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_mcc_conflicts_reported() {
        let content = r#"
            [[categories]]
            name = "Coffee"
            mcc_codes = [5814, 5814]

            [[categories]]
            name = "Bakery"
            mcc_codes = [5814]

            [[categories]]
            name = "Other"
            default = true
        "#;
        let config = SeedConfig::parse(content).unwrap();
        assert_eq!(config.categories[0].mcc_codes.as_slice(), &[5814]);
        let conflicts = config.mcc_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].0, 5814);
        assert_eq!(conflicts[0].1, vec!["Coffee", "Bakery"]);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.toml");
        fs::write(
            &path,
            "[[categories]]\nname = \"Misc\"\ndefault = true\n",
        )
        .unwrap();

        let config = SeedConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.default_seed().unwrap().name, "Misc");
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = SeedConfig::load(Some(Path::new("/nonexistent/tally/categories.toml")));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
