use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// Store selection loaded from `~/.config/credbridge/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Which credential store backs the three operations.
    pub backend: Backend,
    /// Secret Service settings; ignored on other platforms.
    pub secret_service: SecretServiceConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The host operating system's credential store.
    #[default]
    Native,
    /// Process-local map, nothing leaves memory.
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecretServiceConfig {
    /// Alias of the collection new items are written to.
    pub collection: String,
}

impl Default for SecretServiceConfig {
    fn default() -> Self {
        Self {
            collection: "default".to_string(),
        }
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<StoreConfig> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<StoreConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(StoreConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(StoreConfig::default());
    }
    let cfg: StoreConfig =
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| anyhow!("no config dir available"))?;
    Ok(base.join("credbridge").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(cfg.backend, Backend::Native);
        assert_eq!(cfg.secret_service.collection, "default");
    }

    #[test]
    fn blank_file_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "  \n").expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(cfg, StoreConfig::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            backend = "memory"
            [secret_service]
            collection = "session"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            StoreConfig {
                backend: Backend::Memory,
                secret_service: SecretServiceConfig {
                    collection: "session".into(),
                },
            }
        );
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[secret_service]\ncollection = \"login\"\n").expect("write");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(cfg.backend, Backend::Native);
        assert_eq!(cfg.secret_service.collection, "login");
    }

    #[test]
    fn rejects_unknown_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "backend = \"vault\"\n").expect("write");

        let err = load_from_path(&path).expect_err("unknown backend should fail");
        assert!(err.to_string().contains("parsing"));
    }

    #[test]
    fn default_path_ends_with_app_dir() {
        if let Ok(path) = default_path() {
            assert!(path.ends_with("credbridge/config.toml"));
        }
    }
}
