use crate::metastore::{Metastore, ObjectStoreBackend};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_CACHE_CAPACITY: u64 = 100_000;

/// Store configuration, read from a TOML file.
///
/// ```toml
/// log_level = "debug"
/// cache_capacity = 50000
/// default_range_limit = 100
///
/// [metastore]
/// backend = "object_store"
/// path = "/var/lib/profstore/metastore"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub metastore: MetastoreConfig,

    /// Entries per entity kind kept decoded in front of the Metastore backend.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Series limit of range queries that do not set one; 0 means no limit.
    #[serde(default)]
    pub default_range_limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum MetastoreConfig {
    #[default]
    Memory,
    ObjectStore {
        path: PathBuf,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metastore: MetastoreConfig::default(),
            cache_capacity: default_cache_capacity(),
            default_range_limit: 0,
        }
    }
}

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.level_filter()?;
        if self.cache_capacity == 0 {
            bail!("cache_capacity must be positive");
        }
        if let MetastoreConfig::ObjectStore { path } = &self.metastore {
            if path.as_os_str().is_empty() {
                bail!("metastore path must not be empty");
            }
        }
        Ok(())
    }

    pub fn level_filter(&self) -> anyhow::Result<log::LevelFilter> {
        self.log_level
            .parse()
            .with_context(|| format!("Unknown log level {:?}", self.log_level))
    }

    pub fn open_metastore(&self) -> anyhow::Result<Metastore> {
        match &self.metastore {
            MetastoreConfig::Memory => Ok(Metastore::new(
                Arc::new(crate::metastore::MemoryBackend::new()),
                self.cache_capacity,
            )),
            MetastoreConfig::ObjectStore { path } => {
                let backend = ObjectStoreBackend::local(path)
                    .with_context(|| format!("Failed to open metastore at {}", path.display()))?;
                Ok(Metastore::new(Arc::new(backend), self.cache_capacity))
            }
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_cache_capacity() -> u64 {
    DEFAULT_CACHE_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
        assert_eq!(
            Config::default().level_filter().unwrap(),
            log::LevelFilter::Info
        );
    }

    #[test]
    fn full_config() {
        let c = Config::from_toml(
            r#"
            log_level = "debug"
            cache_capacity = 16
            default_range_limit = 5

            [metastore]
            backend = "object_store"
            path = "/tmp/metastore"
            "#,
        )
        .unwrap();

        assert_eq!(c.level_filter().unwrap(), log::LevelFilter::Debug);
        assert_eq!(c.cache_capacity, 16);
        assert_eq!(c.default_range_limit, 5);
        assert_eq!(
            c.metastore,
            MetastoreConfig::ObjectStore {
                path: "/tmp/metastore".into()
            }
        );
    }

    #[test]
    fn invalid_configs() {
        assert!(Config::from_toml("log_level = \"loud\"").is_err());
        assert!(Config::from_toml("cache_capacity = 0").is_err());
        assert!(Config::from_toml("[metastore]\nbackend = \"s3\"").is_err());
    }

    #[tokio::test]
    async fn from_path_opens_persistent_metastore() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("metastore");
        let config_path = dir.path().join("profstore.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            "[metastore]\nbackend = \"object_store\"\npath = {:?}",
            store.display().to_string()
        )
        .unwrap();

        let c = Config::from_path(&config_path).unwrap();
        let m = c.open_metastore().unwrap();
        assert_eq!(
            m.count(crate::error::EntityKind::Function).await.unwrap(),
            0
        );
        assert!(Config::from_path(dir.path().join("missing.toml")).is_err());
    }
}
