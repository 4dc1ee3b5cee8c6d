use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Settings threaded through extraction and ingestion.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    /// Universal root type whose inheritance edge is never stored.
    pub(crate) root_type: String,
    /// Marker interface that makes a class serializable.
    pub(crate) serializable_type: String,
    pub(crate) ingest: IngestConfig,
    pub(crate) store: StoreConfig,
    pub(crate) rules: RulesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root_type: "java.lang.Object".to_string(),
            serializable_type: "java.io.Serializable".to_string(),
            ingest: IngestConfig::default(),
            store: StoreConfig::default(),
            rules: RulesConfig::default(),
        }
    }
}

impl Config {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Batch sizes and execution flags for the merge phases.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct IngestConfig {
    pub(crate) class_batch_size: usize,
    pub(crate) method_batch_size: usize,
    pub(crate) edge_batch_size: usize,
    pub(crate) alias_batch_size: usize,
    /// Run node batches of one table in parallel.
    pub(crate) parallel_nodes: bool,
    /// Overwrite mutable method columns when a node already exists.
    pub(crate) refresh_mutable: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            class_batch_size: 5000,
            method_batch_size: 5000,
            edge_batch_size: 5000,
            alias_batch_size: 1000,
            parallel_nodes: true,
            refresh_mutable: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct StoreConfig {
    pub(crate) busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            busy_timeout_ms: 5000,
        }
    }
}

/// Extra knowledge-base entries on top of the built-in tables.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RulesConfig {
    pub(crate) sinks: Vec<SinkEntry>,
    pub(crate) sources: Vec<String>,
}

/// Method that is a sink for the given vulnerability category.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct SinkEntry {
    pub(crate) class: String,
    pub(crate) method: String,
    pub(crate) vul: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            root_type = "java.lang.Object"

            [ingest]
            alias_batch_size = 10
            parallel_nodes = false

            [[rules.sinks]]
            class = "com.example.Shell"
            method = "run"
            vul = "EXEC"
            "#,
        )
        .expect("parse config");

        assert_eq!(10, config.ingest.alias_batch_size);
        assert_eq!(5000, config.ingest.method_batch_size);
        assert!(!config.ingest.parallel_nodes);
        assert_eq!("java.io.Serializable", config.serializable_type);
        assert_eq!("EXEC", config.rules.sinks[0].vul);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("batch = 3").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = Config::load(&dir.path().join("missing.toml")).expect_err("missing file");

        assert!(error.to_string().contains("missing.toml"));
    }
}
