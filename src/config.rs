//! Application paths and configuration service.
//!
//! Configuration is a YAML file (`config.yml`) merged over compiled
//! defaults. Secrets (the generation API key) are read from the
//! environment, never from the config file.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::errors::ApiError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let user_data_dir = discover_user_data_dir();
        let log_dir = user_data_dir.join("logs");
        let db_path = user_data_dir.join("mimir_core.db");

        for dir in [&user_data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            user_data_dir,
            log_dir,
            db_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_user_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("MIMIR_DATA_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("data")
}

/// Engine tuning knobs, resolved from `config.yml` with compiled defaults.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Sliding-window size for the chunker, in characters.
    pub chunk_size: usize,
    /// Overlap between neighboring chunks, in characters.
    pub chunk_overlap: usize,
    /// Hard ceiling on fragments handed to the composer per request.
    pub max_fragments: usize,
    /// Per-fragment character ceiling applied during composition.
    pub max_context_chars: usize,
    /// Per-source retrieval timeout in milliseconds.
    pub source_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_fragments: 5,
            max_context_chars: 500,
            source_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("MIMIR_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        self.paths.user_data_dir.join("config.yml")
    }

    pub fn load_config(&self) -> Result<Value, ApiError> {
        let file_config = load_yaml_file(&self.config_path());
        Ok(deep_merge(&default_config(), &file_config))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        let Ok(config) = self.load_config() else {
            return defaults;
        };
        let rag = config.get("rag");

        EngineSettings {
            chunk_size: read_usize(rag, "chunk_size", defaults.chunk_size),
            chunk_overlap: read_usize(rag, "chunk_overlap", defaults.chunk_overlap),
            max_fragments: read_usize(rag, "max_fragments", defaults.max_fragments),
            max_context_chars: read_usize(rag, "max_context_chars", defaults.max_context_chars),
            source_timeout_ms: read_u64(rag, "source_timeout_ms", defaults.source_timeout_ms),
        }
    }
}

fn read_usize(section: Option<&Value>, key: &str, fallback: usize) -> usize {
    section
        .and_then(|s| s.get(key))
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(fallback)
}

fn read_u64(section: Option<&Value>, key: &str, fallback: u64) -> u64 {
    section
        .and_then(|s| s.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(fallback)
}

fn default_config() -> Value {
    json!({
        "rag": {
            "chunk_size": 1000,
            "chunk_overlap": 200,
            "max_fragments": 5,
            "max_context_chars": 500,
            "source_timeout_ms": 10_000,
        },
        "generation": {
            "api_version": "2024-02-01",
            "deployment": "gpt-4",
            "embedding_deployment": "text-embedding-ada-002",
            "temperature": 0.1,
            "max_tokens": 2000,
        },
    })
}

fn load_yaml_file(path: &PathBuf) -> Value {
    let Ok(raw) = fs::read_to_string(path) else {
        return Value::Object(Map::new());
    };

    serde_yaml::from_str::<Value>(&raw).unwrap_or_else(|err| {
        tracing::warn!("Failed to parse {}: {}", path.display(), err);
        Value::Object(Map::new())
    })
}

fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let entry = merged
                    .get(key)
                    .map(|existing| deep_merge(existing, value))
                    .unwrap_or_else(|| value.clone());
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_overrides_nested_keys() {
        let base = json!({"rag": {"chunk_size": 1000, "chunk_overlap": 200}});
        let overlay = json!({"rag": {"chunk_size": 400}});

        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged["rag"]["chunk_size"], 400);
        assert_eq!(merged["rag"]["chunk_overlap"], 200);
    }

    #[test]
    fn engine_settings_fall_back_to_defaults() {
        let defaults = EngineSettings::default();
        assert_eq!(defaults.chunk_size, 1000);
        assert_eq!(defaults.max_fragments, 5);
    }
}
