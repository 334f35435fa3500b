//! Application configuration loaded once at startup from YAML.
//!
//! Only the `models` section is mandatory; every other section carries
//! serde defaults so a minimal config file stays minimal. Environment
//! overrides (`MANAGER_PORT`, `IDLE_TIMEOUT`, ...) are applied by the
//! binaries, not here.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::WorkerKind;
use crate::error::ConfigError;

/// Configuration for a single model alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which worker binary serves this model.
    #[serde(rename = "type")]
    pub kind: WorkerKind,

    /// Opaque model identifier handed to the worker (HF path or similar).
    pub path: String,

    #[serde(default)]
    pub hot_reload: bool,

    /// Free-form parameters forwarded to the worker untouched.
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// How an evictee is torn down when memory pressure forces it out while
/// it may still be serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionMode {
    /// SIGTERM first, escalate to SIGKILL after the grace period.
    Graceful,
    /// SIGKILL immediately; in-flight work is severed.
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_unified_memory_gb: f64,
    pub eviction_threshold_percent: u8,
    pub safety_margin_gb: f64,
    pub eviction_mode: EvictionMode,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_unified_memory_gb: 24.0,
            eviction_threshold_percent: 75,
            safety_margin_gb: 4.0,
            eviction_mode: EvictionMode::Graceful,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Shared key carried for deployments that front the gateway with a
    /// checking proxy; the gateway itself does not enforce it.
    pub api_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_key: "default-key".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Fixed port assignments for canonical aliases. Aliases not listed
    /// here draw from the monotonic pool.
    pub ports: BTreeMap<String, u16>,
    /// Seconds between idle sweeps.
    pub health_check_interval: u64,
    /// Seconds allowed per child health probe.
    pub health_check_timeout: u64,
    /// Seconds a child gets to pass its first health check.
    pub startup_timeout: u64,
    /// Directory holding the worker binaries; PATH lookup when unset.
    pub bin_dir: Option<PathBuf>,
    /// Directory for the append-only per-alias log files.
    pub log_dir: PathBuf,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let mut ports = BTreeMap::new();
        ports.insert("vlm-fast".to_string(), 8001);
        ports.insert("vlm-best".to_string(), 8002);
        ports.insert("image-gen".to_string(), 8003);
        Self {
            ports,
            health_check_interval: 30,
            health_check_timeout: 5,
            startup_timeout: 60,
            bin_dir: None,
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

impl AppConfig {
    /// Load and validate a config file. Any failure here is fatal to the
    /// calling process.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse a config document from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(raw)?;
        if config.models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
models:
  vlm-fast:
    type: vlm
    path: mlx-community/Qwen2.5-VL-3B-Instruct-4bit
  image-gen:
    type: diffusion
    path: mlx-community/FLUX.1-schnell-4bit-mlx
    params:
      steps: 4
memory:
  safety_margin_gb: 2.0
  eviction_mode: immediate
gateway:
  port: 9000
workers:
  startup_timeout: 10
"#;

    #[test]
    fn parses_full_document() {
        let config = AppConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models["vlm-fast"].kind, WorkerKind::Vlm);
        assert_eq!(
            config.models["image-gen"].params["steps"],
            serde_json::json!(4)
        );
        assert_eq!(config.memory.safety_margin_gb, 2.0);
        assert_eq!(config.memory.eviction_mode, EvictionMode::Immediate);
        // untouched sections keep their defaults
        assert_eq!(config.memory.max_unified_memory_gb, 24.0);
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.workers.startup_timeout, 10);
        assert_eq!(config.workers.ports["vlm-fast"], 8001);
    }

    #[test]
    fn minimal_document_gets_defaults() {
        let config = AppConfig::from_yaml("models:\n  m:\n    type: mock\n    path: x\n").unwrap();
        assert_eq!(config.memory.safety_margin_gb, 4.0);
        assert_eq!(config.memory.eviction_mode, EvictionMode::Graceful);
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.workers.health_check_interval, 30);
    }

    #[test]
    fn empty_models_rejected() {
        assert!(matches!(
            AppConfig::from_yaml("models: {}\n"),
            Err(ConfigError::NoModels)
        ));
    }

    #[test]
    fn unknown_worker_type_rejected() {
        let err = AppConfig::from_yaml("models:\n  m:\n    type: tts\n    path: x\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        assert!(matches!(
            AppConfig::load("/nonexistent/warden.yaml"),
            Err(ConfigError::NotFound(_))
        ));
    }
}
