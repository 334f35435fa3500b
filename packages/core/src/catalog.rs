//! Immutable model catalog plus the centrally-defined memory footprint
//! estimates that drive admission.
//!
//! The estimates are policy inputs, not measurements: they only need to
//! be deterministic and defined in one place so the supervisor and the
//! status surface agree on them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Which worker binary a model is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerKind {
    #[serde(rename = "vlm")]
    Vlm,
    #[serde(rename = "diffusion")]
    DiffusionMlx,
    #[serde(rename = "diffusion-cuda")]
    DiffusionCuda,
    #[serde(rename = "mock")]
    Mock,
}

impl WorkerKind {
    /// Program name of the worker binary for this kind. Resolved against
    /// `workers.bin_dir` when configured, PATH otherwise.
    pub fn worker_program(self) -> &'static str {
        match self {
            WorkerKind::Vlm => "warden-vlm-worker",
            WorkerKind::DiffusionMlx => "warden-diffusion-worker",
            WorkerKind::DiffusionCuda => "warden-cuda-diffusion-worker",
            WorkerKind::Mock => "warden-mock-worker",
        }
    }

    /// Footprint assumed when neither the table nor the path heuristics
    /// recognize the model.
    pub fn default_memory_gb(self) -> f64 {
        match self {
            WorkerKind::Vlm => 3.0,
            WorkerKind::DiffusionMlx => 8.0,
            WorkerKind::DiffusionCuda => 20.0,
            WorkerKind::Mock => 0.1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerKind::Vlm => "vlm",
            WorkerKind::DiffusionMlx => "diffusion",
            WorkerKind::DiffusionCuda => "diffusion-cuda",
            WorkerKind::Mock => "mock",
        }
    }

    pub fn is_vlm(self) -> bool {
        matches!(self, WorkerKind::Vlm)
    }
}

/// One entry of the catalog; immutable after startup.
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub alias: String,
    pub kind: WorkerKind,
    pub path: String,
    pub hot_reload: bool,
    pub params: BTreeMap<String, serde_json::Value>,
}

/// Known per-model footprints in GB, exact path match.
const KNOWN_MODEL_FOOTPRINTS: &[(&str, f64)] = &[
    ("mlx-community/moondream2", 1.5),
    ("mlx-community/Qwen2.5-VL-3B-Instruct-4bit", 2.5),
    ("mlx-community/Qwen2.5-VL-7B-Instruct-4bit", 4.5),
    ("mlx-community/Qwen2.5-VL-14B-Instruct-4bit", 8.0),
    ("mlx-community/FLUX.1-schnell-4bit-mlx", 6.0),
    ("mlx-community/FLUX.1-dev-4bit-mlx", 12.0),
    ("Qwen/Qwen-Image-2512", 20.0),
];

/// Estimated memory footprint for a model.
///
/// Lookup order: exact path match, parameter-count substring on the
/// lowercased path, then the per-kind default.
pub fn estimated_memory_gb(path: &str, kind: WorkerKind) -> f64 {
    if let Some((_, gb)) = KNOWN_MODEL_FOOTPRINTS.iter().find(|(p, _)| *p == path) {
        return *gb;
    }

    let lower = path.to_lowercase();
    if lower.contains("14b") {
        8.0
    } else if lower.contains("7b") {
        4.5
    } else if lower.contains("3b") {
        2.5
    } else if lower.contains("2b") || lower.contains("1b") {
        1.5
    } else {
        kind.default_memory_gb()
    }
}

/// Immutable alias → ModelEntry mapping built once from config.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: BTreeMap<String, ModelEntry>,
}

impl ModelCatalog {
    pub fn from_config(config: &AppConfig) -> Self {
        let entries = config
            .models
            .iter()
            .map(|(alias, m)| {
                let entry = ModelEntry {
                    alias: alias.clone(),
                    kind: m.kind,
                    path: m.path.clone(),
                    hot_reload: m.hot_reload,
                    params: m.params.clone(),
                };
                (alias.clone(), entry)
            })
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, alias: &str) -> Option<&ModelEntry> {
        self.entries.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First configured VLM in alias order; the gateway's last-resort
    /// target for vision requests.
    pub fn first_vlm(&self) -> Option<&str> {
        self.entries
            .values()
            .find(|e| e.kind.is_vlm())
            .map(|e| e.alias.as_str())
    }
}
