//! Process supervisor: single-writer owner of every worker child.

mod record;
mod spawn;

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use warden_core::admission::Resident;
use warden_core::config::{EvictionMode, MemoryConfig, WorkersConfig};
use warden_core::{MemoryStatus, ModelCatalog, memory};

use crate::policy::SupervisorPolicy;
use crate::ports::PortAllocator;

pub use record::{WorkerRecord, WorkerSnapshot, epoch_secs};

/// Grace period between SIGTERM and SIGKILL when stopping a child group.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("insufficient memory for {alias}: need {needed_gb:.1}GB, have {available_gb:.1}GB")]
    OutOfMemory {
        alias: String,
        needed_gb: f64,
        available_gb: f64,
    },

    #[error("worker {0} failed to start within the ready timeout")]
    StartupFailure(String),

    #[error("failed to launch worker {alias}: {source}")]
    Launch {
        alias: String,
        #[source]
        source: io::Error,
    },
}

/// Owns the `alias -> WorkerRecord` map and every admission decision.
///
/// One lock serializes spawn, stop, and the sweep; per-alias locking
/// would let eviction race against a concurrent spawn's admission check.
pub struct Supervisor {
    catalog: ModelCatalog,
    policy: SupervisorPolicy,
    memory_config: MemoryConfig,
    records: DashMap<String, Arc<WorkerRecord>>,
    lock: Mutex<()>,
    ports: PortAllocator,
    http: reqwest::Client,
    bin_dir: Option<PathBuf>,
    log_dir: PathBuf,
}

impl Supervisor {
    pub fn new(
        catalog: ModelCatalog,
        policy: SupervisorPolicy,
        memory_config: MemoryConfig,
        workers: &WorkersConfig,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(&workers.log_dir)?;
        Ok(Self {
            catalog,
            policy,
            memory_config,
            records: DashMap::new(),
            lock: Mutex::new(()),
            ports: PortAllocator::new(workers.ports.clone()),
            http: reqwest::Client::new(),
            bin_dir: workers.bin_dir.clone(),
            log_dir: workers.log_dir.clone(),
        })
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn worker_count(&self) -> usize {
        self.records.len()
    }

    /// Stop one worker. Returns false for an alias with no live record;
    /// never errors.
    pub async fn stop(&self, alias: &str) -> bool {
        let _guard = self.lock.lock().await;
        self.stop_locked(alias, EvictionMode::Graceful).await
    }

    /// Reset the idle clock and count a request. Lock-free; no-op when
    /// the alias has no live record.
    pub fn touch(&self, alias: &str) -> bool {
        match self.records.get(alias) {
            Some(record) => {
                record.touch();
                true
            }
            None => false,
        }
    }

    /// Tear down every child. Best-effort: failures are logged, not
    /// propagated.
    pub async fn stop_all(&self) -> usize {
        let _guard = self.lock.lock().await;
        let aliases: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        let mut stopped = 0;
        for alias in aliases {
            if self.stop_locked(&alias, EvictionMode::Graceful).await {
                stopped += 1;
            }
        }
        info!(stopped, "all workers stopped");
        stopped
    }

    /// Lock-free status snapshot. Readers tolerate a torn view: a worker
    /// may appear here while a concurrent stop is mid-teardown.
    pub fn status(&self) -> StatusReport {
        let workers: BTreeMap<String, WorkerSnapshot> = self
            .records
            .iter()
            .map(|r| (r.key().clone(), r.value().snapshot()))
            .collect();
        let models_loaded_gb = workers.values().map(|w| w.memory_gb).sum();
        let status = memory::probe();

        StatusReport {
            workers,
            memory: MemoryReport {
                total_gb: status.total_gb,
                used_gb: status.used_gb,
                available_gb: status.available_gb,
                usage_percent: status.usage_percent(),
                models_loaded_gb,
            },
            policy: PolicyReport {
                idle_timeout_seconds: self.policy.idle_timeout.as_secs(),
                max_requests_before_restart: self.policy.max_requests_before_restart,
                sweep_interval_seconds: self.policy.sweep_interval.as_secs(),
                safety_margin_gb: self.memory_config.safety_margin_gb,
                max_unified_memory_gb: self.memory_config.max_unified_memory_gb,
                eviction_threshold_percent: self.memory_config.eviction_threshold_percent,
            },
        }
    }

    /// One pass of the idle monitor: remove crashed children, offload
    /// idle workers, recycle over-used ones. Serialized with spawn/stop
    /// by the supervisor lock; never runs concurrently with itself.
    pub async fn sweep_once(&self) -> SweepSummary {
        let _guard = self.lock.lock().await;
        let now = epoch_secs();
        let mut summary = SweepSummary::default();
        let mut marked: Vec<(String, &'static str)> = Vec::new();

        let records: Vec<Arc<WorkerRecord>> =
            self.records.iter().map(|r| r.value().clone()).collect();
        for record in records {
            if !record.process_alive().await {
                warn!(alias = %record.alias, pid = record.pid, "worker died unexpectedly");
                summary.crashed += 1;
                marked.push((record.alias.clone(), "crashed"));
                continue;
            }

            let idle = now.saturating_sub(record.last_used());
            if idle > self.policy.idle_timeout.as_secs() {
                info!(alias = %record.alias, idle_secs = idle, "idle timeout, offloading");
                summary.idle += 1;
                marked.push((record.alias.clone(), "idle"));
                continue;
            }

            let requests = record.request_count();
            if requests >= self.policy.max_requests_before_restart {
                info!(
                    alias = %record.alias,
                    requests,
                    "request limit reached, recycling"
                );
                summary.recycled += 1;
                marked.push((record.alias.clone(), "recycled"));
            }
        }

        for (alias, reason) in marked {
            debug!(alias = %alias, reason, "sweep stopping worker");
            self.stop_locked(&alias, EvictionMode::Graceful).await;
        }
        summary
    }

    /// Remove the record and tear down its process group. Caller holds
    /// the supervisor lock.
    pub(crate) async fn stop_locked(&self, alias: &str, mode: EvictionMode) -> bool {
        let Some((_, record)) = self.records.remove(alias) else {
            return false;
        };
        info!(alias = %alias, pid = record.pid, "stopping worker");
        self.terminate(&record, mode).await;
        true
    }

    /// Kill a worker's process group and reap the child.
    pub(crate) async fn terminate(&self, record: &WorkerRecord, mode: EvictionMode) {
        let group = Pid::from_raw(record.pid as i32);
        let mut child = record.child.lock().await;

        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }

        match mode {
            EvictionMode::Graceful => {
                if let Err(error) = killpg(group, Signal::SIGTERM) {
                    warn!(alias = %record.alias, %error, "SIGTERM failed");
                }
                if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
                    warn!(alias = %record.alias, "grace period elapsed, escalating to SIGKILL");
                    let _ = killpg(group, Signal::SIGKILL);
                    let _ = child.wait().await;
                }
            }
            EvictionMode::Immediate => {
                let _ = killpg(group, Signal::SIGKILL);
                let _ = child.wait().await;
            }
        }
    }

    /// Probe a child's /health endpoint.
    pub(crate) async fn health_ok(&self, port: u16) -> bool {
        let url = format!("http://127.0.0.1:{port}/health");
        match self
            .http
            .get(&url)
            .timeout(self.policy.health_check_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Resident set as the admission planner sees it.
    pub(crate) fn residents(&self) -> Vec<Resident> {
        self.records
            .iter()
            .map(|r| Resident {
                alias: r.alias.clone(),
                memory_gb: r.memory_gb,
                last_used: r.last_used(),
            })
            .collect()
    }

    pub(crate) fn effective_available(&self, status: &MemoryStatus) -> f64 {
        (status.available_gb - self.memory_config.safety_margin_gb).max(0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub workers: BTreeMap<String, WorkerSnapshot>,
    pub memory: MemoryReport,
    pub policy: PolicyReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryReport {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub usage_percent: f64,
    pub models_loaded_gb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyReport {
    pub idle_timeout_seconds: u64,
    pub max_requests_before_restart: u32,
    pub sweep_interval_seconds: u64,
    pub safety_margin_gb: f64,
    pub max_unified_memory_gb: f64,
    pub eviction_threshold_percent: u8,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepSummary {
    pub crashed: usize,
    pub idle: usize,
    pub recycled: usize,
}

impl SweepSummary {
    pub fn total(&self) -> usize {
        self.crashed + self.idle + self.recycled
    }
}
