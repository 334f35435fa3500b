//! The spawn path: idempotent single-flight spawn with memory admission,
//! process-group launch, and readiness polling.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::Child;
use tracing::{info, warn};

use warden_core::admission::plan_admission;
use warden_core::catalog::{ModelEntry, estimated_memory_gb};
use warden_core::config::EvictionMode;
use warden_core::memory;

use super::record::{WorkerRecord, epoch_secs};
use super::{SpawnError, Supervisor};

impl Supervisor {
    /// Ensure a worker for `alias` is running and healthy, spawning one
    /// if needed.
    ///
    /// Idempotent: a live, healthy worker is re-touched and returned.
    /// Concurrent calls for the same alias serialize on the supervisor
    /// lock, so exactly one performs the fork and the rest observe its
    /// record. When memory is short, evictees are stopped one at a time
    /// with a settle pause and a fresh probe after each; the final probe
    /// decides admission, not the eviction arithmetic.
    pub async fn spawn(&self, alias: &str) -> Result<Arc<WorkerRecord>, SpawnError> {
        let _guard = self.lock.lock().await;

        if let Some(existing) = self.records.get(alias).map(|r| r.value().clone()) {
            if existing.process_alive().await {
                if self.health_ok(existing.port).await {
                    existing.mark_used();
                    return Ok(existing);
                }
                // Running but unresponsive: tear the group down before
                // replacing it, or the respawn races it for the port.
                warn!(alias, pid = existing.pid, "worker unresponsive, replacing");
                self.stop_locked(alias, EvictionMode::Graceful).await;
            } else {
                warn!(alias, pid = existing.pid, "discarding dead worker record");
                self.records.remove(alias);
            }
        }

        let entry = self
            .catalog
            .lookup(alias)
            .cloned()
            .ok_or_else(|| SpawnError::UnknownModel(alias.to_string()))?;
        let required_gb = estimated_memory_gb(&entry.path, entry.kind);

        let mut status = memory::probe();
        let plan = plan_admission(
            required_gb,
            &status,
            &self.residents(),
            self.memory_config.safety_margin_gb,
        );
        if !plan.fits {
            info!(
                alias,
                required_gb,
                deficit_gb = plan.deficit_gb,
                evictions = plan.evict.len(),
                "admission requires eviction"
            );
            for evictee in &plan.evict {
                info!(alias = %evictee, "evicting worker to free memory");
                self.stop_locked(evictee, self.memory_config.eviction_mode).await;
                tokio::time::sleep(self.policy.settle_delay).await;
                status = memory::probe();
                if self.effective_available(&status) >= required_gb {
                    break;
                }
            }
            if self.effective_available(&status) < required_gb {
                return Err(SpawnError::OutOfMemory {
                    alias: alias.to_string(),
                    needed_gb: required_gb,
                    available_gb: status.available_gb,
                });
            }
        }

        let port = self.ports.port_for(alias);
        let mut child = self
            .launch(&entry, port)
            .map_err(|source| SpawnError::Launch {
                alias: alias.to_string(),
                source,
            })?;
        let pid = child.id().unwrap_or_default();
        info!(alias, port, pid, memory_gb = required_gb, "worker launched, polling for ready");

        if !self.wait_ready(&mut child, port, alias).await {
            warn!(alias, pid, "worker never became ready, force-stopping");
            if pid != 0 {
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
            let _ = child.wait().await;
            return Err(SpawnError::StartupFailure(alias.to_string()));
        }

        let record = Arc::new(WorkerRecord::new(
            alias.to_string(),
            port,
            entry.path.clone(),
            entry.kind,
            required_gb,
            pid,
            child,
        ));
        self.records.insert(alias.to_string(), record.clone());
        info!(alias, port, pid, "worker ready");
        Ok(record)
    }

    /// Launch the worker child in its own process group with stdout and
    /// stderr appended to the per-alias log file.
    fn launch(&self, entry: &ModelEntry, port: u16) -> std::io::Result<Child> {
        let program = match &self.bin_dir {
            Some(dir) => dir.join(entry.kind.worker_program()),
            None => PathBuf::from(entry.kind.worker_program()),
        };

        let log_path = self.log_dir.join(format!("{}.log", entry.alias));
        let mut log = OpenOptions::new().create(true).append(true).open(&log_path)?;
        writeln!(log, "=== starting {} (epoch {}) ===", entry.alias, epoch_secs())?;

        let mut command = std::process::Command::new(&program);
        command
            .arg("--alias")
            .arg(&entry.alias)
            .arg("--model-path")
            .arg(&entry.path)
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log));
        {
            use std::os::unix::process::CommandExt;
            // Own group so a later group-kill reaches any descendants.
            command.process_group(0);
        }

        let mut command = tokio::process::Command::from(command);
        command.kill_on_drop(false);
        command.spawn()
    }

    /// Poll the child's /health at 1 Hz until it answers or the ready
    /// timeout elapses. A child that exits while we poll fails fast.
    async fn wait_ready(&self, child: &mut Child, port: u16, alias: &str) -> bool {
        let deadline = tokio::time::Instant::now() + self.policy.spawn_ready_timeout;
        loop {
            if let Ok(Some(exit)) = child.try_wait() {
                warn!(alias, %exit, "worker exited during startup");
                return false;
            }
            if self.health_ok(port).await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}
