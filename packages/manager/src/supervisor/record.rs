//! Live worker bookkeeping.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::process::Child;
use tokio::sync::Mutex;

use warden_core::WorkerKind;

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One running worker child. Created by spawn after the first successful
/// health check, destroyed by stop. `last_used` and `request_count` are
/// atomics so touch never takes the supervisor lock.
#[derive(Debug)]
pub struct WorkerRecord {
    pub alias: String,
    pub port: u16,
    pub model_path: String,
    pub kind: WorkerKind,
    pub memory_gb: f64,
    pub pid: u32,
    pub started_at: Instant,
    last_used: AtomicU64,
    request_count: AtomicU32,
    pub(crate) child: Mutex<Child>,
}

impl WorkerRecord {
    pub(crate) fn new(
        alias: String,
        port: u16,
        model_path: String,
        kind: WorkerKind,
        memory_gb: f64,
        pid: u32,
        child: Child,
    ) -> Self {
        Self {
            alias,
            port,
            model_path,
            kind,
            memory_gb,
            pid,
            started_at: Instant::now(),
            last_used: AtomicU64::new(epoch_secs()),
            request_count: AtomicU32::new(0),
            child: Mutex::new(child),
        }
    }

    /// Reset the idle clock and count one request.
    pub fn touch(&self) {
        self.last_used.store(epoch_secs(), Ordering::Release);
        self.request_count.fetch_add(1, Ordering::Release);
    }

    /// Reset the idle clock only (idempotent-spawn path).
    pub fn mark_used(&self) {
        self.last_used.store(epoch_secs(), Ordering::Release);
    }

    pub fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Acquire)
    }

    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::Acquire)
    }

    pub fn idle_secs(&self) -> u64 {
        epoch_secs().saturating_sub(self.last_used())
    }

    /// Whether the child is still running. `try_wait` also reaps the
    /// zombie when it has exited.
    pub async fn process_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            port: self.port,
            model_path: self.model_path.clone(),
            model_type: self.kind.as_str(),
            memory_gb: self.memory_gb,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            idle_seconds: self.idle_secs(),
            request_count: self.request_count(),
            pid: self.pid,
        }
    }
}

/// Read-only view of a record for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub port: u16,
    pub model_path: String,
    pub model_type: &'static str,
    pub memory_gb: f64,
    pub uptime_seconds: u64,
    pub idle_seconds: u64,
    pub request_count: u32,
    pub pid: u32,
}
