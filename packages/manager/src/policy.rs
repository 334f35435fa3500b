//! Supervisor timing knobs, static after startup.

use std::time::Duration;

use warden_core::config::WorkersConfig;

/// Lifecycle policy for worker children. Config supplies the spawn and
/// sweep timings; `IDLE_TIMEOUT` and `MAX_REQUESTS` environment
/// variables override the reaping thresholds.
#[derive(Debug, Clone)]
pub struct SupervisorPolicy {
    /// A worker unused for longer than this is offloaded.
    pub idle_timeout: Duration,
    /// Workers are recycled after this many requests to shed leaked
    /// per-request OS resources (fds, semaphores).
    pub max_requests_before_restart: u32,
    /// Period of the idle sweep.
    pub sweep_interval: Duration,
    /// How long a child gets to pass its first health check.
    pub spawn_ready_timeout: Duration,
    /// Pause after stopping an evictee so the OS can reclaim its memory
    /// before the next probe.
    pub settle_delay: Duration,
    /// Per-probe timeout for child health checks.
    pub health_check_timeout: Duration,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            max_requests_before_restart: 50,
            sweep_interval: Duration::from_secs(30),
            spawn_ready_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_millis(500),
            health_check_timeout: Duration::from_secs(5),
        }
    }
}

impl SupervisorPolicy {
    pub fn from_config(workers: &WorkersConfig) -> Self {
        Self {
            sweep_interval: Duration::from_secs(workers.health_check_interval),
            spawn_ready_timeout: Duration::from_secs(workers.startup_timeout),
            health_check_timeout: Duration::from_secs(workers.health_check_timeout),
            ..Self::default()
        }
    }

    /// Apply `IDLE_TIMEOUT` (seconds) and `MAX_REQUESTS` overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = env_u64("IDLE_TIMEOUT") {
            self.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("MAX_REQUESTS") {
            self.max_requests_before_restart = n as u32;
        }
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_timings_applied_over_defaults() {
        let workers = WorkersConfig {
            health_check_interval: 7,
            health_check_timeout: 2,
            startup_timeout: 11,
            ..WorkersConfig::default()
        };
        let policy = SupervisorPolicy::from_config(&workers);
        assert_eq!(policy.sweep_interval, Duration::from_secs(7));
        assert_eq!(policy.spawn_ready_timeout, Duration::from_secs(11));
        assert_eq!(policy.health_check_timeout, Duration::from_secs(2));
        // untouched by config
        assert_eq!(policy.idle_timeout, Duration::from_secs(300));
        assert_eq!(policy.max_requests_before_restart, 50);
    }
}
