//! Lifecycle tests driving the supervisor against real child processes
//! (the mock worker binary). Each test uses its own port so the suite
//! can run in parallel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;

use warden_core::config::{MemoryConfig, WorkersConfig};
use warden_core::{AppConfig, ModelCatalog};
use warden_manager::{SpawnError, Supervisor, SupervisorPolicy};

fn mock_bin_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_warden-mock-worker"))
        .parent()
        .expect("bin dir")
        .to_path_buf()
}

fn test_policy() -> SupervisorPolicy {
    SupervisorPolicy {
        spawn_ready_timeout: Duration::from_secs(20),
        settle_delay: Duration::from_millis(10),
        health_check_timeout: Duration::from_secs(2),
        ..SupervisorPolicy::default()
    }
}

/// No safety margin so the suite also runs on small CI hosts.
fn test_memory_config() -> MemoryConfig {
    MemoryConfig {
        safety_margin_gb: 0.0,
        ..MemoryConfig::default()
    }
}

fn build_supervisor(
    aliases: &[(&str, u16)],
    policy: SupervisorPolicy,
    log_dir: &Path,
) -> Supervisor {
    let models_yaml: String = aliases
        .iter()
        .map(|(alias, _)| format!("  {alias}: {{ type: mock, path: mock/{alias} }}\n"))
        .collect();
    let config = AppConfig::from_yaml(&format!("models:\n{models_yaml}")).expect("test config");
    let catalog = ModelCatalog::from_config(&config);

    let ports: BTreeMap<String, u16> = aliases
        .iter()
        .map(|(alias, port)| (alias.to_string(), *port))
        .collect();
    let workers = WorkersConfig {
        ports,
        bin_dir: Some(mock_bin_dir()),
        log_dir: log_dir.to_path_buf(),
        ..WorkersConfig::default()
    };

    Supervisor::new(catalog, policy, test_memory_config(), &workers).expect("supervisor")
}

#[tokio::test]
async fn concurrent_spawns_share_one_child() {
    let dir = tempfile::tempdir().unwrap();
    let sup = Arc::new(build_supervisor(&[("m1", 18101)], test_policy(), dir.path()));

    let (a, b, c) = tokio::join!(sup.spawn("m1"), sup.spawn("m1"), sup.spawn("m1"));
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert_eq!(a.pid, b.pid);
    assert_eq!(b.pid, c.pid);
    assert_eq!(a.port, 18101);
    assert_eq!(sup.worker_count(), 1);

    sup.stop_all().await;
    assert_eq!(sup.worker_count(), 0);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let sup = build_supervisor(&[("m2", 18102)], test_policy(), dir.path());

    sup.spawn("m2").await.unwrap();
    assert!(sup.stop("m2").await);
    assert!(!sup.stop("m2").await);
    assert!(!sup.stop("never-existed").await);
}

#[tokio::test]
async fn touch_counts_requests_and_resets_idle() {
    let dir = tempfile::tempdir().unwrap();
    let sup = build_supervisor(&[("m3", 18103)], test_policy(), dir.path());

    let record = sup.spawn("m3").await.unwrap();
    let before = record.last_used();

    assert!(sup.touch("m3"));
    assert!(sup.touch("m3"));
    assert_eq!(record.request_count(), 2);
    assert!(record.last_used() >= before);

    // touching an absent alias is a no-op
    assert!(!sup.touch("ghost"));

    sup.stop_all().await;
}

#[tokio::test]
async fn unknown_alias_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let sup = build_supervisor(&[("m4", 18104)], test_policy(), dir.path());

    match sup.spawn("not-in-catalog").await {
        Err(SpawnError::UnknownModel(alias)) => assert_eq!(alias, "not-in-catalog"),
        other => panic!("expected UnknownModel, got {other:?}"),
    }
}

#[tokio::test]
async fn crashed_worker_is_swept_and_respawned() {
    let dir = tempfile::tempdir().unwrap();
    let sup = build_supervisor(&[("m5", 18105)], test_policy(), dir.path());

    let record = sup.spawn("m5").await.unwrap();
    let first_pid = record.pid;

    // kill the child behind the supervisor's back
    killpg(Pid::from_raw(first_pid as i32), Signal::SIGKILL).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let summary = sup.sweep_once().await;
    assert_eq!(summary.crashed, 1);
    assert_eq!(sup.worker_count(), 0);

    // the next request spawns a fresh process, never the dead record
    let fresh = sup.spawn("m5").await.unwrap();
    assert_ne!(fresh.pid, first_pid);
    assert_eq!(fresh.request_count(), 0);

    sup.stop_all().await;
}

#[tokio::test]
async fn request_limit_recycles_worker() {
    let dir = tempfile::tempdir().unwrap();
    let policy = SupervisorPolicy {
        max_requests_before_restart: 2,
        ..test_policy()
    };
    let sup = build_supervisor(&[("m6", 18106)], policy, dir.path());

    let record = sup.spawn("m6").await.unwrap();
    let first_pid = record.pid;
    sup.touch("m6");
    sup.touch("m6");

    let summary = sup.sweep_once().await;
    assert_eq!(summary.recycled, 1);
    assert_eq!(sup.worker_count(), 0);

    let fresh = sup.spawn("m6").await.unwrap();
    assert_ne!(fresh.pid, first_pid);
    assert_eq!(fresh.request_count(), 0);

    sup.stop_all().await;
}

#[tokio::test]
async fn idle_worker_is_offloaded() {
    let dir = tempfile::tempdir().unwrap();
    let policy = SupervisorPolicy {
        idle_timeout: Duration::from_secs(0),
        ..test_policy()
    };
    let sup = build_supervisor(&[("m7", 18107)], policy, dir.path());

    sup.spawn("m7").await.unwrap();
    // idle is measured in whole seconds; give the clock one tick
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let summary = sup.sweep_once().await;
    assert_eq!(summary.idle, 1);
    assert_eq!(sup.worker_count(), 0);
}

#[tokio::test]
async fn startup_failure_when_port_is_taken() {
    let dir = tempfile::tempdir().unwrap();
    let sup = build_supervisor(&[("m8", 18108)], test_policy(), dir.path());

    // squat the worker's port so the child exits on bind
    let _blocker = tokio::net::TcpListener::bind(("0.0.0.0", 18108)).await.unwrap();

    match sup.spawn("m8").await {
        Err(SpawnError::StartupFailure(alias)) => assert_eq!(alias, "m8"),
        other => panic!("expected StartupFailure, got {other:?}"),
    }
    assert_eq!(sup.worker_count(), 0);
}

#[tokio::test]
async fn missing_worker_binary_is_a_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::from_yaml("models:\n  m9: { type: mock, path: mock/m9 }\n").unwrap();
    let catalog = ModelCatalog::from_config(&config);
    let workers = WorkersConfig {
        ports: [("m9".to_string(), 18109)].into_iter().collect(),
        // a directory that exists but holds no binaries
        bin_dir: Some(dir.path().to_path_buf()),
        log_dir: dir.path().join("logs"),
        ..WorkersConfig::default()
    };
    let sup = Supervisor::new(catalog, test_policy(), test_memory_config(), &workers).unwrap();

    match sup.spawn("m9").await {
        Err(SpawnError::Launch { alias, .. }) => assert_eq!(alias, "m9"),
        other => panic!("expected Launch error, got {other:?}"),
    }
}

#[tokio::test]
async fn status_reports_workers_memory_and_policy() {
    let dir = tempfile::tempdir().unwrap();
    let sup = build_supervisor(&[("m10", 18110)], test_policy(), dir.path());

    sup.spawn("m10").await.unwrap();
    sup.touch("m10");

    let status = sup.status();
    let worker = &status.workers["m10"];
    assert_eq!(worker.port, 18110);
    assert_eq!(worker.model_type, "mock");
    assert_eq!(worker.request_count, 1);
    assert!(worker.pid > 0);

    assert!(status.memory.total_gb > 0.0);
    assert!(status.memory.models_loaded_gb > 0.0);
    assert_eq!(status.policy.max_requests_before_restart, 50);
    assert_eq!(status.policy.max_unified_memory_gb, 24.0);
    assert_eq!(status.policy.eviction_threshold_percent, 75);

    // worker log file exists and is append-only per alias
    assert!(dir.path().join("m10.log").exists());

    sup.stop_all().await;
}
