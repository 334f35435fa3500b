//! Shared foundations for the warden orchestrator: application
//! configuration, the model catalog with its memory-footprint estimates,
//! the host memory probe, and the admission/eviction planner.
//!
//! Everything in this crate is either pure or a read-only view of the
//! host; process ownership lives in `warden-manager`.

pub mod admission;
pub mod catalog;
pub mod config;
pub mod error;
pub mod memory;

pub use admission::{AdmissionPlan, Resident, plan_admission};
pub use catalog::{ModelCatalog, ModelEntry, WorkerKind, estimated_memory_gb};
pub use config::{AppConfig, GatewayConfig, MemoryConfig, ModelConfig, WorkersConfig};
pub use error::ConfigError;
pub use memory::MemoryStatus;
