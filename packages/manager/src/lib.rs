//! Worker manager: the single process that owns worker children.
//!
//! The supervisor is the sole writer of the worker record map; spawn,
//! stop, and the idle sweep serialize on one lock so admission decisions
//! see a consistent resident set. Touch and status are lock-free and may
//! observe a torn view, which their consumers tolerate.

pub mod api;
pub mod monitor;
pub mod policy;
pub mod ports;
pub mod supervisor;

pub use policy::SupervisorPolicy;
pub use supervisor::{SpawnError, Supervisor};
