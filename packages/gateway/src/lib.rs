//! Stateless gateway: resolves a public request to a worker alias, asks
//! the manager for an address, forwards the payload, and returns the
//! worker's JSON untouched. All worker state lives in the manager; the
//! gateway holds only the catalog and per-request spawn results.

pub mod api;
pub mod dispatch;
pub mod error;
pub mod manager_client;

pub use dispatch::Dispatcher;
pub use error::DispatchError;
pub use manager_client::ManagerClient;
