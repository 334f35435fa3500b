//! Worker port assignment.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU16, Ordering};

/// First port handed out to aliases without a fixed assignment.
const DYNAMIC_PORT_BASE: u16 = 8010;

/// Fixed ports for the canonical aliases, a monotonic pool for the rest.
/// Mutated only under the supervisor lock; the atomic just keeps the
/// counter honest for lock-free readers of `next_dynamic`.
#[derive(Debug)]
pub struct PortAllocator {
    fixed: BTreeMap<String, u16>,
    next: AtomicU16,
}

impl PortAllocator {
    pub fn new(fixed: BTreeMap<String, u16>) -> Self {
        Self {
            fixed,
            next: AtomicU16::new(DYNAMIC_PORT_BASE),
        }
    }

    pub fn port_for(&self, alias: &str) -> u16 {
        match self.fixed.get(alias) {
            Some(port) => *port,
            None => self.next.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn next_dynamic(&self) -> u16 {
        self.next.load(Ordering::Relaxed)
    }
}
