//! Memory admission planning.
//!
//! The planner is pure: it sees a probe snapshot and a resident set and
//! produces a verdict plus the eviction prefix that would clear the
//! deficit. Actually stopping workers, waiting for reclamation, and
//! re-probing belong to the supervisor; the plan is advice, the fresh
//! probe afterwards is the authority.

/// A resident worker as the planner sees it.
#[derive(Debug, Clone)]
pub struct Resident {
    pub alias: String,
    pub memory_gb: f64,
    /// Seconds since the epoch; older wins eviction ties.
    pub last_used: u64,
}

/// Outcome of an admission check.
#[derive(Debug, Clone)]
pub struct AdmissionPlan {
    /// True when the load fits without touching any resident.
    pub fits: bool,
    /// GB still missing after the safety margin; 0 when `fits`.
    pub deficit_gb: f64,
    /// Aliases to stop, in order. May not cover the deficit when even a
    /// full eviction would not fit; the caller's re-probe decides.
    pub evict: Vec<String>,
}

/// Decide whether `required_gb` fits into the currently available memory,
/// and if not, which residents to evict first.
///
/// Eviction order is largest footprint first so the fewest workers are
/// destroyed; ties go to the least recently used.
pub fn plan_admission(
    required_gb: f64,
    status: &crate::memory::MemoryStatus,
    residents: &[Resident],
    safety_margin_gb: f64,
) -> AdmissionPlan {
    let effective_available = (status.available_gb - safety_margin_gb).max(0.0);

    if effective_available >= required_gb {
        return AdmissionPlan {
            fits: true,
            deficit_gb: 0.0,
            evict: Vec::new(),
        };
    }

    let deficit = required_gb - effective_available;

    let mut candidates: Vec<&Resident> = residents.iter().collect();
    candidates.sort_by(|a, b| {
        b.memory_gb
            .partial_cmp(&a.memory_gb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.last_used.cmp(&b.last_used))
    });

    let mut evict = Vec::new();
    let mut freed = 0.0;
    for resident in candidates {
        evict.push(resident.alias.clone());
        freed += resident.memory_gb;
        if freed >= deficit {
            break;
        }
    }

    AdmissionPlan {
        fits: false,
        deficit_gb: deficit,
        evict,
    }
}
