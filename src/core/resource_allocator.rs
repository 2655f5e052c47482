//! Fixed-capacity multi-resource pool with partial-grant semantics.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Scarce execution capacity gating concurrent migration work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Slot for one running data-transfer job.
    TransferJob,
    /// Slot for one data-transfer worker inside a job.
    TransferWorker,
    /// Slot for one metadata operation against the target warehouse.
    MetadataOperation,
}

impl Resource {
    /// Every resource kind, in pool order.
    pub const ALL: [Self; 3] = [Self::TransferJob, Self::TransferWorker, Self::MetadataOperation];

    /// Capacity used when configuration does not name this kind.
    #[must_use]
    pub const fn default_capacity(self) -> u64 {
        match self {
            Self::TransferJob => 5,
            Self::TransferWorker => 25,
            Self::MetadataOperation => 10,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TransferJob => "transfer_job",
            Self::TransferWorker => "transfer_worker",
            Self::MetadataOperation => "metadata_operation",
        };
        f.write_str(name)
    }
}

/// Resource kind to unit count.
pub type ResourceMap = BTreeMap<Resource, u64>;

/// Pool capacities with every kind set to its default.
#[must_use]
pub fn default_capacities() -> ResourceMap {
    Resource::ALL
        .iter()
        .map(|r| (*r, r.default_capacity()))
        .collect()
}

/// Resources handed to one action.
///
/// A grant is not `Clone`: `ResourceAllocator::release` consumes it, so each
/// grant can be returned to the pool at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct Grant {
    action_id: String,
    granted: ResourceMap,
}

impl Grant {
    /// Action the grant belongs to.
    #[must_use]
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    /// Granted amounts per kind; never more than requested.
    #[must_use]
    pub const fn resources(&self) -> &ResourceMap {
        &self.granted
    }

    /// Granted amount of one kind (0 when not requested).
    #[must_use]
    pub fn get(&self, resource: Resource) -> u64 {
        self.granted.get(&resource).copied().unwrap_or(0)
    }
}

/// Outcome of an allocation attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Allocation {
    /// Resources were reserved; some kinds may have been downgraded.
    Granted(Grant),
    /// A requested kind had zero availability; nothing was reserved.
    Refused {
        /// First kind found exhausted.
        resource: Resource,
    },
}

impl Allocation {
    /// Whether resources were reserved.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    /// Convert a refusal into `SchedulerError::ResourceExhausted`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` when the allocation was refused.
    pub fn into_result(self, action_id: &str) -> Result<Grant, SchedulerError> {
        match self {
            Self::Granted(grant) => Ok(grant),
            Self::Refused { resource } => Err(SchedulerError::ResourceExhausted {
                action_id: action_id.to_string(),
                resource,
            }),
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorStats {
    /// Configured capacity per kind.
    pub capacity: ResourceMap,
    /// Units not currently granted.
    pub available: ResourceMap,
}

#[derive(Debug)]
struct PoolState {
    capacity: ResourceMap,
    available: ResourceMap,
}

/// Multi-resource pool shared by the dispatch layer.
///
/// Every check-then-decrement runs inside one `parking_lot::Mutex` critical
/// section, so concurrent allocations never observe the same availability.
/// Availability is unsigned and never drops below zero.
#[derive(Debug)]
pub struct ResourceAllocator {
    state: Mutex<PoolState>,
}

impl Default for ResourceAllocator {
    fn default() -> Self {
        Self::new(default_capacities())
    }
}

impl ResourceAllocator {
    /// Create a pool with the given capacities, all initially available.
    #[must_use]
    pub fn new(capacities: ResourceMap) -> Self {
        Self {
            state: Mutex::new(PoolState {
                available: capacities.clone(),
                capacity: capacities,
            }),
        }
    }

    /// Reserve resources for an action.
    ///
    /// If any requested kind has zero availability the whole request is refused
    /// and the pool is untouched. A kind with some but not enough availability is
    /// downgraded to what is left; the other kinds are still granted in full.
    pub fn allocate(&self, action_id: &str, requested: &ResourceMap) -> Allocation {
        let mut state = self.state.lock();
        tracing::info!(
            action_id,
            ?requested,
            current = ?state.available,
            "allocating resources"
        );

        let mut granted = ResourceMap::new();
        for (&resource, &required) in requested {
            let available = state.available.get(&resource).copied().unwrap_or(0);
            if available == 0 {
                tracing::info!(action_id, %resource, "allocation refused, run out of resource");
                return Allocation::Refused { resource };
            }
            if available < required {
                tracing::warn!(
                    action_id,
                    %resource,
                    required,
                    available,
                    "not enough resource, granting what is left"
                );
                granted.insert(resource, available);
            } else {
                granted.insert(resource, required);
            }
        }

        for (resource, amount) in &granted {
            if let Some(available) = state.available.get_mut(resource) {
                *available -= amount;
            }
        }

        tracing::info!(action_id, ?granted, "allocation succeeded");
        Allocation::Granted(Grant {
            action_id: action_id.to_string(),
            granted,
        })
    }

    /// Return a grant's exact amounts to the pool.
    ///
    /// No ledger is kept: the caller is trusted to release each grant once.
    pub fn release(&self, grant: Grant) {
        let mut state = self.state.lock();
        for (resource, amount) in &grant.granted {
            let available = state.available.entry(*resource).or_insert(0);
            *available = available.saturating_add(*amount);
        }
        tracing::info!(
            action_id = %grant.action_id,
            released = ?grant.granted,
            current = ?state.available,
            "released resources"
        );
    }

    /// Overwrite the capacity of one kind while the pool is live.
    ///
    /// Availability is reset to the new capacity. Grants still outstanding are
    /// returned on top of it when released, so the pool may be over-subscribed
    /// until they drain.
    pub fn update(&self, resource: Resource, capacity: u64) {
        let mut state = self.state.lock();
        let before = state.capacity.get(&resource).copied();
        let outstanding = before
            .zip(state.available.get(&resource).copied())
            .map_or(0, |(cap, avail)| cap.saturating_sub(avail));
        if outstanding > 0 {
            tracing::warn!(
                %resource,
                outstanding,
                "capacity updated with grants outstanding, pool may be over-subscribed"
            );
        }
        tracing::info!(%resource, ?before, after = capacity, "updating resource capacity");
        state.capacity.insert(resource, capacity);
        state.available.insert(resource, capacity);
    }

    /// Units of one kind not currently granted.
    #[must_use]
    pub fn available(&self, resource: Resource) -> u64 {
        self.state.lock().available.get(&resource).copied().unwrap_or(0)
    }

    /// Snapshot of capacity and availability.
    #[must_use]
    pub fn snapshot(&self) -> AllocatorStats {
        let state = self.state.lock();
        AllocatorStats {
            capacity: state.capacity.clone(),
            available: state.available.clone(),
        }
    }
}
