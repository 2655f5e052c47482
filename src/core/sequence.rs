//! Cached block allocation of monotonically increasing identifiers.
//!
//! Each refill advances a durable counter by one and reserves the block
//! `[value * block_size, (value + 1) * block_size)`. Ids inside the block are
//! issued from memory; only exhaustion touches the counter again.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::SchedulerError;

/// Durable named counter backing identifier sequences.
pub trait DurableCounter: Send + Sync {
    /// Atomically advance the named counter by one and return the value it held
    /// before the increment.
    ///
    /// Increment and read must form one transaction so that two callers can
    /// never observe the same pre-increment value.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::SequenceFetch` when the counter is unreachable.
    fn increment(&self, name: &str) -> Result<u64, SchedulerError>;
}

/// Contiguous identifier range cached in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceBlock {
    base: u64,
    cursor: u64,
    size: u64,
}

impl SequenceBlock {
    /// Block starting at `base` with `size` ids, none issued yet.
    #[must_use]
    pub const fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            cursor: 0,
            size,
        }
    }

    /// Whether every id in the block has been issued.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.cursor >= self.size
    }

    /// Ids left in the block.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.cursor)
    }

    fn issue(&mut self) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }
        let id = self.base.checked_add(self.cursor)?;
        self.cursor += 1;
        Some(id)
    }
}

/// Concurrency-safe identifier source for one named sequence.
pub struct SequenceAllocator {
    name: String,
    block_size: u64,
    counter: Arc<dyn DurableCounter>,
    /// `None` until the first refill. Guarded by the same lock as every later
    /// refill, so concurrent first callers cannot fetch two bases.
    block: Mutex<Option<SequenceBlock>>,
}

impl SequenceAllocator {
    /// Create an allocator for `name` that reserves `block_size` ids per refill.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Config` when `block_size` is zero.
    pub fn new(
        name: impl Into<String>,
        block_size: u64,
        counter: Arc<dyn DurableCounter>,
    ) -> Result<Self, SchedulerError> {
        if block_size == 0 {
            return Err(SchedulerError::Config(
                "sequence block_size must be greater than 0".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            block_size,
            counter,
            block: Mutex::new(None),
        })
    }

    /// Sequence name used as the durable counter key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ids reserved per durable refill.
    #[must_use]
    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Issue the next identifier.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::SequenceFetch` when a refill is needed and the
    /// durable counter fails. The cached block is left unchanged in that case.
    pub fn next_id(&self) -> Result<u64, SchedulerError> {
        if self.block_size == 1 {
            return self.counter.increment(&self.name);
        }

        let mut block = self.block.lock();
        if let Some(id) = block.as_mut().and_then(SequenceBlock::issue) {
            return Ok(id);
        }

        let value = self.counter.increment(&self.name)?;
        let base = value
            .checked_mul(self.block_size)
            .filter(|base| base.checked_add(self.block_size - 1).is_some())
            .ok_or_else(|| {
                SchedulerError::SequenceFetch(format!(
                    "sequence `{}` overflowed at counter value {value}",
                    self.name
                ))
            })?;
        tracing::debug!(
            sequence = %self.name,
            base,
            block_size = self.block_size,
            "refilled sequence block"
        );

        let mut fresh = SequenceBlock::new(base, self.block_size);
        let id = fresh.issue().ok_or_else(|| {
            SchedulerError::SequenceFetch(format!("sequence `{}` produced an empty block", self.name))
        })?;
        *block = Some(fresh);
        Ok(id)
    }

    /// Ids left in the cached block (0 before the first refill).
    #[must_use]
    pub fn cached_remaining(&self) -> u64 {
        self.block.lock().as_ref().map_or(0, SequenceBlock::remaining)
    }
}

impl std::fmt::Debug for SequenceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceAllocator")
            .field("name", &self.name)
            .field("block_size", &self.block_size)
            .field("block", &*self.block.lock())
            .finish_non_exhaustive()
    }
}
