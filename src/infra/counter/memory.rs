//! In-memory counter for development and tests.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::{DurableCounter, SchedulerError};

/// Named counters held in process memory; values are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryCounter {
    values: Mutex<HashMap<String, u64>>,
}

impl InMemoryCounter {
    /// Create an empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `name` at `value` instead of zero.
    #[must_use]
    pub fn with_value(self, name: impl Into<String>, value: u64) -> Self {
        self.values.lock().insert(name.into(), value);
        self
    }

    /// Current value of `name`.
    #[must_use]
    pub fn current(&self, name: &str) -> u64 {
        self.values.lock().get(name).copied().unwrap_or(0)
    }
}

impl DurableCounter for InMemoryCounter {
    fn increment(&self, name: &str) -> Result<u64, SchedulerError> {
        let mut values = self.values.lock();
        let value = values.entry(name.to_string()).or_insert(0);
        let previous = *value;
        *value = previous.checked_add(1).ok_or_else(|| {
            SchedulerError::SequenceFetch(format!("counter `{name}` overflowed"))
        })?;
        Ok(previous)
    }
}
