//! Unique element ids.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Range of the random suffix appended to the element name.
pub const ID_SUFFIX_RANGE: RangeInclusive<u32> = 100_000..=999_999;

/// Default number of candidates tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 10_000;

/// Hands out ids that are unique for the lifetime of the allocator.
pub trait IdAllocator: Send + Sync {
    /// Returns a fresh id for an element called `element`.
    fn allocate(&self, element: &str) -> Result<String>;
}

static GLOBAL_REGISTRY: Lazy<Arc<IdRegistry>> = Lazy::new(|| Arc::new(IdRegistry::new()));

/// Random id allocator backed by a registry of every id it has issued.
///
/// Ids have the form `{element}_{n}` with `n` drawn from [`ID_SUFFIX_RANGE`].
/// The registry only grows.
#[derive(Debug)]
pub struct IdRegistry {
    issued: Mutex<HashSet<String>>,
    max_attempts: usize,
}

impl IdRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }

    /// Creates an empty registry that gives up after `max_attempts` colliding candidates.
    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            issued: Mutex::new(HashSet::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns the process-wide registry shared by converters that were not given their own.
    pub fn global() -> Arc<IdRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Number of ids issued so far.
    pub fn len(&self) -> usize {
        self.issued.lock().len()
    }

    /// Returns true if no id has been issued.
    pub fn is_empty(&self) -> bool {
        self.issued.lock().is_empty()
    }

    /// Returns true if `id` has been issued by this registry.
    pub fn contains(&self, id: &str) -> bool {
        self.issued.lock().contains(id)
    }

    /// Marks every possible id for `element` as issued.
    #[cfg(test)]
    pub(crate) fn exhaust(&self, element: &str) {
        let mut issued = self.issued.lock();
        for n in ID_SUFFIX_RANGE {
            issued.insert(format!("{}_{}", element, n));
        }
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator for IdRegistry {
    fn allocate(&self, element: &str) -> Result<String> {
        let mut rng = rand::thread_rng();
        // Held across the whole draw-check-insert sequence.
        let mut issued = self.issued.lock();

        for _ in 0..self.max_attempts {
            let candidate = format!("{}_{}", element, rng.gen_range(ID_SUFFIX_RANGE));
            if !issued.contains(&candidate) {
                tracing::trace!(id = %candidate, "allocated element id");
                issued.insert(candidate.clone());
                return Ok(candidate);
            }
        }

        tracing::warn!(element, attempts = self.max_attempts, "id space exhausted");
        Err(Error::id_space_exhausted(element, self.max_attempts))
    }
}
