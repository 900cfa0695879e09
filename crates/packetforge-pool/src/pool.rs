//! The pool itself and its checkout handle.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::PoolError;

/// Objects that can be reset before going back into a pool.
///
/// `recycle` runs on release, so the next checkout always sees a clean
/// object. Implementations should clear contents but keep allocations
/// (e.g. `Vec::clear`, not `Vec::new`).
pub trait Recycle {
    /// Resets the object to its freshly-constructed state.
    fn recycle(&mut self);
}

impl Recycle for Vec<u8> {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// Counters describing a pool's usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Fixed number of slots.
    pub capacity: usize,
    /// Slots currently checked out.
    pub outstanding: usize,
    /// Highest `outstanding` value ever observed.
    pub peak_outstanding: usize,
    /// Successful checkouts since creation.
    pub checkouts: u64,
    /// Checkouts refused because the pool was empty.
    pub exhausted: u64,
}

struct Slots<T> {
    slots: Vec<Option<Box<T>>>,
    free: Vec<usize>,
    stats: PoolStats,
}

struct Shared<T> {
    name: &'static str,
    inner: Mutex<Slots<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        // A panic while holding the lock can only come from the
        // double-release assertion, which already aborts the invariant.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed-capacity pool of reusable objects.
///
/// Cloning the pool is cheap and yields another handle to the same
/// slots, so codec instances for different connections can share one
/// pool.
pub struct ObjectPool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Recycle + Send> ObjectPool<T> {
    /// Creates a pool with `capacity` objects built by `make`.
    ///
    /// All objects are allocated up front; nothing is allocated on
    /// checkout or release.
    pub fn new(name: &'static str, capacity: usize, mut make: impl FnMut() -> T) -> Self {
        let slots = (0..capacity).map(|_| Some(Box::new(make()))).collect();
        // Reverse so slot 0 is handed out first.
        let free = (0..capacity).rev().collect();
        tracing::debug!(pool = name, capacity, "object pool created");
        Self {
            shared: Arc::new(Shared {
                name,
                inner: Mutex::new(Slots {
                    slots,
                    free,
                    stats: PoolStats {
                        capacity,
                        ..PoolStats::default()
                    },
                }),
            }),
        }
    }

    /// Checks an object out of the pool.
    ///
    /// # Errors
    /// Returns [`PoolError::Exhausted`] when every slot is in use. This
    /// never blocks waiting for a release.
    pub fn checkout(&self) -> Result<Pooled<T>, PoolError> {
        let mut inner = self.shared.lock();
        let Some(slot) = inner.free.pop() else {
            inner.stats.exhausted += 1;
            let capacity = inner.stats.capacity;
            drop(inner);
            tracing::warn!(pool = self.shared.name, capacity, "object pool exhausted");
            return Err(PoolError::Exhausted {
                name: self.shared.name,
                capacity,
            });
        };

        let Some(value) = inner.slots[slot].take() else {
            unreachable!(
                "pool `{}`: free slot {slot} is empty; every free-list index points at an occupied slot",
                self.shared.name
            );
        };
        let stats = &mut inner.stats;
        stats.checkouts += 1;
        stats.outstanding += 1;
        stats.peak_outstanding = stats.peak_outstanding.max(stats.outstanding);

        Ok(Pooled {
            value: Some(value),
            origin: Some(Origin {
                shared: Arc::clone(&self.shared),
                slot,
            }),
        })
    }
}

impl<T> ObjectPool<T> {
    /// The pool's name, as used in logs.
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.shared.lock().stats.capacity
    }

    /// Number of objects currently checked out.
    pub fn outstanding(&self) -> usize {
        self.shared.lock().stats.outstanding
    }

    /// Number of objects ready to be checked out.
    pub fn available(&self) -> usize {
        self.shared.lock().free.len()
    }

    /// Snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        self.shared.lock().stats
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("name", &self.shared.name)
            .field("stats", &self.stats())
            .finish()
    }
}

struct Origin<T> {
    shared: Arc<Shared<T>>,
    slot: usize,
}

/// A checked-out object, or a detached one that belongs to no pool.
///
/// Dereferences to `T`. When a pooled handle is released (or simply
/// dropped) the object is recycled and its slot becomes free again; a
/// detached handle just frees its object.
pub struct Pooled<T: Recycle> {
    value: Option<Box<T>>,
    origin: Option<Origin<T>>,
}

impl<T: Recycle> Pooled<T> {
    /// Wraps a freshly allocated object that is not backed by any pool.
    ///
    /// Used for outbound packets built by application code.
    pub fn detached(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
            origin: None,
        }
    }

    /// Returns `true` if this handle came from a pool checkout.
    pub fn is_pooled(&self) -> bool {
        self.origin.is_some()
    }

    /// The slot index this handle occupies, if pooled.
    pub fn slot(&self) -> Option<usize> {
        self.origin.as_ref().map(|o| o.slot)
    }

    /// Returns the object to its pool (or frees it, if detached).
    ///
    /// Consuming `self` is what makes a second release impossible.
    pub fn release(self) {
        drop(self);
    }

    fn give_back(&mut self) {
        let Some(mut value) = self.value.take() else {
            return;
        };
        let Some(origin) = self.origin.take() else {
            return;
        };
        value.recycle();

        let mut inner = origin.shared.lock();
        let slot = &mut inner.slots[origin.slot];
        assert!(
            slot.is_none(),
            "pool `{}`: slot {} released twice",
            origin.shared.name,
            origin.slot
        );
        *slot = Some(value);
        inner.free.push(origin.slot);
        inner.stats.outstanding -= 1;
        tracing::trace!(pool = origin.shared.name, slot = origin.slot, "object returned to pool");
    }
}

impl<T: Recycle> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.value.as_deref() {
            Some(value) => value,
            // Only `give_back` takes the value, and it consumes the handle.
            None => unreachable!("pooled value is present until release"),
        }
    }
}

impl<T: Recycle> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.value.as_deref_mut() {
            Some(value) => value,
            None => unreachable!("pooled value is present until release"),
        }
    }
}

impl<T: Recycle> Drop for Pooled<T> {
    fn drop(&mut self) {
        self.give_back();
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("slot", &self.slot())
            .field("value", &self.value)
            .finish()
    }
}

impl<T: Recycle + PartialEq> PartialEq for Pooled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
