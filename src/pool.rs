//! Fixed-capacity, generation-checked object pool.
//!
//! Stands in for the original's per-thread pool of pair slots plus the
//! intrusive freelist that threads them together (Design Notes §9, "Object
//! pools with intrusive lists"). A flat `Vec<usize>` freelist already gives
//! O(1) allocate/free; the generation counter catches a `Handle` into a
//! slot that has since been freed and reused, which an intrusive
//! `next`-pointer port would otherwise silently get wrong.

use crate::error::EngineError;

/// A handle into a `Pool`. Opaque to callers; stable across the pool's
/// internal `Vec` reallocating and safe against reuse of a freed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    slot: usize,
    generation: u64,
}

struct Slot<T> {
    value: Option<T>,
    generation: u64,
}

/// A fixed-capacity pool of `T`, addressed by `Handle`.
///
/// Exhaustion returns `Err(EngineError::PoolExhausted)` rather than
/// panicking (REDESIGN FLAG 1 / spec.md §9.4): the engine expects pools to
/// be pre-provisioned for peak concurrency, but a caller that hits the
/// limit gets a recoverable error instead of an aborted process.
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    capacity: usize,
}

impl<T> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                value: None,
                generation: 0,
            })
            .collect();
        let free = (0..capacity).rev().collect();
        Self {
            slots,
            free,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.capacity - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&mut self, value: T) -> Result<Handle, EngineError> {
        let slot = self.free.pop().ok_or(EngineError::PoolExhausted {
            capacity: self.capacity,
        })?;
        self.slots[slot].value = Some(value);
        Ok(Handle {
            slot,
            generation: self.slots[slot].generation,
        })
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let s = self.slots.get_mut(handle.slot)?;
        if s.generation != handle.generation {
            return None;
        }
        let value = s.value.take();
        if value.is_some() {
            s.generation = s.generation.wrapping_add(1);
            self.free.push(handle.slot);
        }
        value
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        let s = self.slots.get(handle.slot)?;
        if s.generation != handle.generation {
            return None;
        }
        s.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let s = self.slots.get_mut(handle.slot)?;
        if s.generation != handle.generation {
            return None;
        }
        s.value.as_mut()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_is_recoverable_not_fatal() {
        let mut pool: Pool<u32> = Pool::with_capacity(2);
        pool.insert(1).unwrap();
        pool.insert(2).unwrap();
        let err = pool.insert(3).unwrap_err();
        assert_eq!(err, EngineError::PoolExhausted { capacity: 2 });
    }

    #[test]
    fn stale_handle_after_reuse_does_not_alias() {
        let mut pool: Pool<u32> = Pool::with_capacity(1);
        let h1 = pool.insert(10).unwrap();
        pool.remove(h1);
        let h2 = pool.insert(20).unwrap();
        assert_eq!(pool.get(h1), None);
        assert_eq!(pool.get(h2), Some(&20));
    }
}
