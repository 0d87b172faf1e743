//! Fixed-capacity pool of uniform records addressed by integer handles.
//!
//! Slots are handed out from a free list first and from the untouched tail
//! (below the high-water mark) second. Nothing is ever returned to the
//! allocator while the pool lives; [`NodeArena::reset`] reclaims every slot
//! at once.

use std::fmt;

/// Handle to a record inside a [`NodeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    /// Slot index of this handle.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    /// Every slot is in use.
    #[error("all {capacity} slots are in use")]
    OutOfCapacity {
        /// Fixed capacity of the arena.
        capacity: usize,
    },
}

#[derive(Debug)]
enum Slot<T> {
    Occupied(T),
    Vacant { next_free: Option<u32> },
}

/// Fixed-capacity record pool with O(1) allocate and free.
#[derive(Debug)]
pub struct NodeArena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    capacity: usize,
    len: usize,
}

impl<T> NodeArena<T> {
    /// Create an arena able to hold `capacity` records.
    ///
    /// Storage is reserved up front so allocation never reallocates.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity <= u32::MAX as usize, "arena capacity exceeds handle range");
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            capacity,
            len: 0,
        }
    }

    /// Store `record` and return its handle.
    pub fn allocate(&mut self, record: T) -> Result<NodeHandle, ArenaError> {
        if let Some(head) = self.free_head {
            let slot = &mut self.slots[head as usize];
            let Slot::Vacant { next_free } = *slot else {
                unreachable!("free list points at an occupied slot");
            };
            self.free_head = next_free;
            *slot = Slot::Occupied(record);
            self.len += 1;
            return Ok(NodeHandle(head));
        }

        if self.slots.len() >= self.capacity {
            return Err(ArenaError::OutOfCapacity {
                capacity: self.capacity,
            });
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied(record));
        self.len += 1;
        Ok(NodeHandle(index))
    }

    /// Return a slot to the free list and hand back its record.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not refer to a live record.
    pub fn free(&mut self, handle: NodeHandle) -> T {
        let slot = &mut self.slots[handle.index()];
        let vacant = Slot::Vacant {
            next_free: self.free_head,
        };
        match std::mem::replace(slot, vacant) {
            Slot::Occupied(record) => {
                self.free_head = Some(handle.0);
                self.len -= 1;
                record
            }
            Slot::Vacant { next_free } => {
                *slot = Slot::Vacant { next_free };
                panic!("double free of arena slot {handle}");
            }
        }
    }

    /// Borrow the record behind `handle`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is vacant.
    #[must_use]
    pub fn get(&self, handle: NodeHandle) -> &T {
        match &self.slots[handle.index()] {
            Slot::Occupied(record) => record,
            Slot::Vacant { .. } => panic!("arena slot {handle} is vacant"),
        }
    }

    /// Mutably borrow the record behind `handle`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is vacant.
    pub fn get_mut(&mut self, handle: NodeHandle) -> &mut T {
        match &mut self.slots[handle.index()] {
            Slot::Occupied(record) => record,
            Slot::Vacant { .. } => panic!("arena slot {handle} is vacant"),
        }
    }

    /// Whether `handle` currently refers to a live record.
    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        matches!(self.slots.get(handle.index()), Some(Slot::Occupied(_)))
    }

    /// First live record in slot order.
    #[must_use]
    pub fn first(&self) -> Option<NodeHandle> {
        self.scan_from(0)
    }

    /// Next live record after `handle` in slot order.
    ///
    /// Skips vacant slots, so a full walk costs O(high-water mark).
    #[must_use]
    pub fn next(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.scan_from(handle.index() + 1)
    }

    fn scan_from(&self, start: usize) -> Option<NodeHandle> {
        self.slots
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, slot)| matches!(slot, Slot::Occupied(_)))
            .map(|(i, _)| NodeHandle(i as u32))
    }

    /// Drop every record and rewind to an empty pool.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.len = 0;
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no record is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of live records.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest number of slots ever touched since the last reset.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.slots.len()
    }
}
