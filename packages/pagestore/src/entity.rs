//! Entity handles and the directory that issues them.
//!
//! The directory is a fixed-capacity array of records, a free list of unused
//! slots and a bitset of live slots. Each slot carries a generation that is
//! bumped whenever the slot is recycled, so handles to destroyed entities are
//! recognised as stale instead of aliasing whoever reuses the slot.

use std::fmt::{self, Debug, Display, Formatter};
use std::mem::size_of;

use crate::archetype::ArchetypeId;
use crate::bitset::SlotSet;
use crate::error::{StoreError, StoreResult};

/// An opaque handle to an entity.
///
/// The low 32 bits are the slot index, the high 32 bits the slot generation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle(u64);

impl EntityHandle {
    /// A handle which never refers to an entity.
    pub const NULL: EntityHandle = EntityHandle(u64::MAX);

    /// Size in bytes of a handle as stored in an archetype's entity stream.
    pub const SIZE: usize = size_of::<u64>();

    pub(crate) fn new(index: u32, generation: u32) -> EntityHandle {
        EntityHandle((generation as u64) << 32 | index as u64)
    }

    /// Reconstruct a handle from its raw bits.
    pub fn from_bits(bits: u64) -> EntityHandle {
        EntityHandle(bits)
    }

    /// Return the raw bits of this handle.
    pub fn to_bits(&self) -> u64 {
        self.0
    }

    /// Return the slot index of this handle.
    pub fn index(&self) -> u32 {
        self.0 as u32
    }

    /// Return the generation of this handle.
    pub fn generation(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns true if this is `EntityHandle::NULL`.
    pub fn is_null(&self) -> bool {
        *self == EntityHandle::NULL
    }

    pub(crate) fn to_bytes(&self) -> [u8; EntityHandle::SIZE] {
        self.0.to_ne_bytes()
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> EntityHandle {
        let mut raw = [0u8; EntityHandle::SIZE];
        raw.copy_from_slice(&bytes[..EntityHandle::SIZE]);
        EntityHandle(u64::from_ne_bytes(raw))
    }
}

impl Display for EntityHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

impl Debug for EntityHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHandle({})", self)
    }
}

/// Where an entity's data currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityRecord {
    pub archetype: ArchetypeId,
    pub row: usize,
}

/// The outcome of `list_alive`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AliveList {
    /// Handles written to the output buffer.
    pub written: usize,
    /// Entities alive at the time of the call.
    pub total: usize,
}

impl AliveList {
    /// Returns true if the output buffer was too small for every entity.
    pub fn is_truncated(&self) -> bool {
        self.written < self.total
    }
}

/// Issues and recycles entity slots.
pub(crate) struct EntityDirectory {
    generations: Vec<u32>,
    records: Vec<Option<EntityRecord>>,
    names: Vec<Option<String>>,
    free: Vec<u32>,
    alive: SlotSet,
}

impl EntityDirectory {
    /// Create a directory with `capacity` slots.
    pub fn new(capacity: usize) -> EntityDirectory {
        EntityDirectory {
            generations: vec![0; capacity],
            records: vec![None; capacity],
            names: vec![None; capacity],
            // Reversed so slot 0 is issued first.
            free: (0..capacity as u32).rev().collect(),
            alive: SlotSet::new(capacity),
        }
    }

    /// Return the number of live entities.
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    /// Return the total number of slots.
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }

    /// Take a slot off the free list and mark it alive.
    pub fn reserve(&mut self) -> StoreResult<EntityHandle> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                log::warn!("entity directory exhausted ({} slots)", self.capacity());
                return Err(StoreError::EntitiesExhausted);
            }
        };

        self.alive.set(index as usize);
        Ok(EntityHandle::new(index, self.generations[index as usize]))
    }

    /// Return a slot to the free list.
    ///
    /// The entity must already have been removed from its archetype.
    pub fn release(&mut self, entity: EntityHandle) -> StoreResult<()> {
        if !self.is_alive(entity) {
            return Err(StoreError::StaleEntity { op: "release", entity });
        }

        let index = entity.index() as usize;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.records[index] = None;
        self.names[index] = None;
        self.alive.clear(index);
        self.free.push(entity.index());
        Ok(())
    }

    /// Undo a `reserve` whose handle was never handed out.
    ///
    /// Unlike `release`, the slot keeps its generation.
    pub fn cancel(&mut self, entity: EntityHandle) {
        debug_assert!(self.is_alive(entity) && self.records[entity.index() as usize].is_none());
        self.alive.clear(entity.index() as usize);
        self.free.push(entity.index());
    }

    /// Returns true if the handle refers to a live entity of the current generation.
    pub fn is_alive(&self, entity: EntityHandle) -> bool {
        let index = entity.index() as usize;
        self.alive.test(index) && self.generations[index] == entity.generation()
    }

    /// Look up where a live entity is stored.
    pub fn record(&self, entity: EntityHandle) -> Option<EntityRecord> {
        if self.is_alive(entity) {
            self.records[entity.index() as usize]
        } else {
            None
        }
    }

    /// Update where an entity is stored.
    pub fn set_record(&mut self, entity: EntityHandle, record: EntityRecord) {
        debug_assert!(self.is_alive(entity), "set_record on dead entity {}", entity);
        self.records[entity.index() as usize] = Some(record);
    }

    /// Set the debug name of a live entity.
    pub fn set_name(&mut self, entity: EntityHandle, name: Option<String>) {
        debug_assert!(self.is_alive(entity));
        self.names[entity.index() as usize] = name;
    }

    /// Get the debug name of a live entity.
    pub fn name(&self, entity: EntityHandle) -> Option<&str> {
        if self.is_alive(entity) {
            self.names[entity.index() as usize].as_deref()
        } else {
            None
        }
    }

    /// Write the handles of live entities into `out`, in slot order.
    pub fn list_alive(&self, out: &mut [EntityHandle]) -> AliveList {
        let total = self.alive.len();
        let mut written = 0;

        for (slot, index) in out.iter_mut().zip(self.alive.iter()) {
            *slot = EntityHandle::new(index as u32, self.generations[index]);
            written += 1;
        }

        let list = AliveList { written, total };
        if list.is_truncated() {
            log::warn!("list_alive: buffer holds {} of {} live entities", written, total);
        }
        list
    }
}
