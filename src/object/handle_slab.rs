// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle Arena
//!
//! The [`HandleSlab`] is a fixed-capacity arena of handle slots behind one
//! lock. It hands out slot indices, mints capability IDs for them, and
//! guarantees that a freed slot comes back with a strictly newer
//! generation, so an ID computed before the free can never name the next
//! occupant.
//!
//! # Capability ID Layout
//!
//! ```text
//!  31 30 29                     shift  shift-1            0
//! +-----+---------------------------+---------------------+
//! | 0 0 |        generation         |     slot index      |
//! +-----+---------------------------+---------------------+
//! ```
//!
//! `shift` is `log2(capacity)`. The two reserved bits are always zero so
//! handle values stay distinguishable from other kernel value spaces.
//!
//! # Design
//!
//! - **Fixed capacity**: set at construction; the arena never grows
//! - **Per-slot metadata**: generation and busy state live in a parallel
//!   array, never in the slot payload
//! - **Recycled slots first**: freed slots are reused LIFO; untouched slots
//!   are handed out in index order only once the free list is empty

use log::warn;

use crate::object::handle::CapabilityId;
use crate::sync::{SpinMutex, SpinMutexGuard};

/// Maximum number of live handles in the default arena
pub const MAX_HANDLE_COUNT: usize = 256 * 1024;

/// Warning level: crossing this many outstanding handles is logged
pub const HIGH_HANDLE_COUNT: usize = (MAX_HANDLE_COUNT * 7) / 8;

/// Number of always-zero high bits in a capability ID
pub const HANDLE_RESERVED_BITS: u32 = 2;

const RESERVED_MASK: u32 = !(u32::MAX >> HANDLE_RESERVED_BITS);

/// Largest supported capacity; leaves at least 8 generation bits
const MAX_CAPACITY_SHIFT: u32 = 32 - HANDLE_RESERVED_BITS - 8;

/// ============================================================================
/// Slots
/// ============================================================================

/// Index of an allocated arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawSlot(u32);

impl RawSlot {
    /// Slot index within the arena
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Metadata kept for every slot that has ever been handed out
#[derive(Debug, Clone, Copy)]
struct SlotMeta {
    /// Generation of the current occupant, or of the next one while free
    generation: u32,

    /// Whether a handle occupies the slot
    busy: bool,
}

/// Arena state guarded by the arena lock
#[derive(Debug)]
pub(crate) struct SlabState {
    /// Metadata for slots `0..slots.len()`; later slots are untouched
    slots: Vec<SlotMeta>,

    /// Recycled slot indices
    free: Vec<u32>,

    /// Live slot count
    outstanding: usize,

    /// Set while above the high-water mark, so the warning fires once
    above_high_water: bool,
}

/// ============================================================================
/// Handle Slab
/// ============================================================================

/// Fixed-capacity arena of handle slots
#[derive(Debug)]
pub struct HandleSlab {
    /// Number of slots
    capacity: usize,

    /// Outstanding count that triggers the high-water warning
    high_water: usize,

    /// `log2(capacity)`
    generation_shift: u32,

    /// Low bits selecting the slot
    index_mask: u32,

    /// Bits holding the generation (already shifted)
    generation_mask: u32,

    /// Slot bookkeeping
    state: SpinMutex<SlabState>,
}

impl HandleSlab {
    /// Create an arena with `capacity` slots
    ///
    /// # Panics
    ///
    /// If `capacity` is not a power of two in `2..=2^22`.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "handle arena capacity {} must be a power of two >= 2",
            capacity
        );
        let generation_shift = capacity.trailing_zeros();
        assert!(
            generation_shift <= MAX_CAPACITY_SHIFT,
            "handle arena capacity {} leaves no room for generations",
            capacity
        );

        let index_mask = (capacity - 1) as u32;
        let generation_mask = !index_mask & !RESERVED_MASK;

        Self {
            capacity,
            high_water: (capacity * 7) / 8,
            generation_shift,
            index_mask,
            generation_mask,
            state: SpinMutex::new(SlabState {
                slots: Vec::new(),
                free: Vec::new(),
                outstanding: 0,
                above_high_water: false,
            }),
        }
    }

    /// Create an arena with [`MAX_HANDLE_COUNT`] slots
    pub fn with_default_capacity() -> Self {
        Self::new(MAX_HANDLE_COUNT)
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live slots
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Allocate a slot
    ///
    /// Returns `None` when every slot is live.
    pub fn allocate(&self) -> Option<RawSlot> {
        let mut state = self.lock();
        self.allocate_locked(&mut state)
    }

    /// Return a slot to the arena, bumping its generation
    ///
    /// # Panics
    ///
    /// If the slot is not currently allocated.
    pub fn free(&self, slot: RawSlot) {
        let mut state = self.lock();
        self.free_locked(&mut state, slot);
    }

    /// Capability ID of an allocated slot
    ///
    /// # Panics
    ///
    /// If the slot is not currently allocated.
    pub fn id_for(&self, slot: RawSlot) -> CapabilityId {
        let state = self.lock();
        self.id_for_locked(&state, slot)
    }

    /// Find the live slot named by `id`
    ///
    /// Fails closed: reserved bits set, an out-of-range index, a free slot,
    /// or a generation that does not match the current occupant all return
    /// `None`.
    pub fn lookup(&self, id: CapabilityId) -> Option<RawSlot> {
        let state = self.lock();
        self.lookup_locked(&state, id)
    }

    /// Slot index encoded in `id`
    pub fn index_of(&self, id: CapabilityId) -> u32 {
        id.into_raw() & self.index_mask
    }

    /// Generation encoded in `id`
    pub fn generation_of(&self, id: CapabilityId) -> u32 {
        (id.into_raw() & self.generation_mask) >> self.generation_shift
    }

    pub(crate) fn lock(&self) -> SpinMutexGuard<'_, SlabState> {
        self.state.lock()
    }

    pub(crate) fn allocate_locked(&self, state: &mut SlabState) -> Option<RawSlot> {
        let index = if let Some(index) = state.free.pop() {
            index
        } else if state.slots.len() < self.capacity {
            state.slots.push(SlotMeta {
                generation: 1,
                busy: false,
            });
            (state.slots.len() - 1) as u32
        } else {
            warn!("handle arena exhausted ({} handles outstanding)", state.outstanding);
            return None;
        };

        let meta = &mut state.slots[index as usize];
        assert!(!meta.busy, "handle slot {} handed out twice", index);
        meta.busy = true;

        state.outstanding += 1;
        if state.outstanding > self.high_water && !state.above_high_water {
            state.above_high_water = true;
            warn!(
                "high handle count: {} of {} handles outstanding",
                state.outstanding, self.capacity
            );
        }

        Some(RawSlot(index))
    }

    pub(crate) fn free_locked(&self, state: &mut SlabState, slot: RawSlot) {
        let next = {
            let meta = state
                .slots
                .get_mut(slot.index() as usize)
                .unwrap_or_else(|| panic!("free of unknown handle slot {}", slot.index()));
            assert!(meta.busy, "double free of handle slot {}", slot.index());
            meta.busy = false;
            meta.generation = self.next_generation(meta.generation);
            slot.index()
        };
        state.free.push(next);

        state.outstanding -= 1;
        if state.outstanding <= self.high_water {
            state.above_high_water = false;
        }
    }

    pub(crate) fn id_for_locked(&self, state: &SlabState, slot: RawSlot) -> CapabilityId {
        let meta = state.slots[slot.index() as usize];
        assert!(meta.busy, "id requested for free handle slot {}", slot.index());
        self.pack(meta.generation, slot.index())
    }

    pub(crate) fn lookup_locked(&self, state: &SlabState, id: CapabilityId) -> Option<RawSlot> {
        let raw = id.into_raw();
        if raw & RESERVED_MASK != 0 {
            return None;
        }
        let index = raw & self.index_mask;
        let meta = state.slots.get(index as usize)?;
        if meta.busy && self.pack(meta.generation, index) == id {
            Some(RawSlot(index))
        } else {
            None
        }
    }

    fn pack(&self, generation: u32, index: u32) -> CapabilityId {
        let raw = ((generation << self.generation_shift) & self.generation_mask) | index;
        assert_eq!(raw & RESERVED_MASK, 0, "capability id reserved bits set");
        CapabilityId::from_raw(raw)
    }

    /// Successor generation; wraps past the field width, skipping zero
    fn next_generation(&self, generation: u32) -> u32 {
        let max = self.generation_mask >> self.generation_shift;
        let next = generation.wrapping_add(1) & max;
        if next == 0 {
            1
        } else {
            next
        }
    }
}

impl Default for HandleSlab {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

// ============================================================================
// Tests
// ============================================================================
