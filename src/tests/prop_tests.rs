// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Property Tests for the Handle Arena
//!
//! - Live capability IDs are pairwise distinct
//! - Reusing a slot strictly raises its generation; stale IDs never resolve
//! - The outstanding count equals allocations minus frees
//! - Duplication never widens rights

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use crate::object::{CapabilityId, EventDispatcher, HandleSlab, RawSlot, Rights};

#[derive(Debug, Clone)]
enum Op {
    Allocate,
    Free(usize),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            3 => Just(Op::Allocate),
            2 => any::<usize>().prop_map(Op::Free),
        ],
        0..200,
    )
}

fn arb_rights() -> impl Strategy<Value = Rights> {
    (0u32..=0xffff).prop_map(Rights::from_bits_truncate)
}

proptest! {
    #[test]
    fn live_ids_unique_and_counted(capacity_shift in 1u32..6, ops in arb_ops()) {
        let slab = HandleSlab::new(1 << capacity_shift);
        let mut live: Vec<(RawSlot, CapabilityId)> = Vec::new();
        let mut stale: Vec<CapabilityId> = Vec::new();
        let mut last_generation: HashMap<u32, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Allocate => match slab.allocate() {
                    Some(slot) => {
                        let id = slab.id_for(slot);
                        prop_assert_eq!(id.into_raw() >> 30, 0);
                        prop_assert!(live.iter().all(|(_, other)| *other != id));

                        let generation = slab.generation_of(id);
                        if let Some(previous) = last_generation.insert(slot.index(), generation) {
                            prop_assert!(generation > previous);
                        }
                        live.push((slot, id));
                    }
                    None => prop_assert_eq!(live.len(), slab.capacity()),
                },
                Op::Free(pick) => {
                    if !live.is_empty() {
                        let (slot, id) = live.swap_remove(pick % live.len());
                        slab.free(slot);
                        stale.push(id);
                    }
                }
            }

            prop_assert_eq!(slab.outstanding(), live.len());
            prop_assert!(slab.outstanding() <= slab.capacity());
        }

        for (slot, id) in &live {
            prop_assert_eq!(slab.lookup(*id), Some(*slot));
        }
        for id in &stale {
            prop_assert_eq!(slab.lookup(*id), None);
        }
    }

    #[test]
    fn dup_never_widens_rights(base in arb_rights(), mask in arb_rights()) {
        let slab = Arc::new(HandleSlab::new(8));
        let source = slab.make_handle(EventDispatcher::create(), base).unwrap();

        let requested = base & mask;
        let dup = slab.dup_handle(&source, requested, false).unwrap();
        prop_assert_eq!(dup.rights(), requested);
        prop_assert!(source.rights().contains(dup.rights()));
        prop_assert_ne!(dup.id(), source.id());
    }

    #[test]
    fn lookup_rejects_reserved_bits(raw in any::<u32>()) {
        let slab = HandleSlab::new(16);
        let slot = slab.allocate().unwrap();
        let id = slab.id_for(slot);

        let forged = CapabilityId::from_raw(raw | (1 << 31));
        prop_assert_eq!(slab.lookup(forged), None);
        prop_assert_eq!(slab.lookup(id), Some(slot));
    }
}
