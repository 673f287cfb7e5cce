//! Reusable-index tables.
//!
//! `SlotAllocator` backs the descriptor table, the handle table and each
//! mount's node table. Allocation always hands out the lowest free index,
//! preferring a previously freed index over growing the table. The table
//! does no locking of its own; owners serialize access.
//!
//! Every slot also carries a generation counter that is bumped when the slot
//! is freed. A `SlotHandle` remembers the generation it was issued under, so
//! a handle that outlived its slot is rejected instead of silently aliasing
//! whatever was allocated there next.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    index: usize,
    generation: u32,
}

impl SlotHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct SlotAllocator<T> {
    slots: Vec<Slot<T>>,
    // min-heap of freed indices
    free: BinaryHeap<Reverse<usize>>,
    live: usize,
}

impl<T> Default for SlotAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotAllocator<T> {
    pub fn new() -> Self {
        SlotAllocator {
            slots: Vec::new(),
            free: BinaryHeap::new(),
            live: 0,
        }
    }

    /// Allocates a default-constructed value and returns its index.
    pub fn alloc(&mut self) -> usize
    where
        T: Default,
    {
        self.insert(T::default())
    }

    /// Stores `value` at the lowest free index.
    pub fn insert(&mut self, value: T) -> usize {
        self.insert_handle(value).index
    }

    pub fn insert_handle(&mut self, value: T) -> SlotHandle {
        self.live += 1;
        while let Some(Reverse(index)) = self.free.pop() {
            // insert_at may have claimed an index that is still queued here
            let slot = &mut self.slots[index];
            if slot.value.is_none() {
                slot.value = Some(value);
                return SlotHandle {
                    index,
                    generation: slot.generation,
                };
            }
        }
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        SlotHandle {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    /// Claims a specific index, growing the table if needed. Fails and
    /// hands the value back if the index is already occupied.
    pub fn insert_at(&mut self, index: usize, value: T) -> Result<SlotHandle, T> {
        if index < self.slots.len() && self.slots[index].value.is_some() {
            return Err(value);
        }
        while self.slots.len() <= index {
            let gap = self.slots.len();
            self.slots.push(Slot {
                generation: 0,
                value: None,
            });
            if gap != index {
                self.free.push(Reverse(gap));
            }
        }
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.live += 1;
        Ok(SlotHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Destroys the value at `index` and makes the index reusable. Freeing a
    /// free or out-of-range index does nothing.
    pub fn free(&mut self, index: usize) -> Option<T> {
        let slot = self.slots.get_mut(index)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(Reverse(index));
        self.live -= 1;
        Some(value)
    }

    pub fn free_handle(&mut self, handle: SlotHandle) -> Option<T> {
        if self.get(handle).is_none() {
            return None;
        }
        self.free(handle.index)
    }

    pub fn at(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.value.as_ref()
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.value.as_mut()
    }

    /// Current handle for an occupied index.
    pub fn handle_of(&self, index: usize) -> Option<SlotHandle> {
        let slot = self.slots.get(index)?;
        slot.value.as_ref()?;
        Some(SlotHandle {
            index,
            generation: slot.generation,
        })
    }

    pub fn get(&self, handle: SlotHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: SlotHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.value.as_ref().map(|v| (i, v)))
    }

    pub fn indices(&self) -> Vec<usize> {
        self.iter().map(|(i, _)| i).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_freed_index() {
        let mut slots: SlotAllocator<i32> = SlotAllocator::new();
        assert_eq!(slots.alloc(), 0);
        assert_eq!(slots.alloc(), 1);
        assert_eq!(slots.free(0), Some(0));
        assert_eq!(slots.alloc(), 0);
        assert_eq!(slots.alloc(), 2);
    }

    #[test]
    fn test_lowest_freed_first() {
        let mut slots = SlotAllocator::new();
        for i in 0..5 {
            assert_eq!(slots.insert(i * 10), i as usize);
        }
        slots.free(3);
        slots.free(1);
        slots.free(4);
        assert_eq!(slots.insert(11), 1);
        assert_eq!(slots.insert(33), 3);
        assert_eq!(slots.insert(44), 4);
        assert_eq!(slots.insert(55), 5);
        assert_eq!(slots.at(3), Some(&33));
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut slots = SlotAllocator::new();
        slots.insert("a");
        assert_eq!(slots.free(0), Some("a"));
        assert_eq!(slots.free(0), None);
        assert_eq!(slots.free(17), None);
        assert_eq!(slots.len(), 0);
        // a doubly freed index must not be handed out twice
        assert_eq!(slots.insert("b"), 0);
        assert_eq!(slots.insert("c"), 1);
    }

    #[test]
    fn test_at_rejects_free_and_out_of_range() {
        let mut slots = SlotAllocator::new();
        slots.insert(1u8);
        slots.insert(2u8);
        slots.free(1);
        assert_eq!(slots.at(0), Some(&1));
        assert_eq!(slots.at(1), None);
        assert_eq!(slots.at(99), None);
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut slots = SlotAllocator::new();
        let first = slots.insert_handle("old");
        slots.free_handle(first);
        let second = slots.insert_handle("new");
        assert_eq!(first.index(), second.index());
        assert_eq!(slots.get(first), None);
        assert_eq!(slots.get(second), Some(&"new"));
        assert_eq!(slots.free_handle(first), None);
        assert_eq!(slots.at(second.index()), Some(&"new"));
        assert_eq!(slots.handle_of(second.index()), Some(second));
        slots.free_handle(second);
        assert_eq!(slots.handle_of(second.index()), None);
    }

    #[test]
    fn test_insert_at() {
        let mut slots = SlotAllocator::new();
        slots.insert('a');
        assert!(slots.insert_at(3, 'd').is_ok());
        assert_eq!(slots.insert_at(3, 'x'), Err('x'));
        assert_eq!(slots.insert('b'), 1);
        assert_eq!(slots.insert('c'), 2);
        assert_eq!(slots.insert('e'), 4);
        assert_eq!(slots.indices(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_insert_at_claims_queued_index() {
        let mut slots = SlotAllocator::new();
        slots.insert(0);
        slots.insert(1);
        slots.free(0);
        assert!(slots.insert_at(0, 5).is_ok());
        assert_eq!(slots.insert(6), 2);
        assert_eq!(slots.at(0), Some(&5));
    }
}
