//! Entry pool
//!
//! A slab arena handing out generation-checked [`Handle`]s. The route cache
//! and the request table keep their entries here and thread their intrusive
//! lists through handles instead of pointers, so an entry can be unlinked
//! from every list it belongs to and then freed without leaving anything
//! dangling. Storage grows in chunks to keep reallocation rare.

use std::ops::{Index, IndexMut};

/// Index of a live entry in an [`EntryPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Arena with free-list reuse
#[derive(Debug)]
pub struct EntryPool<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
    chunk: usize,
}

impl<T> EntryPool<T> {
    /// Create a pool that grows `chunk` slots at a time
    pub fn with_chunk(chunk: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
            chunk: chunk.max(1),
        }
    }

    /// Store a value and return its handle
    pub fn insert(&mut self, value: T) -> Handle {
        self.len += 1;

        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            if let Slot::Vacant {
                generation,
                next_free,
            } = *slot
            {
                let generation = generation.wrapping_add(1);
                *slot = Slot::Occupied { generation, value };
                self.free_head = next_free;
                return Handle { index, generation };
            }
            unreachable!("free list points at an occupied slot");
        }

        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve_exact(self.chunk);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        Handle {
            index,
            generation: 0,
        }
    }

    /// Free an entry, returning its value. Stale handles return `None`.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        let live = matches!(
            slot,
            Slot::Occupied { generation, .. } if *generation == handle.generation
        );
        if !live {
            return None;
        }

        let vacant = Slot::Vacant {
            generation: handle.generation,
            next_free: self.free_head,
        };
        match std::mem::replace(slot, vacant) {
            Slot::Occupied { value, .. } => {
                self.free_head = Some(handle.index);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots allocated so far, live or free
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Iterate over live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => Some((
                    Handle {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }

    /// Drop every entry, keeping the allocation
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.len = 0;
    }
}

/// # Panics
///
/// Panics if the handle is stale, like indexing a `Vec` out of bounds.
impl<T> Index<Handle> for EntryPool<T> {
    type Output = T;

    fn index(&self, handle: Handle) -> &T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!("stale pool handle {:?}", handle),
        }
    }
}

impl<T> IndexMut<Handle> for EntryPool<T> {
    fn index_mut(&mut self, handle: Handle) -> &mut T {
        match self.get_mut(handle) {
            Some(value) => value,
            None => panic!("stale pool handle {:?}", handle),
        }
    }
}
