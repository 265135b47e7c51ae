//! Fixed-capacity descriptor table.
//!
//! Slots are handed out lowest index first. Each slot carries a generation
//! that advances whenever it is freed, so a [`Descriptor`] kept past its
//! `close` can never reach the next connection placed in the same slot.

use std::fmt;

/// Typed handle to an open slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor {
    index: u16,
    generation: u32,
}

impl Descriptor {
    /// Slot index; this is the descriptor id the guest sees.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when this descriptor was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Descriptor id as carried on the wire
    pub fn id(&self) -> i32 {
        i32::from(self.index)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd{}#{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<H> {
    generation: u32,
    handle: Option<H>,
}

/// Registry of live handles indexed by small integers
#[derive(Debug)]
pub struct DescriptorTable<H> {
    slots: Vec<Slot<H>>,
}

impl<H> DescriptorTable<H> {
    /// Create a table with `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(usize::from(u16::MAX));
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                handle: None,
            })
            .collect();
        Self { slots }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots in use
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.handle.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the first free slot
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.handle.is_none())
    }

    pub fn has_free_slot(&self) -> bool {
        self.first_free().is_some()
    }

    /// Store `handle` in the first free slot.
    ///
    /// Gives the handle back when the table is full.
    pub fn insert(&mut self, handle: H) -> Result<Descriptor, H> {
        let Some(index) = self.first_free() else {
            return Err(handle);
        };
        let slot = &mut self.slots[index];
        slot.handle = Some(handle);
        Ok(Descriptor {
            index: index as u16,
            generation: slot.generation,
        })
    }

    /// Current descriptor of the slot at `index`, if it is in use
    pub fn descriptor_at(&self, index: i32) -> Option<Descriptor> {
        let idx = usize::try_from(index).ok()?;
        let slot = self.slots.get(idx)?;
        slot.handle.as_ref().map(|_| Descriptor {
            index: idx as u16,
            generation: slot.generation,
        })
    }

    pub fn get(&self, desc: Descriptor) -> Option<&H> {
        self.slots
            .get(desc.index())
            .filter(|s| s.generation == desc.generation)
            .and_then(|s| s.handle.as_ref())
    }

    pub fn get_mut(&mut self, desc: Descriptor) -> Option<&mut H> {
        self.slots
            .get_mut(desc.index())
            .filter(|s| s.generation == desc.generation)
            .and_then(|s| s.handle.as_mut())
    }

    /// Free the slot behind `desc` and return its handle.
    ///
    /// Returns `None` for a stale or already-free descriptor.
    pub fn remove(&mut self, desc: Descriptor) -> Option<H> {
        let slot = self.slots.get_mut(desc.index())?;
        if slot.generation != desc.generation {
            return None;
        }
        let handle = slot.handle.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        Some(handle)
    }

    /// Free every slot, yielding the handles that were still live.
    pub fn drain(&mut self) -> impl Iterator<Item = (Descriptor, H)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let handle = slot.handle.take()?;
            let desc = Descriptor {
                index: index as u16,
                generation: slot.generation,
            };
            slot.generation = slot.generation.wrapping_add(1);
            Some((desc, handle))
        })
    }
}
