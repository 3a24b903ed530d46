//! Page-address cache (C3): the dispatch stage resolves each frame's column
//! addresses once and stores them here; every reduce worker that later
//! processes that frame reads the same resolved metadata instead of going
//! back through the factory. Write-once, read-many per slot, pre-sized to
//! the frame sequence's frame count so there's no resizing under
//! concurrent access.

use once_cell::sync::OnceCell;

use crate::interfaces::PageFrame;

pub struct PageAddressCache {
    slots: Vec<OnceCell<PageFrame>>,
}

impl PageAddressCache {
    pub fn with_capacity(frame_count: usize) -> Self {
        Self {
            slots: (0..frame_count).map(|_| OnceCell::new()).collect(),
        }
    }

    /// Resolve `frame_index`'s page frame. Idempotent: a second caller
    /// racing the first just gets the first write back.
    pub fn set(&self, frame_index: usize, frame: PageFrame) {
        let _ = self.slots[frame_index].set(frame);
    }

    pub fn get(&self, frame_index: usize) -> Option<&PageFrame> {
        self.slots[frame_index].get()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
