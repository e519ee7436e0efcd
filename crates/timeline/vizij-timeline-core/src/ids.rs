//! Identifiers and simple allocators for core entities.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Stable handle to a playable owned by an [`crate::Engine`].
    pub struct PlayableId;
}

/// Handle returned by `subscribe`, used to remove the observer again.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ObserverId(pub u32);

/// Monotonic allocator for ObserverId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_observer: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_observer(&mut self) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer = self.next_observer.wrapping_add(1);
        id
    }
}
