//! Change detection between settle passes

use std::fmt;

use crate::signal::{SignalId, SignalStore};

/// What changed during one settle pass
///
/// `regions` has bit `i % 64` set for every changed signal `i`. The count is
/// exact; the region bits only narrow down where to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeMask {
    regions: u64,
    count: usize,
}

impl ChangeMask {
    #[inline(always)]
    fn mark(&mut self, id: SignalId) {
        self.regions |= 1u64 << (id.index() % 64);
        self.count += 1;
    }

    pub fn any(&self) -> bool {
        self.count != 0
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn regions(&self) -> u64 {
        self.regions
    }

    pub fn touches(&self, id: SignalId) -> bool {
        self.regions & (1u64 << (id.index() % 64)) != 0
    }
}

impl fmt::Display for ChangeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} signals, regions {:#018x}", self.count, self.regions)
    }
}

/// Copy the tracked signals into `shadow`
pub fn snapshot(store: &SignalStore, tracked: &[SignalId], shadow: &mut [u64]) {
    for (slot, &id) in shadow.iter_mut().zip(tracked) {
        *slot = store.get(id);
    }
}

/// Compare tracked signals against `shadow`, then refresh `shadow`
///
/// Comparison is on the full stored word, so any single-bit difference is
/// reported.
pub fn detect_changes(store: &SignalStore, tracked: &[SignalId], shadow: &mut [u64]) -> ChangeMask {
    let mut mask = ChangeMask::default();
    for (slot, &id) in shadow.iter_mut().zip(tracked) {
        let now = store.get(id);
        if now != *slot {
            mask.mark(id);
            *slot = now;
        }
    }
    mask
}
