//! Design evaluator interface
//!
//! A concrete circuit plugs into the kernel by implementing `Evaluator`. The
//! kernel owns all mutable state; an evaluator only describes the storage it
//! needs and the update rules that run against that storage.

use std::sync::Arc;

use crate::signal::{Direction, Layout, SignalId, SignalStore};

pub trait Evaluator {
    /// Signals and scratch space of one instance. Called once per model.
    fn layout(&self) -> Layout;

    /// Clock signals, in the order `sequential` receives them
    fn clocks(&self) -> &[SignalId] {
        &[]
    }

    /// Signals whose change forces another settle pass.
    ///
    /// Defaults to every output and internal signal.
    fn change_set(&self, store: &SignalStore) -> Vec<SignalId> {
        store
            .ids()
            .filter(|&id| store.def(id).direction != Direction::In)
            .collect()
    }

    /// Power-on values that are not zero
    fn initial(&self, _store: &mut SignalStore) {}

    /// Combinational work run once after the initial blocks
    fn settle(&self, store: &mut SignalStore) {
        self.combo(store);
    }

    /// Every combinational rule, once, in the design's fixed order
    fn combo(&self, store: &mut SignalStore);

    /// Sequential logic for the clocks that rose this pass.
    ///
    /// `rising` holds indices into `clocks()`. Every register sampled on
    /// one of these edges must see pre-edge values.
    fn sequential(&self, _rising: &[usize], _store: &mut SignalStore) {}

    /// End-of-simulation blocks
    fn finish(&self, _store: &mut SignalStore) {}

    /// Design-specific consistency checks
    fn check(&self, _store: &SignalStore) -> Result<(), String> {
        Ok(())
    }
}

macro_rules! forward_evaluator {
    ($ptr:ident) => {
        impl<E: Evaluator + ?Sized> Evaluator for $ptr<E> {
            fn layout(&self) -> Layout {
                (**self).layout()
            }
            fn clocks(&self) -> &[SignalId] {
                (**self).clocks()
            }
            fn change_set(&self, store: &SignalStore) -> Vec<SignalId> {
                (**self).change_set(store)
            }
            fn initial(&self, store: &mut SignalStore) {
                (**self).initial(store)
            }
            fn settle(&self, store: &mut SignalStore) {
                (**self).settle(store)
            }
            fn combo(&self, store: &mut SignalStore) {
                (**self).combo(store)
            }
            fn sequential(&self, rising: &[usize], store: &mut SignalStore) {
                (**self).sequential(rising, store)
            }
            fn finish(&self, store: &mut SignalStore) {
                (**self).finish(store)
            }
            fn check(&self, store: &SignalStore) -> Result<(), String> {
                (**self).check(store)
            }
        }
    };
}

forward_evaluator!(Box);
forward_evaluator!(Arc);
