//! 8-bit up counter
//!
//! `count` powers on at `POWER_ON` and increments on each rising `clk` edge
//! while `en` is high. `o_wrap` is high while the count sits at 0xFF.

use crate::evaluator::Evaluator;
use crate::signal::{Layout, SignalDef, SignalId, SignalStore};

const CLK: SignalId = SignalId(0);
const EN: SignalId = SignalId(1);
const COUNT: SignalId = SignalId(2);
const O_COUNT: SignalId = SignalId(3);
const O_WRAP: SignalId = SignalId(4);

pub struct Counter;

impl Counter {
    pub const POWER_ON: u64 = 0x10;
}

impl Evaluator for Counter {
    fn layout(&self) -> Layout {
        Layout {
            signals: vec![
                SignalDef::input("clk", 1),
                SignalDef::input("en", 1),
                SignalDef::internal("count", 8),
                SignalDef::output("o_count", 8),
                SignalDef::output("o_wrap", 1),
            ],
            scratch: 0,
        }
    }

    fn clocks(&self) -> &[SignalId] {
        &[CLK]
    }

    // count only moves in `sequential`, and `combo` reruns after it in the
    // same pass.
    fn change_set(&self, _store: &SignalStore) -> Vec<SignalId> {
        Vec::new()
    }

    fn initial(&self, store: &mut SignalStore) {
        store.set(COUNT, Self::POWER_ON);
    }

    fn combo(&self, store: &mut SignalStore) {
        let count = store.get(COUNT);
        store.set(O_COUNT, count);
        store.set(O_WRAP, (count == 0xFF) as u64);
    }

    fn sequential(&self, _rising: &[usize], store: &mut SignalStore) {
        if store.get(EN) != 0 {
            store.set(COUNT, store.get(COUNT).wrapping_add(1));
        }
    }
}
