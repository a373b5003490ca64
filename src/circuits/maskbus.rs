//! Switch bank wired straight to the LEDs: `o_led = i_sw`

use crate::evaluator::Evaluator;
use crate::signal::{Layout, SignalDef, SignalId, SignalStore};

const I_SW: SignalId = SignalId(0);
const O_LED: SignalId = SignalId(1);

pub struct MaskBus;

impl Evaluator for MaskBus {
    fn layout(&self) -> Layout {
        Layout {
            signals: vec![SignalDef::input("i_sw", 8), SignalDef::output("o_led", 8)],
            scratch: 0,
        }
    }

    // Nothing reads o_led back, so no pass can invalidate another.
    fn change_set(&self, _store: &SignalStore) -> Vec<SignalId> {
        Vec::new()
    }

    fn combo(&self, store: &mut SignalStore) {
        store.set(O_LED, store.get(I_SW));
    }
}
