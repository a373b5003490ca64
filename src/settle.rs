//! Combinational settle loop
//!
//! A single pass over the combinational rules can leave a net computed from
//! a value that a later rule changed. The loop reruns passes until the
//! tracked signals stop changing. A design that keeps changing past
//! `MAX_SETTLE_PASSES` has a combinational cycle and fails loudly.

use std::fmt;

use tracing::{debug, error, trace};

use crate::change::{detect_changes, snapshot, ChangeMask};
use crate::error::{KernelError, Result};
use crate::evaluator::Evaluator;
use crate::syms::SymbolTable;

/// Passes allowed before a settle is declared non-convergent
pub const MAX_SETTLE_PASSES: u32 = 100;

/// Which settle loop failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePhase {
    /// Settle following the initial blocks
    Initial,
    /// Settle of a regular eval
    Eval,
}

impl fmt::Display for SettlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlePhase::Initial => write!(f, "initial"),
            SettlePhase::Eval => write!(f, "eval"),
        }
    }
}

/// One pass: every combinational rule once, then sequential blocks for the
/// clocks that rose, then the combinational rules again so nets see the
/// committed registers.
fn run_pass<E: Evaluator + ?Sized>(syms: &mut SymbolTable, evaluator: &E) {
    evaluator.combo(&mut syms.store);

    syms.rising.clear();
    for i in 0..syms.clocks.len() {
        let now = syms.store.get(syms.clocks[i]);
        let was = syms.clock_last[i];
        syms.clock_last[i] = now;
        if was == 0 && now != 0 {
            syms.rising.push(i);
        }
    }
    if !syms.rising.is_empty() {
        trace!(clocks = ?syms.rising, "rising edges");
        evaluator.sequential(&syms.rising, &mut syms.store);
        evaluator.combo(&mut syms.store);
    }
}

/// Run passes until nothing tracked changes. Returns the pass count.
pub fn settle<E: Evaluator + ?Sized>(syms: &mut SymbolTable, evaluator: &E, phase: SettlePhase) -> Result<u32> {
    snapshot(&syms.store, &syms.tracked, &mut syms.shadow);

    let mut passes = 0u32;
    loop {
        run_pass(syms, evaluator);
        passes += 1;

        let mask = detect_changes(&syms.store, &syms.tracked, &mut syms.shadow);
        if !mask.any() {
            debug!(model = syms.name(), %phase, passes, "settled");
            return Ok(passes);
        }
        trace!(pass = passes, changed = mask.count(), regions = mask.regions(), "pass changed signals");

        if passes >= MAX_SETTLE_PASSES {
            return Err(non_convergence(syms, phase, passes, mask));
        }
    }
}

fn non_convergence(syms: &SymbolTable, phase: SettlePhase, passes: u32, mask: ChangeMask) -> KernelError {
    error!(model = syms.name(), %phase, passes, %mask, "settle did not converge");
    KernelError::NonConvergence {
        model: syms.name().to_string(),
        phase,
        passes,
        mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Layout, SignalDef, SignalId, SignalStore};

    /// b = a; c = b, evaluated in the wrong order so each pass moves the
    /// value one stage.
    struct Reversed;

    const A: SignalId = SignalId(0);
    const B: SignalId = SignalId(1);
    const C: SignalId = SignalId(2);

    impl Evaluator for Reversed {
        fn layout(&self) -> Layout {
            Layout {
                signals: vec![SignalDef::input("a", 8), SignalDef::internal("b", 8), SignalDef::output("c", 8)],
                scratch: 0,
            }
        }

        fn combo(&self, store: &mut SignalStore) {
            store.set(C, store.get(B));
            store.set(B, store.get(A));
        }
    }

    /// Toggles `n` every pass
    struct Inverter;

    impl Evaluator for Inverter {
        fn layout(&self) -> Layout {
            Layout { signals: vec![SignalDef::internal("n", 1)], scratch: 0 }
        }

        fn combo(&self, store: &mut SignalStore) {
            let n = SignalId(0);
            store.set(n, !store.get(n));
        }
    }

    /// n = d; r samples n on the rising edge of clk
    struct Sampler;

    const CLK: SignalId = SignalId(0);
    const D: SignalId = SignalId(1);
    const N: SignalId = SignalId(2);
    const R: SignalId = SignalId(3);

    impl Evaluator for Sampler {
        fn layout(&self) -> Layout {
            Layout {
                signals: vec![
                    SignalDef::input("clk", 1),
                    SignalDef::input("d", 1),
                    SignalDef::internal("n", 1),
                    SignalDef::output("r", 1),
                ],
                scratch: 0,
            }
        }

        fn clocks(&self) -> &[SignalId] {
            &[CLK]
        }

        fn combo(&self, store: &mut SignalStore) {
            store.set(N, store.get(D));
        }

        fn sequential(&self, _rising: &[usize], store: &mut SignalStore) {
            store.set(R, store.get(N));
        }
    }

    #[test]
    fn test_edge_samples_nets_from_the_same_eval() {
        let mut syms = SymbolTable::new("t", &Sampler).unwrap();
        settle(&mut syms, &Sampler, SettlePhase::Eval).unwrap();

        syms.store.set(D, 1);
        syms.store.set(CLK, 1);
        settle(&mut syms, &Sampler, SettlePhase::Eval).unwrap();
        assert_eq!(syms.store.get(N), 1);
        assert_eq!(syms.store.get(R), 1);
    }

    #[test]
    fn test_out_of_order_rules_take_extra_passes() {
        let mut syms = SymbolTable::new("t", &Reversed).unwrap();
        syms.store.set(A, 9);
        let passes = settle(&mut syms, &Reversed, SettlePhase::Eval).unwrap();
        assert_eq!(syms.store.get(C), 9);
        // b changes, then c changes, then a quiet pass
        assert_eq!(passes, 3);
    }

    #[test]
    fn test_settled_state_takes_one_pass() {
        let mut syms = SymbolTable::new("t", &Reversed).unwrap();
        syms.store.set(A, 4);
        settle(&mut syms, &Reversed, SettlePhase::Eval).unwrap();
        assert_eq!(settle(&mut syms, &Reversed, SettlePhase::Eval).unwrap(), 1);
    }

    #[test]
    fn test_inverter_loop_fails_at_bound() {
        let mut syms = SymbolTable::new("ring", &Inverter).unwrap();
        let err = settle(&mut syms, &Inverter, SettlePhase::Initial).unwrap_err();
        match err {
            KernelError::NonConvergence { model, phase, passes, mask } => {
                assert_eq!(model, "ring");
                assert_eq!(phase, SettlePhase::Initial);
                assert_eq!(passes, MAX_SETTLE_PASSES);
                assert_eq!(mask.count(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
