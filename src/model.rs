//! Model handle
//!
//! A `Model` pairs one design evaluator with the symbol table it runs
//! against. The caller pokes inputs, calls `eval`, and peeks outputs; the
//! first `eval` also runs the design's initial blocks.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{KernelError, Result};
use crate::evaluator::Evaluator;
use crate::settle::{settle, SettlePhase};
use crate::signal::{Direction, SignalId};
use crate::syms::SymbolTable;

/// Counters reported by `Model::stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    pub name: String,
    pub signals: usize,
    pub evals: u64,
    pub last_passes: u32,
    pub total_passes: u64,
    pub initialized: bool,
    pub finished: bool,
}

pub struct Model<E: Evaluator> {
    syms: SymbolTable,
    evaluator: E,
}

impl<E: Evaluator> Model<E> {
    /// Create a model named `name`. All signals start at zero and the
    /// initial blocks have not run yet.
    pub fn new(name: &str, evaluator: E) -> Result<Self> {
        let syms = SymbolTable::new(name, &evaluator)?;
        info!(
            model = name,
            signals = syms.store().len(),
            tracked = syms.tracked.len(),
            clocks = syms.clocks.len(),
            "model created"
        );
        Ok(Self { syms, evaluator })
    }

    pub fn name(&self) -> &str {
        self.syms.name()
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.syms
    }

    pub fn is_initialized(&self) -> bool {
        self.syms.did_init()
    }

    pub fn is_finished(&self) -> bool {
        self.syms.is_finished()
    }

    /// Passes taken by the most recent eval settle
    pub fn last_settle_passes(&self) -> u32 {
        self.syms.last_passes
    }

    /// Resolve a port by name. Internal signals are not ports.
    pub fn port(&self, name: &str) -> Result<SignalId> {
        let id = self
            .syms
            .store()
            .lookup(name)
            .ok_or_else(|| KernelError::UnknownSignal(name.to_string()))?;
        if !self.syms.store().def(id).direction.is_port() {
            return Err(KernelError::NotAPort(name.to_string()));
        }
        Ok(id)
    }

    /// Write an input port. Takes effect at the next `eval`.
    pub fn set(&mut self, id: SignalId, value: u64) -> Result<()> {
        self.syms.ensure_live()?;
        if id.index() >= self.syms.store().len() {
            return Err(KernelError::UnknownSignal(id.to_string()));
        }
        let def = self.syms.store().def(id);
        if def.direction != Direction::In {
            return Err(KernelError::NotAnInput(def.name.clone()));
        }
        self.syms.store.set(id, value);
        Ok(())
    }

    /// Read a port
    pub fn get(&self, id: SignalId) -> Result<u64> {
        let store = self.syms.store();
        if id.index() >= store.len() {
            return Err(KernelError::UnknownSignal(id.to_string()));
        }
        if !store.def(id).direction.is_port() {
            return Err(KernelError::NotAPort(store.def(id).name.clone()));
        }
        Ok(store.get(id))
    }

    pub fn poke(&mut self, name: &str, value: u64) -> Result<()> {
        let id = self.port(name)?;
        self.set(id, value)
    }

    pub fn peek(&self, name: &str) -> Result<u64> {
        let id = self.port(name)?;
        self.get(id)
    }

    /// Run the initial blocks now instead of on the first `eval`.
    /// Does nothing if they already ran.
    pub fn init(&mut self) -> Result<()> {
        self.syms.ensure_live()?;
        if self.syms.did_init() {
            return Ok(());
        }
        self.guarded(|model| model.run_initial())
    }

    /// Settle the model against the current inputs
    #[instrument(skip(self), fields(model = %self.syms.name()))]
    pub fn eval(&mut self) -> Result<()> {
        self.syms.ensure_live()?;
        self.guarded(|model| {
            if !model.syms.did_init() {
                model.run_initial()?;
            }

            if cfg!(debug_assertions) {
                model.syms.record_inputs();
            }

            let passes = settle(&mut model.syms, &model.evaluator, SettlePhase::Eval)?;
            model.syms.eval_count += 1;
            model.syms.last_passes = passes;
            model.syms.total_passes += u64::from(passes);

            if cfg!(debug_assertions) {
                if let Some(id) = model.syms.changed_input() {
                    panic!(
                        "{}: evaluator wrote input {}",
                        model.syms.name(),
                        model.syms.store().def(id).name
                    );
                }
            }
            Ok(())
        })?;

        if cfg!(debug_assertions) {
            if let Err(e) = self.check_invariants() {
                panic!("{}", e);
            }
        }
        Ok(())
    }

    /// Run the final blocks. The model is retired afterwards.
    #[instrument(skip(self), fields(model = %self.syms.name()))]
    pub fn finish(&mut self) -> Result<()> {
        self.syms.ensure_live()?;
        if self.syms.is_settling() {
            return Err(KernelError::Reentrant { model: self.syms.name().to_string() });
        }
        self.syms.finished = true;
        self.evaluator.finish(&mut self.syms.store);
        info!(evals = self.syms.eval_count, passes = self.syms.total_passes, "model finished");
        Ok(())
    }

    /// Drop the model and its symbol table
    pub fn destroy(self) {}

    /// Check widths and the design's own invariants
    pub fn check_invariants(&self) -> Result<()> {
        let store = self.syms.store();
        if let Some(id) = store.find_overwide() {
            let def = store.def(id);
            return Err(KernelError::Invariant {
                model: self.syms.name().to_string(),
                message: format!("{} holds bits outside its {}-bit width", def.name, def.width),
            });
        }
        self.evaluator.check(store).map_err(|message| KernelError::Invariant {
            model: self.syms.name().to_string(),
            message,
        })
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            name: self.syms.name().to_string(),
            signals: self.syms.store().len(),
            evals: self.syms.eval_count,
            last_passes: self.syms.last_passes,
            total_passes: self.syms.total_passes,
            initialized: self.syms.did_init(),
            finished: self.syms.is_finished(),
        }
    }

    /// Hold the reentrancy flag around `f`. A panic inside `f` leaves the
    /// flag set, so the instance refuses further evals.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.syms.is_settling() {
            return Err(KernelError::Reentrant { model: self.syms.name().to_string() });
        }
        self.syms.settling = true;
        let result = f(self);
        self.syms.settling = false;
        result
    }

    fn run_initial(&mut self) -> Result<()> {
        self.syms.did_init = true;
        debug!(model = self.syms.name(), "running initial blocks");
        self.evaluator.initial(&mut self.syms.store);
        // derived clocks take their power-on value here, not as an edge
        self.evaluator.settle(&mut self.syms.store);
        self.syms.prime_clocks();
        let passes = settle(&mut self.syms, &self.evaluator, SettlePhase::Initial)?;
        self.syms.total_passes += u64::from(passes);
        Ok(())
    }
}

impl<E: Evaluator> Drop for Model<E> {
    fn drop(&mut self) {
        debug!(model = self.syms.name(), finished = self.syms.is_finished(), "model destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuits::{Counter, MaskBus};
    use crate::rules::RuleTable;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_maskbus_scenario() {
        let mut model = Model::new("TOP", MaskBus).unwrap();
        model.poke("i_sw", 0xA5).unwrap();
        model.eval().unwrap();
        assert_eq!(model.peek("o_led").unwrap(), 0xA5);
        assert_eq!(model.last_settle_passes(), 1);

        model.poke("i_sw", 0x00).unwrap();
        model.eval().unwrap();
        assert_eq!(model.peek("o_led").unwrap(), 0x00);
        assert_eq!(model.last_settle_passes(), 1);
    }

    #[test]
    fn test_construction_does_not_run_initial() {
        let model = Model::new("TOP", Counter).unwrap();
        assert!(!model.is_initialized());
        assert_eq!(model.peek("o_count").unwrap(), 0);
    }

    #[test]
    fn test_initial_runs_once() {
        let mut model = Model::new("TOP", Counter).unwrap();
        model.eval().unwrap();
        assert_eq!(model.peek("o_count").unwrap(), Counter::POWER_ON);

        model.poke("en", 1).unwrap();
        model.poke("clk", 1).unwrap();
        model.eval().unwrap();
        assert_eq!(model.peek("o_count").unwrap(), Counter::POWER_ON + 1);

        // back to power-on inputs; the register keeps its value
        model.poke("en", 0).unwrap();
        model.poke("clk", 0).unwrap();
        model.eval().unwrap();
        model.eval().unwrap();
        assert_eq!(model.peek("o_count").unwrap(), Counter::POWER_ON + 1);
    }

    #[test]
    fn test_explicit_init() {
        let mut model = Model::new("TOP", Counter).unwrap();
        model.init().unwrap();
        assert!(model.is_initialized());
        assert_eq!(model.peek("o_count").unwrap(), Counter::POWER_ON);
        model.init().unwrap();
        model.eval().unwrap();
        assert_eq!(model.peek("o_count").unwrap(), Counter::POWER_ON);
    }

    #[test]
    fn test_initial_closure_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut table = RuleTable::new();
        table.output("y", 1);
        RuleTable::initial(&mut table, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut model = Model::new("TOP", table).unwrap();
        for _ in 0..5 {
            model.eval().unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_eval_takes_one_pass() {
        let mut model = Model::new("TOP", Counter).unwrap();
        model.poke("en", 1).unwrap();
        model.eval().unwrap();
        model.eval().unwrap();
        assert_eq!(model.last_settle_passes(), 1);
    }

    #[test]
    fn test_port_access_rules() {
        let mut table = RuleTable::new();
        let a = table.input("a", 4);
        let n = table.internal("n", 4);
        let y = table.output("y", 4);
        table.rule(move |s| s.set(n, s.get(a)));
        table.rule(move |s| s.set(y, s.get(n)));
        let mut model = Model::new("TOP", table).unwrap();

        assert!(matches!(model.poke("y", 1), Err(KernelError::NotAnInput(_))));
        assert!(matches!(model.poke("n", 1), Err(KernelError::NotAPort(_))));
        assert!(matches!(model.peek("n"), Err(KernelError::NotAPort(_))));
        assert!(matches!(model.peek("zz"), Err(KernelError::UnknownSignal(_))));
        assert!(matches!(model.get(SignalId(99)), Err(KernelError::UnknownSignal(_))));

        model.set(a, 0x1F).unwrap();
        model.eval().unwrap();
        assert_eq!(model.get(y).unwrap(), 0xF);
    }

    #[test]
    fn test_finish_runs_once_and_retires() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut table = RuleTable::new();
        table.input("a", 1);
        table.on_finish(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut model = Model::new("TOP", table).unwrap();
        model.eval().unwrap();
        model.finish().unwrap();
        assert!(model.is_finished());
        assert!(matches!(model.finish(), Err(KernelError::Retired { .. })));
        assert!(matches!(model.eval(), Err(KernelError::Retired { .. })));
        assert!(matches!(model.poke("a", 1), Err(KernelError::Retired { .. })));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_convergence_reported_on_first_eval() {
        let mut table = RuleTable::new();
        let n = table.internal("n", 1);
        table.rule(move |s| s.set(n, !s.get(n)));

        let mut model = Model::new("ring", table).unwrap();
        match model.eval() {
            Err(KernelError::NonConvergence { phase, .. }) => assert_eq!(phase, SettlePhase::Initial),
            other => panic!("expected non-convergence, got {:?}", other.err()),
        }
        // the guard is released after a reported failure
        assert!(!model.symbol_table().is_settling());
        assert!(matches!(model.eval(), Err(KernelError::NonConvergence { phase: SettlePhase::Eval, .. })));
    }

    #[test]
    fn test_panicking_eval_blocks_reentry() {
        let mut table = RuleTable::new();
        let a = table.input("a", 1);
        table.rule(move |s| {
            if s.get(a) == 1 {
                panic!("rule failed");
            }
        });

        let mut model = Model::new("TOP", table).unwrap();
        model.eval().unwrap();
        model.poke("a", 1).unwrap();
        let unwound = catch_unwind(AssertUnwindSafe(|| model.eval()));
        assert!(unwound.is_err());
        assert!(matches!(model.eval(), Err(KernelError::Reentrant { .. })));
    }

    #[test]
    fn test_check_invariants_reports_design_failure() {
        let mut table = RuleTable::new();
        let y = table.output("y", 8);
        RuleTable::initial(&mut table, move |s| s.set(y, 3));
        table.invariant(move |s| if s.get(y) == 3 { Err("y stuck at 3".to_string()) } else { Ok(()) });
        let mut model = Model::new("TOP", table).unwrap();
        assert!(model.check_invariants().is_ok());

        model.init().unwrap();
        match model.check_invariants() {
            Err(KernelError::Invariant { model, message }) => {
                assert_eq!(model, "TOP");
                assert_eq!(message, "y stuck at 3");
            }
            other => panic!("expected invariant failure, got {:?}", other),
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "y stuck at 3")]
    fn test_debug_invariant_failure_is_fatal() {
        let mut table = RuleTable::new();
        let y = table.output("y", 8);
        table.rule(move |s| s.set(y, 3));
        table.invariant(move |s| if s.get(y) == 3 { Err("y stuck at 3".to_string()) } else { Ok(()) });
        let mut model = Model::new("TOP", table).unwrap();
        let _ = model.eval();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "evaluator wrote input")]
    fn test_debug_input_write_is_fatal() {
        let mut table = RuleTable::new();
        let a = table.input("a", 8);
        table.rule(move |s| s.set(a, s.get(a) + 1));
        let mut model = Model::new("TOP", table).unwrap();
        let _ = model.eval();
    }

    #[test]
    fn test_stats_serialize() {
        let mut model = Model::new("TOP", MaskBus).unwrap();
        model.eval().unwrap();
        model.eval().unwrap();
        let stats = model.stats();
        assert_eq!(stats.evals, 2);
        assert_eq!(stats.last_passes, 1);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["name"], "TOP");
        assert_eq!(json["initialized"], true);
    }
}
