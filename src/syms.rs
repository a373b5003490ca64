//! Per-instance symbol table
//!
//! Everything a model mutates lives here: the signal store, the change
//! detector's shadow copy, clock edge history and the lifecycle flags. One
//! table belongs to exactly one `Model` and is dropped with it.

use crate::evaluator::Evaluator;
use crate::error::{KernelError, Result};
use crate::signal::{Direction, SignalId, SignalStore};

pub struct SymbolTable {
    name: String,
    pub(crate) store: SignalStore,
    /// Initial blocks have run
    pub(crate) did_init: bool,
    /// A settle loop is in progress
    pub(crate) settling: bool,
    /// finish() has run
    pub(crate) finished: bool,
    /// Signals compared by the change detector
    pub(crate) tracked: Vec<SignalId>,
    /// Values of `tracked` as of the previous pass
    pub(crate) shadow: Vec<u64>,
    pub(crate) clocks: Vec<SignalId>,
    /// Clock values seen at the previous pass, for edge detection
    pub(crate) clock_last: Vec<u64>,
    /// Clocks that rose in the current pass
    pub(crate) rising: Vec<usize>,
    pub(crate) inputs: Vec<SignalId>,
    /// Input values at the start of an eval, for the debug write check
    pub(crate) input_shadow: Vec<u64>,
    pub(crate) eval_count: u64,
    pub(crate) last_passes: u32,
    pub(crate) total_passes: u64,
}

impl SymbolTable {
    pub fn new<E: Evaluator + ?Sized>(name: &str, evaluator: &E) -> Result<Self> {
        let store = SignalStore::new(&evaluator.layout())?;

        let clocks = evaluator.clocks().to_vec();
        if let Some(bad) = clocks.iter().find(|c| c.index() >= store.len()) {
            return Err(KernelError::InvalidLayout(format!("clock {} is outside the signal table", bad)));
        }

        let mut tracked = evaluator.change_set(&store);
        tracked.sort();
        tracked.dedup();
        if let Some(bad) = tracked.iter().find(|t| t.index() >= store.len()) {
            return Err(KernelError::InvalidLayout(format!("tracked signal {} is outside the signal table", bad)));
        }

        let inputs: Vec<SignalId> = store.ids_with(Direction::In).collect();

        Ok(Self {
            name: name.to_string(),
            input_shadow: vec![0u64; inputs.len()],
            inputs,
            store,
            did_init: false,
            settling: false,
            finished: false,
            shadow: vec![0u64; tracked.len()],
            tracked,
            clock_last: vec![0u64; clocks.len()],
            rising: Vec::with_capacity(clocks.len()),
            clocks,
            eval_count: 0,
            last_passes: 0,
            total_passes: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    pub fn did_init(&self) -> bool {
        self.did_init
    }

    pub fn is_settling(&self) -> bool {
        self.settling
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Record current clock values as the edge-detection baseline
    pub(crate) fn prime_clocks(&mut self) {
        for (last, &clk) in self.clock_last.iter_mut().zip(&self.clocks) {
            *last = self.store.get(clk);
        }
    }

    pub(crate) fn record_inputs(&mut self) {
        for (slot, &id) in self.input_shadow.iter_mut().zip(&self.inputs) {
            *slot = self.store.get(id);
        }
    }

    /// First input whose value differs from the last `record_inputs`
    pub(crate) fn changed_input(&self) -> Option<SignalId> {
        self.inputs
            .iter()
            .zip(&self.input_shadow)
            .find(|(&id, &was)| self.store.get(id) != was)
            .map(|(&id, _)| id)
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.finished {
            return Err(KernelError::Retired { model: self.name.clone() });
        }
        Ok(())
    }
}
