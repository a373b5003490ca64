//! Closure-table designs
//!
//! `RuleTable` builds a design at runtime: declare signals, then push
//! combinational rules in the order they should run. Useful for small
//! hand-built circuits where writing an `Evaluator` impl is overkill.

use crate::evaluator::Evaluator;
use crate::signal::{Direction, Layout, SignalDef, SignalId, SignalStore};

/// Update rule run against the store
pub type RuleFn = Box<dyn Fn(&mut SignalStore) + Send + Sync>;

/// Consistency check run by `Model::check_invariants`
pub type CheckFn = Box<dyn Fn(&SignalStore) -> Result<(), String> + Send + Sync>;

#[derive(Default)]
pub struct RuleTable {
    signals: Vec<SignalDef>,
    initial: Vec<RuleFn>,
    rules: Vec<RuleFn>,
    finals: Vec<RuleFn>,
    checks: Vec<CheckFn>,
    tracked: Option<Vec<SignalId>>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&mut self, def: SignalDef) -> SignalId {
        let id = SignalId(self.signals.len());
        self.signals.push(def);
        id
    }

    pub fn input(&mut self, name: &str, width: usize) -> SignalId {
        self.signal(SignalDef::input(name, width))
    }

    pub fn output(&mut self, name: &str, width: usize) -> SignalId {
        self.signal(SignalDef::output(name, width))
    }

    pub fn internal(&mut self, name: &str, width: usize) -> SignalId {
        self.signal(SignalDef::internal(name, width))
    }

    /// Append a combinational rule. Rules run in insertion order.
    pub fn rule(&mut self, f: impl Fn(&mut SignalStore) + Send + Sync + 'static) {
        self.rules.push(Box::new(f));
    }

    pub fn initial(&mut self, f: impl Fn(&mut SignalStore) + Send + Sync + 'static) {
        self.initial.push(Box::new(f));
    }

    pub fn on_finish(&mut self, f: impl Fn(&mut SignalStore) + Send + Sync + 'static) {
        self.finals.push(Box::new(f));
    }

    pub fn invariant(&mut self, f: impl Fn(&SignalStore) -> Result<(), String> + Send + Sync + 'static) {
        self.checks.push(Box::new(f));
    }

    /// Restrict change detection to `ids` instead of every non-input
    pub fn track(&mut self, ids: impl IntoIterator<Item = SignalId>) {
        self.tracked = Some(ids.into_iter().collect());
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Evaluator for RuleTable {
    fn layout(&self) -> Layout {
        Layout { signals: self.signals.clone(), scratch: 0 }
    }

    fn change_set(&self, store: &SignalStore) -> Vec<SignalId> {
        match &self.tracked {
            Some(ids) => ids.clone(),
            None => store
                .ids()
                .filter(|&id| store.def(id).direction != Direction::In)
                .collect(),
        }
    }

    fn initial(&self, store: &mut SignalStore) {
        for f in &self.initial {
            f(store);
        }
    }

    fn combo(&self, store: &mut SignalStore) {
        for f in &self.rules {
            f(store);
        }
    }

    fn finish(&self, store: &mut SignalStore) {
        for f in &self.finals {
            f(store);
        }
    }

    fn check(&self, store: &SignalStore) -> Result<(), String> {
        self.checks.iter().try_for_each(|f| f(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;

    #[test]
    fn test_ids_follow_declaration_order() {
        let mut table = RuleTable::new();
        assert_eq!(table.input("a", 1), SignalId(0));
        assert_eq!(table.internal("b", 1), SignalId(1));
        assert_eq!(table.output("c", 1), SignalId(2));
        assert_eq!(table.layout().signals.len(), 3);
    }

    #[test]
    fn test_chain_in_reverse_order_settles() {
        // y = n2, n2 = n1, n1 = a: worst-case order for a three-stage chain
        let mut table = RuleTable::new();
        let a = table.input("a", 8);
        let n1 = table.internal("n1", 8);
        let n2 = table.internal("n2", 8);
        let y = table.output("y", 8);
        table.rule(move |s| s.set(y, s.get(n2)));
        table.rule(move |s| s.set(n2, s.get(n1)));
        table.rule(move |s| s.set(n1, s.get(a)));
        table.track([n1, n2]);
        assert_eq!(table.rule_count(), 3);

        let mut model = Model::new("chain", table).unwrap();
        model.poke("a", 0x42).unwrap();
        model.eval().unwrap();
        assert_eq!(model.peek("y").unwrap(), 0x42);
        assert_eq!(model.last_settle_passes(), 3);
    }

    #[test]
    fn test_feedback_that_settles_is_not_an_error() {
        // n = n | a latches high once a is set
        let mut table = RuleTable::new();
        let a = table.input("a", 1);
        let n = table.internal("n", 1);
        let y = table.output("y", 1);
        table.rule(move |s| s.set(n, s.get(n) | s.get(a)));
        table.rule(move |s| s.set(y, s.get(n)));

        let mut model = Model::new("latch", table).unwrap();
        model.poke("a", 1).unwrap();
        model.eval().unwrap();
        model.poke("a", 0).unwrap();
        model.eval().unwrap();
        assert_eq!(model.peek("y").unwrap(), 1);
    }
}
