//! Evaluator compiled from a netlist IR
//!
//! Signal table order is ports, then nets, then registers. Combinational
//! assigns (and the statements of unclocked processes) are levelized by
//! dependency and flattened into one op stream. Clocked processes become one
//! sequential domain per clock; every register of a domain is computed into a
//! scratch slot before any of them is committed.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::error::{KernelError, Result};
use crate::evaluator::Evaluator;
use crate::netlist::flat::{compile_assign, compile_expr, FlatOp, Operand, SymbolMap};
use crate::netlist::ir::{ExprDef, ModuleIR, PortDirection};
use crate::signal::{compute_mask, Direction, Layout, SignalDef, SignalId, SignalStore};

/// Sequential assignment bound to a next-value slot
struct SeqAssign {
    ops: Vec<FlatOp>,
    result: Operand,
    target: usize,
    mask: u64,
    slot: usize,
}

pub struct NetlistEvaluator {
    name: String,
    signals: Vec<SignalDef>,
    comb_ops: Vec<FlatOp>,
    clocks: Vec<SignalId>,
    /// Sequential assigns per entry of `clocks`
    domains: Vec<Vec<SeqAssign>>,
    reset_values: Vec<(SignalId, u64)>,
    tracked: Vec<SignalId>,
    temp_count: usize,
    next_count: usize,
}

impl NetlistEvaluator {
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_ir(&ModuleIR::from_json(json)?)
    }

    pub fn from_ir(ir: &ModuleIR) -> Result<Self> {
        let mut signals = Vec::new();

        // Ports take the lowest ids
        for port in &ir.ports {
            let direction = match port.direction {
                PortDirection::In => Direction::In,
                PortDirection::Out => Direction::Out,
            };
            signals.push(SignalDef { name: port.name.clone(), width: port.width, direction });
        }
        for net in &ir.nets {
            signals.push(SignalDef::internal(net.name.clone(), net.width));
        }
        let mut reset_values = Vec::new();
        for reg in &ir.regs {
            let idx = signals.len();
            signals.push(SignalDef::internal(reg.name.clone(), reg.width));
            if let Some(value) = reg.reset_value.filter(|&v| v != 0) {
                reset_values.push((SignalId(idx), value & compute_mask(reg.width)));
            }
        }

        let mut name_to_idx = HashMap::with_capacity(signals.len());
        for (idx, def) in signals.iter().enumerate() {
            if name_to_idx.insert(def.name.clone(), idx).is_some() {
                return Err(KernelError::InvalidLayout(format!("duplicate signal {} in {}", def.name, ir.name)));
            }
        }
        let widths: Vec<usize> = signals.iter().map(|d| d.width).collect();
        let symbols = SymbolMap { name_to_idx: &name_to_idx, widths: &widths };

        let driven_target = |name: &str| -> Result<usize> {
            let idx = symbols.resolve(name)?;
            if signals[idx].direction == Direction::In {
                return Err(KernelError::InvalidLayout(format!("{} drives input {}", ir.name, name)));
            }
            Ok(idx)
        };

        // Unclocked processes are combinational
        let mut comb: Vec<(usize, &ExprDef)> = Vec::new();
        for assign in &ir.assigns {
            comb.push((driven_target(&assign.target)?, &assign.expr));
        }
        for process in ir.processes.iter().filter(|p| !p.clocked) {
            for stmt in &process.statements {
                comb.push((driven_target(&stmt.target)?, &stmt.expr));
            }
        }

        let reads: Vec<HashSet<usize>> = comb
            .iter()
            .map(|(_, expr)| {
                let mut deps = HashSet::new();
                expr.for_each_signal(&mut |name| {
                    if let Some(&idx) = name_to_idx.get(name) {
                        deps.insert(idx);
                    }
                });
                deps
            })
            .collect();

        let mut temp_count = 0usize;
        let mut comb_ops = Vec::new();
        for i in levelize(&comb, &reads) {
            let (target, expr) = comb[i];
            let compiled = compile_assign(expr, target, &symbols)?;
            temp_count = temp_count.max(compiled.temps);
            comb_ops.extend(compiled.ops);
        }

        // Clocked processes, grouped by clock in signal order
        let mut clock_set = BTreeSet::new();
        let mut pending = Vec::new();
        for process in ir.processes.iter().filter(|p| p.clocked) {
            let clock_name = process.clock.as_deref().ok_or_else(|| {
                KernelError::InvalidLayout(format!("clocked process {} has no clock", process.name))
            })?;
            let clock = symbols.resolve(clock_name)?;
            clock_set.insert(clock);
            for stmt in &process.statements {
                let target = driven_target(&stmt.target)?;
                let compiled = compile_expr(&stmt.expr, &symbols)?;
                temp_count = temp_count.max(compiled.temps);
                pending.push((clock, target, compiled));
            }
        }

        let clock_indices: Vec<usize> = clock_set.into_iter().collect();
        let mut domains: Vec<Vec<SeqAssign>> = (0..clock_indices.len()).map(|_| Vec::new()).collect();
        let next_count = pending.len();
        for (slot, (clock, target, compiled)) in pending.into_iter().enumerate() {
            if let Some(domain) = clock_indices.iter().position(|&c| c == clock) {
                domains[domain].push(SeqAssign {
                    ops: compiled.ops,
                    result: compiled.result,
                    target,
                    mask: compute_mask(widths[target]),
                    slot,
                });
            }
        }

        // A pass must repeat when a combinational net read by another assign
        // changes, or when a clock the kernel drives moves.
        let comb_targets: HashSet<usize> = comb.iter().map(|(t, _)| *t).collect();
        let comb_reads: HashSet<usize> = reads.iter().flatten().copied().collect();
        let mut tracked: BTreeSet<usize> = comb_targets.intersection(&comb_reads).copied().collect();
        tracked.extend(clock_indices.iter().copied().filter(|&c| signals[c].direction != Direction::In));

        debug!(
            module = %ir.name,
            signals = signals.len(),
            comb_ops = comb_ops.len(),
            clocks = clock_indices.len(),
            tracked = tracked.len(),
            "netlist compiled"
        );

        Ok(Self {
            name: ir.name.clone(),
            signals,
            comb_ops,
            clocks: clock_indices.into_iter().map(SignalId).collect(),
            domains,
            reset_values,
            tracked: tracked.into_iter().map(SignalId).collect(),
            temp_count,
            next_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op_count(&self) -> usize {
        self.comb_ops.len()
    }
}

/// Order combinational assigns so each runs after every assign that drives a
/// signal it reads.
///
/// Ready assigns are released in source order. Assigns on a cycle, and
/// anything downstream of one, keep their source order and go last; the
/// settle loop resolves them.
fn levelize(comb: &[(usize, &ExprDef)], reads: &[HashSet<usize>]) -> Vec<usize> {
    let n = comb.len();

    let mut drivers: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, (target, _)) in comb.iter().enumerate() {
        drivers.entry(*target).or_default().push(i);
    }

    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut waiting = vec![0usize; n];
    for (i, signals) in reads.iter().enumerate() {
        let mut deps: Vec<usize> = signals
            .iter()
            .filter_map(|sig| drivers.get(sig))
            .flatten()
            .copied()
            .filter(|&d| d != i)
            .collect();
        deps.sort_unstable();
        deps.dedup();
        waiting[i] = deps.len();
        for d in deps {
            consumers[d].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..n).filter(|&i| waiting[i] == 0).collect();
    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_front() {
        placed[i] = true;
        order.push(i);
        for &c in &consumers[i] {
            waiting[c] -= 1;
            if waiting[c] == 0 {
                ready.push_back(c);
            }
        }
    }

    if order.len() < n {
        debug!(assigns = n - order.len(), "combinational cycle left to the settle loop");
        order.extend((0..n).filter(|&i| !placed[i]));
    }
    order
}

impl Evaluator for NetlistEvaluator {
    fn layout(&self) -> Layout {
        Layout {
            signals: self.signals.clone(),
            scratch: self.temp_count + self.next_count,
        }
    }

    fn clocks(&self) -> &[SignalId] {
        &self.clocks
    }

    fn change_set(&self, _store: &SignalStore) -> Vec<SignalId> {
        self.tracked.clone()
    }

    fn initial(&self, store: &mut SignalStore) {
        for &(id, value) in &self.reset_values {
            store.set(id, value);
        }
    }

    fn combo(&self, store: &mut SignalStore) {
        let (signals, scratch) = store.split_mut();
        let temps = &mut scratch[..self.temp_count];
        for op in &self.comb_ops {
            op.execute(signals, temps);
        }
    }

    fn sequential(&self, rising: &[usize], store: &mut SignalStore) {
        let (signals, scratch) = store.split_mut();
        let (temps, next) = scratch.split_at_mut(self.temp_count);

        for &domain in rising {
            for seq in &self.domains[domain] {
                for op in &seq.ops {
                    op.execute(signals, temps);
                }
                next[seq.slot] = seq.result.read(signals, temps) & seq.mask;
            }
        }
        for &domain in rising {
            for seq in &self.domains[domain] {
                signals[seq.target] = next[seq.slot];
            }
        }
    }
}
