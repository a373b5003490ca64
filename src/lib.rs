//! Settling evaluation kernel for compiled RTL models
//!
//! A `Model` owns one design's `SymbolTable` and drives it through:
//! - one-shot initial blocks on the first `eval` (or an explicit `init`)
//! - a fixed-point settle loop on every `eval`, bounded by `MAX_SETTLE_PASSES`
//! - exactly-once final blocks via `finish`
//!
//! Designs plug in through the `Evaluator` trait: hand-written circuits, a
//! closure `RuleTable`, or a `NetlistEvaluator` compiled from JSON IR.

pub mod change;
pub mod circuits;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod netlist;
pub mod rules;
pub mod settle;
pub mod signal;
pub mod syms;

pub use change::ChangeMask;
pub use error::{KernelError, Result};
pub use evaluator::Evaluator;
pub use model::{Model, ModelStats};
pub use netlist::NetlistEvaluator;
pub use rules::RuleTable;
pub use settle::{SettlePhase, MAX_SETTLE_PASSES};
pub use signal::{Direction, Layout, SignalDef, SignalId, SignalStore};
pub use syms::SymbolTable;
