//! Netlist loading
//!
//! Turns an elaborated module IR (JSON) into an `Evaluator`. The IR is the
//! compiler's output; this module does no HDL parsing of its own.

pub mod evaluator;
pub mod flat;
pub mod ir;

pub use evaluator::NetlistEvaluator;
pub use ir::ModuleIR;
