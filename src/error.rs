//! Kernel errors

use thiserror::Error;

use crate::change::ChangeMask;
use crate::settle::SettlePhase;

/// Kernel result type
pub type Result<T> = std::result::Result<T, KernelError>;

/// Kernel errors
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("{model}: {phase} settle did not converge after {passes} passes (last change {mask})")]
    NonConvergence {
        model: String,
        phase: SettlePhase,
        passes: u32,
        mask: ChangeMask,
    },

    #[error("{model}: eval re-entered while a settle is in progress")]
    Reentrant { model: String },

    #[error("{model}: model is retired, finish() has already run")]
    Retired { model: String },

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("signal {0} is not an input port")]
    NotAnInput(String),

    #[error("signal {0} is not a port")]
    NotAPort(String),

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("failed to parse netlist: {0}")]
    Netlist(#[from] serde_json::Error),

    #[error("{model}: invariant violated: {message}")]
    Invariant { model: String, message: String },
}
