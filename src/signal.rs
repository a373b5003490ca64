//! Flat signal storage
//!
//! Every port and internal net of a model lives in one `Vec<u64>` indexed by
//! `SignalId`. The store is sized once from the design's `Layout`; nothing is
//! allocated after construction. Values wider than their signal are masked on
//! every write.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{KernelError, Result};

/// Widest signal a store slot can hold
pub const MAX_WIDTH: usize = 64;

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Internal,
}

impl Direction {
    pub fn is_port(self) -> bool {
        !matches!(self, Direction::Internal)
    }
}

/// Signal definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDef {
    pub name: String,
    pub width: usize,
    pub direction: Direction,
}

impl SignalDef {
    pub fn input(name: impl Into<String>, width: usize) -> Self {
        Self { name: name.into(), width, direction: Direction::In }
    }

    pub fn output(name: impl Into<String>, width: usize) -> Self {
        Self { name: name.into(), width, direction: Direction::Out }
    }

    pub fn internal(name: impl Into<String>, width: usize) -> Self {
        Self { name: name.into(), width, direction: Direction::Internal }
    }
}

/// Index of a signal in its store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignalId(pub usize);

impl SignalId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Storage shape a design asks for
///
/// `signals[i]` is stored at `SignalId(i)`. `scratch` is the number of extra
/// words the evaluator needs for temporaries; it lives in the store so the
/// evaluator itself can stay immutable and shared.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub signals: Vec<SignalDef>,
    pub scratch: usize,
}

#[inline(always)]
pub fn compute_mask(width: usize) -> u64 {
    if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

pub struct SignalStore {
    values: Vec<u64>,
    masks: Vec<u64>,
    defs: Vec<SignalDef>,
    name_to_idx: HashMap<String, usize>,
    scratch: Vec<u64>,
}

impl SignalStore {
    /// Build a zeroed store for `layout`
    pub fn new(layout: &Layout) -> Result<Self> {
        let mut name_to_idx = HashMap::with_capacity(layout.signals.len());
        let mut masks = Vec::with_capacity(layout.signals.len());

        for (idx, def) in layout.signals.iter().enumerate() {
            if def.width == 0 || def.width > MAX_WIDTH {
                return Err(KernelError::InvalidLayout(format!(
                    "signal {} has width {}, expected 1..={}",
                    def.name, def.width, MAX_WIDTH
                )));
            }
            if name_to_idx.insert(def.name.clone(), idx).is_some() {
                return Err(KernelError::InvalidLayout(format!("duplicate signal {}", def.name)));
            }
            masks.push(compute_mask(def.width));
        }

        Ok(Self {
            values: vec![0u64; layout.signals.len()],
            masks,
            defs: layout.signals.clone(),
            name_to_idx,
            scratch: vec![0u64; layout.scratch],
        })
    }

    #[inline(always)]
    pub fn get(&self, id: SignalId) -> u64 {
        self.values[id.0]
    }

    #[inline(always)]
    pub fn set(&mut self, id: SignalId, value: u64) {
        self.values[id.0] = value & self.masks[id.0];
    }

    pub fn lookup(&self, name: &str) -> Option<SignalId> {
        self.name_to_idx.get(name).copied().map(SignalId)
    }

    pub fn def(&self, id: SignalId) -> &SignalDef {
        &self.defs[id.0]
    }

    pub fn mask(&self, id: SignalId) -> u64 {
        self.masks[id.0]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Signal values and scratch words, borrowed together
    #[inline(always)]
    pub fn split_mut(&mut self) -> (&mut [u64], &mut [u64]) {
        (&mut self.values, &mut self.scratch)
    }

    pub fn scratch(&self) -> &[u64] {
        &self.scratch
    }

    pub fn ids(&self) -> impl Iterator<Item = SignalId> + '_ {
        (0..self.values.len()).map(SignalId)
    }

    pub fn ids_with(&self, direction: Direction) -> impl Iterator<Item = SignalId> + '_ {
        self.defs
            .iter()
            .enumerate()
            .filter(move |(_, d)| d.direction == direction)
            .map(|(i, _)| SignalId(i))
    }

    /// First signal holding bits outside its width, if any
    pub fn find_overwide(&self) -> Option<SignalId> {
        self.values
            .iter()
            .zip(&self.masks)
            .position(|(v, m)| v & !m != 0)
            .map(SignalId)
    }
}
