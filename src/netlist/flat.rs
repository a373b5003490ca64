//! Expression flattening
//!
//! Each expression tree is compiled once into a straight sequence of primitive
//! operations over pre-resolved signal indices, immediates and temp slots. At
//! runtime the evaluator walks the sequence with a single match and never
//! touches a name or a boxed node.

use std::collections::HashMap;

use crate::error::{KernelError, Result};
use crate::netlist::ir::ExprDef;
use crate::signal::compute_mask;

/// Where an op reads an argument from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Signal(usize),
    Immediate(u64),
    Temp(usize),
}

impl Operand {
    #[inline(always)]
    pub fn read(self, signals: &[u64], temps: &[u64]) -> u64 {
        match self {
            Operand::Signal(idx) => signals[idx],
            Operand::Immediate(val) => val,
            Operand::Temp(idx) => temps[idx],
        }
    }
}

/// One primitive step of a compiled expression
#[derive(Debug, Clone, Copy)]
pub struct FlatOp {
    pub op_type: u8,
    /// Temp index, or signal index for `OP_COPY_TO_SIG`
    pub dst: usize,
    pub arg0: Operand,
    pub arg1: Operand,
    pub arg2: Operand,
    /// Result mask; operand mask for reductions
    pub mask: u64,
}

// Op codes
pub const OP_COPY_TO_SIG: u8 = 0; // signals[dst] = arg0 & mask
pub const OP_NOT: u8 = 3;
pub const OP_REDUCE_AND: u8 = 4;
pub const OP_REDUCE_OR: u8 = 5;
pub const OP_REDUCE_XOR: u8 = 6;
pub const OP_AND: u8 = 7;
pub const OP_OR: u8 = 8;
pub const OP_XOR: u8 = 9;
pub const OP_ADD: u8 = 10;
pub const OP_SUB: u8 = 11;
pub const OP_MUL: u8 = 12;
pub const OP_DIV: u8 = 13;
pub const OP_MOD: u8 = 14;
pub const OP_SHL: u8 = 15;
pub const OP_SHR: u8 = 16;
pub const OP_EQ: u8 = 17;
pub const OP_NE: u8 = 18;
pub const OP_LT: u8 = 19;
pub const OP_GT: u8 = 20;
pub const OP_LE: u8 = 21;
pub const OP_GE: u8 = 22;
pub const OP_MUX: u8 = 23;
pub const OP_SLICE: u8 = 24; // arg1 holds the low bit
pub const OP_CONCAT_INIT: u8 = 25;
pub const OP_CONCAT_ACCUM: u8 = 26; // arg1 holds the shift
pub const OP_CONCAT_FINISH: u8 = 27;
pub const OP_RESIZE: u8 = 28;

#[inline(always)]
fn shl(value: u64, shift: u64) -> u64 {
    u32::try_from(shift).ok().and_then(|s| value.checked_shl(s)).unwrap_or(0)
}

#[inline(always)]
fn shr(value: u64, shift: u64) -> u64 {
    u32::try_from(shift).ok().and_then(|s| value.checked_shr(s)).unwrap_or(0)
}

impl FlatOp {
    fn temp(op_type: u8, dst: usize, arg0: Operand, arg1: Operand, mask: u64) -> Self {
        Self { op_type, dst, arg0, arg1, arg2: Operand::Immediate(0), mask }
    }

    #[inline(always)]
    pub fn execute(&self, signals: &mut [u64], temps: &mut [u64]) {
        let a = self.arg0.read(signals, temps);
        let b = self.arg1.read(signals, temps);
        let value = match self.op_type {
            OP_COPY_TO_SIG => {
                signals[self.dst] = a & self.mask;
                return;
            }
            OP_NOT => !a,
            OP_REDUCE_AND => ((a & self.mask) == self.mask) as u64,
            OP_REDUCE_OR => (a != 0) as u64,
            OP_REDUCE_XOR => (a.count_ones() & 1) as u64,
            OP_AND => a & b,
            OP_OR => a | b,
            OP_XOR => a ^ b,
            OP_ADD => a.wrapping_add(b),
            OP_SUB => a.wrapping_sub(b),
            OP_MUL => a.wrapping_mul(b),
            OP_DIV => if b != 0 { a / b } else { 0 },
            OP_MOD => if b != 0 { a % b } else { 0 },
            OP_SHL => shl(a, b),
            OP_SHR => shr(a, b),
            OP_EQ => (a == b) as u64,
            OP_NE => (a != b) as u64,
            OP_LT => (a < b) as u64,
            OP_GT => (a > b) as u64,
            OP_LE => (a <= b) as u64,
            OP_GE => (a >= b) as u64,
            OP_MUX => {
                if a != 0 { b } else { self.arg2.read(signals, temps) }
            }
            OP_SLICE => shr(a, b),
            OP_CONCAT_INIT => 0,
            OP_CONCAT_ACCUM => temps[self.dst] | shl(a, b),
            OP_CONCAT_FINISH => temps[self.dst],
            OP_RESIZE => a,
            _ => unreachable!("unknown flat op {}", self.op_type),
        };
        temps[self.dst] = match self.op_type {
            OP_REDUCE_AND | OP_REDUCE_OR | OP_REDUCE_XOR => value,
            _ => value & self.mask,
        };
    }
}

/// Name and width lookup used while compiling
pub struct SymbolMap<'a> {
    pub name_to_idx: &'a HashMap<String, usize>,
    pub widths: &'a [usize],
}

impl SymbolMap<'_> {
    pub fn resolve(&self, name: &str) -> Result<usize> {
        self.name_to_idx
            .get(name)
            .copied()
            .ok_or_else(|| KernelError::InvalidLayout(format!("unknown signal {} in expression", name)))
    }

    fn expr_width(&self, expr: &ExprDef) -> usize {
        match expr {
            ExprDef::Signal { name, width } => {
                self.name_to_idx.get(name).and_then(|&idx| self.widths.get(idx).copied()).unwrap_or(*width)
            }
            other => other.width(),
        }
    }
}

/// Compiled expression: run `ops`, then read `result`
pub struct CompiledExpr {
    pub ops: Vec<FlatOp>,
    pub result: Operand,
    pub temps: usize,
}

pub fn compile_expr(expr: &ExprDef, symbols: &SymbolMap) -> Result<CompiledExpr> {
    let mut ops = Vec::new();
    let mut temp_counter = 0usize;
    let result = compile_expr_to_flat(expr, symbols, &mut ops, &mut temp_counter)?;
    Ok(CompiledExpr { ops, result, temps: temp_counter })
}

/// Compile `target = expr` into ops ending with a store into the target
pub fn compile_assign(expr: &ExprDef, target: usize, symbols: &SymbolMap) -> Result<CompiledExpr> {
    let mut compiled = compile_expr(expr, symbols)?;
    if compiled.result != Operand::Signal(target) {
        let mask = compute_mask(symbols.widths[target]);
        compiled.ops.push(FlatOp::temp(OP_COPY_TO_SIG, target, compiled.result, Operand::Immediate(0), mask));
    }
    Ok(compiled)
}

fn unary_op(op: &str) -> Result<u8> {
    Ok(match op {
        "~" | "not" => OP_NOT,
        "&" | "reduce_and" => OP_REDUCE_AND,
        "|" | "reduce_or" => OP_REDUCE_OR,
        "^" | "reduce_xor" => OP_REDUCE_XOR,
        _ => return Err(KernelError::InvalidLayout(format!("unknown unary operator {}", op))),
    })
}

fn binary_op(op: &str) -> Result<u8> {
    Ok(match op {
        "&" => OP_AND,
        "|" => OP_OR,
        "^" => OP_XOR,
        "+" => OP_ADD,
        "-" => OP_SUB,
        "*" => OP_MUL,
        "/" => OP_DIV,
        "%" => OP_MOD,
        "<<" => OP_SHL,
        ">>" => OP_SHR,
        "==" => OP_EQ,
        "!=" => OP_NE,
        "<" => OP_LT,
        ">" => OP_GT,
        "<=" | "le" => OP_LE,
        ">=" => OP_GE,
        _ => return Err(KernelError::InvalidLayout(format!("unknown binary operator {}", op))),
    })
}

fn alloc(counter: &mut usize) -> usize {
    let dst = *counter;
    *counter += 1;
    dst
}

fn compile_expr_to_flat(
    expr: &ExprDef,
    symbols: &SymbolMap,
    ops: &mut Vec<FlatOp>,
    temp_counter: &mut usize,
) -> Result<Operand> {
    let operand = match expr {
        ExprDef::Signal { name, .. } => Operand::Signal(symbols.resolve(name)?),
        ExprDef::Literal { value, width } => Operand::Immediate(*value & compute_mask(*width)),
        ExprDef::UnaryOp { op, operand, width } => {
            let op_type = unary_op(op)?;
            let src = compile_expr_to_flat(operand, symbols, ops, temp_counter)?;
            let dst = alloc(temp_counter);
            let mask = if op_type == OP_NOT {
                compute_mask(*width)
            } else {
                compute_mask(symbols.expr_width(operand))
            };
            ops.push(FlatOp::temp(op_type, dst, src, Operand::Immediate(0), mask));
            Operand::Temp(dst)
        }
        ExprDef::BinaryOp { op, left, right, width } => {
            let op_type = binary_op(op)?;
            let l = compile_expr_to_flat(left, symbols, ops, temp_counter)?;
            let r = compile_expr_to_flat(right, symbols, ops, temp_counter)?;
            let dst = alloc(temp_counter);
            ops.push(FlatOp::temp(op_type, dst, l, r, compute_mask(*width)));
            Operand::Temp(dst)
        }
        ExprDef::Mux { condition, when_true, when_false, width } => {
            let cond = compile_expr_to_flat(condition, symbols, ops, temp_counter)?;
            let t = compile_expr_to_flat(when_true, symbols, ops, temp_counter)?;
            let f = compile_expr_to_flat(when_false, symbols, ops, temp_counter)?;
            let dst = alloc(temp_counter);
            ops.push(FlatOp { op_type: OP_MUX, dst, arg0: cond, arg1: t, arg2: f, mask: compute_mask(*width) });
            Operand::Temp(dst)
        }
        ExprDef::Slice { base, low, width } => {
            let src = compile_expr_to_flat(base, symbols, ops, temp_counter)?;
            let dst = alloc(temp_counter);
            ops.push(FlatOp::temp(OP_SLICE, dst, src, Operand::Immediate(*low as u64), compute_mask(*width)));
            Operand::Temp(dst)
        }
        ExprDef::Concat { parts, width } => {
            let dst = alloc(temp_counter);
            ops.push(FlatOp::temp(OP_CONCAT_INIT, dst, Operand::Immediate(0), Operand::Immediate(0), 0));

            // last part is least significant
            let mut shift_acc = 0u64;
            for part in parts.iter().rev() {
                let src = compile_expr_to_flat(part, symbols, ops, temp_counter)?;
                let part_width = symbols.expr_width(part);
                let part_mask = compute_mask(part_width);
                // the accumulated value is masked to the part before shifting
                let masked = alloc(temp_counter);
                ops.push(FlatOp::temp(OP_RESIZE, masked, src, Operand::Immediate(0), part_mask));
                ops.push(FlatOp::temp(OP_CONCAT_ACCUM, dst, Operand::Temp(masked), Operand::Immediate(shift_acc), u64::MAX));
                shift_acc += part_width as u64;
            }

            ops.push(FlatOp::temp(OP_CONCAT_FINISH, dst, Operand::Immediate(0), Operand::Immediate(0), compute_mask(*width)));
            Operand::Temp(dst)
        }
        ExprDef::Resize { expr, width } => {
            let src = compile_expr_to_flat(expr, symbols, ops, temp_counter)?;
            let dst = alloc(temp_counter);
            ops.push(FlatOp::temp(OP_RESIZE, dst, src, Operand::Immediate(0), compute_mask(*width)));
            Operand::Temp(dst)
        }
    };
    Ok(operand)
}
