//! Netlist IR (JSON deserialization)

use serde::{Deserialize, Deserializer};

/// Port direction as written in the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortDef {
    pub name: String,
    pub direction: PortDirection,
    pub width: usize,
}

/// Internal net
#[derive(Debug, Clone, Deserialize)]
pub struct NetDef {
    pub name: String,
    pub width: usize,
}

/// Register, optionally with a power-on value
#[derive(Debug, Clone, Deserialize)]
pub struct RegDef {
    pub name: String,
    pub width: usize,
    #[serde(default)]
    pub reset_value: Option<u64>,
}

/// Expression tree
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExprDef {
    Signal { name: String, width: usize },
    Literal {
        #[serde(deserialize_with = "literal_bits")]
        value: u64,
        width: usize,
    },
    UnaryOp { op: String, operand: Box<ExprDef>, width: usize },
    BinaryOp { op: String, left: Box<ExprDef>, right: Box<ExprDef>, width: usize },
    Mux { condition: Box<ExprDef>, when_true: Box<ExprDef>, when_false: Box<ExprDef>, width: usize },
    Slice { base: Box<ExprDef>, low: usize, width: usize },
    Concat { parts: Vec<ExprDef>, width: usize },
    Resize { expr: Box<ExprDef>, width: usize },
}

impl ExprDef {
    pub fn width(&self) -> usize {
        match self {
            ExprDef::Signal { width, .. }
            | ExprDef::Literal { width, .. }
            | ExprDef::UnaryOp { width, .. }
            | ExprDef::BinaryOp { width, .. }
            | ExprDef::Mux { width, .. }
            | ExprDef::Slice { width, .. }
            | ExprDef::Concat { width, .. }
            | ExprDef::Resize { width, .. } => *width,
        }
    }

    /// Visit every signal name the expression reads
    pub fn for_each_signal<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            ExprDef::Signal { name, .. } => f(name),
            ExprDef::Literal { .. } => {}
            ExprDef::UnaryOp { operand, .. } => operand.for_each_signal(f),
            ExprDef::BinaryOp { left, right, .. } => {
                left.for_each_signal(f);
                right.for_each_signal(f);
            }
            ExprDef::Mux { condition, when_true, when_false, .. } => {
                condition.for_each_signal(f);
                when_true.for_each_signal(f);
                when_false.for_each_signal(f);
            }
            ExprDef::Slice { base, .. } => base.for_each_signal(f),
            ExprDef::Concat { parts, .. } => {
                for part in parts {
                    part.for_each_signal(f);
                }
            }
            ExprDef::Resize { expr, .. } => expr.for_each_signal(f),
        }
    }
}

/// Literal bits from either an unsigned or a negative JSON number
fn literal_bits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Bits {
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Bits::deserialize(deserializer)? {
        Bits::Unsigned(v) => v,
        Bits::Signed(v) => v as u64,
    })
}

/// Continuous (combinational) assignment
#[derive(Debug, Clone, Deserialize)]
pub struct AssignDef {
    pub target: String,
    pub expr: ExprDef,
}

/// Nonblocking assignment inside a clocked process
#[derive(Debug, Clone, Deserialize)]
pub struct SeqAssignDef {
    pub target: String,
    pub expr: ExprDef,
}

/// `always` block; unclocked ones are treated as combinational
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessDef {
    pub name: String,
    #[serde(default)]
    pub clock: Option<String>,
    pub clocked: bool,
    pub statements: Vec<SeqAssignDef>,
}

/// One elaborated module
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleIR {
    pub name: String,
    pub ports: Vec<PortDef>,
    #[serde(default)]
    pub nets: Vec<NetDef>,
    #[serde(default)]
    pub regs: Vec<RegDef>,
    #[serde(default)]
    pub assigns: Vec<AssignDef>,
    #[serde(default)]
    pub processes: Vec<ProcessDef>,
}

impl ModuleIR {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(json);
        deserializer.disable_recursion_limit();
        let ir = ModuleIR::deserialize(&mut deserializer)?;
        deserializer.end()?;
        Ok(ir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(json: &str) -> u64 {
        match serde_json::from_str::<ExprDef>(json).unwrap() {
            ExprDef::Literal { value, .. } => value,
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[test]
    fn test_literals_keep_all_64_bits() {
        assert_eq!(literal(r#"{"type": "literal", "value": 18446744073709551615, "width": 64}"#), u64::MAX);
        assert_eq!(literal(r#"{"type": "literal", "value": 9223372036854775808, "width": 64}"#), 1u64 << 63);
        assert_eq!(literal(r#"{"type": "literal", "value": -1, "width": 8}"#), u64::MAX);
        assert_eq!(literal(r#"{"type": "literal", "value": 5, "width": 3}"#), 5);
    }

    #[test]
    fn test_optional_sections_default_empty() {
        let ir = ModuleIR::from_json(r#"{"name": "m", "ports": []}"#).unwrap();
        assert!(ir.nets.is_empty() && ir.regs.is_empty() && ir.assigns.is_empty() && ir.processes.is_empty());
        assert!(ModuleIR::from_json(r#"{"name": "m", "ports": []} trailing"#).is_err());
    }
}
