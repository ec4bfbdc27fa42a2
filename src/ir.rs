use std::{cmp::Ordering, fmt, str::FromStr};

use crate::{handle::impl_handle, value::Value};

/// An ordered, append-only list of instructions addressed by index.
pub type Program = Vec<Instr>;

/// One three-address instruction: `(op, dest, src1, src2)`.
///
/// All four fields are always present; operands an opcode doesn't use are
/// [`Operand::Empty`].
#[derive(Clone, PartialEq, Debug)]
pub struct Instr {
    pub op: Opcode,
    pub dest: Operand,
    pub src1: Operand,
    pub src2: Operand,
}

impl Instr {
    pub fn new(op: Opcode, dest: impl Into<Operand>, src1: impl Into<Operand>, src2: impl Into<Operand>) -> Self {
        Self {
            op,
            dest: dest.into(),
            src1: src1.into(),
            src2: src2.into(),
        }
    }

    pub fn label(label: LabelId) -> Self {
        Self::new(Opcode::Label, label, Operand::Empty, Operand::Empty)
    }

    pub fn jump(to: LabelId) -> Self {
        Self::new(Opcode::Jump, to, Operand::Empty, Operand::Empty)
    }

    pub fn assign(dest: impl Into<Operand>, src: impl Into<Operand>) -> Self {
        Self::new(Opcode::Assign, dest, src, Operand::Empty)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum Opcode {
    Arith(ArithOp),
    Logic(LogicOp),
    Rel(RelOp),
    Assign,
    Label,
    Jump,
    If,
    Call,
    /// Anything else. Only text-loaded IR can contain it; the engine refuses
    /// to dispatch it.
    Unknown(String),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    FloorDiv,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum LogicOp {
    Or,
    And,
    Not,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum RelOp {
    EqualTo,
    NotEqualTo,
    LessThan,
    GreaterThan,
    LessThanOrEqualTo,
    GreaterThanOrEqualTo,
}

impl RelOp {
    pub fn holds(self, ord: Ordering) -> bool {
        use RelOp::*;
        match self {
            EqualTo => ord == Ordering::Equal,
            NotEqualTo => ord != Ordering::Equal,
            LessThan => ord == Ordering::Less,
            GreaterThan => ord == Ordering::Greater,
            LessThanOrEqualTo => ord != Ordering::Greater,
            GreaterThanOrEqualTo => ord != Ordering::Less,
        }
    }
}

impl Opcode {
    pub fn as_str(&self) -> &str {
        use Opcode::*;
        match self {
            Arith(ArithOp::Add) => "+",
            Arith(ArithOp::Sub) => "-",
            Arith(ArithOp::Mul) => "*",
            Arith(ArithOp::Div) => "/",
            Arith(ArithOp::Rem) => "%",
            Arith(ArithOp::FloorDiv) => "//",
            Logic(LogicOp::Or) => "||",
            Logic(LogicOp::And) => "&&",
            Logic(LogicOp::Not) => "!",
            Rel(RelOp::EqualTo) => "==",
            Rel(RelOp::NotEqualTo) => "!=",
            Rel(RelOp::LessThan) => "<",
            Rel(RelOp::GreaterThan) => ">",
            Rel(RelOp::LessThanOrEqualTo) => "<=",
            Rel(RelOp::GreaterThanOrEqualTo) => ">=",
            Assign => "=",
            Label => "LABEL",
            Jump => "JUMP",
            If => "IF",
            Call => "CALL",
            Unknown(op) => op,
        }
    }

    /// Parses an opcode mnemonic. Never fails: unrecognized text becomes
    /// [`Opcode::Unknown`].
    pub fn parse(text: &str) -> Opcode {
        use Opcode::*;
        match text {
            "+" => Arith(ArithOp::Add),
            "-" => Arith(ArithOp::Sub),
            "*" => Arith(ArithOp::Mul),
            "/" => Arith(ArithOp::Div),
            "%" => Arith(ArithOp::Rem),
            "//" => Arith(ArithOp::FloorDiv),
            "||" => Logic(LogicOp::Or),
            "&&" => Logic(LogicOp::And),
            "!" => Logic(LogicOp::Not),
            "==" => Rel(RelOp::EqualTo),
            "!=" | "<>" => Rel(RelOp::NotEqualTo),
            "<" => Rel(RelOp::LessThan),
            ">" => Rel(RelOp::GreaterThan),
            "<=" => Rel(RelOp::LessThanOrEqualTo),
            ">=" => Rel(RelOp::GreaterThanOrEqualTo),
            "=" => Assign,
            "LABEL" => Label,
            "JUMP" => Jump,
            "IF" => If,
            "CALL" => Call,
            other => Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Operand {
    Empty,
    Const(Value),
    /// A user variable, a temporary, a label, or a `CALL` target; which one
    /// depends on the opcode and field.
    Name(String),
}

impl Operand {
    pub fn name(&self) -> Option<&str> {
        match self {
            Operand::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Classifies the text form of an operand: `_` is empty, literals become
    /// constants, everything else is a name.
    pub fn parse(text: &str) -> Operand {
        if text == "_" {
            Operand::Empty
        } else if let Some(value) = Value::parse_literal(text) {
            Operand::Const(value)
        } else {
            Operand::Name(text.to_string())
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Empty => f.write_str("_"),
            Operand::Const(Value::Str(raw)) => write!(f, "\"{raw}\""),
            Operand::Const(value) => write!(f, "{value}"),
            Operand::Name(name) => f.write_str(name),
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Const(value)
    }
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Name(name.to_string())
    }
}

impl From<String> for Operand {
    fn from(name: String) -> Self {
        Operand::Name(name)
    }
}

impl From<TempId> for Operand {
    fn from(temp: TempId) -> Self {
        Operand::Name(temp.to_string())
    }
}

impl From<LabelId> for Operand {
    fn from(label: LabelId) -> Self {
        Operand::Name(label.to_string())
    }
}

/// Reserved prefix of temporaries. No identifier the lexer accepts can start
/// with it.
pub const TEMP_PREFIX: &str = "$t";

pub fn is_temp(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

impl_handle! {
    pub struct TempId(u32), display = "$t";
    pub struct LabelId(u32), display = "L";
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.op, self.dest, self.src1, self.src2
        )
    }
}

/// Writes one instruction per line.
pub struct Listing<'a>(pub &'a [Instr]);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in self.0 {
            writeln!(f, "{instr}")?;
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl FromStr for Instr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| "expected `(op, dest, src1, src2)`".to_string())?;
        let fields = split_fields(inner)?;
        let [op, dest, src1, src2] = <[&str; 4]>::try_from(fields.as_slice())
            .map_err(|_| format!("expected 4 fields, found {}", fields.len()))?;
        Ok(Instr {
            op: Opcode::parse(op),
            dest: Operand::parse(dest),
            src1: Operand::parse(src1),
            src2: Operand::parse(src2),
        })
    }
}

/// Parses a listing produced by [`Listing`]. Blank lines and lines starting
/// with `#` are skipped.
pub fn parse_program(text: &str) -> Result<Program, ParseError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            line.parse().map_err(|message| ParseError {
                line: i + 1,
                message,
            })
        })
        .collect()
}

/// Splits on top-level commas, leaving commas inside string literals alone.
fn split_fields(s: &str) -> Result<Vec<&str>, String> {
    let mut fields = Vec::with_capacity(4);
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ',' if !in_string => {
                fields.push(s[start..i].trim());
                start = i + 1;
            }
            _ => (),
        }
    }
    if in_string {
        return Err("unterminated string literal".to_string());
    }
    fields.push(s[start..].trim());
    Ok(fields)
}
