use std::fmt;

use crate::ir::{ArithOp, LogicOp, RelOp};

/// A resolved operand.
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Int(i64),
    Float(f64),
    /// The text between the quotes, with backslash escapes left as written.
    Str(String),
    Bool(bool),
}

/// A fault an operator recovers from. The engine logs it and stores a
/// default in place of the result.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum Fault {
    #[error("`{op}` cannot be applied to {lhs} and {rhs}")]
    OperatorType {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("`{op}` cannot be applied to {operand}")]
    UnaryType {
        op: &'static str,
        operand: &'static str,
    },
    #[error("`{op}` by zero")]
    DivisionByZero { op: &'static str },
    #[error("`{op}` is missing an operand")]
    MissingOperand { op: &'static str },
}

pub type Result<T> = std::result::Result<T, Fault>;

/// Result of `/`, `%` and `//` with a zero divisor.
pub const DIVISION_BY_ZERO_SENTINEL: Value = Value::Int(0);

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    fn is_zero(&self) -> bool {
        matches!(self, Value::Int(0)) || matches!(self, Value::Float(x) if *x == 0.0)
    }

    /// Classifies literal text: `"..."` strings, `true`/`false`, and numbers
    /// as [`Value::parse_number`] reads them.
    pub fn parse_literal(text: &str) -> Option<Value> {
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            return Some(Value::Str(text[1..text.len() - 1].to_string()));
        }
        match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => Value::parse_number(text),
        }
    }

    /// Reads decimal (`42`), octal (`052`), hexadecimal (`0x2A`), float
    /// (`4.2`) and scientific (`42e-1`) literals, with an optional leading
    /// `-`.
    pub fn parse_number(text: &str) -> Option<Value> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let value = if let Some(hex) = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            Value::Int(i64::from_str_radix(hex, 16).ok()?)
        } else if digits.len() > 1 && digits.starts_with('0') && digits.bytes().all(|b| b.is_ascii_digit()) {
            // leading zero means octal, so `08` and `019` are rejected
            if !digits.bytes().all(is_octal_digit) {
                return None;
            }
            Value::Int(i64::from_str_radix(&digits[1..], 8).ok()?)
        } else if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            Value::Int(digits.parse().ok()?)
        } else if is_float_literal(digits) {
            Value::Float(digits.parse().ok().filter(|x: &f64| x.is_finite())?)
        } else {
            return None;
        };
        if negative {
            value.neg().ok()
        } else {
            Some(value)
        }
    }

    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(Fault::UnaryType {
                op: "-",
                operand: other.type_name(),
            }),
        }
    }

    pub fn plus(&self) -> Result<Value> {
        match self {
            Value::Int(_) | Value::Float(_) => Ok(self.clone()),
            other => Err(Fault::UnaryType {
                op: "+",
                operand: other.type_name(),
            }),
        }
    }

    pub fn arith(&self, op: ArithOp, rhs: &Value) -> Result<Value> {
        match op {
            ArithOp::Add => match (self, rhs) {
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    Ok(Value::Str(format!("{self}{rhs}")))
                }
                _ => numeric("+", self, rhs, i64::wrapping_add, |a, b| a + b),
            },
            ArithOp::Sub => numeric("-", self, rhs, i64::wrapping_sub, |a, b| a - b),
            ArithOp::Mul => numeric("*", self, rhs, i64::wrapping_mul, |a, b| a * b),
            ArithOp::Div => divide("/", self, rhs, i64::wrapping_div, |a, b| a / b),
            ArithOp::Rem => divide("%", self, rhs, i64::wrapping_rem, |a, b| a % b),
            ArithOp::FloorDiv => divide("//", self, rhs, floor_div, |a, b| (a / b).floor()),
        }
    }

    pub fn logic(&self, op: LogicOp, rhs: Option<&Value>) -> Result<Value> {
        let rhs = || {
            rhs.ok_or(Fault::MissingOperand {
                op: match op {
                    LogicOp::Or => "||",
                    LogicOp::And => "&&",
                    LogicOp::Not => "!",
                },
            })
        };
        let result = match op {
            LogicOp::Or => self.truthy() || rhs()?.truthy(),
            LogicOp::And => self.truthy() && rhs()?.truthy(),
            LogicOp::Not => !self.truthy(),
        };
        Ok(Value::Bool(result))
    }

    /// Numbers compare numerically across int and float, strings
    /// lexicographically, bools only for (in)equality.
    pub fn relate(&self, op: RelOp, rhs: &Value) -> Result<bool> {
        let fault = || Fault::OperatorType {
            op: rel_symbol(op),
            lhs: self.type_name(),
            rhs: rhs.type_name(),
        };
        let ord = match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b))
                if matches!(op, RelOp::EqualTo | RelOp::NotEqualTo) =>
            {
                a.cmp(b)
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(fault)?,
                _ => return Err(fault()),
            },
        };
        Ok(op.holds(ord))
    }
}

fn numeric(
    op: &'static str,
    lhs: &Value,
    rhs: &Value,
    iop: impl Fn(i64, i64) -> i64,
    fop: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(iop(*a, *b))),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Float(fop(x, y))),
            _ => Err(Fault::OperatorType {
                op,
                lhs: lhs.type_name(),
                rhs: rhs.type_name(),
            }),
        },
    }
}

fn divide(
    op: &'static str,
    lhs: &Value,
    rhs: &Value,
    iop: impl Fn(i64, i64) -> i64,
    fop: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    if rhs.is_zero() && lhs.as_f64().is_some() {
        return Err(Fault::DivisionByZero { op });
    }
    numeric(op, lhs, rhs, iop, fop)
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn rel_symbol(op: RelOp) -> &'static str {
    match op {
        RelOp::EqualTo => "==",
        RelOp::NotEqualTo => "!=",
        RelOp::LessThan => "<",
        RelOp::GreaterThan => ">",
        RelOp::LessThanOrEqualTo => "<=",
        RelOp::GreaterThanOrEqualTo => ">=",
    }
}

const fn is_octal_digit(b: u8) -> bool {
    matches!(b, b'0'..=b'7')
}

/// `digits.digits`, `digits.`, or either followed by an exponent; `digits`
/// with an exponent alone also counts.
fn is_float_literal(s: &str) -> bool {
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    let (mantissa, exponent) = match s.find(|c: char| c == 'e' || c == 'E') {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    let (int, frac) = match mantissa.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (mantissa, None),
    };
    if int.is_empty() || !all_digits(int) {
        return false;
    }
    match (frac, exponent) {
        (Some(frac), _) if !all_digits(frac) => false,
        (None, None) => false,
        (_, None) => true,
        (_, Some(exp)) => {
            let exp = exp.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(exp);
            !exp.is_empty() && all_digits(exp)
        }
    }
}

/// Expands `\n`, `\t`, `\r`, `\0`, `\\` and `\"`. Other sequences are kept
/// as written.
pub fn interpret_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}
