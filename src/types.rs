use std::fmt;

use crate::{token::Keyword, value::Value};

/// The declarable types. There is no type checking beyond this: a type
/// keyword only picks the zero value of a declaration and the coercion of a
/// `scan`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Ty {
    Int,
    Float,
    Str,
}

impl Ty {
    pub fn from_keyword(kw: Keyword) -> Option<Ty> {
        match kw {
            Keyword::Int => Some(Ty::Int),
            Keyword::Float => Some(Ty::Float),
            Keyword::String => Some(Ty::Str),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Ty> {
        Keyword::from_lexeme(name).and_then(Ty::from_keyword)
    }

    pub fn zero(self) -> Value {
        match self {
            Ty::Int => Value::Int(0),
            Ty::Float => Value::Float(0.0),
            Ty::Str => Value::Str(String::new()),
        }
    }

    /// Converts one line of input into a value of this type. `None` if the
    /// text is not a number of the right kind.
    pub fn coerce(self, text: &str) -> Option<Value> {
        match self {
            Ty::Int => match Value::parse_number(text.trim())? {
                Value::Int(n) => Some(Value::Int(n)),
                _ => None,
            },
            Ty::Float => Value::parse_number(text.trim())
                .and_then(|v| v.as_f64())
                .map(Value::Float),
            Ty::Str => Some(Value::Str(
                text.trim_end_matches(&['\n', '\r'][..]).to_string(),
            )),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int => f.write_str("int"),
            Ty::Float => f.write_str("float"),
            Ty::Str => f.write_str("string"),
        }
    }
}
