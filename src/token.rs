use std::fmt;

#[derive(Eq, PartialEq, Clone, Hash, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    /// The reserved word this token spells, if it is one.
    pub fn keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Identifier => Keyword::from_lexeme(&self.lexeme),
            _ => None,
        }
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.keyword() == Some(kw)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.kind, self.lexeme)
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Hash, Debug)]
pub enum TokenKind {
    /// "+"
    Add,
    /// "-"
    Sub,
    /// "*"
    Mul,
    /// "/"
    Div,
    /// "%"
    Mod,
    /// "||"
    LogicalOr,
    /// "&&"
    LogicalAnd,
    /// "!"
    LogicalNot,
    /// "=="
    Equal,
    /// "!="
    NotEqual,
    /// ">"
    Greater,
    /// ">="
    GreaterEqual,
    /// "<"
    Less,
    /// "<="
    LessEqual,
    /// "="
    Assign,
    /// "+="
    AddAssign,
    /// "-="
    SubAssign,
    /// "*="
    MulAssign,
    /// "/="
    DivAssign,
    /// "%="
    ModAssign,

    /// ";"
    Semicolon,
    /// ","
    Comma,
    /// "{"
    OpenBrace,
    /// "}"
    CloseBrace,
    /// "("
    OpenParen,
    /// ")"
    CloseParen,
    /// "."
    Dot,

    /// "while", "int", "system"
    Identifier,
    /// "counter", "x1"
    Variable,
    /// "50", "0"
    DecimalInt,
    /// "3.0", "271.8"
    Float,
    /// "3.11e1", "14E+2", "271.8e-2"
    ScientificFloat,
    /// "0764"
    OctalInt,
    /// "0x1388"
    HexadecimalInt,
    /// ""\tThis was written by a \"Human\"\n""
    String,

    // Unknown token.
    Unknown,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let r = match self {
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            LogicalOr => "LOGICAL_OR",
            LogicalAnd => "LOGICAL_AND",
            LogicalNot => "LOGICAL_NOT",
            Equal => "EQUAL",
            NotEqual => "NOT_EQUAL",
            Greater => "GREATER",
            GreaterEqual => "GREATER_EQUAL",
            Less => "LESS",
            LessEqual => "LESS_EQUAL",
            Assign => "ASSIGN",
            AddAssign => "ADD_ASSIGN",
            SubAssign => "SUB_ASSIGN",
            MulAssign => "MUL_ASSIGN",
            DivAssign => "DIV_ASSIGN",
            ModAssign => "MOD_ASSIGN",
            Semicolon => "SEMICOLON",
            Comma => "COMMA",
            OpenBrace => "OPEN_BRACE",
            CloseBrace => "CLOSE_BRACE",
            OpenParen => "OPEN_PAREN",
            CloseParen => "CLOSE_PAREN",
            Dot => "DOT",
            Identifier => "IDENTIFIER",
            Variable => "VARIABLE",
            DecimalInt => "DECIMAL_INT",
            Float => "FLOAT",
            ScientificFloat => "SCIENTIFIC_FLOAT",
            OctalInt => "OCTAL_INT",
            HexadecimalInt => "HEXADECIMAL_INT",
            String => "STRING",
            Unknown => "UNKNOWN",
        };
        f.write_str(r)
    }
}

/// Reserved words. The lexer reports all of them as [`TokenKind::Identifier`];
/// the parser tells them apart by lexeme.
#[derive(PartialEq, Eq, Copy, Clone, Hash, Debug)]
pub enum Keyword {
    Int,
    Float,
    String,
    For,
    While,
    Break,
    Continue,
    If,
    Else,
    Return,
    System,
    Out,
    Print,
    In,
    Scan,
}

impl Keyword {
    pub fn from_lexeme(lexeme: &str) -> Option<Keyword> {
        use Keyword::*;
        let kw = match lexeme {
            "int" => Int,
            "float" => Float,
            "string" => String,
            "for" => For,
            "while" => While,
            "break" => Break,
            "continue" => Continue,
            "if" => If,
            "else" => Else,
            "return" => Return,
            "system" => System,
            "out" => Out,
            "print" => Print,
            "in" => In,
            "scan" => Scan,
            _ => return None,
        };
        Some(kw)
    }

    pub fn as_str(&self) -> &'static str {
        use Keyword::*;
        match self {
            Int => "int",
            Float => "float",
            String => "string",
            For => "for",
            While => "while",
            Break => "break",
            Continue => "continue",
            If => "if",
            Else => "else",
            Return => "return",
            System => "system",
            Out => "out",
            Print => "print",
            In => "in",
            Scan => "scan",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.as_str())
    }
}
