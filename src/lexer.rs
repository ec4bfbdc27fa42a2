use std::str::Chars;

use crate::token::Keyword;
use crate::token::Token;
use crate::token::TokenKind;
use crate::token::TokenKind::*;

/// Splits source text into [`Token`]s.
///
/// The lexer never fails: characters it does not understand, unterminated
/// strings, and unterminated block comments come out as [`TokenKind::Unknown`]
/// and are rejected by the parser with a position attached.
#[derive(Debug, Clone)]
pub struct Lexer<'source> {
    buf: &'source str,
    chars: Chars<'source>,
    rem: usize,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'source> Lexer<'source> {
    pub fn new(buf: &'source str) -> Self {
        Self {
            buf,
            chars: buf.chars(),
            rem: buf.len(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }
}

impl Lexer<'_> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn first(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next()
    }

    fn second(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next()
    }

    fn bump_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while let Some(c) = self.first() {
            if !predicate(c) {
                break;
            }
            self.bump();
        }
    }

    fn bumped(&self) -> usize {
        self.rem - self.chars.as_str().len()
    }

    fn flush(&mut self) {
        let len = self.chars.as_str().len();
        self.pos += self.rem - len;
        self.rem = len
    }

    fn token(&mut self, kind: TokenKind, line: u32, column: u32) -> Token {
        let len = self.bumped();
        let lexeme = self.buf[self.pos..self.pos + len].to_string();
        self.flush();
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }
}

impl Lexer<'_> {
    /// Consumes the rest of a `/* */` comment whose opening has already been
    /// bumped. Returns `false` if the input ends first.
    fn skip_block_comment(&mut self) -> bool {
        while let Some(c) = self.bump() {
            if c == '*' && self.first() == Some('/') {
                self.bump();
                return true;
            }
        }
        false
    }

    fn next_number(&mut self) -> TokenKind {
        self.bump_while(is_digit);

        let parse_expo = match self.first() {
            Some('.') => {
                self.bump();
                self.bump_while(is_digit);
                matches!(self.first(), Some('e' | 'E'))
            }
            Some('E' | 'e') => true,
            _ => return DecimalInt,
        };

        if !parse_expo {
            return Float;
        }

        self.bump();
        match self.first() {
            Some('+' | '-') => {
                self.bump();
                if !self.first().is_some_and(is_digit) {
                    return Unknown;
                }
                self.bump_while(is_digit);
            }
            Some(c) if is_digit(c) => self.bump_while(is_digit),
            _ => return Unknown,
        }

        ScientificFloat
    }

    fn next_radix_number(&mut self) -> TokenKind {
        match self.second() {
            Some('x' | 'X') => {
                self.bump();
                self.bump();
                self.bump_while(is_hexadecimal_digit);
                let digits = self.bumped() > 2;
                if self.first().is_some_and(is_ident_continue) {
                    self.bump_while(is_ident_continue);
                    return Unknown;
                }
                if digits {
                    HexadecimalInt
                } else {
                    Unknown
                }
            }
            Some(c) if is_octal_digit(c) => {
                self.bump();
                self.bump_while(is_octal_digit);
                if self.first().is_some_and(is_digit) {
                    self.bump_while(is_digit);
                    return Unknown;
                }
                OctalInt
            }
            Some('8' | '9') => {
                self.bump();
                self.bump_while(is_digit);
                Unknown
            }
            _ => self.next_number(),
        }
    }

    fn next_string(&mut self) -> TokenKind {
        self.bump(); // '"'
        loop {
            match self.bump() {
                None => return Unknown,
                Some('\\') => {
                    self.bump();
                }
                Some('"') => return String,
                Some(_) => (),
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        macro_rules! bump {
            [$n:expr; $kind:expr] => {
                {
                    for _ in 0..$n { self.bump(); }
                    $kind
                }
            };
        }

        let c = loop {
            match self.first()? {
                '/' if self.second() == Some('/') => {
                    self.bump_while(|c| c != '\n');
                }
                '/' if self.second() == Some('*') => {
                    self.flush();
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    self.bump();
                    if !self.skip_block_comment() {
                        return Some(self.token(Unknown, line, column));
                    }
                }
                c if c.is_whitespace() => {
                    self.bump_while(|c| c.is_whitespace());
                }
                c => break c,
            }
        };

        self.flush();
        let (line, column) = (self.line, self.column);

        let kind = match (c, self.second()) {
            ('|', Some('|')) => bump![2; LogicalOr],
            ('&', Some('&')) => bump![2; LogicalAnd],
            ('=', Some('=')) => bump![2; Equal],
            ('!', Some('=')) => bump![2; NotEqual],
            ('>', Some('=')) => bump![2; GreaterEqual],
            ('<', Some('=')) => bump![2; LessEqual],
            ('+', Some('=')) => bump![2; AddAssign],
            ('-', Some('=')) => bump![2; SubAssign],
            ('*', Some('=')) => bump![2; MulAssign],
            ('/', Some('=')) => bump![2; DivAssign],
            ('%', Some('=')) => bump![2; ModAssign],
            ('+', _) => bump![1; Add],
            ('-', _) => bump![1; Sub],
            ('*', _) => bump![1; Mul],
            ('/', _) => bump![1; Div],
            ('%', _) => bump![1; Mod],
            ('!', _) => bump![1; LogicalNot],
            ('>', _) => bump![1; Greater],
            ('<', _) => bump![1; Less],
            ('=', _) => bump![1; Assign],
            (';', _) => bump![1; Semicolon],
            (',', _) => bump![1; Comma],
            ('{', _) => bump![1; OpenBrace],
            ('}', _) => bump![1; CloseBrace],
            ('(', _) => bump![1; OpenParen],
            (')', _) => bump![1; CloseParen],
            ('.', _) => bump![1; Dot],
            ('"', _) => self.next_string(),
            (c, _) if is_ident_start(c) => {
                self.bump_while(is_ident_continue);
                let word = &self.buf[self.pos..self.pos + self.bumped()];
                match Keyword::from_lexeme(word) {
                    Some(_) => Identifier,
                    None => Variable,
                }
            }
            ('0', _) => self.next_radix_number(),
            (c, _) if is_digit(c) => self.next_number(),
            _ => bump![1; Unknown],
        };

        Some(self.token(kind, line, column))
    }
}

// Utility Functions
// =================

const fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

const fn is_octal_digit(ch: char) -> bool {
    matches!(ch, '0'..='7')
}

const fn is_hexadecimal_digit(ch: char) -> bool {
    ch.is_ascii_hexdigit()
}

fn is_ident_start(ch: char) -> bool {
    unicode_xid::UnicodeXID::is_xid_start(ch)
}

fn is_ident_continue(ch: char) -> bool {
    ch == '_' || unicode_xid::UnicodeXID::is_xid_continue(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_are_identifiers() {
        let tokens: Vec<Token> = Lexer::new("while count").collect();
        assert_eq!(tokens[0].kind, Identifier);
        assert_eq!(tokens[0].keyword(), Some(Keyword::While));
        assert_eq!(tokens[1].kind, Variable);
        assert_eq!(tokens[1].keyword(), None);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("42 0 017 0x1F 3.5 2.5e-3 7E2 5."),
            vec![
                DecimalInt,
                DecimalInt,
                OctalInt,
                HexadecimalInt,
                Float,
                ScientificFloat,
                ScientificFloat,
                Float
            ]
        );
        assert_eq!(kinds("0x"), vec![Unknown]);
        assert_eq!(kinds("1e+"), vec![Unknown]);
        assert_eq!(kinds("019"), vec![Unknown]);
        assert_eq!(kinds("09"), vec![Unknown]);
        assert_eq!(kinds("0.9 0"), vec![Float, DecimalInt]);
    }

    #[test]
    fn operators_prefer_longest_match() {
        assert_eq!(
            kinds("a += b == c && !d"),
            vec![Variable, AddAssign, Variable, Equal, Variable, LogicalAnd, LogicalNot, Variable]
        );
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens: Vec<Token> = Lexer::new("int a;\n  a = 1;").collect();
        let a = &tokens[3];
        assert_eq!(a.lexeme, "a");
        assert_eq!((a.line, a.column), (2, 3));
        let one = &tokens[5];
        assert_eq!((one.line, one.column), (2, 7));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("a // line\n/* block\n */ b"),
            vec![Variable, Variable]
        );
        let tokens: Vec<Token> = Lexer::new("a /* open").collect();
        assert_eq!(tokens[1].kind, Unknown);
        assert_eq!(tokens[1].lexeme, "/* open");
    }

    #[test]
    fn strings_keep_quotes_and_escapes() {
        let tokens: Vec<Token> = Lexer::new(r#""say \"hi\"\n" "open"#).collect();
        assert_eq!(tokens[0].kind, String);
        assert_eq!(tokens[0].lexeme, r#""say \"hi\"\n""#);
        assert_eq!(tokens[1].kind, Unknown);
    }

    #[test]
    fn unknown_characters() {
        assert_eq!(kinds("a @ b"), vec![Variable, Unknown, Variable]);
        assert_eq!(kinds("a & b"), vec![Variable, Unknown, Variable]);
    }
}
