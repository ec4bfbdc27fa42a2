use std::{fmt, iter::Peekable};

use log::debug;

use crate::handle::Counter;
use crate::ir::{ArithOp, Instr, LabelId, LogicOp, Opcode, Operand, Program, RelOp, TempId};
use crate::lexer::Lexer;
use crate::token::TokenKind::*;
use crate::token::*;
use crate::types::Ty;
use crate::value::Value;

/// Recursive-descent parser that emits IR while it recognizes the input.
///
/// Each binary or unary operator application gets a fresh temporary and one
/// instruction; control flow is lowered to `LABEL`/`JUMP`/`IF` on the spot.
/// Temporary and label counters belong to the parser, so two parsers never
/// share names.
#[derive(Debug)]
pub struct Parser<I: Iterator<Item = Token>> {
    tokens: Peekable<I>,
    code: Program,
    temps: Counter<TempId>,
    labels: Counter<LabelId>,
    loops: Vec<Loop>,
    last: (u32, u32),
}

/// Jump targets of the innermost enclosing loop.
#[derive(Copy, Clone, Debug)]
struct Loop {
    cont: LabelId,
    exit: LabelId,
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, PartialEq, Eq, Hash, Debug, thiserror::Error)]
#[error("syntax error at {line}:{column}: expected {expected}, found {found}")]
pub struct Error {
    pub expected: std::string::String,
    pub found: std::string::String,
    pub line: u32,
    pub column: u32,
}

macro_rules! expected {
    ($self:ident, $expected:expr, found: $found:expr) => {
        Err($self.unexpected($expected, $found))
    };
}

/// Tokenizes and compiles a whole program.
pub fn compile(source: &str) -> Result<Program> {
    Parser::new(Lexer::new(source)).parse()
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            tokens: tokens.into_iter().peekable(),
            code: Program::new(),
            temps: Counter::new(),
            labels: Counter::new(),
            loops: Vec::new(),
            last: (1, 1),
        }
    }

    /// `<type> IDENT '(' ')' <block>` followed by the end of input.
    pub fn parse(mut self) -> Result<Program> {
        self.parse_type()?;
        self.expect(Variable)?;
        self.expect(OpenParen)?;
        self.expect(CloseParen)?;
        self.parse_block()?;
        if let Some(token) = self.next() {
            return expected!(self, "end of input", found: Some(&token));
        }
        debug!(
            "compiled {} instructions ({} temps, {} labels)",
            self.code.len(),
            self.temps.count(),
            self.labels.count()
        );
        Ok(self.code)
    }

    fn parse_block(&mut self) -> Result<()> {
        self.expect(OpenBrace)?;
        loop {
            match self.peek_kind() {
                Some(CloseBrace) => break,
                Some(_) => self.parse_stmt()?,
                None => return expected!(self, CloseBrace, found: None),
            }
        }
        self.next();
        Ok(())
    }

    fn parse_stmt(&mut self) -> Result<()> {
        let (kind, keyword) = match self.tokens.peek() {
            Some(token) => (token.kind, token.keyword()),
            None => return expected!(self, "statement", found: None),
        };
        match (kind, keyword) {
            (_, Some(kw)) if Ty::from_keyword(kw).is_some() => self.parse_declaration(),
            (Variable, _) => {
                self.parse_assignment()?;
                self.expect(Semicolon)?;
                Ok(())
            }
            (OpenBrace, _) => self.parse_block(),
            (Semicolon, _) => {
                self.next();
                Ok(())
            }
            (_, Some(Keyword::If)) => self.parse_if(),
            (_, Some(Keyword::While)) => self.parse_while(),
            (_, Some(Keyword::For)) => self.parse_for(),
            (_, Some(Keyword::Break | Keyword::Continue)) => self.parse_loop_jump(),
            (_, Some(Keyword::System)) => self.parse_io(),
            _ => {
                let token = self.next();
                expected!(self, "statement", found: token.as_ref())
            }
        }
    }

    /// `type identList ';'`: every name starts at the type's zero value.
    fn parse_declaration(&mut self) -> Result<()> {
        let ty = self.parse_type()?;
        loop {
            let ident = self.expect_name()?;
            self.emit(Instr::assign(ident.lexeme, ty.zero()));
            if self.next_if(Comma).is_none() {
                break;
            }
        }
        self.expect(Semicolon)?;
        Ok(())
    }

    /// `IDENT op expr` without the trailing `;`, so `for` headers can share it.
    fn parse_assignment(&mut self) -> Result<()> {
        let ident = self.expect_name()?;
        let token = self.next();
        let op = match token.as_ref().map(|t| t.kind) {
            Some(Assign) => None,
            Some(AddAssign) => Some(ArithOp::Add),
            Some(SubAssign) => Some(ArithOp::Sub),
            Some(MulAssign) => Some(ArithOp::Mul),
            Some(DivAssign) => Some(ArithOp::Div),
            Some(ModAssign) => Some(ArithOp::Rem),
            _ => return expected!(self, "assignment operator", found: token.as_ref()),
        };
        let value = self.parse_expr()?;
        match op {
            None => self.emit(Instr::assign(ident.lexeme, value)),
            Some(op) => {
                let temp = self.next_temp();
                self.emit(Instr::new(
                    Opcode::Arith(op),
                    temp,
                    ident.lexeme.as_str(),
                    value,
                ));
                self.emit(Instr::assign(ident.lexeme, temp));
            }
        }
        Ok(())
    }

    fn parse_if(&mut self) -> Result<()> {
        self.next();
        let cond = self.parse_cond()?;
        let then = self.next_label();
        let otherwise = self.next_label();
        let end = self.next_label();
        self.emit(Instr::new(Opcode::If, cond, then, otherwise));
        self.emit(Instr::label(then));
        self.parse_stmt()?;
        self.emit(Instr::jump(end));
        self.emit(Instr::label(otherwise));
        if self.peek_keyword() == Some(Keyword::Else) {
            self.next();
            self.parse_stmt()?;
        }
        self.emit(Instr::label(end));
        Ok(())
    }

    fn parse_while(&mut self) -> Result<()> {
        self.next();
        let start = self.next_label();
        let body = self.next_label();
        let end = self.next_label();
        self.emit(Instr::label(start));
        let cond = self.parse_cond()?;
        self.emit(Instr::new(Opcode::If, cond, body, end));
        self.emit(Instr::label(body));
        self.parse_loop_body(Loop {
            cont: start,
            exit: end,
        })?;
        self.emit(Instr::jump(start));
        self.emit(Instr::label(end));
        Ok(())
    }

    /// `for (init; cond; step) stmt`. The step is parsed before the body but
    /// belongs after it, so its instructions are cut out and re-emitted.
    fn parse_for(&mut self) -> Result<()> {
        self.next();
        self.expect(OpenParen)?;
        if self.peek_kind() == Some(Variable) {
            self.parse_assignment()?;
        }
        self.expect(Semicolon)?;

        let start = self.next_label();
        let body = self.next_label();
        let step = self.next_label();
        let end = self.next_label();

        self.emit(Instr::label(start));
        if self.peek_kind() != Some(Semicolon) {
            let cond = self.parse_expr()?;
            self.emit(Instr::new(Opcode::If, cond, body, end));
        }
        self.expect(Semicolon)?;

        let step_start = self.code.len();
        if self.peek_kind() == Some(Variable) {
            self.parse_assignment()?;
        }
        let step_code = self.code.split_off(step_start);
        self.expect(CloseParen)?;

        self.emit(Instr::label(body));
        self.parse_loop_body(Loop {
            cont: step,
            exit: end,
        })?;
        self.emit(Instr::jump(step));
        self.emit(Instr::label(step));
        self.code.extend(step_code);
        self.emit(Instr::jump(start));
        self.emit(Instr::label(end));
        Ok(())
    }

    fn parse_loop_body(&mut self, ctx: Loop) -> Result<()> {
        self.loops.push(ctx);
        let res = self.parse_stmt();
        self.loops.pop();
        res
    }

    /// `break ;` or `continue ;`, jumping to the innermost loop's targets.
    fn parse_loop_jump(&mut self) -> Result<()> {
        let token = self.next();
        let Some(ctx) = self.loops.last().copied() else {
            return expected!(self, "enclosing loop", found: token.as_ref());
        };
        let to = match token.as_ref().and_then(Token::keyword) {
            Some(Keyword::Break) => ctx.exit,
            _ => ctx.cont,
        };
        self.expect(Semicolon)?;
        self.emit(Instr::jump(to));
        Ok(())
    }

    /// `system.out.print(item, ...);` or `system.in.scan(type, ident);`
    fn parse_io(&mut self) -> Result<()> {
        self.next();
        self.expect(Dot)?;
        let token = self.next();
        match token.as_ref().and_then(Token::keyword) {
            Some(Keyword::Out) => {
                self.expect(Dot)?;
                self.expect_keyword(Keyword::Print)?;
                self.expect(OpenParen)?;
                if self.peek_kind() != Some(CloseParen) {
                    loop {
                        let item = self.parse_expr()?;
                        self.emit(Instr::new(Opcode::Call, "PRINT", item, Operand::Empty));
                        if self.next_if(Comma).is_none() {
                            break;
                        }
                    }
                }
                self.expect(CloseParen)?;
            }
            Some(Keyword::In) => {
                self.expect(Dot)?;
                self.expect_keyword(Keyword::Scan)?;
                self.expect(OpenParen)?;
                let ty = self.parse_type()?;
                self.expect(Comma)?;
                let ident = self.expect_name()?;
                self.expect(CloseParen)?;
                self.emit(Instr::new(
                    Opcode::Call,
                    "SCAN",
                    ty.to_string(),
                    ident.lexeme,
                ));
            }
            _ => return expected!(self, "`out` or `in`", found: token.as_ref()),
        }
        self.expect(Semicolon)?;
        Ok(())
    }

    fn parse_cond(&mut self) -> Result<Operand> {
        self.expect(OpenParen)?;
        let cond = self.parse_expr()?;
        self.expect(CloseParen)?;
        Ok(cond)
    }

    fn parse_type(&mut self) -> Result<Ty> {
        let token = self.next();
        match token.as_ref().and_then(Token::keyword).and_then(Ty::from_keyword) {
            Some(ty) => Ok(ty),
            None => expected!(self, "type", found: token.as_ref()),
        }
    }
}

// Expressions
// ===========

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn parse_expr(&mut self) -> Result<Operand> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Operand> {
        let mut lhs = self.parse_and()?;
        while self.next_if(LogicalOr).is_some() {
            let rhs = self.parse_and()?;
            lhs = self.emit_op(Opcode::Logic(LogicOp::Or), lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Operand> {
        let mut lhs = self.parse_not()?;
        while self.next_if(LogicalAnd).is_some() {
            let rhs = self.parse_not()?;
            lhs = self.emit_op(Opcode::Logic(LogicOp::And), lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Operand> {
        if self.next_if(LogicalNot).is_some() {
            let operand = self.parse_not()?;
            return Ok(self.emit_op(Opcode::Logic(LogicOp::Not), operand, Operand::Empty));
        }
        self.parse_rel()
    }

    /// Relational operators don't chain: `a < b < c` stops after `a < b`.
    fn parse_rel(&mut self) -> Result<Operand> {
        let lhs = self.parse_add()?;
        let op = match self.peek_kind() {
            Some(Equal) => RelOp::EqualTo,
            Some(NotEqual) => RelOp::NotEqualTo,
            Some(Less) => RelOp::LessThan,
            Some(Greater) => RelOp::GreaterThan,
            Some(LessEqual) => RelOp::LessThanOrEqualTo,
            Some(GreaterEqual) => RelOp::GreaterThanOrEqualTo,
            _ => return Ok(lhs),
        };
        self.next();
        let rhs = self.parse_add()?;
        Ok(self.emit_op(Opcode::Rel(op), lhs, rhs))
    }

    fn parse_add(&mut self) -> Result<Operand> {
        let mut lhs = self.parse_mult()?;
        loop {
            let op = match self.peek_kind() {
                Some(Add) => ArithOp::Add,
                Some(Sub) => ArithOp::Sub,
                _ => break Ok(lhs),
            };
            self.next();
            let rhs = self.parse_mult()?;
            lhs = self.emit_op(Opcode::Arith(op), lhs, rhs);
        }
    }

    fn parse_mult(&mut self) -> Result<Operand> {
        let mut lhs = self.parse_uno()?;
        loop {
            let op = match self.peek_kind() {
                Some(Mul) => ArithOp::Mul,
                Some(Div) => ArithOp::Div,
                Some(Mod) => ArithOp::Rem,
                _ => break Ok(lhs),
            };
            self.next();
            let rhs = self.parse_uno()?;
            lhs = self.emit_op(Opcode::Arith(op), lhs, rhs);
        }
    }

    fn parse_uno(&mut self) -> Result<Operand> {
        let op = match self.peek_kind() {
            Some(Add) => ArithOp::Add,
            Some(Sub) => ArithOp::Sub,
            _ => return self.parse_factor(),
        };
        self.next();
        let operand = self.parse_uno()?;
        Ok(self.emit_op(Opcode::Arith(op), operand, Operand::Empty))
    }

    fn parse_factor(&mut self) -> Result<Operand> {
        let token = self.next();
        let Some(token) = token else {
            return expected!(self, "expression", found: None);
        };
        match token.kind {
            DecimalInt | Float | ScientificFloat | OctalInt | HexadecimalInt | String => {
                match Value::parse_literal(&token.lexeme) {
                    Some(value) => Ok(Operand::Const(value)),
                    None => expected!(self, "literal in range", found: Some(&token)),
                }
            }
            Variable if is_bool_lexeme(&token.lexeme) => {
                Ok(Operand::Const(Value::Bool(token.lexeme == "true")))
            }
            Variable => Ok(Operand::Name(token.lexeme)),
            OpenParen => {
                let expr = self.parse_expr()?;
                self.expect(CloseParen)?;
                Ok(expr)
            }
            _ => expected!(self, "expression", found: Some(&token)),
        }
    }
}

// Emission and token plumbing
// ===========================

impl<I: Iterator<Item = Token>> Parser<I> {
    fn emit(&mut self, instr: Instr) {
        self.code.push(instr);
    }

    /// Emits `(op, temp, lhs, rhs)` into a fresh temporary and returns it.
    fn emit_op(&mut self, op: Opcode, lhs: Operand, rhs: Operand) -> Operand {
        let temp = self.next_temp();
        self.emit(Instr::new(op, temp, lhs, rhs));
        Operand::from(temp)
    }

    fn next_temp(&mut self) -> TempId {
        self.temps.fresh()
    }

    fn next_label(&mut self) -> LabelId {
        self.labels.fresh()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.next()?;
        self.last = (token.line, token.column + token.lexeme.chars().count() as u32);
        Some(token)
    }

    fn next_if(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek_kind() == Some(kind) {
            self.next()
        } else {
            None
        }
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.tokens.peek().map(|t| t.kind)
    }

    fn peek_keyword(&mut self) -> Option<Keyword> {
        self.tokens.peek().and_then(Token::keyword)
    }

    #[inline]
    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        match self.next() {
            Some(token) if token.kind == kind => Ok(token),
            token => expected!(self, kind, found: token.as_ref()),
        }
    }

    /// A variable that can be assigned. `true` and `false` are constants.
    fn expect_name(&mut self) -> Result<Token> {
        match self.next() {
            Some(token) if token.kind == Variable && !is_bool_lexeme(&token.lexeme) => Ok(token),
            token => expected!(self, "variable name", found: token.as_ref()),
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<Token> {
        match self.next() {
            Some(token) if token.is_keyword(kw) => Ok(token),
            token => expected!(self, kw, found: token.as_ref()),
        }
    }

    /// Builds the error for `found`; a missing token means end of input and
    /// is reported just past the last token.
    fn unexpected(&self, expected: impl fmt::Display, found: Option<&Token>) -> Error {
        let (found, (line, column)) = match found {
            Some(token) => (token.to_string(), (token.line, token.column)),
            None => ("EOF".to_string(), self.last),
        };
        Error {
            expected: expected.to_string(),
            found,
            line,
            column,
        }
    }
}

fn is_bool_lexeme(lexeme: &str) -> bool {
    matches!(lexeme, "true" | "false")
}
