//! Compiles a small C-like language to three-address code and runs it.
//!
//! Source text goes through [`lexer::Lexer`], then [`parser::Parser`], which
//! emits an [`ir::Program`] in a single pass. [`engine::Engine`] executes the
//! program against any `BufRead`/`Write` pair.

pub mod engine;
pub mod handle;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod types;
pub mod value;
pub mod vars;
