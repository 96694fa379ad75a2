//! Compiler pipeline: lexing and parsing live in `cz-lexer`/`cz-parser`;
//! this crate resolves imports, collects declarations, type-checks,
//! analyzes lifetimes and stack size, and emits C.

pub mod codegen;
pub mod decl_collector;
pub mod lifetime_analyzer;
pub mod module_resolver;
pub mod pipeline;
pub mod type_checker;

pub use pipeline::{compile, CompileError, CompileOutput};
