//! # Tako Core
//!
//! The front end of the MFS (Musical Flow Score) language: lexer, parser,
//! module loader, evaluator, score normalizer, and diagnostic reporter. This
//! crate has no renderer, player, CLI, or LSP — it turns MFS source into a
//! validated Score-IR document, or a list of diagnostics explaining why it
//! couldn't.
//!
//! ## Compilation Pipeline
//!
//! ```text
//! .mfs source → Lexer → Parser → Validate → Module Loader → Evaluator → Score-IR
//! ```
//!
//! 1. **Lexer** ([`lexer`]) - Tokenizes MFS source into tokens with location info
//! 2. **Parser** ([`parser`]) - Parses tokens into an Abstract Syntax Tree
//! 3. **Validate** ([`validate`]) - Static checks over the AST (duplicate ids,
//!    invalid sound kinds/track roles, out-of-range literals) that don't
//!    require evaluation
//! 4. **Module loader** ([`module`]) - Resolves `import` paths (including the
//!    virtual `std:` modules in [`stdlib`]), detects import cycles
//! 5. **Evaluator** ([`eval`]) - A tree-walking interpreter that hoists
//!    declarations, evaluates `const`s in source order, and runs `main`
//! 6. **Normalizer** ([`ir`]) - Resolves every musical position to an exact
//!    tick offset and produces the serializable Score-IR
//!
//! ## Quick Start
//!
//! ```rust
//! use tako_core::compile;
//!
//! let source = r#"
//!     export const main = score {
//!         meter { 0 -> 4/4; }
//!         tempo { 0 -> 120 bpm; }
//!         sound "lead" kind instrument { }
//!         track "melody" role Instrument sound "lead" {
//!             place 1:1 clip { note(C4, q); }
//!         }
//!     };
//! "#;
//!
//! let result = tako_core::compile(source, "entry.mfs");
//! assert!(result.success);
//! ```
//!
//! ## Public API Entry Points
//!
//! - [`check()`] - Lex, parse, and statically validate; never evaluates.
//! - [`compile()`] - The full pipeline through Score-IR (recommended).
//! - [`compile_with_options()`] - The full pipeline with tunable limits.
//! - [`parse_only()`] - A single-module parse with no module loading.
//!
//! ## Module Structure
//!
//! - [`ast`] - Abstract Syntax Tree type definitions
//! - [`error`] - Fatal error types ([`error::CoreError`])
//! - [`diagnostics`] - Structured, recoverable diagnostics ([`diagnostics::Diagnostic`])
//! - [`source`] - Source file and span tracking
//! - [`rational`] - Exact rational arithmetic ([`rational::Rat`])
//! - [`lexer`] - Tokenization
//! - [`parser`] - Parsing
//! - [`value`] - The runtime value model
//! - [`stdlib`] - Virtual `std:` modules
//! - [`module`] - Import resolution and module loading
//! - [`validate`] - Static AST validation
//! - [`eval`] - The tree-walking evaluator
//! - [`ir`] - Score-IR types and the normalizer
//! - [`format`] - The canonical pretty-printer
//! - [`api`] - The public facade tying the pipeline together

// Core modules
pub mod ast;
pub mod diagnostics;
pub mod error;
pub mod eval;
pub mod format;
pub mod ir;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod rational;
pub mod source;
pub mod stdlib;
pub mod validate;
pub mod value;

// Public API
pub mod api;

// Re-export core types
pub use ast::*;
pub use error::*;

// Re-export pipeline functions and key types for convenience
pub use api::{check, compile, compile_with_options, parse_only, CheckResult, CompileResult, CompilerOptions, ParseOnlyResult};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use format::{format_program, format_source};
pub use ir::ScoreIr;
pub use parser::parse;
pub use rational::Rat;
pub use validate::validate_program;
