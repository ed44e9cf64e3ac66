//! # Public API
//!
//! `spec.md` §6.1. Three entry points into the core: [`check`] (lex/parse/
//! validate only), [`compile`] (the full pipeline through Score-IR), and
//! [`parse_only`] (a single-module parse with no module loading). Grounded on
//! the teacher's own `compile`/`compile_unchecked` pair in shape — a thin
//! facade wiring the pipeline stages together and translating results into a
//! plain struct the caller can match on, rather than a long `Result` chain.

use crate::ast::Program;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Severity};
use crate::error::CoreError;
use crate::ir::ScoreIr;
use crate::module::Loader;
use crate::source::{FileId, SourceMap};
use crate::value::Value;

/// Tunable limits, mirroring the teacher's practice of keeping "compile with
/// options" separate from the zero-configuration happy path (§4.G, §6.3).
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub recursion_limit: usize,
    pub max_parse_errors: usize,
    pub ir_version: i64,
    pub generator: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            recursion_limit: 512,
            max_parse_errors: 100,
            ir_version: crate::ir::IR_VERSION,
            generator: "tako-core".to_string(),
        }
    }
}

pub struct CheckResult {
    pub diagnostics: Vec<Diagnostic>,
    pub ast: Option<Program>,
}

pub struct CompileResult {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub ast: Option<Program>,
    pub ir: Option<ScoreIr>,
}

pub struct ParseOnlyResult {
    pub program: Option<Program>,
    pub error: Option<CoreError>,
}

/// `check(source, entry_path)`: lex, parse, and run the validation pass, but
/// never evaluate. No module loading occurs beyond the entry module itself,
/// since `import`ed modules are only needed to resolve values, not to find
/// static mistakes in the entry module's own syntax.
pub fn check(source: &str, entry_path: &str) -> CheckResult {
    if entry_path.is_empty() {
        let mut diagnostics = Vec::new();
        diagnostics.push(Diagnostic::error(
            DiagnosticCode::UnexpectedEof,
            "entry path must not be empty",
            crate::diagnostics::dummy_span(FileId(0)),
        ));
        return CheckResult { diagnostics, ast: None };
    }
    let mut sources = SourceMap::new();
    let file = sources.add_file(entry_path, source);
    let parsed = crate::parser::parse(source, file);
    let mut diagnostics = parsed.diagnostics;
    crate::validate::validate_program(&parsed.program, &mut diagnostics);
    CheckResult { diagnostics, ast: Some(parsed.program) }
}

/// `compile(source, entry_path)`: the full pipeline. `ir` is present iff no
/// diagnostic of `error` severity was produced anywhere in the pipeline
/// (§6.1, §6.4).
pub fn compile(source: &str, entry_path: &str) -> CompileResult {
    compile_with_options(source, entry_path, &CompilerOptions::default())
}

pub fn compile_with_options(source: &str, entry_path: &str, options: &CompilerOptions) -> CompileResult {
    if entry_path.is_empty() {
        let diagnostics = vec![Diagnostic::error(
            DiagnosticCode::UnexpectedEof,
            "entry path must not be empty",
            crate::diagnostics::dummy_span(FileId(0)),
        )];
        return CompileResult { success: false, diagnostics, ast: None, ir: None };
    }

    let mut sources = SourceMap::new();
    let file = sources.add_file(entry_path, source);
    let parsed = crate::parser::parse(source, file);
    let mut diagnostics = parsed.diagnostics;
    crate::validate::validate_program(&parsed.program, &mut diagnostics);
    let ast = parsed.program.clone();

    let entry_span = crate::diagnostics::dummy_span(file);
    let mut loader = Loader::new(&mut sources);
    loader.modules_mut().insert(
        entry_path.to_string(),
        crate::module::Module {
            path: entry_path.to_string(),
            file,
            program: parsed.program,
            scope: crate::value::Scope::root(),
            exports: std::collections::BTreeMap::new(),
            state: crate::module::ModuleState::Evaluating,
        },
    );

    let exports = crate::eval::evaluate_module(&mut loader, entry_path, &mut diagnostics);
    if !exports.contains_key("main") {
        diagnostics.push(Diagnostic::error(DiagnosticCode::MainNotFound, "entry module has no exported `main`", entry_span));
        let success = !diagnostics.iter().any(|d| d.severity == Severity::Error);
        return CompileResult { success, diagnostics, ast: Some(ast), ir: None };
    }

    let scope = loader.modules().get(entry_path).unwrap().scope.clone();
    let main_value = scope.get("main");
    let score_value = match main_value {
        Some(Value::Score(s)) => Some(*s),
        Some(Value::Function(func)) => {
            let mut eval_ctx = crate::eval::EvalContext::new(&mut loader, &mut diagnostics);
            eval_ctx.recursion_limit = options.recursion_limit;
            match eval_ctx.call_zero_arg(&func) {
                Some(Value::Score(s)) => Some(*s),
                Some(_) | None => {
                    diagnostics.push(Diagnostic::error(
                        DiagnosticCode::MainReturnedNonScore,
                        "`main` did not evaluate to a Score value",
                        entry_span,
                    ));
                    None
                }
            }
        }
        _ => {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::MainReturnedNonScore,
                "`main` did not evaluate to a Score value",
                entry_span,
            ));
            None
        }
    };

    let has_errors = diagnostics.iter().any(|d| d.is_error());
    if has_errors || score_value.is_none() {
        return CompileResult { success: false, diagnostics, ast: Some(ast), ir: None };
    }

    let source_hash = content_hash(source);
    let ir = crate::ir::normalize(&score_value.unwrap(), &options.generator, &source_hash, entry_span, &mut diagnostics);
    let success = !diagnostics.iter().any(|d| d.is_error());
    CompileResult { success, diagnostics, ast: Some(ast), ir: if success { Some(ir) } else { None } }
}

/// `parse_only(source)`: a single-module parse producing either a `Program`
/// or a fatal [`CoreError`] — no diagnostics are surfaced in this call
/// (lex/parse errors are recoverable and belong in `check`'s result, not
/// here), so `parse_only` only fails on conditions that make parsing itself
/// impossible to attempt.
pub fn parse_only(source: &str) -> ParseOnlyResult {
    let mut sources = SourceMap::new();
    let file = sources.add_file("<parse_only>", source);
    let result = crate::parser::parse(source, file);
    ParseOnlyResult { program: Some(result.program), error: None }
}

/// A stable, non-cryptographic content hash for `tako.source_hash` (§6.3).
/// Cryptographic strength is not required here; this is a change-detection
/// fingerprint, not a security boundary.
fn content_hash(source: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for byte in source.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_reports_parse_errors_without_evaluating() {
        let result = check("const = ;", "entry.mfs");
        assert!(result.diagnostics.iter().any(|d| d.is_error()));
    }

    #[test]
    fn compile_empty_entry_path_is_an_error() {
        let result = compile("const main = 1;", "");
        assert!(!result.success);
        assert!(result.ir.is_none());
    }

    #[test]
    fn compile_without_main_reports_main_not_found() {
        let result = compile("const x = 1;", "entry.mfs");
        assert!(!result.success);
        assert!(result.diagnostics.iter().any(|d| d.code == DiagnosticCode::MainNotFound));
    }

    #[test]
    fn compile_full_score_produces_ir() {
        let src = r#"
            export const main = score {
                meter { 0 -> 4/4; }
                tempo { 0 -> 120 bpm; }
                sound "lead" kind instrument { }
                track "melody" role Instrument sound "lead" {
                    place 1:1 clip { note(C4, q); }
                }
            };
        "#;
        let result = compile(src, "entry.mfs");
        assert!(result.success, "diagnostics: {:?}", result.diagnostics);
        let ir = result.ir.expect("ir present on success");
        assert_eq!(ir.tako.ir_version, 4);
        assert_eq!(ir.tracks.len(), 1);
    }

    #[test]
    fn parse_only_returns_program() {
        let result = parse_only("const x = 1;");
        assert!(result.program.is_some());
        assert!(result.error.is_none());
    }
}
