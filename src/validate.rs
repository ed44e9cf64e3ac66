//! # Validation pass
//!
//! `spec.md` §4.E. A pre-evaluation AST walk that catches static mistakes the
//! parser is happy to accept: duplicate sound ids, dangling `track.sound`
//! references, out-of-range literals. Grounded on the teacher's own
//! single-pass `Measure`/`Ending` validator (`semantic.rs` in the original
//! tree) — same shape (walk the tree, push a diagnostic, keep going), applied
//! to this language's score/clip sub-trees instead of Gen's measures.
//!
//! Only checks literal values; an expression computed at runtime (`bpm:
//! computeBpm()`) is left to the evaluator, which re-validates the resolved
//! value where the domain still requires it (see `eval::eval_clip`'s pitch
//! and cc range checks).

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::source::Span;

const VALID_SOUND_KINDS: &[&str] = &["instrument", "drumKit", "vocal", "fx"];
const VALID_TRACK_ROLES: &[&str] = &["Instrument", "Drums", "Vocal", "Automation"];
const VALID_METER_DENOMINATORS: &[i64] = &[1, 2, 4, 8, 16, 32, 64];

pub fn validate_program(program: &Program, diagnostics: &mut Vec<Diagnostic>) {
    for decl in &program.body {
        match decl {
            TopDecl::Fn(f) => validate_stmts(&f.body, diagnostics),
            TopDecl::Const(c) => {
                if c.was_let {
                    diagnostics.push(Diagnostic::error(
                        DiagnosticCode::LetAtModuleScope,
                        format!("`let {}` is not allowed at module scope; use `const`", c.name),
                        c.span,
                    ));
                }
                validate_expr(&c.value, diagnostics);
            }
            TopDecl::Enum(_) => {}
        }
    }
}

fn validate_stmts(stmts: &[Stmt], diagnostics: &mut Vec<Diagnostic>) {
    for stmt in stmts {
        validate_stmt(stmt, diagnostics);
    }
}

fn validate_stmt(stmt: &Stmt, diagnostics: &mut Vec<Diagnostic>) {
    match stmt {
        Stmt::Local { value, .. } => validate_expr(value, diagnostics),
        Stmt::Return(expr, _) => {
            if let Some(e) = expr {
                validate_expr(e, diagnostics);
            }
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            validate_expr(cond, diagnostics);
            validate_stmts(then_branch, diagnostics);
            if let Some(else_branch) = else_branch {
                validate_stmts(else_branch, diagnostics);
            }
        }
        Stmt::For { start, end, body, .. } => {
            validate_expr(start, diagnostics);
            validate_expr(end, diagnostics);
            validate_stmts(body, diagnostics);
        }
        Stmt::Assignment { value, .. } => validate_expr(value, diagnostics),
        Stmt::Expr(e) => validate_expr(e, diagnostics),
    }
}

fn validate_expr(expr: &Expr, diagnostics: &mut Vec<Diagnostic>) {
    match expr {
        Expr::Template(t) => {
            for e in &t.exprs {
                validate_expr(e, diagnostics);
            }
        }
        Expr::Array(items, _) => {
            for item in items {
                validate_expr(item, diagnostics);
            }
        }
        Expr::Object(fields, _) => {
            for (_, value) in fields {
                validate_expr(value, diagnostics);
            }
        }
        Expr::Binary { left, right, .. } => {
            validate_expr(left, diagnostics);
            validate_expr(right, diagnostics);
        }
        Expr::Unary { expr, .. } => validate_expr(expr, diagnostics),
        Expr::Call { callee, args, .. } => {
            validate_expr(callee, diagnostics);
            for arg in args {
                validate_expr(&arg.value, diagnostics);
            }
        }
        Expr::Member { object, .. } => validate_expr(object, diagnostics),
        Expr::Index { object, index, .. } => {
            validate_expr(object, diagnostics);
            validate_expr(index, diagnostics);
        }
        Expr::Match { scrutinee, arms, .. } => {
            validate_expr(scrutinee, diagnostics);
            for arm in arms {
                if let Some(p) = &arm.pattern {
                    validate_expr(p, diagnostics);
                }
                validate_expr(&arm.body, diagnostics);
            }
        }
        Expr::Arrow { body, .. } => match body {
            ArrowBody::Expr(e) => validate_expr(e, diagnostics),
            ArrowBody::Block(stmts) => validate_stmts(stmts, diagnostics),
        },
        Expr::Ternary { cond, then_branch, else_branch, .. } => {
            validate_expr(cond, diagnostics);
            validate_expr(then_branch, diagnostics);
            validate_expr(else_branch, diagnostics);
        }
        Expr::Range { start, end, .. } => {
            validate_expr(start, diagnostics);
            validate_expr(end, diagnostics);
        }
        Expr::Score(score) => validate_score(score, diagnostics),
        Expr::Clip(clip) => validate_clip(clip, diagnostics),
        Expr::Pitch(midi, span) => {
            if !(0..=127).contains(midi) {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::PitchOutOfRange,
                    format!("pitch {midi} is out of MIDI range [0,127]"),
                    *span,
                ));
            }
        }
        Expr::Int(_, _)
        | Expr::Float(_, _)
        | Expr::Str(_, _)
        | Expr::Bool(_, _)
        | Expr::Null(_)
        | Expr::Duration(_, _)
        | Expr::BarBeat { .. }
        | Expr::Ident(_, _) => {}
    }
}

fn literal_str(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Str(s, _) => Some(s),
        _ => None,
    }
}

fn literal_number(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Int(n, _) => Some(*n as f64),
        Expr::Float(f, _) => Some(*f),
        Expr::Duration(r, _) => Some(r.to_f64()),
        _ => None,
    }
}

fn validate_score(score: &ScoreExpr, diagnostics: &mut Vec<Diagnostic>) {
    let mut declared_sounds: Vec<(String, Span)> = Vec::new();

    for item in &score.items {
        match item {
            ScoreItem::Meta(block) => {
                for (_, expr) in &block.fields {
                    validate_expr(expr, diagnostics);
                }
            }
            ScoreItem::Tempo(block) => {
                for entry in &block.entries {
                    validate_expr(&entry.pos, diagnostics);
                    validate_expr(&entry.bpm, diagnostics);
                    if let Some(bpm) = literal_number(&entry.bpm) {
                        if bpm <= 0.0 {
                            diagnostics.push(Diagnostic::error(
                                DiagnosticCode::NonPositiveDuration,
                                format!("tempo must be greater than zero, found {bpm}"),
                                entry.span,
                            ));
                        }
                    }
                }
            }
            ScoreItem::Meter(block) => {
                for entry in &block.entries {
                    validate_expr(&entry.pos, diagnostics);
                    if entry.numerator <= 0 {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticCode::NonPositiveDuration,
                            format!("meter numerator must be a positive integer, found {}", entry.numerator),
                            entry.span,
                        ));
                    }
                    if !VALID_METER_DENOMINATORS.contains(&entry.denominator) {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticCode::BadMeterDenominator,
                            format!("meter denominator {} is not a power of two in [1,64]", entry.denominator),
                            entry.span,
                        ));
                    }
                }
            }
            ScoreItem::Sound(decl) => {
                validate_expr(&decl.id, diagnostics);
                for (_, expr) in &decl.fields {
                    validate_expr(expr, diagnostics);
                }
                if !VALID_SOUND_KINDS.contains(&decl.kind.as_str()) {
                    diagnostics.push(Diagnostic::error(
                        DiagnosticCode::InvalidSoundKind,
                        format!("`{}` is not a valid sound kind (expected one of {:?})", decl.kind, VALID_SOUND_KINDS),
                        decl.kind_span,
                    ));
                }
                if let Some(id) = literal_str(&decl.id) {
                    if let Some((_, prev_span)) = declared_sounds.iter().find(|(s, _)| s == id) {
                        diagnostics.push(
                            Diagnostic::error(
                                DiagnosticCode::DuplicateSoundId,
                                format!("duplicate sound id `{id}`"),
                                decl.span,
                            )
                            .with_related(*prev_span, "previously declared here"),
                        );
                    } else {
                        declared_sounds.push((id.to_string(), decl.span));
                    }
                }
            }
            ScoreItem::Track(decl) => {
                validate_expr(&decl.name, diagnostics);
                validate_expr(&decl.sound, diagnostics);
                if !VALID_TRACK_ROLES.contains(&decl.role.as_str()) {
                    diagnostics.push(Diagnostic::error(
                        DiagnosticCode::InvalidTrackRole,
                        format!("`{}` is not a valid track role (expected one of {:?})", decl.role, VALID_TRACK_ROLES),
                        decl.role_span,
                    ));
                }
                if let Some(sound_id) = literal_str(&decl.sound) {
                    if !declared_sounds.iter().any(|(s, _)| s == sound_id) {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticCode::UndefinedSound,
                            format!("track refers to undeclared sound `{sound_id}`"),
                            decl.sound.span(),
                        ));
                    }
                }
                for place in &decl.placements {
                    validate_expr(&place.pos, diagnostics);
                    validate_expr(&place.clip, diagnostics);
                }
            }
            ScoreItem::Marker(marker) => {
                validate_expr(&marker.pos, diagnostics);
                validate_expr(&marker.kind, diagnostics);
                validate_expr(&marker.label, diagnostics);
            }
        }
    }
}

fn check_positive_duration(expr: &Expr, diagnostics: &mut Vec<Diagnostic>) {
    validate_expr(expr, diagnostics);
    if let Some(d) = literal_number(expr) {
        if d <= 0.0 {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::NonPositiveDuration,
                format!("duration must be positive, found {d}"),
                expr.span(),
            ));
        }
    }
}

fn validate_clip(clip: &ClipExpr, diagnostics: &mut Vec<Diagnostic>) {
    for stmt in &clip.stmts {
        match stmt {
            ClipStmt::At(expr) => validate_expr(expr, diagnostics),
            ClipStmt::Rest { dur, .. } => check_positive_duration(dur, diagnostics),
            ClipStmt::Note { pitch, dur, .. } => {
                validate_expr(pitch, diagnostics);
                check_positive_duration(dur, diagnostics);
            }
            ClipStmt::Chord { pitches, dur, .. } => {
                validate_expr(pitches, diagnostics);
                check_positive_duration(dur, diagnostics);
            }
            ClipStmt::Hit { sound, dur, .. } => {
                validate_expr(sound, diagnostics);
                check_positive_duration(dur, diagnostics);
            }
            ClipStmt::Cc { controller, value, span } => {
                validate_expr(controller, diagnostics);
                validate_expr(value, diagnostics);
                if let (Some(c), Some(v)) = (literal_number(controller), literal_number(value)) {
                    if !(0.0..=127.0).contains(&c) || !(0.0..=127.0).contains(&v) {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticCode::CcOutOfRange,
                            "cc controller and value must be in [0,127]",
                            *span,
                        ));
                    }
                }
            }
            ClipStmt::Automation { param, value, dur, .. } => {
                validate_expr(param, diagnostics);
                validate_expr(value, diagnostics);
                check_positive_duration(dur, diagnostics);
            }
            ClipStmt::Marker { kind, label, .. } => {
                validate_expr(kind, diagnostics);
                validate_expr(label, diagnostics);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileId, SourceMap};

    fn diagnostics_for(src: &str) -> Vec<Diagnostic> {
        let file = FileId(0);
        let mut sources = SourceMap::new();
        sources.add_file("t.mfs", src);
        let parsed = crate::parser::parse(src, file);
        let mut diagnostics = parsed.diagnostics;
        validate_program(&parsed.program, &mut diagnostics);
        diagnostics
    }

    #[test]
    fn duplicate_sound_id_is_reported() {
        let src = r#"
            const main = score {
                sound "lead" kind instrument { }
                sound "lead" kind instrument { }
            };
        "#;
        let diags = diagnostics_for(src);
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::DuplicateSoundId));
    }

    #[test]
    fn undeclared_sound_reference_is_reported() {
        let src = r#"
            const main = score {
                track "piano" role Instrument sound "missing" { }
            };
        "#;
        let diags = diagnostics_for(src);
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::UndefinedSound));
    }

    #[test]
    fn bad_meter_denominator_is_reported() {
        let src = r#"
            const main = score {
                meter { 0 -> 4/5; }
            };
        "#;
        let diags = diagnostics_for(src);
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::BadMeterDenominator));
    }

    #[test]
    fn non_positive_bpm_is_reported() {
        let src = r#"
            const main = score {
                tempo { 0 -> -10 bpm; }
            };
        "#;
        let diags = diagnostics_for(src);
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::NonPositiveDuration));
    }

    #[test]
    fn valid_score_has_no_validation_diagnostics() {
        let src = r#"
            const main = score {
                sound "lead" kind instrument { }
                track "melody" role Instrument sound "lead" { }
            };
        "#;
        let diags = diagnostics_for(src);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    }

    #[test]
    fn let_at_module_scope_is_reported() {
        let diags = diagnostics_for("let x = 1;\n");
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::LetAtModuleScope));
    }

    #[test]
    fn const_at_module_scope_is_not_reported_as_let() {
        let diags = diagnostics_for("const x = 1;\n");
        assert!(!diags.iter().any(|d| d.code == DiagnosticCode::LetAtModuleScope));
    }

    #[test]
    fn out_of_range_pitch_literal_is_reported_without_evaluation() {
        let diags = diagnostics_for("const p = C10;\n");
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::PitchOutOfRange));
    }

    #[test]
    fn in_range_pitch_literal_is_not_reported() {
        let diags = diagnostics_for("const p = G9;\n");
        assert!(!diags.iter().any(|d| d.code == DiagnosticCode::PitchOutOfRange));
    }
}
