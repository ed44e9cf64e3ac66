//! # Formatter (pretty-printer)
//!
//! `spec.md` §4.J. Parses source to an AST, then re-emits it in canonical
//! form: two-space indentation, a blank line between top-level declarations,
//! a trailing newline, and normalized string escapes. Comments are not
//! preserved — a known limitation of this minimal core, not an oversight.
//!
//! Grounded on the teacher's own recursive AST-to-text renderer (the same
//! "walk the tree, push text into a buffer, indent by nesting depth" shape
//! used for the teacher's notation pretty-printer), generalized to this
//! language's expression grammar.

use crate::ast::*;

const INDENT: &str = "  ";

pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    for import in &program.imports {
        write_import(&mut out, import);
    }
    if !program.imports.is_empty() && !program.body.is_empty() {
        out.push('\n');
    }
    for (i, decl) in program.body.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_top_decl(&mut out, decl, 0);
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn write_import(out: &mut String, import: &ImportDecl) {
    match &import.kind {
        ImportKind::Named(names) => {
            let parts: Vec<String> = names
                .iter()
                .map(|n| match &n.alias {
                    Some(alias) => format!("{} as {}", n.name, alias),
                    None => n.name.clone(),
                })
                .collect();
            out.push_str(&format!("import {{ {} }} from \"{}\";\n", parts.join(", "), import.path));
        }
        ImportKind::Namespace(ns) => {
            out.push_str(&format!("import * as {} from \"{}\";\n", ns, import.path));
        }
    }
}

fn write_top_decl(out: &mut String, decl: &TopDecl, depth: usize) {
    match decl {
        TopDecl::Fn(f) => write_fn_decl(out, f, depth),
        TopDecl::Const(c) => write_const_decl(out, c, depth),
        TopDecl::Enum(e) => write_enum_decl(out, e, depth),
    }
}

fn indent(depth: usize) -> String {
    INDENT.repeat(depth)
}

fn write_fn_decl(out: &mut String, f: &FnDecl, depth: usize) {
    if f.exported {
        out.push_str("export ");
    }
    out.push_str(&format!("fn {}({})", f.name, format_params(&f.params)));
    if let Some(ret) = &f.return_type {
        out.push_str(&format!(" -> {ret}"));
    }
    out.push_str(" {\n");
    write_stmts(out, &f.body, depth + 1);
    out.push_str(&format!("{}}}\n", indent(depth)));
}

fn write_const_decl(out: &mut String, c: &ConstDecl, depth: usize) {
    if c.exported {
        out.push_str("export ");
    }
    let kw = if c.was_let { "let" } else { "const" };
    out.push_str(&format!("{}{kw} {} = {};\n", indent(depth), c.name, format_expr(&c.value, depth)));
}

fn write_enum_decl(out: &mut String, e: &EnumDecl, depth: usize) {
    if e.exported {
        out.push_str("export ");
    }
    out.push_str(&format!("enum {} {{\n", e.name));
    for variant in &e.variants {
        out.push_str(&format!("{}{},\n", indent(depth + 1), variant));
    }
    out.push_str(&format!("{}}}\n", indent(depth)));
}

fn format_params(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| {
            let mut s = String::new();
            if p.rest {
                s.push_str("...");
            }
            s.push_str(&p.name);
            if let Some(default) = &p.default {
                s.push_str(&format!(" = {}", format_expr(default, 0)));
            }
            s
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_stmts(out: &mut String, stmts: &[Stmt], depth: usize) {
    for stmt in stmts {
        write_stmt(out, stmt, depth);
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let pad = indent(depth);
    match stmt {
        Stmt::Local { name, is_const, value, .. } => {
            let kw = if *is_const { "const" } else { "let" };
            out.push_str(&format!("{pad}{kw} {name} = {};\n", format_expr(value, depth)));
        }
        Stmt::Return(expr, _) => match expr {
            Some(e) => out.push_str(&format!("{pad}return {};\n", format_expr(e, depth))),
            None => out.push_str(&format!("{pad}return;\n")),
        },
        Stmt::If { cond, then_branch, else_branch, .. } => {
            out.push_str(&format!("{pad}if {} {{\n", format_expr(cond, depth)));
            write_stmts(out, then_branch, depth + 1);
            match else_branch {
                Some(else_stmts) => {
                    out.push_str(&format!("{pad}}} else {{\n"));
                    write_stmts(out, else_stmts, depth + 1);
                    out.push_str(&format!("{pad}}}\n"));
                }
                None => out.push_str(&format!("{pad}}}\n")),
            }
        }
        Stmt::For { var, start, end, inclusive, body, .. } => {
            let op = if *inclusive { "..=" } else { ".." };
            let start_str = format_expr(start, depth);
            let end_str = format_expr(end, depth);
            out.push_str(&format!("{pad}for {var} in {start_str}{op}{end_str} {{\n"));
            write_stmts(out, body, depth + 1);
            out.push_str(&format!("{pad}}}\n"));
        }
        Stmt::Assignment { target, value, .. } => {
            out.push_str(&format!("{pad}{} = {};\n", format_expr(target, depth), format_expr(value, depth)));
        }
        Stmt::Expr(e) => out.push_str(&format!("{pad}{};\n", format_expr(e, depth))),
    }
}

fn format_expr(expr: &Expr, depth: usize) -> String {
    match expr {
        Expr::Int(n, _) => n.to_string(),
        Expr::Float(f, _) => f.to_string(),
        Expr::Str(s, _) => format!("\"{}\"", escape_string(s)),
        Expr::Bool(b, _) => b.to_string(),
        Expr::Null(_) => "null".to_string(),
        Expr::Pitch(midi, _) => format!("Pitch({midi})"),
        Expr::Duration(r, _) => r.to_string(),
        Expr::BarBeat { bar, beat, sub, .. } => match sub {
            Some(s) => format!("{bar}:{beat}:{s}"),
            None => format!("{bar}:{beat}"),
        },
        Expr::Ident(name, _) => name.clone(),
        Expr::Template(t) => {
            let mut s = String::from("`");
            for (i, part) in t.parts.iter().enumerate() {
                s.push_str(part);
                if let Some(e) = t.exprs.get(i) {
                    s.push_str(&format!("${{{}}}", format_expr(e, depth)));
                }
            }
            s.push('`');
            s
        }
        Expr::Array(items, _) => {
            format!("[{}]", items.iter().map(|e| format_expr(e, depth)).collect::<Vec<_>>().join(", "))
        }
        Expr::Object(fields, _) => {
            let parts: Vec<String> = fields
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        ObjectKey::Ident(s) => s.clone(),
                        ObjectKey::Str(s) => format!("\"{}\"", escape_string(s)),
                    };
                    format!("{key}: {}", format_expr(v, depth))
                })
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
        Expr::Binary { op, left, right, .. } => {
            format!("{} {} {}", format_expr(left, depth), binary_op_str(*op), format_expr(right, depth))
        }
        Expr::Unary { op, expr, .. } => {
            let op_str = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "!",
            };
            format!("{op_str}{}", format_expr(expr, depth))
        }
        Expr::Call { callee, args, .. } => {
            let parts: Vec<String> = args
                .iter()
                .map(|a| match &a.name {
                    Some(n) => format!("{n}: {}", format_expr(&a.value, depth)),
                    None => format_expr(&a.value, depth),
                })
                .collect();
            format!("{}({})", format_expr(callee, depth), parts.join(", "))
        }
        Expr::Member { object, property, optional, .. } => {
            let op = if *optional { "?." } else { "." };
            format!("{}{op}{property}", format_expr(object, depth))
        }
        Expr::Index { object, index, optional, .. } => {
            let op = if *optional { "?.[" } else { "[" };
            format!("{}{op}{}]", format_expr(object, depth), format_expr(index, depth))
        }
        Expr::Match { scrutinee, arms, .. } => {
            let arms_str: Vec<String> = arms
                .iter()
                .map(|arm| match &arm.pattern {
                    Some(p) => format!("{} => {}", format_expr(p, depth), format_expr(&arm.body, depth)),
                    None => format!("else => {}", format_expr(&arm.body, depth)),
                })
                .collect();
            format!("match {} {{ {} }}", format_expr(scrutinee, depth), arms_str.join(", "))
        }
        Expr::Arrow { params, body, .. } => {
            let params_str = format_params(params);
            match body {
                ArrowBody::Expr(e) => format!("({params_str}) => {}", format_expr(e, depth)),
                ArrowBody::Block(stmts) => {
                    let mut inner = String::new();
                    write_stmts(&mut inner, stmts, depth + 1);
                    let close = indent(depth);
                    format!("({params_str}) => {{\n{inner}{close}}}")
                }
            }
        }
        Expr::Ternary { cond, then_branch, else_branch, .. } => {
            format!(
                "{} ? {} : {}",
                format_expr(cond, depth),
                format_expr(then_branch, depth),
                format_expr(else_branch, depth)
            )
        }
        Expr::Range { start, end, inclusive, .. } => {
            let op = if *inclusive { "..=" } else { ".." };
            format!("{}{op}{}", format_expr(start, depth), format_expr(end, depth))
        }
        Expr::Score(score) => format_score(score, depth),
        Expr::Clip(clip) => format_clip(clip, depth),
    }
}

fn format_score(score: &ScoreExpr, depth: usize) -> String {
    if score.items.is_empty() {
        return "score {}".to_string();
    }
    let inner_pad = indent(depth + 1);
    let mut body = String::new();
    for (i, item) in score.items.iter().enumerate() {
        if i > 0 {
            body.push('\n');
        }
        write_score_item(&mut body, item, depth + 1, &inner_pad);
    }
    format!("score {{\n{body}{}}}", indent(depth))
}

fn write_score_item(out: &mut String, item: &ScoreItem, depth: usize, pad: &str) {
    match item {
        ScoreItem::Meta(m) => {
            out.push_str(&format!("{pad}meta {{\n"));
            for (name, value) in &m.fields {
                out.push_str(&format!("{}{name} {};\n", indent(depth + 1), format_expr(value, depth + 1)));
            }
            out.push_str(&format!("{pad}}}\n"));
        }
        ScoreItem::Tempo(t) => {
            out.push_str(&format!("{pad}tempo {{\n"));
            for e in &t.entries {
                out.push_str(&format!(
                    "{}{} -> {}bpm;\n",
                    indent(depth + 1),
                    format_expr(&e.pos, depth + 1),
                    format_expr(&e.bpm, depth + 1)
                ));
            }
            out.push_str(&format!("{pad}}}\n"));
        }
        ScoreItem::Meter(m) => {
            out.push_str(&format!("{pad}meter {{\n"));
            for e in &m.entries {
                out.push_str(&format!(
                    "{}{} -> {}/{};\n",
                    indent(depth + 1),
                    format_expr(&e.pos, depth + 1),
                    e.numerator,
                    e.denominator
                ));
            }
            out.push_str(&format!("{pad}}}\n"));
        }
        ScoreItem::Sound(s) => {
            out.push_str(&format!("{pad}sound {} kind {} {{\n", format_expr(&s.id, depth), s.kind));
            for (name, value) in &s.fields {
                out.push_str(&format!("{}{name} {};\n", indent(depth + 1), format_expr(value, depth + 1)));
            }
            out.push_str(&format!("{pad}}}\n"));
        }
        ScoreItem::Track(t) => {
            out.push_str(&format!(
                "{pad}track {} role {} sound {} {{\n",
                format_expr(&t.name, depth),
                t.role,
                format_expr(&t.sound, depth)
            ));
            for p in &t.placements {
                out.push_str(&format!(
                    "{}place {} {};\n",
                    indent(depth + 1),
                    format_expr(&p.pos, depth + 1),
                    format_expr(&p.clip, depth + 1)
                ));
            }
            out.push_str(&format!("{pad}}}\n"));
        }
        ScoreItem::Marker(m) => {
            out.push_str(&format!(
                "{pad}marker {} kind {} label {};\n",
                format_expr(&m.pos, depth),
                format_expr(&m.kind, depth),
                format_expr(&m.label, depth)
            ));
        }
    }
}

fn format_clip(clip: &ClipExpr, depth: usize) -> String {
    if clip.stmts.is_empty() {
        return "clip {}".to_string();
    }
    let pad = indent(depth + 1);
    let mut body = String::new();
    for stmt in &clip.stmts {
        write_clip_stmt(&mut body, stmt, depth + 1, &pad);
    }
    format!("clip {{\n{body}{}}}", indent(depth))
}

fn write_clip_stmt(out: &mut String, stmt: &ClipStmt, depth: usize, pad: &str) {
    match stmt {
        ClipStmt::At(pos) => out.push_str(&format!("{pad}at {};\n", format_expr(pos, depth))),
        ClipStmt::Rest { dur, .. } => out.push_str(&format!("{pad}rest({});\n", format_expr(dur, depth))),
        ClipStmt::Note { pitch, dur, .. } => {
            out.push_str(&format!("{pad}note({}, {});\n", format_expr(pitch, depth), format_expr(dur, depth)));
        }
        ClipStmt::Chord { pitches, dur, .. } => {
            out.push_str(&format!("{pad}chord({}, {});\n", format_expr(pitches, depth), format_expr(dur, depth)));
        }
        ClipStmt::Hit { sound, dur, .. } => {
            out.push_str(&format!("{pad}hit({}, {});\n", format_expr(sound, depth), format_expr(dur, depth)));
        }
        ClipStmt::Cc { controller, value, .. } => {
            out.push_str(&format!("{pad}cc({}, {});\n", format_expr(controller, depth), format_expr(value, depth)));
        }
        ClipStmt::Automation { param, value, dur, .. } => {
            out.push_str(&format!(
                "{pad}automation({}, {}, {});\n",
                format_expr(param, depth),
                format_expr(value, depth),
                format_expr(dur, depth)
            ));
        }
        ClipStmt::Marker { kind, label, .. } => {
            out.push_str(&format!(
                "{pad}marker kind {} label {};\n",
                format_expr(kind, depth),
                format_expr(label, depth)
            ));
        }
    }
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    use BinaryOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        Eq => "==",
        NotEq => "!=",
        Lt => "<",
        LtEq => "<=",
        Gt => ">",
        GtEq => ">=",
        And => "&&",
        Or => "||",
        NullishCoalesce => "??",
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Parse then re-emit; returns the parser's diagnostics alongside the text so
/// callers can decide whether to trust a formatting of broken source.
pub fn format_source(source: &str, file: crate::source::FileId) -> (String, Vec<crate::diagnostics::Diagnostic>) {
    let result = crate::parser::parse(source, file);
    (format_program(&result.program), result.diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileId;

    #[test]
    fn formatting_is_idempotent() {
        let src = "const  x=1+2;\nfn f(a,b=3){return a+b;}\n";
        let (once, _) = format_source(src, FileId(0));
        let (twice, _) = format_source(&once, FileId(0));
        assert_eq!(once, twice);
    }

    #[test]
    fn blank_line_separates_top_decls() {
        let src = "const a = 1;\nconst b = 2;\n";
        let (out, _) = format_source(src, FileId(0));
        assert!(out.contains("const a = 1;\n\nconst b = 2;\n"));
    }

    #[test]
    fn trailing_newline_is_always_present() {
        let src = "const a = 1;";
        let (out, _) = format_source(src, FileId(0));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn export_modifier_is_preserved() {
        let src = "export const a = 1;\n";
        let (out, _) = format_source(src, FileId(0));
        assert!(out.starts_with("export const a = 1;"));
    }

    #[test]
    fn score_and_clip_bodies_survive_formatting() {
        let src = r#"
            export const main = score {
                tempo { 1:1 -> 120bpm; }
                meter { 1:1 -> 4/4; }
                sound "s" kind instrument { label "S"; }
                track "T" role Instrument sound "s" {
                    place 1:1 clip { note(C4, 1/4); rest(1/8); };
                }
            };
        "#;
        let (out, diagnostics) = format_source(src, FileId(0));
        assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:?}");
        assert!(out.contains("tempo {"));
        assert!(out.contains("1:1 -> 120bpm;"));
        assert!(out.contains("meter {"));
        assert!(out.contains("1:1 -> 4/4;"));
        assert!(out.contains("sound \"s\" kind instrument {"));
        assert!(out.contains("track \"T\" role Instrument sound \"s\" {"));
        assert!(out.contains("note(Pitch(60), 1/4);"));
        assert!(out.contains("rest(1/8);"));
    }

    #[test]
    fn formatting_is_idempotent_on_a_score_with_a_clip() {
        let src = r#"
            export const main = score {
                sound "s" kind instrument { }
                track "T" role Instrument sound "s" {
                    place 1:1 clip { note(C4, 1/4); };
                }
            };
        "#;
        let (once, diagnostics) = format_source(src, FileId(0));
        assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:?}");
        let (twice, _) = format_source(&once, FileId(0));
        assert_eq!(once, twice, "formatting must be idempotent on its own output");
    }
}
