//! # Abstract Syntax Tree
//!
//! `spec.md` §3.3. Produced by [`crate::parser`], consumed by
//! [`crate::validate`], [`crate::module`] and [`crate::eval`]. Nodes own their
//! children; [`Span`]s borrow nothing, so the tree is free to outlive the
//! token stream that built it (§3.8).

use crate::rational::Rat;
use crate::source::Span;

#[derive(Debug, Clone)]
pub struct Program {
    pub imports: Vec<ImportDecl>,
    pub body: Vec<TopDecl>,
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub kind: ImportKind,
    pub path: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ImportKind {
    /// `import { a, b as c } from "path";`
    Named(Vec<ImportName>),
    /// `import * as ns from "path";`
    Namespace(String),
}

#[derive(Debug, Clone)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TopDecl {
    Fn(FnDecl),
    Const(ConstDecl),
    Enum(EnumDecl),
}

impl TopDecl {
    pub fn name(&self) -> &str {
        match self {
            TopDecl::Fn(f) => &f.name,
            TopDecl::Const(c) => &c.name,
            TopDecl::Enum(e) => &e.name,
        }
    }

    pub fn exported(&self) -> bool {
        match self {
            TopDecl::Fn(f) => f.exported,
            TopDecl::Const(c) => c.exported,
            TopDecl::Enum(e) => e.exported,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TopDecl::Fn(f) => f.span,
            TopDecl::Const(c) => c.span,
            TopDecl::Enum(e) => e.span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub rest: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub body: Vec<Stmt>,
    pub exported: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub name: String,
    pub value: Expr,
    pub exported: bool,
    /// `true` if this was written `let name = …;` at module scope. `let` is
    /// syntactically accepted there (so the validator, not the parser,
    /// reports it) but is never legal — only `const`/`fn`/`enum` are.
    pub was_let: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<String>,
    pub exported: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `const`/`let` inside a function body. §9 open question: `let` is
    /// rejected at module scope, by `crate::validate`, not by the parser.
    Local {
        name: String,
        is_const: bool,
        value: Expr,
        span: Span,
    },
    Return(Option<Expr>, Span),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        span: Span,
    },
    For {
        var: String,
        start: Expr,
        end: Expr,
        inclusive: bool,
        body: Vec<Stmt>,
        span: Span,
    },
    Assignment {
        target: Expr,
        value: Expr,
        span: Span,
    },
    Expr(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Local { span, .. } => *span,
            Stmt::Return(_, span) => *span,
            Stmt::If { span, .. } => *span,
            Stmt::For { span, .. } => *span,
            Stmt::Assignment { span, .. } => *span,
            Stmt::Expr(e) => e.span(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    NullishCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum ObjectKey {
    Ident(String),
    Str(String),
}

#[derive(Debug, Clone)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Option<Expr>, // None == `else`
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub enum ArrowBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

/// `spec.md` §3.2, §4.C template literal segments assembled back into one
/// expression: alternating literal string chunks and interpolated
/// expressions, `parts.len() == exprs.len() + 1`.
#[derive(Debug, Clone)]
pub struct TemplateLit {
    pub parts: Vec<String>,
    pub exprs: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64, Span),
    Float(f64, Span),
    Str(String, Span),
    Template(TemplateLit),
    Bool(bool, Span),
    Null(Span),
    Pitch(i32, Span),
    Duration(Rat, Span),
    BarBeat {
        bar: i64,
        beat: i64,
        sub: Option<i64>,
        span: Span,
    },
    Ident(String, Span),
    Array(Vec<Expr>, Span),
    Object(Vec<(ObjectKey, Expr)>, Span),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
        span: Span,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
        span: Span,
    },
    Arrow {
        params: Vec<Param>,
        body: ArrowBody,
        span: Span,
    },
    Ternary {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        span: Span,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
        span: Span,
    },
    Score(ScoreExpr),
    Clip(ClipExpr),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Int(_, s)
            | Expr::Float(_, s)
            | Expr::Str(_, s)
            | Expr::Bool(_, s)
            | Expr::Null(s)
            | Expr::Pitch(_, s)
            | Expr::Duration(_, s)
            | Expr::BarBeat { span: s, .. }
            | Expr::Ident(_, s)
            | Expr::Array(_, s)
            | Expr::Object(_, s)
            | Expr::Binary { span: s, .. }
            | Expr::Unary { span: s, .. }
            | Expr::Call { span: s, .. }
            | Expr::Member { span: s, .. }
            | Expr::Index { span: s, .. }
            | Expr::Match { span: s, .. }
            | Expr::Arrow { span: s, .. }
            | Expr::Ternary { span: s, .. }
            | Expr::Range { span: s, .. } => *s,
            Expr::Template(t) => t.span,
            Expr::Score(s) => s.span,
            Expr::Clip(c) => c.span,
        }
    }
}

// ---- score sub-language (§3.3, §4.D) ------------------------------------

#[derive(Debug, Clone)]
pub struct ScoreExpr {
    pub items: Vec<ScoreItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ScoreItem {
    Meta(MetaBlock),
    Tempo(TempoBlock),
    Meter(MeterBlock),
    Sound(SoundDecl),
    Track(TrackDecl),
    Marker(ScoreMarker),
}

#[derive(Debug, Clone)]
pub struct MetaBlock {
    pub fields: Vec<(String, Expr)>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TempoEntry {
    pub pos: Expr,
    pub bpm: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TempoBlock {
    pub entries: Vec<TempoEntry>,
    pub span: Span,
}

/// `meter` entries keep the literal numerator/denominator pair exactly as
/// written (`4/4`, `6/8`) rather than the reduced `Rat` the lexer's duration
/// literal would otherwise collapse a fraction like `6/8` into — meter
/// denominators are not interchangeable with equal-valued fractions.
#[derive(Debug, Clone)]
pub struct MeterEntry {
    pub pos: Expr,
    pub numerator: i64,
    pub denominator: i64,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MeterBlock {
    pub entries: Vec<MeterEntry>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SoundDecl {
    pub id: Expr,
    pub kind: String,
    pub kind_span: Span,
    pub fields: Vec<(String, Expr)>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct PlaceStmt {
    pub pos: Expr,
    pub clip: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TrackDecl {
    pub name: Expr,
    pub role: String,
    pub role_span: Span,
    pub sound: Expr,
    pub placements: Vec<PlaceStmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ScoreMarker {
    pub pos: Expr,
    pub kind: Expr,
    pub label: Expr,
    pub span: Span,
}

// ---- clip sub-language (§3.3, §4.D, §4.G) -------------------------------

#[derive(Debug, Clone)]
pub struct ClipExpr {
    pub stmts: Vec<ClipStmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ClipStmt {
    At(Expr),
    Rest {
        dur: Expr,
        span: Span,
    },
    Note {
        pitch: Expr,
        dur: Expr,
        span: Span,
    },
    Chord {
        pitches: Expr,
        dur: Expr,
        span: Span,
    },
    Hit {
        sound: Expr,
        dur: Expr,
        span: Span,
    },
    Cc {
        controller: Expr,
        value: Expr,
        span: Span,
    },
    Automation {
        param: Expr,
        value: Expr,
        dur: Expr,
        span: Span,
    },
    Marker {
        kind: Expr,
        label: Expr,
        span: Span,
    },
}

impl ClipStmt {
    pub fn span(&self) -> Span {
        match self {
            ClipStmt::At(e) => e.span(),
            ClipStmt::Rest { span, .. }
            | ClipStmt::Note { span, .. }
            | ClipStmt::Chord { span, .. }
            | ClipStmt::Hit { span, .. }
            | ClipStmt::Cc { span, .. }
            | ClipStmt::Automation { span, .. }
            | ClipStmt::Marker { span, .. } => *span,
        }
    }
}
