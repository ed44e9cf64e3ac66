//! # Evaluator
//!
//! `spec.md` §4.G. A tree-walking interpreter: hoist, then const-eval in
//! source order, then (when driven by the compiler) invoke `main`. Grounded
//! on the teacher's single-pass AST walker shape — one `eval_expr`/`exec_stmt`
//! pair dispatching on the node tag — generalized from the teacher's
//! render-only walk to one that actually produces runtime [`Value`]s.

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::module::Loader;
use crate::rational::Rat;
use crate::source::Span;
use crate::value::{
    ClipValue, Event, EventKind, FunctionValue, MarkerValue, MetaValue, MeterEntryValue, PlacementValue, PosValue,
    Scope, ScoreValue, SoundValue, TempoEntryValue, TrackValue, Value,
};
use log::debug;
use std::collections::BTreeMap;
use std::rc::Rc;

const DEFAULT_RECURSION_LIMIT: usize = 512;

/// The directory an import path given inside `canonical_path` is relative
/// to — everything up to (excluding) the final `/`-segment. `std:` paths are
/// never used as a `from_dir` themselves, since only filesystem-relative
/// imports need one.
fn module_dir(canonical_path: &str) -> String {
    match canonical_path.rfind('/') {
        Some(idx) => canonical_path[..idx].to_string(),
        None => String::new(),
    }
}

/// Outcome of evaluating a block: either it ran to completion, or a `return`
/// unwound with a value. Not a `Result` because this is control flow, not an
/// error — distinct from `EvalError` below.
enum Flow {
    Normal,
    Return(Value),
}

/// Raised only for conditions the spec calls out as aborting the current
/// evaluator call and unwinding to the driver (§4.G, §7 "evaluator errors
/// that leave the evaluation inconsistent may abort"). Every other failure
/// is reported as a `Diagnostic` and evaluates to `Value::Null` so the walk
/// can keep going and collect further diagnostics.
struct Aborted;

pub struct EvalContext<'a> {
    pub loader: &'a mut Loader<'a>,
    pub diagnostics: &'a mut Vec<Diagnostic>,
    pub recursion_limit: usize,
    depth: usize,
}

/// Evaluate one already-parsed module's top-level declarations: hoist
/// functions/enums, then evaluate `const`s in source order (§4.G steps 1-2).
/// Returns the module's exported-name → value-name table (by design the
/// export table in `spec.md` §3.5 maps names to themselves; aliasing happens
/// at the importer's `import` statement, not here).
pub fn evaluate_module(loader: &mut Loader, canonical_path: &str, diagnostics: &mut Vec<Diagnostic>) -> BTreeMap<String, String> {
    debug!("hoisting declarations in {canonical_path}");
    let scope = {
        let module = loader.modules().get(canonical_path).expect("module just inserted");
        module.scope.clone()
    };
    let (program_imports, program_body, file) = {
        let module = loader.modules().get(canonical_path).expect("module just inserted");
        (module.program.imports.clone(), module.program.body.clone(), module.file)
    };

    // Phase 0: resolve `import` declarations before anything in this module
    // can reference the names they bring into scope (§4.F, §4.G step 0).
    let from_dir = module_dir(canonical_path);
    for import in &program_imports {
        let target = Loader::resolve_path(&import.path, &from_dir);
        let exports = loader.load(&target, import.span, diagnostics);
        match &import.kind {
            ImportKind::Named(names) => {
                for name in names {
                    let Some(value_name) = exports.get(&name.name) else {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticCode::ExportNotFound,
                            format!("module `{target}` has no export named `{}`", name.name),
                            name.span,
                        ));
                        continue;
                    };
                    let value = loader
                        .modules()
                        .get(&target)
                        .and_then(|m| m.scope.get(value_name))
                        .unwrap_or(Value::Null);
                    let binding = name.alias.as_deref().unwrap_or(&name.name);
                    scope.define(binding, value);
                }
            }
            ImportKind::Namespace(ns) => {
                let mut fields = BTreeMap::new();
                for (export_name, value_name) in &exports {
                    let value = loader
                        .modules()
                        .get(&target)
                        .and_then(|m| m.scope.get(value_name))
                        .unwrap_or(Value::Null);
                    fields.insert(export_name.clone(), value);
                }
                scope.define(ns, Value::Object(fields));
            }
        }
    }

    // Phase 1: hoist fn/enum so const initializers and function bodies may
    // reference any function regardless of source order.
    for decl in &program_body {
        match decl {
            TopDecl::Fn(f) => {
                let func = FunctionValue::from_decl(f, scope.clone());
                scope.define(&f.name, Value::Function(Rc::new(func)));
            }
            TopDecl::Enum(e) => {
                let mut fields = BTreeMap::new();
                for (i, variant) in e.variants.iter().enumerate() {
                    fields.insert(variant.clone(), Value::Int(i as i64));
                }
                scope.define(&e.name, Value::Object(fields));
            }
            TopDecl::Const(_) => {}
        }
    }

    debug!("evaluating const declarations in {canonical_path}");
    let mut evaluated: Vec<String> = Vec::new();
    for decl in &program_body {
        if let TopDecl::Const(c) = decl {
            // §8 boundary behavior: a const referencing a later const by name
            // is UseBeforeInit, not a hoisting opportunity like fn/enum.
            if let Expr::Ident(name, span) = &c.value {
                if !evaluated.iter().any(|n| n == name) && !scope.contains_local(name) {
                    if program_body.iter().any(|d| matches!(d, TopDecl::Const(other) if &other.name == name)) {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticCode::UseBeforeInit,
                            format!("`{name}` is used before its initializer runs"),
                            *span,
                        ));
                        scope.define(&c.name, Value::Null);
                        evaluated.push(c.name.clone());
                        continue;
                    }
                }
            }
            let mut ctx = EvalContext::new(loader, diagnostics);
            let value = ctx.eval_expr(&c.value, &scope).unwrap_or(Value::Null);
            scope.define(&c.name, value);
            evaluated.push(c.name.clone());
        }
    }

    let mut exports = BTreeMap::new();
    for decl in &program_body {
        if decl.exported() {
            exports.insert(decl.name().to_string(), decl.name().to_string());
        }
    }
    let _ = file;
    exports
}

impl<'a> EvalContext<'a> {
    pub fn new(loader: &'a mut Loader<'a>, diagnostics: &'a mut Vec<Diagnostic>) -> Self {
        Self { loader, diagnostics, recursion_limit: DEFAULT_RECURSION_LIMIT, depth: 0 }
    }

    fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    // ---- statements -----------------------------------------------------

    fn exec_block(&mut self, stmts: &[Stmt], scope: &Scope) -> Result<Flow, Aborted> {
        for stmt in stmts {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Scope) -> Result<Flow, Aborted> {
        match stmt {
            Stmt::Local { name, is_const, value, .. } => {
                let v = self.eval_expr(value, scope)?;
                scope.define_local(name, v, *is_const);
                Ok(Flow::Normal)
            }
            Stmt::Return(expr, _) => {
                let v = match expr {
                    Some(e) => self.eval_expr(e, scope)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(v))
            }
            Stmt::If { cond, then_branch, else_branch, .. } => {
                let c = self.eval_expr(cond, scope)?;
                if c.is_truthy() {
                    self.exec_block(then_branch, &scope.child())
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch, &scope.child())
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::For { var, start, end, inclusive, body, span } => {
                if !Self::bound_is_const(start, scope) || !Self::bound_is_const(end, scope) {
                    self.error(DiagnosticCode::ForBoundsNotConst, "for-loop bounds must be const", *span);
                    return Ok(Flow::Normal);
                }
                let start_v = self.eval_expr(start, scope)?;
                let end_v = self.eval_expr(end, scope)?;
                let (Value::Int(lo), Value::Int(hi)) = (&start_v, &end_v) else {
                    self.error(DiagnosticCode::ForBoundsNotConst, "for-loop bounds must be integers", *span);
                    return Ok(Flow::Normal);
                };
                let hi = if *inclusive { *hi } else { *hi - 1 };
                let mut i = *lo;
                while i <= hi {
                    let iter_scope = scope.child();
                    iter_scope.define(var, Value::Int(i));
                    match self.exec_block(body, &iter_scope)? {
                        Flow::Normal => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    i += 1;
                }
                Ok(Flow::Normal)
            }
            Stmt::Assignment { target, value, span } => {
                let v = self.eval_expr(value, scope)?;
                if let Expr::Ident(name, _) = target {
                    scope.define(name, v);
                } else {
                    self.error(DiagnosticCode::TypeMismatch, "left-hand side of assignment must be a name", *span);
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval_expr(expr, scope)?;
                Ok(Flow::Normal)
            }
        }
    }

    /// A `for`-loop bound is const unless it's a bare identifier that
    /// resolves to a `let` binding. A literal or computed expression never
    /// traces back to a `let`, so it's treated as const.
    fn bound_is_const(expr: &Expr, scope: &Scope) -> bool {
        match expr {
            Expr::Ident(name, _) => scope.is_const(name).unwrap_or(true),
            _ => true,
        }
    }

    // ---- expressions ------------------------------------------------------

    fn eval_expr(&mut self, expr: &Expr, scope: &Scope) -> Result<Value, Aborted> {
        Ok(match expr {
            Expr::Int(v, _) => Value::Int(*v),
            Expr::Float(v, _) => Value::Float(*v),
            Expr::Str(s, _) => Value::Str(s.clone()),
            Expr::Bool(b, _) => Value::Bool(*b),
            Expr::Null(_) => Value::Null,
            Expr::Pitch(m, _) => Value::Pitch(*m),
            Expr::Duration(r, _) => Value::Dur(*r),
            Expr::BarBeat { bar, beat, sub, .. } => {
                let base = PosValue::Ref { bar: *bar, beat: *beat };
                match sub {
                    Some(s) => Value::Time(sub_tick_offset(base, *s)),
                    None => Value::Time(base),
                }
            }
            Expr::Template(t) => {
                let mut out = String::new();
                for (i, part) in t.parts.iter().enumerate() {
                    out.push_str(part);
                    if let Some(e) = t.exprs.get(i) {
                        let v = self.eval_expr(e, scope)?;
                        out.push_str(&v.to_string());
                    }
                }
                Value::Str(out)
            }
            Expr::Ident(name, span) => match scope.get(name) {
                Some(v) => v,
                None => {
                    self.error(DiagnosticCode::UndefinedSymbol, format!("undefined symbol `{name}`"), *span);
                    Value::Null
                }
            },
            Expr::Array(items, _) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item, scope)?);
                }
                Value::Array(out)
            }
            Expr::Object(fields, _) => {
                let mut out = BTreeMap::new();
                for (key, value) in fields {
                    let k = match key {
                        ObjectKey::Ident(s) => s.clone(),
                        ObjectKey::Str(s) => s.clone(),
                    };
                    out.insert(k, self.eval_expr(value, scope)?);
                }
                Value::Object(out)
            }
            Expr::Unary { op, expr, span } => {
                let v = self.eval_expr(expr, scope)?;
                self.eval_unary(*op, v, *span)
            }
            Expr::Binary { op, left, right, span } => {
                if *op == BinaryOp::NullishCoalesce {
                    let l = self.eval_expr(left, scope)?;
                    if matches!(l, Value::Null) {
                        self.eval_expr(right, scope)?
                    } else {
                        l
                    }
                } else if *op == BinaryOp::And {
                    let l = self.eval_expr(left, scope)?;
                    if !l.is_truthy() {
                        l
                    } else {
                        self.eval_expr(right, scope)?
                    }
                } else if *op == BinaryOp::Or {
                    let l = self.eval_expr(left, scope)?;
                    if l.is_truthy() {
                        l
                    } else {
                        self.eval_expr(right, scope)?
                    }
                } else {
                    let l = self.eval_expr(left, scope)?;
                    let r = self.eval_expr(right, scope)?;
                    self.eval_binary(*op, l, r, *span)
                }
            }
            Expr::Ternary { cond, then_branch, else_branch, .. } => {
                let c = self.eval_expr(cond, scope)?;
                if c.is_truthy() {
                    self.eval_expr(then_branch, scope)?
                } else {
                    self.eval_expr(else_branch, scope)?
                }
            }
            Expr::Range { start, end, inclusive, .. } => {
                let s = self.eval_expr(start, scope)?;
                let e = self.eval_expr(end, scope)?;
                Value::Object(BTreeMap::from([
                    ("start".to_string(), s),
                    ("end".to_string(), e),
                    ("inclusive".to_string(), Value::Bool(*inclusive)),
                ]))
            }
            Expr::Member { object, property, optional, span } => {
                let obj = self.eval_expr(object, scope)?;
                if matches!(obj, Value::Null) && *optional {
                    Value::Null
                } else {
                    match obj {
                        Value::Object(fields) => fields.get(property).cloned().unwrap_or(Value::Null),
                        Value::Null => {
                            self.error(DiagnosticCode::NotIndexable, "cannot access a member of null", *span);
                            Value::Null
                        }
                        other => {
                            self.error(
                                DiagnosticCode::NotIndexable,
                                format!("value of type {} has no members", other.type_name()),
                                *span,
                            );
                            Value::Null
                        }
                    }
                }
            }
            Expr::Index { object, index, optional, span } => {
                let obj = self.eval_expr(object, scope)?;
                if matches!(obj, Value::Null) && *optional {
                    return Ok(Value::Null);
                }
                let idx = self.eval_expr(index, scope)?;
                match (&obj, &idx) {
                    (Value::Array(items), Value::Int(i)) => {
                        let i = *i;
                        if i < 0 || i as usize >= items.len() {
                            self.error(DiagnosticCode::IndexOutOfBounds, format!("index {i} out of bounds"), *span);
                            Value::Null
                        } else {
                            items[i as usize].clone()
                        }
                    }
                    (Value::Object(fields), Value::Str(key)) => fields.get(key).cloned().unwrap_or(Value::Null),
                    (Value::Null, _) => {
                        self.error(DiagnosticCode::NotIndexable, "cannot index null", *span);
                        Value::Null
                    }
                    _ => {
                        self.error(DiagnosticCode::NotIndexable, "value is not indexable with the given key", *span);
                        Value::Null
                    }
                }
            }
            Expr::Call { callee, args, span } => self.eval_call(callee, args, scope, *span)?,
            Expr::Arrow { params, body, .. } => {
                let func = FunctionValue::from_arrow(params.clone(), body.clone(), scope.clone());
                Value::Function(Rc::new(func))
            }
            Expr::Match { scrutinee, arms, span } => {
                let s = self.eval_expr(scrutinee, scope)?;
                let mut result = None;
                for arm in arms {
                    match &arm.pattern {
                        None => {
                            result = Some(self.eval_expr(&arm.body, scope)?);
                            break;
                        }
                        Some(pattern) => {
                            let p = self.eval_expr(pattern, scope)?;
                            if s.structurally_eq(&p) {
                                result = Some(self.eval_expr(&arm.body, scope)?);
                                break;
                            }
                        }
                    }
                }
                result.unwrap_or_else(|| {
                    self.error(DiagnosticCode::TypeMismatch, "no match arm matched and no `else` arm was given", *span);
                    Value::Null
                })
            }
            Expr::Score(score_expr) => self.eval_score(score_expr, scope)?,
            Expr::Clip(clip_expr) => Value::Clip(self.eval_clip(clip_expr, scope)?),
        })
    }

    fn eval_unary(&mut self, op: UnaryOp, v: Value, span: Span) -> Value {
        match (op, v) {
            (UnaryOp::Neg, Value::Int(n)) => Value::Int(-n),
            (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
            (UnaryOp::Not, v) => Value::Bool(!v.is_truthy()),
            (UnaryOp::Neg, other) => {
                self.error(DiagnosticCode::TypeMismatch, format!("cannot negate a {}", other.type_name()), span);
                Value::Null
            }
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, l: Value, r: Value, span: Span) -> Value {
        use BinaryOp::*;
        match op {
            Add | Sub | Mul | Div | Mod => self.eval_arith(op, l, r, span),
            Eq => Value::Bool(l.structurally_eq(&r)),
            NotEq => Value::Bool(!l.structurally_eq(&r)),
            Lt | LtEq | Gt | GtEq => self.eval_relational(op, l, r, span),
            And | Or | NullishCoalesce => unreachable!("short-circuit ops handled in eval_expr"),
        }
    }

    /// §9 "Pitch arithmetic": `Pitch +/- Int` shifts semitones and stays a
    /// `Pitch`; `Pitch - Pitch` yields an interval `Int`. §9 duration-mixing
    /// decision: `Dur` arithmetic is exact, integers promote to `n/1`.
    fn eval_arith(&mut self, op: BinaryOp, l: Value, r: Value, span: Span) -> Value {
        use BinaryOp::*;
        match (op, &l, &r) {
            (Add, Value::Pitch(p), Value::Int(n)) => Value::Pitch(p + *n as i32),
            (Sub, Value::Pitch(p), Value::Int(n)) => Value::Pitch(p - *n as i32),
            (Sub, Value::Pitch(a), Value::Pitch(b)) => Value::Int((a - b) as i64),
            (_, Value::Dur(_), _) | (_, _, Value::Dur(_)) => self.eval_dur_arith(op, l, r, span),
            (_, Value::Int(a), Value::Int(b)) => match op {
                Add => Value::Int(a + b),
                Sub => Value::Int(a - b),
                Mul => Value::Int(a * b),
                Div => {
                    if *b == 0 {
                        self.error(DiagnosticCode::DivisionByZero, "division by zero", span);
                        Value::Null
                    } else {
                        Value::Int(a / b)
                    }
                }
                Mod => {
                    if *b == 0 {
                        self.error(DiagnosticCode::DivisionByZero, "division by zero", span);
                        Value::Null
                    } else {
                        Value::Int(a % b)
                    }
                }
                _ => unreachable!(),
            },
            (_, Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let a = as_f64(&l);
                let b = as_f64(&r);
                match op {
                    Add => Value::Float(a + b),
                    Sub => Value::Float(a - b),
                    Mul => Value::Float(a * b),
                    Div => {
                        if b == 0.0 {
                            self.error(DiagnosticCode::DivisionByZero, "division by zero", span);
                            Value::Null
                        } else {
                            Value::Float(a / b)
                        }
                    }
                    Mod => Value::Float(a % b),
                    _ => unreachable!(),
                }
            }
            (Add, Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
            _ => {
                self.error(
                    DiagnosticCode::TypeMismatch,
                    format!("cannot apply operator to {} and {}", l.type_name(), r.type_name()),
                    span,
                );
                Value::Null
            }
        }
    }

    fn eval_dur_arith(&mut self, op: BinaryOp, l: Value, r: Value, span: Span) -> Value {
        use BinaryOp::*;
        let to_rat = |v: &Value| -> Option<Rat> {
            match v {
                Value::Dur(r) => Some(*r),
                Value::Int(n) => Some(Rat::from_int(*n)),
                _ => None,
            }
        };
        let (Some(a), Some(b)) = (to_rat(&l), to_rat(&r)) else {
            self.error(
                DiagnosticCode::TypeMismatch,
                format!("cannot apply operator to {} and {}", l.type_name(), r.type_name()),
                span,
            );
            return Value::Null;
        };
        let result = match op {
            Add => a.add(b),
            Sub => a.sub(b),
            Mul => a.mul(b),
            Div => a.div(b),
            Mod => {
                self.error(DiagnosticCode::TypeMismatch, "`%` is not defined on durations", span);
                return Value::Null;
            }
            _ => unreachable!(),
        };
        match result {
            Ok(r) => Value::Dur(r),
            Err(_) => {
                self.error(DiagnosticCode::DivisionByZero, "division by zero", span);
                Value::Null
            }
        }
    }

    fn eval_relational(&mut self, op: BinaryOp, l: Value, r: Value, span: Span) -> Value {
        use BinaryOp::*;
        let ord = match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Dur(a), Value::Dur(b)) => Some(a.compare(b)),
            _ => as_f64_pair(&l, &r).and_then(|(a, b)| a.partial_cmp(&b)),
        };
        let Some(ord) = ord else {
            self.error(
                DiagnosticCode::TypeMismatch,
                format!("cannot compare {} and {}", l.type_name(), r.type_name()),
                span,
            );
            return Value::Null;
        };
        use std::cmp::Ordering::*;
        Value::Bool(match op {
            Lt => ord == Less,
            LtEq => ord != Greater,
            Gt => ord == Greater,
            GtEq => ord != Less,
            _ => unreachable!(),
        })
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Arg], scope: &Scope, span: Span) -> Result<Value, Aborted> {
        let callee_v = self.eval_expr(callee, scope)?;
        let Value::Function(func) = callee_v else {
            self.error(DiagnosticCode::NotCallable, format!("value of type {} is not callable", callee_v.type_name()), span);
            return Ok(Value::Null);
        };

        self.depth += 1;
        if self.depth > self.recursion_limit {
            self.error(DiagnosticCode::RecursionLimitExceeded, "recursion limit exceeded", span);
            self.depth -= 1;
            return Err(Aborted);
        }

        let call_scope = func.closure.child();
        let mut positional = Vec::new();
        let mut named: BTreeMap<String, Value> = BTreeMap::new();
        for arg in args {
            let v = self.eval_expr(&arg.value, scope)?;
            match &arg.name {
                Some(n) => {
                    named.insert(n.clone(), v);
                }
                None => positional.push(v),
            }
        }

        let mut pos_iter = positional.into_iter();
        for (i, param) in func.params.iter().enumerate() {
            if param.rest {
                let rest: Vec<Value> = pos_iter.by_ref().collect();
                call_scope.define(&param.name, Value::Array(rest));
                continue;
            }
            let value = if let Some(named_value) = named.remove(&param.name) {
                named_value
            } else if let Some(positional_value) = pos_iter.next() {
                positional_value
            } else if let Some(default) = &param.default {
                self.eval_expr(default, &call_scope)?
            } else {
                self.error(
                    DiagnosticCode::TypeMismatch,
                    format!("missing argument `{}` in call to `{}` (argument #{})", param.name, func.name, i + 1),
                    span,
                );
                Value::Null
            };
            call_scope.define(&param.name, value);
        }

        let result = match self.exec_block(&func.body, &call_scope)? {
            Flow::Return(v) => v,
            Flow::Normal => Value::Null,
        };
        self.depth -= 1;
        Ok(result)
    }

    /// Invoke a function that takes no required parameters — used by
    /// `api::compile` to call the entry module's exported `main` (§4.G
    /// phase 3), where there is no call-site AST node to evaluate a callee
    /// expression from. Required parameters with no default are left
    /// unbound and reported as `TypeMismatch`, same as a normal call.
    pub fn call_zero_arg(&mut self, func: &FunctionValue) -> Option<Value> {
        self.depth += 1;
        if self.depth > self.recursion_limit {
            self.error(DiagnosticCode::RecursionLimitExceeded, "recursion limit exceeded", crate::diagnostics::dummy_span(crate::source::FileId(0)));
            self.depth -= 1;
            return None;
        }
        let call_scope = func.closure.child();
        for param in &func.params {
            if param.rest {
                call_scope.define(&param.name, Value::Array(Vec::new()));
                continue;
            }
            let value = if let Some(default) = &param.default {
                match self.eval_expr(default, &call_scope) {
                    Ok(v) => v,
                    Err(Aborted) => {
                        self.depth -= 1;
                        return None;
                    }
                }
            } else {
                self.error(
                    DiagnosticCode::TypeMismatch,
                    format!("`{}` requires argument `{}`", func.name, param.name),
                    crate::diagnostics::dummy_span(crate::source::FileId(0)),
                );
                Value::Null
            };
            call_scope.define(&param.name, value);
        }
        let result = match self.exec_block(&func.body, &call_scope) {
            Ok(Flow::Return(v)) => Some(v),
            Ok(Flow::Normal) => Some(Value::Null),
            Err(Aborted) => None,
        };
        self.depth -= 1;
        result
    }

    // ---- score / clip sub-languages (§4.G) --------------------------------

    fn eval_score(&mut self, score: &ScoreExpr, scope: &Scope) -> Result<Value, Aborted> {
        let mut out = ScoreValue {
            meta: MetaValue::default(),
            tempo: Vec::new(),
            meter: Vec::new(),
            sounds: Vec::new(),
            tracks: Vec::new(),
            markers: Vec::new(),
        };
        let mut seen_sound_ids: Vec<(String, Span)> = Vec::new();

        for item in &score.items {
            match item {
                ScoreItem::Meta(block) => {
                    for (name, expr) in &block.fields {
                        let v = self.eval_expr(expr, scope)?;
                        out.meta.fields.push((name.clone(), v));
                    }
                }
                ScoreItem::Tempo(block) => {
                    for entry in &block.entries {
                        let pos = self.eval_pos(&entry.pos, scope)?;
                        let bpm = as_f64(&self.eval_expr(&entry.bpm, scope)?);
                        out.tempo.push(TempoEntryValue { pos, bpm });
                    }
                }
                ScoreItem::Meter(block) => {
                    for entry in &block.entries {
                        let pos = self.eval_pos(&entry.pos, scope)?;
                        out.meter.push(MeterEntryValue { pos, numerator: entry.numerator, denominator: entry.denominator });
                    }
                }
                ScoreItem::Sound(decl) => {
                    let id_v = self.eval_expr(&decl.id, scope)?;
                    let id = id_v.to_string();
                    if let Some((_, prev_span)) = seen_sound_ids.iter().find(|(s, _)| *s == id) {
                        self.diagnostics.push(
                            Diagnostic::error(DiagnosticCode::DuplicateSoundId, format!("duplicate sound id `{id}`"), decl.span)
                                .with_related(*prev_span, "previously declared here"),
                        );
                    } else {
                        seen_sound_ids.push((id.clone(), decl.span));
                    }
                    let mut fields = Vec::new();
                    for (name, expr) in &decl.fields {
                        fields.push((name.clone(), self.eval_expr(expr, scope)?));
                    }
                    out.sounds.push(SoundValue { id, kind: decl.kind.clone(), fields });
                }
                ScoreItem::Track(decl) => {
                    let name = self.eval_expr(&decl.name, scope)?.to_string();
                    let sound = self.eval_expr(&decl.sound, scope)?.to_string();
                    let mut placements = Vec::new();
                    for place in &decl.placements {
                        let pos = self.eval_pos(&place.pos, scope)?;
                        let clip = match self.eval_expr(&place.clip, scope)? {
                            Value::Clip(c) => c,
                            _ => ClipValue { events: Vec::new(), length: Some(Rat::ZERO) },
                        };
                        placements.push(PlacementValue { pos, clip });
                    }
                    out.tracks.push(TrackValue { name, role: decl.role.clone(), sound, placements });
                }
                ScoreItem::Marker(marker) => {
                    let pos = self.eval_pos(&marker.pos, scope)?;
                    let kind = self.eval_expr(&marker.kind, scope)?.to_string();
                    let label = self.eval_expr(&marker.label, scope)?.to_string();
                    out.markers.push(MarkerValue { pos, kind, label });
                }
            }
        }
        Ok(Value::Score(Box::new(out)))
    }

    fn eval_clip(&mut self, clip: &ClipExpr, scope: &Scope) -> Result<ClipValue, Aborted> {
        let mut events = Vec::new();
        let mut cursor = PosValue::Exact(Rat::ZERO);
        for stmt in &clip.stmts {
            match stmt {
                ClipStmt::At(expr) => {
                    cursor = self.eval_pos(expr, scope)?;
                }
                ClipStmt::Rest { dur, .. } => {
                    let d = self.eval_dur(dur, scope)?;
                    events.push(Event { kind: EventKind::Rest, start: cursor.clone(), dur: d });
                    cursor = PosValue::Offset { base: Box::new(cursor), offset: d };
                }
                ClipStmt::Note { pitch, dur, span } => {
                    let p = self.eval_expr(pitch, scope)?;
                    let midi = match p {
                        Value::Pitch(m) => m,
                        Value::Int(n) => n as i32,
                        _ => {
                            self.error(DiagnosticCode::TypeMismatch, "note pitch must be a Pitch or Int", *span);
                            0
                        }
                    };
                    if !(0..=127).contains(&midi) {
                        self.error(DiagnosticCode::PitchOutOfRange, format!("pitch {midi} is out of MIDI range [0,127]"), *span);
                    }
                    let d = self.eval_dur(dur, scope)?;
                    events.push(Event { kind: EventKind::Note { pitch: midi }, start: cursor.clone(), dur: d });
                    cursor = PosValue::Offset { base: Box::new(cursor), offset: d };
                }
                ClipStmt::Chord { pitches, dur, span } => {
                    let arr = self.eval_expr(pitches, scope)?;
                    let mut midis = Vec::new();
                    if let Value::Array(items) = arr {
                        for item in items {
                            let midi = match item {
                                Value::Pitch(m) => m,
                                Value::Int(n) => n as i32,
                                _ => 0,
                            };
                            if !(0..=127).contains(&midi) {
                                self.error(DiagnosticCode::PitchOutOfRange, format!("pitch {midi} is out of MIDI range [0,127]"), *span);
                            }
                            midis.push(midi);
                        }
                    }
                    let d = self.eval_dur(dur, scope)?;
                    events.push(Event { kind: EventKind::Chord { pitches: midis }, start: cursor.clone(), dur: d });
                    cursor = PosValue::Offset { base: Box::new(cursor), offset: d };
                }
                ClipStmt::Hit { sound, dur, .. } => {
                    let sound_name = self.eval_expr(sound, scope)?.to_string();
                    let d = self.eval_dur(dur, scope)?;
                    events.push(Event { kind: EventKind::Hit { sound: sound_name }, start: cursor.clone(), dur: d });
                    cursor = PosValue::Offset { base: Box::new(cursor), offset: d };
                }
                ClipStmt::Cc { controller, value, span } => {
                    let c = self.eval_expr(controller, scope)?;
                    let v = self.eval_expr(value, scope)?;
                    let (Value::Int(cn), Value::Int(cv)) = (&c, &v) else {
                        self.error(DiagnosticCode::TypeMismatch, "cc controller and value must be integers", *span);
                        continue;
                    };
                    if !(0..=127).contains(cn) || !(0..=127).contains(cv) {
                        self.error(DiagnosticCode::CcOutOfRange, "cc controller/value must be in [0,127]", *span);
                    }
                    events.push(Event {
                        kind: EventKind::Cc { controller: *cn, value: *cv },
                        start: cursor.clone(),
                        dur: Rat::ZERO,
                    });
                }
                ClipStmt::Automation { param, value, dur, .. } => {
                    let p = self.eval_expr(param, scope)?.to_string();
                    let v = as_f64(&self.eval_expr(value, scope)?);
                    let d = self.eval_dur(dur, scope)?;
                    events.push(Event { kind: EventKind::Automation { param: p, value: v }, start: cursor.clone(), dur: d });
                }
                ClipStmt::Marker { kind, label, .. } => {
                    let k = self.eval_expr(kind, scope)?.to_string();
                    let l = self.eval_expr(label, scope)?.to_string();
                    events.push(Event { kind: EventKind::Marker { kind: k, label: l }, start: cursor.clone(), dur: Rat::ZERO });
                }
            }
        }
        Ok(ClipValue { events, length: None })
    }

    fn eval_pos(&mut self, expr: &Expr, scope: &Scope) -> Result<PosValue, Aborted> {
        Ok(match self.eval_expr(expr, scope)? {
            Value::Time(p) => p,
            Value::Dur(r) => PosValue::Exact(r),
            Value::Int(n) => PosValue::Exact(Rat::from_int(n)),
            _ => PosValue::Exact(Rat::ZERO),
        })
    }

    fn eval_dur(&mut self, expr: &Expr, scope: &Scope) -> Result<Rat, Aborted> {
        Ok(match self.eval_expr(expr, scope)? {
            Value::Dur(r) => r,
            Value::Int(n) => Rat::from_int(n),
            _ => Rat::ZERO,
        })
    }
}

/// §9 open question (GLOSSARY "sub is an integer tick inside a beat"): no
/// tick resolution is specified, so this adopts the MIDI-standard 480
/// ticks-per-quarter-note convention. A beat is one quarter note (the tempo
/// map's default unit), so a sub-tick is `1/(4*480)` of a whole note.
fn sub_tick_offset(base: PosValue, sub: i64) -> PosValue {
    const TICKS_PER_QUARTER: i64 = 480;
    PosValue::Offset { base: Box::new(base), offset: Rat::make(sub, 4 * TICKS_PER_QUARTER).unwrap_or(Rat::ZERO) }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        Value::Dur(r) => r.to_f64(),
        _ => 0.0,
    }
}

fn as_f64_pair(l: &Value, r: &Value) -> Option<(f64, f64)> {
    let numeric = |v: &Value| matches!(v, Value::Int(_) | Value::Float(_));
    if numeric(l) && numeric(r) {
        Some((as_f64(l), as_f64(r)))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileId, SourceMap};

    fn eval_program_const(src: &str, name: &str) -> (Value, Vec<Diagnostic>) {
        let mut sources = SourceMap::new();
        let file = sources.add_file("test.mfs", src);
        let parse_result = crate::parser::parse(src, file);
        let mut loader = Loader::new(&mut sources);
        loader.modules_mut().insert(
            "test".to_string(),
            crate::module::Module {
                path: "test".to_string(),
                file,
                program: parse_result.program,
                scope: Scope::root(),
                exports: BTreeMap::new(),
                state: crate::module::ModuleState::Evaluating,
            },
        );
        let mut diagnostics = parse_result.diagnostics;
        let _ = evaluate_module(&mut loader, "test", &mut diagnostics);
        let scope = loader.modules().get("test").unwrap().scope.clone();
        (scope.get(name).unwrap_or(Value::Null), diagnostics)
    }

    #[test]
    fn arithmetic_promotes_int_to_float_when_mixed() {
        let (v, diags) = eval_program_const("const x = 1 + 2.5;", "x");
        assert!(diags.is_empty());
        assert_eq!(v, Value::Float(3.5));
    }

    #[test]
    fn pitch_plus_int_shifts_semitones() {
        let (v, _) = eval_program_const("const x = C4 + 2;", "x");
        assert_eq!(v, Value::Pitch(62));
    }

    #[test]
    fn const_forward_reference_is_use_before_init() {
        let (_, diags) = eval_program_const("const a = b; const b = 1;", "a");
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::UseBeforeInit));
    }

    #[test]
    fn ternary_picks_correct_branch() {
        let (v, _) = eval_program_const("const x = 1 < 2 ? 10 : 20;", "x");
        assert_eq!(v, Value::Int(10));
    }

    #[test]
    fn division_by_zero_reports_diagnostic() {
        let (v, diags) = eval_program_const("const x = 1 / 0;", "x");
        assert_eq!(v, Value::Null);
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::DivisionByZero));
    }

    #[test]
    fn for_loop_over_let_bounds_reports_bounds_not_const() {
        let src = r#"
            fn sum() {
                let lo = 0;
                let hi = 3;
                let total = 0;
                for i in lo..hi {
                    total = total + i;
                }
                return total;
            }
            const x = sum();
        "#;
        let (_, diags) = eval_program_const(src, "x");
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::ForBoundsNotConst));
    }

    #[test]
    fn for_loop_over_const_bounds_succeeds() {
        let src = r#"
            fn pick() {
                const lo = 0;
                const hi = 3;
                for i in lo..hi {
                    if i == 2 {
                        return i;
                    }
                }
                return -1;
            }
            const x = pick();
        "#;
        let (v, diags) = eval_program_const(src, "x");
        assert!(!diags.iter().any(|d| d.code == DiagnosticCode::ForBoundsNotConst));
        assert_eq!(v, Value::Int(2));
    }

    #[test]
    fn for_loop_over_literal_bounds_is_const_by_default() {
        let src = r#"
            fn pick() {
                for i in 0..3 {
                    if i == 2 {
                        return i;
                    }
                }
                return -1;
            }
            const x = pick();
        "#;
        let (v, diags) = eval_program_const(src, "x");
        assert!(!diags.iter().any(|d| d.code == DiagnosticCode::ForBoundsNotConst));
        assert_eq!(v, Value::Int(2));
    }
}
