//! # Value model
//!
//! `spec.md` §3.4. The tagged union every expression evaluates to. Arrays and
//! objects own their elements; a [`Function`] closes over the defining scope
//! by reference-counted handle rather than copying it, mirroring how the
//! teacher's AST nodes are owned trees rather than arenas (§9 "arena-vs-pointer
//! tradeoff" decided in favor of the simpler owned-tree shape for this core).

use crate::ast::{ArrowBody, FnDecl, Param, Stmt};
use crate::rational::Rat;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// An unresolved musical position, produced by evaluating `score`/`clip`
/// sub-expressions and consumed by [`crate::ir`]'s normalizer (§4.H).
#[derive(Debug, Clone, PartialEq)]
pub enum PosValue {
    /// Already an exact rational number of whole-notes.
    Exact(Rat),
    /// `bar:beat`.
    Ref { bar: i64, beat: i64 },
    /// A `PosRef` plus an exact offset, produced by clip-cursor advances
    /// (`rest`/`note`/`chord`/`hit` statements push the cursor forward).
    Offset { base: Box<PosValue>, offset: Rat },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Note { pitch: i32 },
    Chord { pitches: Vec<i32> },
    Hit { sound: String },
    Rest,
    Cc { controller: i64, value: i64 },
    Automation { param: String, value: f64 },
    Marker { kind: String, label: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub start: PosValue,
    pub dur: Rat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipValue {
    pub events: Vec<Event>,
    /// `None` until §4.H derives it as `max(event_end)`.
    pub length: Option<Rat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TempoEntryValue {
    pub pos: PosValue,
    pub bpm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterEntryValue {
    pub pos: PosValue,
    pub numerator: i64,
    pub denominator: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundValue {
    pub id: String,
    pub kind: String,
    pub fields: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementValue {
    pub pos: PosValue,
    pub clip: ClipValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackValue {
    pub name: String,
    pub role: String,
    pub sound: String,
    pub placements: Vec<PlacementValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerValue {
    pub pos: PosValue,
    pub kind: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaValue {
    pub fields: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreValue {
    pub meta: MetaValue,
    pub tempo: Vec<TempoEntryValue>,
    pub meter: Vec<MeterEntryValue>,
    pub sounds: Vec<SoundValue>,
    pub tracks: Vec<TrackValue>,
    pub markers: Vec<MarkerValue>,
}

/// A closure: the declaration plus a reference to the scope in which it was
/// created. `params`/`body` are cloned out of the owning `FnDecl` rather than
/// borrowed, so `Value` stays `'static` and freely cloneable like every other
/// variant (§3.4 "functions carry a reference to the defining scope").
#[derive(Debug, Clone)]
pub struct FunctionValue {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Rc<[Stmt]>,
    pub closure: Scope,
}

impl FunctionValue {
    pub fn from_decl(decl: &FnDecl, closure: Scope) -> Self {
        Self {
            name: decl.name.clone(),
            params: decl.params.clone(),
            body: decl.body.clone().into(),
            closure,
        }
    }

    pub fn from_arrow(params: Vec<Param>, body: ArrowBody, closure: Scope) -> Self {
        let body: Vec<Stmt> = match body {
            ArrowBody::Block(stmts) => stmts,
            ArrowBody::Expr(expr) => vec![Stmt::Return(Some(*expr), closure_dummy_span())],
        };
        Self { name: "<arrow>".to_string(), params, body: body.into(), closure }
    }
}

impl PartialEq for FunctionValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.body, &other.body) && self.name == other.name
    }
}

fn closure_dummy_span() -> crate::source::Span {
    crate::diagnostics::dummy_span(crate::source::FileId(0))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
    /// §3.4: MIDI note number, `[0,127]` is enforced by [`crate::validate`]
    /// and [`crate::eval`], not by this constructor.
    Pitch(i32),
    Dur(Rat),
    Time(PosValue),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Function(Rc<FunctionValue>),
    Score(Box<ScoreValue>),
    Clip(ClipValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Bool(_) => "Bool",
            Value::Str(_) => "String",
            Value::Null => "Null",
            Value::Pitch(_) => "Pitch",
            Value::Dur(_) => "Duration",
            Value::Time(_) => "Time",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Function(_) => "Function",
            Value::Score(_) => "Score",
            Value::Clip(_) => "Clip",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Structural equality used by `match` arm comparison (§4.G) — defined
    /// only over the primitive kinds the spec names ("primitives" for match
    /// patterns); comparing two `Array`/`Object`/`Function` values is not a
    /// `match` concern and falls through to `false`.
    pub fn structurally_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Pitch(a), Value::Pitch(b)) => a == b,
            (Value::Dur(a), Value::Dur(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
            Value::Pitch(m) => write!(f, "Pitch({m})"),
            Value::Dur(r) => write!(f, "{r}"),
            Value::Time(_) => write!(f, "<time>"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(_) => write!(f, "<object>"),
            Value::Function(func) => write!(f, "<fn {}>", func.name),
            Value::Score(_) => write!(f, "<score>"),
            Value::Clip(_) => write!(f, "<clip>"),
        }
    }
}

/// A lexical scope: module-level bindings, or a function call frame chained
/// to its parent via `Rc<RefCell<..>>` so closures can outlive the call that
/// created them (§3.4 "functions carry a reference to the defining scope").
#[derive(Debug, Clone)]
pub struct Scope {
    inner: Rc<RefCell<ScopeInner>>,
}

#[derive(Debug)]
struct ScopeInner {
    bindings: BTreeMap<String, Value>,
    consts: BTreeSet<String>,
    parent: Option<Scope>,
}

impl Scope {
    pub fn root() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ScopeInner {
                bindings: BTreeMap::new(),
                consts: BTreeSet::new(),
                parent: None,
            })),
        }
    }

    pub fn child(&self) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ScopeInner {
                bindings: BTreeMap::new(),
                consts: BTreeSet::new(),
                parent: Some(self.clone()),
            })),
        }
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.inner.borrow_mut().bindings.insert(name.into(), value);
    }

    /// Defines `name` and records whether it was bound with `const` (as
    /// opposed to `let`), so `for`-loop bounds can later tell a `const`
    /// endpoint from a `let` one (§8 `ForBoundsNotConst`).
    pub fn define_local(&self, name: impl Into<String>, value: Value, is_const: bool) {
        let name = name.into();
        let mut inner = self.inner.borrow_mut();
        if is_const {
            inner.consts.insert(name.clone());
        } else {
            inner.consts.remove(&name);
        }
        inner.bindings.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        if let Some(v) = inner.bindings.get(name) {
            return Some(v.clone());
        }
        inner.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.inner.borrow().bindings.contains_key(name)
    }

    /// Whether `name` resolves (in this scope or an ancestor) to a binding
    /// declared with `const`. `None` if the name isn't bound at all.
    pub fn is_const(&self, name: &str) -> Option<bool> {
        let inner = self.inner.borrow();
        if inner.bindings.contains_key(name) {
            return Some(inner.consts.contains(name));
        }
        inner.parent.as_ref().and_then(|p| p.is_const(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_promotes_int_to_float() {
        assert!(Value::Int(2).structurally_eq(&Value::Float(2.0)));
    }

    #[test]
    fn scope_lookup_falls_back_to_parent() {
        let root = Scope::root();
        root.define("x", Value::Int(1));
        let child = root.child();
        child.define("y", Value::Int(2));
        assert_eq!(child.get("x"), Some(Value::Int(1)));
        assert_eq!(child.get("y"), Some(Value::Int(2)));
        assert_eq!(root.get("y"), None);
    }

    #[test]
    fn falsy_values() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Int(1).is_truthy());
    }
}
