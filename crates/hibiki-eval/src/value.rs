//! Runtime values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hibiki_syntax::Expr;
use indexmap::IndexMap;

use crate::{Environment, EvalError, LValue};

/// Shared, mutable array storage.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// Shared, mutable object storage. Insertion order is kept for output.
pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;

/// Native lambda body.
pub type NativeLambda = Rc<dyn Fn(&Environment, Value) -> Result<Value, EvalError>>;

/// A runtime value.
#[derive(Clone, Default)]
pub enum Value {
    /// The null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// IEEE double
    Number(f64),
    /// String value
    String(Rc<String>),
    /// Array, shared by identity
    Array(ArrayRef),
    /// Plain object, shared by identity
    Object(ObjectRef),
    /// Binary payload
    Blob(Rc<RefCell<Blob>>),
    /// Closure or native function
    Lambda(Rc<Lambda>),
    /// Read/write handle to a path
    LValue(Rc<LValue>),
    /// Externally owned child nodes
    ChildrenRef(Rc<ChildrenRef>),
    /// Error value
    Error(Rc<ErrorValue>),
    /// "Attribute absent", distinct from null
    NoAttr,
}

/// Classification of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Null,
    Primitive,
    Array,
    Object,
    Special,
}

/// A borrowed primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive<'a> {
    Bool(bool),
    Number(f64),
    String(&'a str),
}

/// The kind of a special value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    Blob,
    Lambda,
    LValue,
    ChildrenRef,
    Error,
    NoAttr,
}

/// Binary data carried as base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mimetype: String,
    pub data: String,
    pub name: Option<String>,
}

impl Blob {
    pub fn from_bytes(mimetype: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mimetype: mimetype.into(),
            data: STANDARD.encode(bytes),
            name: None,
        }
    }

    pub fn from_base64(mimetype: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mimetype: mimetype.into(),
            data: data.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Decoded size, computed from the base64 length.
    pub fn byte_len(&self) -> usize {
        let unpadded = self
            .data
            .bytes()
            .filter(|b| !b.is_ascii_whitespace() && *b != b'=')
            .count();
        unpadded * 3 / 4
    }

    pub fn bytes(&self) -> Result<Vec<u8>, EvalError> {
        STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| EvalError::resolution(format!("invalid blob data: {e}")))
    }

    pub fn text(&self) -> Result<String, EvalError> {
        String::from_utf8(self.bytes()?)
            .map_err(|_| EvalError::resolution("blob is not valid UTF-8 text"))
    }

    /// Append more base64 text to the payload.
    pub fn extend_base64(&mut self, more: &str) {
        self.data.push_str(more);
    }

    /// Fields readable through a map path part.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "mimetype" => Some(Value::string(self.mimetype.as_str())),
            "name" => Some(self.name.as_deref().map(Value::string).unwrap_or(Value::Null)),
            "size" => Some(Value::Number(self.byte_len() as f64)),
            _ => None,
        }
    }
}

/// A lambda: an unevaluated expression with its environment, or a native function.
pub enum Lambda {
    Expr { expr: Expr, env: Environment },
    Native(NativeLambda),
}

impl Lambda {
    pub fn native(f: impl Fn(&Environment, Value) -> Result<Value, EvalError> + 'static) -> Self {
        Lambda::Native(Rc::new(f))
    }
}

/// A node bound into a children set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBinding {
    pub uuid: String,
    pub tag: String,
    pub slot: Option<String>,
}

impl NodeBinding {
    pub fn new(uuid: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            tag: tag.into(),
            slot: None,
        }
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }
}

/// An ordered set of externally-owned child nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenRef {
    pub nodes: Vec<NodeBinding>,
}

impl ChildrenRef {
    pub fn new(nodes: Vec<NodeBinding>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn first(&self) -> ChildrenRef {
        ChildrenRef::new(self.nodes.iter().take(1).cloned().collect())
    }

    pub fn noslot(&self) -> ChildrenRef {
        self.filtered(|n| n.slot.is_none())
    }

    pub fn byslot(&self) -> IndexMap<String, ChildrenRef> {
        let mut out: IndexMap<String, ChildrenRef> = IndexMap::new();
        for node in &self.nodes {
            if let Some(slot) = &node.slot {
                out.entry(slot.clone()).or_default().nodes.push(node.clone());
            }
        }
        out
    }

    pub fn bytag(&self) -> IndexMap<String, ChildrenRef> {
        let mut out: IndexMap<String, ChildrenRef> = IndexMap::new();
        for node in &self.nodes {
            out.entry(node.tag.clone()).or_default().nodes.push(node.clone());
        }
        out
    }

    fn filtered(&self, keep: impl Fn(&NodeBinding) -> bool) -> ChildrenRef {
        ChildrenRef::new(self.nodes.iter().filter(|n| keep(n)).cloned().collect())
    }

    /// Named derived views, readable through a map path part.
    pub fn view(&self, name: &str) -> Option<Value> {
        let wrap = |c: ChildrenRef| Value::ChildrenRef(Rc::new(c));
        let group = |groups: IndexMap<String, ChildrenRef>| {
            Value::object(groups.into_iter().map(|(k, c)| (k, wrap(c))).collect())
        };
        match name {
            "all" => Some(wrap(self.clone())),
            "first" => Some(wrap(self.first())),
            "noslot" => Some(wrap(self.noslot())),
            "byslot" => Some(group(self.byslot())),
            "bytag" => Some(group(self.bytag())),
            "size" => Some(Value::Number(self.len() as f64)),
            _ => None,
        }
    }
}

/// A first-class error.
#[derive(Debug, Clone)]
pub struct ErrorValue {
    pub message: String,
    /// Rendered call-context frames, innermost first.
    pub context: Vec<String>,
    pub cause: Option<Value>,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            cause: None,
        }
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_cause(mut self, cause: Value) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "message" => Some(Value::string(self.message.as_str())),
            "cause" => Some(self.cause.clone().unwrap_or(Value::Null)),
            "context" => Some(Value::array(
                self.context.iter().map(|c| Value::string(c.as_str())).collect(),
            )),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

thread_local! {
    /// Containers currently being printed by `Debug`, innermost last.
    static DEBUG_STACK: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Run `body` with `ptr` marked as being printed, or return `None` if it
/// already is.
fn debug_enter<R>(ptr: usize, body: impl FnOnce() -> R) -> Option<R> {
    let entered = DEBUG_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.contains(&ptr) {
            false
        } else {
            stack.push(ptr);
            true
        }
    });
    if !entered {
        return None;
    }
    let out = body();
    DEBUG_STACK.with(|stack| stack.borrow_mut().pop());
    Some(out)
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => {
                let printed = debug_enter(Rc::as_ptr(items) as *const () as usize, || match items.try_borrow() {
                    Ok(items) => f.debug_list().entries(items.iter()).finish(),
                    Err(_) => write!(f, "[<borrowed>]"),
                });
                printed.unwrap_or_else(|| write!(f, "[<cycle>]"))
            }
            Value::Object(fields) => {
                let printed = debug_enter(Rc::as_ptr(fields) as *const () as usize, || match fields.try_borrow() {
                    Ok(fields) => f.debug_map().entries(fields.iter()).finish(),
                    Err(_) => write!(f, "{{<borrowed>}}"),
                });
                printed.unwrap_or_else(|| write!(f, "{{<cycle>}}"))
            }
            Value::Blob(b) => match b.try_borrow() {
                Ok(b) => write!(f, "<blob {} {} bytes>", b.mimetype, b.byte_len()),
                Err(_) => write!(f, "<blob>"),
            },
            Value::Lambda(_) => write!(f, "<lambda>"),
            Value::LValue(lv) => write!(f, "<lvalue {}>", lv.path_string()),
            Value::ChildrenRef(c) => write!(f, "<children n={}>", c.len()),
            Value::Error(e) => write!(f, "<error {:?}>", e.message),
            Value::NoAttr => write!(f, "<noattr>"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Render a number the way JavaScript's `String(n)` does for common cases.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(s.into()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(fields: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(fields)))
    }

    pub fn empty_object() -> Self {
        Value::object(IndexMap::new())
    }

    pub fn blob(blob: Blob) -> Self {
        Value::Blob(Rc::new(RefCell::new(blob)))
    }

    pub fn error(error: ErrorValue) -> Self {
        Value::Error(Rc::new(error))
    }

    pub fn lvalue(lv: LValue) -> Self {
        Value::LValue(Rc::new(lv))
    }

    /// Build a value from JSON, with fresh containers.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn classify(&self) -> ValueClass {
        match self {
            Value::Null => ValueClass::Null,
            Value::Bool(_) | Value::Number(_) | Value::String(_) => ValueClass::Primitive,
            Value::Array(_) => ValueClass::Array,
            Value::Object(_) => ValueClass::Object,
            _ => ValueClass::Special,
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive<'_>> {
        match self {
            Value::Bool(b) => Some(Primitive::Bool(*b)),
            Value::Number(n) => Some(Primitive::Number(*n)),
            Value::String(s) => Some(Primitive::String(s.as_str())),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_special(&self) -> Option<SpecialKind> {
        match self {
            Value::Blob(_) => Some(SpecialKind::Blob),
            Value::Lambda(_) => Some(SpecialKind::Lambda),
            Value::LValue(_) => Some(SpecialKind::LValue),
            Value::ChildrenRef(_) => Some(SpecialKind::ChildrenRef),
            Value::Error(_) => Some(SpecialKind::Error),
            Value::NoAttr => Some(SpecialKind::NoAttr),
            _ => None,
        }
    }

    pub fn is_special(&self) -> bool {
        self.as_special().is_some()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_lvalue(&self) -> Option<&Rc<LValue>> {
        match self {
            Value::LValue(lv) => Some(lv),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Rc<RefCell<Blob>>> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Rc<ErrorValue>> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    /// `null` or the absent-attribute sentinel.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::NoAttr)
    }

    /// Name reported by `typeof`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Blob(_) => "blob",
            Value::Lambda(_) => "lambda",
            Value::LValue(_) => "lvalue",
            Value::ChildrenRef(_) => "children",
            Value::Error(_) => "error",
            Value::NoAttr => "noattr",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Null | Value::NoAttr => 0.0,
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::NoAttr => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.as_str().to_string(),
            Value::Array(_) => "[array]".to_string(),
            Value::Object(_) => "[object]".to_string(),
            Value::Blob(b) => {
                let b = b.borrow();
                format!("[hibikiblob type={} len={}]", b.mimetype, b.byte_len())
            }
            Value::Lambda(_) => "[lambda]".to_string(),
            Value::LValue(lv) => format!("[lvalue {}]", lv.path_string()),
            Value::ChildrenRef(c) => format!("[children n={}]", c.len()),
            Value::Error(e) => format!("[error {}]", e.message),
            Value::NoAttr => "[noattr]".to_string(),
        }
    }

    /// Primitive equality; containers and specials by identity. NaN is not
    /// equal to itself.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.same_value(other),
        }
    }

    /// JavaScript-style loose equality.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (Value::Number(_), Value::String(_) | Value::Bool(_))
            | (Value::String(_) | Value::Bool(_), Value::Number(_))
            | (Value::Bool(_), Value::String(_))
            | (Value::String(_), Value::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }

    /// Identity used by mutation propagation. NaN is the same as NaN.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::NoAttr, Value::NoAttr) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Blob(a), Value::Blob(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::LValue(a), Value::LValue(b)) => Rc::ptr_eq(a, b),
            (Value::ChildrenRef(a), Value::ChildrenRef(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::new(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        Value::from_json(json)
    }
}
