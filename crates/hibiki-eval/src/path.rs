//! Path resolution and mutation.
//!
//! A syntax [`Path`] may hold dynamic and dereference parts. Before it is read
//! or written it is reduced to a [`ConcretePath`]: a root plus plain map and
//! array steps.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use hibiki_diagnostic::{DiagnosticKind, emit};
use hibiki_syntax::{Path, PathPart, RootKind, SetOp, is_plain_key, parse_path, write_key};
use indexmap::IndexMap;

use crate::lvalue::resolve_lvalue_chain;
use crate::{EvalError, EvalMode, Environment, ObservableCell, Value, eval_expr};

/// A resolved root.
#[derive(Debug, Clone)]
pub enum Root {
    Global,
    State,
    Local(usize),
    Context(usize),
    CurrentContext(usize),
    Component,
    Args,
    /// Inline value from a literal root expression
    Value(Value),
}

/// One concrete step below the root.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Map(String),
    Array(i64),
}

/// A path with every dynamic part evaluated.
#[derive(Debug, Clone)]
pub struct ConcretePath {
    pub root: Root,
    pub parts: Vec<Segment>,
}

impl ConcretePath {
    pub fn new(root: Root, parts: Vec<Segment>) -> Self {
        Self { root, parts }
    }

    /// Whether the root can be assigned through. Context roots need `allow_context`.
    pub fn is_writable(&self, allow_context: bool) -> bool {
        match self.root {
            Root::Global | Root::State | Root::Args | Root::Component => true,
            Root::Context(_) | Root::CurrentContext(_) => allow_context,
            Root::Local(_) | Root::Value(_) => false,
        }
    }
}

pub(crate) fn write_segments(out: &mut impl fmt::Write, parts: &[Segment]) -> fmt::Result {
    for part in parts {
        match part {
            Segment::Map(key) => write_key(out, key)?,
            Segment::Array(index) => write!(out, "[{index}]")?,
        }
    }
    Ok(())
}

impl fmt::Display for ConcretePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let next_is_plain_key = matches!(self.parts.first(), Some(Segment::Map(k)) if is_plain_key(k));
        match &self.root {
            Root::Global => f.write_str("$")?,
            Root::State => f.write_str("$state")?,
            Root::Component => f.write_str("$c")?,
            Root::Args => f.write_str("$args")?,
            Root::Local(caret) => {
                f.write_str(&"^".repeat(*caret))?;
                if !next_is_plain_key {
                    f.write_str(".")?;
                }
            }
            Root::Context(caret) => write!(f, "{}@", "^".repeat(*caret))?,
            Root::CurrentContext(caret) => write!(f, "{}$currentcontext", "^".repeat(*caret))?,
            Root::Value(_) => f.write_str("(value)")?,
        }
        write_segments(f, &self.parts)
    }
}

/// Segment for a dynamic key: integral numbers index arrays, anything else is a map key.
fn dynamic_segment(value: &Value) -> Segment {
    match value {
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Segment::Array(*n as i64),
        other => Segment::Map(other.to_display_string()),
    }
}

fn concrete_root(root: &RootKind, caret: usize, env: &Environment) -> Result<Root, EvalError> {
    Ok(match root {
        RootKind::Global | RootKind::Data => Root::Global,
        RootKind::State => Root::State,
        RootKind::Local => Root::Local(caret),
        RootKind::Context => Root::Context(caret),
        RootKind::CurrentContext => Root::CurrentContext(caret),
        RootKind::Component => Root::Component,
        RootKind::Args => Root::Args,
        RootKind::Literal(expr) => Root::Value(eval_expr(expr, env, EvalMode::Natural)?),
    })
}

/// Reduce `path` to a concrete path. Dereference parts replace everything
/// accumulated so far with the parsed target; later parts append to it.
pub fn eval_dynamic_parts(path: &Path, env: &Environment, depth: usize) -> Result<ConcretePath, EvalError> {
    let max = env.config().max_deref_depth;
    if depth > max {
        return Err(EvalError::limit(format!("path dereference nested deeper than {max}")));
    }
    path.validate()
        .map_err(|e| EvalError::construction(e.to_string()))?;
    let Some((root, caret)) = path.root_part() else {
        return Err(EvalError::construction("path has no root"));
    };
    let mut concrete = ConcretePath::new(concrete_root(root, caret, env)?, Vec::new());
    for part in &path.parts[1..] {
        match part {
            PathPart::Map { key } => concrete.parts.push(Segment::Map(key.clone())),
            PathPart::Array { index } => concrete.parts.push(Segment::Array(*index)),
            PathPart::Dynamic { expr } => {
                let key = eval_expr(expr, env, EvalMode::Resolve)?;
                concrete.parts.push(dynamic_segment(&key));
            }
            PathPart::Deref { expr } => {
                let target = eval_expr(expr, env, EvalMode::Resolve)?;
                let text = match &target {
                    Value::String(text) => text.clone(),
                    other => {
                        return Err(EvalError::resolution(format!(
                            "cannot dereference a {} as a path",
                            other.type_name()
                        )));
                    }
                };
                let parsed = parse_path(&text)?;
                concrete = eval_dynamic_parts(&parsed, env, depth + 1)?;
            }
            PathPart::Root { .. } => {
                return Err(EvalError::construction("root part below level 0"));
            }
        }
    }
    Ok(concrete)
}

/// One read step. `args_level` marks the first map level under `$args`.
pub(crate) fn step(cur: Value, seg: &Segment, args_level: bool, max_lvalue_depth: usize) -> Result<Value, EvalError> {
    let cur = match cur {
        Value::LValue(_) => resolve_lvalue_chain(cur, max_lvalue_depth)?,
        other => other,
    };
    match seg {
        Segment::Array(index) => match &cur {
            Value::Null | Value::NoAttr => Ok(Value::Null),
            Value::Array(items) => {
                if *index < 0 {
                    return Err(EvalError::resolution(format!("negative array index [{index}]")));
                }
                let item = items.borrow().get(*index as usize).cloned();
                Ok(item.unwrap_or(Value::Null))
            }
            v if v.is_special() => Ok(Value::Null),
            other => Err(EvalError::resolution(format!(
                "cannot index {} with [{index}]",
                other.type_name()
            ))),
        },
        Segment::Map(key) => match &cur {
            Value::Null | Value::NoAttr => Ok(Value::Null),
            Value::Object(fields) => {
                let found = fields.borrow().get(key).cloned();
                Ok(match found {
                    Some(v) => v,
                    None if args_level => Value::NoAttr,
                    None => Value::Null,
                })
            }
            Value::ChildrenRef(children) => Ok(children.view(key).unwrap_or(Value::Null)),
            Value::Error(err) => Ok(err.field(key).unwrap_or(Value::Null)),
            Value::Blob(blob) => {
                let field = blob.borrow().field(key);
                Ok(field.unwrap_or(Value::Null))
            }
            v if v.is_special() => Ok(Value::Null),
            other => Err(EvalError::resolution(format!(
                "cannot read key '{key}' of {}",
                other.type_name()
            ))),
        },
    }
}

/// Walk plain segments starting from `value`.
pub(crate) fn walk(value: Value, parts: &[Segment], max_lvalue_depth: usize) -> Result<Value, EvalError> {
    parts
        .iter()
        .try_fold(value, |cur, seg| step(cur, seg, false, max_lvalue_depth))
}

/// Read the value at a concrete path.
pub fn resolve_concrete(path: &ConcretePath, env: &Environment) -> Result<Value, EvalError> {
    let max_lv = env.config().max_lvalue_depth;
    let (mut cur, start) = match (&path.root, path.parts.first()) {
        (Root::Context(caret), Some(Segment::Map(key))) => {
            (env.context_var(*caret, key).unwrap_or(Value::Null), 1)
        }
        (root, _) => (env.resolve_root(root)?, 0),
    };
    let is_args = matches!(path.root, Root::Args);
    for (level, seg) in path.parts.iter().enumerate().skip(start) {
        cur = step(cur, seg, is_args && level == 0, max_lv)?;
    }
    Ok(cur)
}

/// Read the value at `path`, propagating errors.
pub fn resolve_static(path: &Path, env: &Environment) -> Result<Value, EvalError> {
    let concrete = eval_dynamic_parts(path, env, 0)?;
    resolve_concrete(&concrete, env)
}

/// Read the value at `path`; errors are logged and read as `null`.
pub fn resolve_path(path: &Path, env: &Environment) -> Value {
    resolve_static(path, env).unwrap_or_else(|e| {
        emit(&e.to_diagnostic(DiagnosticKind::Path, &format!("resolving {path}")));
        Value::Null
    })
}

/// Parse and read a string path, propagating errors.
pub fn resolve_str_throw(path: &str, env: &Environment) -> Result<Value, EvalError> {
    resolve_static(&parse_path(path)?, env)
}

/// Parse and read a string path; errors are logged and read as `null`.
pub fn resolve_str(path: &str, env: &Environment) -> Value {
    resolve_str_throw(path, env).unwrap_or_else(|e| {
        emit(&e.to_diagnostic(DiagnosticKind::Path, &format!("resolving {path}")));
        Value::Null
    })
}

/// Options for path writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Permit `@` and `$currentcontext` targets.
    pub allow_context: bool,
    /// Treat non-`set` ops on LValue targets as no-ops instead of errors.
    pub suppress_read_only: bool,
}

impl WriteOptions {
    pub fn privileged() -> Self {
        Self {
            allow_context: true,
            suppress_read_only: false,
        }
    }
}

/// State carried through one write.
#[derive(Clone)]
pub(crate) struct WriteCtx {
    pub op: SetOp,
    pub value: Value,
    pub max_array_index: usize,
    pub max_lvalue_depth: usize,
    pub lv_depth: usize,
    pub suppress: bool,
}

impl WriteCtx {
    pub fn new(op: SetOp, value: Value, env: &Environment, opts: WriteOptions) -> Self {
        let config = env.config();
        Self {
            op,
            value,
            max_array_index: config.max_array_index,
            max_lvalue_depth: config.max_lvalue_depth,
            lv_depth: 0,
            suppress: opts.suppress_read_only,
        }
    }

    /// Same limits and depth, different op and value.
    pub fn with(&self, op: SetOp, value: Value) -> Self {
        Self {
            op,
            value,
            ..self.clone()
        }
    }
}

/// Write `value` at `path` with `op`, propagating errors.
pub fn write_path_throw(
    path: &Path,
    env: &Environment,
    op: SetOp,
    value: Value,
    opts: WriteOptions,
) -> Result<(), EvalError> {
    let concrete = eval_dynamic_parts(path, env, 0)?;
    tracing::trace!(path = %concrete, op = op.as_str(), "path write");
    let mut ctx = WriteCtx::new(op, value, env, opts);
    write_concrete(&concrete, env, &mut ctx, opts.allow_context)
}

/// Write `value` at `path`; errors are logged and the write is dropped.
pub fn write_path(path: &Path, env: &Environment, op: SetOp, value: Value, opts: WriteOptions) {
    if let Err(e) = write_path_throw(path, env, op, value, opts) {
        emit(&e.to_diagnostic(DiagnosticKind::Path, &format!("writing {path}")));
    }
}

/// Parse a string path and write through it, propagating errors.
pub fn write_str_throw(
    path: &str,
    env: &Environment,
    op: SetOp,
    value: Value,
    opts: WriteOptions,
) -> Result<(), EvalError> {
    write_path_throw(&parse_path(path)?, env, op, value, opts)
}

/// Parse a string path and write through it; errors are logged.
pub fn write_str(path: &str, env: &Environment, op: SetOp, value: Value, opts: WriteOptions) {
    if let Err(e) = write_str_throw(path, env, op, value, opts) {
        emit(&e.to_diagnostic(DiagnosticKind::Path, &format!("writing {path}")));
    }
}

pub(crate) fn write_concrete(
    path: &ConcretePath,
    env: &Environment,
    ctx: &mut WriteCtx,
    allow_context: bool,
) -> Result<(), EvalError> {
    if !path.is_writable(allow_context) {
        return Err(EvalError::NotWritable(path.to_string()));
    }
    match &path.root {
        Root::Global => write_cell(env.global_cell().as_ref(), &path.parts, ctx),
        Root::State => write_cell(env.state_cell().as_ref(), &path.parts, ctx),
        Root::Component => match env.component_cell() {
            Some(cell) => write_cell(cell.as_ref(), &path.parts, ctx),
            None => Err(EvalError::resolution("no component root in this environment")),
        },
        Root::Args => {
            let cur = env.args().cloned().unwrap_or(Value::Null);
            let new = set_in(cur.clone(), &path.parts, ctx)?;
            if new.same_value(&cur) {
                Ok(())
            } else {
                Err(EvalError::NotWritable(format!("{path} (cannot replace the $args root)")))
            }
        }
        Root::Context(caret) => {
            let Some((Segment::Map(key), rest)) = path.parts.split_first() else {
                return Err(EvalError::NotWritable(format!("{path} (context writes need a key)")));
            };
            let cur = env.context_var(*caret, key).unwrap_or(Value::Null);
            let new = set_in(cur.clone(), rest, ctx)?;
            if new.same_value(&cur) && env.context_var(*caret, key).is_some() {
                Ok(())
            } else {
                env.set_context_var(*caret, key, new)
            }
        }
        Root::CurrentContext(caret) => {
            if path.parts.is_empty() {
                return Err(EvalError::NotWritable(path.to_string()));
            }
            let frame = env.ancestor(*caret)?;
            set_in(Value::Object(frame.context_ref()), &path.parts, ctx).map(|_| ())
        }
        Root::Local(_) | Root::Value(_) => Err(EvalError::NotWritable(path.to_string())),
    }
}

/// Apply a write below a root cell: replace on identity change, else notify.
fn write_cell(cell: &dyn ObservableCell, parts: &[Segment], ctx: &mut WriteCtx) -> Result<(), EvalError> {
    let cur = cell.get();
    let new = set_in(cur.clone(), parts, ctx)?;
    if new.same_value(&cur) {
        cell.notify();
    } else {
        cell.set(new);
    }
    Ok(())
}

/// Write below `cur` and return the value that should now stand in its place.
/// Containers are modified in place; a different identity is returned only
/// when a container had to be created or the terminal value replaced.
pub(crate) fn set_in(cur: Value, parts: &[Segment], ctx: &mut WriteCtx) -> Result<Value, EvalError> {
    if let Value::LValue(lv) = &cur {
        if lv.is_read_only() {
            return Ok(cur);
        }
        ctx.lv_depth += 1;
        if ctx.lv_depth > ctx.max_lvalue_depth {
            return Err(EvalError::limit(format!(
                "lvalue writes nested deeper than {}",
                ctx.max_lvalue_depth
            )));
        }
        if parts.is_empty() {
            match ctx.op {
                SetOp::Set | SetOp::SetRaw => lv.write(ctx)?,
                _ if ctx.suppress => {}
                op => {
                    return Err(EvalError::resolution(format!(
                        "cannot {} through lvalue {}",
                        op.as_str(),
                        lv.path_string()
                    )));
                }
            }
        } else {
            let inner = lv.try_get()?;
            let new_inner = set_in(inner.clone(), parts, ctx)?;
            if !new_inner.same_value(&inner) {
                let mut sub = ctx.with(SetOp::Set, new_inner);
                lv.write(&mut sub)?;
            }
        }
        return Ok(cur);
    }

    let Some((first, rest)) = parts.split_first() else {
        return apply_op(cur, ctx);
    };
    match first {
        Segment::Array(index) => {
            if *index < 0 {
                return Err(EvalError::resolution(format!("negative array index [{index}]")));
            }
            let idx = *index as usize;
            if idx > ctx.max_array_index {
                return Err(EvalError::resolution(format!(
                    "array index {idx} exceeds the maximum of {}",
                    ctx.max_array_index
                )));
            }
            let items = match &cur {
                Value::Null | Value::NoAttr => Rc::new(RefCell::new(Vec::new())),
                Value::Array(items) => items.clone(),
                other => {
                    return Err(EvalError::resolution(format!(
                        "cannot assign [{idx}] into {}",
                        other.type_name()
                    )));
                }
            };
            let child = items.borrow().get(idx).cloned();
            let old = child.clone().unwrap_or(Value::Null);
            let new_child = set_in(old.clone(), rest, ctx)?;
            if child.is_none() || !new_child.same_value(&old) {
                let mut items = items.borrow_mut();
                if idx >= items.len() {
                    items.resize(idx + 1, Value::Null);
                }
                items[idx] = new_child;
            }
            Ok(Value::Array(items))
        }
        Segment::Map(key) => {
            let fields = match &cur {
                Value::Null | Value::NoAttr => Rc::new(RefCell::new(IndexMap::new())),
                Value::Object(fields) => fields.clone(),
                other => {
                    return Err(EvalError::resolution(format!(
                        "cannot assign key '{key}' into {}",
                        other.type_name()
                    )));
                }
            };
            let child = fields.borrow().get(key).cloned();
            let old = child.clone().unwrap_or(Value::Null);
            let new_child = set_in(old.clone(), rest, ctx)?;
            if child.is_none() || !new_child.same_value(&old) {
                fields.borrow_mut().insert(key.clone(), new_child);
            }
            Ok(Value::Object(fields))
        }
    }
}

/// Apply the terminal op to the current value.
fn apply_op(cur: Value, ctx: &mut WriteCtx) -> Result<Value, EvalError> {
    let value = ctx.value.clone();
    match ctx.op {
        SetOp::Set | SetOp::SetRaw => Ok(value),
        SetOp::SetUnless => Ok(if cur.is_nullish() { value } else { cur }),
        SetOp::Append => match (&cur, &value) {
            (Value::Null | Value::NoAttr, _) => Ok(Value::array(vec![value.clone()])),
            (Value::Array(items), _) => {
                items.borrow_mut().push(value.clone());
                Ok(cur.clone())
            }
            (Value::String(a), Value::String(b)) => Ok(Value::string(format!("{a}{b}"))),
            _ => Err(EvalError::resolution(format!(
                "cannot append {} to {}",
                value.type_name(),
                cur.type_name()
            ))),
        },
        SetOp::AppendArray => {
            let Value::Array(extra) = &value else {
                return Ok(cur);
            };
            match &cur {
                Value::Null | Value::NoAttr => Ok(value.clone()),
                Value::Array(items) => {
                    let extra: Vec<Value> = extra.borrow().clone();
                    items.borrow_mut().extend(extra);
                    Ok(cur.clone())
                }
                other => Err(EvalError::resolution(format!(
                    "cannot append-array to {}",
                    other.type_name()
                ))),
            }
        }
        SetOp::BlobExtend => match (&cur, &value) {
            (Value::Blob(blob), Value::String(more)) => {
                blob.borrow_mut().extend_base64(more);
                Ok(cur.clone())
            }
            _ => Err(EvalError::resolution(format!(
                "blob-extend needs a blob target and a string value, got {} and {}",
                cur.type_name(),
                value.type_name()
            ))),
        },
    }
}
