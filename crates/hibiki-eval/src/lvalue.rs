//! LValues: re-resolvable read/write handles.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use hibiki_diagnostic::{DiagnosticKind, emit};
use hibiki_syntax::SetOp;

use crate::config::DEFAULT_MAX_LVALUE_DEPTH;
use crate::path::{WriteCtx, resolve_concrete, set_in, walk, write_concrete, write_segments};
use crate::{ConcretePath, Environment, EvalError, Segment, Value, WriteOptions};

/// A handle bound to a location. It holds no value of its own.
pub enum LValue {
    /// A concrete path resolved against an environment.
    Bound { path: ConcretePath, env: Environment },
    /// A path below an independently owned slot.
    Rooted { parts: Vec<Segment>, root: Rc<RefCell<Value>> },
    /// Reads through; writes are silently dropped.
    ReadOnly(Rc<LValue>),
}

impl LValue {
    pub fn bound(path: ConcretePath, env: Environment) -> Self {
        LValue::Bound { path, env }
    }

    pub fn rooted(root: Rc<RefCell<Value>>, parts: Vec<Segment>) -> Self {
        LValue::Rooted { parts, root }
    }

    /// A rooted handle over a fresh slot holding `value`.
    pub fn slot(value: Value) -> Self {
        LValue::Rooted {
            parts: Vec::new(),
            root: Rc::new(RefCell::new(value)),
        }
    }

    pub fn read_only(inner: Rc<LValue>) -> Self {
        LValue::ReadOnly(inner)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, LValue::ReadOnly(_))
    }

    fn max_depth(&self) -> usize {
        match self {
            LValue::Bound { env, .. } => env.config().max_lvalue_depth,
            LValue::Rooted { .. } => DEFAULT_MAX_LVALUE_DEPTH,
            LValue::ReadOnly(inner) => inner.max_depth(),
        }
    }

    pub fn try_get(&self) -> Result<Value, EvalError> {
        match self {
            LValue::Bound { path, env } => resolve_concrete(path, env),
            LValue::Rooted { parts, root } => {
                let start = root.borrow().clone();
                walk(start, parts, DEFAULT_MAX_LVALUE_DEPTH)
            }
            LValue::ReadOnly(inner) => inner.try_get(),
        }
    }

    /// Current value; errors are logged and read as `null`.
    pub fn get(&self) -> Value {
        self.try_get().unwrap_or_else(|e| {
            emit(&e.to_diagnostic(DiagnosticKind::Path, &format!("reading lvalue {}", self.path_string())));
            Value::Null
        })
    }

    pub fn try_set(&self, value: Value) -> Result<(), EvalError> {
        let mut ctx = match self {
            LValue::Bound { env, .. } => WriteCtx::new(SetOp::Set, value, env, WriteOptions::privileged()),
            _ => WriteCtx {
                op: SetOp::Set,
                value,
                max_array_index: crate::InterpreterConfig::default().max_array_index,
                max_lvalue_depth: self.max_depth(),
                lv_depth: 0,
                suppress: false,
            },
        };
        self.write(&mut ctx)
    }

    /// Write `value`; errors are logged. A read-only handle ignores the write.
    pub fn set(&self, value: Value) {
        if let Err(e) = self.try_set(value) {
            emit(&e.to_diagnostic(DiagnosticKind::Path, &format!("writing lvalue {}", self.path_string())));
        }
    }

    /// Apply the pending write in `ctx` at this handle's location.
    pub(crate) fn write(&self, ctx: &mut WriteCtx) -> Result<(), EvalError> {
        match self {
            LValue::Bound { path, env } => write_concrete(path, env, ctx, true),
            LValue::Rooted { parts, root } => {
                let cur = root.borrow().clone();
                let new = set_in(cur.clone(), parts, ctx)?;
                if !new.same_value(&cur) {
                    *root.borrow_mut() = new;
                }
                Ok(())
            }
            LValue::ReadOnly(_) => Ok(()),
        }
    }

    /// StringPath form of the bound location.
    pub fn path_string(&self) -> String {
        match self {
            LValue::Bound { path, .. } => path.to_string(),
            LValue::Rooted { parts, .. } => {
                let mut out = String::from("(slot)");
                let _ = write_segments(&mut out, parts);
                out
            }
            LValue::ReadOnly(inner) => {
                let mut out = inner.path_string();
                let _ = write!(out, " (readonly)");
                out
            }
        }
    }
}

/// Follow a chain of LValues to the first non-LValue value.
pub fn resolve_lvalue_chain(value: Value, max_depth: usize) -> Result<Value, EvalError> {
    let mut cur = value;
    let mut depth = 0;
    while let Value::LValue(lv) = &cur {
        if depth >= max_depth {
            return Err(EvalError::limit(format!("lvalue chain longer than {max_depth}")));
        }
        let next = lv.try_get()?;
        cur = next;
        depth += 1;
    }
    Ok(cur)
}
