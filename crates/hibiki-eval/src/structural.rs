//! Deep copy, deep equality and cycle detection over the value graph.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::config::DEFAULT_MAX_LVALUE_DEPTH;
use crate::lvalue::resolve_lvalue_chain;
use crate::{EvalError, Value};

/// Options for [`deep_copy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Replace LValues with copies of what they point at.
    pub resolve_lvalues: bool,
}

/// Copy arrays, objects and blobs recursively.
///
/// A container reachable from itself is reported as [`EvalError::Cycle`]
/// with a trail such as `root -> .a -> [2]`. Shared but acyclic containers
/// are copied once per occurrence.
pub fn deep_copy(value: &Value, opts: CopyOptions) -> Result<Value, EvalError> {
    Copier {
        opts,
        ancestors: Vec::new(),
        trail: Vec::new(),
    }
    .copy(value)
}

/// Report the first cycle, if any.
pub fn check_cycles(value: &Value) -> Result<(), EvalError> {
    deep_copy(value, CopyOptions::default()).map(|_| ())
}

struct Copier {
    opts: CopyOptions,
    ancestors: Vec<usize>,
    trail: Vec<String>,
}

impl Copier {
    fn enter(&mut self, id: usize) -> Result<(), EvalError> {
        if self.ancestors.contains(&id) {
            let mut trail = String::from("root");
            for step in &self.trail {
                trail.push_str(" -> ");
                trail.push_str(step);
            }
            return Err(EvalError::Cycle { trail });
        }
        self.ancestors.push(id);
        Ok(())
    }

    fn copy(&mut self, value: &Value) -> Result<Value, EvalError> {
        match value {
            Value::LValue(_) if self.opts.resolve_lvalues => {
                let target = resolve_lvalue_chain(value.clone(), DEFAULT_MAX_LVALUE_DEPTH)?;
                self.copy(&target)
            }
            Value::Array(items) => {
                self.enter(Rc::as_ptr(items) as *const () as usize)?;
                let snapshot: Vec<Value> = items.borrow().clone();
                let mut out = Vec::with_capacity(snapshot.len());
                for (i, item) in snapshot.iter().enumerate() {
                    self.trail.push(format!("[{i}]"));
                    out.push(self.copy(item)?);
                    self.trail.pop();
                }
                self.ancestors.pop();
                Ok(Value::array(out))
            }
            Value::Object(fields) => {
                self.enter(Rc::as_ptr(fields) as *const () as usize)?;
                let snapshot: Vec<(String, Value)> = fields
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let mut out = IndexMap::with_capacity(snapshot.len());
                for (key, item) in &snapshot {
                    let mut step = String::new();
                    let _ = hibiki_syntax::write_key(&mut step, key);
                    self.trail.push(step);
                    out.insert(key.clone(), self.copy(item)?);
                    self.trail.pop();
                }
                self.ancestors.pop();
                Ok(Value::object(out))
            }
            Value::Blob(blob) => Ok(Value::Blob(Rc::new(RefCell::new(blob.borrow().clone())))),
            other => Ok(other.clone()),
        }
    }
}

/// Structural equality. LValues are compared by what they point at.
/// Terminates on cyclic values.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    let mut seen = HashSet::new();
    equal_inner(a, b, &mut seen)
}

fn resolve_for_compare(value: &Value) -> Value {
    match value {
        Value::LValue(_) => {
            resolve_lvalue_chain(value.clone(), DEFAULT_MAX_LVALUE_DEPTH).unwrap_or_else(|_| value.clone())
        }
        other => other.clone(),
    }
}

fn equal_inner(a: &Value, b: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
    let a = resolve_for_compare(a);
    let b = resolve_for_compare(b);
    if a.same_value(&b) {
        return true;
    }
    match (&a, &b) {
        (Value::Array(x), Value::Array(y)) => {
            let pair = (Rc::as_ptr(x) as *const () as usize, Rc::as_ptr(y) as *const () as usize);
            if !seen.insert(pair) {
                return true;
            }
            let xs: Vec<Value> = x.borrow().clone();
            let ys: Vec<Value> = y.borrow().clone();
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(p, q)| equal_inner(p, q, seen))
        }
        (Value::Object(x), Value::Object(y)) => {
            let pair = (Rc::as_ptr(x) as *const () as usize, Rc::as_ptr(y) as *const () as usize);
            if !seen.insert(pair) {
                return true;
            }
            let xs: IndexMap<String, Value> = x.borrow().clone();
            let ys: IndexMap<String, Value> = y.borrow().clone();
            xs.len() == ys.len()
                && xs.iter().all(|(k, v)| match ys.get(k) {
                    Some(w) => equal_inner(v, w, seen),
                    None => false,
                })
        }
        (Value::Blob(x), Value::Blob(y)) => *x.borrow() == *y.borrow(),
        (Value::ChildrenRef(x), Value::ChildrenRef(y)) => x == y,
        (Value::Error(x), Value::Error(y)) => x.message == y.message && x.context == y.context,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(entries: Vec<(&str, Value)>) -> Value {
        Value::object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_copy_is_fresh() {
        let inner = Value::array(vec![1i64.into()]);
        let original = obj(vec![("a", inner.clone())]);
        let copy = deep_copy(&original, CopyOptions::default()).unwrap();
        assert!(deep_equal(&original, &copy));
        assert!(!original.same_value(&copy));
        let copied_inner = copy.as_object().unwrap().borrow().get("a").cloned().unwrap();
        assert!(!copied_inner.same_value(&inner));
    }

    #[test]
    fn test_shared_acyclic_is_not_a_cycle() {
        let shared = Value::array(vec![]);
        let v = Value::array(vec![shared.clone(), shared]);
        assert!(check_cycles(&v).is_ok());
    }

    #[test]
    fn test_object_cycle_trail() {
        let a = Value::empty_object();
        a.as_object().unwrap().borrow_mut().insert("self".into(), a.clone());
        match check_cycles(&a) {
            Err(EvalError::Cycle { trail }) => assert_eq!(trail, "root -> .self"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_array_cycle_trail() {
        let arr = Value::array(vec![1i64.into()]);
        let holder = obj(vec![("list", arr.clone())]);
        arr.as_array().unwrap().borrow_mut().push(holder.clone());
        match check_cycles(&holder) {
            Err(EvalError::Cycle { trail }) => assert_eq!(trail, "root -> .list -> [1]"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_deep_equal_cyclic_terminates() {
        let a = Value::empty_object();
        a.as_object().unwrap().borrow_mut().insert("self".into(), a.clone());
        let b = Value::empty_object();
        b.as_object().unwrap().borrow_mut().insert("self".into(), b.clone());
        assert!(deep_equal(&a, &b));
        assert!(deep_equal(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(!deep_equal(&Value::Null, &Value::NoAttr));
    }
}
