//! Built-in functions.

use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use regex::Regex;

use crate::json::{JsonOptions, to_json};
use crate::structural::deep_equal;
use crate::{Blob, Environment, EvalError, Value, format};

/// Signature shared by built-in and host functions.
pub type FunctionImpl = Rc<dyn Fn(&Environment, &[Value]) -> Result<Value, EvalError>>;

/// A callable registered by name.
#[derive(Clone)]
pub struct Function {
    pub name: String,
    /// Native functions see live values, LValues included. Others get
    /// resolved deep copies of their arguments.
    pub native: bool,
    pub call: FunctionImpl,
}

/// Functions callable from `fn:name(...)` expressions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, Function>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in builtins() {
            registry.register(builtin.name, false, builtin.func);
        }
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        native: bool,
        f: impl Fn(&Environment, &[Value]) -> Result<Value, EvalError> + 'static,
    ) {
        let name = name.into();
        self.functions.insert(
            name.clone(),
            Function {
                name,
                native,
                call: Rc::new(f),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

/// A built-in function.
#[derive(Clone, Copy)]
pub struct BuiltinFn {
    pub name: &'static str,
    pub func: fn(&Environment, &[Value]) -> Result<Value, EvalError>,
}

/// Get all built-in functions.
pub fn builtins() -> Vec<BuiltinFn> {
    vec![
        // === Collections ===
        BuiltinFn { name: "len", func: |_, args| {
            Ok(Value::Number(match &arg(args, 0) {
                Value::Null | Value::NoAttr => 0.0,
                Value::String(s) => s.chars().count() as f64,
                Value::Array(items) => items.borrow().len() as f64,
                Value::Object(fields) => fields.borrow().len() as f64,
                Value::Blob(b) => b.borrow().byte_len() as f64,
                Value::ChildrenRef(c) => c.len() as f64,
                other => return Err(type_error("len", "a string, array or object", other)),
            }))
        } },
        BuiltinFn { name: "indexof", func: |_, args| {
            let needle = arg(args, 1);
            Ok(Value::Number(match &arg(args, 0) {
                Value::Array(items) => items
                    .borrow()
                    .iter()
                    .position(|v| deep_equal(v, &needle))
                    .map(|i| i as f64)
                    .unwrap_or(-1.0),
                Value::String(s) => {
                    let needle = needle.to_display_string();
                    s.find(&needle)
                        .map(|byte| s[..byte].chars().count() as f64)
                        .unwrap_or(-1.0)
                }
                Value::Null => -1.0,
                other => return Err(type_error("indexof", "a string or array", other)),
            }))
        } },
        BuiltinFn { name: "contains", func: |_, args| {
            let needle = arg(args, 1);
            Ok(Value::Bool(match &arg(args, 0) {
                Value::Array(items) => items.borrow().iter().any(|v| deep_equal(v, &needle)),
                Value::String(s) => s.contains(needle.to_display_string().as_str()),
                Value::Object(fields) => fields.borrow().contains_key(&needle.to_display_string()),
                _ => false,
            }))
        } },
        BuiltinFn { name: "slice", func: |_, args| {
            let start = arg(args, 1).to_number();
            let end = args.get(2).map(Value::to_number);
            match &arg(args, 0) {
                Value::Array(items) => {
                    let items = items.borrow();
                    let (from, to) = slice_bounds(items.len(), start, end);
                    Ok(Value::array(items[from..to].to_vec()))
                }
                Value::String(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let (from, to) = slice_bounds(chars.len(), start, end);
                    Ok(Value::string(chars[from..to].iter().collect::<String>()))
                }
                Value::Null => Ok(Value::Null),
                other => Err(type_error("slice", "a string or array", other)),
            }
        } },
        BuiltinFn { name: "push", func: |_, args| {
            let mut items = match &arg(args, 0) {
                Value::Array(items) => items.borrow().clone(),
                Value::Null => Vec::new(),
                other => return Err(type_error("push", "an array", other)),
            };
            items.extend(args.iter().skip(1).cloned());
            Ok(Value::array(items))
        } },
        BuiltinFn { name: "keys", func: |_, args| match &arg(args, 0) {
            Value::Object(fields) => Ok(Value::array(
                fields.borrow().keys().map(|k| Value::string(k.as_str())).collect(),
            )),
            Value::Null => Ok(Value::array(Vec::new())),
            other => Err(type_error("keys", "an object", other)),
        } },
        BuiltinFn { name: "values", func: |_, args| match &arg(args, 0) {
            Value::Object(fields) => Ok(Value::array(fields.borrow().values().cloned().collect())),
            Value::Null => Ok(Value::array(Vec::new())),
            other => Err(type_error("values", "an object", other)),
        } },
        BuiltinFn { name: "merge", func: |_, args| {
            let mut merged = IndexMap::new();
            for value in args {
                match value {
                    Value::Object(fields) => {
                        for (k, v) in fields.borrow().iter() {
                            merged.insert(k.clone(), v.clone());
                        }
                    }
                    Value::Null | Value::NoAttr => {}
                    other => return Err(type_error("merge", "objects", other)),
                }
            }
            Ok(Value::object(merged))
        } },
        BuiltinFn { name: "reverse", func: |_, args| match &arg(args, 0) {
            Value::Array(items) => Ok(Value::array(items.borrow().iter().rev().cloned().collect())),
            Value::String(s) => Ok(Value::string(s.chars().rev().collect::<String>())),
            Value::Null => Ok(Value::Null),
            other => Err(type_error("reverse", "a string or array", other)),
        } },
        BuiltinFn { name: "sort", func: |_, args| match &arg(args, 0) {
            Value::Array(items) => {
                let mut items = items.borrow().clone();
                if items.iter().all(|v| matches!(v, Value::Number(_))) {
                    items.sort_by(|a, b| a.to_number().total_cmp(&b.to_number()));
                } else {
                    items.sort_by_key(Value::to_display_string);
                }
                Ok(Value::array(items))
            }
            Value::Null => Ok(Value::Null),
            other => Err(type_error("sort", "an array", other)),
        } },

        // === Numbers ===
        BuiltinFn { name: "min", func: |_, args| Ok(Value::Number(numbers(args).into_iter().fold(f64::INFINITY, f64::min))) },
        BuiltinFn { name: "max", func: |_, args| Ok(Value::Number(numbers(args).into_iter().fold(f64::NEG_INFINITY, f64::max))) },
        BuiltinFn { name: "floor", func: |_, args| Ok(Value::Number(arg(args, 0).to_number().floor())) },
        BuiltinFn { name: "ceil", func: |_, args| Ok(Value::Number(arg(args, 0).to_number().ceil())) },
        BuiltinFn { name: "round", func: |_, args| Ok(Value::Number((arg(args, 0).to_number() + 0.5).floor())) },
        BuiltinFn { name: "abs", func: |_, args| Ok(Value::Number(arg(args, 0).to_number().abs())) },
        BuiltinFn { name: "int", func: |_, args| Ok(Value::Number(arg(args, 0).to_number().trunc())) },
        BuiltinFn { name: "float", func: |_, args| Ok(Value::Number(arg(args, 0).to_number())) },

        // === Strings ===
        BuiltinFn { name: "str", func: |_, args| Ok(Value::string(arg(args, 0).to_display_string())) },
        BuiltinFn { name: "uppercase", func: |_, args| Ok(Value::string(text(args, 0).to_uppercase())) },
        BuiltinFn { name: "lowercase", func: |_, args| Ok(Value::string(text(args, 0).to_lowercase())) },
        BuiltinFn { name: "trim", func: |_, args| Ok(Value::string(text(args, 0).trim())) },
        BuiltinFn { name: "split", func: |_, args| {
            let s = text(args, 0);
            let sep = args.get(1).map(Value::to_display_string).unwrap_or_else(|| ",".to_string());
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::string).collect()
            };
            Ok(Value::array(parts))
        } },
        BuiltinFn { name: "join", func: |_, args| {
            let sep = args.get(1).map(Value::to_display_string).unwrap_or_else(|| ",".to_string());
            match &arg(args, 0) {
                Value::Array(items) => Ok(Value::string(
                    items
                        .borrow()
                        .iter()
                        .map(Value::to_display_string)
                        .collect::<Vec<_>>()
                        .join(&sep),
                )),
                Value::Null => Ok(Value::string("")),
                other => Err(type_error("join", "an array", other)),
            }
        } },
        BuiltinFn { name: "substr", func: |_, args| {
            let chars: Vec<char> = text(args, 0).chars().collect();
            let (from, _) = slice_bounds(chars.len(), arg(args, 1).to_number(), None);
            let len = args
                .get(2)
                .map(|v| v.to_number().max(0.0) as usize)
                .unwrap_or(chars.len());
            let to = from.saturating_add(len).min(chars.len());
            Ok(Value::string(chars[from..to].iter().collect::<String>()))
        } },
        BuiltinFn { name: "startswith", func: |_, args| Ok(Value::Bool(text(args, 0).starts_with(text(args, 1).as_str()))) },
        BuiltinFn { name: "endswith", func: |_, args| Ok(Value::Bool(text(args, 0).ends_with(text(args, 1).as_str()))) },
        BuiltinFn { name: "match", func: |_, args| {
            let re = regex(&text(args, 1), "match")?;
            let s = text(args, 0);
            Ok(match re.captures(&s) {
                Some(caps) => Value::array(
                    caps.iter()
                        .map(|m| m.map(|m| Value::string(m.as_str())).unwrap_or(Value::Null))
                        .collect(),
                ),
                None => Value::Null,
            })
        } },
        BuiltinFn { name: "replace", func: |_, args| {
            let re = regex(&text(args, 1), "replace")?;
            let replacement = text(args, 2);
            Ok(Value::string(re.replace_all(&text(args, 0), replacement.as_str()).into_owned()))
        } },
        BuiltinFn { name: "sprintf", func: |_, args| {
            let fmt = text(args, 0);
            let rest = args.get(1..).unwrap_or(&[]);
            format::sprintf(&fmt, rest).map(Value::from)
        } },

        // === Types ===
        BuiltinFn { name: "bool", func: |_, args| Ok(Value::Bool(arg(args, 0).is_truthy())) },
        BuiltinFn { name: "typeof", func: |_, args| Ok(Value::string(arg(args, 0).type_name())) },
        BuiltinFn { name: "isnull", func: |_, args| Ok(Value::Bool(arg(args, 0).is_nullish())) },
        BuiltinFn { name: "isarray", func: |_, args| Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_)))) },
        BuiltinFn { name: "isobject", func: |_, args| Ok(Value::Bool(matches!(arg(args, 0), Value::Object(_)))) },

        // === Structure ===
        // Arguments already arrive as deep copies.
        BuiltinFn { name: "deepcopy", func: |_, args| Ok(arg(args, 0)) },
        BuiltinFn { name: "deepequal", func: |_, args| Ok(Value::Bool(deep_equal(&arg(args, 0), &arg(args, 1)))) },
        BuiltinFn { name: "json", func: |_, args| {
            let opts = JsonOptions {
                pretty: arg(args, 1).is_truthy(),
                ..JsonOptions::default()
            };
            to_json(&arg(args, 0), opts).map(Value::from)
        } },
        BuiltinFn { name: "jsonparse", func: |_, args| {
            let source = text(args, 0);
            serde_json::from_str::<serde_json::Value>(&source)
                .map(|json| Value::from_json(&json))
                .map_err(|e| EvalError::function("jsonparse", e.to_string()))
        } },

        // === Blobs ===
        BuiltinFn { name: "blob", func: |_, args| {
            let mut blob = Blob::from_bytes(
                args.get(1)
                    .map(Value::to_display_string)
                    .unwrap_or_else(|| "text/plain".to_string()),
                text(args, 0).as_bytes(),
            );
            if let Some(name) = args.get(2).filter(|v| !v.is_nullish()) {
                blob = blob.with_name(name.to_display_string());
            }
            Ok(Value::blob(blob))
        } },
        BuiltinFn { name: "blobastext", func: |_, args| {
            let content = blob_arg(args, "blobastext")?.borrow().text()?;
            Ok(Value::string(content))
        } },
        BuiltinFn { name: "blobasbase64", func: |_, args| {
            let data = blob_arg(args, "blobasbase64")?.borrow().data.clone();
            Ok(Value::string(data))
        } },
        BuiltinFn { name: "blobmimetype", func: |_, args| {
            let mimetype = blob_arg(args, "blobmimetype")?.borrow().mimetype.clone();
            Ok(Value::string(mimetype))
        } },
        BuiltinFn { name: "blobname", func: |_, args| {
            let name = blob_arg(args, "blobname")?.borrow().name.clone();
            Ok(name.map(Value::from).unwrap_or(Value::Null))
        } },

        // === Time ===
        BuiltinFn { name: "ts", func: |_, _| {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as f64)
                .unwrap_or(0.0);
            Ok(Value::Number(millis))
        } },
    ]
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

/// Argument as display text; `null` reads as the empty string.
fn text(args: &[Value], index: usize) -> String {
    match args.get(index) {
        None | Some(Value::Null) | Some(Value::NoAttr) => String::new(),
        Some(v) => v.to_display_string(),
    }
}

fn numbers(args: &[Value]) -> Vec<f64> {
    match args {
        [Value::Array(items)] => items.borrow().iter().map(Value::to_number).collect(),
        _ => args.iter().map(Value::to_number).collect(),
    }
}

fn blob_arg(args: &[Value], name: &str) -> Result<Rc<std::cell::RefCell<Blob>>, EvalError> {
    match args.first() {
        Some(Value::Blob(b)) => Ok(b.clone()),
        Some(other) => Err(type_error(name, "a blob", other)),
        None => Err(EvalError::function(name, "missing blob argument")),
    }
}

fn regex(pattern: &str, name: &str) -> Result<Regex, EvalError> {
    Regex::new(pattern).map_err(|e| EvalError::function(name, format!("invalid regex: {e}")))
}

fn type_error(name: &str, expected: &str, got: &Value) -> EvalError {
    EvalError::function(name, format!("expected {expected}, got {}", got.type_name()))
}

/// JavaScript `slice` bounds: negative offsets count from the end.
fn slice_bounds(len: usize, start: f64, end: Option<f64>) -> (usize, usize) {
    let clamp = |n: f64| -> usize {
        let n = if n.is_nan() { 0.0 } else { n.trunc() };
        let n = if n < 0.0 { len as f64 + n } else { n };
        n.clamp(0.0, len as f64) as usize
    };
    let from = clamp(start);
    let to = end.map(clamp).unwrap_or(len);
    (from, to.max(from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Value {
        let env = Environment::new(Value::Null);
        let f = env.functions().get(name).cloned().unwrap();
        (f.call)(&env, &args).unwrap()
    }

    #[test]
    fn test_registry_lists_builtins() {
        let registry = FunctionRegistry::with_builtins();
        for name in ["len", "sprintf", "blob", "ts", "deepequal"] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(!FunctionRegistry::new().contains("len"));
    }

    #[test]
    fn test_slice_negative() {
        let arr = Value::array(vec![1i64.into(), 2i64.into(), 3i64.into(), 4i64.into()]);
        let out = call("slice", vec![arr, (-2i64).into()]);
        assert_eq!(out.to_display_string(), "[array]");
        let items = out.as_array().unwrap().borrow().clone();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_number(), Some(3.0));
        assert_eq!(call("slice", vec!["hello".into(), 1i64.into(), 3i64.into()]).as_str(), Some("el"));
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(call("uppercase", vec!["abc".into()]).as_str(), Some("ABC"));
        assert_eq!(call("substr", vec!["hello".into(), 1i64.into(), 2i64.into()]).as_str(), Some("el"));
        assert_eq!(call("indexof", vec!["hello".into(), "l".into()]).as_number(), Some(2.0));
        assert_eq!(
            call("replace", vec!["a-b-c".into(), "-".into(), "+".into()]).as_str(),
            Some("a+b+c")
        );
        assert_eq!(call("join", vec![Value::array(vec!["a".into(), "b".into()]), " ".into()]).as_str(), Some("a b"));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(call("max", vec![1i64.into(), 5i64.into(), 3i64.into()]).as_number(), Some(5.0));
        assert_eq!(call("round", vec![2.5.into()]).as_number(), Some(3.0));
        assert_eq!(call("int", vec!["12.7".into()]).as_number(), Some(12.0));
    }

    #[test]
    fn test_blob_round_trip() {
        let blob = call("blob", vec!["hi there".into(), "text/plain".into()]);
        assert_eq!(call("blobastext", vec![blob.clone()]).as_str(), Some("hi there"));
        assert_eq!(call("blobmimetype", vec![blob.clone()]).as_str(), Some("text/plain"));
        assert_eq!(call("len", vec![blob]).as_number(), Some(8.0));
    }
}
