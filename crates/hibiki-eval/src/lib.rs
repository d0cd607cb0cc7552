//! Evaluator and action interpreter for Hibiki.
//!
//! Expressions are evaluated synchronously against an [`Environment`];
//! handler blocks run on an [`Interpreter`] that awaits its [`Host`] only
//! for `call-handler`.

mod action;
mod builtin;
mod config;
mod env;
mod error;
mod eval;
mod event;
pub mod format;
mod json;
mod lvalue;
mod path;
mod structural;
mod value;

pub use action::{Host, Interpreter, LocalBoxFuture, Request};
pub use builtin::{BuiltinFn, Function, FunctionImpl, FunctionRegistry, builtins};
pub use config::{DEFAULT_MAX_LVALUE_DEPTH, InterpreterConfig};
pub use env::{ChildEnvOptions, Environment, EnvironmentBuilder, ObservableCell, StoreCell};
pub use error::EvalError;
pub use eval::{EvalMode, eval_expr, evaluate, invoke_lambda};
pub use event::{ERROR_EVENT, EventInfo};
pub use json::{JsonOptions, to_json, to_json_value};
pub use lvalue::{LValue, resolve_lvalue_chain};
pub use path::{
    ConcretePath, Root, Segment, WriteOptions, eval_dynamic_parts, resolve_concrete, resolve_path,
    resolve_static, resolve_str, resolve_str_throw, write_path, write_path_throw, write_str,
    write_str_throw,
};
pub use structural::{CopyOptions, check_cycles, deep_copy, deep_equal};
pub use value::{
    ArrayRef, Blob, ChildrenRef, ErrorValue, Lambda, NativeLambda, NodeBinding, ObjectRef, Primitive,
    SpecialKind, Value, ValueClass, format_number,
};
