//! Expression evaluator.

use std::cmp::Ordering;
use std::rc::Rc;

use hibiki_diagnostic::{DiagnosticKind, emit};
use hibiki_syntax::{Expr, Op};
use indexmap::IndexMap;

use crate::lvalue::resolve_lvalue_chain;
use crate::path::{eval_dynamic_parts, resolve_static};
use crate::structural::{CopyOptions, deep_copy};
use crate::{ChildEnvOptions, Environment, EvalError, LValue, Lambda, Root, Value, format};

/// How LValues in the result are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// LValues stay unresolved.
    Natural,
    /// LValue chains are followed and `NoAttr` reads as `null`.
    Resolve,
    /// No post-processing.
    Raw,
}

/// Evaluate an expression, propagating errors.
pub fn eval_expr(expr: &Expr, env: &Environment, mode: EvalMode) -> Result<Value, EvalError> {
    let value = eval_node(expr, env)?;
    apply_mode(value, env, mode)
}

/// Evaluate in resolve mode; errors are logged and yield `null`.
pub fn evaluate(expr: &Expr, env: &Environment) -> Value {
    eval_expr(expr, env, EvalMode::Resolve).unwrap_or_else(|e| {
        emit(&e.to_diagnostic(DiagnosticKind::Eval, &format!("evaluating in {}", env.description())));
        Value::Null
    })
}

fn apply_mode(value: Value, env: &Environment, mode: EvalMode) -> Result<Value, EvalError> {
    match mode {
        EvalMode::Natural | EvalMode::Raw => Ok(value),
        EvalMode::Resolve => match resolve_lvalue_chain(value, env.config().max_lvalue_depth)? {
            Value::NoAttr => Ok(Value::Null),
            other => Ok(other),
        },
    }
}

/// Follow LValues but keep `NoAttr`.
fn resolved(value: Value, env: &Environment) -> Result<Value, EvalError> {
    resolve_lvalue_chain(value, env.config().max_lvalue_depth)
}

fn eval_node(expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal { value } => Ok(Value::from_json(value)),

        Expr::Path { path } => resolve_static(path, env),

        Expr::Array { exprs } => {
            let items = exprs
                .iter()
                .map(|e| eval_expr(e, env, EvalMode::Natural))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::array(items))
        }

        Expr::Map { entries } => {
            let mut fields = IndexMap::new();
            for entry in entries {
                let key = eval_expr(&entry.key, env, EvalMode::Resolve)?.to_display_string();
                let value = eval_expr(&entry.value, env, EvalMode::Natural)?;
                fields.insert(key, value);
            }
            Ok(Value::object(fields))
        }

        Expr::ArrayRange { start, end } => {
            let start = eval_expr(start, env, EvalMode::Resolve)?.to_number();
            let end = eval_expr(end, env, EvalMode::Resolve)?.to_number();
            if start.is_nan() || end.is_nan() || start > end {
                return Ok(Value::array(Vec::new()));
            }
            let count = (end - start).floor() + 1.0;
            let max = env.config().max_array_index as f64;
            if count > max {
                return Err(EvalError::resolution(format!(
                    "range [{start}:{end}] is longer than the array maximum {max}"
                )));
            }
            let items = (0..count as usize)
                .map(|i| Value::Number(start + i as f64))
                .collect();
            Ok(Value::array(items))
        }

        Expr::Op { op, exprs } => eval_op(*op, exprs, env),

        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            if eval_expr(cond, env, EvalMode::Resolve)?.is_truthy() {
                eval_expr(then_expr, env, EvalMode::Natural)
            } else {
                eval_expr(else_expr, env, EvalMode::Natural)
            }
        }

        Expr::FnCall { name, exprs } => {
            let func = env
                .functions()
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
            let mut args = Vec::with_capacity(exprs.len());
            for e in exprs {
                let arg = eval_expr(e, env, EvalMode::Natural)?;
                if func.native {
                    args.push(arg);
                } else {
                    args.push(deep_copy(&arg, CopyOptions { resolve_lvalues: true })?);
                }
            }
            (func.call)(env, &args)
        }

        Expr::Filter { filter, expr, args } => {
            if filter != "format" {
                return Err(EvalError::resolution(format!("unknown filter '{filter}'")));
            }
            let value = eval_expr(expr, env, EvalMode::Resolve)?;
            let fmt = match args {
                Some(args) => match eval_expr(args, env, EvalMode::Resolve)? {
                    Value::Array(items) => items
                        .borrow()
                        .first()
                        .map(Value::to_display_string)
                        .unwrap_or_else(|| "%v".to_string()),
                    Value::Null => "%v".to_string(),
                    other => other.to_display_string(),
                },
                None => "%v".to_string(),
            };
            format::sprintf(&fmt, &[value]).map(Value::from)
        }

        Expr::Ref { path } => {
            let concrete = eval_dynamic_parts(path, env, 0)?;
            match concrete.root {
                Root::Global | Root::State | Root::Component => {
                    Ok(Value::lvalue(LValue::bound(concrete, env.clone())))
                }
                _ => Err(EvalError::resolution(format!(
                    "ref() needs a $, $state or $c path, got {concrete}"
                ))),
            }
        }

        Expr::IsRef { expr } => {
            let value = eval_expr(expr, env, EvalMode::Raw)?;
            Ok(Value::Bool(matches!(value, Value::LValue(_))))
        }

        Expr::RefInfo { expr } => match eval_expr(expr, env, EvalMode::Raw)? {
            Value::LValue(lv) => Ok(Value::string(lv.path_string())),
            _ => Ok(Value::Null),
        },

        Expr::Invoke { func, params } => {
            let func = eval_expr(func, env, EvalMode::Resolve)?;
            let params = match params {
                Some(p) => eval_expr(p, env, EvalMode::Natural)?,
                None => Value::empty_object(),
            };
            match &func {
                Value::Lambda(lambda) => invoke_lambda(lambda, env, params),
                _ => Ok(func),
            }
        }

        Expr::Lambda { expr } => Ok(Value::Lambda(Rc::new(Lambda::Expr {
            expr: (**expr).clone(),
            env: env.clone(),
        }))),
    }
}

/// Invoke a lambda with a parameter value.
pub fn invoke_lambda(lambda: &Lambda, caller: &Environment, params: Value) -> Result<Value, EvalError> {
    match lambda {
        Lambda::Expr { expr, env } => {
            let child = env.make_child(ChildEnvOptions::new("lambda").with_data(params));
            eval_expr(expr, &child, EvalMode::Natural)
        }
        Lambda::Native(f) => f(caller, params),
    }
}

fn operand<'a>(op: Op, exprs: &'a [Expr], index: usize) -> Result<&'a Expr, EvalError> {
    exprs.get(index).ok_or_else(|| {
        EvalError::resolution(format!("operator '{}' is missing operand {}", op.symbol(), index + 1))
    })
}

fn eval_op(op: Op, exprs: &[Expr], env: &Environment) -> Result<Value, EvalError> {
    match op {
        Op::Add => {
            let first = operand(op, exprs, 0)?;
            let mut acc = add_operand(eval_expr(first, env, EvalMode::Natural)?, env)?;
            for e in &exprs[1..] {
                let rhs = add_operand(eval_expr(e, env, EvalMode::Natural)?, env)?;
                acc = if concatenates(&acc) || concatenates(&rhs) {
                    Value::string(format!("{}{}", acc.to_display_string(), rhs.to_display_string()))
                } else {
                    Value::Number(acc.to_number() + rhs.to_number())
                };
            }
            Ok(acc)
        }

        Op::Sub | Op::Mul | Op::Div | Op::Mod => {
            let a = eval_expr(operand(op, exprs, 0)?, env, EvalMode::Resolve)?.to_number();
            let b = eval_expr(operand(op, exprs, 1)?, env, EvalMode::Resolve)?.to_number();
            Ok(Value::Number(match op {
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::Div => a / b,
                _ => a % b,
            }))
        }

        Op::Neg => {
            let a = eval_expr(operand(op, exprs, 0)?, env, EvalMode::Resolve)?.to_number();
            Ok(Value::Number(-a))
        }

        Op::Not => {
            let a = eval_expr(operand(op, exprs, 0)?, env, EvalMode::Resolve)?;
            Ok(Value::Bool(!a.is_truthy()))
        }

        Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            let a = eval_expr(operand(op, exprs, 0)?, env, EvalMode::Resolve)?;
            let b = eval_expr(operand(op, exprs, 1)?, env, EvalMode::Resolve)?;
            let ordering = match (&a, &b) {
                (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
                _ => a.to_number().partial_cmp(&b.to_number()),
            };
            Ok(Value::Bool(match ordering {
                None => false,
                Some(ord) => match op {
                    Op::Lt => ord == Ordering::Less,
                    Op::Le => ord != Ordering::Greater,
                    Op::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                },
            }))
        }

        Op::Eq | Op::Ne => {
            let a = eval_expr(operand(op, exprs, 0)?, env, EvalMode::Natural)?;
            let b = eval_expr(operand(op, exprs, 1)?, env, EvalMode::Natural)?;
            let equal = a.strict_equals(&b) || resolved(a, env)?.loose_equals(&resolved(b, env)?);
            Ok(Value::Bool(if op == Op::Eq { equal } else { !equal }))
        }

        Op::And | Op::Or => {
            let first = operand(op, exprs, 0)?;
            let mut last = eval_expr(first, env, EvalMode::Natural)?;
            for e in &exprs[1..] {
                let truthy = resolved(last.clone(), env)?.is_truthy();
                if (op == Op::And) != truthy {
                    return Ok(last);
                }
                last = eval_expr(e, env, EvalMode::Natural)?;
            }
            Ok(last)
        }

        Op::Coalesce => {
            let mut last = Value::Null;
            for e in exprs {
                let value = eval_expr(e, env, EvalMode::Natural)?;
                if !resolved(value.clone(), env)?.is_nullish() {
                    return Ok(value);
                }
                last = value;
            }
            Ok(last)
        }
    }
}

/// Operands that make `+` join display strings instead of adding.
fn concatenates(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::NoAttr | Value::Bool(_) | Value::Number(_))
}

/// `+` operand: resolved, with the absent-attribute sentinel counting as zero.
fn add_operand(value: Value, env: &Environment) -> Result<Value, EvalError> {
    Ok(match resolved(value, env)? {
        Value::NoAttr => Value::Number(0.0),
        other => other,
    })
}
