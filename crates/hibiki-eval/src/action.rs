//! Action interpreter.
//!
//! Handler blocks run sequentially. Only `call-handler` suspends, at the
//! await on [`Host::dispatch`]; everything else is synchronous.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use async_trait::async_trait;
use hibiki_diagnostic::{ContextFrame, RuntimeContext};
use hibiki_syntax::{Action, Expr, HandlerBlock, RootKind, SetOp};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::event::EventInfo;
use crate::path::write_path_throw;
use crate::structural::{CopyOptions, deep_copy};
use crate::{ChildEnvOptions, Environment, ErrorValue, EvalError, EvalMode, Value, WriteOptions, eval_expr};

/// Boxed future used to break recursion between blocks and handlers.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// What a `call-handler` asks the host for.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub callpath: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub module: Option<String>,
    /// Deep copy of the call data with LValues resolved.
    pub data: Value,
    pub pure: bool,
    pub lib_context: String,
}

impl Request {
    /// Callpath, or `module:method url` when addressed by URL.
    pub fn target(&self) -> String {
        match &self.callpath {
            Some(path) => path.clone(),
            None => format!(
                "{}:{} {}",
                self.module.as_deref().unwrap_or("http"),
                self.method.as_deref().unwrap_or("GET"),
                self.url.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Services the interpreter needs from its embedding.
#[async_trait(?Send)]
pub trait Host {
    /// Resolve a request to a handler block to run, if any.
    async fn dispatch(&self, request: Request) -> Result<Option<HandlerBlock>, EvalError>;

    /// Invalidate cached queries whose name matches, or all when `None`.
    fn invalidate(&self, pattern: Option<&Regex>) {
        debug!(pattern = pattern.map(Regex::as_str), "invalidate");
    }

    fn unhandled_event(&self, event: &EventInfo) {
        warn!(event = %event.event, "unhandled event");
    }

    fn unhandled_error(&self, error: &ErrorValue) {
        error!(context = ?error.context, "unhandled error: {}", error.message);
    }

    /// Environment of the node with the given id.
    fn node_env(&self, _node_id: &str) -> Option<Environment> {
        None
    }

    fn log(&self, line: &str) {
        info!(target: "hibiki::log", "{line}");
    }

    fn install_markup(&self, html: &str) {
        debug!(len = html.len(), "install-markup ignored");
    }
}

/// Per-chain execution state.
///
/// Every top-level invocation owns one, so chains interleaving at await
/// points keep separate action counters and frame stacks.
#[derive(Debug, Default)]
pub(crate) struct Chain {
    ctx: RefCell<RuntimeContext>,
    /// Context stack at the first failing action not yet turned into an error value.
    failure: RefCell<Option<Vec<String>>>,
}

impl Chain {
    /// Rendered runtime context, innermost first.
    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.ctx.borrow().snapshot()
    }

    pub(crate) fn push_frame(&self, frame: ContextFrame) -> usize {
        let mut ctx = self.ctx.borrow_mut();
        let mark = ctx.mark();
        ctx.push_frame(frame);
        mark
    }

    pub(crate) fn revert_to(&self, mark: usize) {
        self.ctx.borrow_mut().revert_to(mark);
    }

    fn record_failure(&self) {
        let mut slot = self.failure.borrow_mut();
        if slot.is_none() {
            *slot = Some(self.snapshot());
        }
    }

    pub(crate) fn take_failure(&self) -> Option<Vec<String>> {
        self.failure.borrow_mut().take()
    }
}

/// Executes handler blocks against environments.
pub struct Interpreter {
    host: Rc<dyn Host>,
}

impl Interpreter {
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    /// Run a handler block as a fresh invocation.
    pub async fn run_handler(&self, block: &HandlerBlock, env: &Environment) -> Result<Option<Value>, EvalError> {
        self.run_handler_with(block, env, "run", false).await
    }

    pub async fn run_handler_with(
        &self,
        block: &HandlerBlock,
        env: &Environment,
        name: &str,
        pure: bool,
    ) -> Result<Option<Value>, EvalError> {
        let chain = Chain::default();
        self.execute_handler(&chain, block, env, name, pure).await
    }

    /// One handler invocation: a context frame plus the stack-depth guard.
    pub(crate) fn execute_handler<'a>(
        &'a self,
        chain: &'a Chain,
        block: &'a HandlerBlock,
        env: &'a Environment,
        name: &'a str,
        pure: bool,
    ) -> LocalBoxFuture<'a, Result<Option<Value>, EvalError>> {
        Box::pin(async move {
            let max_depth = env.config().max_stack_depth;
            if chain.ctx.borrow().handler_depth() >= max_depth {
                return Err(EvalError::limit(format!("handler stack deeper than {max_depth}")));
            }
            let mark = chain.push_frame(ContextFrame::handler(name, env.description()));
            let result = self.execute_block(chain, block, env, pure).await;
            chain.revert_to(mark);
            result
        })
    }

    /// Run the actions of one block and return its `set-return` value.
    pub(crate) fn execute_block<'a>(
        &'a self,
        chain: &'a Chain,
        block: &'a HandlerBlock,
        env: &'a Environment,
        pure: bool,
    ) -> LocalBoxFuture<'a, Result<Option<Value>, EvalError>> {
        Box::pin(async move {
            let max_actions = env.config().max_actions;
            let mut ret = None;
            for action in &block.actions {
                let over_limit = chain.ctx.borrow_mut().count_action() > max_actions;
                if over_limit {
                    chain.record_failure();
                    return Err(EvalError::limit(format!("more than {max_actions} actions in one handler chain")));
                }
                let mark = {
                    let mut ctx = chain.ctx.borrow_mut();
                    let mark = ctx.mark();
                    ctx.push(describe(action));
                    mark
                };
                let result = self.execute_action(chain, action, env, pure).await;
                if result.is_err() {
                    chain.record_failure();
                }
                chain.revert_to(mark);
                if let Some(value) = result? {
                    ret = Some(value);
                }
            }
            Ok(ret)
        })
    }

    async fn execute_action(
        &self,
        chain: &Chain,
        action: &Action,
        env: &Environment,
        pure: bool,
    ) -> Result<Option<Value>, EvalError> {
        match action {
            Action::SetData { setop, target, data } => {
                let mode = if *setop == SetOp::SetRaw { EvalMode::Raw } else { EvalMode::Natural };
                let value = eval_expr(data, env, mode)?;
                let Some(target) = target else {
                    return Ok(None);
                };
                if pure && !matches!(target.root_part(), Some((RootKind::Context | RootKind::CurrentContext, _))) {
                    return Err(EvalError::NotWritable(format!("{target} (pure handlers may only write context)")));
                }
                write_path_throw(target, env, *setop, value, WriteOptions::privileged())?;
                Ok(None)
            }

            Action::IfBlock {
                cond,
                then_block,
                else_block,
            } => {
                let branch = if eval_expr(cond, env, EvalMode::Resolve)?.is_truthy() {
                    Some(then_block)
                } else {
                    else_block.as_ref()
                };
                if let Some(block) = branch {
                    if let Some(rtn) = self.execute_block(chain, block, env, pure).await? {
                        env.set_context_var(0, "rtn", rtn)?;
                    }
                }
                Ok(None)
            }

            Action::SetReturn { data } => Ok(Some(eval_expr(data, env, EvalMode::Natural)?)),

            Action::CallHandler {
                target,
                callpath,
                url,
                method,
                module,
                data,
                pure: call_pure,
            } => {
                let data = match data {
                    Some(expr) => eval_expr(expr, env, EvalMode::Natural)?,
                    None => Value::empty_object(),
                };
                let data = deep_copy(&data, CopyOptions { resolve_lvalues: true })?;
                let request = Request {
                    callpath: opt_string(callpath.as_ref(), env)?,
                    url: opt_string(url.as_ref(), env)?,
                    method: opt_string(method.as_ref(), env)?,
                    module: opt_string(module.as_ref(), env)?,
                    data: data.clone(),
                    pure: pure || *call_pure,
                    lib_context: env.lib_context().to_string(),
                };
                let handler_pure = request.pure;
                let name = request.target();
                debug!(target = %name, pure = handler_pure, "call-handler");
                let block = self.host.dispatch(request).await?;
                let result = match block {
                    Some(block) => {
                        let mut opts = ChildEnvOptions::new(format!("handler {name}")).with_data(data.clone());
                        opts.args = Some(data);
                        let child = env.make_child(opts);
                        self.execute_handler(chain, &block, &child, &name, handler_pure).await?
                    }
                    None => None,
                };
                if let Some(target) = target {
                    write_path_throw(
                        target,
                        env,
                        SetOp::Set,
                        result.unwrap_or(Value::Null),
                        WriteOptions::privileged(),
                    )?;
                }
                Ok(None)
            }

            Action::Invalidate { pattern } => {
                if pure {
                    return Ok(None);
                }
                match pattern {
                    Some(expr) => {
                        let source = eval_expr(expr, env, EvalMode::Resolve)?.to_display_string();
                        let re = Regex::new(&source)
                            .map_err(|e| EvalError::resolution(format!("invalid invalidate pattern: {e}")))?;
                        self.host.invalidate(Some(&re));
                    }
                    None => self.host.invalidate(None),
                }
                Ok(None)
            }

            Action::FireEvent { event, bubble, data } => {
                if pure {
                    return Ok(None);
                }
                let data = match data {
                    Some(expr) => eval_expr(expr, env, EvalMode::Natural)?,
                    None => Value::empty_object(),
                };
                let info = EventInfo::from_data(event.as_str(), *bubble, &data);
                self.dispatch_in(chain, &info, env).await?;
                Ok(None)
            }

            Action::Log { exprs, debug: with_debug } => {
                let line = exprs
                    .iter()
                    .map(|e| eval_expr(e, env, EvalMode::Resolve).map(|v| v.to_display_string()))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(" ");
                self.host.log(&line);
                if *with_debug {
                    let stack = chain.ctx.borrow().render();
                    self.host.log(&stack);
                    self.host.log(&env.describe());
                }
                Ok(None)
            }

            Action::Throw { data } => {
                let value = eval_expr(data, env, EvalMode::Resolve)?;
                let context = chain.snapshot();
                let error = match &value {
                    Value::Error(existing) => ErrorValue {
                        context,
                        ..(**existing).clone()
                    },
                    other => ErrorValue::new(other.to_display_string()).with_context(context),
                };
                Err(EvalError::Thrown(Rc::new(error)))
            }

            Action::Nop => Ok(None),

            Action::InstallMarkup { html } => {
                if !pure {
                    self.host.install_markup(html);
                }
                Ok(None)
            }
        }
    }
}

fn opt_string(expr: Option<&Expr>, env: &Environment) -> Result<Option<String>, EvalError> {
    match expr {
        Some(expr) => match eval_expr(expr, env, EvalMode::Resolve)? {
            Value::Null => Ok(None),
            v => Ok(Some(v.to_display_string())),
        },
        None => Ok(None),
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::SetData {
            setop,
            target: Some(target),
            ..
        } => format!("{} {} {}", action.name(), setop.as_str(), target),
        Action::FireEvent { event, .. } => format!("{} {}", action.name(), event),
        _ => action.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hibiki_syntax::{Path, parse_path};
    use pretty_assertions::assert_eq;

    struct NoHost;

    #[async_trait(?Send)]
    impl Host for NoHost {
        async fn dispatch(&self, _request: Request) -> Result<Option<HandlerBlock>, EvalError> {
            Ok(None)
        }
    }

    fn run(block: HandlerBlock, env: &Environment) -> Result<Option<Value>, EvalError> {
        let interp = Interpreter::new(Rc::new(NoHost));
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(interp.run_handler(&block, env))
    }

    #[test]
    fn test_last_set_return_wins() {
        let env = Environment::new(Value::empty_object());
        let block = HandlerBlock::new(vec![
            Action::ret(Expr::lit(1)),
            Action::Nop,
            Action::ret(Expr::lit(2)),
        ]);
        let ret = run(block, &env).unwrap().unwrap();
        assert_eq!(ret.to_number(), 2.0);
    }

    #[test]
    fn test_set_data_writes_global() {
        let env = Environment::new(Value::empty_object());
        let block = HandlerBlock::new(vec![Action::set(Path::global().key("x"), Expr::lit(5))]);
        run(block, &env).unwrap();
        let x = crate::resolve_str("$.x", &env);
        assert_eq!(x.to_number(), 5.0);
    }

    #[test]
    fn test_pure_mode_rejects_global_writes() {
        let env = Environment::new(Value::empty_object());
        let interp = Interpreter::new(Rc::new(NoHost));
        let block = HandlerBlock::new(vec![Action::set(Path::global().key("x"), Expr::lit(5))]);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let err = rt.block_on(interp.run_handler_with(&block, &env, "pure", true)).unwrap_err();
        assert!(matches!(err, EvalError::NotWritable(_)));

        let ok = HandlerBlock::new(vec![Action::set(parse_path("@tmp").unwrap(), Expr::lit(1))]);
        assert!(rt.block_on(interp.run_handler_with(&ok, &env, "pure", true)).is_ok());
    }

    #[test]
    fn test_context_frames_are_popped() {
        let env = Environment::new(Value::empty_object());
        let interp = Interpreter::new(Rc::new(NoHost));
        let block = HandlerBlock::new(vec![Action::Nop, Action::Nop]);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let chain = Chain::default();
        rt.block_on(interp.execute_handler(&chain, &block, &env, "run", false)).unwrap();
        assert!(chain.snapshot().is_empty());
        assert_eq!(chain.ctx.borrow().action_count(), 2);
    }

    #[test]
    fn test_failure_context_is_captured_once() {
        let env = Environment::new(Value::empty_object());
        let interp = Interpreter::new(Rc::new(NoHost));
        let block = HandlerBlock::new(vec![Action::throw(Expr::lit("boom"))]);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let chain = Chain::default();
        assert!(rt.block_on(interp.execute_handler(&chain, &block, &env, "run", false)).is_err());
        let captured = chain.take_failure().unwrap();
        assert_eq!(captured[0], "throw");
        assert!(chain.take_failure().is_none());
    }

    #[test]
    fn test_describe_set_data() {
        let action = Action::set(Path::global().key("x"), Expr::lit(1));
        assert_eq!(describe(&action), "set-data set $.x");
    }
}
