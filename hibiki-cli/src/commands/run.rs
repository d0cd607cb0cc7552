//! The `hibiki run` command.

use std::path::Path;
use std::rc::Rc;

use async_trait::async_trait;
use hibiki_diagnostic::DiagnosticKind;
use hibiki_eval::{ErrorValue, EvalError, EventInfo, Host, Interpreter, ObservableCell, Request, Value};
use hibiki_syntax::HandlerBlock;
use indexmap::IndexMap;

use super::{build_env, describe_error, read_typed, render};
use crate::{Inputs, output};

/// Host backed by a static callpath table.
struct CliHost {
    handlers: IndexMap<String, HandlerBlock>,
}

#[async_trait(?Send)]
impl Host for CliHost {
    async fn dispatch(&self, request: Request) -> Result<Option<HandlerBlock>, EvalError> {
        let target = request.target();
        match self.handlers.get(&target) {
            Some(block) => Ok(Some(block.clone())),
            None => {
                output::warning(&format!("no handler registered for {target}"));
                Ok(None)
            }
        }
    }

    fn unhandled_event(&self, event: &EventInfo) {
        output::warning(&format!("unhandled event '{}'", event.event));
    }

    fn unhandled_error(&self, error: &ErrorValue) {
        output::error(&error.message);
        for frame in &error.context {
            output::error(&format!("  in {frame}"));
        }
    }

    fn log(&self, line: &str) {
        output::log(line);
    }
}

pub async fn run(file: &Path, handlers: Option<&Path>, event: Option<&str>, inputs: &Inputs) -> Result<(), String> {
    let block: HandlerBlock = read_typed(file)?;
    let handlers: IndexMap<String, HandlerBlock> = match handlers {
        Some(path) => read_typed(path)?,
        None => IndexMap::new(),
    };
    let (env, store) = build_env(inputs)?;
    let interp = Interpreter::new(Rc::new(CliHost { handlers }));

    let returned = match event {
        Some(name) => {
            env.define_handler(name, block);
            interp
                .dispatch_event(&EventInfo::new(name).bubbling(), &env)
                .await
                .map_err(|e| describe_error(DiagnosticKind::Event, &e))?;
            None
        }
        None => interp
            .run_handler(&block, &env)
            .await
            .map_err(|e| describe_error(DiagnosticKind::Action, &e))?,
    };

    if let Some(value) = returned {
        output::result(&render(&value)?);
    }
    output::result(&render(&store.get())?);
    Ok(())
}
