//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use hibiki_eval::{Environment, ErrorValue, EvalError, EventInfo, Host, Interpreter, Request, Value};
use hibiki_syntax::{Expr, HandlerBlock, Path, parse_path};
use indexmap::IndexMap;
use regex::Regex;

/// Root environment over a JSON document.
pub fn env_with(json: serde_json::Value) -> Environment {
    Environment::new(Value::from_json(&json))
}

pub fn path(src: &str) -> Path {
    parse_path(src).unwrap()
}

/// Path expression from its string form.
pub fn p(src: &str) -> Expr {
    Expr::path(path(src))
}

/// JSON form of a value, for comparisons.
pub fn json(value: &Value) -> serde_json::Value {
    hibiki_eval::to_json_value(value, Default::default()).unwrap()
}

/// A host that records everything it is asked to do.
#[derive(Default)]
pub struct RecordingHost {
    pub handlers: IndexMap<String, HandlerBlock>,
    pub nodes: IndexMap<String, Environment>,
    pub requests: RefCell<Vec<Request>>,
    pub logs: RefCell<Vec<String>>,
    pub errors: RefCell<Vec<ErrorValue>>,
    pub unhandled: RefCell<Vec<String>>,
    pub invalidated: RefCell<Vec<Option<String>>>,
    pub markup: RefCell<Vec<String>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(mut self, callpath: &str, block: HandlerBlock) -> Self {
        self.handlers.insert(callpath.to_string(), block);
        self
    }

    pub fn node(mut self, id: &str, env: Environment) -> Self {
        self.nodes.insert(id.to_string(), env);
        self
    }
}

#[async_trait(?Send)]
impl Host for RecordingHost {
    async fn dispatch(&self, request: Request) -> Result<Option<HandlerBlock>, EvalError> {
        let found = self.handlers.get(&request.target()).cloned();
        self.requests.borrow_mut().push(request);
        // Give other chains a turn, as a real transport would.
        tokio::task::yield_now().await;
        Ok(found)
    }

    fn invalidate(&self, pattern: Option<&Regex>) {
        self.invalidated
            .borrow_mut()
            .push(pattern.map(|re| re.as_str().to_string()));
    }

    fn unhandled_event(&self, event: &EventInfo) {
        self.unhandled.borrow_mut().push(event.event.clone());
    }

    fn unhandled_error(&self, error: &ErrorValue) {
        self.errors.borrow_mut().push(error.clone());
    }

    fn node_env(&self, node_id: &str) -> Option<Environment> {
        self.nodes.get(node_id).cloned()
    }

    fn log(&self, line: &str) {
        self.logs.borrow_mut().push(line.to_string());
    }

    fn install_markup(&self, html: &str) {
        self.markup.borrow_mut().push(html.to_string());
    }
}

/// Interpreter plus a handle on its recording host.
pub fn interpreter(host: RecordingHost) -> (Interpreter, Rc<RecordingHost>) {
    let host = Rc::new(host);
    (Interpreter::new(host.clone()), host)
}
