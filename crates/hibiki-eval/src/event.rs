//! Event dispatch with two-stage error recovery.

use std::rc::Rc;

use hibiki_diagnostic::ContextFrame;
use indexmap::IndexMap;
use tracing::debug;

use crate::action::{Chain, Interpreter, LocalBoxFuture};
use crate::{ChildEnvOptions, Environment, ErrorValue, EvalError, Value};

/// Name of the synthetic event raised when a handler fails.
pub const ERROR_EVENT: &str = "error";

/// A fired event.
#[derive(Debug, Clone, Default)]
pub struct EventInfo {
    pub event: String,
    pub bubble: bool,
    pub data: IndexMap<String, Value>,
    /// `@`-prefixed keys stripped from the data, without the `@`.
    pub meta: IndexMap<String, Value>,
    /// Target node from `@nodeid`.
    pub node_id: Option<String>,
}

impl EventInfo {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Default::default()
        }
    }

    pub fn bubbling(mut self) -> Self {
        self.bubble = true;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Split an evaluated data value into event data and `@` meta keys.
    /// A non-object value is stored under `value`.
    pub fn from_data(event: impl Into<String>, bubble: bool, data: &Value) -> Self {
        let mut info = EventInfo::new(event);
        info.bubble = bubble;
        match data {
            Value::Object(fields) => {
                for (key, value) in fields.borrow().iter() {
                    match key.strip_prefix('@') {
                        Some(meta) => {
                            info.meta.insert(meta.to_string(), value.clone());
                        }
                        None => {
                            info.data.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            Value::Null | Value::NoAttr => {}
            other => {
                info.data.insert("value".to_string(), other.clone());
            }
        }
        info.node_id = info
            .meta
            .get("nodeid")
            .filter(|v| !v.is_nullish())
            .map(Value::to_display_string);
        info
    }

    /// Event data as a fresh object value.
    pub fn data_value(&self) -> Value {
        Value::object(self.data.clone())
    }
}

impl Interpreter {
    /// Fire an event from `env` as a new handler chain.
    ///
    /// Only runtime-limit errors are returned; every other failure goes
    /// through the `error` handler or the host's unhandled-error sink.
    pub async fn dispatch_event(&self, event: &EventInfo, env: &Environment) -> Result<(), EvalError> {
        let chain = Chain::default();
        self.dispatch_in(&chain, event, env).await
    }

    /// Fire an event inside a running chain.
    pub(crate) async fn dispatch_in(&self, chain: &Chain, event: &EventInfo, env: &Environment) -> Result<(), EvalError> {
        self.dispatch_inner(chain, event, env, false).await
    }

    fn dispatch_inner<'a>(
        &'a self,
        chain: &'a Chain,
        event: &'a EventInfo,
        env: &'a Environment,
        suppress: bool,
    ) -> LocalBoxFuture<'a, Result<(), EvalError>> {
        Box::pin(async move {
            let start = match &event.node_id {
                Some(id) => match self.host().node_env(id) {
                    Some(node_env) => node_env,
                    None => {
                        debug!(node = %id, event = %event.event, "no environment for target node");
                        return self.not_found(event);
                    }
                },
                None => env.clone(),
            };
            let Some((block, owner)) = start.lookup_handler(&event.event) else {
                return self.not_found(event);
            };

            let child = owner.make_child(
                ChildEnvOptions::new(format!("event {}", event.event)).with_data(event.data_value()),
            );
            let mark = chain.push_frame(ContextFrame::new(format!("fire {}", event.event)));
            let result = self.execute_handler(chain, &block, &child, &event.event, false).await;
            chain.revert_to(mark);

            let err = match result {
                Ok(_) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => e,
            };
            let error = Rc::new(error_value(chain, err));
            let has_error_handler = start.lookup_handler(ERROR_EVENT).is_some();
            if suppress || event.event == ERROR_EVENT || !has_error_handler {
                self.host().unhandled_error(&error);
                return Ok(());
            }
            let synthetic = EventInfo::new(ERROR_EVENT)
                .with_data("error", Value::Error(error))
                .with_data("eventname", Value::string(event.event.as_str()));
            self.dispatch_inner(chain, &synthetic, &start, true).await
        })
    }

    fn not_found(&self, event: &EventInfo) -> Result<(), EvalError> {
        if event.bubble {
            self.host().unhandled_event(event);
        }
        Ok(())
    }
}

/// Convert a handler failure into an error value carrying the context
/// captured at the failing action.
fn error_value(chain: &Chain, err: EvalError) -> ErrorValue {
    let captured = chain.take_failure();
    match err {
        EvalError::Thrown(error) => (*error).clone(),
        other => {
            let context = captured.unwrap_or_else(|| chain.snapshot());
            ErrorValue::new(other.to_string()).with_context(context)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_data_strips_meta() {
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), Value::Number(1.0));
        fields.insert("@nodeid".to_string(), Value::string("n1"));
        fields.insert("@other".to_string(), Value::Bool(true));
        let info = EventInfo::from_data("click", true, &Value::object(fields));
        assert_eq!(info.data.len(), 1);
        assert_eq!(info.meta.len(), 2);
        assert_eq!(info.node_id.as_deref(), Some("n1"));
        assert!(info.bubble);
    }

    #[test]
    fn test_from_data_non_object() {
        let info = EventInfo::from_data("x", false, &Value::Number(3.0));
        assert_eq!(info.data.get("value").map(Value::to_number), Some(3.0));
        assert!(EventInfo::from_data("x", false, &Value::Null).data.is_empty());
    }
}
