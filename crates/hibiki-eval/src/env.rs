//! Evaluation environment and observable store cells.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use hibiki_syntax::HandlerBlock;
use indexmap::IndexMap;

use crate::{EvalError, FunctionRegistry, InterpreterConfig, ObjectRef, Root, Value};

/// A reactive slot holding one store root.
///
/// The interpreter only reads, replaces, and notifies; what a notification
/// triggers is up to the host.
pub trait ObservableCell {
    fn get(&self) -> Value;
    fn set(&self, value: Value);
    /// Signal an in-place mutation of the current value.
    fn notify(&self);
}

/// Callback registered on a [`StoreCell`].
pub type Subscriber = Rc<dyn Fn(&Value)>;

/// Default cell: a value plus subscribers called on every change.
pub struct StoreCell {
    value: RefCell<Value>,
    subscribers: RefCell<Vec<(usize, Subscriber)>>,
    next_id: Cell<usize>,
    version: Cell<u64>,
}

impl StoreCell {
    pub fn new(value: Value) -> Self {
        Self {
            value: RefCell::new(value),
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            version: Cell::new(0),
        }
    }

    pub fn subscribe(&self, f: impl Fn(&Value) + 'static) -> usize {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(f)));
        id
    }

    pub fn unsubscribe(&self, id: usize) -> bool {
        let mut subs = self.subscribers.borrow_mut();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    /// Number of changes seen so far.
    pub fn version(&self) -> u64 {
        self.version.get()
    }
}

impl ObservableCell for StoreCell {
    fn get(&self) -> Value {
        self.value.borrow().clone()
    }

    fn set(&self, value: Value) {
        *self.value.borrow_mut() = value;
        self.notify();
    }

    fn notify(&self) {
        self.version.set(self.version.get() + 1);
        let subs: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        let value = self.get();
        for f in subs {
            f(&value);
        }
    }
}

/// State shared by every environment of one host.
struct Shared {
    global: Rc<dyn ObservableCell>,
    state: Rc<dyn ObservableCell>,
    functions: FunctionRegistry,
    config: InterpreterConfig,
}

struct EnvFrame {
    parent: Option<Environment>,
    data: Value,
    context: ObjectRef,
    component: Option<Rc<dyn ObservableCell>>,
    args: Option<Value>,
    handlers: RefCell<IndexMap<String, Rc<HandlerBlock>>>,
    handler_boundary: bool,
    description: String,
    lib_context: String,
    shared: Rc<Shared>,
}

/// An evaluation environment. Cloning is cheap and shares the frame.
#[derive(Clone)]
pub struct Environment(Rc<EnvFrame>);

/// Options for [`Environment::make_child`]. Unset fields inherit from the parent.
#[derive(Default)]
pub struct ChildEnvOptions {
    pub data: Option<Value>,
    pub context: Option<IndexMap<String, Value>>,
    pub component: Option<Rc<dyn ObservableCell>>,
    pub args: Option<Value>,
    pub lib_context: Option<String>,
    pub handlers: IndexMap<String, HandlerBlock>,
    pub handler_boundary: bool,
    pub description: String,
}

impl ChildEnvOptions {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// Local data is `data`; context variables are its entries when it is an object.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(fields) = &data {
            self.context = Some(fields.borrow().clone());
        }
        self.data = Some(data);
        self
    }
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// A root environment over the given global data, with default settings.
    pub fn new(global: Value) -> Self {
        Self::builder().global(global).build()
    }

    pub fn make_child(&self, opts: ChildEnvOptions) -> Environment {
        let frame = &self.0;
        let handlers = opts
            .handlers
            .into_iter()
            .map(|(name, block)| (name, Rc::new(block)))
            .collect();
        Environment(Rc::new(EnvFrame {
            parent: Some(self.clone()),
            data: opts.data.unwrap_or_else(|| frame.data.clone()),
            context: Rc::new(RefCell::new(opts.context.unwrap_or_default())),
            component: opts.component.or_else(|| frame.component.clone()),
            args: opts.args.or_else(|| frame.args.clone()),
            handlers: RefCell::new(handlers),
            handler_boundary: opts.handler_boundary,
            description: opts.description,
            lib_context: opts.lib_context.unwrap_or_else(|| frame.lib_context.clone()),
            shared: frame.shared.clone(),
        }))
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// The environment `caret` levels up.
    pub fn ancestor(&self, caret: usize) -> Result<Environment, EvalError> {
        let mut env = self;
        for _ in 0..caret {
            env = env.parent().ok_or_else(|| {
                EvalError::resolution(format!("'{}' reaches above the root environment", "^".repeat(caret)))
            })?;
        }
        Ok(env.clone())
    }

    pub fn data(&self) -> &Value {
        &self.0.data
    }

    pub fn args(&self) -> Option<&Value> {
        self.0.args.as_ref()
    }

    pub fn lib_context(&self) -> &str {
        &self.0.lib_context
    }

    pub fn description(&self) -> &str {
        &self.0.description
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.0.shared.config
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.0.shared.functions
    }

    pub fn global_cell(&self) -> Rc<dyn ObservableCell> {
        self.0.shared.global.clone()
    }

    pub fn state_cell(&self) -> Rc<dyn ObservableCell> {
        self.0.shared.state.clone()
    }

    pub fn component_cell(&self) -> Option<Rc<dyn ObservableCell>> {
        self.0.component.clone()
    }

    /// This frame's own context variables.
    pub(crate) fn context_ref(&self) -> ObjectRef {
        self.0.context.clone()
    }

    /// Current value of a named root.
    pub fn resolve_root(&self, root: &Root) -> Result<Value, EvalError> {
        match root {
            Root::Global => Ok(self.0.shared.global.get()),
            Root::State => Ok(self.0.shared.state.get()),
            Root::Local(caret) => Ok(self.ancestor(*caret)?.0.data.clone()),
            Root::Context(caret) => {
                // Outer frames first so that inner definitions win.
                let start = self.ancestor(*caret)?;
                let mut chain = vec![start.clone()];
                let mut env = start;
                while let Some(parent) = env.parent().cloned() {
                    chain.push(parent.clone());
                    env = parent;
                }
                let mut merged = IndexMap::new();
                for env in chain.iter().rev() {
                    for (k, v) in env.0.context.borrow().iter() {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                Ok(Value::object(merged))
            }
            Root::CurrentContext(caret) => Ok(Value::Object(self.ancestor(*caret)?.context_ref())),
            Root::Component => Ok(self
                .0
                .component
                .as_ref()
                .map(|cell| cell.get())
                .unwrap_or(Value::Null)),
            Root::Args => Ok(self.0.args.clone().unwrap_or(Value::Null)),
            Root::Value(v) => Ok(v.clone()),
        }
    }

    /// Look up a context variable, walking up from the frame `caret` levels up.
    pub fn context_var(&self, caret: usize, key: &str) -> Option<Value> {
        let mut env = self.ancestor(caret).ok()?;
        loop {
            if let Some(v) = env.0.context.borrow().get(key) {
                return Some(v.clone());
            }
            env = env.parent()?.clone();
        }
    }

    /// Assign a context variable in the frame that already defines it, else
    /// in the frame `caret` levels up.
    pub fn set_context_var(&self, caret: usize, key: &str, value: Value) -> Result<(), EvalError> {
        let start = self.ancestor(caret)?;
        let mut env = start.clone();
        loop {
            if env.0.context.borrow().contains_key(key) {
                break;
            }
            match env.parent().cloned() {
                Some(parent) => env = parent,
                None => {
                    env = start;
                    break;
                }
            }
        }
        env.0.context.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    pub fn define_handler(&self, name: impl Into<String>, block: HandlerBlock) {
        self.0.handlers.borrow_mut().insert(name.into(), Rc::new(block));
    }

    /// Find a handler by name together with the environment that owns it.
    /// The search stops after a frame that declares a handler boundary.
    pub fn lookup_handler(&self, name: &str) -> Option<(Rc<HandlerBlock>, Environment)> {
        let mut env = self.clone();
        loop {
            if let Some(block) = env.0.handlers.borrow().get(name) {
                return Some((block.clone(), env.clone()));
            }
            if env.0.handler_boundary {
                return None;
            }
            env = env.parent()?.clone();
        }
    }

    /// Descriptions of this frame and its ancestors.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        let mut env = Some(self);
        while let Some(e) = env {
            let desc = if e.0.description.is_empty() { "<env>" } else { e.0.description.as_str() };
            parts.push(desc.to_string());
            env = e.parent();
        }
        parts.join(" < ")
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("description", &self.0.description)
            .field("lib_context", &self.0.lib_context)
            .finish()
    }
}

/// Builder for a root [`Environment`].
#[derive(Default)]
pub struct EnvironmentBuilder {
    global: Option<Rc<dyn ObservableCell>>,
    state: Option<Rc<dyn ObservableCell>>,
    component: Option<Rc<dyn ObservableCell>>,
    args: Option<Value>,
    data: Option<Value>,
    context: IndexMap<String, Value>,
    functions: Option<FunctionRegistry>,
    config: InterpreterConfig,
    lib_context: String,
    description: String,
}

impl EnvironmentBuilder {
    pub fn global(self, value: Value) -> Self {
        self.global_cell(Rc::new(StoreCell::new(value)))
    }

    pub fn global_cell(mut self, cell: Rc<dyn ObservableCell>) -> Self {
        self.global = Some(cell);
        self
    }

    pub fn state(self, value: Value) -> Self {
        self.state_cell(Rc::new(StoreCell::new(value)))
    }

    pub fn state_cell(mut self, cell: Rc<dyn ObservableCell>) -> Self {
        self.state = Some(cell);
        self
    }

    pub fn component(self, value: Value) -> Self {
        self.component_cell(Rc::new(StoreCell::new(value)))
    }

    pub fn component_cell(mut self, cell: Rc<dyn ObservableCell>) -> Self {
        self.component = Some(cell);
        self
    }

    pub fn args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }

    /// Local data; defaults to the global value.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn context_var(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn lib_context(mut self, lib_context: impl Into<String>) -> Self {
        self.lib_context = lib_context.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn build(self) -> Environment {
        let global = self
            .global
            .unwrap_or_else(|| Rc::new(StoreCell::new(Value::empty_object())));
        let state = self
            .state
            .unwrap_or_else(|| Rc::new(StoreCell::new(Value::empty_object())));
        let data = self.data.unwrap_or_else(|| global.get());
        let description = if self.description.is_empty() {
            "root".to_string()
        } else {
            self.description
        };
        Environment(Rc::new(EnvFrame {
            parent: None,
            data,
            context: Rc::new(RefCell::new(self.context)),
            component: self.component,
            args: self.args,
            handlers: RefCell::new(IndexMap::new()),
            handler_boundary: false,
            description,
            lib_context: self.lib_context,
            shared: Rc::new(Shared {
                global,
                state,
                functions: self.functions.unwrap_or_else(FunctionRegistry::with_builtins),
                config: self.config,
            }),
        }))
    }
}
