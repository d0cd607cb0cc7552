//! Interpreter configuration.

use serde::Deserialize;

/// Default ceiling for LValue chains, also used where no environment is at hand.
pub const DEFAULT_MAX_LVALUE_DEPTH: usize = 5;

/// Limits applied while evaluating and executing handlers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Actions executed per handler chain.
    pub max_actions: usize,
    /// Nested handler invocations.
    pub max_stack_depth: usize,
    /// Largest array index a write may create.
    pub max_array_index: usize,
    /// Nested dereference parts.
    pub max_deref_depth: usize,
    /// Nested LValues followed on read or write.
    pub max_lvalue_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_actions: 1000,
            max_stack_depth: 30,
            max_array_index: 10_000,
            max_deref_depth: 5,
            max_lvalue_depth: DEFAULT_MAX_LVALUE_DEPTH,
        }
    }
}

impl InterpreterConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a possibly partial configuration from JSON.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn max_actions(mut self, n: usize) -> Self {
        self.max_actions = n;
        self
    }

    pub fn max_stack_depth(mut self, n: usize) -> Self {
        self.max_stack_depth = n;
        self
    }

    pub fn max_array_index(mut self, n: usize) -> Self {
        self.max_array_index = n;
        self
    }

    pub fn max_deref_depth(mut self, n: usize) -> Self {
        self.max_deref_depth = n;
        self
    }

    pub fn max_lvalue_depth(mut self, n: usize) -> Self {
        self.max_lvalue_depth = n;
        self
    }
}
