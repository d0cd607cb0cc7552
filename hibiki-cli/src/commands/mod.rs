//! CLI command implementations.

pub mod eval;
pub mod path;
pub mod run;

use std::fs;
use std::path::Path;
use std::rc::Rc;

use hibiki_diagnostic::{Diagnostic, DiagnosticKind};
use hibiki_eval::{Environment, EvalError, InterpreterConfig, JsonOptions, StoreCell, Value, to_json};

use crate::Inputs;

/// Read and parse a JSON file.
pub fn read_json(path: &Path) -> Result<serde_json::Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON in {}: {e}", path.display()))
}

/// Deserialize a typed document from a JSON file.
pub fn read_typed<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let json = read_json(path)?;
    serde_json::from_value(json).map_err(|e| format!("{}: {e}", path.display()))
}

/// Root environment over the `--data` store, with limits from `--config`.
pub fn build_env(inputs: &Inputs) -> Result<(Environment, Rc<StoreCell>), String> {
    let data = match &inputs.data {
        Some(path) => Value::from_json(&read_json(path)?),
        None => Value::empty_object(),
    };
    let config = match &inputs.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            InterpreterConfig::from_json_str(&text).map_err(|e| format!("invalid config {}: {e}", path.display()))?
        }
        None => InterpreterConfig::default(),
    };
    let store = Rc::new(StoreCell::new(data));
    let env = Environment::builder()
        .global_cell(store.clone())
        .config(config)
        .description("cli")
        .build();
    Ok((env, store))
}

/// Pretty JSON rendering of a value.
pub fn render(value: &Value) -> Result<String, String> {
    to_json(value, JsonOptions::pretty()).map_err(|e| e.to_string())
}

/// One-line report of an evaluation failure, e.g. `error[H0100] eval: ...`.
pub fn describe_error(kind: DiagnosticKind, err: &EvalError) -> String {
    Diagnostic::error(kind, err.to_string()).with_code(err.code()).headline()
}
