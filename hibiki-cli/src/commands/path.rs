//! The `hibiki path` command.

use hibiki_diagnostic::DiagnosticKind;
use hibiki_eval::{ObservableCell, Value, WriteOptions, resolve_str_throw, write_str_throw};
use hibiki_syntax::{SetOp, parse_path};

use super::{build_env, describe_error, render};
use crate::{Inputs, output};

pub fn run(path: &str, set: Option<&str>, inputs: &Inputs) -> Result<(), String> {
    let parsed = parse_path(path).map_err(|e| format!("invalid path '{path}': {e}"))?;
    tracing::debug!(path = %parsed, "parsed path");
    let (env, store) = build_env(inputs)?;

    if let Some(json) = set {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| format!("invalid --set value: {e}"))?;
        write_str_throw(path, &env, SetOp::Set, Value::from_json(&value), WriteOptions::privileged())
            .map_err(|e| describe_error(DiagnosticKind::Path, &e))?;
        output::result(&render(&store.get())?);
        return Ok(());
    }

    let value = resolve_str_throw(path, &env).map_err(|e| describe_error(DiagnosticKind::Path, &e))?;
    if matches!(value, Value::NoAttr) {
        output::warning(&format!("{path} is not set"));
    }
    output::result(&render(&value)?);
    Ok(())
}
