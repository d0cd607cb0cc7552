//! The `hibiki eval` command.

use std::path::Path;

use hibiki_diagnostic::DiagnosticKind;
use hibiki_eval::{EvalMode, eval_expr};
use hibiki_syntax::Expr;

use super::{build_env, describe_error, read_typed, render};
use crate::{Inputs, output};

pub fn run(file: &Path, inputs: &Inputs, verbose: bool) -> Result<(), String> {
    let expr: Expr = read_typed(file)?;
    if verbose {
        tracing::debug!(?expr, "parsed expression");
    }
    let (env, _store) = build_env(inputs)?;
    let value = eval_expr(&expr, &env, EvalMode::Resolve).map_err(|e| describe_error(DiagnosticKind::Eval, &e))?;
    output::result(&render(&value)?);
    Ok(())
}
