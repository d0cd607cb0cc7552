//! Evaluation errors.

use std::rc::Rc;

use hibiki_diagnostic::{Diagnostic, DiagnosticKind, ErrorCode};
use hibiki_syntax::PathError;
use thiserror::Error;

use crate::ErrorValue;

/// Errors raised while resolving, evaluating or executing.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("malformed: {0}")]
    Construction(String),

    #[error("invalid path: {0}")]
    PathSyntax(#[from] PathError),

    #[error("cannot assign to {0}")]
    NotWritable(String),

    #[error("{0}")]
    Resolution(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{name}(): {message}")]
    Function { name: String, message: String },

    #[error("runtime limit exceeded: {0}")]
    RuntimeLimit(String),

    #[error("{}", .0.message)]
    Thrown(Rc<ErrorValue>),

    #[error("cycle detected at {trail}")]
    Cycle { trail: String },
}

impl EvalError {
    pub fn construction(message: impl Into<String>) -> Self {
        EvalError::Construction(message.into())
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        EvalError::Resolution(message.into())
    }

    pub fn limit(message: impl Into<String>) -> Self {
        EvalError::RuntimeLimit(message.into())
    }

    pub fn function(name: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::Function {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EvalError::Construction(_) => ErrorCode::MalformedPath,
            EvalError::PathSyntax(_) => ErrorCode::PathSyntax,
            EvalError::NotWritable(_) => ErrorCode::RootNotWritable,
            EvalError::Resolution(_) => ErrorCode::Resolution,
            EvalError::UnknownFunction(_) => ErrorCode::UnknownFunction,
            EvalError::Function { .. } => ErrorCode::FunctionFailed,
            EvalError::RuntimeLimit(_) => ErrorCode::RuntimeLimit,
            EvalError::Thrown(_) => ErrorCode::UserThrown,
            EvalError::Cycle { .. } => ErrorCode::Cycle,
        }
    }

    /// Runtime limits abort the whole handler chain and are never caught.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvalError::RuntimeLimit(_))
    }

    pub fn to_diagnostic(&self, kind: DiagnosticKind, context: &str) -> Diagnostic {
        Diagnostic::warning(kind, self.to_string())
            .with_code(self.code())
            .with_note(context.to_string())
    }
}
