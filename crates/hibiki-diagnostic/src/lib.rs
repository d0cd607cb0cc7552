//! Diagnostics and runtime call context for Hibiki.
//! Hibiki 的诊断与运行时调用上下文。
//!
//! Runtime failures that are degraded to `null` are reported here through
//! `tracing`, so the host decides where they end up.
//! 被降级为 `null` 的运行时错误通过 `tracing` 在此报告。

mod codes;
mod context;
mod diagnostic;

pub use codes::ErrorCode;
pub use context::{ContextFrame, RuntimeContext};
pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};

/// Emit a diagnostic as a structured log event.
/// 将诊断信息作为结构化日志事件输出。
pub fn emit(diagnostic: &Diagnostic) {
    let code = diagnostic.code.map(|c| c.as_str()).unwrap_or("-");
    let kind = diagnostic.kind.as_str();
    let notes = diagnostic.notes.join("; ");
    let help = diagnostic.help.as_deref().unwrap_or("");
    match diagnostic.severity {
        Severity::Error => {
            tracing::error!(code, kind, notes = %notes, help, "{}", diagnostic.message)
        }
        Severity::Warning => {
            tracing::warn!(code, kind, notes = %notes, help, "{}", diagnostic.message)
        }
        Severity::Note => {
            tracing::info!(code, kind, notes = %notes, help, "{}", diagnostic.message)
        }
    }
}
