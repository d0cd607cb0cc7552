//! Runtime call-context stack.
//! 运行时调用上下文栈。
//!
//! The action interpreter pushes a frame per handler invocation and per
//! action. The stack is rendered into error values and debug logs, and it
//! carries the action counter used to stop runaway handler chains.
//! 动作解释器为每次处理器调用和每个动作压入一帧。

use std::fmt;

/// One entry of the call-context stack.
/// 调用上下文栈中的一项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFrame {
    pub description: String,
    pub handler: Option<String>,
}

impl ContextFrame {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            handler: None,
        }
    }

    pub fn handler(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            handler: Some(name.into()),
        }
    }
}

impl fmt::Display for ContextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.handler {
            Some(name) => write!(f, "{} [{}]", self.description, name),
            None => f.write_str(&self.description),
        }
    }
}

/// Call-context stack plus the per-chain action counter.
/// 调用上下文栈以及每条调用链的动作计数。
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    frames: Vec<ContextFrame>,
    action_count: usize,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, description: impl Into<String>) {
        self.frames.push(ContextFrame::new(description));
    }

    pub fn push_frame(&mut self, frame: ContextFrame) {
        self.frames.push(frame);
    }

    /// Replace the description of the innermost frame, keeping its handler.
    /// Pushes a new frame when the stack is empty.
    pub fn replace(&mut self, description: impl Into<String>) {
        match self.frames.last_mut() {
            Some(top) => top.description = description.into(),
            None => self.push(description),
        }
    }

    pub fn pop(&mut self) -> Option<ContextFrame> {
        self.frames.pop()
    }

    /// Current depth, to be passed back to [`RuntimeContext::revert_to`].
    pub fn mark(&self) -> usize {
        self.frames.len()
    }

    pub fn revert_to(&mut self, mark: usize) {
        self.frames.truncate(mark);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[ContextFrame] {
        &self.frames
    }

    /// Number of frames opened by a handler invocation.
    pub fn handler_depth(&self) -> usize {
        self.frames.iter().filter(|f| f.handler.is_some()).count()
    }

    /// Count one executed action and return the new total.
    pub fn count_action(&mut self) -> usize {
        self.action_count += 1;
        self.action_count
    }

    pub fn action_count(&self) -> usize {
        self.action_count
    }

    /// Rendered frames, innermost first.
    pub fn snapshot(&self) -> Vec<String> {
        self.frames.iter().rev().map(ToString::to_string).collect()
    }

    pub fn render(&self) -> String {
        self.snapshot().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_pop_render() {
        let mut ctx = RuntimeContext::new();
        ctx.push_frame(ContextFrame::handler("click", "event click"));
        ctx.push("set-data $.x");
        assert_eq!(ctx.depth(), 2);
        assert_eq!(ctx.render(), "set-data $.x\nevent click [click]");
        assert_eq!(ctx.pop(), Some(ContextFrame::new("set-data $.x")));
        assert_eq!(ctx.snapshot(), vec!["event click [click]".to_string()]);
    }

    #[test]
    fn test_replace_keeps_handler() {
        let mut ctx = RuntimeContext::new();
        ctx.replace("first");
        assert_eq!(ctx.depth(), 1);
        ctx.push_frame(ContextFrame::handler("h", "a"));
        ctx.replace("b");
        assert_eq!(ctx.frames()[1], ContextFrame::handler("h", "b"));
    }

    #[test]
    fn test_mark_and_revert() {
        let mut ctx = RuntimeContext::new();
        ctx.push("outer");
        let mark = ctx.mark();
        ctx.push("a");
        ctx.push("b");
        ctx.revert_to(mark);
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.render(), "outer");
    }

    #[test]
    fn test_handler_depth_counts_handler_frames() {
        let mut ctx = RuntimeContext::new();
        ctx.push_frame(ContextFrame::handler("a", "event a"));
        ctx.push("nop");
        ctx.push_frame(ContextFrame::handler("b", "call b"));
        assert_eq!(ctx.depth(), 3);
        assert_eq!(ctx.handler_depth(), 2);
    }

    #[test]
    fn test_action_counter() {
        let mut ctx = RuntimeContext::new();
        assert_eq!(ctx.count_action(), 1);
        assert_eq!(ctx.count_action(), 2);
        assert_eq!(ctx.action_count(), 2);
    }
}
