//! Compiled actions and handler blocks.
//! 编译后的动作与处理器块。

use serde::{Deserialize, Serialize};

use crate::{Expr, Path};

/// Assignment operation used by `set-data`.
/// `set-data` 使用的赋值操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SetOp {
    #[default]
    Set,
    SetRaw,
    SetUnless,
    Append,
    AppendArray,
    BlobExtend,
}

impl SetOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetOp::Set => "set",
            SetOp::SetRaw => "set-raw",
            SetOp::SetUnless => "set-unless",
            SetOp::Append => "append",
            SetOp::AppendArray => "append-array",
            SetOp::BlobExtend => "blob-extend",
        }
    }
}

/// A single compiled instruction.
/// 单条编译后的指令。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "actiontype", rename_all = "kebab-case")]
pub enum Action {
    /// Assign `data` to `target` / 赋值
    SetData {
        #[serde(default)]
        setop: SetOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Path>,
        data: Expr,
    },

    /// Conditional sub-blocks / 条件子块
    IfBlock {
        cond: Expr,
        #[serde(rename = "then", default)]
        then_block: HandlerBlock,
        #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
        else_block: Option<HandlerBlock>,
    },

    /// Set the block's return value / 设置块返回值
    SetReturn { data: Expr },

    /// Ask the host for a handler and run it / 调用处理器
    CallHandler {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Path>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callpath: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Expr>,
        #[serde(default)]
        pure: bool,
    },

    /// Invalidate cached queries / 使缓存查询失效
    Invalidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<Expr>,
    },

    /// Fire an event / 触发事件
    FireEvent {
        event: String,
        #[serde(default)]
        bubble: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Expr>,
    },

    /// Log values / 输出日志
    Log {
        #[serde(default)]
        exprs: Vec<Expr>,
        #[serde(default)]
        debug: bool,
    },

    /// Raise an error / 抛出错误
    Throw { data: Expr },

    /// Do nothing / 空操作
    Nop,

    /// Hand markup to the host / 安装标记
    InstallMarkup { html: String },
}

impl Action {
    /// The kebab-case action name, used in context frames.
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetData { .. } => "set-data",
            Action::IfBlock { .. } => "if-block",
            Action::SetReturn { .. } => "set-return",
            Action::CallHandler { .. } => "call-handler",
            Action::Invalidate { .. } => "invalidate",
            Action::FireEvent { .. } => "fire-event",
            Action::Log { .. } => "log",
            Action::Throw { .. } => "throw",
            Action::Nop => "nop",
            Action::InstallMarkup { .. } => "install-markup",
        }
    }

    pub fn set(target: Path, data: Expr) -> Self {
        Action::SetData {
            setop: SetOp::Set,
            target: Some(target),
            data,
        }
    }

    pub fn set_op(setop: SetOp, target: Path, data: Expr) -> Self {
        Action::SetData {
            setop,
            target: Some(target),
            data,
        }
    }

    pub fn ret(data: Expr) -> Self {
        Action::SetReturn { data }
    }

    pub fn throw(data: Expr) -> Self {
        Action::Throw { data }
    }

    pub fn log(exprs: Vec<Expr>) -> Self {
        Action::Log {
            exprs,
            debug: false,
        }
    }

    pub fn fire(event: impl Into<String>, bubble: bool, data: Option<Expr>) -> Self {
        Action::FireEvent {
            event: event.into(),
            bubble,
            data,
        }
    }

    pub fn if_else(cond: Expr, then_block: HandlerBlock, else_block: Option<HandlerBlock>) -> Self {
        Action::IfBlock {
            cond,
            then_block,
            else_block,
        }
    }

    /// A `call-handler` addressed by callpath.
    pub fn call(callpath: impl Into<String>, data: Option<Expr>, target: Option<Path>) -> Self {
        Action::CallHandler {
            target,
            callpath: Some(Expr::lit(callpath.into())),
            url: None,
            method: None,
            module: None,
            data,
            pure: false,
        }
    }
}

/// A compiled sequence of actions.
/// 编译后的动作序列。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerBlock {
    pub actions: Vec<Action>,
}

impl HandlerBlock {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl From<Vec<Action>> for HandlerBlock {
    fn from(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}
