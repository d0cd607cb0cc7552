//! Expression AST nodes.
//! 表达式 AST 节点。

use serde::{Deserialize, Serialize};

use crate::Path;

/// An expression.
/// 表达式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "etype", rename_all = "kebab-case")]
pub enum Expr {
    /// Literal value / 字面量
    Literal { value: serde_json::Value },

    /// Path reference `$.a.b[1]` / 路径引用
    Path { path: Path },

    /// Array construction `[a, b]` / 数组构造
    Array { exprs: Vec<Expr> },

    /// Map construction `{k: v}` / 映射构造
    Map { entries: Vec<MapEntry> },

    /// Inclusive range `[a:b]` / 闭区间
    ArrayRange { start: Box<Expr>, end: Box<Expr> },

    /// Operator application; arity depends on the operator / 运算符
    Op { op: Op, exprs: Vec<Expr> },

    /// Conditional `c ? a : b` / 条件表达式
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// Function call `fn:name(a, b)` / 函数调用
    FnCall { name: String, exprs: Vec<Expr> },

    /// Pipe filter `expr | format("%d")` / 管道过滤器
    Filter {
        filter: String,
        expr: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Box<Expr>>,
    },

    /// Bound reference `ref($.x)` / 绑定引用
    Ref { path: Path },

    /// `isref(expr)` / 引用判断
    IsRef { expr: Box<Expr> },

    /// `refinfo(expr)` / 引用信息
    RefInfo { expr: Box<Expr> },

    /// Lambda invocation `invoke(f, params)` / Lambda 调用
    Invoke {
        func: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Box<Expr>>,
    },

    /// Lambda `lambda(expr)` / Lambda 表达式
    Lambda { expr: Box<Expr> },
}

/// A key/value pair in a map construction.
/// 映射构造中的键值对。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
}

/// Operators.
/// 运算符。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    // Arithmetic 算术运算
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,

    // Comparison 比较运算
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,

    // Logical 逻辑运算
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
    #[serde(rename = "??")]
    Coalesce,

    // Unary 一元运算
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "neg")]
    Neg,
}

impl Op {
    /// The operator's surface symbol.
    /// 运算符的表面符号。
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::And => "&&",
            Op::Or => "||",
            Op::Coalesce => "??",
            Op::Not => "!",
            Op::Neg => "-",
        }
    }
}

impl Expr {
    /// Literal from anything convertible to JSON.
    pub fn lit(value: impl Into<serde_json::Value>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    pub fn null() -> Self {
        Expr::Literal {
            value: serde_json::Value::Null,
        }
    }

    pub fn path(path: Path) -> Self {
        Expr::Path { path }
    }

    pub fn op(op: Op, exprs: Vec<Expr>) -> Self {
        Expr::Op { op, exprs }
    }

    pub fn binary(op: Op, left: Expr, right: Expr) -> Self {
        Expr::Op {
            op,
            exprs: vec![left, right],
        }
    }

    pub fn call(name: impl Into<String>, exprs: Vec<Expr>) -> Self {
        Expr::FnCall {
            name: name.into(),
            exprs,
        }
    }

    pub fn map(entries: Vec<(Expr, Expr)>) -> Self {
        Expr::Map {
            entries: entries
                .into_iter()
                .map(|(key, value)| MapEntry { key, value })
                .collect(),
        }
    }
}
