//! Compiled AST definitions for Hibiki.
//! Hibiki 的编译后 AST 定义。
//!
//! The surface-syntax compiler produces these trees once; the interpreter
//! evaluates them many times. Every type round-trips through JSON, which is
//! the interchange format between the two.
//! 表面语法编译器只生成一次这些树，解释器会反复求值它们。

mod action;
mod expr;
mod path;

pub use action::*;
pub use expr::*;
pub use path::*;
