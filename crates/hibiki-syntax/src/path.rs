//! Paths: structured addresses into the data store.
//! 路径：指向数据存储的结构化地址。
//!
//! A path is a root part followed by map, array, dynamic and dereference
//! parts. This module also owns the string form (`$.a.b[1]`) used for
//! dereference targets and for diagnostics.
//! 路径由一个根部分加上 map、array、dynamic 和 deref 部分组成。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Expr;

/// Errors produced while building or parsing a path.
/// 构建或解析路径时产生的错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("path must start with a root part")]
    MissingRoot,

    #[error("root part at level {0}; roots are only valid at level 0")]
    RootNotFirst(usize),

    #[error("unknown root '${0}'")]
    UnknownRoot(String),

    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected end of path")]
    UnexpectedEnd,

    #[error("invalid array index '{0}'")]
    InvalidIndex(String),

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("'^' is not allowed before the {0} root")]
    CaretNotAllowed(&'static str),
}

/// A path through nested containers.
/// 穿过嵌套容器的路径。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path {
    pub parts: Vec<PathPart>,
}

/// One step of a path.
/// 路径中的一步。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pathtype", rename_all = "kebab-case")]
pub enum PathPart {
    /// Named root, always at level 0 / 命名根，总是位于第 0 层
    Root {
        root: RootKind,
        #[serde(default, skip_serializing_if = "is_zero")]
        caret: usize,
    },
    /// `.key` / 映射键
    Map { key: String },
    /// `[index]` / 数组下标
    Array { index: i64 },
    /// `[expr]`, resolved at evaluation time / 运行时计算的键
    Dynamic { expr: Box<Expr> },
    /// `*expr`, the value is parsed as a path and spliced in / 解引用
    Deref { expr: Box<Expr> },
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Root names.
/// 根名称。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RootKind {
    Global,
    Data,
    State,
    Local,
    Context,
    CurrentContext,
    #[serde(alias = "c")]
    Component,
    Args,
    /// Inline pseudo-root whose value comes from an expression.
    /// 内联伪根，其值来自一个表达式。
    Literal(Box<Expr>),
}

impl RootKind {
    pub fn name(&self) -> &'static str {
        match self {
            RootKind::Global => "global",
            RootKind::Data => "data",
            RootKind::State => "state",
            RootKind::Local => "local",
            RootKind::Context => "context",
            RootKind::CurrentContext => "current-context",
            RootKind::Component => "component",
            RootKind::Args => "args",
            RootKind::Literal(_) => "literal",
        }
    }

    /// Whether a caret (ancestor depth) may prefix this root.
    pub fn allows_caret(&self) -> bool {
        matches!(
            self,
            RootKind::Local | RootKind::Context | RootKind::CurrentContext
        )
    }
}

impl Path {
    /// Build a path, checking that exactly the first part is a root.
    /// 构建路径，并检查只有第一个部分是根。
    pub fn new(parts: Vec<PathPart>) -> Result<Self, PathError> {
        let path = Path { parts };
        path.validate()?;
        Ok(path)
    }

    /// A path holding only the given root.
    pub fn root(root: RootKind) -> Self {
        Path {
            parts: vec![PathPart::Root { root, caret: 0 }],
        }
    }

    pub fn global() -> Self {
        Self::root(RootKind::Global)
    }

    /// A root with an ancestor depth.
    pub fn root_with_caret(root: RootKind, caret: usize) -> Self {
        Path {
            parts: vec![PathPart::Root { root, caret }],
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.parts.push(PathPart::Map { key: key.into() });
        self
    }

    pub fn index(mut self, index: i64) -> Self {
        self.parts.push(PathPart::Array { index });
        self
    }

    pub fn dynamic(mut self, expr: Expr) -> Self {
        self.parts.push(PathPart::Dynamic {
            expr: Box::new(expr),
        });
        self
    }

    pub fn deref(mut self, expr: Expr) -> Self {
        self.parts.push(PathPart::Deref {
            expr: Box::new(expr),
        });
        self
    }

    /// The root part and its caret, if the path is well formed.
    pub fn root_part(&self) -> Option<(&RootKind, usize)> {
        match self.parts.first() {
            Some(PathPart::Root { root, caret }) => Some((root, *caret)),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), PathError> {
        match self.parts.first() {
            None => return Err(PathError::Empty),
            Some(PathPart::Root { .. }) => {}
            Some(_) => return Err(PathError::MissingRoot),
        }
        for (level, part) in self.parts.iter().enumerate().skip(1) {
            if matches!(part, PathPart::Root { .. }) {
                return Err(PathError::RootNotFirst(level));
            }
        }
        Ok(())
    }

    /// True when no part needs evaluation.
    pub fn is_static(&self) -> bool {
        self.parts.iter().all(|p| {
            matches!(
                p,
                PathPart::Map { .. } | PathPart::Array { .. }
            ) || matches!(p, PathPart::Root { root, .. } if !matches!(root, RootKind::Literal(_)))
        })
    }
}

/// Parse a string path such as `$.a.b[1]`, `@index`, `.name` or `*$.ptr`.
/// 解析字符串路径。
pub fn parse_path(src: &str) -> Result<Path, PathError> {
    PathParser::new(src.trim()).parse()
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_path(s)
    }
}

struct PathParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> PathError {
        match self.peek() {
            Some(ch) => PathError::UnexpectedChar { ch, pos: self.pos },
            None => PathError::UnexpectedEnd,
        }
    }

    fn ident(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }

    fn parse(mut self) -> Result<Path, PathError> {
        if self.src.is_empty() {
            return Err(PathError::Empty);
        }

        // `*path` dereferences the value stored at `path`.
        if self.eat('*') {
            let inner = PathParser::new(&self.src[self.pos..]).parse()?;
            return Ok(Path::global().deref(Expr::Path { path: inner }));
        }

        let mut caret = 0;
        while self.eat('^') {
            caret += 1;
        }

        let mut parts = Vec::new();
        let root = match self.peek() {
            Some('$') => {
                self.bump();
                match self.ident() {
                    "" => RootKind::Global,
                    "data" => RootKind::Data,
                    "state" => RootKind::State,
                    "c" | "component" => RootKind::Component,
                    "args" => RootKind::Args,
                    "local" => RootKind::Local,
                    "context" => RootKind::Context,
                    "currentcontext" => RootKind::CurrentContext,
                    other => return Err(PathError::UnknownRoot(other.to_string())),
                }
            }
            Some('@') => {
                self.bump();
                RootKind::Context
            }
            Some('.') => {
                // `.` alone or before `[..]` is the bare local root; `.key`
                // is left for the part loop.
                if !self.peek_second().is_some_and(is_ident_char) {
                    self.bump();
                }
                RootKind::Local
            }
            _ => return Err(self.unexpected()),
        };
        if caret > 0 && !root.allows_caret() {
            return Err(PathError::CaretNotAllowed(root.name()));
        }
        let bare_context = root == RootKind::Context;
        parts.push(PathPart::Root { root, caret });

        // `@name` is shorthand for `@.name`.
        if bare_context && self.peek().is_some_and(is_ident_char) {
            let key = self.ident();
            parts.push(PathPart::Map {
                key: key.to_string(),
            });
        }

        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.bump();
                    let key = self.ident();
                    if key.is_empty() {
                        return Err(self.unexpected());
                    }
                    parts.push(PathPart::Map {
                        key: key.to_string(),
                    });
                }
                '[' => {
                    self.bump();
                    let part = match self.peek() {
                        Some(q @ ('"' | '\'')) => PathPart::Map {
                            key: self.quoted(q)?,
                        },
                        Some(d) if d.is_ascii_digit() || d == '-' => PathPart::Array {
                            index: self.integer()?,
                        },
                        _ => return Err(self.unexpected()),
                    };
                    if !self.eat(']') {
                        return Err(self.unexpected());
                    }
                    parts.push(part);
                }
                _ => return Err(self.unexpected()),
            }
        }

        Ok(Path { parts })
    }

    fn integer(&mut self) -> Result<i64, PathError> {
        let start = self.pos;
        self.eat('-');
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        text.parse::<i64>()
            .map_err(|_| PathError::InvalidIndex(text.to_string()))
    }

    fn quoted(&mut self, quote: char) -> Result<String, PathError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(PathError::UnterminatedString(start)),
                Some('\\') => match self.bump() {
                    None => return Err(PathError::UnterminatedString(start)),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => out.push(other),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `key` can be written as `.key`.
pub fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(is_ident_char),
        _ => false,
    }
}

/// Write a map key in StringPath form: `.key` or `["weird key"]`.
pub fn write_key(out: &mut impl fmt::Write, key: &str) -> fmt::Result {
    if is_plain_key(key) {
        write!(out, ".{key}")
    } else {
        let quoted = serde_json::to_string(key).map_err(|_| fmt::Error)?;
        write!(out, "[{quoted}]")
    }
}

/// Write a root in StringPath form. The bare local root renders as nothing
/// when a plain key follows it, so that `.name` round-trips.
pub fn write_root(
    out: &mut impl fmt::Write,
    root: &RootKind,
    caret: usize,
    next_is_plain_key: bool,
) -> fmt::Result {
    for _ in 0..caret {
        out.write_char('^')?;
    }
    match root {
        RootKind::Global => out.write_str("$"),
        RootKind::Data => out.write_str("$data"),
        RootKind::State => out.write_str("$state"),
        RootKind::Component => out.write_str("$c"),
        RootKind::Args => out.write_str("$args"),
        RootKind::Context => out.write_str("@"),
        RootKind::CurrentContext => out.write_str("$currentcontext"),
        RootKind::Local if next_is_plain_key => Ok(()),
        RootKind::Local => out.write_str("."),
        RootKind::Literal(_) => out.write_str("(literal)"),
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut start = 0;
        if let [
            PathPart::Root {
                root: RootKind::Global,
                caret: 0,
            },
            PathPart::Deref { expr },
            ..,
        ] = self.parts.as_slice()
        {
            if let Expr::Path { path } = expr.as_ref() {
                write!(f, "*{path}")?;
                start = 2;
            }
        }
        for (level, part) in self.parts.iter().enumerate().skip(start) {
            match part {
                PathPart::Root { root, caret } => {
                    let next_is_plain_key = matches!(
                        self.parts.get(level + 1),
                        Some(PathPart::Map { key }) if is_plain_key(key)
                    );
                    write_root(f, root, *caret, next_is_plain_key)?;
                }
                PathPart::Map { key } => write_key(f, key)?,
                PathPart::Array { index } => write!(f, "[{index}]")?,
                PathPart::Dynamic { .. } => f.write_str("[<dynamic>]")?,
                PathPart::Deref { .. } => f.write_str("[<deref>]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_global() {
        let path = parse_path("$.a.b[1]").unwrap();
        assert_eq!(path, Path::global().key("a").key("b").index(1));
    }

    #[test]
    fn test_parse_named_roots() {
        assert_eq!(parse_path("$state.x").unwrap(), Path::root(RootKind::State).key("x"));
        assert_eq!(parse_path("$c").unwrap(), Path::root(RootKind::Component));
        assert_eq!(parse_path("$args.name").unwrap(), Path::root(RootKind::Args).key("name"));
        assert_eq!(parse_path("$data").unwrap(), Path::root(RootKind::Data));
    }

    #[test]
    fn test_parse_context_shorthand() {
        let expected = Path::root(RootKind::Context).key("index");
        assert_eq!(parse_path("@index").unwrap(), expected);
        assert_eq!(parse_path("@.index").unwrap(), expected);
    }

    #[test]
    fn test_parse_local_and_caret() {
        assert_eq!(parse_path(".").unwrap(), Path::root(RootKind::Local));
        assert_eq!(parse_path(".name").unwrap(), Path::root(RootKind::Local).key("name"));
        assert_eq!(
            parse_path("^^.name").unwrap(),
            Path::root_with_caret(RootKind::Local, 2).key("name")
        );
        assert_eq!(parse_path(".[0]").unwrap(), Path::root(RootKind::Local).index(0));
    }

    #[test]
    fn test_parse_quoted_key() {
        let path = parse_path(r#"$["weird key"]['x\'y']"#).unwrap();
        assert_eq!(path, Path::global().key("weird key").key("x'y"));
    }

    #[test]
    fn test_parse_deref() {
        let path = parse_path("*$.ptr").unwrap();
        assert_eq!(
            path,
            Path::global().deref(Expr::path(Path::global().key("ptr")))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_path(""), Err(PathError::Empty));
        assert_eq!(parse_path("$nope"), Err(PathError::UnknownRoot("nope".into())));
        assert_eq!(parse_path("^$.x"), Err(PathError::CaretNotAllowed("global")));
        assert!(matches!(parse_path("$.a["), Err(PathError::UnexpectedEnd)));
        assert!(matches!(parse_path("$[\"abc"), Err(PathError::UnterminatedString(_))));
        assert!(matches!(parse_path("a.b"), Err(PathError::UnexpectedChar { ch: 'a', pos: 0 })));
    }

    #[test]
    fn test_render_round_trip() {
        for src in [
            "$.a.b[1]",
            "@.index",
            ".name",
            ".",
            "^.name",
            "$state.x[0]",
            "$c.count",
            "$args.value",
            r#"$["weird key"].x"#,
            "*$.ptr",
        ] {
            let path = parse_path(src).unwrap();
            assert_eq!(path.to_string(), src);
            assert_eq!(parse_path(&path.to_string()).unwrap(), path);
        }
    }

    #[test]
    fn test_validate_root_position() {
        let parts = vec![
            PathPart::Root {
                root: RootKind::Global,
                caret: 0,
            },
            PathPart::Root {
                root: RootKind::State,
                caret: 0,
            },
        ];
        assert_eq!(Path::new(parts), Err(PathError::RootNotFirst(1)));
        assert_eq!(
            Path::new(vec![PathPart::Map { key: "x".into() }]),
            Err(PathError::MissingRoot)
        );
    }

    #[test]
    fn test_json_form() {
        let path = Path::global().key("a").index(2);
        let json = serde_json::to_value(&path).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"pathtype": "root", "root": "global"},
                {"pathtype": "map", "key": "a"},
                {"pathtype": "array", "index": 2}
            ])
        );
        let back: Path = serde_json::from_value(json).unwrap();
        assert_eq!(back, path);
    }
}
