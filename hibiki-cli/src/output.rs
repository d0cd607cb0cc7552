//! Terminal output helpers.
//! 终端输出工具。
//!
//! Results go to stdout uncolored so they can be piped; messages go to
//! stderr with a colored prefix.
//! 结果输出到 stdout 以便管道处理；消息带彩色前缀输出到 stderr。

/// Print a result line. / 打印结果。
pub fn result(text: &str) {
    println!("{text}");
}

/// Print a line written by a `log` action. / 打印 `log` 动作的输出。
pub fn log(line: &str) {
    eprintln!("\x1b[34mlog:\x1b[0m {line}");
}

/// Print a warning message in yellow.
/// 以黄色打印警告消息。
pub fn warning(msg: &str) {
    eprintln!("\x1b[33mwarning:\x1b[0m {msg}");
}

/// Print an error message in red.
/// 以红色打印错误消息。
pub fn error(msg: &str) {
    eprintln!("\x1b[31merror:\x1b[0m {msg}");
}
