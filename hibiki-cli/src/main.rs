//! Hibiki CLI - run compiled expressions, paths and handlers against a JSON store.
//! Hibiki CLI - 针对 JSON 数据存储运行编译后的表达式、路径与处理器。

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Main CLI structure.
/// 主 CLI 结构体。
#[derive(Parser)]
#[command(name = "hibiki")]
#[command(author, version, about = "Hibiki - evaluate compiled template expressions and actions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output. / 启用详细输出。
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress output. / 抑制输出。
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Inputs shared by every command.
/// 所有命令共享的输入。
#[derive(Args, Debug, Clone, Default)]
pub struct Inputs {
    /// Initial global data (JSON). / 初始全局数据（JSON）。
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Interpreter limits (JSON). / 解释器限制（JSON）。
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Available CLI commands.
/// 可用的 CLI 命令。
#[derive(Subcommand)]
enum Commands {
    /// Evaluate a compiled expression. / 求值编译后的表达式。
    Eval {
        /// Expression AST as JSON. / JSON 格式的表达式 AST。
        file: PathBuf,

        #[command(flatten)]
        inputs: Inputs,
    },

    /// Resolve a string path, optionally writing to it first. / 解析字符串路径。
    Path {
        /// The path, e.g. `$.items[0].name`. / 路径。
        path: String,

        /// JSON value to assign before reading. / 读取前赋的 JSON 值。
        #[arg(long)]
        set: Option<String>,

        #[command(flatten)]
        inputs: Inputs,
    },

    /// Run a handler block. / 运行处理器块。
    Run {
        /// Handler block as JSON. / JSON 格式的处理器块。
        file: PathBuf,

        /// Callpath to handler block map (JSON). / 调用路径到处理器块的映射。
        #[arg(long)]
        handlers: Option<PathBuf>,

        /// Install the block as this event's handler and fire it. / 作为事件处理器安装并触发。
        #[arg(long)]
        event: Option<String>,

        #[command(flatten)]
        inputs: Inputs,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Main entry point.
/// 主入口点。
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Eval { file, inputs } => commands::eval::run(&file, &inputs, cli.verbose),
        Commands::Path { path, set, inputs } => commands::path::run(&path, set.as_deref(), &inputs),
        Commands::Run {
            file,
            handlers,
            event,
            inputs,
        } => commands::run::run(&file, handlers.as_deref(), event.as_deref(), &inputs).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            output::error(&e);
        }
        std::process::exit(1);
    }
}
