use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cmd;

#[derive(Parser)]
#[command(name = "dexplorer")]
#[command(
    version,
    about = "Show the bytecode, DEX and native code a Kotlin snippet compiles to"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to explorer.toml. Defaults to ./.dexplorer/explorer.toml, then the user config dir
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a Kotlin file and disassemble it at every stage
    Run(RunArgs),
    /// List the pipeline stages with their status text and output channel
    Stages,
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Kotlin source file, or `-` to read stdin
    pub source: PathBuf,

    /// Shared workspace directory (overrides config and DEXPLORER_WORKSPACE)
    #[arg(long, conflicts_with = "isolated")]
    pub workspace: Option<PathBuf>,

    /// Run in a private temporary workspace that is removed afterwards
    #[arg(long)]
    pub isolated: bool,

    /// Write bytecode.txt, dex.txt and oat.txt here instead of printing them
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Write a JSON run report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Kill any stage that runs longer than this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default explorer.toml in ./.dexplorer
    Init,
}

fn init_tracing(cli: &Cli, log_dir: Option<&std::path::Path>) -> Result<Option<WorkerGuard>> {
    let default_level = if cli.verbose {
        "dexplorer=debug"
    } else {
        "dexplorer=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_writer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "dexplorer.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match (cli.log_format, file_writer) {
        (LogFormat::Text, None) => builder.with_writer(std::io::stderr).try_init(),
        (LogFormat::Json, None) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Text, Some(file)) => builder
            .with_ansi(false)
            .with_writer(std::io::stderr.and(file))
            .try_init(),
        (LogFormat::Json, Some(file)) => builder
            .json()
            .with_writer(std::io::stderr.and(file))
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The log directory comes from config, so peek at it before tracing starts.
    let log_dir = cmd::peek_log_dir(cli.config.as_deref());
    let _guard = init_tracing(&cli, log_dir.as_deref())?;

    match &cli.command {
        Commands::Run(args) => cmd::cmd_run(&cli, args).await?,
        Commands::Stages => cmd::cmd_stages(),
        Commands::Config { command } => cmd::cmd_config(cli.config.as_deref(), command.clone())?,
    }

    Ok(())
}
