use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "scaffold",
    version,
    about = "Scaffold - change detection and undoable file operations for code generators",
    long_about = "Scaffold watches project paths for created, updated and deleted files by polling, and backs the file operations of a generation run with transactional undo."
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one full scan over monitoring requests
    #[command(about = "Register monitoring requests and run a full scan")]
    Scan(ScanArgs),

    /// Poll monitoring requests until interrupted
    #[command(about = "Watch monitoring requests and print changes until Ctrl-C")]
    Watch(WatchArgs),

    /// Search with an ant-style path pattern
    #[command(about = "List files matching an ant-style path pattern")]
    Find(FindArgs),

    /// Validate request encodings
    #[command(name = "encode-check", about = "Parse monitoring requests and print their canonical encoding")]
    EncodeCheck(EncodeCheckArgs),

    /// Initialize scaffold in the current directory
    #[command(about = "Write a default .scaffold/config.toml")]
    Init(InitArgs),
}

#[derive(Parser, Debug)]
pub struct ScanArgs {
    /// Requests as `<path>,<opcodes>[,**]`; defaults to the configured list
    pub requests: Vec<String>,

    /// Scan a second time to show that an unchanged tree publishes nothing
    #[arg(long)]
    pub twice: bool,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Requests as `<path>,<opcodes>[,**]`; defaults to the configured list
    pub requests: Vec<String>,

    /// Use the platform file watcher to speed up change detection
    #[arg(long)]
    pub native_hints: bool,

    /// Override the configured polling interval
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct FindArgs {
    /// Pattern such as `/project/src/*.rs`
    pub pattern: String,

    /// Print results as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct EncodeCheckArgs {
    /// Encoded requests to validate
    #[arg(required = true)]
    pub requests: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}
