use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Runs the coordinator (the metadata server).
    Coordinator(CoordinatorCmd),
    /// Runs a storage node.
    Storage(StorageCmd),
    /// Starts an interactive client shell.
    Shell(ShellCmd),
}

#[derive(Args)]
pub struct CoordinatorCmd {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Catalog database location.
    #[arg(long, default_value = "data/coordinator.db")]
    pub db: PathBuf,

    /// Seconds without a heartbeat before a storage node counts as dead.
    #[arg(long, default_value_t = 15)]
    pub liveness_timeout: u64,
}

#[derive(Args)]
pub struct StorageCmd {
    /// Coordinator to register with.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub coordinator: String,

    /// Address to serve content on (port 0 picks one).
    #[arg(long, default_value = "127.0.0.1:0")]
    pub bind: String,

    /// Data directory for file contents, undo state, and checkpoints.
    #[arg(long, default_value = "data/storage")]
    pub data_dir: PathBuf,

    /// Heartbeat cadence in seconds.
    #[arg(long, default_value_t = 5)]
    pub heartbeat: u64,
}

#[derive(Args)]
pub struct ShellCmd {
    /// Coordinator to connect to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub coordinator: String,

    /// User name to register as.
    #[arg(short, long)]
    pub username: String,
}
