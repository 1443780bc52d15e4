mod cli;
mod coordinator;
mod shell;
mod storage;

use clap::Parser;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();
    let result = match cli.command {
        cli::Commands::Coordinator(cmd) => coordinator::run(cmd).await,
        cli::Commands::Storage(cmd) => storage::run(cmd).await,
        cli::Commands::Shell(cmd) => shell::run(cmd).await,
    };
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
