use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod error;
mod output;
mod telemetry;

use bw_core::Config;
use commands::events::EventsArgs;
use commands::git::GitCommand;
use commands::replay::ReplayArgs;

#[derive(Parser)]
#[command(name = "bw", about = "Branch-aware change orchestration")]
struct Cli {
    /// Config file (defaults to $BW_CONFIG, then branchwise.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// More logging; repeat for more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Directory for per-session clones
    #[arg(long, global = true)]
    clone_root: Option<PathBuf>,
    /// Event and snapshot database
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Git(GitCommand),
    /// Feed a JSON-lines file of events through the engine
    Replay(ReplayArgs),
    /// List events recorded by `replay`
    Events(EventsArgs),
}

fn load_config(cli: &Cli) -> error::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => Config::from_env()?,
    };
    if let Some(root) = &cli.clone_root {
        config.git.clone_root.clone_from(root);
    }
    if let Some(db) = &cli.db {
        config.store.db_path.clone_from(db);
    }
    Ok(config)
}

async fn run(cli: Cli) -> error::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Git(cmd) => {
            let result = commands::git::handle(cmd, &config.committer())?;
            output::git(&result, cli.json)
        }
        Command::Replay(args) => {
            let result = commands::replay::handle(args, &config).await?;
            output::replay(&result, cli.json)
        }
        Command::Events(args) => {
            let conn = rusqlite::Connection::open(&config.store.db_path)?;
            let store = bw_events::EventStore::new(conn)?;
            let events = commands::events::handle(&store, &args)?;
            output::events(&events, cli.json)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
