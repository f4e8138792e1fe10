//! Dicebank Server Binary
//!
//! `serve` runs the wallet and betting API; `issue-token` mints a bearer
//! token for a player.

use clap::{Parser, Subcommand};
use dicebank::{
    api::{server::init_tracing, ApiServer},
    auth::SignedTokenAuthority,
    DiceBankConfig, DiceBankResult, PlayerId, Services,
};
use std::{path::PathBuf, process};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dicebank")]
#[command(about = "Dice betting wallet service with live balance streaming")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// RocksDB directory
        #[arg(long)]
        db_path: Option<String>,

        /// Keep balances in memory only
        #[arg(long)]
        in_memory: bool,
    },

    /// Print a bearer token for a player
    IssueToken {
        #[arg(long)]
        player_id: u64,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Defaults, then the file, then the environment
fn load_config(path: Option<&PathBuf>) -> DiceBankResult<DiceBankConfig> {
    let mut config = match path {
        Some(path) => DiceBankConfig::from_toml_file(path)?,
        None => DiceBankConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

async fn serve(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<String>,
    in_memory: bool,
) -> DiceBankResult<()> {
    let mut config = load_config(config_path.as_ref())?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(db_path) = db_path {
        config.storage.data_directory = db_path;
    }
    if in_memory {
        config.storage.in_memory = true;
    }

    init_tracing(&config.logging.filter);
    config.validate()?;
    config.log_summary();

    let services = Services::build(config).await?;
    ApiServer::new(&services).run().await?;
    services.shutdown().await
}

fn issue_token(player_id: u64, config_path: Option<PathBuf>) -> DiceBankResult<()> {
    let config = load_config(config_path.as_ref())?;
    config.validate()?;
    let authority = SignedTokenAuthority::new(&config.auth.token_secret, config.auth.token_ttl());
    println!("{}", authority.issue(PlayerId(player_id)));
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve {
            config,
            host,
            port,
            db_path,
            in_memory,
        } => serve(config, host, port, db_path, in_memory).await,
        Command::IssueToken { player_id, config } => issue_token(player_id, config),
    };

    match result {
        Ok(()) => info!("👋 Dicebank exited cleanly"),
        Err(e) => {
            error!("❌ {}", e);
            eprintln!("dicebank: {}", e);
            process::exit(1);
        }
    }
}
