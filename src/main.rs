use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use livepref::{PrefStore, PrefsConfig};

mod cli;

use cli::Cli;
use cli::app::Commands;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();
    info!("Starting livepref");

    let mut config = PrefsConfig::load(cli.config.as_deref())?;
    if let Some(app_id) = cli.app_id {
        config.app_id = app_id;
    }
    debug!("Using namespace {} with {:?} backend", config.namespace(), config.backend);

    let provider = config.provider()?;
    let store = PrefStore::new();
    store
        .initialize(provider.as_ref(), &config.app_id)
        .await
        .context("Failed to open preference store")?;

    match cli.command {
        Commands::Get { key, kind } => cli::commands::get_command(&store, key, kind).await?,
        Commands::Set { key, value, kind } => {
            cli::commands::set_command(&store, key, value, kind).await?
        }
        Commands::Delete { key } => cli::commands::delete_command(&store, key).await?,
        Commands::Has { key } => cli::commands::has_command(&store, key).await?,
        Commands::Keys => cli::commands::keys_command(&store).await?,
        Commands::Demo => cli::commands::demo_command(&store).await?,
    }

    Ok(())
}
