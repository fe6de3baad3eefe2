use std::env;

use anyhow::Context;
use log::{error, info};
use watchroom_collab::{Collab, Config, PgDatabase};

mod logging;

/// Prepares the watchroom store: loads configuration, connects, applies migrations,
/// and checks the database answers before handing it over to the collab system.
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let verbose = env::var("WATCHROOM_VERBOSE").is_ok_and(|v| v == "1" || v == "true");
    logging::init_logger(verbose);

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("Could not read configuration")?;

    info!("Connecting to database...");
    let database = PgDatabase::connect(&config)
        .await
        .context("Could not connect to database")?;

    database
        .migrate()
        .await
        .context("Could not migrate database")?;

    let collab = Collab::new(config, database);
    collab
        .database()
        .ping()
        .await
        .context("Database did not respond")?;

    info!(
        "Store is ready, rooms get codes of {} characters and welcome messages are sent as {}",
        collab.config().code_length,
        collab.config().system_user_id
    );

    collab.database().close().await;
    Ok(())
}
