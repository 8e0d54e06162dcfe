use anyhow::Result;
use clap::Parser;
use tracing::info;

use newspulse::app::api;
use newspulse::db::Database;
use newspulse::logging;

#[derive(Parser)]
#[clap(
    name = "newspulse",
    about = "Hot-score and recommendation engine for the news feed"
)]
struct Args {
    /// Path to the SQLite database (defaults to $DATABASE_PATH, then
    /// newspulse.db)
    #[clap(long)]
    database: Option<String>,

    /// Port for the HTTP API (defaults to $PORT, then 8080)
    #[clap(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    let args = Args::parse();
    if let Some(database) = args.database {
        std::env::set_var("DATABASE_PATH", database);
    }
    if let Some(port) = args.port {
        std::env::set_var("PORT", port.to_string());
    }

    // Open the pool (and initialize the schema) before accepting traffic.
    Database::instance().await;
    info!("Starting API server");

    api::api_loop().await
}
