#![allow(clippy::result_large_err)]

use chrono::Utc;
use dotenvy::dotenv;
use laundry_core::{
    config::{billing, database},
    core::invoice,
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Billing configuration
    let billing_config = billing::load_default_config()
        .inspect_err(|e| error!("Failed to load billing configuration: {}", e))?;
    info!(
        prefix = %billing_config.invoice_prefix,
        terms = billing_config.default_payment_terms,
        "Billing configuration loaded."
    );

    // 4. Database and schema
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database schema ready."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Daily maintenance
    let today = Utc::now().date_naive();
    let overdue = invoice::mark_overdue_invoices(&db, today)
        .await
        .inspect_err(|e| error!("Failed to mark overdue invoices: {}", e))?;
    info!(%today, overdue, "Maintenance run finished.");

    Ok(())
}
