/// Database connection and schema creation
pub mod database;

/// Billing defaults loaded from billing.toml
pub mod billing;
