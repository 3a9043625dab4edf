//! Database configuration module.
//!
//! This module handles the store connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so unique columns and foreign-key cascade rules declared on the entities are what the
//! store enforces.

use crate::entities::{
    Customer, Employee, Invoice, InvoiceRecord, MachineAssignment, Order, OrderPricingHistory,
    OrderRecord, RecordPricingHistory,
};
use crate::errors::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/laundry.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable,
/// falling back to a local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection using `DATABASE_URL` (or the default `SQLite` path).
pub async fn create_connection() -> Result<DatabaseConnection> {
    connect(&get_database_url()).await
}

/// Connects to the given URL.
///
/// `SQLite` serialises writers, so its pool is limited to one connection; core
/// transactions then queue on the pool instead of failing with a busy error.
#[instrument]
pub async fn connect(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    if database_url.starts_with("sqlite:") {
        options.max_connections(1);
    }
    options.sqlx_logging(false);

    let db = Database::connect(options).await?;
    debug!(backend = ?db.get_database_backend(), "Database connection opened");
    Ok(db)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables (if missing), parents before children.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Customer).await?;
    create_table(db, &schema, Employee).await?;
    create_table(db, &schema, Order).await?;
    create_table(db, &schema, OrderRecord).await?;
    create_table(db, &schema, MachineAssignment).await?;
    create_table(db, &schema, Invoice).await?;
    create_table(db, &schema, InvoiceRecord).await?;
    create_table(db, &schema, OrderPricingHistory).await?;
    create_table(db, &schema, RecordPricingHistory).await?;

    info!("Database tables ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{InvoiceModel, MachineAssignmentModel, OrderModel, OrderRecordModel};
    use sea_orm::QuerySelect;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<OrderModel> = Order::find().limit(1).all(&db).await?;
        let _: Vec<OrderRecordModel> = OrderRecord::find().limit(1).all(&db).await?;
        let _: Vec<MachineAssignmentModel> = MachineAssignment::find().limit(1).all(&db).await?;
        let _: Vec<InvoiceModel> = Invoice::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
