use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;
use crate::entities;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Connect with sensible pool defaults.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let mut options = ConnectOptions::new(cfg.database_url.clone());
    options
        .max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    info!("database connection established");
    Ok(db)
}

/// Create any missing tables from the entity definitions.
///
/// Used for sqlite/dev bootstrapping and by the test harness; production
/// schemas are managed out of band.
pub async fn bootstrap_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = [
        schema
            .create_table_from_entity(entities::Product)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(entities::CartItem)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(entities::Order)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(entities::VendorOrder)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(entities::VendorOrderItem)
            .if_not_exists()
            .to_owned(),
    ];

    for statement in statements {
        db.execute(backend.build(&statement)).await?;
    }
    info!("schema bootstrap complete");
    Ok(())
}
