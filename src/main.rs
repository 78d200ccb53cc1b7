use std::sync::Arc;

use modwarden::db::connection::initialize_pool;
use modwarden::db::migrations::run_migrations_or_die;
use modwarden::{configuration, startup, telemetry};

#[tokio::main]
async fn main() -> modwarden::Result<()> {
    dotenvy::dotenv().ok();
    let settings = configuration::get_configuration()?;
    telemetry::init_tracing(&settings.logging)?;
    tracing::info!("Starting modwarden server...");

    let pool = initialize_pool(&settings.database);
    run_migrations_or_die(&pool);

    startup::launch(settings, Arc::new(pool)).await
}
