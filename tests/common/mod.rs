use std::sync::Arc;

use sentra_api::db::{self, DbConfig, DbPool};
use sentra_api::AppServices;

/// Fresh in-memory database with the full schema applied. A single
/// connection keeps transactions strictly serialized, which makes the
/// concurrency tests deterministic.
pub async fn setup() -> (Arc<DbPool>, AppServices) {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&config)
        .await
        .expect("failed to open in-memory database");
    db::run_migrations(&pool).await.expect("migrations failed");

    let pool = Arc::new(pool);
    let services = AppServices::without_events(pool.clone());
    (pool, services)
}
