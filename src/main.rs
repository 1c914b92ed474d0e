use huddle::{
    room, AppConfig, AppState, InMemoryMembershipService, InMemoryRoomStore, PostgresRoomStore,
    RoomService, RoomStore,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(bind_addr = %config.bind_addr, "Starting huddle room service");

    let store: Arc<dyn RoomStore + Send + Sync> = match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::PgPool::connect(database_url).await?;
            let store = PostgresRoomStore::new(pool);
            store.ensure_schema().await?;
            info!("Using PostgreSQL room store");
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set, rooms will be kept in memory");
            Arc::new(InMemoryRoomStore::new())
        }
    };

    // The chat platform adapter replaces this in a real deployment
    let membership = Arc::new(InMemoryMembershipService::new());

    let room_service = Arc::new(RoomService::new(store, membership, config.room.clone()));
    let app_state = AppState::new(room_service);

    let app = room::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
