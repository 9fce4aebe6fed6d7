use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use socketioxide::SocketIo;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod events;
mod models;
mod presence;
mod registry;
mod routes;
mod schema;
mod services;
mod socket;
mod store;
#[cfg(test)]
mod testutil;

use config::AppConfig;
use presence::PresenceTracker;
use registry::ConnectionRegistry;
use services::matchmaking::SwipeResolver;
use services::messaging::MessagingService;
use services::notifications::NotificationService;
use store::{PgStore, Store};

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub registry: Arc<ConnectionRegistry>,
    pub matchmaking: Arc<SwipeResolver>,
    pub messaging: Arc<MessagingService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    embr_shared::middleware::init_tracing("embr-realtime");

    let config = AppConfig::load()?;
    let port = config.port;

    let pool = embr_shared::clients::db::create_pool(&config.database_url);
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let registry = Arc::new(ConnectionRegistry::new());
    let notifications = Arc::new(NotificationService::new(store.clone(), registry.clone()));
    let matchmaking = Arc::new(SwipeResolver::new(store.clone(), notifications.clone()));
    let messaging = Arc::new(MessagingService::new(
        store.clone(),
        registry.clone(),
        notifications.clone(),
    ));

    // presence fanout runs off the registry's transition stream; subscribe
    // before any socket can register
    let tracker = Arc::new(PresenceTracker::new(store.clone(), registry.clone()));
    let transitions = registry.subscribe();
    tokio::spawn(tracker.run(transitions));

    // Build Socket.IO layer - the namespace closure carries the app state
    let (sio_layer, io) = SocketIo::builder().build_layer();

    let state = Arc::new(AppState {
        config,
        store,
        registry,
        matchmaking,
        messaging,
    });

    io.ns("/", {
        let state = state.clone();
        move |socket: socketioxide::extract::SocketRef| {
            let state = state.clone();
            async move {
                socket::handlers::on_connect_with_state(socket, state).await;
            }
        }
    });

    let app = Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Swipes & matches
        .route("/swipes", post(routes::swipes::record_swipe))
        .route("/matches", get(routes::matches::list_matches))
        // Messages
        .route(
            "/matches/:id/messages",
            get(routes::messages::list_messages).post(routes::messages::send_message),
        )
        .route("/matches/:id/read", post(routes::messages::mark_read))
        // Notifications
        .route("/notifications", get(routes::notifications::list_notifications))
        .route("/notifications/unread-count", get(routes::notifications::unread_count))
        .route("/notifications/mark-all-read", post(routes::notifications::mark_all_read))
        .route("/notifications/:id/read", post(routes::notifications::mark_read))
        .layer(sio_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "embr-realtime starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
