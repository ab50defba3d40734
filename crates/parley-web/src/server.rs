//! Router assembly and listener startup for the relay.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::error;

use crate::api::{self, AppState};
use crate::responder::Responder;
use crate::rooms::Rooms;
use crate::ws::{self, WsState};

/// Routes: `/ws` for the room relay, `/api/chat` and `/api/health` for REST
/// clients, and static front-end files when `static_dir` is set.
pub fn build_router(
    rooms: Arc<Rooms>,
    responder: Arc<dyn Responder>,
    auth_token: Option<String>,
    static_dir: Option<PathBuf>,
) -> Router {
    let app_state = AppState {
        rooms: rooms.clone(),
        responder: responder.clone(),
        started: Instant::now(),
    };

    let ws_state = WsState {
        rooms,
        responder,
        auth_token,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .with_state(ws_state);

    let api_routes = Router::new()
        .route("/api/chat", post(api::post_chat))
        .route("/api/health", get(api::get_health))
        .with_state(app_state);

    let mut router = Router::new().merge(ws_routes).merge(api_routes).layer(cors);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

/// Bind `bind_addr`, start serving on a Tokio task, and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Server stopped: {e}");
        }
    });

    Ok(addr)
}
