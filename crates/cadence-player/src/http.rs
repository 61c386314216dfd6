use crate::core::{PlayerEvent, SharedNotices};
use crate::notice::Notice;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use cadence_proto::catalog::Catalog;
use cadence_proto::protocol::{Command, PlayerSnapshot};
use cadence_proto::state::StateManager;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    state_manager: Arc<StateManager>,
    notices: SharedNotices,
    event_tx: mpsc::Sender<PlayerEvent>,
}

#[derive(Serialize)]
struct ApiState {
    rev: u64,
    #[serde(flatten)]
    snapshot: PlayerSnapshot,
    /// Formatted "m:ss" strings, ready for display.
    current_time: String,
    total_time: String,
}

pub fn router(
    state_manager: Arc<StateManager>,
    notices: SharedNotices,
    event_tx: mpsc::Sender<PlayerEvent>,
) -> Router {
    let app_state = HttpState {
        state_manager,
        notices,
        event_tx,
    };

    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/catalog", get(get_catalog))
        .route("/api/notices", get(get_notices))
        .route("/api/tracks/:id/select", post(select_track))
        .route("/api/play", post(play))
        .route("/api/pause", post(pause))
        .route("/api/next", post(next_track))
        .route("/api/prev", post(prev_track))
        .route("/api/seek/:fraction", post(seek))
        .route("/api/volume/:percent", post(set_volume))
        .route("/api/mute", post(toggle_mute))
        .route("/api/refresh", post(refresh))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    notices: SharedNotices,
    event_tx: mpsc::Sender<PlayerEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state_manager, notices, event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn forward(state: &HttpState, cmd: Command) -> StatusCode {
    if state
        .event_tx
        .send(PlayerEvent::Client(cmd))
        .await
        .is_err()
    {
        error!("Failed to forward command: coordinator is gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn get_state(State(state): State<HttpState>) -> Json<ApiState> {
    let player = state.state_manager.get_state().await;
    let snapshot = player.snapshot();
    Json(ApiState {
        rev: player.rev,
        current_time: snapshot.time.current.to_string(),
        total_time: snapshot.time.total.to_string(),
        snapshot,
    })
}

async fn get_catalog(State(state): State<HttpState>) -> Json<Catalog> {
    Json(state.state_manager.catalog().await)
}

async fn get_notices(State(state): State<HttpState>) -> Json<Vec<Notice>> {
    let mut log = state.notices.lock().await;
    log.tick();
    Json(log.visible())
}

async fn select_track(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    info!("HTTP API: select track {}", id);
    forward(&state, Command::SelectTrack { id }).await
}

async fn play(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: play");
    forward(&state, Command::Play).await
}

async fn pause(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: pause");
    forward(&state, Command::Pause).await
}

async fn next_track(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: next track");
    forward(&state, Command::Next).await
}

async fn prev_track(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: previous track");
    forward(&state, Command::Prev).await
}

async fn seek(State(state): State<HttpState>, Path(fraction): Path<f64>) -> StatusCode {
    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return StatusCode::BAD_REQUEST;
    }
    info!("HTTP API: seek to {:.3}", fraction);
    forward(&state, Command::SeekFraction { fraction }).await
}

async fn set_volume(State(state): State<HttpState>, Path(percent): Path<i32>) -> StatusCode {
    let value = (percent as f32 / 100.0).clamp(0.0, 1.0);
    info!("HTTP API: set volume to {}%", percent);
    forward(&state, Command::Volume { value }).await
}

async fn toggle_mute(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: toggle mute");
    forward(&state, Command::ToggleMute).await
}

async fn refresh(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: refresh catalog");
    forward(&state, Command::LoadCatalog).await
}
