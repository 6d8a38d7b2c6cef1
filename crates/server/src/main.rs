use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use display::{DisplayChannel, SurfaceEndpoint};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use server_api::ApiContext;
use shared::{
    domain::{QueueId, QueueItemId, SongId, SurfaceId},
    error::{ApiError, ErrorCode},
    protocol::{
        AddQueueItemRequest, DisplayContentRequest, DisplayStatus, MoveQueueItemRequest, NewQueue,
        NewSong, QueueItemPayload, QueueSummary, ServerEvent, SongPayload,
    },
};
use storage::Storage;
use tokio::sync::{broadcast, watch};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

mod app_state;
mod config;
mod surface;

use app_state::AppState;
use config::{load_settings, prepare_database_url, Settings};
use surface::WsSurfaceLauncher;

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct SurfaceQuery {
    surface: Uuid,
}

const MAX_BODY_BYTES: usize = 256 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = build_state(storage, &settings)?;
    let app = build_router(state);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_state(storage: Storage, settings: &Settings) -> anyhow::Result<Arc<AppState>> {
    let (events, _) = broadcast::channel(256);
    let launcher = Arc::new(WsSurfaceLauncher::new(
        events.clone(),
        settings.display_launch_command.clone(),
        settings.launch_timeout(),
    ));
    let display = Arc::new(DisplayChannel::new(
        launcher.clone(),
        settings.display_options()?,
    ));
    tokio::spawn(forward_display_status(
        display.subscribe_status(),
        events.clone(),
    ));

    Ok(Arc::new(AppState {
        api: ApiContext { storage, display },
        events,
        launcher,
    }))
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/songs", get(http_list_songs).post(http_create_song))
        .route("/songs/:song_id", get(http_get_song).delete(http_delete_song))
        .route("/queues", get(http_list_queues).post(http_create_queue))
        .route("/queues/:queue_id", delete(http_delete_queue))
        .route(
            "/queues/:queue_id/items",
            get(http_list_queue_items).post(http_add_queue_item),
        )
        .route(
            "/queues/:queue_id/items/:item_id",
            delete(http_remove_queue_item),
        )
        .route(
            "/queues/:queue_id/items/:item_id/move",
            post(http_move_queue_item),
        )
        .route("/queues/:queue_id/repair", post(http_repair_queue))
        .route("/display", get(http_display_status))
        .route("/display/open", post(http_open_display))
        .route("/display/close", post(http_close_display))
        .route("/display/content", post(http_show_content))
        .route("/display/ws", get(display_ws_handler))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation | ErrorCode::InvalidTarget => StatusCode::BAD_REQUEST,
        ErrorCode::NotOpen | ErrorCode::PartialReorder => StatusCode::CONFLICT,
        ErrorCode::PopupBlocked => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::TransportFailure => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn http_error(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

/// Relays the channel's liveness flag to control clients.
async fn forward_display_status(
    mut status: watch::Receiver<bool>,
    events: broadcast::Sender<ServerEvent>,
) {
    while status.changed().await.is_ok() {
        let open = *status.borrow_and_update();
        info!(open, "display status changed");
        let _ = events.send(ServerEvent::DisplayStatusChanged { open });
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_list_songs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SongPayload>>, HttpError> {
    let songs = server_api::list_songs(&state.api)
        .await
        .map_err(http_error)?;
    Ok(Json(songs))
}

async fn http_create_song(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSong>,
) -> Result<(StatusCode, Json<SongPayload>), HttpError> {
    let song = server_api::create_song(&state.api, req)
        .await
        .map_err(http_error)?;
    let _ = state.events.send(ServerEvent::SongsUpdated);
    Ok((StatusCode::CREATED, Json(song)))
}

async fn http_get_song(
    State(state): State<Arc<AppState>>,
    Path(song_id): Path<i64>,
) -> Result<Json<SongPayload>, HttpError> {
    let song = server_api::get_song(&state.api, SongId(song_id))
        .await
        .map_err(http_error)?;
    Ok(Json(song))
}

async fn http_delete_song(
    State(state): State<Arc<AppState>>,
    Path(song_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    let touched = server_api::delete_song(&state.api, SongId(song_id))
        .await
        .map_err(http_error)?;
    for queue_id in touched {
        broadcast_queue(&state, queue_id).await;
    }
    let _ = state.events.send(ServerEvent::SongsUpdated);
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_queues(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<QueueSummary>>, HttpError> {
    let queues = server_api::list_queues(&state.api)
        .await
        .map_err(http_error)?;
    Ok(Json(queues))
}

async fn http_create_queue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewQueue>,
) -> Result<(StatusCode, Json<QueueSummary>), HttpError> {
    let queue = server_api::create_queue(&state.api, req)
        .await
        .map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(queue)))
}

async fn http_delete_queue(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    server_api::delete_queue(&state.api, QueueId(queue_id))
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_queue_items(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<i64>,
) -> Result<Json<Vec<QueueItemPayload>>, HttpError> {
    let items = server_api::list_queue_items(&state.api, QueueId(queue_id))
        .await
        .map_err(http_error)?;
    Ok(Json(items))
}

async fn http_add_queue_item(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<i64>,
    Json(req): Json<AddQueueItemRequest>,
) -> Result<Json<Vec<QueueItemPayload>>, HttpError> {
    let queue_id = QueueId(queue_id);
    let result = server_api::add_song_to_queue(&state.api, queue_id, req.song_id).await;
    queue_mutation(&state, queue_id, result)
}

async fn http_remove_queue_item(
    State(state): State<Arc<AppState>>,
    Path((queue_id, item_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<QueueItemPayload>>, HttpError> {
    let queue_id = QueueId(queue_id);
    let result = server_api::remove_queue_item(&state.api, queue_id, QueueItemId(item_id)).await;
    queue_mutation(&state, queue_id, result)
}

async fn http_move_queue_item(
    State(state): State<Arc<AppState>>,
    Path((queue_id, item_id)): Path<(i64, i64)>,
    Json(req): Json<MoveQueueItemRequest>,
) -> Result<Json<Vec<QueueItemPayload>>, HttpError> {
    let queue_id = QueueId(queue_id);
    let result =
        server_api::move_queue_item(&state.api, queue_id, QueueItemId(item_id), req.order).await;
    queue_mutation(&state, queue_id, result)
}

async fn http_repair_queue(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<i64>,
) -> Result<Json<Vec<QueueItemPayload>>, HttpError> {
    let queue_id = QueueId(queue_id);
    let result = server_api::repair_queue(&state.api, queue_id).await;
    queue_mutation(&state, queue_id, result)
}

/// Broadcasts the outcome of a queue mutation. A partial reorder tells
/// control clients to drop their copy of the queue and fetch it again.
fn queue_mutation(
    state: &AppState,
    queue_id: QueueId,
    result: Result<Vec<QueueItemPayload>, ApiError>,
) -> Result<Json<Vec<QueueItemPayload>>, HttpError> {
    match result {
        Ok(items) => {
            let _ = state.events.send(ServerEvent::QueueUpdated {
                queue_id,
                items: items.clone(),
            });
            Ok(Json(items))
        }
        Err(err) => {
            if err.code == ErrorCode::PartialReorder {
                let _ = state.events.send(ServerEvent::QueueResyncRequired { queue_id });
            }
            Err(http_error(err))
        }
    }
}

async fn broadcast_queue(state: &AppState, queue_id: QueueId) {
    match server_api::list_queue_items(&state.api, queue_id).await {
        Ok(items) => {
            let _ = state.events.send(ServerEvent::QueueUpdated { queue_id, items });
        }
        Err(error) => {
            warn!(queue_id = queue_id.0, %error, "failed to reload queue for broadcast");
            let _ = state.events.send(ServerEvent::QueueResyncRequired { queue_id });
        }
    }
}

async fn http_display_status(State(state): State<Arc<AppState>>) -> Json<DisplayStatus> {
    Json(server_api::display_status(&state.api).await)
}

async fn http_open_display(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DisplayStatus>, HttpError> {
    let status = server_api::open_display(&state.api)
        .await
        .map_err(|e| display_failure(&state, e))?;
    Ok(Json(status))
}

async fn http_close_display(State(state): State<Arc<AppState>>) -> Json<DisplayStatus> {
    Json(server_api::close_display(&state.api).await)
}

async fn http_show_content(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DisplayContentRequest>,
) -> Result<Json<ServerEvent>, HttpError> {
    let text = server_api::show_content(&state.api, req)
        .await
        .map_err(|e| display_failure(&state, e))?;
    let event = ServerEvent::DisplayContentChanged { text };
    let _ = state.events.send(event.clone());
    Ok(Json(event))
}

/// Display failures are also pushed to control clients, since the operator
/// usually needs to act on them (allow the popup, reopen the display).
fn display_failure(state: &AppState, err: ApiError) -> HttpError {
    if matches!(
        err.code,
        ErrorCode::PopupBlocked | ErrorCode::NotOpen | ErrorCode::TransportFailure
    ) {
        let _ = state.events.send(ServerEvent::Error(err.clone()));
    }
    http_error(err)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "control client lagged behind event stream");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

async fn display_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<SurfaceQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let surface_id = SurfaceId(q.surface);
    let endpoint = state.launcher.claim(surface_id).await.ok_or_else(|| {
        http_error(ApiError::not_found(format!(
            "no presentation surface {surface_id} is waiting"
        )))
    })?;
    Ok(ws.on_upgrade(move |socket| surface_connection(socket, endpoint)))
}

/// Bridges a presentation client socket to its surface endpoint. The
/// endpoint is released when either side goes away.
async fn surface_connection(socket: WebSocket, endpoint: SurfaceEndpoint) {
    let surface_id = endpoint.id();
    info!(surface = %surface_id, "presentation client attached");

    let (mut sender, mut receiver) = socket.split();
    let (mut from_controller, to_controller) = endpoint.into_parts();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = from_controller.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(frame))) => {
                    if to_controller.send(frame).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    send_task.abort();
    info!(surface = %surface_id, "presentation client detached");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
