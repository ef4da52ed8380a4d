use axum::{
  extract::{
    Path, State, WebSocketUpgrade,
    ws::{Message, WebSocket},
  },
  response::Response,
};
use futures::SinkExt;
use serde_json::json;

use super::response::ApiResponse;
use crate::{
  docker::{ContainerFilter, STOP_TIMEOUT},
  error::Result,
  state::AppState,
};

/// List every krane-managed container on the host.
#[instrument(skip(state))]
pub async fn list(
  State(state): State<AppState>,
) -> Result<ApiResponse> {
  let containers = state
    .engine
    .list_containers(ContainerFilter::Managed)
    .await?;
  Ok(ApiResponse::ok(containers))
}

#[instrument(skip(state))]
pub async fn stop(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<ApiResponse> {
  state.engine.stop_container(&id, STOP_TIMEOUT).await?;
  info!("container {id} stopped");
  Ok(ApiResponse::ok(
    json!({ "message": format!("Container {id} stopped") }),
  ))
}

#[instrument(skip(state))]
pub async fn start(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<ApiResponse> {
  state.engine.start_container(&id).await?;
  info!("container {id} started");
  Ok(ApiResponse::ok(
    json!({ "message": format!("Container {id} started") }),
  ))
}

/// Upgrade to a websocket and follow the container's log lines
/// until the stream ends or the client goes away.
#[instrument(skip(state, ws))]
pub async fn events(
  State(state): State<AppState>,
  Path(id): Path<String>,
  ws: WebSocketUpgrade,
) -> Response {
  ws.on_upgrade(move |socket| stream_events(state, id, socket))
}

async fn stream_events(
  state: AppState,
  id: String,
  mut socket: WebSocket,
) {
  let mut stream = match state.engine.stream_logs(&id).await {
    Ok(stream) => stream,
    Err(e) => {
      let _ = socket
        .send(Message::text(format!("ERROR: {e}")))
        .await;
      let _ = socket.close().await;
      return;
    }
  };

  loop {
    tokio::select! {
      line = stream.lines.recv() => match line {
        Some(line) => {
          let line =
            String::from_utf8_lossy(&line).into_owned();
          if socket.send(Message::text(line)).await.is_err() {
            break;
          }
        }
        None => break,
      },
      message = socket.recv() => match message {
        // Ignore anything the client sends; only its departure
        // matters.
        Some(Ok(_)) => continue,
        Some(Err(_)) | None => break,
      },
    }
  }

  // Tear the engine-side tail down with the connection.
  stream.stop.cancel();
  let _ = socket.close().await;
}
