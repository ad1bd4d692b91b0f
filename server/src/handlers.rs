use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Form, Json};
use futures_util::{SinkExt, StreamExt};
use inkpin_shared::{ChannelEvent, CommentDraft, Picture};
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::pictures::{add_comment, apply_mask, create_picture, load_picture};
use crate::state::AppState;

pub async fn publish_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Picture>, StoreError> {
    let mut title = None;
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| StoreError::BadRequest(error.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|error| StoreError::BadRequest(error.to_string()))?,
                );
            }
            "image" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|error| StoreError::BadRequest(error.to_string()))?;
                image = Some((content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }
    let (content_type, bytes) =
        image.ok_or_else(|| StoreError::BadRequest("missing image field".to_string()))?;
    let picture = create_picture(&state, title, &content_type, bytes).await?;
    Ok(Json(picture))
}

pub async fn picture_handler(
    Path(picture_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Picture>, StoreError> {
    Ok(Json(load_picture(&state, &picture_id).await?))
}

pub async fn comment_handler(
    Path(picture_id): Path<String>,
    State(state): State<AppState>,
    Form(draft): Form<CommentDraft>,
) -> Result<Json<Picture>, StoreError> {
    let (picture, _) = add_comment(&state, &picture_id, draft).await?;
    Ok(Json(picture))
}

pub async fn file_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StoreError> {
    let bytes = state
        .storage
        .get_file(&name)
        .await?
        .ok_or_else(|| StoreError::NotFound(name.clone()))?;
    let content_type = if name.ends_with(".png") {
        "image/png"
    } else if name.ends_with(".jpg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    };
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    ))
}

pub async fn ws_handler(
    Path(picture_id): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StoreError> {
    let picture = load_picture(&state, &picture_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, picture)))
}

async fn handle_socket(socket: WebSocket, state: AppState, picture: Picture) {
    let picture_id = picture.id.clone();
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ChannelEvent>();

    // Only the sender hears about its own broken masks.
    let own = tx.clone();
    let (room, connection_id) = state.join(&picture_id, tx).await;
    tracing::info!(picture = %picture_id, conn = %connection_id, "channel connected");

    // Reloaded after joining so nothing saved in between goes unseen.
    let picture = load_picture(&state, &picture_id).await.unwrap_or(picture);
    let _ = own.send(ChannelEvent::Pic { pic: Some(picture) });

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if socket_sender
                .send(Message::Text(event.to_json()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let mut close_frame = None;
    while let Some(Ok(message)) = socket_receiver.next().await {
        match message {
            Message::Binary(payload) => {
                tracing::debug!(
                    picture = %picture_id,
                    conn = %connection_id,
                    bytes = payload.len(),
                    "mask received"
                );
                if let Err(error) = apply_mask(&state, &picture_id, payload).await {
                    tracing::warn!(picture = %picture_id, conn = %connection_id, "mask rejected: {error}");
                    let _ = own.send(ChannelEvent::Error {
                        message: error.to_string(),
                    });
                }
            }
            Message::Text(text) => {
                tracing::debug!(picture = %picture_id, conn = %connection_id, "ignoring text frame {text:?}");
            }
            Message::Close(frame) => {
                close_frame = frame;
                break;
            }
            _ => {}
        }
    }

    let remaining = room.leave(connection_id).await;
    tracing::info!(
        picture = %picture_id,
        conn = %connection_id,
        peers = remaining,
        close = ?close_frame.map(|frame| frame.code),
        "channel disconnected"
    );
    drop(own);
    send_task.abort();
    state.release_room(&picture_id, &room).await;
}
