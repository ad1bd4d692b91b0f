use inkpin_shared::record::PictureRecord;
use inkpin_shared::{ChannelEvent, Comment, CommentDraft, Picture};
use uuid::Uuid;

use crate::error::StoreError;
use crate::flatten::{flatten_masks, image_extension};
use crate::state::AppState;

pub fn new_picture_id() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// The client-facing view of a record: stored file names become public URLs.
pub fn present(state: &AppState, record: &PictureRecord) -> Picture {
    let mut picture = record.picture.clone();
    picture.url = state.file_url(&record.image_file);
    picture.mask = record.mask_file.as_deref().map(|name| state.file_url(name));
    picture
}

async fn require_record(state: &AppState, picture_id: &str) -> Result<PictureRecord, StoreError> {
    state
        .storage
        .load_record(picture_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(picture_id.to_string()))
}

pub async fn create_picture(
    state: &AppState,
    title: Option<String>,
    content_type: &str,
    bytes: Vec<u8>,
) -> Result<Picture, StoreError> {
    let extension = image_extension(content_type).ok_or_else(|| {
        StoreError::BadImage(format!("{content_type} is not a .jpg or .png image"))
    })?;
    let detected = image::guess_format(&bytes)?;
    if !detected.extensions_str().contains(&extension) {
        return Err(StoreError::BadImage(format!(
            "content does not match {content_type}"
        )));
    }

    let id = new_picture_id();
    let image_file = format!("{id}.{extension}");
    state
        .storage
        .put_file(&image_file, bytes, content_type)
        .await?;
    let record = PictureRecord {
        picture: Picture {
            id: id.clone(),
            title: title.filter(|title| !title.trim().is_empty()),
            timestamp: now_millis(),
            ..Default::default()
        },
        image_file,
        mask_file: None,
        mask_revision: 0,
    };
    state.storage.save_record(&id, &record).await?;
    tracing::info!(picture = %id, "picture published");
    Ok(present(state, &record))
}

pub async fn load_picture(state: &AppState, picture_id: &str) -> Result<Picture, StoreError> {
    let record = require_record(state, picture_id).await?;
    Ok(present(state, &record))
}

pub async fn add_comment(
    state: &AppState,
    picture_id: &str,
    draft: CommentDraft,
) -> Result<(Picture, Comment), StoreError> {
    if draft.message.trim().is_empty() {
        return Err(StoreError::BadRequest("comment message is empty".to_string()));
    }
    let room = state.room(picture_id).await;
    let outcome = {
        let _writer = room.writer.lock().await;
        async {
            let mut record = require_record(state, picture_id).await?;
            let comment = draft.into_comment(now_millis());
            let index = record
                .picture
                .comments
                .partition_point(|held| held.timestamp <= comment.timestamp);
            record.picture.comments.insert(index, comment.clone());
            state.storage.save_record(picture_id, &record).await?;
            Ok::<_, StoreError>((present(state, &record), comment))
        }
        .await
    };
    if let Ok((_, comment)) = &outcome {
        let delivered = room
            .broadcast(&ChannelEvent::Comment {
                comment: comment.clone(),
            })
            .await;
        tracing::debug!(picture = %picture_id, delivered, "comment added");
    }
    state.release_room(picture_id, &room).await;
    outcome
}

/// Flattens an uploaded mask over the stored one and announces the new mask to every peer.
pub async fn apply_mask(
    state: &AppState,
    picture_id: &str,
    payload: Vec<u8>,
) -> Result<String, StoreError> {
    let room = state.room(picture_id).await;
    let outcome = {
        let _writer = room.writer.lock().await;
        async {
            let mut record = require_record(state, picture_id).await?;
            let previous = match record.mask_file.as_deref() {
                Some(name) => state.storage.get_file(name).await?,
                None => None,
            };
            let flattened =
                tokio::task::spawn_blocking(move || flatten_masks(previous.as_deref(), &payload))
                    .await
                    .map_err(|error| {
                        StoreError::Backend(format!("mask flattening aborted: {error}"))
                    })??;
            record.mask_revision += 1;
            let name = format!("{picture_id}-mask-{}.png", record.mask_revision);
            state.storage.put_file(&name, flattened, "image/png").await?;
            record.mask_file = Some(name.clone());
            state.storage.save_record(picture_id, &record).await?;
            Ok::<_, StoreError>(state.file_url(&name))
        }
        .await
    };
    if let Ok(url) = &outcome {
        let delivered = room
            .broadcast(&ChannelEvent::Mask { url: url.clone() })
            .await;
        tracing::info!(picture = %picture_id, delivered, "mask flattened");
    }
    state.release_room(picture_id, &room).await;
    outcome
}
