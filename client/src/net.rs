use gloo_net::http::{Request, Response};
use web_sys::{File, FormData};

use inkpin_shared::{CommentDraft, Picture};

use crate::error::{Error, Result, INVALID_FILE_TYPE};

pub const ACCEPTED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

pub fn validate_image_type(mime: &str) -> Result<()> {
    if ACCEPTED_IMAGE_TYPES.contains(&mime) {
        Ok(())
    } else {
        Err(Error::InvalidInput(INVALID_FILE_TYPE.to_string()))
    }
}

pub fn picture_id_from_search(search: &str) -> Option<String> {
    search
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "id")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn share_link(page_base: &str, picture_id: &str) -> String {
    format!("{page_base}?id={}", urlencoding::encode(picture_id))
}

pub fn channel_url(api_base: &str, picture_id: &str) -> Result<String> {
    let base = api_base.trim_end_matches('/');
    let (scheme, rest) = if let Some(rest) = base.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        ("ws", rest)
    } else {
        return Err(Error::Transport(format!(
            "Cannot derive a live channel from {api_base}"
        )));
    };
    Ok(format!(
        "{scheme}://{rest}/pic/{}/ws",
        urlencoding::encode(picture_id)
    ))
}

pub fn comment_form(draft: &CommentDraft) -> String {
    format!(
        "left={}&top={}&message={}",
        draft.left,
        draft.top,
        urlencoding::encode(&draft.message)
    )
}

#[derive(Clone)]
pub struct PictureStore {
    base: String,
}

impl PictureStore {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn picture_url(&self, picture_id: &str) -> String {
        format!("{}/pic/{}", self.base, urlencoding::encode(picture_id))
    }

    pub fn comments_url(&self, picture_id: &str) -> String {
        format!("{}/comments", self.picture_url(picture_id))
    }

    pub async fn upload(&self, file: &File) -> Result<Picture> {
        let form = FormData::new()?;
        form.append_with_str("title", &file.name())?;
        form.append_with_blob("image", file)?;
        let url = format!("{}/pic", self.base);
        log::info!("uploading {} ({} bytes)", file.name(), file.size());
        let response = Request::post(&url).body(form)?.send().await?;
        read_picture(response).await
    }

    pub async fn load(&self, picture_id: &str) -> Result<Picture> {
        let response = Request::get(&self.picture_url(picture_id)).send().await?;
        read_picture(response).await
    }

    pub async fn post_comment(&self, picture_id: &str, draft: &CommentDraft) -> Result<Picture> {
        let response = Request::post(&self.comments_url(picture_id))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(comment_form(draft))?
            .send()
            .await?;
        read_picture(response).await
    }
}

async fn read_picture(response: Response) -> Result<Picture> {
    if !response.ok() {
        let status = response.status();
        let text = response.status_text();
        return Err(Error::Transport(if text.is_empty() {
            format!("Store answered HTTP {status}")
        } else {
            format!("Store answered HTTP {status}: {text}")
        }));
    }
    response
        .json::<Picture>()
        .await
        .map_err(|error| Error::Transport(format!("Store sent an unreadable picture: {error}")))
}
