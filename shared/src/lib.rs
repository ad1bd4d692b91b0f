use std::collections::BTreeMap;

use bincode::{Decode, Encode};
use serde::{Deserialize, Deserializer, Serialize};

pub mod record;

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Debug, PartialEq)]
pub struct Comment {
    pub left: f64,
    pub top: f64,
    pub message: String,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Encode, Decode, Clone, Debug, Default, PartialEq)]
pub struct Picture {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(
        default,
        deserialize_with = "comments_from_map_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommentDraft {
    pub left: i32,
    pub top: i32,
    pub message: String,
}

impl CommentDraft {
    pub fn into_comment(self, timestamp: i64) -> Comment {
        Comment {
            left: f64::from(self.left),
            top: f64::from(self.top),
            message: self.message,
            timestamp,
        }
    }
}

// The store keys comments by id; older dumps carry a plain list.
fn comments_from_map_or_list<'de, D>(deserializer: D) -> Result<Vec<Comment>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        List(Vec<Comment>),
        Keyed(BTreeMap<String, Comment>),
    }

    let mut comments = match Option::<Shape>::deserialize(deserializer)? {
        Some(Shape::List(list)) => list,
        Some(Shape::Keyed(map)) => map.into_values().collect(),
        None => Vec::new(),
    };
    comments.sort_by_key(|comment| comment.timestamp);
    Ok(comments)
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event")]
pub enum ChannelEvent {
    #[serde(rename = "pic")]
    Pic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pic: Option<Picture>,
    },
    #[serde(rename = "comment")]
    Comment { comment: Comment },
    #[serde(rename = "mask")]
    Mask { url: String },
    #[serde(rename = "error")]
    Error { message: String },
}

pub const CHANNEL_EVENT_KINDS: [&str; 4] = ["pic", "comment", "mask", "error"];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EventDecodeError {
    #[error("malformed channel message: {0}")]
    Malformed(String),
    #[error("unknown channel event kind {0:?}")]
    UnknownKind(String),
}

impl ChannelEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelEvent::Pic { .. } => "pic",
            ChannelEvent::Comment { .. } => "comment",
            ChannelEvent::Mask { .. } => "mask",
            ChannelEvent::Error { .. } => "error",
        }
    }

    pub fn decode(text: &str) -> Result<Self, EventDecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|error| EventDecodeError::Malformed(error.to_string()))?;
        let kind = value
            .get("event")
            .and_then(|kind| kind.as_str())
            .ok_or_else(|| EventDecodeError::Malformed("missing event kind".to_string()))?;
        if !CHANNEL_EVENT_KINDS.contains(&kind) {
            return Err(EventDecodeError::UnknownKind(kind.to_string()));
        }
        serde_json::from_value(value).map_err(|error| EventDecodeError::Malformed(error.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
