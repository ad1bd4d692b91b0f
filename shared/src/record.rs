use bincode::{Decode, Encode};

use crate::Picture;

pub const RECORD_FILE_MAGIC: [u8; 4] = *b"IPPR";
pub const RECORD_FILE_VERSION: u32 = 1;
const RECORD_HEADER_LEN: usize = RECORD_FILE_MAGIC.len() + std::mem::size_of::<u32>();

#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct PictureRecord {
    pub picture: Picture,
    pub image_file: String,
    pub mask_file: Option<String>,
    pub mask_revision: u32,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RecordDecodeError {
    #[error("unsupported picture record version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid picture record")]
    InvalidData,
}

pub fn encode_record(record: &PictureRecord) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&RECORD_FILE_MAGIC);
    payload.extend_from_slice(&RECORD_FILE_VERSION.to_le_bytes());
    let body = bincode::encode_to_vec(record, bincode::config::standard()).unwrap_or_default();
    payload.extend_from_slice(&body);
    payload
}

pub fn decode_record(payload: &[u8]) -> Result<PictureRecord, RecordDecodeError> {
    if !(payload.len() >= RECORD_HEADER_LEN && payload.starts_with(&RECORD_FILE_MAGIC)) {
        return Err(RecordDecodeError::InvalidData);
    }
    let version = u32::from_le_bytes(
        payload[RECORD_FILE_MAGIC.len()..RECORD_HEADER_LEN]
            .try_into()
            .map_err(|_| RecordDecodeError::InvalidData)?,
    );
    let body = &payload[RECORD_HEADER_LEN..];
    match version {
        1 => bincode::decode_from_slice(body, bincode::config::standard())
            .map(|(record, _)| record)
            .map_err(|_| RecordDecodeError::InvalidData),
        _ => Err(RecordDecodeError::UnsupportedVersion(version)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Comment;

    #[test]
    fn record_survives_storage() {
        let record = PictureRecord {
            picture: Picture {
                id: "abc".to_string(),
                url: "/files/abc.png".to_string(),
                title: Some("title".to_string()),
                mask: Some("/files/abc-mask-2.png".to_string()),
                comments: vec![Comment {
                    left: 100.0,
                    top: 50.0,
                    message: "hi".to_string(),
                    timestamp: 7,
                }],
                timestamp: 5,
            },
            image_file: "abc.png".to_string(),
            mask_file: Some("abc-mask-2.png".to_string()),
            mask_revision: 2,
        };
        assert_eq!(decode_record(&encode_record(&record)), Ok(record));
    }

    #[test]
    fn rejects_foreign_and_future_payloads() {
        assert_eq!(decode_record(b"YBSS\x01\0\0\0"), Err(RecordDecodeError::InvalidData));
        let mut future = RECORD_FILE_MAGIC.to_vec();
        future.extend_from_slice(&9u32.to_le_bytes());
        assert_eq!(
            decode_record(&future),
            Err(RecordDecodeError::UnsupportedVersion(9))
        );
    }
}
