use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use inkpin_shared::record::{decode_record, encode_record, PictureRecord};

use crate::error::StoreError;

const RECORD_DIR: &str = "records";
const FILE_DIR: &str = "files";

/// Picture records plus the image and mask blobs they point at.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn load_record(&self, picture_id: &str) -> Result<Option<PictureRecord>, StoreError>;
    async fn save_record(&self, picture_id: &str, record: &PictureRecord)
        -> Result<(), StoreError>;
    async fn put_file(&self, name: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StoreError>;
    async fn get_file(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

fn decode(picture_id: &str, payload: &[u8]) -> Result<PictureRecord, StoreError> {
    decode_record(payload).map_err(|source| StoreError::Corrupt {
        id: picture_id.to_string(),
        source,
    })
}

// Names are generated server-side, but requests still carry them back in.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.')
}

pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(data_dir.join(RECORD_DIR)).await?;
        tokio::fs::create_dir_all(data_dir.join(FILE_DIR)).await?;
        Ok(Self { data_dir })
    }

    fn record_path(&self, picture_id: &str) -> PathBuf {
        self.data_dir
            .join(RECORD_DIR)
            .join(format!("{picture_id}.bin"))
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(FILE_DIR).join(name)
    }
}

async fn read_optional(path: PathBuf) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load_record(&self, picture_id: &str) -> Result<Option<PictureRecord>, StoreError> {
        if !is_safe_name(picture_id) {
            return Ok(None);
        }
        read_optional(self.record_path(picture_id))
            .await?
            .map(|payload| decode(picture_id, &payload))
            .transpose()
    }

    async fn save_record(
        &self,
        picture_id: &str,
        record: &PictureRecord,
    ) -> Result<(), StoreError> {
        let path = self.record_path(picture_id);
        let staging = path.with_extension("bin.tmp");
        tokio::fs::write(&staging, encode_record(record)).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn put_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StoreError> {
        tokio::fs::write(self.file_path(name), bytes).await?;
        Ok(())
    }

    async fn get_file(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if !is_safe_name(name) {
            return Ok(None);
        }
        read_optional(self.file_path(name)).await
    }
}

#[derive(Clone, Debug)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3StorageConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

pub struct S3Storage {
    bucket: String,
    prefix: String,
    client: Client,
}

impl S3Storage {
    pub async fn new(config: S3StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let (Some(access_key_id), Some(secret_access_key)) = (
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
        ) {
            let creds = Credentials::new(access_key_id, secret_access_key, None, None, "static");
            loader = loader.credentials_provider(creds);
        }
        if let Some(region) = config.region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint_url) = config.endpoint_url.as_ref() {
            builder = builder.endpoint_url(endpoint_url);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        let prefix = config
            .prefix
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();
        Self {
            bucket: config.bucket,
            prefix,
            client,
        }
    }

    fn object_key(&self, folder: &str, name: &str) -> String {
        if self.prefix.is_empty() {
            format!("{folder}/{name}")
        } else {
            format!("{}/{folder}/{name}", self.prefix)
        }
    }

    async fn get_object(&self, key: String) -> Result<Option<Vec<u8>>, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;
        let output = match response {
            Ok(output) => output,
            Err(error) => {
                if let Some(service_error) = error.as_service_error() {
                    if service_error.is_no_such_key() {
                        return Ok(None);
                    }
                }
                return Err(StoreError::Backend(format!(
                    "failed to read {key} from s3: {error:?}"
                )));
            }
        };
        let collected = output.body.collect().await.map_err(|error| {
            StoreError::Backend(format!("failed to read {key} body from s3: {error:?}"))
        })?;
        Ok(Some(collected.into_bytes().to_vec()))
    }

    async fn put_object(
        &self,
        key: String,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|error| StoreError::Backend(format!("failed to write {key} to s3: {error:?}")))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn load_record(&self, picture_id: &str) -> Result<Option<PictureRecord>, StoreError> {
        if !is_safe_name(picture_id) {
            return Ok(None);
        }
        let key = self.object_key(RECORD_DIR, &format!("{picture_id}.bin"));
        self.get_object(key)
            .await?
            .map(|payload| decode(picture_id, &payload))
            .transpose()
    }

    async fn save_record(
        &self,
        picture_id: &str,
        record: &PictureRecord,
    ) -> Result<(), StoreError> {
        let key = self.object_key(RECORD_DIR, &format!("{picture_id}.bin"));
        self.put_object(key, encode_record(record), "application/octet-stream")
            .await
    }

    async fn put_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let key = self.object_key(FILE_DIR, name);
        self.put_object(key, bytes, content_type).await
    }

    async fn get_file(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if !is_safe_name(name) {
            return Ok(None);
        }
        self.get_object(self.object_key(FILE_DIR, name)).await
    }
}
