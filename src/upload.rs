//! multipart 上传处理：逐个字段流式落盘并返回上传清单。

use axum::extract::Extension;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use serde::Serialize;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::config::{MAX_ID_ATTEMPTS, SNIFF_PREFIX_LEN, UPLOAD_FIELD_NAME};
use crate::error::ApiError;
use crate::ident::IdSource;
use crate::sniff::{PrefixedReader, read_head, sniff_extension};
use crate::storage::{Storage, StorageError};

const COPY_BUFFER_SIZE: usize = 64 * 1024;
const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug)]
pub struct UploadConfig {
    pub ids: Arc<dyn IdSource>,
    pub max_total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRecord {
    pub id: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct UploadManifest {
    pub uploads: Vec<UploadRecord>,
}

#[derive(Debug)]
pub enum IngestError {
    InvalidContentType,
    MultipartRead(io::Error),
    Storage(StorageError),
    IdentifiersExhausted,
    NoFilesUploaded,
    Serialization(serde_json::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::InvalidContentType => write!(f, "invalid content-type"),
            IngestError::MultipartRead(err) => write!(f, "multipart read failed: {err}"),
            IngestError::Storage(err) => write!(f, "storage write failed: {err}"),
            IngestError::IdentifiersExhausted => {
                write!(f, "no free identifier after {MAX_ID_ATTEMPTS} attempts")
            }
            IngestError::NoFilesUploaded => write!(f, "no files uploaded"),
            IngestError::Serialization(err) => write!(f, "manifest encoding failed: {err}"),
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        IngestError::Storage(err)
    }
}

/// 上传接口：解析 multipart 请求体并返回 JSON 清单。
pub async fn upload_files(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let result = async {
        let multipart = multipart.map_err(|rejection| {
            debug!(reason = %rejection.body_text(), "rejected upload content-type");
            IngestError::InvalidContentType
        })?;
        let uploads = ingest(&storage, &upload, multipart).await?;
        let body = serde_json::to_vec(&UploadManifest { uploads })
            .map_err(IngestError::Serialization)?;
        Ok::<_, IngestError>(body)
    }
    .await;

    match result {
        Ok(body) => Ok((
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            body,
        )
            .into_response()),
        Err(err) => {
            warn!(error = %err, "upload failed");
            Err(err.into())
        }
    }
}

/// 按流顺序处理所有 `file` 字段，每个字段完整写盘后再读取下一个。
pub async fn ingest(
    storage: &Storage,
    upload: &UploadConfig,
    mut multipart: Multipart,
) -> Result<Vec<UploadRecord>, IngestError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| IngestError::MultipartRead(io::Error::other(err)))?
    {
        if field.name() != Some(UPLOAD_FIELD_NAME) {
            debug!(field = field.name().unwrap_or_default(), "skipping form field");
            continue;
        }

        let declared = declared_extension(field.file_name());
        let mut reader = StreamReader::new(field.map_err(io::Error::other));
        let (extension, mut body) = match declared {
            Some(extension) => (extension, PrefixedReader::new(Vec::new(), reader)),
            None => {
                let head = read_head(&mut reader, SNIFF_PREFIX_LEN)
                    .await
                    .map_err(IngestError::MultipartRead)?;
                let extension = sniff_extension(&head)
                    .map(|ext| format!(".{ext}"))
                    .unwrap_or_default();
                (extension, PrefixedReader::new(head, reader))
            }
        };

        let (record, mut file) = allocate_file(storage, upload.ids.as_ref(), &extension).await?;
        let bytes = copy_part(&mut body, &mut file).await?;
        info!(id = record.id, filename = record.filename, bytes, "stored upload");
        uploads.push(record);
    }

    if uploads.is_empty() {
        return Err(IngestError::NoFilesUploaded);
    }
    Ok(uploads)
}

/// 从声明的文件名中取扩展名（含点）；不安全或缺失时返回 `None`。
///
/// 只看最后一段路径，点号之后的部分即扩展名，因此 `.png` 也算声明了扩展名。
fn declared_extension(file_name: Option<&str>) -> Option<String> {
    let base = file_name?.rsplit(['/', '\\']).next()?;
    let (_, extension) = base.rsplit_once('.')?;
    if extension.is_empty()
        || extension.len() > MAX_EXTENSION_LEN
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(format!(".{extension}"))
}

async fn allocate_file(
    storage: &Storage,
    ids: &dyn IdSource,
    extension: &str,
) -> Result<(UploadRecord, File), IngestError> {
    for attempt in 1..=MAX_ID_ATTEMPTS {
        let id = ids.next_id();
        let filename = format!("{id}{extension}");
        match storage.create_new_file(&filename).await? {
            Some(file) => return Ok((UploadRecord { id, filename }, file)),
            None => warn!(filename, attempt, "identifier collision, drawing a new one"),
        }
    }
    Err(IngestError::IdentifiersExhausted)
}

async fn copy_part<R>(reader: &mut R, file: &mut File) -> Result<u64, IngestError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(IngestError::MultipartRead)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .await
            .map_err(|err| IngestError::Storage(StorageError::Io(err)))?;
        total += n as u64;
    }
    file.flush()
        .await
        .map_err(|err| IngestError::Storage(StorageError::Io(err)))?;
    Ok(total)
}
