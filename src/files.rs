//! 已上传文件的只读访问：按文件名直接读取存储根目录下的普通文件。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::{fmt_http_date, parse_http_date};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::SNIFF_PREFIX_LEN;
use crate::error::ApiError;
use crate::etag::{etag_from_metadata, is_not_modified, truncate_to_secs};
use crate::sniff::{read_head, sniff_mime};
use crate::storage::Storage;

/// 读取已存储文件，支持 Range 与条件请求；目录与越界路径一律 404。
pub async fn serve_stored_file(
    Path(name): Path<String>,
    request_headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let target = storage.resolve_path_checked(&name).await.map_err(|err| {
        debug!(name, error = %err, "stored file lookup failed");
        not_found()
    })?;
    let metadata = fs::metadata(&target).await.map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }
    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::ETAG,
        HeaderValue::from_str(&etag).map_err(|_| header_error())?,
    );
    if let Some(modified) = modified {
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&fmt_http_date(modified)).map_err(|_| header_error())?,
        );
    }
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if is_not_modified(&request_headers, &etag, modified) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let mut file = File::open(&target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let content_type = content_type_for(&name, &mut file).await?;
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type).map_err(|_| header_error())?,
    );

    let if_range_matches = match request_headers
        .get(header::IF_RANGE)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) if value.starts_with("W/") || value.starts_with('"') => false,
        Some(value) => match parse_http_date(value) {
            Ok(date) => modified.is_some_and(|ts| truncate_to_secs(ts) <= date),
            Err(_) => false,
        },
        None => true,
    };

    let range = if if_range_matches {
        parse_range(request_headers.get(header::RANGE), file_size)?
    } else {
        None
    };

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(name, start, end, length, "range request accepted");
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        response_headers.insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {start}-{end}/{file_size}"))
                .map_err(|_| header_error())?,
        );
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        let stream = ReaderStream::new(file.take(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_size));
    debug!(name, size = file_size, "serving stored file");
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// 扩展名优先，其次按文件头探测；读取后将文件指针复位。
async fn content_type_for(name: &str, file: &mut File) -> Result<String, ApiError> {
    if let Some(mime) = mime_guess::from_path(name).first() {
        return Ok(mime.essence_str().to_string());
    }
    let head = read_head(file, SNIFF_PREFIX_LEN)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    file.seek(SeekFrom::Start(0))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(sniff_mime(&head)
        .unwrap_or("application/octet-stream")
        .to_string())
}

fn not_found() -> ApiError {
    ApiError::NotFound("not found".into())
}

fn header_error() -> ApiError {
    ApiError::Internal("failed to build response headers".into())
}

/// 解析单一区间的 Range 头。
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let Some(range) = value
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("bytes="))
    else {
        return Ok(None);
    };
    if range.contains(',') {
        return Ok(None);
    }
    if file_size == 0 {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }

    let (start_part, end_part) = range.split_once('-').unwrap_or((range, ""));
    let start_part = start_part.trim();
    let end_part = end_part.trim();

    let (start, end) = if start_part.is_empty() {
        let suffix: u64 = end_part
            .parse()
            .map_err(|_| ApiError::RangeNotSatisfiable(file_size))?;
        if suffix == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let start: u64 = start_part
            .parse()
            .map_err(|_| ApiError::RangeNotSatisfiable(file_size))?;
        let end: u64 = if end_part.is_empty() {
            file_size - 1
        } else {
            end_part
                .parse()
                .map_err(|_| ApiError::RangeNotSatisfiable(file_size))?
        };
        (start, end.min(file_size - 1))
    };

    if start > end || start >= file_size {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }

    Ok(Some((start, end)))
}
