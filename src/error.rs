//! 统一的 API 错误类型与转换。

use axum::extract::multipart::MultipartError;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::upload::IngestError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    PayloadTooLarge,
    RangeNotSatisfiable(u64),
    Unauthorized(HeaderMap),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            ApiError::PayloadTooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "upload too large").into_response()
            }
            ApiError::RangeNotSatisfiable(size) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
                (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    headers,
                    "range not satisfiable",
                )
                    .into_response()
            }
            ApiError::Unauthorized(headers) => {
                (StatusCode::UNAUTHORIZED, headers, "unauthorized").into_response()
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::InvalidContentType => ApiError::BadRequest("invalid content-type".into()),
            IngestError::NoFilesUploaded => ApiError::BadRequest("no files uploaded".into()),
            IngestError::MultipartRead(err) => {
                let too_large = err
                    .get_ref()
                    .and_then(|inner| inner.downcast_ref::<MultipartError>())
                    .is_some_and(|inner| inner.status() == StatusCode::PAYLOAD_TOO_LARGE);
                if too_large {
                    ApiError::PayloadTooLarge
                } else {
                    ApiError::Internal("error reading multipart data".into())
                }
            }
            IngestError::Storage(_) | IngestError::IdentifiersExhausted => {
                ApiError::Internal("error saving file".into())
            }
            IngestError::Serialization(_) => {
                ApiError::Internal("error preparing response".into())
            }
        }
    }
}
