//! ETag 计算与条件请求判断。

use axum::http::{HeaderMap, header};
use httpdate::parse_http_date;
use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

/// 根据文件元数据生成弱 ETag。
pub fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    if let Ok(modified) = metadata.modified()
        && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
    {
        return format!(
            "W/\"{}-{}-{}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        );
    }
    format!("W/\"{}\"", size)
}

/// 判断缓存副本是否仍然有效（`If-None-Match` 优先于 `If-Modified-Since`）。
pub fn is_not_modified(headers: &HeaderMap, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        return value.trim() == "*" || etag_matches(value, etag);
    }

    let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_http_date(v).ok())
    else {
        return false;
    };
    modified.is_some_and(|modified| truncate_to_secs(modified) <= since)
}

fn etag_matches(header_value: &str, current: &str) -> bool {
    header_value
        .split(',')
        .map(|item| item.trim())
        .any(|item| item == current)
}

/// HTTP 日期只精确到秒。
pub fn truncate_to_secs(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => UNIX_EPOCH + std::time::Duration::from_secs(duration.as_secs()),
        Err(_) => time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use httpdate::fmt_http_date;
    use std::time::Duration;

    #[test]
    fn matching_etag_is_not_modified() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("W/\"1\", W/\"3-10-0\""),
        );
        assert!(is_not_modified(&headers, "W/\"3-10-0\"", None));
        assert!(!is_not_modified(&headers, "W/\"4-10-0\"", None));
    }

    #[test]
    fn if_modified_since_compares_whole_seconds() {
        let modified = UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        let mut headers = HeaderMap::new();
        let value = fmt_http_date(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&value).expect("header"),
        );
        assert!(is_not_modified(&headers, "W/\"x\"", Some(modified)));

        let later = modified + Duration::from_secs(5);
        assert!(!is_not_modified(&headers, "W/\"x\"", Some(later)));
    }

    #[test]
    fn no_conditional_headers_means_modified() {
        assert!(!is_not_modified(&HeaderMap::new(), "W/\"x\"", Some(SystemTime::now())));
    }
}
