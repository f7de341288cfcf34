//! 访问控制：公开路由直接放行，其余路由校验 Bearer 令牌。

use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::{body::Body as AxumBody, middleware};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::routes::Route;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug)]
pub struct AuthConfig {
    token: String,
}

impl AuthConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// 仅接受形如 `Bearer <token>` 且令牌完全一致的请求头。
    pub fn accepts(&self, value: Option<&HeaderValue>) -> bool {
        value
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .is_some_and(|token| token == self.token)
    }
}

/// 认证中间件。
pub async fn auth_middleware(
    Extension(auth): Extension<Arc<AuthConfig>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<axum::response::Response, ApiError> {
    let route = Route::classify(req.method(), req.uri().path());
    if route.is_public() {
        return Ok(next.run(req).await);
    }

    if auth.accepts(req.headers().get(header::AUTHORIZATION)) {
        return Ok(next.run(req).await);
    }

    debug!(?route, path = req.uri().path(), "rejected unauthenticated request");
    let mut headers = HeaderMap::new();
    headers.insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(r#"Bearer realm="Egami""#),
    );
    Err(ApiError::Unauthorized(headers))
}

#[cfg(test)]
mod tests {
    use super::AuthConfig;
    use axum::http::HeaderValue;

    #[test]
    fn accepts_exact_bearer_token() {
        let auth = AuthConfig::new("s3cret");
        let value = HeaderValue::from_static("Bearer s3cret");
        assert!(auth.accepts(Some(&value)));
    }

    #[test]
    fn rejects_everything_else() {
        let auth = AuthConfig::new("s3cret");
        for candidate in [
            "bearer s3cret",
            "Bearer s3cre",
            "Bearer s3cret2",
            "Bearer  s3cret",
            "Basic s3cret",
            "s3cret",
            "Bearer ",
        ] {
            let value = HeaderValue::from_static(candidate);
            assert!(!auth.accepts(Some(&value)), "{candidate} should be rejected");
        }
        assert!(!auth.accepts(None));
    }
}
