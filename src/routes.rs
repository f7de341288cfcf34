//! 路由表、公开路由分类与中间件装配顺序。

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::{Method, Request};
use axum::routing::{any, get, post};
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::auth::{self, AuthConfig};
use crate::files;
use crate::http::{add_server_headers, client_ip};
use crate::storage::Storage;
use crate::upload::{self, UploadConfig};

pub const HEALTH_BODY: &str = "OK\n";
pub const GREETING_BODY: &str = "Egami is running\n";

/// 访问控制需要区分的路由。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Health,
    Greeting,
    StoredFile,
    Upload,
    Other,
}

/// 无需令牌即可访问的路由。
pub const PUBLIC_ROUTES: [Route; 3] = [Route::Health, Route::Greeting, Route::StoredFile];

impl Route {
    pub fn classify(method: &Method, path: &str) -> Self {
        match path {
            "/health" => Route::Health,
            "/" => Route::Greeting,
            "/upload" if method == Method::POST => Route::Upload,
            _ if method == Method::GET || method == Method::HEAD => Route::StoredFile,
            _ => Route::Other,
        }
    }

    pub fn is_public(self) -> bool {
        PUBLIC_ROUTES.contains(&self)
    }
}

/// 组装完整应用：trace → 响应头 → 访问控制 → 路由。
pub fn build_router(
    storage: Arc<Storage>,
    auth: Arc<AuthConfig>,
    upload: Arc<UploadConfig>,
) -> Router {
    let body_limit = match upload.max_total_size {
        0 => DefaultBodyLimit::disable(),
        limit => DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX)),
    };

    Router::new()
        .route("/health", any(health))
        .route("/", any(greeting))
        .route("/upload", post(upload::upload_files).layer(body_limit))
        .route("/{*name}", get(files::serve_stored_file))
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(middleware::from_fn(add_server_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = client_ip(request),
                        method = %request.method(),
                        path = request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(auth))
        .layer(Extension(upload))
}

async fn health() -> &'static str {
    HEALTH_BODY
}

async fn greeting() -> &'static str {
    GREETING_BODY
}
