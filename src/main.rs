//! Egami 服务入口。
//!
//! 带认证的上传服务：multipart 表单上传的文件以短随机名保存在扁平目录中，
//! 并可按该文件名公开读取。

mod auth;
mod config;
mod error;
mod etag;
mod files;
mod http;
mod ident;
mod logging;
mod routes;
mod sniff;
mod storage;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use crate::auth::AuthConfig;
use crate::config::{Args, SHUTDOWN_GRACE_SECS};
use crate::ident::RandomIds;
use crate::storage::Storage;
use crate::upload::UploadConfig;

shadow!(build);

/// 启动服务并阻塞直到收到退出信号。
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let settings = Args::parse().into_settings().await.map_err(|err| {
        error!(error = %err, "refusing to start");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
    })?;

    let storage = Arc::new(Storage::new(settings.data_dir.clone()));
    storage.ensure_root().await?;
    let auth_config = Arc::new(AuthConfig::new(settings.user_token.clone()));
    let upload_config = Arc::new(UploadConfig {
        ids: Arc::new(RandomIds),
        max_total_size: settings.upload_max_size,
    });

    info!(
        data_dir = %storage.root_path().display(),
        "listening on {}",
        settings.bind
    );
    let app = routes::build_router(storage, auth_config, upload_config);
    let handle = Handle::new();
    let server = axum_server::bind(settings.bind)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
