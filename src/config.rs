//! 命令行参数、环境变量与服务默认配置。

use clap::Parser;
use shadow_rs::formatcp;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::net::lookup_host;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_DATA_DIR: &str = "/var/lib/egami/data";
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 0;
pub const SERVER_NAME: &str = "Egami";
pub const UPLOAD_FIELD_NAME: &str = "file";
pub const SNIFF_PREFIX_LEN: usize = 8 * 1024;
pub const MAX_ID_ATTEMPTS: usize = 8;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// 服务的命令行参数与环境变量配置。
#[derive(Parser, Debug)]
#[command(name = "egami", version = VERSION_INFO, about = "Egami upload server")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "EGAMI_SERVER_HOST",
        default_value = DEFAULT_HOST,
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "EGAMI_SERVER_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Bind port"
    )]
    pub port: u16,
    #[arg(
        short = 'd',
        long,
        env = "EGAMI_DATA_DIRECTORY",
        default_value = DEFAULT_DATA_DIR,
        help = "Directory holding uploaded files"
    )]
    pub data_dir: String,
    #[arg(
        long,
        env = "EGAMI_USER_TOKEN",
        hide_env_values = true,
        help = "Bearer token required for uploads"
    )]
    pub user_token: Option<String>,
    #[arg(
        long,
        env = "EGAMI_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload request size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
}

/// 进程启动时构建一次、之后只读的运行配置。
#[derive(Clone, Debug)]
pub struct Settings {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub user_token: String,
    pub upload_max_size: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    MissingUserToken,
    InvalidHost(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingUserToken => {
                write!(f, "EGAMI_USER_TOKEN environment variable is not set")
            }
            ConfigError::InvalidHost(host) => write!(f, "invalid bind address: {host}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Args {
    /// 校验参数并转换为不可变的 [`Settings`]；主机名会解析为第一个可用地址。
    pub async fn into_settings(self) -> Result<Settings, ConfigError> {
        let user_token = self
            .user_token
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::MissingUserToken)?;
        let bind = resolve_bind(&self.host, self.port).await?;

        Ok(Settings {
            bind,
            data_dir: PathBuf::from(self.data_dir),
            user_token,
            upload_max_size: self.upload_max_size,
        })
    }
}

async fn resolve_bind(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let trimmed = host.trim();
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    if !is_hostname(trimmed) {
        return Err(ConfigError::InvalidHost(host.to_string()));
    }
    lookup_host((trimmed, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidHost(host.to_string()))
}

fn is_hostname(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(user_token: Option<&str>, host: &str) -> Args {
        Args {
            host: host.to_string(),
            port: DEFAULT_PORT,
            data_dir: DEFAULT_DATA_DIR.to_string(),
            user_token: user_token.map(str::to_string),
            upload_max_size: DEFAULT_UPLOAD_MAX_SIZE,
        }
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        assert_eq!(
            args(None, DEFAULT_HOST).into_settings().await.unwrap_err(),
            ConfigError::MissingUserToken
        );
        assert_eq!(
            args(Some("   "), DEFAULT_HOST)
                .into_settings()
                .await
                .unwrap_err(),
            ConfigError::MissingUserToken
        );
    }

    #[tokio::test]
    async fn token_is_kept_verbatim() {
        let settings = args(Some(" tok "), DEFAULT_HOST)
            .into_settings()
            .await
            .expect("settings");
        assert_eq!(settings.user_token, " tok ");
    }

    #[tokio::test]
    async fn invalid_host_is_rejected() {
        for host in ["", "   ", "not a host", "bad_host!", "-lead.example"] {
            let result = args(Some("secret"), host).into_settings().await;
            assert!(
                matches!(result, Err(ConfigError::InvalidHost(_))),
                "{host:?}"
            );
        }
    }

    #[tokio::test]
    async fn hostname_is_resolved() {
        let settings = args(Some("secret"), "localhost")
            .into_settings()
            .await
            .expect("settings");
        assert!(settings.bind.ip().is_loopback());
        assert_eq!(settings.bind.port(), DEFAULT_PORT);
    }

    #[tokio::test]
    async fn defaults_build_settings() {
        let settings = args(Some("secret"), DEFAULT_HOST)
            .into_settings()
            .await
            .expect("settings");
        assert_eq!(settings.bind.to_string(), "127.0.0.1:3333");
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/egami/data"));
        assert_eq!(settings.user_token, "secret");
        assert_eq!(settings.upload_max_size, 0);
    }

    #[tokio::test]
    async fn cli_flags_override_defaults() {
        let parsed = Args::try_parse_from([
            "egami",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--data-dir",
            "/tmp/egami",
            "--user-token",
            "abc",
        ])
        .expect("parse args");
        let settings = parsed.into_settings().await.expect("settings");
        assert_eq!(settings.bind.to_string(), "0.0.0.0:8080");
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/egami"));
        assert_eq!(settings.user_token, "abc");
    }
}
