//! リモートデバッガの設定
//!
//! 既定値の上に環境変数（`TSUNAGI_RDB_*`）を重ね、さらに呼び出し側がビルダーで上書きします。

use crate::error::ConfigError;
use std::env;
use std::time::Duration;

pub const ENV_BIND: &str = "TSUNAGI_RDB_BIND";
pub const ENV_HOST: &str = "TSUNAGI_RDB_HOST";
pub const ENV_PORT: &str = "TSUNAGI_RDB_PORT";
pub const ENV_PATCH_STDIO: &str = "TSUNAGI_RDB_PATCH_STDIO";
pub const ENV_ACCEPT_TIMEOUT: &str = "TSUNAGI_RDB_ACCEPT_TIMEOUT";
pub const ENV_CONNECT_TIMEOUT: &str = "TSUNAGI_RDB_CONNECT_TIMEOUT";

pub const DEFAULT_PORT: u16 = 8268;

/// リモートデバッガの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// サーバーが待ち受けるインターフェース
    pub bind_to: String,
    /// クライアントが接続するホスト
    pub host: String,
    pub port: u16,
    /// 標準入出力（fd 0/1/2）をソケットに差し替えるか
    pub patch_stdio: bool,
    /// 接続を待つ上限（`None` なら無期限）
    pub accept_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bind_to: "0.0.0.0".to_string(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            patch_stdio: true,
            accept_timeout: None,
            connect_timeout: None,
        }
    }
}

impl RemoteConfig {
    /// 既定値に環境変数を重ねた設定を作る
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意の参照関数から設定を作る
    ///
    /// 値が空文字列の変数は設定されていないものとして扱います。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(bind_to) = get(ENV_BIND) {
            config.bind_to = bind_to;
        }
        if let Some(host) = get(ENV_HOST) {
            config.host = host;
        }
        if let Some(value) = get(ENV_PORT) {
            config.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort { var: ENV_PORT, value })?;
        }
        if let Some(value) = get(ENV_PATCH_STDIO) {
            config.patch_stdio = parse_bool(ENV_PATCH_STDIO, value)?;
        }
        if let Some(value) = get(ENV_ACCEPT_TIMEOUT) {
            config.accept_timeout = Some(parse_seconds(ENV_ACCEPT_TIMEOUT, value)?);
        }
        if let Some(value) = get(ENV_CONNECT_TIMEOUT) {
            config.connect_timeout = Some(parse_seconds(ENV_CONNECT_TIMEOUT, value)?);
        }

        Ok(config)
    }

    pub fn with_bind_to(mut self, bind_to: impl Into<String>) -> Self {
        self.bind_to = bind_to.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_patch_stdio(mut self, patch_stdio: bool) -> Self {
        self.patch_stdio = patch_stdio;
        self
    }

    pub fn with_accept_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.accept_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}

/// 秒数（小数可）をパースする
///
/// 負の値、NaN、`Duration` に収まらない値はエラーになります。
pub fn parse_seconds(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.trim().parse::<f64>().map(Duration::try_from_secs_f64) {
        Ok(Ok(duration)) => Ok(duration),
        _ => Err(ConfigError::InvalidTimeout { var, value }),
    }
}
