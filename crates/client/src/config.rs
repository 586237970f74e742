//! # クライアント設定
//!
//! 環境変数からの設定読み込み。CLIフラグで個別に上書きできる。
//!
//! | 環境変数 | 既定値 |
//! |---------|-------|
//! | `RESIDENTITY_API_URL` | `http://localhost:8080` |
//! | `RESIDENTITY_DATA_DIR` | `$HOME/.residentity` |
//! | `RESIDENTITY_HASH_ALGORITHM` | `sha256` |
//! | `RESIDENTITY_KEY_CIPHER` | `aes-256-cbc` |
//! | `RESIDENTITY_HTTP_TIMEOUT_SECS` | `120` |

use std::path::PathBuf;
use std::time::Duration;

use residentity_crypto::{HashAlgorithm, KeyCipher, PRE_FULFILLMENT_HASH};

use crate::error::ClientError;

/// APIのベースURLの既定値
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// HTTPタイムアウトの既定値（秒）
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

/// キーペアを保存するファイル名
pub const KEYPAIRS_FILE: &str = "keypairs.json";

/// セッションを保存するファイル名
pub const SESSION_FILE: &str = "session.json";

/// クライアント設定
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// APIのベースURL（末尾スラッシュなし）
    pub api_url: String,
    /// 鍵ストア・セッションの保存先
    pub data_dir: PathBuf,
    /// 署名前ハッシュ
    pub hash_algorithm: HashAlgorithm,
    /// 新規キーレコードの暗号方式
    pub key_cipher: KeyCipher,
    /// HTTPリクエストごとのタイムアウト
    pub http_timeout: Duration,
}

impl ClientConfig {
    /// 環境変数から設定を読み込む。
    pub fn from_env() -> Result<Self, ClientError> {
        let api_url =
            std::env::var("RESIDENTITY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let data_dir = match std::env::var("RESIDENTITY_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => default_data_dir(),
        };

        let hash_algorithm = match std::env::var("RESIDENTITY_HASH_ALGORITHM") {
            Ok(name) => name.parse()?,
            Err(_) => PRE_FULFILLMENT_HASH,
        };

        let key_cipher = match std::env::var("RESIDENTITY_KEY_CIPHER") {
            Ok(name) => name.parse()?,
            Err(_) => KeyCipher::default(),
        };

        let http_timeout_secs = match std::env::var("RESIDENTITY_HTTP_TIMEOUT_SECS") {
            Ok(secs) => secs.parse::<u64>().map_err(|_| {
                ClientError::Validation(format!(
                    "RESIDENTITY_HTTP_TIMEOUT_SECSは正の整数である必要があります: {secs}"
                ))
            })?,
            Err(_) => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self::new(api_url, data_dir)
            .with_hash_algorithm(hash_algorithm)
            .with_key_cipher(key_cipher)
            .with_http_timeout(Duration::from_secs(http_timeout_secs)))
    }

    /// 既定値で設定を作る。
    pub fn new(api_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            data_dir: data_dir.into(),
            hash_algorithm: PRE_FULFILLMENT_HASH,
            key_cipher: KeyCipher::default(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_hash_algorithm(mut self, hash_algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = hash_algorithm;
        self
    }

    pub fn with_key_cipher(mut self, key_cipher: KeyCipher) -> Self {
        self.key_cipher = key_cipher;
        self
    }

    pub fn with_http_timeout(mut self, http_timeout: Duration) -> Self {
        self.http_timeout = http_timeout;
        self
    }

    /// キーペアファイルのパス
    pub fn keypairs_path(&self) -> PathBuf {
        self.data_dir.join(KEYPAIRS_FILE)
    }

    /// セッションファイルのパス
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".residentity")
}
