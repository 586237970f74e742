//! # セッション
//!
//! ログイン時にサーバーが設定する `token` クッキーを、明示的なセッションとして扱う。
//! トークンはUI側の表示制御（ログイン済みか）にのみ使い、認可はサーバーが行う。
//!
//! CLIの呼び出しをまたいでログイン状態を保つため、`session.json` に保存する。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// セッションクッキー名
pub const SESSION_COOKIE: &str = "token";

/// ログインセッション。
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl Session {
    /// 未ログインのセッション。
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// `Cookie` ヘッダ形式（`a=1; token=xyz`）の文字列からセッションを作る。
    ///
    /// 値はパーセントデコードする。
    pub fn from_cookie_header(header: &str) -> Self {
        let token = header.split(';').find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            (key == SESSION_COOKIE).then(|| percent_decode(value))
        });
        Self { token }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// 認証済みでなければ [`ClientError::NotLoggedIn`]。
    pub fn require_authenticated(&self) -> Result<&str, ClientError> {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ClientError::NotLoggedIn),
        }
    }
}

// トークンをログに出さない
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

// ---------------------------------------------------------------------------
// 永続化
// ---------------------------------------------------------------------------

/// セッションファイル。
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 保存済みセッションを読む。ファイルがなければ未ログイン。
    pub async fn load(&self) -> Result<Session, ClientError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ClientError::Storage(format!("{} のパースに失敗: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Session::anonymous()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, session: &Session) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(session)
            .map_err(|e| ClientError::Storage(format!("セッションのシリアライズに失敗: {e}")))?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// セッションファイルを削除する（存在しなくてもよい）。
    pub async fn clear(&self) -> Result<(), ClientError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
