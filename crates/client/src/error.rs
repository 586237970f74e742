//! # クライアントエラー型
//!
//! 署名パイプラインの全エラーを1つの列挙にまとめる。各フェーズは失敗時に処理を中断し、
//! 利用者には [`ClientError`] の表示文字列が1つだけ提示される。自動リトライは行わない。

use residentity_core::{CodecError, SignError};
use residentity_crypto::CryptoError;

/// サーバーがメッセージを返さなかった場合に表示する文言
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred. Please try again later.";

/// クライアントエラー型
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// 入力値（パスワード長、メールアドレス等）が不正
    #[error("{0}")]
    Validation(String),
    /// 正規化・フルフィルメントのエンコードに失敗
    #[error("エンコードに失敗しました: {0}")]
    Encoding(String),
    /// 暗号文レコードの破損、またはパスワード誤り
    #[error("秘密鍵を復号できません。パスワードを確認してください")]
    Decryption,
    /// 公開鍵に対応するレコードがない
    #[error("No private key found for the given public key: {public_key}")]
    KeyNotFound {
        public_key: String,
    },
    /// 入力の署名者の鍵を保持していない
    #[error("Public key {public_key} is not a pair with your private key")]
    UnauthorizedSigner {
        public_key: String,
    },
    /// APIとの通信に失敗（サーバーのメッセージ、または汎用メッセージ）
    #[error("{0}")]
    Network(String),
    /// 文書ファイルが未選択・不正
    #[error("{0}")]
    FileSelection(String),
    /// 鍵ストア・セッションの永続化に失敗
    #[error("ストレージ操作に失敗しました: {0}")]
    Storage(String),
    /// ログインしていない
    #[error("ログインが必要です")]
    NotLoggedIn,
}

impl ClientError {
    /// サーバーが提示したメッセージ。なければ汎用メッセージ。
    pub fn network(message: Option<String>) -> Self {
        ClientError::Network(message.unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()))
    }
}

impl From<CryptoError> for ClientError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidPassword => ClientError::Validation(e.to_string()),
            CryptoError::UnknownHashAlgorithm(_) | CryptoError::UnknownCipher(_) => {
                ClientError::Validation(e.to_string())
            }
            CryptoError::DecryptError
            | CryptoError::MalformedRecord(_)
            | CryptoError::InvalidKey(_)
            | CryptoError::SignatureVerifyError => ClientError::Decryption,
            CryptoError::EncryptError => ClientError::Encoding(e.to_string()),
        }
    }
}

impl From<CodecError> for ClientError {
    fn from(e: CodecError) -> Self {
        ClientError::Encoding(e.to_string())
    }
}

impl From<SignError> for ClientError {
    fn from(e: SignError) -> Self {
        match e {
            SignError::UnauthorizedSigner { public_key } => {
                ClientError::UnauthorizedSigner { public_key }
            }
            SignError::Codec(e) => e.into(),
            other => ClientError::Encoding(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}
