//! # Residentity 署名クライアント
//!
//! PDF文書を署名サーバー経由で台帳に登録する利用者側のクライアント。
//! 秘密鍵はクライアントの外に出さず、サーバーが用意した未署名トランザクションに
//! ローカルで署名してから送り返す。
//!
//! ## モジュール構成
//! - [`keystore`]: キーペアの生成・暗号化保存・復号
//! - [`api`]: HTTP API（アカウント・署名・検証）
//! - [`session`]: ログインセッション（`token` クッキー）とその永続化
//! - [`account`]: ログイン・登録・ログアウト
//! - [`flow`]: 署名フロー（状態機械）と検証フロー
//! - [`document`]: 署名対象のPDF文書
//! - [`config`]: 環境変数による設定

pub mod account;
pub mod api;
pub mod config;
pub mod document;
pub mod error;
pub mod flow;
pub mod keystore;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use api::{AccountApi, HttpApi, SignApi};
pub use config::ClientConfig;
pub use document::Document;
pub use error::ClientError;
pub use flow::{SignState, SignedArtifact, TransactionFlow, VerifyFlow, VerifyOutcome};
pub use keystore::{FileKeyStorage, KeyRecordStorage, KeyStore, MemoryKeyStorage};
pub use session::{Session, SessionStore};
