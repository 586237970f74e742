//! # 署名・検証フロー
//!
//! ## 署名フローの状態遷移
//! ```text
//! Idle → Uploading → Initializing → Preparing → Signing → Committing → Done
//!            │             │             │           │          │
//!            └─────────────┴─────────────┴───────────┴──────────┴──→ Failed
//! ```
//!
//! - 各フェーズは前のフェーズの出力が揃ってから1回だけ実行する（先行実行・自動リトライなし）
//! - `Done` と `Failed` は終端。やり直す場合は [`TransactionFlow::reset`] で `Idle` に戻す
//!
//! 検証は1回のアップロードで完結するため [`VerifyFlow`] は状態を持たない。

mod sign;
mod verify;


pub use sign::{SignedArtifact, TransactionFlow, MIN_SIGN_PASSWORD_LEN};
pub use verify::{VerifyFlow, VerifyOutcome};

use std::fmt;

/// 署名フローの状態。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignState {
    /// 文書未選択
    Idle,
    /// 文書選択済み（通信前）
    Uploading,
    /// `initial` 呼び出し中
    Initializing,
    /// `prepare` 呼び出し中
    Preparing,
    /// ローカルで署名中
    Signing,
    /// `commit` 呼び出し中
    Committing,
    /// 署名済み文書を受け取った
    Done,
    /// いずれかのフェーズで失敗した（利用者に表示するメッセージ）
    Failed(String),
}

impl SignState {
    /// 終端状態か。
    pub fn is_terminal(&self) -> bool {
        matches!(self, SignState::Done | SignState::Failed(_))
    }

    /// 進行中に表示する文言。
    pub fn status_message(&self) -> Option<&'static str> {
        match self {
            SignState::Initializing => Some("Initializing sign process..."),
            SignState::Preparing | SignState::Signing => Some("Signing in progress..."),
            SignState::Committing => Some("Committing sign..."),
            SignState::Done => Some("Sign successful!"),
            _ => None,
        }
    }
}

impl fmt::Display for SignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignState::Idle => f.write_str("idle"),
            SignState::Uploading => f.write_str("uploading"),
            SignState::Initializing => f.write_str("initializing"),
            SignState::Preparing => f.write_str("preparing"),
            SignState::Signing => f.write_str("signing"),
            SignState::Committing => f.write_str("committing"),
            SignState::Done => f.write_str("done"),
            SignState::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}
