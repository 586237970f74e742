//! # Residentity Core
//!
//! 署名対象の正規化、フルフィルメントのエンコード、トランザクション署名を実装する。
//!
//! ## 署名フロー
//! 1. 全入力の `fulfillment` を `null` にしたコピーを作る
//! 2. キーを再帰的にソートしたJSONに正規化する
//! 3. 正規化バイト列をハッシュする（[`residentity_crypto::HashAlgorithm`]）
//! 4. 入力ごとに `owners_before[0]` の鍵でダイジェストにEd25519署名する
//! 5. 公開鍵と署名をDER風にエンコードし、Base64urlで `fulfillment` に設定する
//! 6. トランザクションIDを `asset.data.document_digest` にする
//!
//! ネットワーク・ストレージには触れない純粋な処理のみを含む。

pub mod canonical;
pub mod fulfillment;
pub mod signer;

pub use canonical::{canonical_string, canonicalize, strip_fulfillments, CanonicalValue};
pub use fulfillment::{
    decode_fulfillment_payload, encode_fulfillment_payload, encode_length,
    fulfillment_from_base64url, fulfillment_to_base64url, FulfillmentPayload,
};
pub use signer::{KeyMap, Signer};

/// 正規化・エンコードのエラー型
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSONとして表現できない値
    #[error("エンコードに失敗しました: {0}")]
    Encoding(String),
    /// DER長さフィールドの上限超過
    #[error("エンコード可能な長さを超えています: {0}バイト")]
    LengthOverflow(usize),
    /// 必須フィールドが空
    #[error("必須フィールドが空です: {0}")]
    MissingField(&'static str),
    /// フルフィルメントの形式が不正
    #[error("フルフィルメントの形式が不正です: {0}")]
    Malformed(String),
}

/// 署名・検証のエラー型
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// 正規化・エンコードに失敗
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// 署名者の鍵を保持していない
    #[error("この文書に署名する権限がありません: {public_key}")]
    UnauthorizedSigner {
        /// `owners_before[0]` の公開鍵（Base58）
        public_key: String,
    },
    /// 入力に署名者が指定されていない
    #[error("入力 {index} に owners_before がありません")]
    MissingOwner {
        /// 入力のインデックス
        index: usize,
    },
    /// トランザクションに入力がない
    #[error("トランザクションに入力がありません")]
    NoInputs,
    /// 公開鍵・署名のデコードに失敗
    #[error("入力 {index} のフルフィルメントが不正です: {reason}")]
    InvalidFulfillment {
        /// 入力のインデックス
        index: usize,
        /// 理由
        reason: String,
    },
    /// 署名が一致しない
    #[error("入力 {index} の署名検証に失敗しました")]
    SignatureMismatch {
        /// 入力のインデックス
        index: usize,
    },
    /// トランザクションIDが文書ダイジェストと一致しない
    #[error("トランザクションIDが文書ダイジェストと一致しません")]
    IdMismatch,
    /// 署名の前後で署名対象が変化した
    #[error("署名対象がprepare時のトランザクションと一致しません")]
    PayloadMismatch,
}
