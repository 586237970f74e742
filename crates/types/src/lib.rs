//! # Residentity 共有型定義
//!
//! 署名クライアント・APIサーバー間でやり取りされるデータ構造をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - Base58: 公開鍵、秘密鍵シード（人間が読みやすく、紛らわしい文字を除外）
//! - Base64url: フルフィルメント（バイナリのDER風エンコーディング）
//!
//! ## 未知フィールドの扱い
//! サーバーが返すトランザクションには本クレートが関知しないフィールドが含まれる。
//! 署名対象の正規化バイト列を変えないよう、未知フィールドは `extra` に保持して
//! そのまま往復させる。

use serde::{Deserialize, Deserializer, Serialize};

/// JSONオブジェクト（未知フィールドの保持先）
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// 「フィールドが存在する」ことを `Some` で表すデシリアライザ。
///
/// `#[serde(default)]` と組み合わせ、欠落 → `None`、`null` → `Some(None)`、
/// 値あり → `Some(Some(v))` を区別する。
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// トランザクション
// ---------------------------------------------------------------------------

/// `prepare` が返す未署名トランザクション、および `commit` に送る署名済みトランザクション。
///
/// トランザクションIDは常に `asset.data.document_digest` と同一になる
/// （トランザクション自身のハッシュではなく文書のコンテンツハッシュがIDとなる）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// トランザクションID。
    /// 外側の `None` はフィールド欠落、`Some(None)` は `null` を表す。
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub id: Option<Option<String>>,
    /// 入力の一覧（順序は署名後も保持される）
    pub inputs: Vec<Input>,
    /// アセット（文書ダイジェストを含む）
    pub asset: Asset,
    /// 上記以外のフィールド（operation, outputs, metadata, version 等）
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl Transaction {
    /// 文書のコンテンツハッシュ。
    pub fn document_digest(&self) -> &str {
        &self.asset.data.document_digest
    }

    /// 設定済みのトランザクションID（欠落・`null` の場合は `None`）。
    pub fn id(&self) -> Option<&str> {
        self.id.as_ref().and_then(|id| id.as_deref())
    }

    /// 全入力にフルフィルメントが設定済みか。
    pub fn is_fully_signed(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(|input| input.fulfillment.is_some())
    }
}

/// トランザクション入力。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// 直前の所有者の公開鍵（Base58）。先頭要素がこの入力の署名者となる。
    pub owners_before: Vec<String>,
    /// Base64urlエンコードされたフルフィルメント。署名前は `null`。
    #[serde(default)]
    pub fulfillment: Option<String>,
    /// 上記以外のフィールド（fulfills 等）
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl Input {
    /// この入力の署名者（`owners_before[0]`）。
    pub fn signer(&self) -> Option<&str> {
        self.owners_before.first().map(String::as_str)
    }
}

/// トランザクションのアセット。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// アセットデータ
    pub data: AssetData,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// アセットデータ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetData {
    /// サーバーが計算した文書のコンテンツハッシュ
    pub document_digest: String,
    #[serde(flatten)]
    pub extra: JsonMap,
}

// ---------------------------------------------------------------------------
// キーペアレコード
// ---------------------------------------------------------------------------

/// ローカルに永続化されるキーペアレコード。公開鍵が主キー（一意）。
///
/// 作成後は更新されない。読み出しは署名のたびに行われる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeypairRecord {
    /// Base58エンコードされたEd25519公開鍵
    #[serde(rename = "publicKey")]
    pub public_key: String,
    /// パスワードで暗号化された秘密鍵シード（Base58文字列の暗号文レコード）
    #[serde(rename = "encryptedPrivateKey")]
    pub encrypted_private_key: String,
}

// ---------------------------------------------------------------------------
// API リクエスト/レスポンス
// ---------------------------------------------------------------------------

/// 成功レスポンスの外殻。全JSONエンドポイントは `{ "data": ... }` を返す。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// レスポンス本体
    pub data: T,
}

/// 失敗レスポンス本文。
///
/// 署名系エンドポイントは `{ "error": { "message": ... } }`、
/// ログインは `{ "message": ... }` を返す。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// サーバーが提示したメッセージ（`error.message` を優先）。
    pub fn into_message(self) -> Option<String> {
        self.error
            .and_then(|detail| detail.message)
            .or(self.message)
            .filter(|message| !message.is_empty())
    }
}

/// 失敗レスポンスの詳細。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

/// POST /api/login リクエスト。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/register リクエスト。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    /// クライアントで生成したEd25519公開鍵（Base58）
    pub public_key: String,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub state: String,
    pub country_code: String,
    pub organization: String,
}

/// POST /api/register レスポンス。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/me レスポンス。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// POST /api/sign/initial リクエスト。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialRequest {
    pub password: String,
}

/// POST /api/sign/initial レスポンス。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialResponse {
    /// セッション・パスワードに紐づく署名者の公開鍵（Base58）
    pub public_key: String,
}

/// POST /api/sign/verify レスポンス。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// 所有者情報（改行区切り）
    pub ownership: String,
}
