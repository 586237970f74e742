//! # Residentity 暗号処理
//!
//! 文書署名クライアントが使用する暗号プリミティブを提供する。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | 署名 | Ed25519（32バイトシードから導出） |
//! | 署名前ハッシュ | SHA-256（既定） / SHA3-256 |
//! | 秘密鍵の保存時暗号化 | AES-256-CBC（互換形式） / AES-256-GCM（強化形式） |
//! | 鍵導出（GCM形式のみ） | HKDF-SHA256 |
//! | 公開鍵・シードの表現 | Base58 |

pub mod cipher;

use std::fmt;
use std::str::FromStr;

use base58::{FromBase58, ToBase58};
use ed25519_dalek::{Signer, Verifier};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

pub use ed25519_dalek::{
    Signature as Ed25519Signature, SigningKey as Ed25519SigningKey,
    VerifyingKey as Ed25519VerifyingKey,
};

pub use cipher::{decrypt_secret, encrypt_secret, password_key, KeyCipher};

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// パスワード長・文字種が不正
    #[error("パスワードは1〜32バイトのASCII文字列である必要があります")]
    InvalidPassword,
    /// 暗号化に失敗
    #[error("秘密鍵の暗号化に失敗しました")]
    EncryptError,
    /// 復号に失敗（パスワード誤り、または暗号文の破損）
    #[error("秘密鍵の復号に失敗しました")]
    DecryptError,
    /// 暗号文レコードの形式が不正
    #[error("暗号文レコードの形式が不正です: {0}")]
    MalformedRecord(String),
    /// 鍵のデコードに失敗
    #[error("鍵のデコードに失敗しました: {0}")]
    InvalidKey(String),
    /// Ed25519署名検証エラー
    #[error("Ed25519署名検証に失敗しました")]
    SignatureVerifyError,
    /// 未知のハッシュアルゴリズム名
    #[error("未対応のハッシュアルゴリズムです: {0}")]
    UnknownHashAlgorithm(String),
    /// 未知の暗号方式名
    #[error("未対応の暗号方式です: {0}")]
    UnknownCipher(String),
}

// ---------------------------------------------------------------------------
// ハッシュ
// ---------------------------------------------------------------------------

/// 署名前トランザクション（フルフィルメント除去後の正規化バイト列）に適用するハッシュ。
///
/// サーバー側の検証と同じアルゴリズムでなければ署名は受理されない。
/// 既定値は [`PRE_FULFILLMENT_HASH`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// SHA-256（既定）
    #[default]
    Sha256,
    /// SHA3-256
    Sha3_256,
}

/// 署名前ハッシュの既定アルゴリズム。
///
/// 変更するとサーバーが署名を受理しなくなる。設定 `RESIDENTITY_HASH_ALGORITHM` で上書きする。
pub const PRE_FULFILLMENT_HASH: HashAlgorithm = HashAlgorithm::Sha256;

impl HashAlgorithm {
    /// データのダイジェスト（32バイト）を計算する。
    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        match self {
            HashAlgorithm::Sha256 => sha256(data),
            HashAlgorithm::Sha3_256 => sha3_256(data),
        }
    }

    /// 設定ファイル・CLIで使う名前。
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha3_256 => "sha3-256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "sha3-256" | "sha3_256" | "sha3" => Ok(HashAlgorithm::Sha3_256),
            other => Err(CryptoError::UnknownHashAlgorithm(other.to_string())),
        }
    }
}

/// SHA-256ハッシュ計算。
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// SHA3-256ハッシュ計算。
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

// ---------------------------------------------------------------------------
// Ed25519
// ---------------------------------------------------------------------------

/// 新しいEd25519署名鍵をOS乱数から生成する。
pub fn generate_signing_key() -> Ed25519SigningKey {
    Ed25519SigningKey::generate(&mut rand::rngs::OsRng)
}

/// Ed25519による署名。
pub fn ed25519_sign(signing_key: &Ed25519SigningKey, message: &[u8]) -> Ed25519Signature {
    signing_key.sign(message)
}

/// Ed25519による署名検証。
pub fn ed25519_verify(
    verifying_key: &Ed25519VerifyingKey,
    message: &[u8],
    signature: &Ed25519Signature,
) -> Result<(), CryptoError> {
    verifying_key
        .verify(message, signature)
        .map_err(|_| CryptoError::SignatureVerifyError)
}

/// 署名鍵の32バイトシードをBase58で表現する。
pub fn seed_to_base58(signing_key: &Ed25519SigningKey) -> String {
    signing_key.to_bytes().to_base58()
}

/// 公開鍵をBase58で表現する。
pub fn public_key_to_base58(verifying_key: &Ed25519VerifyingKey) -> String {
    verifying_key.to_bytes().to_base58()
}

/// Base58のシードから署名鍵を復元する。
///
/// 64バイトの秘密鍵（シード || 公開鍵）が渡された場合は先頭32バイトをシードとして扱う。
pub fn signing_key_from_base58(seed_b58: &str) -> Result<Ed25519SigningKey, CryptoError> {
    let bytes = seed_b58
        .from_base58()
        .map_err(|e| CryptoError::InvalidKey(format!("Base58デコードに失敗: {e:?}")))?;
    if bytes.len() != 32 && bytes.len() != 64 {
        return Err(CryptoError::InvalidKey(format!(
            "シードは32バイトである必要があります（実際: {}バイト）",
            bytes.len()
        )));
    }
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes[..32]);
    Ok(Ed25519SigningKey::from_bytes(&seed))
}

/// Base58の公開鍵を検証用キーに変換する。
pub fn verifying_key_from_base58(public_key_b58: &str) -> Result<Ed25519VerifyingKey, CryptoError> {
    let bytes = public_key_b58
        .from_base58()
        .map_err(|e| CryptoError::InvalidKey(format!("Base58デコードに失敗: {e:?}")))?;
    verifying_key_from_bytes(&bytes)
}

/// 生バイト列の公開鍵を検証用キーに変換する。
pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<Ed25519VerifyingKey, CryptoError> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "公開鍵は32バイトである必要があります（実際: {}バイト）",
            bytes.len()
        ))
    })?;
    Ed25519VerifyingKey::from_bytes(&arr)
        .map_err(|e| CryptoError::InvalidKey(format!("公開鍵が曲線上にありません: {e}")))
}
