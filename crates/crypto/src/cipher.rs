//! # 秘密鍵レコードの暗号化
//!
//! ローカルに保存する秘密鍵シード（Base58文字列）をユーザーのパスワードで暗号化する。
//!
//! ## レコード形式
//! | 方式 | 形式 |
//! |------|------|
//! | AES-256-CBC（互換） | `<IV 16B hex>:<暗号文 hex>` |
//! | AES-256-GCM（強化） | `aes-256-gcm:<salt 16B hex>:<nonce 12B hex>:<暗号文+タグ hex>` |
//!
//! 鍵はパスワード（ASCII 1〜32バイト）を32バイトまでゼロ埋めしたもの。
//! GCM形式ではさらにHKDF-SHA256でレコードごとのsaltと混ぜて導出する。
//!
//! CBC形式は改ざん検知を持たない。誤ったパスワードでの復号はパディングエラーか
//! 意味のない平文となり、呼び出し側は平文の妥当性（Base58・鍵導出）で判定する。

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// パスワードから作る鍵の長さ（AES-256の鍵長）
pub const PASSWORD_KEY_LEN: usize = 32;

/// CBCの初期化ベクトル長
pub const CBC_IV_LEN: usize = 16;

/// GCMのnonce長
pub const GCM_NONCE_LEN: usize = 12;

/// GCM形式のsalt長
pub const GCM_SALT_LEN: usize = 16;

/// GCM形式レコードの識別子
pub const GCM_RECORD_PREFIX: &str = "aes-256-gcm";

const HKDF_INFO: &[u8] = b"residentity-keystore";

/// 新規レコードの暗号方式。復号時はレコード形式から自動判別する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyCipher {
    /// AES-256-CBC（互換形式）
    #[default]
    Aes256Cbc,
    /// AES-256-GCM（認証付き暗号）
    Aes256Gcm,
}

impl KeyCipher {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyCipher::Aes256Cbc => "aes-256-cbc",
            KeyCipher::Aes256Gcm => GCM_RECORD_PREFIX,
        }
    }
}

impl fmt::Display for KeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyCipher {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-256-cbc" | "cbc" => Ok(KeyCipher::Aes256Cbc),
            "aes-256-gcm" | "gcm" => Ok(KeyCipher::Aes256Gcm),
            other => Err(CryptoError::UnknownCipher(other.to_string())),
        }
    }
}

/// パスワードを32バイトの鍵にゼロ埋めする。
///
/// パスワードはASCIIで1〜32バイトでなければならない。
pub fn password_key(password: &str) -> Result<[u8; PASSWORD_KEY_LEN], CryptoError> {
    let bytes = password.as_bytes();
    if !password.is_ascii() || bytes.is_empty() || bytes.len() > PASSWORD_KEY_LEN {
        return Err(CryptoError::InvalidPassword);
    }
    let mut key = [0u8; PASSWORD_KEY_LEN];
    key[..bytes.len()].copy_from_slice(bytes);
    Ok(key)
}

/// 秘密鍵シードを暗号化し、レコード文字列を返す。
///
/// IV・nonce・saltは呼び出しごとにOS乱数から生成する。
pub fn encrypt_secret(
    secret: &str,
    password: &str,
    cipher: KeyCipher,
) -> Result<String, CryptoError> {
    let key = password_key(password)?;
    match cipher {
        KeyCipher::Aes256Cbc => {
            let mut iv = [0u8; CBC_IV_LEN];
            rand::rngs::OsRng.fill_bytes(&mut iv);
            encrypt_cbc(secret, &key, &iv)
        }
        KeyCipher::Aes256Gcm => {
            let mut salt = [0u8; GCM_SALT_LEN];
            let mut nonce = [0u8; GCM_NONCE_LEN];
            rand::rngs::OsRng.fill_bytes(&mut salt);
            rand::rngs::OsRng.fill_bytes(&mut nonce);
            encrypt_gcm(secret, &key, &salt, &nonce)
        }
    }
}

/// レコード文字列を復号し、秘密鍵シードを返す。
pub fn decrypt_secret(record: &str, password: &str) -> Result<String, CryptoError> {
    let key = password_key(password)?;
    let plaintext = match record.strip_prefix(GCM_RECORD_PREFIX) {
        Some(rest) => {
            let rest = rest.strip_prefix(':').ok_or_else(|| {
                CryptoError::MalformedRecord("GCMレコードの区切り文字がありません".into())
            })?;
            decrypt_gcm(rest, &key)?
        }
        None => decrypt_cbc(record, &key)?,
    };
    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptError)
}

fn encrypt_cbc(
    secret: &str,
    key: &[u8; PASSWORD_KEY_LEN],
    iv: &[u8; CBC_IV_LEN],
) -> Result<String, CryptoError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| CryptoError::EncryptError)?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(secret.as_bytes());
    Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
}

fn decrypt_cbc(record: &str, key: &[u8; PASSWORD_KEY_LEN]) -> Result<Vec<u8>, CryptoError> {
    let (iv_hex, ciphertext_hex) = record
        .split_once(':')
        .ok_or_else(|| CryptoError::MalformedRecord("IVの区切り文字がありません".into()))?;
    let iv = decode_hex_field("IV", iv_hex)?;
    if iv.len() != CBC_IV_LEN {
        return Err(CryptoError::MalformedRecord(format!(
            "IVは{CBC_IV_LEN}バイトである必要があります（実際: {}バイト）",
            iv.len()
        )));
    }
    let ciphertext = decode_hex_field("暗号文", ciphertext_hex)?;
    if ciphertext.is_empty() {
        return Err(CryptoError::MalformedRecord("暗号文が空です".into()));
    }

    let cipher =
        Aes256CbcDec::new_from_slices(key, &iv).map_err(|_| CryptoError::DecryptError)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::DecryptError)
}

/// GCM用の鍵をHKDF-SHA256で導出する。
fn gcm_key(
    password_key: &[u8; PASSWORD_KEY_LEN],
    salt: &[u8],
) -> Result<[u8; 32], CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), password_key);
    let mut key = [0u8; 32];
    hkdf.expand(HKDF_INFO, &mut key)
        .map_err(|_| CryptoError::EncryptError)?;
    Ok(key)
}

fn encrypt_gcm(
    secret: &str,
    key: &[u8; PASSWORD_KEY_LEN],
    salt: &[u8; GCM_SALT_LEN],
    nonce: &[u8; GCM_NONCE_LEN],
) -> Result<String, CryptoError> {
    let derived = gcm_key(key, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&derived).map_err(|_| CryptoError::EncryptError)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce), secret.as_bytes())
        .map_err(|_| CryptoError::EncryptError)?;
    Ok(format!(
        "{GCM_RECORD_PREFIX}:{}:{}:{}",
        hex::encode(salt),
        hex::encode(nonce),
        hex::encode(ciphertext)
    ))
}

fn decrypt_gcm(fields: &str, key: &[u8; PASSWORD_KEY_LEN]) -> Result<Vec<u8>, CryptoError> {
    let parts: Vec<&str> = fields.split(':').collect();
    let [salt_hex, nonce_hex, ciphertext_hex] = parts.as_slice() else {
        return Err(CryptoError::MalformedRecord(format!(
            "GCMレコードは3フィールドである必要があります（実際: {}）",
            parts.len()
        )));
    };
    let salt = decode_hex_field("salt", salt_hex)?;
    if salt.len() != GCM_SALT_LEN {
        return Err(CryptoError::MalformedRecord(format!(
            "saltは{GCM_SALT_LEN}バイトである必要があります（実際: {}バイト）",
            salt.len()
        )));
    }
    let nonce = decode_hex_field("nonce", nonce_hex)?;
    if nonce.len() != GCM_NONCE_LEN {
        return Err(CryptoError::MalformedRecord(format!(
            "nonceは{GCM_NONCE_LEN}バイトである必要があります（実際: {}バイト）",
            nonce.len()
        )));
    }
    let ciphertext = decode_hex_field("暗号文", ciphertext_hex)?;

    let derived = gcm_key(key, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&derived).map_err(|_| CryptoError::DecryptError)?;
    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptError)
}

fn decode_hex_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(value)
        .map_err(|e| CryptoError::MalformedRecord(format!("{name}の16進デコードに失敗: {e}")))
}
