//! # 鍵ストア
//!
//! Ed25519キーペアの生成、秘密鍵シードのパスワード暗号化、公開鍵をキーにした永続化と
//! 署名時の復号を行う。
//!
//! 永続化先は [`KeyRecordStorage`] トレイトで抽象化する（`put` / `get_all` のみ）。
//! レコードは追加のみで、作成後に更新されることはない。
//!
//! - [`FileKeyStorage`]: データディレクトリ内のJSONファイル
//! - [`MemoryKeyStorage`]: プロセス内（テスト・一時利用）

pub mod file;
pub mod memory;

pub use file::FileKeyStorage;
pub use memory::MemoryKeyStorage;

use residentity_core::KeyMap;
use residentity_crypto::{
    decrypt_secret, encrypt_secret, generate_signing_key, password_key, public_key_to_base58,
    seed_to_base58, signing_key_from_base58, KeyCipher,
};
use residentity_types::KeypairRecord;

use crate::error::ClientError;

/// キーペアレコードの永続化インターフェース。
///
/// 公開鍵は一意。同じ公開鍵のレコードを再度 `put` した場合はエラーとする。
#[async_trait::async_trait]
pub trait KeyRecordStorage: Send + Sync {
    /// レコードを追加する。
    async fn put(&self, record: KeypairRecord) -> Result<(), ClientError>;

    /// 全レコードを追加順に返す。
    async fn get_all(&self) -> Result<Vec<KeypairRecord>, ClientError>;
}

/// 鍵ストア。
pub struct KeyStore {
    storage: Box<dyn KeyRecordStorage>,
    cipher: KeyCipher,
}

impl KeyStore {
    /// `cipher` は新規レコードの暗号方式。既存レコードは形式を自動判別して復号する。
    pub fn new(storage: Box<dyn KeyRecordStorage>, cipher: KeyCipher) -> Self {
        Self { storage, cipher }
    }

    pub fn cipher(&self) -> KeyCipher {
        self.cipher
    }

    /// 新しいキーペアを生成し、暗号化した秘密鍵を保存してからレコードを返す。
    pub async fn generate_keypair(&self, password: &str) -> Result<KeypairRecord, ClientError> {
        password_key(password)?;

        let signing_key = generate_signing_key();
        let public_key = public_key_to_base58(&signing_key.verifying_key());
        let encrypted_private_key = self.encrypt(&seed_to_base58(&signing_key), password)?;

        let record = KeypairRecord {
            public_key,
            encrypted_private_key,
        };
        self.storage.put(record.clone()).await?;
        tracing::info!(public_key = %record.public_key, cipher = %self.cipher, "キーペアを保存しました");
        Ok(record)
    }

    /// Base58シードを暗号化し、レコード文字列を返す。IVは呼び出しごとに新しく生成する。
    pub fn encrypt(&self, seed_b58: &str, password: &str) -> Result<String, ClientError> {
        Ok(encrypt_secret(seed_b58, password, self.cipher)?)
    }

    /// レコード文字列を復号し、Base58シードを返す。
    ///
    /// パスワード誤りは通常パディング不正として検出されるが、CBC形式では
    /// 偶然復号に成功する場合がある。呼び出し側で公開鍵の導出を照合すること。
    pub fn decrypt(record: &str, password: &str) -> Result<String, ClientError> {
        Ok(decrypt_secret(record, password)?)
    }

    /// 公開鍵に一致するレコードを探す。
    pub async fn lookup(&self, public_key: &str) -> Result<KeypairRecord, ClientError> {
        self.storage
            .get_all()
            .await?
            .into_iter()
            .find(|record| record.public_key == public_key)
            .ok_or_else(|| ClientError::KeyNotFound {
                public_key: public_key.to_string(),
            })
    }

    /// 保存済みの全レコード。
    pub async fn records(&self) -> Result<Vec<KeypairRecord>, ClientError> {
        self.storage.get_all().await
    }

    /// 公開鍵のレコードを復号し、署名用の鍵マップを作る。
    ///
    /// 復号したシードから導出した公開鍵がレコードと一致しなければ
    /// [`ClientError::Decryption`]（パスワード誤り）とする。
    pub async fn unlock(&self, public_key: &str, password: &str) -> Result<KeyMap, ClientError> {
        let record = self.lookup(public_key).await?;
        let seed = Self::decrypt(&record.encrypted_private_key, password)?;
        let signing_key = signing_key_from_base58(&seed).map_err(|_| ClientError::Decryption)?;

        let mut keys = KeyMap::new();
        let derived = keys.insert(signing_key);
        if derived != record.public_key {
            tracing::warn!(public_key = %record.public_key, "復号した鍵が公開鍵と一致しません");
            return Err(ClientError::Decryption);
        }
        Ok(keys)
    }
}
