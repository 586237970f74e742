//! # トランザクション署名
//!
//! `prepare` が返した未署名トランザクションに、入力ごとのフルフィルメントを設定する。
//!
//! ## 処理フロー
//! 1. 全入力の署名者（`owners_before[0]`）に対応する鍵を解決する（1つでも欠ければ何も変更しない）
//! 2. フルフィルメントを除去して正規化し、ハッシュする
//! 3. 入力の順序どおりにEd25519署名し、フルフィルメントを設定する
//! 4. トランザクションIDを文書ダイジェストにする
//!
//! 検証は [`Signer::verify`] の1関数のみを公開する。

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fmt;

use residentity_crypto::{
    ed25519_sign, ed25519_verify, public_key_to_base58, signing_key_from_base58,
    verifying_key_from_base58, verifying_key_from_bytes, CryptoError, Ed25519Signature,
    Ed25519SigningKey, HashAlgorithm,
};
use residentity_types::Transaction;

use crate::canonical::{canonicalize, strip_fulfillments};
use crate::fulfillment::{
    decode_fulfillment_payload, encode_fulfillment_payload, fulfillment_from_base64url,
    fulfillment_to_base64url,
};
use crate::{CodecError, SignError};

// ---------------------------------------------------------------------------
// 鍵マップ
// ---------------------------------------------------------------------------

/// 公開鍵（Base58）→ 署名鍵 の対応表。
///
/// KeyStoreで復号した鍵を署名呼び出しの間だけ保持する。公開鍵は常に
/// 署名鍵から導出した値をキーにする。
#[derive(Clone, Default)]
pub struct KeyMap {
    keys: HashMap<String, Ed25519SigningKey>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base58シード1つから鍵マップを作る。
    pub fn from_seed(seed_b58: &str) -> Result<Self, CryptoError> {
        let mut map = Self::new();
        map.insert_seed(seed_b58)?;
        Ok(map)
    }

    /// 署名鍵を追加し、導出した公開鍵（Base58）を返す。
    pub fn insert(&mut self, signing_key: Ed25519SigningKey) -> String {
        let public_key = public_key_to_base58(&signing_key.verifying_key());
        self.keys.insert(public_key.clone(), signing_key);
        public_key
    }

    /// Base58シードから署名鍵を追加し、導出した公開鍵を返す。
    pub fn insert_seed(&mut self, seed_b58: &str) -> Result<String, CryptoError> {
        Ok(self.insert(signing_key_from_base58(seed_b58)?))
    }

    pub fn get(&self, public_key: &str) -> Option<&Ed25519SigningKey> {
        self.keys.get(public_key)
    }

    pub fn contains(&self, public_key: &str) -> bool {
        self.keys.contains_key(public_key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 保持している公開鍵の一覧（順不同）。
    pub fn public_keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

// 秘密鍵をDebug出力に含めない
impl fmt::Debug for KeyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMap")
            .field("public_keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// 署名器
// ---------------------------------------------------------------------------

/// トランザクション署名器。状態を持たず、署名前ハッシュのアルゴリズムだけを保持する。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signer {
    hash: HashAlgorithm,
}

impl Signer {
    pub fn new(hash: HashAlgorithm) -> Self {
        Self { hash }
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    /// フルフィルメントを除去した正規化バイト列のダイジェスト。
    pub fn pre_fulfillment_digest(&self, tx: &Transaction) -> Result<[u8; 32], CodecError> {
        let base = canonicalize(&strip_fulfillments(tx))?;
        Ok(self.hash.digest(&base))
    }

    /// 全入力に署名したトランザクションを返す。
    ///
    /// 入力の数と順序は変えない。失敗時は `prepared` に一切変更がない。
    pub fn sign(&self, prepared: &Transaction, keys: &KeyMap) -> Result<Transaction, SignError> {
        if prepared.inputs.is_empty() {
            return Err(SignError::NoInputs);
        }

        let signing_keys = prepared
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let owner = input.signer().ok_or(SignError::MissingOwner { index })?;
                keys.get(owner)
                    .ok_or_else(|| SignError::UnauthorizedSigner {
                        public_key: owner.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let digest = self.pre_fulfillment_digest(prepared)?;

        let mut signed = prepared.clone();
        for (input, signing_key) in signed.inputs.iter_mut().zip(signing_keys) {
            let signature = ed25519_sign(signing_key, &digest);
            let encoded = encode_fulfillment_payload(
                signing_key.verifying_key().as_bytes(),
                &signature.to_bytes(),
            )?;
            input.fulfillment = Some(fulfillment_to_base64url(&encoded));
        }
        signed.id = Some(Some(prepared.document_digest().to_string()));

        Ok(signed)
    }

    /// 署名済みトランザクションを検証する。
    ///
    /// `prepared_id` は署名前の `id` フィールド（欠落なら `None`、`null` なら `Some(None)`）。
    /// 署名対象には署名前の `id` が含まれるため、これを戻してダイジェストを再計算する。
    pub fn verify(
        &self,
        signed: &Transaction,
        prepared_id: Option<Option<String>>,
    ) -> Result<(), SignError> {
        if signed.inputs.is_empty() {
            return Err(SignError::NoInputs);
        }
        if signed.id() != Some(signed.document_digest()) {
            return Err(SignError::IdMismatch);
        }

        let mut unsigned = signed.clone();
        unsigned.id = prepared_id;
        let digest = self.pre_fulfillment_digest(&unsigned)?;

        for (index, input) in signed.inputs.iter().enumerate() {
            let invalid = |reason: String| SignError::InvalidFulfillment { index, reason };

            let owner = input.signer().ok_or(SignError::MissingOwner { index })?;
            let fulfillment = input
                .fulfillment
                .as_deref()
                .ok_or_else(|| invalid("フルフィルメントが未設定です".into()))?;
            let payload = fulfillment_from_base64url(fulfillment)
                .and_then(|bytes| decode_fulfillment_payload(&bytes))
                .map_err(|e| invalid(e.to_string()))?;

            let verifying_key =
                verifying_key_from_bytes(&payload.public_key).map_err(|e| invalid(e.to_string()))?;
            let owner_key = verifying_key_from_base58(owner).map_err(|e| invalid(e.to_string()))?;
            if verifying_key != owner_key {
                return Err(SignError::UnauthorizedSigner {
                    public_key: public_key_to_base58(&verifying_key),
                });
            }

            let signature = Ed25519Signature::from_slice(&payload.signature)
                .map_err(|e| invalid(format!("署名の長さが不正です: {e}")))?;
            ed25519_verify(&verifying_key, &digest, &signature)
                .map_err(|_| SignError::SignatureMismatch { index })?;
        }

        Ok(())
    }

    /// `prepare` 時のトランザクションと照合したうえで検証する。
    ///
    /// フルフィルメントと `id` 以外が1バイトでも変化していれば [`SignError::PayloadMismatch`]。
    pub fn verify_against(
        &self,
        signed: &Transaction,
        prepared: &Transaction,
    ) -> Result<(), SignError> {
        let mut unsigned = signed.clone();
        unsigned.id = prepared.id.clone();
        if self.pre_fulfillment_digest(&unsigned)? != self.pre_fulfillment_digest(prepared)? {
            return Err(SignError::PayloadMismatch);
        }
        self.verify(signed, prepared.id.clone())
    }
}
