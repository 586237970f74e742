//! # プロセス内キーストレージ

use tokio::sync::Mutex;

use residentity_types::KeypairRecord;

use super::KeyRecordStorage;
use crate::error::ClientError;

/// メモリ上にレコードを保持するストレージ。プロセス終了で消える。
#[derive(Debug, Default)]
pub struct MemoryKeyStorage {
    records: Mutex<Vec<KeypairRecord>>,
}

impl MemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyRecordStorage for MemoryKeyStorage {
    async fn put(&self, record: KeypairRecord) -> Result<(), ClientError> {
        let mut records = self.records.lock().await;
        if records.iter().any(|r| r.public_key == record.public_key) {
            return Err(ClientError::Storage(format!(
                "公開鍵 {} のレコードは既に存在します",
                record.public_key
            )));
        }
        records.push(record);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<KeypairRecord>, ClientError> {
        Ok(self.records.lock().await.clone())
    }
}
