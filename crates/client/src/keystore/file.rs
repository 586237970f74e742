//! # ファイルキーストレージ
//!
//! データディレクトリ内の `keypairs.json` にレコードの配列を保存する。
//! ディレクトリとファイルは最初の書き込み時に作成する。書き込みは一時ファイルへの
//! 書き出しとリネームで行い、途中で中断しても既存レコードを壊さない。

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use residentity_types::KeypairRecord;

use super::KeyRecordStorage;
use crate::error::ClientError;

/// JSONファイルにレコードを保存するストレージ。
#[derive(Debug)]
pub struct FileKeyStorage {
    path: PathBuf,
    /// 同一プロセス内の書き込みを直列化する
    write_lock: Mutex<()>,
}

impl FileKeyStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(&self) -> Result<Vec<KeypairRecord>, ClientError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "{} の読み込みに失敗: {e}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            ClientError::Storage(format!("{} のパースに失敗: {e}", self.path.display()))
        })
    }

    async fn write_records(&self, records: &[KeypairRecord]) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| ClientError::Storage(format!("レコードのシリアライズに失敗: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyRecordStorage for FileKeyStorage {
    async fn put(&self, record: KeypairRecord) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_records().await?;
        if records.iter().any(|r| r.public_key == record.public_key) {
            return Err(ClientError::Storage(format!(
                "公開鍵 {} のレコードは既に存在します",
                record.public_key
            )));
        }
        records.push(record);
        self.write_records(&records).await
    }

    async fn get_all(&self) -> Result<Vec<KeypairRecord>, ClientError> {
        self.read_records().await
    }
}
