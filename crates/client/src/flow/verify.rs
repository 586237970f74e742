//! # 検証フロー

use crate::api::SignApi;
use crate::document::Document;
use crate::error::ClientError;
use crate::session::Session;

/// サーバーが返した所有者情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub ownership: String,
}

impl VerifyOutcome {
    /// 表示用に改行で分割した行（空行も保持する）。
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.ownership.split('\n')
    }
}

/// 署名済み文書をアップロードし、サーバー側で所有者を検証する。
pub struct VerifyFlow<'a> {
    api: &'a dyn SignApi,
    session: &'a Session,
}

impl<'a> VerifyFlow<'a> {
    pub fn new(api: &'a dyn SignApi, session: &'a Session) -> Self {
        Self { api, session }
    }

    pub async fn verify(&self, document: &Document) -> Result<VerifyOutcome, ClientError> {
        self.session.require_authenticated()?;
        let response = self.api.verify(document).await?;
        tracing::info!(file_name = document.file_name(), "検証結果を受け取りました");
        Ok(VerifyOutcome {
            ownership: response.ownership,
        })
    }
}
