//! # 署名フロー
//!
//! `initial` → `prepare` → 署名 → `commit` を順に実行する。

use residentity_core::Signer;
use residentity_types::Transaction;

use super::SignState;
use crate::api::SignApi;
use crate::document::Document;
use crate::error::ClientError;
use crate::keystore::KeyStore;
use crate::session::Session;

/// 署名に使うパスワードの最小文字数
pub const MIN_SIGN_PASSWORD_LEN: usize = 8;

/// 署名フローの成果物。
#[derive(Debug, Clone)]
pub struct SignedArtifact {
    /// `commit` に送った署名済みトランザクション
    pub transaction: Transaction,
    /// サーバーが返した署名済み文書
    pub document: Vec<u8>,
}

/// 1回の署名操作を管理する状態機械。
///
/// 処理中のトランザクションはこのフローだけが保持し、終了後には残さない。
pub struct TransactionFlow<'a> {
    api: &'a dyn SignApi,
    keystore: &'a KeyStore,
    session: &'a Session,
    signer: Signer,
    state: SignState,
    history: Vec<SignState>,
    document: Option<Document>,
}

impl<'a> TransactionFlow<'a> {
    pub fn new(
        api: &'a dyn SignApi,
        keystore: &'a KeyStore,
        session: &'a Session,
        signer: Signer,
    ) -> Self {
        Self {
            api,
            keystore,
            session,
            signer,
            state: SignState::Idle,
            history: vec![SignState::Idle],
            document: None,
        }
    }

    pub fn state(&self) -> &SignState {
        &self.state
    }

    /// これまでに通過した状態（初期状態を含む）。
    pub fn history(&self) -> &[SignState] {
        &self.history
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// 文書を選択する（`Idle` / `Uploading` → `Uploading`）。通信は行わない。
    pub fn select_document(&mut self, document: Document) -> Result<(), ClientError> {
        match self.state {
            SignState::Idle | SignState::Uploading => {
                tracing::debug!(file_name = document.file_name(), "文書を選択しました");
                self.document = Some(document);
                if self.state == SignState::Idle {
                    self.transition(SignState::Uploading);
                }
                Ok(())
            }
            _ => Err(ClientError::Validation(format!(
                "署名処理中は文書を変更できません（状態: {}）",
                self.state
            ))),
        }
    }

    /// `Idle` に戻し、選択中の文書を破棄する。
    pub fn reset(&mut self) {
        self.document = None;
        self.state = SignState::Idle;
        self.history = vec![SignState::Idle];
    }

    /// 署名を実行する。
    ///
    /// 文書未選択・未ログイン・パスワード不足の場合は通信せずにエラーを返し、状態は変えない。
    /// 通信開始後の失敗はすべて `Failed` に遷移する。
    pub async fn submit(&mut self, password: &str) -> Result<SignedArtifact, ClientError> {
        if self.state != SignState::Uploading {
            return Err(match self.state {
                SignState::Idle => ClientError::FileSelection("Please select a PDF file.".into()),
                _ => ClientError::Validation(format!(
                    "署名を開始できる状態ではありません（状態: {}）",
                    self.state
                )),
            });
        }
        self.session.require_authenticated()?;
        if password.chars().count() < MIN_SIGN_PASSWORD_LEN {
            return Err(ClientError::Validation(format!(
                "パスワードは{MIN_SIGN_PASSWORD_LEN}文字以上である必要があります"
            )));
        }

        match self.run(password).await {
            Ok(artifact) => {
                self.transition(SignState::Done);
                Ok(artifact)
            }
            Err(e) => {
                tracing::warn!(state = %self.state, error = %e, "署名に失敗しました");
                self.transition(SignState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(&mut self, password: &str) -> Result<SignedArtifact, ClientError> {
        let document = self
            .document
            .clone()
            .ok_or_else(|| ClientError::FileSelection("Please select a PDF file.".into()))?;

        self.transition(SignState::Initializing);
        let initial = self.api.initial(password).await?;

        self.transition(SignState::Preparing);
        let prepared = self.api.prepare(&document).await?;
        tracing::info!(
            document_digest = prepared.document_digest(),
            inputs = prepared.inputs.len(),
            "未署名トランザクションを受け取りました"
        );

        self.transition(SignState::Signing);
        let keys = self.keystore.unlock(&initial.public_key, password).await?;
        let signed = self.signer.sign(&prepared, &keys)?;

        self.transition(SignState::Committing);
        let artifact = self.api.commit(&signed).await?;
        tracing::info!(
            document_digest = signed.document_digest(),
            bytes = artifact.len(),
            "署名済み文書を受け取りました"
        );

        Ok(SignedArtifact {
            transaction: signed,
            document: artifact,
        })
    }

    fn transition(&mut self, next: SignState) {
        tracing::debug!(from = %self.state, to = %next, "状態遷移");
        self.state = next.clone();
        self.history.push(next);
    }
}
