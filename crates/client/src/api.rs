//! # API クライアント
//!
//! 署名サーバーのHTTP APIを呼び出す。サーバーと台帳はブラックボックスとして扱い、
//! 以下のエンドポイントのみを利用する。全リクエストはセッションクッキー付きで送る。
//!
//! | エンドポイント | メソッド | 入力 | 出力 |
//! |---------------|---------|------|------|
//! | `/api/login` | POST | `{email,password}` | `token` クッキー |
//! | `/api/register` | POST | 登録フォーム | `{error?}` |
//! | `/api/logout` | POST | なし | セッション破棄 |
//! | `/api/me` | GET | なし | `{data: profile \| null}` |
//! | `/api/sign/initial` | POST | `{password}` | `{data: {public_key}}` |
//! | `/api/sign/prepare` | POST | multipart `file` | `{data: transaction}` |
//! | `/api/sign/commit` | POST | 署名済みトランザクション | 文書バイナリ |
//! | `/api/sign/verify` | POST | multipart `file` | `{data: {ownership}}` |
//!
//! 失敗時はサーバーのメッセージ（`error.message` → `message`）を、なければ汎用メッセージを返す。

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use residentity_types::{
    ApiEnvelope, ApiErrorBody, InitialRequest, InitialResponse, LoginRequest, RegisterRequest,
    RegisterResponse, Transaction, UserProfile, VerifyResponse,
};

use crate::config::ClientConfig;
use crate::document::{Document, PDF_MIME};
use crate::error::ClientError;
use crate::session::{Session, SESSION_COOKIE};

// ---------------------------------------------------------------------------
// インターフェース
// ---------------------------------------------------------------------------

/// 署名・検証フローが使うAPI。
#[async_trait::async_trait]
pub trait SignApi: Send + Sync {
    /// 署名セッションを開始し、パスワードに紐づく署名者の公開鍵を受け取る。
    async fn initial(&self, password: &str) -> Result<InitialResponse, ClientError>;

    /// 文書をアップロードし、未署名トランザクションを受け取る。
    async fn prepare(&self, document: &Document) -> Result<Transaction, ClientError>;

    /// 署名済みトランザクションを送信し、署名済み文書を受け取る。
    async fn commit(&self, signed: &Transaction) -> Result<Vec<u8>, ClientError>;

    /// 署名済み文書をアップロードし、所有者情報を受け取る。
    async fn verify(&self, document: &Document) -> Result<VerifyResponse, ClientError>;
}

/// アカウント操作のAPI。
#[async_trait::async_trait]
pub trait AccountApi: Send + Sync {
    /// ログインし、確立したセッションを返す。
    async fn login(&self, request: &LoginRequest) -> Result<Session, ClientError>;

    async fn register(&self, request: &RegisterRequest) -> Result<(), ClientError>;

    async fn logout(&self) -> Result<(), ClientError>;

    /// ログイン中のユーザー。未ログインなら `None`。
    async fn me(&self) -> Result<Option<UserProfile>, ClientError>;
}

// ---------------------------------------------------------------------------
// HTTP実装
// ---------------------------------------------------------------------------

/// reqwestによるAPIクライアント。クッキーはプロセス内のJarで保持する。
pub struct HttpApi {
    client: reqwest::Client,
    base_url: Url,
    jar: Arc<Jar>,
}

impl HttpApi {
    /// 保存済みセッションのトークンをクッキーとして設定したクライアントを作る。
    pub fn new(config: &ClientConfig, session: &Session) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.api_url).map_err(|e| {
            ClientError::Validation(format!("APIのURLが不正です: {}: {e}", config.api_url))
        })?;

        let jar = Arc::new(Jar::default());
        if let Some(token) = session.token() {
            jar.add_cookie_str(&format!("{SESSION_COOKIE}={token}; Path=/"), &base_url);
        }

        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("HTTPクライアントの初期化に失敗: {e}")))?;

        Ok(Self {
            client,
            base_url,
            jar,
        })
    }

    /// 現在クッキーに保持しているセッション。
    pub fn session(&self) -> Session {
        self.jar
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().ok().map(Session::from_cookie_header))
            .unwrap_or_default()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn send(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(path, error = %e, "APIリクエストの送信に失敗しました");
            ClientError::network(None)
        })?;
        tracing::debug!(path, status = %response.status(), "APIレスポンス");

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    fn file_form(document: &Document) -> Result<Form, ClientError> {
        let part = Part::bytes(document.bytes().to_vec())
            .file_name(document.file_name().to_string())
            .mime_str(PDF_MIME)
            .map_err(|e| ClientError::FileSelection(format!("MIMEタイプの設定に失敗: {e}")))?;
        Ok(Form::new().part("file", part))
    }
}

/// 失敗レスポンスからエラーを作る。
async fn error_from_response(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let message = match response.bytes().await {
        Ok(body) => serde_json::from_slice::<ApiErrorBody>(&body)
            .ok()
            .and_then(ApiErrorBody::into_message),
        Err(_) => None,
    };
    tracing::warn!(%status, message = ?message, "APIがエラーを返しました");
    ClientError::network(message)
}

/// `{ "data": ... }` の中身を取り出す。
async fn read_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let body = response.bytes().await.map_err(|e| {
        tracing::warn!(error = %e, "レスポンスの読み取りに失敗しました");
        ClientError::network(None)
    })?;
    serde_json::from_slice::<ApiEnvelope<T>>(&body)
        .map(|envelope| envelope.data)
        .map_err(|e| {
            tracing::warn!(error = %e, "レスポンスのパースに失敗しました");
            ClientError::network(None)
        })
}

#[async_trait::async_trait]
impl SignApi for HttpApi {
    async fn initial(&self, password: &str) -> Result<InitialResponse, ClientError> {
        let path = "/api/sign/initial";
        let body = InitialRequest {
            password: password.to_string(),
        };
        let response = self
            .send(path, self.client.post(self.url(path)).json(&body))
            .await?;
        read_data(response).await
    }

    async fn prepare(&self, document: &Document) -> Result<Transaction, ClientError> {
        let path = "/api/sign/prepare";
        let form = Self::file_form(document)?;
        let response = self
            .send(path, self.client.post(self.url(path)).multipart(form))
            .await?;
        read_data(response).await
    }

    async fn commit(&self, signed: &Transaction) -> Result<Vec<u8>, ClientError> {
        let path = "/api/sign/commit";
        let response = self
            .send(path, self.client.post(self.url(path)).json(signed))
            .await?;
        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, "署名済み文書の受信に失敗しました");
            ClientError::network(None)
        })?;
        Ok(body.to_vec())
    }

    async fn verify(&self, document: &Document) -> Result<VerifyResponse, ClientError> {
        let path = "/api/sign/verify";
        let form = Self::file_form(document)?;
        let response = self
            .send(path, self.client.post(self.url(path)).multipart(form))
            .await?;
        read_data(response).await
    }
}

#[async_trait::async_trait]
impl AccountApi for HttpApi {
    async fn login(&self, request: &LoginRequest) -> Result<Session, ClientError> {
        let path = "/api/login";
        self.send(path, self.client.post(self.url(path)).json(request))
            .await?;

        let session = self.session();
        if !session.is_authenticated() {
            tracing::warn!("ログインレスポンスにセッションクッキーがありません");
            return Err(ClientError::network(None));
        }
        Ok(session)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<(), ClientError> {
        let path = "/api/register";
        let response = self
            .send(path, self.client.post(self.url(path)).json(request))
            .await?;
        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, "レスポンスの読み取りに失敗しました");
            ClientError::network(None)
        })?;
        let result: RegisterResponse = if body.is_empty() {
            RegisterResponse::default()
        } else {
            serde_json::from_slice(&body).map_err(|e| {
                tracing::warn!(error = %e, "レスポンスのパースに失敗しました");
                ClientError::network(None)
            })?
        };
        match result.error {
            Some(message) if !message.is_empty() => Err(ClientError::Network(message)),
            _ => Ok(()),
        }
    }

    async fn logout(&self) -> Result<(), ClientError> {
        let path = "/api/logout";
        self.send(path, self.client.post(self.url(path))).await?;
        Ok(())
    }

    async fn me(&self) -> Result<Option<UserProfile>, ClientError> {
        let path = "/api/me";
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(path, error = %e, "APIリクエストの送信に失敗しました");
                ClientError::network(None)
            })?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => read_data(response).await,
            _ => Err(error_from_response(response).await),
        }
    }
}
