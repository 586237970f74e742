//! # アカウント操作
//!
//! ログイン・登録・ログアウト・ログイン中ユーザーの取得。
//!
//! 登録時はアカウントのパスワードでキーペアを生成・暗号化して鍵ストアに保存し、
//! 公開鍵をプロフィールとともにサーバーへ送る。署名時には同じパスワードで秘密鍵を復号する。

use residentity_types::{KeypairRecord, LoginRequest, RegisterRequest, UserProfile};

use crate::api::AccountApi;
use crate::error::ClientError;
use crate::keystore::KeyStore;
use crate::session::{Session, SessionStore};

/// 登録フォーム。
#[derive(Clone, Default)]
pub struct RegistrationForm {
    pub email: String,
    pub password: String,
    /// 確認用に再入力したパスワード
    pub verify_password: String,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub state: String,
    pub country_code: String,
    pub organization: String,
}

/// メールアドレスの形式確認（`\S+@\S+\.\S+` を含むこと）。
pub fn validate_email(email: &str) -> bool {
    email.split_whitespace().any(|token| {
        let bytes = token.as_bytes();
        bytes.iter().enumerate().any(|(at, b)| {
            *b == b'@'
                && at > 0
                && bytes
                    .iter()
                    .enumerate()
                    .any(|(dot, c)| *c == b'.' && dot > at + 1 && dot + 1 < bytes.len())
        })
    })
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ClientError> {
    if email.is_empty() || password.is_empty() {
        return Err(ClientError::Validation(
            "メールアドレスとパスワードを入力してください".into(),
        ));
    }
    if !validate_email(email) {
        return Err(ClientError::Validation(format!(
            "メールアドレスの形式が不正です: {email}"
        )));
    }
    Ok(())
}

/// ログインし、セッションを保存する。
pub async fn login(
    api: &dyn AccountApi,
    sessions: &SessionStore,
    email: &str,
    password: &str,
) -> Result<Session, ClientError> {
    validate_credentials(email, password)?;

    let session = api
        .login(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
        .await?;
    sessions.save(&session).await?;
    tracing::info!(email, "ログインしました");
    Ok(session)
}

/// キーペアを生成してアカウントを登録し、保存したキーペアレコードを返す。
pub async fn register(
    api: &dyn AccountApi,
    keystore: &KeyStore,
    form: &RegistrationForm,
) -> Result<KeypairRecord, ClientError> {
    validate_credentials(&form.email, &form.password)?;
    if form.password != form.verify_password {
        return Err(ClientError::Validation("パスワードが一致しません".into()));
    }

    let record = keystore.generate_keypair(&form.password).await?;

    let request = RegisterRequest {
        email: form.email.clone(),
        password: form.password.clone(),
        public_key: record.public_key.clone(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        city: form.city.clone(),
        state: form.state.clone(),
        country_code: form.country_code.clone(),
        organization: form.organization.clone(),
    };
    api.register(&request).await?;
    tracing::info!(email = %form.email, public_key = %record.public_key, "アカウントを登録しました");
    Ok(record)
}

/// ログアウトする。サーバー側の失敗にかかわらずローカルのセッションは破棄する。
pub async fn logout(api: &dyn AccountApi, sessions: &SessionStore) -> Result<(), ClientError> {
    let result = api.logout().await;
    sessions.clear().await?;
    if let Err(e) = &result {
        tracing::warn!(error = %e, "サーバー側のログアウトに失敗しました");
    }
    result
}

/// ログイン中のユーザー。
pub async fn me(api: &dyn AccountApi) -> Result<Option<UserProfile>, ClientError> {
    api.me().await
}
