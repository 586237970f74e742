//! # residentity CLI
//!
//! 署名クライアントのコマンドラインインターフェース。
//!
//! ## コマンド
//! - `register` / `login` / `logout` / `me`: アカウント操作
//! - `keygen` / `keys`: ローカル鍵ストアの操作
//! - `sign <file>`: PDFに署名し、`<stem>.signed.pdf` に保存
//! - `verify <file>`: 署名済みPDFの所有者を確認
//! - `verify-tx <file>`: 署名済みトランザクションJSONをオフラインで検証
//!
//! ログインセッションはデータディレクトリの `session.json` に保存され、
//! 以降のコマンドで再利用される。

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use residentity_client::account::{self, RegistrationForm};
use residentity_client::document::signed_artifact_path;
use residentity_client::{
    ClientConfig, Document, FileKeyStorage, HttpApi, KeyStore, SessionStore, SignState,
    TransactionFlow, VerifyFlow,
};
use residentity_core::Signer;
use residentity_crypto::{HashAlgorithm, KeyCipher};
use residentity_types::Transaction;

#[derive(Parser, Debug)]
#[command(
    name = "residentity",
    version,
    about = "Sign PDF documents with a locally held Ed25519 key."
)]
struct Cli {
    /// APIのベースURL
    #[arg(long, env = "RESIDENTITY_API_URL", global = true)]
    api_url: Option<String>,

    /// 鍵ストア・セッションの保存先
    #[arg(long, env = "RESIDENTITY_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// 署名前ハッシュ（sha256 | sha3-256）
    #[arg(long, env = "RESIDENTITY_HASH_ALGORITHM", global = true)]
    hash_algorithm: Option<HashAlgorithm>,

    /// 新規キーレコードの暗号方式（aes-256-cbc | aes-256-gcm）
    #[arg(long, env = "RESIDENTITY_KEY_CIPHER", global = true)]
    key_cipher: Option<KeyCipher>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and a new signing keypair.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "RESIDENTITY_PASSWORD", hide_env_values = true)]
        password: String,
        /// 確認用パスワード（省略時は --password と同じ）
        #[arg(long)]
        verify_password: Option<String>,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long, default_value = "")]
        state: String,
        #[arg(long, default_value = "")]
        country_code: String,
        #[arg(long, default_value = "")]
        organization: String,
    },

    /// Log in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "RESIDENTITY_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and discard the stored session.
    Logout,

    /// Show the logged-in user.
    Me,

    /// Generate a keypair in the local key store without registering it.
    Keygen {
        #[arg(long, env = "RESIDENTITY_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// List public keys in the local key store.
    Keys,

    /// Sign a PDF document.
    Sign {
        file: PathBuf,
        #[arg(long, env = "RESIDENTITY_PASSWORD", hide_env_values = true)]
        password: String,
        /// 出力先（省略時は <stem>.signed.pdf）
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the ownership recorded for a signed PDF.
    Verify { file: PathBuf },

    /// Verify a signed transaction JSON offline.
    VerifyTx {
        file: PathBuf,
        /// prepare が返した未署名トランザクション（ペイロードの一致も確認する）
        #[arg(long, conflicts_with = "id_absent")]
        prepared: Option<PathBuf>,
        /// 署名前のトランザクションに id フィールドがなかった
        #[arg(long)]
        id_absent: bool,
    },
}

impl Cli {
    fn config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::from_env()?;
        if let Some(api_url) = &self.api_url {
            config = config.with_api_url(api_url.clone());
        }
        if let Some(data_dir) = &self.data_dir {
            config = config.with_data_dir(data_dir.clone());
        }
        if let Some(hash_algorithm) = self.hash_algorithm {
            config = config.with_hash_algorithm(hash_algorithm);
        }
        if let Some(key_cipher) = self.key_cipher {
            config = config.with_key_cipher(key_cipher);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    tracing::debug!(api_url = %config.api_url, data_dir = %config.data_dir.display(), "設定を読み込みました");

    let keystore = KeyStore::new(
        Box::new(FileKeyStorage::new(config.keypairs_path())),
        config.key_cipher,
    );
    let sessions = SessionStore::new(config.session_path());
    let session = sessions.load().await?;

    match cli.command {
        Command::Register {
            email,
            password,
            verify_password,
            first_name,
            last_name,
            city,
            state,
            country_code,
            organization,
        } => {
            let api = HttpApi::new(&config, &session)?;
            let form = RegistrationForm {
                email,
                verify_password: verify_password.unwrap_or_else(|| password.clone()),
                password,
                first_name,
                last_name,
                city,
                state,
                country_code,
                organization,
            };
            let record = account::register(&api, &keystore, &form).await?;
            println!("Registered. Public key: {}", record.public_key);
        }
        Command::Login { email, password } => {
            let api = HttpApi::new(&config, &session)?;
            account::login(&api, &sessions, &email, &password).await?;
            println!("Logged in as {email}");
        }
        Command::Logout => {
            let api = HttpApi::new(&config, &session)?;
            account::logout(&api, &sessions).await?;
            println!("Logged out");
        }
        Command::Me => {
            let api = HttpApi::new(&config, &session)?;
            match account::me(&api).await? {
                Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
                None => println!("Not logged in"),
            }
        }
        Command::Keygen { password } => {
            let record = keystore.generate_keypair(&password).await?;
            println!("{}", record.public_key);
        }
        Command::Keys => {
            for record in keystore.records().await? {
                println!("{}", record.public_key);
            }
        }
        Command::Sign {
            file,
            password,
            out,
        } => {
            let api = HttpApi::new(&config, &session)?;
            let document = Document::open(&file).await?;
            let mut flow = TransactionFlow::new(
                &api,
                &keystore,
                &session,
                Signer::new(config.hash_algorithm),
            );
            flow.select_document(document)?;
            let artifact = flow.submit(&password).await?;

            let out = out.unwrap_or_else(|| signed_artifact_path(&file));
            tokio::fs::write(&out, &artifact.document)
                .await
                .with_context(|| format!("{} への書き込みに失敗", out.display()))?;
            if let Some(message) = SignState::Done.status_message() {
                println!("{message}");
            }
            println!("Transaction: {}", artifact.transaction.document_digest());
            println!("Saved to {}", out.display());
        }
        Command::Verify { file } => {
            let api = HttpApi::new(&config, &session)?;
            let document = Document::open(&file).await?;
            let outcome = VerifyFlow::new(&api, &session).verify(&document).await?;
            for line in outcome.lines() {
                println!("{line}");
            }
        }
        Command::VerifyTx {
            file,
            prepared,
            id_absent,
        } => {
            let signer = Signer::new(config.hash_algorithm);
            let signed = read_transaction(&file).await?;
            match prepared {
                Some(path) => signer.verify_against(&signed, &read_transaction(&path).await?)?,
                None => signer.verify(&signed, if id_absent { None } else { Some(None) })?,
            }
            println!(
                "OK: {} input(s) verified ({})",
                signed.inputs.len(),
                signer.hash_algorithm()
            );
        }
    }

    Ok(())
}

async fn read_transaction(path: &Path) -> anyhow::Result<Transaction> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("{} を読み込めません", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("{} はトランザクションJSONではありません", path.display()))
}
