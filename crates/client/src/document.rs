//! # 文書ファイル
//!
//! 署名・検証のためにアップロードするPDFの選択と、署名済み成果物の保存先決定。
//! PDFの中身は解釈しない（拡張子と空でないことのみ確認する）。

use std::path::{Path, PathBuf};

use crate::error::ClientError;

/// アップロード時のMIMEタイプ
pub const PDF_MIME: &str = "application/pdf";

/// 選択済みの文書。
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    file_name: String,
    bytes: Vec<u8>,
}

impl Document {
    /// メモリ上のバイト列から文書を作る。
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ClientError> {
        let file_name = file_name.into();
        if file_name.is_empty() {
            return Err(ClientError::FileSelection("Please select a PDF file.".into()));
        }
        if !has_pdf_extension(&file_name) {
            return Err(ClientError::FileSelection(format!(
                "PDFファイルを選択してください: {file_name}"
            )));
        }
        if bytes.is_empty() {
            return Err(ClientError::FileSelection(format!(
                "ファイルが空です: {file_name}"
            )));
        }
        Ok(Self { file_name, bytes })
    }

    /// ファイルを読み込んで文書を作る。
    pub async fn open(path: &Path) -> Result<Self, ClientError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::FileSelection("Please select a PDF file.".into()))?
            .to_string();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ClientError::FileSelection(format!("{} を読み込めません: {e}", path.display()))
        })?;
        Self::new(file_name, bytes)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn has_pdf_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// 署名済み成果物の既定の保存先（`<stem>.signed.pdf`、入力と同じディレクトリ）。
pub fn signed_artifact_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document");
    input.with_file_name(format!("{stem}.signed.pdf"))
}
