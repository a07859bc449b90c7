pub mod cloudinary;

use thiserror::Error;

use crate::multipart::FilePart;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),
    #[error("media host rejected '{filename}' with status {status}: {message}")]
    Rejected {
        filename: String,
        status: u16,
        message: String,
    },
    #[error("media host response has no URL")]
    MissingUrl,
    #[error("Worker error: {0}")]
    WorkerError(#[from] worker::Error),
}

/// 画像の保存先。アップロードした画像の公開URLを返す
#[allow(async_fn_in_trait)]
pub trait MediaHost {
    async fn upload(&self, file: &FilePart) -> Result<String, UploadError>;
}
