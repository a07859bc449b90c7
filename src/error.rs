use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ConfigError;
use crate::models::FieldMapError;
use crate::multipart::{IngestError, MultipartError};
use crate::service::UploadError;
use crate::store::StoreError;

/// リクエスト処理中のエラー。全てJSONのエラーレスポンスになる
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Error de configuración del servidor")]
    Configuration(String),
    #[error("Acceso no autorizado. Clave de administrador requerida.")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("Error al subir imagen")]
    Upstream(#[from] UploadError),
    #[error("Error interno del servidor")]
    Storage(#[from] StoreError),
    #[error("Método no permitido.")]
    MethodNotAllowed,
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Configuration(_) => 500,
            ApiError::Unauthorized => 401,
            ApiError::Validation(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::Upstream(_) => 500,
            ApiError::Storage(_) => 500,
            ApiError::MethodNotAllowed => 405,
        }
    }

    /// 内部の詳細 (5xx のみ)
    pub fn detail(&self) -> Option<String> {
        match self {
            ApiError::Configuration(detail) => Some(detail.clone()),
            ApiError::Upstream(err) => Some(err.to_string()),
            ApiError::Storage(err) => Some(err.to_string()),
            _ => None,
        }
    }

    pub fn body(&self) -> Value {
        let mut body = json!({
            "code": self.status(),
            "message": self.to_string(),
        });
        if let Some(detail) = self.detail() {
            body["error"] = Value::String(detail);
        }
        body
    }
}

impl From<FieldMapError> for ApiError {
    fn from(err: FieldMapError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Validation(format!("Formulario inválido: {}", err))
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MediaHostNotConfigured => ApiError::Configuration(err.to_string()),
            IngestError::UploadError(err) => ApiError::Upstream(err),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Configuration(err.to_string())
    }
}
