use serde::Deserialize;
use sha2::{Digest, Sha256};
use worker::{console_debug, Fetch, Method, Request, RequestInit};

use super::{MediaHost, UploadError};
use crate::config::MediaHostConfig;
use crate::multipart::{FilePart, FormBuilder};
use crate::util::extension_from_content_type;

const UPLOAD_FORMAT: &str = "webp";
const BOUNDARY: &str = "----formdata-boundary-1234567890";

pub struct Cloudinary {
    config: MediaHostConfig,
    upload_url: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

impl Cloudinary {
    pub fn new(config: MediaHostConfig) -> Self {
        let upload_url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            config.cloud_name
        );
        Self { config, upload_url }
    }

    /// 署名対象のパラメータ (`file` と `api_key` は含まない)
    fn signed_params(&self, timestamp: u64) -> Vec<(&'static str, String)> {
        vec![
            ("folder", self.config.folder.clone()),
            ("format", UPLOAD_FORMAT.to_string()),
            ("timestamp", timestamp.to_string()),
        ]
    }

    fn form(&self, file: &FilePart, timestamp: u64) -> FormBuilder {
        let params = self.signed_params(timestamp);
        let signature = signature(&params, &self.config.api_secret);

        let filename = if file.filename.is_empty() {
            format!("upload.{}", extension_from_content_type(&file.content_type))
        } else {
            file.filename.clone()
        };

        let mut form = FormBuilder::new(BOUNDARY).file(
            "file",
            &filename,
            &file.content_type,
            &file.bytes,
        );
        for (key, value) in &params {
            form = form.text(key, value);
        }
        form.text("api_key", &self.config.api_key)
            .text("signature", &signature)
            .text("signature_algorithm", "sha256")
    }
}

/// パラメータをキー順に `k=v&...` と並べ、API secret を付けて SHA-256 を取る
pub fn signature(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    let hash = hasher.finalize();

    format!("{:x}", hash)
}

/// アップロードAPIの応答を公開URLにする。2xx 以外は全て失敗
pub fn read_response(status: u16, text: &str, filename: &str) -> Result<String, UploadError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorResponse>(text)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| text.to_string());
        return Err(UploadError::Rejected {
            filename: filename.to_string(),
            status,
            message,
        });
    }

    let uploaded: UploadResponse =
        serde_json::from_str(text).map_err(|e| UploadError::HttpError(e.to_string()))?;
    uploaded
        .secure_url
        .or(uploaded.url)
        .ok_or(UploadError::MissingUrl)
}

impl MediaHost for Cloudinary {
    async fn upload(&self, file: &FilePart) -> Result<String, UploadError> {
        let timestamp = (js_sys::Date::now() / 1000.0) as u64;
        let form = self.form(file, timestamp);
        let content_type = form.content_type();
        let body = form.finish();

        let mut init = RequestInit::new();
        init.with_method(Method::Post);
        init.with_body(Some(body.into()));

        let headers = worker::Headers::new();
        headers.set("Content-Type", &content_type)?;
        init.with_headers(headers);

        // 再試行はしない
        let request = Request::new_with_init(&self.upload_url, &init)?;
        let mut response = Fetch::Request(request).send().await?;
        let status = response.status_code();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let url = read_response(status, &text, &file.filename)?;
        console_debug!("Uploaded '{}' to {}", file.filename, url);
        Ok(url)
    }
}
