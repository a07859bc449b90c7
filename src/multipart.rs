use futures::future::try_join_all;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::service::{MediaHost, UploadError};
use crate::util::find_bytes;

/// ファイルパート
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Field { name: String, value: String },
    File(FilePart),
}

#[derive(Error, Debug, PartialEq)]
pub enum MultipartError {
    #[error("multipart body has no boundary")]
    MissingBoundary,
    #[error("malformed multipart body: {0}")]
    Malformed(&'static str),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("an image was uploaded but no media host is configured")]
    MediaHostNotConfigured,
    #[error(transparent)]
    UploadError(#[from] UploadError),
}

/// `Content-Type` ヘッダーから boundary を取り出す
pub fn boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .filter(|b| !b.is_empty())
}

pub fn parse(body: &[u8], boundary: &str) -> Result<Vec<Part>, MultipartError> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut closing = b"\r\n".to_vec();
    closing.extend_from_slice(&delimiter);

    let mut pos = find_bytes(body, &delimiter, 0).ok_or(MultipartError::MissingBoundary)?;
    let mut parts = Vec::new();

    loop {
        pos += delimiter.len();
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            return Ok(parts);
        }
        if !rest.starts_with(b"\r\n") {
            return Err(MultipartError::Malformed("expected a line break after the boundary"));
        }
        pos += 2;

        let (headers, content_start) = if body[pos..].starts_with(b"\r\n") {
            ("", pos + 2)
        } else {
            let end = find_bytes(body, b"\r\n\r\n", pos)
                .ok_or(MultipartError::Malformed("unterminated part headers"))?;
            let headers = std::str::from_utf8(&body[pos..end])
                .map_err(|_| MultipartError::Malformed("part headers are not UTF-8"))?;
            (headers, end + 4)
        };

        let content_end = find_bytes(body, &closing, content_start)
            .ok_or(MultipartError::Malformed("missing closing boundary"))?;
        parts.push(Part::from_raw(headers, &body[content_start..content_end])?);

        // 次の区切りの先頭へ
        pos = content_end + 2;
    }
}

impl Part {
    fn from_raw(headers: &str, content: &[u8]) -> Result<Part, MultipartError> {
        let mut name = None;
        let mut filename = None;
        let mut content_type = None;

        for line in headers.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.eq_ignore_ascii_case("content-disposition") {
                for param in split_params(value) {
                    let Some((k, v)) = param.split_once('=') else {
                        continue;
                    };
                    let v = unquote(v.trim());
                    match k.trim().to_ascii_lowercase().as_str() {
                        "name" => name = Some(v),
                        "filename" => filename = Some(v),
                        _ => {}
                    }
                }
            } else if key.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_string());
            }
        }

        let name = name.ok_or(MultipartError::Malformed("part without a field name"))?;
        Ok(match filename {
            Some(filename) => Part::File(FilePart {
                field: name,
                filename,
                content_type: content_type.unwrap_or_else(|| "application/octet-stream".into()),
                bytes: content.to_vec(),
            }),
            None => Part::Field {
                name,
                value: String::from_utf8_lossy(content).into_owned(),
            },
        })
    }
}

/// `;` で区切る。ただし引用符の中は区切らない
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

/// ヘッダーの引用符の中に書ける形にする
fn quote(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .replace('"', "\\\"")
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .replace("\\\"", "\"")
}

/// 解析済みのフォーム
#[derive(Debug, Default, PartialEq)]
pub struct Submission {
    pub fields: Map<String, Value>,
    /// アップロードされた画像のURL (パートの順)
    pub uploaded: Vec<String>,
}

/// テキストはJSONとしてデコードを試み、ファイルはメディアホストへアップロードする
///
/// アップロードは並行して行い、結果はパートの順に並べる。
/// 一つでも失敗すれば全体が失敗する (アップロード済みの画像は残る)。
pub async fn ingest<M: MediaHost>(
    parts: Vec<Part>,
    media: Option<&M>,
) -> Result<Submission, IngestError> {
    let mut fields = Map::new();
    let mut files = Vec::new();

    for part in parts {
        match part {
            Part::Field { name, value } => {
                let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
                fields.insert(name, value);
            }
            // 空のファイル入力
            Part::File(file) if file.filename.is_empty() && file.bytes.is_empty() => {}
            Part::File(file) => files.push(file),
        }
    }

    if files.is_empty() {
        return Ok(Submission {
            fields,
            uploaded: vec![],
        });
    }

    let media = media.ok_or(IngestError::MediaHostNotConfigured)?;
    let uploaded = try_join_all(files.iter().map(|file| media.upload(file))).await?;

    Ok(Submission { fields, uploaded })
}

/// multipart/form-data の本文を組み立てる
pub struct FormBuilder {
    boundary: String,
    body: Vec<u8>,
}

impl FormBuilder {
    pub fn new<T: Into<String>>(boundary: T) -> Self {
        Self {
            boundary: boundary.into(),
            body: Vec::new(),
        }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                quote(name)
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                quote(name),
                quote(filename)
            )
            .as_bytes(),
        );
        self.body
            .extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMediaHost;
    use serde_json::json;

    const BOUNDARY: &str = "----formdata-boundary-1234567890";

    #[test]
    fn boundary_is_read_from_content_type() {
        assert_eq!(
            boundary("multipart/form-data; boundary=----WebKitFormBoundaryx7"),
            Some("----WebKitFormBoundaryx7".into())
        );
        assert_eq!(
            boundary("multipart/form-data; charset=utf-8; boundary=\"abc def\""),
            Some("abc def".into())
        );
        assert_eq!(boundary("multipart/form-data"), None);
        assert_eq!(boundary("multipart/form-data; boundary="), None);
    }

    #[test]
    fn parses_text_and_file_parts_in_order() {
        let body = FormBuilder::new(BOUNDARY)
            .text("nombre", "Red Cap")
            .file("image0", "cap.png", "image/png", b"\x89PNG\r\n--not-a-boundary")
            .text("precio", "12.5")
            .finish();

        let parts = parse(&body, BOUNDARY).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[0],
            Part::Field {
                name: "nombre".into(),
                value: "Red Cap".into()
            }
        );
        match &parts[1] {
            Part::File(file) => {
                assert_eq!(file.field, "image0");
                assert_eq!(file.filename, "cap.png");
                assert_eq!(file.content_type, "image/png");
                assert_eq!(file.bytes, b"\x89PNG\r\n--not-a-boundary");
            }
            other => panic!("expected a file part, got {:?}", other),
        }
        assert_eq!(
            parts[2],
            Part::Field {
                name: "precio".into(),
                value: "12.5".into()
            }
        );
    }

    #[test]
    fn quoted_filenames_may_contain_semicolons() {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"image0\"; filename=\"a;b.jpg\"\r\n\r\nxx\r\n--{b}--\r\n",
            b = BOUNDARY
        );
        match &parse(body.as_bytes(), BOUNDARY).unwrap()[0] {
            Part::File(file) => {
                assert_eq!(file.filename, "a;b.jpg");
                assert_eq!(file.content_type, "application/octet-stream");
            }
            other => panic!("expected a file part, got {:?}", other),
        }
    }

    #[test]
    fn quotes_in_filenames_survive_the_builder() {
        let body = FormBuilder::new(BOUNDARY)
            .file("image0", "my \"best\"; cap\r\n.png", "image/png", b"1")
            .text("nombre", "Cap")
            .finish();
        let header = String::from_utf8_lossy(&body);
        assert!(header.contains(r#"filename="my \"best\"; cap.png""#));

        let parts = parse(&body, BOUNDARY).unwrap();
        assert_eq!(parts.len(), 2);
        match &parts[0] {
            Part::File(file) => assert_eq!(file.filename, "my \"best\"; cap.png"),
            other => panic!("expected a file part, got {:?}", other),
        }
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        assert_eq!(
            parse(b"no delimiter here", BOUNDARY),
            Err(MultipartError::MissingBoundary)
        );

        let unterminated = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue",
            BOUNDARY
        );
        assert_eq!(
            parse(unterminated.as_bytes(), BOUNDARY),
            Err(MultipartError::Malformed("missing closing boundary"))
        );

        let nameless = format!(
            "--{b}\r\nContent-Type: text/plain\r\n\r\nvalue\r\n--{b}--\r\n",
            b = BOUNDARY
        );
        assert_eq!(
            parse(nameless.as_bytes(), BOUNDARY),
            Err(MultipartError::Malformed("part without a field name"))
        );
    }

    #[test]
    fn empty_form_has_no_parts() {
        let body = FormBuilder::new(BOUNDARY).finish();
        assert!(parse(&body, BOUNDARY).unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_values_are_json_decoded_with_string_fallback() {
        let body = FormBuilder::new(BOUNDARY)
            .text("nombre", "Red Cap")
            .text("precio", "12.5")
            .text("imagenes", r#"["https://a/1.jpg"]"#)
            .text("categoria", "{broken")
            .finish();
        let parts = parse(&body, BOUNDARY).unwrap();

        let submission = ingest::<FakeMediaHost>(parts, None).await.unwrap();
        assert_eq!(submission.fields["nombre"], json!("Red Cap"));
        assert_eq!(submission.fields["precio"], json!(12.5));
        assert_eq!(submission.fields["imagenes"], json!(["https://a/1.jpg"]));
        assert_eq!(submission.fields["categoria"], json!("{broken"));
        assert!(submission.uploaded.is_empty());
    }

    #[tokio::test]
    async fn uploads_keep_part_order_regardless_of_completion_order() {
        let media = FakeMediaHost::default();
        let body = FormBuilder::new(BOUNDARY)
            .file("image0", "first.png", "image/png", b"1")
            .text("nombre", "Cap")
            .file("image1", "second.png", "image/png", b"22")
            .file("image2", "third.png", "image/png", b"333")
            .finish();
        let parts = parse(&body, BOUNDARY).unwrap();

        let submission = ingest(parts, Some(&media)).await.unwrap();
        assert_eq!(
            submission.uploaded,
            vec![
                "https://media.test/first.png",
                "https://media.test/second.png",
                "https://media.test/third.png"
            ]
        );
        // 後のパートほど早く完了する
        assert_eq!(
            media.completed(),
            vec!["third.png", "second.png", "first.png"]
        );
    }

    #[tokio::test]
    async fn one_failed_upload_fails_the_ingestion() {
        let media = FakeMediaHost::failing_on("second.png");
        let body = FormBuilder::new(BOUNDARY)
            .file("image0", "first.png", "image/png", b"1")
            .file("image1", "second.png", "image/png", b"2")
            .finish();
        let parts = parse(&body, BOUNDARY).unwrap();

        let err = ingest(parts, Some(&media)).await.unwrap_err();
        assert!(matches!(err, IngestError::UploadError(_)));
    }

    #[tokio::test]
    async fn empty_file_inputs_are_skipped() {
        let body = FormBuilder::new(BOUNDARY)
            .text("nombre", "Cap")
            .file("image0", "", "application/octet-stream", b"")
            .finish();
        let parts = parse(&body, BOUNDARY).unwrap();

        // メディアホストが無くてもアップロードが無いので成功する
        let submission = ingest::<FakeMediaHost>(parts, None).await.unwrap();
        assert!(submission.uploaded.is_empty());
    }

    #[tokio::test]
    async fn files_without_a_media_host_are_a_configuration_problem() {
        let body = FormBuilder::new(BOUNDARY)
            .file("image0", "cap.png", "image/png", b"1")
            .finish();
        let parts = parse(&body, BOUNDARY).unwrap();

        let err = ingest::<FakeMediaHost>(parts, None).await.unwrap_err();
        assert!(matches!(err, IngestError::MediaHostNotConfigured));
    }
}
