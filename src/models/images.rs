use serde_json::Value;

use super::fields::FieldMapError;

/// カンマ区切りのURLリストを分割する
pub fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(String::from)
        .collect()
}

/// 送信された `imagenes` の値をURLのリストにする
pub fn urls_from_value(value: Value) -> Result<Vec<String>, FieldMapError> {
    match value {
        Value::Null => Ok(vec![]),
        Value::String(raw) => Ok(split_urls(&raw)),
        Value::Array(items) => {
            let mut urls = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    // 配列の要素は分割しない (URLにカンマが入ることがある)
                    Value::String(url) => {
                        let url = url.trim();
                        if !url.is_empty() {
                            urls.push(url.to_string());
                        }
                    }
                    _ => {
                        return Err(FieldMapError::InvalidValue {
                            field: "imagenes",
                            reason: "solo puede contener URLs",
                        })
                    }
                }
            }
            Ok(urls)
        }
        _ => Err(FieldMapError::InvalidValue {
            field: "imagenes",
            reason: "debe ser una lista de URLs o un texto separado por comas",
        }),
    }
}

/// Uploaded files win outright; otherwise the submitted field is used.
/// `None` means no image information was sent at all.
pub fn resolve(
    uploaded: Vec<String>,
    submitted: Option<Value>,
) -> Result<Option<Vec<String>>, FieldMapError> {
    if !uploaded.is_empty() {
        return Ok(Some(uploaded));
    }
    submitted.map(urls_from_value).transpose()
}

/// DBにはJSON配列のテキストとして保存する
pub fn encode(urls: &[String]) -> String {
    Value::from(urls.to_vec()).to_string()
}

pub fn decode(stored: Option<&str>) -> Vec<String> {
    let Some(stored) = stored else {
        return vec![];
    };
    match serde_json::from_str::<Vec<String>>(stored) {
        Ok(urls) => urls,
        // 古い行はカンマ区切りのまま
        Err(_) => split_urls(stored),
    }
}
