use serde_json::{json, Map, Value};
use worker::Method;

use crate::config::{Config, IdGeneration};
use crate::error::ApiError;
use crate::models::{images, slug, FieldMapError, NewProduct, ProductRead, UpdateSet};
use crate::multipart::{self, MultipartError, Submission};
use crate::service::MediaHost;
use crate::store::ProductStore;

/// 未解析のリクエスト本文。認証が通るまで解析しない
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Body {
    fn is_multipart(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("multipart/form-data"))
    }
}

#[derive(Debug)]
pub struct CatalogRequest {
    pub method: Method,
    /// `?id=` (空文字は未指定と同じ)
    pub id: Option<String>,
    pub admin_key: Option<String>,
    pub body: Body,
}

#[derive(Debug, PartialEq)]
pub enum Reply {
    Products(Vec<ProductRead>),
    Product(ProductRead),
    Created(ProductRead),
    Updated(ProductRead),
    Deleted(String),
    Preflight,
}

impl Reply {
    pub fn status(&self) -> u16 {
        match self {
            Reply::Created(_) => 201,
            Reply::Preflight => 204,
            _ => 200,
        }
    }

    /// `Preflight` は本文なし
    pub fn body(&self) -> Option<Value> {
        match self {
            Reply::Products(products) => Some(json!(products)),
            Reply::Product(product) => Some(json!(product)),
            Reply::Created(product) => Some(json!({
                "message": "Producto creado exitosamente",
                "product": product,
            })),
            Reply::Updated(product) => Some(json!({
                "message": "Producto actualizado exitosamente",
                "product": product,
            })),
            Reply::Deleted(id) => Some(json!({
                "message": format!("Producto con ID {} eliminado exitosamente.", id),
            })),
            Reply::Preflight => None,
        }
    }
}

/// 商品の読み書き。ストアとメディアホストは呼び出し側が用意する
pub struct Catalog<'a, S, M> {
    store: &'a S,
    media: Option<&'a M>,
    config: &'a Config,
}

impl<'a, S: ProductStore, M: MediaHost> Catalog<'a, S, M> {
    pub fn new(store: &'a S, media: Option<&'a M>, config: &'a Config) -> Self {
        Self {
            store,
            media,
            config,
        }
    }

    pub async fn handle(&self, request: CatalogRequest) -> Result<Reply, ApiError> {
        let CatalogRequest {
            method,
            id,
            admin_key,
            body,
        } = request;
        let id = id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());

        match method {
            Method::Options => return Ok(Reply::Preflight),
            Method::Get => {
                return match id {
                    Some(id) => self.get(&id).await.map(Reply::Product),
                    None => self.list().await.map(Reply::Products),
                }
            }
            _ => {}
        }

        // 読み取り以外は全て認証が必要
        self.authorize(admin_key.as_deref())?;

        match method {
            Method::Post => {
                let submission = self.parse(body).await?;
                self.create(submission).await.map(Reply::Created)
            }
            Method::Put => {
                let id = id.ok_or(FieldMapError::MissingId)?;
                let submission = self.parse(body).await?;
                self.update(&id, submission).await.map(Reply::Updated)
            }
            Method::Delete => {
                let id = id.ok_or(FieldMapError::MissingId)?;
                self.delete(&id).await?;
                Ok(Reply::Deleted(id))
            }
            _ => Err(ApiError::MethodNotAllowed),
        }
    }

    pub fn authorize(&self, supplied: Option<&str>) -> Result<(), ApiError> {
        let expected = self.config.admin_key.as_deref().ok_or_else(|| {
            ApiError::Configuration("ADMIN_SECRET_KEY is not configured".into())
        })?;
        match supplied {
            Some(key) if key == expected => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }

    /// multipart ならファイルをアップロードし、それ以外はJSONオブジェクトとして読む
    pub async fn parse(&self, body: Body) -> Result<Submission, ApiError> {
        if body.is_multipart() {
            let content_type = body.content_type.as_deref().unwrap_or_default();
            let boundary = multipart::boundary(content_type).ok_or(MultipartError::MissingBoundary)?;
            let parts = multipart::parse(&body.bytes, &boundary)?;
            return Ok(multipart::ingest(parts, self.media).await?);
        }

        match serde_json::from_slice::<Value>(&body.bytes) {
            Ok(Value::Object(fields)) => Ok(Submission {
                fields,
                uploaded: vec![],
            }),
            Ok(_) => Err(ApiError::Validation(
                "El cuerpo de la solicitud debe ser un objeto JSON.".into(),
            )),
            Err(e) => Err(ApiError::Validation(format!("JSON inválido: {}", e))),
        }
    }

    pub async fn list(&self) -> Result<Vec<ProductRead>, ApiError> {
        let rows = self.store.list().await?;
        Ok(rows.into_iter().map(ProductRead::from).collect())
    }

    pub async fn get(&self, id: &str) -> Result<ProductRead, ApiError> {
        self.store
            .find(id)
            .await?
            .map(ProductRead::from)
            .ok_or(ApiError::NotFound("Producto no encontrado."))
    }

    pub async fn create(&self, submission: Submission) -> Result<ProductRead, ApiError> {
        let product = NewProduct::from_fields(with_images(submission)?)?;

        let id = match (product.id(), self.config.id_generation) {
            (Some(id), _) => {
                if self.store.exists(id).await? {
                    return Err(ApiError::Conflict(format!(
                        "Ya existe un producto con ID {}.",
                        id
                    )));
                }
                id.to_string()
            }
            (None, IdGeneration::Server) => slug::unique_id(self.store, product.nombre()).await?,
            (None, IdGeneration::ClientSupplied) => return Err(FieldMapError::MissingId.into()),
        };

        let row = self.store.insert(&id, &product).await?;
        Ok(row.into())
    }

    pub async fn update(&self, id: &str, submission: Submission) -> Result<ProductRead, ApiError> {
        let set = UpdateSet::from_fields(with_images(submission)?)?;
        self.store
            .update(id, &set)
            .await?
            .map(ProductRead::from)
            .ok_or(ApiError::NotFound("Producto no encontrado para actualizar."))
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        if self.store.delete(id).await? {
            Ok(())
        } else {
            Err(ApiError::NotFound("Producto no encontrado para eliminar."))
        }
    }
}

/// アップロードされた画像を `imagenes` として fields に入れる
fn with_images(submission: Submission) -> Result<Map<String, Value>, FieldMapError> {
    let Submission {
        mut fields,
        uploaded,
    } = submission;
    let submitted = fields.remove("imagenes");
    if let Some(urls) = images::resolve(uploaded, submitted)? {
        fields.insert("imagenes".into(), Value::from(urls));
    }
    Ok(fields)
}
