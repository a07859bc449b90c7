use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::fields::{resolve_fields, FieldMapError, ProductField, Statement, TABLE};
use super::images;
use crate::util::scalar_to_text;

pub const DEFAULT_TIPO: &str = "general";

/// `productos` テーブルの行
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProductRow {
    pub id: String,
    pub nombre: String,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default)]
    pub descripcion_corta: Option<String>,
    #[serde(deserialize_with = "numeric")]
    pub precio: f64,
    #[serde(default, deserialize_with = "optional_numeric")]
    pub precio_original: Option<f64>,
    #[serde(default, deserialize_with = "optional_numeric")]
    pub descuento: Option<f64>,
    #[serde(default)]
    pub imagenes: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub categoria: Option<String>,
    #[serde(default)]
    pub tipo: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

fn numeric<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Numeric::deserialize(deserializer)? {
        Numeric::Number(n) => Ok(n),
        Numeric::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid number '{}'", s))),
    }
}

fn optional_numeric<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Numeric>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Numeric::Number(n)) => Ok(Some(n)),
        Some(Numeric::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid number '{}'", s))),
    }
}

/// クライアントに返す形
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProductRead {
    pub id: String,
    pub nombre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion_corta: Option<String>,
    pub precio: f64,
    #[serde(
        rename = "precioOriginal",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub precio_original: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descuento: Option<f64>,
    pub imagenes: Vec<String>,
    pub stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,
    pub tipo: String,
}

impl From<ProductRow> for ProductRead {
    fn from(row: ProductRow) -> Self {
        let imagenes = images::decode(row.imagenes.as_deref());
        ProductRead {
            id: row.id,
            nombre: row.nombre,
            descripcion: row.descripcion,
            descripcion_corta: row.descripcion_corta,
            precio: row.precio,
            // 0 は「なし」と同じ扱い
            precio_original: row.precio_original.filter(|p| *p != 0.0),
            descuento: row.descuento.filter(|d| *d != 0.0),
            imagenes,
            stock: row.stock.unwrap_or(0),
            categoria: row.categoria,
            tipo: row
                .tipo
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TIPO.into()),
        }
    }
}

/// POSTで作成する商品。値は検証済み
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    id: Option<String>,
    values: Vec<(ProductField, Value)>,
}

impl NewProduct {
    pub fn from_fields(mut fields: Map<String, Value>) -> Result<Self, FieldMapError> {
        let id = fields
            .remove("id")
            .as_ref()
            .and_then(scalar_to_text)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let values = resolve_fields(fields)?;
        let has = |field| values.iter().any(|(f, _)| *f == field);
        if !has(ProductField::Nombre) || !has(ProductField::Precio) {
            return Err(FieldMapError::MissingRequired);
        }

        Ok(Self { id, values })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn nombre(&self) -> &str {
        self.values
            .iter()
            .find(|(f, _)| *f == ProductField::Nombre)
            .and_then(|(_, v)| v.as_str())
            .unwrap_or_default()
    }

    /// 全カラムの値。指定されなかったカラムはデフォルト値
    pub fn columns(&self) -> Vec<(&'static str, Value)> {
        ProductField::ALL
            .iter()
            .map(|field| {
                let value = self
                    .values
                    .iter()
                    .find(|(f, _)| f == field)
                    .map(|(_, v)| v.clone())
                    .filter(|v| !v.is_null())
                    .unwrap_or_else(|| field.default_value());
                (field.column(), value)
            })
            .collect()
    }

    pub fn insert_statement(&self, id: &str) -> Statement {
        let columns = self.columns();
        let names = columns
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len() + 1)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let mut params = vec![Value::String(id.into())];
        params.extend(columns.into_iter().map(|(_, v)| v));

        Statement {
            sql: format!(
                "INSERT INTO {} (id, {}) VALUES ({}) RETURNING *",
                TABLE, names, placeholders
            ),
            params,
        }
    }
}
