use serde_json::{Map, Value};
use thiserror::Error;

use super::images;
use crate::util::scalar_to_text;

pub const TABLE: &str = "productos";

/// 更新可能なカラム
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProductField {
    Nombre,
    Descripcion,
    DescripcionCorta,
    Precio,
    PrecioOriginal,
    Descuento,
    Imagenes,
    Stock,
    Categoria,
    Tipo,
}

#[derive(Error, Debug, PartialEq)]
pub enum FieldMapError {
    #[error("No se proporcionaron datos para actualizar.")]
    Empty,
    #[error("Campo desconocido '{0}'.")]
    UnknownField(String),
    #[error("El campo '{field}' {reason}.")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    #[error("Nombre y precio son campos requeridos.")]
    MissingRequired,
    #[error("ID del producto es requerido.")]
    MissingId,
}

impl ProductField {
    pub const ALL: [ProductField; 10] = [
        ProductField::Nombre,
        ProductField::Descripcion,
        ProductField::DescripcionCorta,
        ProductField::Precio,
        ProductField::PrecioOriginal,
        ProductField::Descuento,
        ProductField::Imagenes,
        ProductField::Stock,
        ProductField::Categoria,
        ProductField::Tipo,
    ];

    /// 外部のフィールド名からの変換。`id` は更新対象ではないので `None`
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "nombre" => Some(Self::Nombre),
            "descripcion" => Some(Self::Descripcion),
            "descripcion_corta" | "descripcionCorta" => Some(Self::DescripcionCorta),
            "precio" => Some(Self::Precio),
            "precioOriginal" | "precio_original" => Some(Self::PrecioOriginal),
            "descuento" => Some(Self::Descuento),
            "imagenes" => Some(Self::Imagenes),
            "stock" => Some(Self::Stock),
            "categoria" => Some(Self::Categoria),
            "tipo" => Some(Self::Tipo),
            _ => None,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Nombre => "nombre",
            Self::Descripcion => "descripcion",
            Self::DescripcionCorta => "descripcion_corta",
            Self::Precio => "precio",
            Self::PrecioOriginal => "precio_original",
            Self::Descuento => "descuento",
            Self::Imagenes => "imagenes",
            Self::Stock => "stock",
            Self::Categoria => "categoria",
            Self::Tipo => "tipo",
        }
    }

    /// 作成時に値が無い場合に保存する値
    pub fn default_value(self) -> Value {
        match self {
            Self::Imagenes => Value::String("[]".into()),
            Self::Stock => Value::from(0),
            Self::Tipo => Value::String(super::product::DEFAULT_TIPO.into()),
            _ => Value::Null,
        }
    }

    /// Checks the value and converts it to what gets bound for this column.
    pub fn normalize(self, value: Value) -> Result<Value, FieldMapError> {
        let field = self.column();
        match self {
            Self::Nombre => match scalar_to_text(&value) {
                Some(name) if !name.trim().is_empty() => Ok(Value::String(name)),
                _ => Err(FieldMapError::InvalidValue {
                    field,
                    reason: "debe ser un texto no vacío",
                }),
            },
            Self::Descripcion | Self::DescripcionCorta | Self::Categoria | Self::Tipo => {
                match value {
                    Value::Null => Ok(Value::Null),
                    other => scalar_to_text(&other)
                        .map(Value::String)
                        .ok_or(FieldMapError::InvalidValue {
                            field,
                            reason: "debe ser texto",
                        }),
                }
            }
            Self::Precio => match number(&value) {
                Some(n) if n >= 0.0 => Ok(Value::from(n)),
                _ => Err(FieldMapError::InvalidValue {
                    field,
                    reason: "debe ser un número no negativo",
                }),
            },
            Self::PrecioOriginal | Self::Descuento => match value {
                Value::Null => Ok(Value::Null),
                other => match number(&other) {
                    Some(n) if n >= 0.0 => Ok(Value::from(n)),
                    _ => Err(FieldMapError::InvalidValue {
                        field,
                        reason: "debe ser un número no negativo",
                    }),
                },
            },
            Self::Stock => match value {
                Value::Null => Ok(Value::Null),
                other => match integer(&other) {
                    Some(n) if n >= 0 => Ok(Value::from(n)),
                    _ => Err(FieldMapError::InvalidValue {
                        field,
                        reason: "debe ser un entero no negativo",
                    }),
                },
            },
            Self::Imagenes => {
                let urls = images::urls_from_value(value)?;
                Ok(Value::String(images::encode(&urls)))
            }
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// 外部のフィールドを検証済みの (カラム, 値) の組にする。`id` は除外する
pub fn resolve_fields(
    fields: Map<String, Value>,
) -> Result<Vec<(ProductField, Value)>, FieldMapError> {
    let mut resolved: Vec<(ProductField, Value)> = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        if key == "id" {
            continue;
        }
        let field = ProductField::from_key(&key).ok_or(FieldMapError::UnknownField(key))?;
        let value = field.normalize(value)?;
        match resolved.iter_mut().find(|(f, _)| *f == field) {
            Some(existing) => existing.1 = value,
            None => resolved.push((field, value)),
        }
    }
    Ok(resolved)
}

/// 位置パラメータ付きのSQL文
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Sparse patch: only the supplied columns are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSet {
    assignments: Vec<(ProductField, Value)>,
}

impl UpdateSet {
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, FieldMapError> {
        // NOT NULL のカラムを null にするとデフォルト値に戻す
        let assignments: Vec<_> = resolve_fields(fields)?
            .into_iter()
            .map(|(field, value)| match value {
                Value::Null => (field, field.default_value()),
                value => (field, value),
            })
            .collect();
        if assignments.is_empty() {
            return Err(FieldMapError::Empty);
        }
        Ok(Self { assignments })
    }

    pub fn assignments(&self) -> &[(ProductField, Value)] {
        &self.assignments
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.assignments.iter().map(|(f, _)| f.column()).collect()
    }

    pub fn statement(&self, id: &str) -> Statement {
        let set = self
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut params: Vec<Value> = self.assignments.iter().map(|(_, v)| v.clone()).collect();
        params.push(Value::String(id.into()));
        Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE id = ?{} RETURNING *",
                TABLE,
                set,
                params.len()
            ),
            params,
        }
    }
}
