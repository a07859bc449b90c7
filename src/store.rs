use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use wasm_bindgen::JsValue;
use worker::{D1Database, D1PreparedStatement};

use crate::models::fields::TABLE;
use crate::models::{NewProduct, ProductRow, Statement, UpdateSet};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    WorkerError(#[from] worker::Error),
    #[error("failed to bind parameter: {0}")]
    BindError(String),
    #[error("{0}")]
    Backend(String),
}

/// 商品テーブルへのアクセス。どの操作も1文で完結する
#[allow(async_fn_in_trait)]
pub trait ProductStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError>;
    async fn find(&self, id: &str) -> Result<Option<ProductRow>, StoreError>;
    async fn list(&self) -> Result<Vec<ProductRow>, StoreError>;
    async fn insert(&self, id: &str, product: &NewProduct) -> Result<ProductRow, StoreError>;
    /// 一致する行が無ければ `None`
    async fn update(&self, id: &str, set: &UpdateSet) -> Result<Option<ProductRow>, StoreError>;
    /// 削除した場合 `true`
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

pub struct D1ProductStore {
    db: D1Database,
}

impl D1ProductStore {
    pub fn new(db: D1Database) -> Self {
        Self { db }
    }

    fn prepare(&self, statement: &Statement) -> Result<D1PreparedStatement, StoreError> {
        let params = statement
            .params
            .iter()
            .map(to_js)
            .collect::<Result<Vec<JsValue>, StoreError>>()?;
        Ok(self.db.prepare(statement.sql.as_str()).bind(&params)?)
    }

    fn by_id(&self, sql: String, id: &str) -> Result<D1PreparedStatement, StoreError> {
        self.prepare(&Statement {
            sql,
            params: vec![Value::String(id.into())],
        })
    }
}

fn to_js(value: &Value) -> Result<JsValue, StoreError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| StoreError::BindError(e.to_string()))
}

impl ProductStore for D1ProductStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let row = self
            .by_id(format!("SELECT id FROM {} WHERE id = ?1", TABLE), id)?
            .first::<Value>(None)
            .await?;
        Ok(row.is_some())
    }

    async fn find(&self, id: &str) -> Result<Option<ProductRow>, StoreError> {
        Ok(self
            .by_id(format!("SELECT * FROM {} WHERE id = ?1", TABLE), id)?
            .first::<ProductRow>(None)
            .await?)
    }

    async fn list(&self) -> Result<Vec<ProductRow>, StoreError> {
        let result = self
            .db
            .prepare(format!("SELECT * FROM {} ORDER BY id", TABLE))
            .all()
            .await?;
        Ok(result.results::<ProductRow>()?)
    }

    async fn insert(&self, id: &str, product: &NewProduct) -> Result<ProductRow, StoreError> {
        self.prepare(&product.insert_statement(id))?
            .first::<ProductRow>(None)
            .await?
            .ok_or_else(|| StoreError::Backend(format!("insert of '{}' returned no row", id)))
    }

    async fn update(&self, id: &str, set: &UpdateSet) -> Result<Option<ProductRow>, StoreError> {
        Ok(self
            .prepare(&set.statement(id))?
            .first::<ProductRow>(None)
            .await?)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .by_id(
                format!("DELETE FROM {} WHERE id = ?1 RETURNING id", TABLE),
                id,
            )?
            .first::<Value>(None)
            .await?;
        Ok(deleted.is_some())
    }
}
