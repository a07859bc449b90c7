//! テスト用のインメモリ実装

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::models::{NewProduct, ProductRow, UpdateSet};
use crate::multipart::FilePart;
use crate::service::{MediaHost, UploadError};
use crate::store::{ProductStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    rows: RefCell<BTreeMap<String, ProductRow>>,
    existence_checks: Cell<usize>,
    failing: Cell<bool>,
}

impl MemoryStore {
    pub fn with_ids(ids: &[&str]) -> Self {
        let store = Self::default();
        for id in ids {
            store.put(ProductRow {
                id: id.to_string(),
                nombre: id.to_string(),
                descripcion: None,
                descripcion_corta: None,
                precio: 1.0,
                precio_original: None,
                descuento: None,
                imagenes: Some("[]".into()),
                stock: Some(0),
                categoria: None,
                tipo: Some("general".into()),
            });
        }
        store
    }

    pub fn put(&self, row: ProductRow) {
        self.rows.borrow_mut().insert(row.id.clone(), row);
    }

    pub fn get(&self, id: &str) -> Option<ProductRow> {
        self.rows.borrow().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.borrow().len()
    }

    pub fn existence_checks(&self) -> usize {
        self.existence_checks.get()
    }

    /// 以降の操作を全て失敗させる
    pub fn fail(&self) {
        self.failing.set(true);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.get() {
            Err(StoreError::Backend("D1_ERROR: database is unavailable".into()))
        } else {
            Ok(())
        }
    }
}

fn to_row(map: Map<String, Value>) -> Result<ProductRow, StoreError> {
    serde_json::from_value(Value::Object(map)).map_err(|e| StoreError::Backend(e.to_string()))
}

impl ProductStore for MemoryStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.existence_checks.set(self.existence_checks.get() + 1);
        Ok(self.rows.borrow().contains_key(id))
    }

    async fn find(&self, id: &str) -> Result<Option<ProductRow>, StoreError> {
        self.check()?;
        Ok(self.get(id))
    }

    async fn list(&self) -> Result<Vec<ProductRow>, StoreError> {
        self.check()?;
        Ok(self.rows.borrow().values().cloned().collect())
    }

    async fn insert(&self, id: &str, product: &NewProduct) -> Result<ProductRow, StoreError> {
        self.check()?;
        if self.rows.borrow().contains_key(id) {
            return Err(StoreError::Backend(
                "UNIQUE constraint failed: productos.id".into(),
            ));
        }
        let mut map = Map::new();
        map.insert("id".into(), Value::String(id.into()));
        for (column, value) in product.columns() {
            map.insert(column.into(), value);
        }
        let row = to_row(map)?;
        self.put(row.clone());
        Ok(row)
    }

    async fn update(&self, id: &str, set: &UpdateSet) -> Result<Option<ProductRow>, StoreError> {
        self.check()?;
        let Some(row) = self.get(id) else {
            return Ok(None);
        };
        let mut map = match serde_json::to_value(row) {
            Ok(Value::Object(map)) => map,
            _ => return Err(StoreError::Backend("row is not an object".into())),
        };
        for (field, value) in set.assignments() {
            map.insert(field.column().into(), value.clone());
        }
        let row = to_row(map)?;
        self.put(row.clone());
        Ok(Some(row))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.rows.borrow_mut().remove(id).is_some())
    }
}

/// `https://media.test/<filename>` を返すメディアホスト
///
/// 小さいファイルほど完了が遅い。
#[derive(Default)]
pub struct FakeMediaHost {
    fail_on: Option<String>,
    completed: RefCell<Vec<String>>,
}

impl FakeMediaHost {
    pub fn failing_on(filename: &str) -> Self {
        Self {
            fail_on: Some(filename.into()),
            ..Self::default()
        }
    }

    /// 完了した順のファイル名
    pub fn completed(&self) -> Vec<String> {
        self.completed.borrow().clone()
    }
}

impl MediaHost for FakeMediaHost {
    async fn upload(&self, file: &FilePart) -> Result<String, UploadError> {
        for _ in 0..4usize.saturating_sub(file.bytes.len()) {
            tokio::task::yield_now().await;
        }
        if self.fail_on.as_deref() == Some(file.filename.as_str()) {
            return Err(UploadError::Rejected {
                filename: file.filename.clone(),
                status: 400,
                message: "Invalid image file".into(),
            });
        }
        self.completed.borrow_mut().push(file.filename.clone());
        Ok(format!("https://media.test/{}", file.filename))
    }
}
