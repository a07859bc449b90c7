pub mod fields;
pub mod images;
pub mod product;
pub mod slug;

pub use fields::{FieldMapError, Statement, UpdateSet};
pub use product::{NewProduct, ProductRead, ProductRow};
