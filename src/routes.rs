pub mod products;

use serde_json::Value;
use worker::{console_error, Cors, Error, Method, Response};

use crate::error::ApiError;
use crate::HEADER_ADMIN_KEY;

pub fn cors() -> Cors {
    Cors::new()
        .with_origins(vec!["*"])
        .with_methods(vec![
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Options,
        ])
        .with_allowed_headers(vec!["Content-Type", HEADER_ADMIN_KEY])
}

pub fn json_response(body: &Value, status: u16) -> Result<Response, Error> {
    Response::from_json(body)?
        .with_status(status)
        .with_cors(&cors())
}

pub fn error_response(err: &ApiError) -> Result<Response, Error> {
    let status = err.status();
    if status >= 500 {
        console_error!("{}: {:?}", err, err);
    }
    json_response(&err.body(), status)
}
