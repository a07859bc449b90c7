use worker::{console_debug, console_log, Error, Method, Request, Response, RouteContext};

use super::{cors, error_response, json_response};
use crate::catalog::{Body, Catalog, CatalogRequest, Reply};
use crate::config::Config;
use crate::error::ApiError;
use crate::service::cloudinary::Cloudinary;
use crate::store::D1ProductStore;
use crate::{D1_PRODUCTS, HEADER_ADMIN_KEY};

/// `/api/products` の全メソッド
pub async fn handle(mut req: Request, ctx: RouteContext<Config>) -> Result<Response, Error> {
    let method = req.method();

    // クエリパラメータの解析
    let id = req
        .url()?
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned());

    let admin_key = req.headers().get(HEADER_ADMIN_KEY)?;
    let body = match method {
        Method::Post | Method::Put => Body {
            content_type: req.headers().get("Content-Type")?,
            bytes: req.bytes().await?,
        },
        _ => Body::default(),
    };
    console_debug!("{:?} /api/products id={:?}", method, id);

    let store = match ctx.env.d1(D1_PRODUCTS) {
        Ok(db) => D1ProductStore::new(db),
        Err(err) => {
            return error_response(&ApiError::Configuration(format!(
                "D1 binding '{}' is not available: {}",
                D1_PRODUCTS, err
            )))
        }
    };
    let media = ctx.data.media.clone().map(Cloudinary::new);
    let catalog = Catalog::new(&store, media.as_ref(), &ctx.data);

    let request = CatalogRequest {
        method,
        id,
        admin_key,
        body,
    };
    match catalog.handle(request).await {
        Ok(reply) => {
            match &reply {
                Reply::Created(product) => console_log!(
                    "Created product '{}' with {} image(s)",
                    product.id,
                    product.imagenes.len()
                ),
                Reply::Updated(product) => console_log!("Updated product '{}'", product.id),
                Reply::Deleted(id) => console_log!("Deleted product '{}'", id),
                _ => {}
            }
            match reply.body() {
                Some(body) => json_response(&body, reply.status()),
                None => Response::empty()?
                    .with_status(reply.status())
                    .with_cors(&cors()),
            }
        }
        Err(err) => error_response(&err),
    }
}
