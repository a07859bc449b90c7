mod catalog;
mod config;
mod error;
mod models;
mod multipart;
mod routes;
mod service;
mod store;
#[cfg(test)]
mod testing;
mod util;

use crate::config::Config;
use crate::error::ApiError;
use worker::*;

const D1_PRODUCTS: &str = "DB";
const HEADER_ADMIN_KEY: &str = "X-Admin-Key";

#[event(fetch)]
async fn fetch(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    console_error_panic_hook::set_once();

    // 設定はリクエストごとに読む
    let config = match Config::from_env(&env) {
        Ok(config) => config,
        Err(err) => return routes::error_response(&ApiError::from(err)),
    };

    // Router設定
    let router = Router::with_data(config);

    router
        // GET/OPTIONS は認証不要、POST/PUT/DELETE は X-Admin-Key が必要
        .on_async("/api/products", routes::products::handle)
        .run(req, env)
        .await
}
