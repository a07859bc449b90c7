use crate::store::{ProductStore, StoreError};

const FALLBACK_SLUG: &str = "product";

/// 商品名からIDを作る。小文字化し、スペースをハイフンにして `[a-z0-9_-]` 以外を取り除く
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if slug.is_empty() {
        FALLBACK_SLUG.into()
    } else {
        slug
    }
}

/// 既存のIDと衝突しないIDを探す (`base`, `base-1`, `base-2`, ...)
///
/// 候補ごとに1回ずつ存在確認をする。トランザクションではないので、
/// 同時に同じ名前で作成された場合はINSERT時にエラーになる。
pub async fn unique_id<S: ProductStore>(store: &S, name: &str) -> Result<String, StoreError> {
    let base = slugify(name);
    let mut candidate = base.clone();
    let mut counter = 0u32;
    while store.exists(&candidate).await? {
        counter += 1;
        candidate = format!("{}-{}", base, counter);
    }
    Ok(candidate)
}
