use thiserror::Error;
use worker::Env;

pub const VAR_ADMIN_SECRET_KEY: &str = "ADMIN_SECRET_KEY";
pub const VAR_CLOUDINARY_CLOUD_NAME: &str = "CLOUDINARY_CLOUD_NAME";
pub const VAR_CLOUDINARY_API_KEY: &str = "CLOUDINARY_API_KEY";
pub const VAR_CLOUDINARY_API_SECRET: &str = "CLOUDINARY_API_SECRET";
pub const VAR_CLOUDINARY_FOLDER: &str = "CLOUDINARY_FOLDER";
pub const VAR_ID_GENERATION: &str = "ID_GENERATION";

const DEFAULT_FOLDER: &str = "myshop_products";

/// IDの決め方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdGeneration {
    /// 名前から生成する (クライアントがIDを指定した場合はそれを使う)
    #[default]
    Server,
    /// クライアントが必ず指定する
    ClientSupplied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHostConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    /// 未設定の場合、書き込みは全て設定エラーになる
    pub admin_key: Option<String>,
    pub media: Option<MediaHostConfig>,
    pub id_generation: IdGeneration,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be 'server' or 'client', got '{1}'")]
    InvalidIdGeneration(&'static str, String),
    #[error("incomplete media host credentials: {0} is not set")]
    IncompleteMediaHost(&'static str),
}

impl Config {
    /// secret を優先し、無ければ var を読む
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| {
            env.secret(name)
                .map(|secret| secret.to_string())
                .or_else(|_| env.var(name).map(|var| var.to_string()))
                .ok()
        })
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 空文字は未設定と同じ
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let id_generation = match get(VAR_ID_GENERATION) {
            None => IdGeneration::default(),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "server" => IdGeneration::Server,
                "client" | "client-supplied" => IdGeneration::ClientSupplied,
                _ => return Err(ConfigError::InvalidIdGeneration(VAR_ID_GENERATION, value)),
            },
        };

        let credentials = [
            (VAR_CLOUDINARY_CLOUD_NAME, get(VAR_CLOUDINARY_CLOUD_NAME)),
            (VAR_CLOUDINARY_API_KEY, get(VAR_CLOUDINARY_API_KEY)),
            (VAR_CLOUDINARY_API_SECRET, get(VAR_CLOUDINARY_API_SECRET)),
        ];
        let media = match credentials {
            [(_, None), (_, None), (_, None)] => None,
            [(_, Some(cloud_name)), (_, Some(api_key)), (_, Some(api_secret))] => {
                Some(MediaHostConfig {
                    cloud_name,
                    api_key,
                    api_secret,
                    folder: get(VAR_CLOUDINARY_FOLDER).unwrap_or_else(|| DEFAULT_FOLDER.into()),
                })
            }
            partial => {
                let missing = partial
                    .iter()
                    .find(|(_, value)| value.is_none())
                    .map_or(VAR_CLOUDINARY_CLOUD_NAME, |(name, _)| *name);
                return Err(ConfigError::IncompleteMediaHost(missing));
            }
        };

        Ok(Self {
            admin_key: get(VAR_ADMIN_SECRET_KEY),
            media,
            id_generation,
        })
    }
}
