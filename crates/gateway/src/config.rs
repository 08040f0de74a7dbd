//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//!
//! 設定は起動時に一度だけ読み込んで検証し、以降は変更しない。
//! 必須値の欠落や不正値があればプロセスは起動しない。

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::dataset::{Dataset, DatasetRegistry};
use crate::error::ConfigError;
use crate::gateway::{AccessGateway, AccessMode};
use crate::keys;
use crate::storage::RetryPolicy;

/// 署名付きURLの最大有効期限（SigV4の上限、7日）
const MAX_SIGNED_URL_TTL_SECS: u32 = 7 * 24 * 3600;

/// データ生成側が書き込む配列の形状。
/// route: (lon, lat, time) × 10000点、traffic: (time, value) × 10000点
const ROUTE_SHAPE: [u64; 2] = [10_000, 3];
const ROUTE_CHUNKS: [u64; 2] = [1_000, 3];
const TRAFFIC_SHAPE: [u64; 2] = [10_000, 2];
const TRAFFIC_CHUNKS: [u64; 2] = [1_000, 2];
const FLOAT64_DTYPE: &str = "<f8";

/// ストレージ接続設定。
#[derive(Clone)]
pub struct StorageConfig {
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// S3互換エンドポイント（MinIO等）。NoneならAWSのリージョンエンドポイント
    pub endpoint: Option<String>,
    /// ブラウザに渡す署名付きURLのエンドポイント。Noneならendpointと同じ
    pub public_endpoint: Option<String>,
}

// 認証情報をログに出さない
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("public_endpoint", &self.public_endpoint)
            .finish()
    }
}

/// 検証済みのGateway設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub storage: StorageConfig,
    pub datasets: DatasetRegistry,
    /// 署名付きURLの有効期限（秒）
    pub signed_url_ttl_secs: u32,
    pub access_mode: AccessMode,
    pub cors_allowed_origins: Vec<String>,
    pub bind_addr: SocketAddr,
    pub retry: RetryPolicy,
    /// メタデータ文書のキャッシュ有効期限（秒）。0なら毎回再検証
    pub metadata_max_age_secs: u32,
    /// `GET /signed-url/{dataset}` が署名する文書
    pub default_signed_document: String,
    /// 保守用のキー一覧エンドポイントを公開するか
    pub enable_key_listing: bool,
}

impl GatewayConfig {
    /// 環境変数から読み込む。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の変数ソースから読み込み、検証する。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let storage = StorageConfig {
            access_key_id: vars.required("AWS_ACCESS_KEY_ID")?,
            secret_access_key: vars.required("AWS_SECRET_ACCESS_KEY")?,
            region: vars.required("AWS_REGION")?,
            bucket: vars.required("S3_BUCKET")?,
            endpoint: vars.optional("S3_ENDPOINT").map(|e| e.trim_end_matches('/').to_string()),
            public_endpoint: vars
                .optional("S3_PUBLIC_ENDPOINT")
                .map(|e| e.trim_end_matches('/').to_string()),
        };

        let route = Dataset::new(
            "route",
            &vars.required("ROUTE_ZARR_PREFIX")?,
            ROUTE_SHAPE.to_vec(),
            FLOAT64_DTYPE,
            ROUTE_CHUNKS.to_vec(),
        )
        .map_err(|reason| ConfigError::Invalid {
            var: "ROUTE_ZARR_PREFIX",
            reason,
        })?;
        let traffic = Dataset::new(
            "traffic",
            &vars.required("TRAFFIC_ZARR_PREFIX")?,
            TRAFFIC_SHAPE.to_vec(),
            FLOAT64_DTYPE,
            TRAFFIC_CHUNKS.to_vec(),
        )
        .map_err(|reason| ConfigError::Invalid {
            var: "TRAFFIC_ZARR_PREFIX",
            reason,
        })?;

        let signed_url_ttl_secs: u32 = vars.parsed("SIGNED_URL_EXPIRE", 3600)?;
        if signed_url_ttl_secs == 0 || signed_url_ttl_secs > MAX_SIGNED_URL_TTL_SECS {
            return Err(ConfigError::Invalid {
                var: "SIGNED_URL_EXPIRE",
                reason: format!("1〜{MAX_SIGNED_URL_TTL_SECS}の範囲で指定してください"),
            });
        }

        let access_mode = match vars.optional("ACCESS_STRATEGY") {
            Some(raw) => raw.parse::<AccessMode>().map_err(|reason| ConfigError::Invalid {
                var: "ACCESS_STRATEGY",
                reason,
            })?,
            None => AccessMode::Both,
        };

        let cors_allowed_origins: Vec<String> = vars
            .optional("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if cors_allowed_origins.is_empty() {
            return Err(ConfigError::Invalid {
                var: "CORS_ALLOWED_ORIGINS",
                reason: "オリジンが1つも指定されていません".to_string(),
            });
        }
        if let Some(bad) = cors_allowed_origins
            .iter()
            .find(|o| *o != "*" && axum::http::HeaderValue::from_str(o).is_err())
        {
            return Err(ConfigError::Invalid {
                var: "CORS_ALLOWED_ORIGINS",
                reason: format!("不正なオリジン: {bad}"),
            });
        }

        let bind_addr: SocketAddr = vars.parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?;

        let timeout_secs: u64 = vars.parsed("STORE_TIMEOUT_SECS", 30)?;
        let max_attempts: u32 = vars.parsed("STORE_MAX_ATTEMPTS", 3)?;
        if timeout_secs == 0 || max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: if timeout_secs == 0 {
                    "STORE_TIMEOUT_SECS"
                } else {
                    "STORE_MAX_ATTEMPTS"
                },
                reason: "1以上を指定してください".to_string(),
            });
        }
        let retry = RetryPolicy {
            max_attempts,
            attempt_timeout: Duration::from_secs(timeout_secs),
            ..RetryPolicy::default()
        };

        let metadata_max_age_secs: u32 = vars.parsed("METADATA_MAX_AGE_SECS", 0)?;

        let default_signed_document = vars
            .optional("DEFAULT_SIGNED_DOCUMENT")
            .unwrap_or_else(|| ".zattrs".to_string());
        let default_signed_document =
            keys::normalize(&default_signed_document).map_err(|e| ConfigError::Invalid {
                var: "DEFAULT_SIGNED_DOCUMENT",
                reason: e.to_string(),
            })?;

        let enable_key_listing: bool = vars.parsed("ENABLE_KEY_LISTING", false)?;

        Ok(Self {
            storage,
            datasets: DatasetRegistry::new([route, traffic]),
            signed_url_ttl_secs,
            access_mode,
            cors_allowed_origins,
            bind_addr,
            retry,
            metadata_max_age_secs,
            default_signed_document,
            enable_key_listing,
        })
    }
}

/// 変数ソースのラッパー。空文字列は未設定として扱う。
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: name,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// ストレージアクセスのコア
    pub gateway: AccessGateway,
    /// 配備ごとのアクセス戦略
    pub access_mode: AccessMode,
    /// `GET /signed-url/{dataset}` が署名する文書
    pub default_signed_document: String,
    pub cors_allowed_origins: Vec<String>,
    pub enable_key_listing: bool,
}
