//! # S3互換ストレージ実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIを使用するObjectStore実装。
//! バックエンドのHTTPステータスを `StoreError` の3分類に写像する。

use std::collections::HashMap;

use super::{ObjectStore, RetryPolicy, StoreError, StoredObject};
use crate::config::StorageConfig;
use crate::keys::StorageKey;

/// S3互換ストレージによるObjectStore実装。
pub struct S3ObjectStore {
    /// Gateway自身が読み取りに使うバケット
    bucket_internal: s3::Bucket,
    /// ブラウザ向け署名付きURL生成用バケット。
    /// 内部ホスト名と外部ホスト名が異なる場合に使用。
    /// Noneの場合はbucket_internalを使用する。
    bucket_public: Option<s3::Bucket>,
    /// 一時的障害のリトライポリシー
    retry: RetryPolicy,
}

impl S3ObjectStore {
    /// S3互換バケットからObjectStoreを構築する。
    pub fn new(
        bucket_internal: s3::Bucket,
        bucket_public: Option<s3::Bucket>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            bucket_internal,
            bucket_public,
            retry,
        }
    }

    /// S3互換バケットを初期化する。
    ///
    /// エンドポイント指定時（MinIO等）はパススタイル、
    /// 未指定時はAWSのリージョンエンドポイントを仮想ホストスタイルで使う。
    fn init_bucket(
        endpoint: Option<&str>,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> anyhow::Result<s3::Bucket> {
        let region = s3::Region::Custom {
            region: region.to_string(),
            endpoint: endpoint
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com")),
        };

        let credentials = s3::creds::Credentials::new(
            Some(access_key),
            Some(secret_key),
            None,
            None,
            None,
        )?;

        let bucket = s3::Bucket::new(bucket_name, region, credentials)?;
        let bucket = if endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(*bucket)
    }

    /// 検証済みの設定から構築する。
    pub fn from_config(config: &StorageConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let bucket_internal = Self::init_bucket(
            config.endpoint.as_deref(),
            &config.region,
            &config.access_key_id,
            &config.secret_access_key,
            &config.bucket,
        )?;

        let bucket_public = config
            .public_endpoint
            .as_deref()
            .map(|public_ep| {
                tracing::info!(
                    s3_public_endpoint = %public_ep,
                    "クライアント向けS3エンドポイントを設定"
                );
                Self::init_bucket(
                    Some(public_ep),
                    &config.region,
                    &config.access_key_id,
                    &config.secret_access_key,
                    &config.bucket,
                )
            })
            .transpose()?;

        Ok(Self::new(bucket_internal, bucket_public, retry))
    }
}

/// ヘッダーを大文字小文字を区別せずに引く。
fn header_value(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// S3エラーレスポンスのXMLから `<Code>` を取り出す。
fn error_code(body: &[u8]) -> Option<String> {
    let body = std::str::from_utf8(body).ok()?;
    let start = body.find("<Code>")? + "<Code>".len();
    let end = body[start..].find("</Code>")? + start;
    Some(body[start..end].to_string())
}

/// 非2xxステータスをStoreErrorに分類する。
fn classify_status(status: u16, code: Option<String>, retry_after_secs: Option<u64>) -> StoreError {
    let code = code.unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        404 => StoreError::NotFound,
        408 | 429 | 500..=599 => StoreError::Transient {
            code,
            retry_after_secs,
        },
        _ => StoreError::Rejected { code },
    }
}

/// rust-s3のエラーをStoreErrorに分類する。
///
/// HTTPレスポンスを伴わない失敗（接続断、DNS等）は一時的障害として扱う。
/// 一覧取得はステータスを見る前に本文をデコードするため、403等の `<Error>` 本文は
/// デコード失敗として届く。ステータスは失われているので拒否として扱い、リトライしない。
fn classify_s3_error(err: s3::error::S3Error) -> StoreError {
    match err {
        s3::error::S3Error::HttpFailWithBody(status, body) => {
            classify_status(status, error_code(body.as_bytes()), None)
        }
        s3::error::S3Error::SerdeXml(e) => StoreError::Rejected {
            code: format!("unexpected response: {e}"),
        },
        s3::error::S3Error::FromUtf8(e) => StoreError::Rejected {
            code: format!("unexpected response: {e}"),
        },
        other => StoreError::Transient {
            code: format!("network: {other}"),
            retry_after_secs: None,
        },
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &StorageKey) -> Result<StoredObject, StoreError> {
        self.retry
            .run("get", key.as_str(), || async {
                let response = self
                    .bucket_internal
                    .get_object(key.as_str())
                    .await
                    .map_err(classify_s3_error)?;

                let status = response.status_code();
                let headers = response.headers();
                if (200..300).contains(&status) {
                    return Ok(StoredObject {
                        bytes: response.bytes().clone(),
                        content_type: header_value(&headers, "content-type"),
                    });
                }

                let retry_after_secs =
                    header_value(&headers, "retry-after").and_then(|v| v.parse().ok());
                Err(classify_status(
                    status,
                    error_code(response.as_slice()),
                    retry_after_secs,
                ))
            })
            .await
    }

    async fn presign(&self, key: &StorageKey, ttl_secs: u32) -> Result<String, StoreError> {
        let public_bucket = self.bucket_public.as_ref().unwrap_or(&self.bucket_internal);

        public_bucket
            .presign_get(key.as_str(), ttl_secs, None)
            .await
            .map_err(|e| StoreError::Rejected {
                code: format!("presign: {e}"),
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.retry
            .run("list", prefix, || async {
                let pages = self
                    .bucket_internal
                    .list(prefix.to_string(), None)
                    .await
                    .map_err(classify_s3_error)?;
                Ok(pages
                    .into_iter()
                    .flat_map(|page| page.contents)
                    .map(|object| object.key)
                    .collect())
            })
            .await
    }
}
