//! # アクセスゲートウェイ
//!
//! (データセット名, チャンクパス) → AccessOutcome の変換を行うコア。
//! リクエスト間で状態を持たないため、複数インスタンスを協調なしに並べられる。
//!
//! ## アクセス戦略
//! - 委譲アクセス (`presigned_access`): 署名付きURLを発行し、ブラウザに直接取得させる。
//!   データはGatewayを通らないが、期限付きの認証情報がURLとしてクライアントに渡る。
//! - 代理アクセス (`proxied_access`): Gatewayがオブジェクトを取得して中継する。
//!   全バイトがGatewayを通るが、クライアントは認証情報を一切持たない。
//!
//! 戦略は配備ごとの設定で決まる（リクエストごとではない）。
//! どちらもキー解決とエラー写像を共有し、最後の一手だけが異なる。

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Bytes;

use crate::dataset::DatasetRegistry;
use crate::error::GatewayError;
use crate::keys::{self, PathError, PathKind, StorageKey};
use crate::storage::{ObjectStore, StoreError};

/// Content-Type未申告時のフォールバック
pub const OCTET_STREAM: &str = "application/octet-stream";

/// チャンクblobのキャッシュ有効期限（1年）
const IMMUTABLE_MAX_AGE_SECS: u32 = 31_536_000;

/// 署名付きURLを含む応答のキャッシュを、URLの失効よりこの秒数だけ早く切る
const REDIRECT_EXPIRY_MARGIN_SECS: u32 = 60;

/// 単一リクエストに適用するアクセス戦略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStrategy {
    /// 署名付きURLによる委譲アクセス
    Delegated,
    /// Gateway経由の代理アクセス
    Proxied,
}

/// 配備で有効なアクセス戦略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Proxied,
    Delegated,
    Both,
}

impl AccessMode {
    /// 戦略が有効か。
    pub fn allows(self, strategy: AccessStrategy) -> bool {
        match self {
            AccessMode::Both => true,
            AccessMode::Proxied => strategy == AccessStrategy::Proxied,
            AccessMode::Delegated => strategy == AccessStrategy::Delegated,
        }
    }

    /// `/data/...` で使う戦略。両方有効なら代理アクセスを優先する。
    pub fn preferred(self) -> AccessStrategy {
        match self {
            AccessMode::Delegated => AccessStrategy::Delegated,
            AccessMode::Proxied | AccessMode::Both => AccessStrategy::Proxied,
        }
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proxied" | "proxy" => Ok(AccessMode::Proxied),
            "delegated" | "presigned" => Ok(AccessMode::Delegated),
            "both" => Ok(AccessMode::Both),
            other => Err(format!(
                "不明なアクセス戦略: {other} (proxied / delegated / both)"
            )),
        }
    }
}

/// レスポンスに付与するキャッシュ指示。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    /// メタデータ文書。データセット再生成後に古い文書を返してはならない
    Short { max_age_secs: u32 },
    /// チャンクblob。パスが変わらない限り内容は変わらない
    Immutable,
    /// 署名付きURL。URLの有効期限を超えてキャッシュしてはならない
    Private { max_age_secs: u32 },
}

impl CacheDirective {
    /// Cache-Controlヘッダー値。
    pub fn header_value(&self) -> String {
        match self {
            CacheDirective::Short { max_age_secs: 0 } => "no-cache".to_string(),
            CacheDirective::Short { max_age_secs } => {
                format!("public, max-age={max_age_secs}, must-revalidate")
            }
            CacheDirective::Immutable => {
                format!("public, max-age={IMMUTABLE_MAX_AGE_SECS}, immutable")
            }
            CacheDirective::Private { max_age_secs } => {
                format!("private, max-age={max_age_secs}")
            }
        }
    }
}

/// ゲートウェイ操作の結果。HTTP層はこれをそのままレスポンスに変換する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    /// オブジェクト本体
    Found {
        body: Bytes,
        content_type: String,
        cache: CacheDirective,
    },
    /// 署名付きURL
    Redirect { url: String, cache: CacheDirective },
    /// データセットまたはオブジェクトが存在しない。
    /// 未書き込みチャンクをfill valueとして扱うかはクライアントが決める
    NotFound { detail: String },
    /// データセット外へのパス
    Forbidden { detail: String },
    /// ストレージバックエンドの障害。detailはクライアント向けの文言で、
    /// バックエンドのキーやエラーメッセージを含まない
    UpstreamError {
        detail: String,
        /// リトライで回復し得るか（一時的障害）
        retryable: bool,
        retry_after_secs: Option<u64>,
    },
}

/// ストレージアクセスのコア。
pub struct AccessGateway {
    store: Arc<dyn ObjectStore>,
    datasets: DatasetRegistry,
    /// 署名付きURLの有効期限（秒）
    presign_ttl_secs: u32,
    /// メタデータ文書のキャッシュ有効期限（秒）
    metadata_max_age_secs: u32,
}

impl AccessGateway {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        datasets: DatasetRegistry,
        presign_ttl_secs: u32,
        metadata_max_age_secs: u32,
    ) -> Self {
        Self {
            store,
            datasets,
            presign_ttl_secs,
            metadata_max_age_secs,
        }
    }

    pub fn datasets(&self) -> &DatasetRegistry {
        &self.datasets
    }

    /// 指定した戦略でアクセスする。
    pub async fn access(
        &self,
        strategy: AccessStrategy,
        dataset: &str,
        chunk_path: &str,
    ) -> AccessOutcome {
        match strategy {
            AccessStrategy::Proxied => self.proxied_access(dataset, chunk_path).await,
            AccessStrategy::Delegated => self.presigned_access(dataset, chunk_path).await,
        }
    }

    /// 代理アクセス: オブジェクトを取得して返す。
    pub async fn proxied_access(&self, dataset: &str, chunk_path: &str) -> AccessOutcome {
        let (key, kind) = match self.locate(dataset, chunk_path) {
            Ok(located) => located,
            Err(outcome) => return outcome,
        };

        match self.store.get(&key).await {
            Ok(object) => {
                tracing::debug!(dataset, key = %key, bytes = object.bytes.len(), "オブジェクトを中継");
                AccessOutcome::Found {
                    content_type: response_content_type(kind, object.content_type),
                    body: object.bytes,
                    cache: self.found_directive(kind),
                }
            }
            Err(err) => outcome_for_store_error(dataset, chunk_path, &key, err),
        }
    }

    /// 委譲アクセス: 署名付きURLを発行する。
    pub async fn presigned_access(&self, dataset: &str, chunk_path: &str) -> AccessOutcome {
        let (key, kind) = match self.locate(dataset, chunk_path) {
            Ok(located) => located,
            Err(outcome) => return outcome,
        };

        match self.store.presign(&key, self.presign_ttl_secs).await {
            Ok(url) => AccessOutcome::Redirect {
                url,
                cache: self.redirect_directive(kind),
            },
            Err(err) => outcome_for_store_error(dataset, chunk_path, &key, err),
        }
    }

    /// データセット配下のキー一覧（プレフィックスからの相対パス）。保守・デバッグ用。
    pub async fn list_keys(&self, dataset: &str) -> Result<Vec<String>, GatewayError> {
        let ds = self
            .datasets
            .get(dataset)
            .ok_or_else(|| GatewayError::UnknownDataset(dataset.to_string()))?;
        let prefix = format!("{}/", ds.prefix());

        let keys = self.store.list(&prefix).await.map_err(|err| {
            tracing::error!(dataset, error = %err, "キー一覧の取得に失敗");
            GatewayError::Storage
        })?;

        let mut relative: Vec<String> = keys
            .iter()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        relative.sort();
        Ok(relative)
    }

    /// データセットを引き、チャンクパスをキーに解決する。
    /// ここで失敗した場合はバックエンドを呼ばない。
    fn locate(&self, dataset: &str, chunk_path: &str) -> Result<(StorageKey, PathKind), AccessOutcome> {
        let Some(ds) = self.datasets.get(dataset) else {
            return Err(AccessOutcome::NotFound {
                detail: format!("データセットが見つかりません: {dataset}"),
            });
        };

        match keys::resolve(ds, chunk_path) {
            Ok(key) => {
                let kind = PathKind::classify(key.as_str());
                Ok((key, kind))
            }
            Err(PathError::Traversal) => {
                tracing::warn!(dataset, path = chunk_path, "データセット外へのパスを拒否");
                Err(AccessOutcome::Forbidden {
                    detail: "データセット外へのアクセスは許可されていません".to_string(),
                })
            }
            Err(PathError::Empty) => Err(AccessOutcome::NotFound {
                detail: format!("パスが指定されていません: {dataset}"),
            }),
            Err(PathError::EmptySegment) => Err(AccessOutcome::NotFound {
                detail: format!("オブジェクトが存在しません: {dataset}/{chunk_path}"),
            }),
        }
    }

    fn found_directive(&self, kind: PathKind) -> CacheDirective {
        match kind {
            PathKind::Metadata => CacheDirective::Short {
                max_age_secs: self.metadata_max_age_secs,
            },
            PathKind::Chunk => CacheDirective::Immutable,
        }
    }

    /// キャッシュされた署名付きURLが、クライアントの取得中に失効しないようにする。
    fn redirect_directive(&self, kind: PathKind) -> CacheDirective {
        let margin = REDIRECT_EXPIRY_MARGIN_SECS.min(self.presign_ttl_secs / 2);
        let cacheable_secs = self.presign_ttl_secs - margin;
        match kind {
            PathKind::Metadata => CacheDirective::Short {
                max_age_secs: self.metadata_max_age_secs.min(cacheable_secs),
            },
            PathKind::Chunk => CacheDirective::Private {
                max_age_secs: cacheable_secs,
            },
        }
    }
}

/// 中継時のContent-Typeを決める。
///
/// 未申告なら `application/octet-stream`。チャンクblobはバイナリなので、
/// `text/*` と申告されていても `application/octet-stream` に置き換える。
fn response_content_type(kind: PathKind, declared: Option<String>) -> String {
    match declared {
        Some(ct) if ct.trim().is_empty() => OCTET_STREAM.to_string(),
        Some(ct) if kind == PathKind::Chunk && ct.trim_start().to_ascii_lowercase().starts_with("text/") => {
            OCTET_STREAM.to_string()
        }
        Some(ct) => ct,
        None => OCTET_STREAM.to_string(),
    }
}

/// ストレージエラーをAccessOutcomeに写像する。失敗の意味づけはここだけで行う。
///
/// キーとバックエンドのエラーコードはログにのみ出し、レスポンスには含めない。
fn outcome_for_store_error(
    dataset: &str,
    chunk_path: &str,
    key: &StorageKey,
    err: StoreError,
) -> AccessOutcome {
    match err {
        StoreError::NotFound => {
            tracing::debug!(dataset, key = %key, "オブジェクトが存在しません");
            AccessOutcome::NotFound {
                detail: format!("オブジェクトが存在しません: {dataset}/{chunk_path}"),
            }
        }
        StoreError::Transient {
            code,
            retry_after_secs,
        } => {
            tracing::error!(dataset, key = %key, code = %code, "ストレージの一時的な障害");
            AccessOutcome::UpstreamError {
                detail: "ストレージが一時的に利用できません".to_string(),
                retryable: true,
                retry_after_secs,
            }
        }
        StoreError::Rejected { code } => {
            tracing::error!(dataset, key = %key, code = %code, "ストレージが要求を拒否");
            AccessOutcome::UpstreamError {
                detail: "ストレージへのアクセスに失敗しました".to_string(),
                retryable: false,
                retry_after_secs: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::storage::mock::MockObjectStore;

    fn registry() -> DatasetRegistry {
        DatasetRegistry::new([
            Dataset::new("route", "data/route", vec![10000, 3], "<f8", vec![1000, 3]).unwrap(),
            Dataset::new("traffic", "data/traffic", vec![10000, 2], "<f8", vec![1000, 2]).unwrap(),
        ])
    }

    fn gateway_with(store: MockObjectStore) -> (AccessGateway, Arc<MockObjectStore>) {
        let store = Arc::new(store);
        let gateway = AccessGateway::new(store.clone(), registry(), 3600, 0);
        (gateway, store)
    }

    fn sample_store() -> MockObjectStore {
        MockObjectStore::new()
            .with_object("data/route/.zarray", br#"{"zarr_format":2}"#, Some("application/json"))
            .with_object("data/route/0.0", &[1, 2, 3], None)
            .with_object("data/route/1.0", &[4, 5, 6], Some("text/plain"))
            .with_object("data/traffic/0.0", &[7], Some("binary/octet-stream"))
    }

    #[tokio::test]
    async fn test_proxied_chunk_without_content_type() {
        let (gateway, _) = gateway_with(sample_store());

        let outcome = gateway.proxied_access("route", "0.0").await;
        assert_eq!(
            outcome,
            AccessOutcome::Found {
                body: Bytes::from_static(&[1, 2, 3]),
                content_type: OCTET_STREAM.to_string(),
                cache: CacheDirective::Immutable,
            }
        );
    }

    #[tokio::test]
    async fn test_proxied_metadata_keeps_declared_type() {
        let (gateway, _) = gateway_with(sample_store());

        match gateway.proxied_access("route", ".zarray").await {
            AccessOutcome::Found {
                content_type,
                cache,
                ..
            } => {
                assert_eq!(content_type, "application/json");
                assert_eq!(cache, CacheDirective::Short { max_age_secs: 0 });
                assert_eq!(cache.header_value(), "no-cache");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// チャンクがtext/*と申告されていてもバイナリとして返す
    #[tokio::test]
    async fn test_proxied_chunk_never_declared_as_text() {
        let (gateway, _) = gateway_with(sample_store());

        match gateway.proxied_access("route", "1.0").await {
            AccessOutcome::Found { content_type, .. } => assert_eq!(content_type, OCTET_STREAM),
            other => panic!("unexpected outcome: {other:?}"),
        }

        match gateway.proxied_access("traffic", "0.0").await {
            AccessOutcome::Found { content_type, .. } => {
                assert_eq!(content_type, "binary/octet-stream")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_chunk_is_not_found() {
        let (gateway, store) = gateway_with(sample_store());

        let outcome = gateway.proxied_access("route", "9.0").await;
        assert!(matches!(outcome, AccessOutcome::NotFound { .. }));
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_dataset_skips_backend() {
        let (gateway, store) = gateway_with(sample_store());

        for strategy in [AccessStrategy::Proxied, AccessStrategy::Delegated] {
            let outcome = gateway.access(strategy, "weather", "0.0").await;
            assert!(matches!(outcome, AccessOutcome::NotFound { .. }));
        }
        assert_eq!(store.calls(), 0);
    }

    /// トラバーサルは両戦略でForbiddenになり、バックエンドに到達しない
    #[tokio::test]
    async fn test_traversal_is_forbidden_without_backend_call() {
        let (gateway, store) = gateway_with(sample_store());

        for path in ["../../secret", "..", "0.0/../../traffic/0.0"] {
            for strategy in [AccessStrategy::Proxied, AccessStrategy::Delegated] {
                let outcome = gateway.access(strategy, "route", path).await;
                assert!(
                    matches!(outcome, AccessOutcome::Forbidden { .. }),
                    "path={path} strategy={strategy:?} outcome={outcome:?}"
                );
            }
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_path_is_not_found() {
        let (gateway, store) = gateway_with(sample_store());

        let outcome = gateway.proxied_access("route", "").await;
        assert!(matches!(outcome, AccessOutcome::NotFound { .. }));
        assert_eq!(store.calls(), 0);

        // 空セグメントを詰めて 0.0 に書き換えない
        for path in ["0.0/", "a//0.0"] {
            let outcome = gateway.proxied_access("route", path).await;
            assert!(matches!(outcome, AccessOutcome::NotFound { .. }), "path={path}");
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_presigned_access_carries_ttl() {
        let (gateway, _) = gateway_with(sample_store());

        match gateway.presigned_access("route", "0.0").await {
            AccessOutcome::Redirect { url, cache } => {
                assert!(url.contains("data/route/0.0"));
                assert!(url.contains("X-Amz-Expires=3600"));
                assert_eq!(cache, CacheDirective::Private { max_age_secs: 3540 });
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// キャッシュ期限は署名付きURLの失効より前に切れる
    #[tokio::test]
    async fn test_redirect_cache_expires_before_signed_url() {
        for (ttl, expected) in [(3600, 3540), (60, 30), (1, 1)] {
            let gateway = AccessGateway::new(Arc::new(sample_store()), registry(), ttl, 0);
            match gateway.presigned_access("route", "0.0").await {
                AccessOutcome::Redirect { cache, .. } => {
                    assert_eq!(cache, CacheDirective::Private { max_age_secs: expected }, "ttl={ttl}")
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        let gateway = AccessGateway::new(Arc::new(sample_store()), registry(), 3600, 86_400);
        match gateway.presigned_access("route", ".zattrs").await {
            AccessOutcome::Redirect { cache, .. } => {
                assert_eq!(cache, CacheDirective::Short { max_age_secs: 3540 })
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// 署名付きURLは存在確認をしない
    #[tokio::test]
    async fn test_presign_does_not_check_existence() {
        let (gateway, _) = gateway_with(sample_store());

        let outcome = gateway.presigned_access("route", "404.404").await;
        assert!(matches!(outcome, AccessOutcome::Redirect { .. }));
    }

    #[tokio::test]
    async fn test_redirect_metadata_directive() {
        let (gateway, _) = gateway_with(sample_store());

        match gateway.presigned_access("route", ".zattrs").await {
            AccessOutcome::Redirect { cache, .. } => {
                assert_eq!(cache, CacheDirective::Short { max_age_secs: 0 })
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// バックエンド応答 × 戦略 の全組み合わせで結果が1つに定まる
    #[tokio::test]
    async fn test_outcome_is_total_over_backend_responses() {
        let failures = [
            (StoreError::NotFound, "not_found"),
            (
                StoreError::Transient {
                    code: "SlowDown".to_string(),
                    retry_after_secs: Some(2),
                },
                "transient",
            ),
            (
                StoreError::Rejected {
                    code: "ExpiredToken".to_string(),
                },
                "rejected",
            ),
        ];

        for strategy in [AccessStrategy::Proxied, AccessStrategy::Delegated] {
            // 正常応答
            let (gateway, _) = gateway_with(sample_store());
            let outcome = gateway.access(strategy, "route", "0.0").await;
            match strategy {
                AccessStrategy::Proxied => assert!(matches!(outcome, AccessOutcome::Found { .. })),
                AccessStrategy::Delegated => {
                    assert!(matches!(outcome, AccessOutcome::Redirect { .. }))
                }
            }

            for (err, label) in &failures {
                let (gateway, _) = gateway_with(sample_store().failing_with(err.clone()));
                let outcome = gateway.access(strategy, "route", "0.0").await;
                match (*label, &outcome) {
                    ("not_found", AccessOutcome::NotFound { .. }) => {}
                    (
                        "transient",
                        AccessOutcome::UpstreamError {
                            retryable: true,
                            retry_after_secs: Some(2),
                            ..
                        },
                    ) => {}
                    (
                        "rejected",
                        AccessOutcome::UpstreamError {
                            retryable: false,
                            retry_after_secs: None,
                            ..
                        },
                    ) => {}
                    _ => panic!("strategy={strategy:?} label={label} outcome={outcome:?}"),
                }
            }
        }
    }

    /// クライアント向けの文言にバックエンドのキーやエラーコードが出ない
    #[tokio::test]
    async fn test_upstream_detail_does_not_leak_internals() {
        let (gateway, _) = gateway_with(sample_store().failing_with(StoreError::Rejected {
            code: "AccessDenied for data/route/0.0".to_string(),
        }));

        match gateway.proxied_access("route", "0.0").await {
            AccessOutcome::UpstreamError { detail, .. } => {
                assert!(!detail.contains("data/route"));
                assert!(!detail.contains("AccessDenied"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_keys_relative_to_prefix() {
        let (gateway, _) = gateway_with(sample_store());

        let keys = gateway.list_keys("route").await.unwrap();
        assert_eq!(keys, vec![".zarray", "0.0", "1.0"]);

        assert!(matches!(
            gateway.list_keys("weather").await,
            Err(GatewayError::UnknownDataset(_))
        ));
    }

    #[tokio::test]
    async fn test_list_keys_backend_failure() {
        let (gateway, _) = gateway_with(sample_store().failing_with(StoreError::Transient {
            code: "timeout".to_string(),
            retry_after_secs: None,
        }));

        assert!(matches!(
            gateway.list_keys("route").await,
            Err(GatewayError::Storage)
        ));
    }

    #[test]
    fn test_cache_directive_header_values() {
        assert_eq!(CacheDirective::Short { max_age_secs: 0 }.header_value(), "no-cache");
        assert_eq!(
            CacheDirective::Short { max_age_secs: 60 }.header_value(),
            "public, max-age=60, must-revalidate"
        );
        assert_eq!(
            CacheDirective::Immutable.header_value(),
            "public, max-age=31536000, immutable"
        );
        assert_eq!(
            CacheDirective::Private { max_age_secs: 3600 }.header_value(),
            "private, max-age=3600"
        );
    }

    /// キャッシュ指示は内容ではなくパスの種別だけで決まる
    #[tokio::test]
    async fn test_cache_directive_depends_only_on_path_kind() {
        let store = MockObjectStore::new()
            .with_object("data/route/.zattrs", &[0xff, 0x00], None)
            .with_object("data/route/2.0", br#"{"looks":"like json"}"#, Some("application/json"));
        let (gateway, _) = gateway_with(store);

        match gateway.proxied_access("route", ".zattrs").await {
            AccessOutcome::Found { cache, .. } => {
                assert_eq!(cache, CacheDirective::Short { max_age_secs: 0 })
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        match gateway.proxied_access("route", "2.0").await {
            AccessOutcome::Found { cache, .. } => assert_eq!(cache, CacheDirective::Immutable),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_access_mode() {
        assert!(AccessMode::Both.allows(AccessStrategy::Proxied));
        assert!(AccessMode::Both.allows(AccessStrategy::Delegated));
        assert!(!AccessMode::Proxied.allows(AccessStrategy::Delegated));
        assert!(!AccessMode::Delegated.allows(AccessStrategy::Proxied));
        assert_eq!(AccessMode::Both.preferred(), AccessStrategy::Proxied);
        assert_eq!(AccessMode::Delegated.preferred(), AccessStrategy::Delegated);
        assert_eq!("PROXIED".parse::<AccessMode>(), Ok(AccessMode::Proxied));
        assert!("nope".parse::<AccessMode>().is_err());
    }
}
