//! # オブジェクトストレージ
//!
//! Gatewayが読み取り専用で利用するストレージバックエンドの抽象インターフェース。
//! S3互換ストレージ実装は `s3` サブモジュールを参照。
//!
//! Gatewayはオブジェクトを作成・削除しない。オブジェクトの寿命はストレージが管理する。

#[cfg(feature = "vendor-aws")]
pub mod s3;
pub mod retry;
#[cfg(test)]
pub mod mock;

#[cfg(feature = "vendor-aws")]
pub use s3::S3ObjectStore;
pub use retry::RetryPolicy;

use axum::body::Bytes;

use crate::keys::StorageKey;

/// 取得したオブジェクト。
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// オブジェクト本体（Gatewayは中身を解釈しない）
    pub bytes: Bytes,
    /// バックエンドが申告したContent-Type。未申告ならNone
    pub content_type: Option<String>,
}

/// ストレージ操作のエラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// オブジェクトが存在しない。Zarrでは未書き込みチャンク（fill value）を意味し得る
    #[error("オブジェクトが存在しません")]
    NotFound,
    /// 一時的な障害（スロットリング、タイムアウト、5xx）。リトライ対象
    #[error("一時的なストレージ障害: {code}")]
    Transient {
        /// バックエンドのエラーコード等
        code: String,
        /// バックエンドが返したRetry-Afterヒント（秒）
        retry_after_secs: Option<u64>,
    },
    /// 認証期限切れ・アクセス拒否等、リトライしても結果が変わらない拒否
    #[error("ストレージが要求を拒否しました: {code}")]
    Rejected {
        /// バックエンドのエラーコード等
        code: String,
    },
}

impl StoreError {
    /// リトライで結果が変わり得るか。
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}

/// オブジェクトストレージの抽象インターフェース。
///
/// Gateway運用者はS3互換ストレージ（AWS S3, MinIO, Cloudflare R2等）を
/// 実装として選択できる。テストではインメモリ実装に差し替える。
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// オブジェクトを取得する。
    async fn get(&self, key: &StorageKey) -> Result<StoredObject, StoreError>;

    /// GET用の署名付きURLを生成する。
    ///
    /// URLは発行時刻から `ttl_secs` 秒だけ有効。オブジェクトの存在は確認しない
    /// （存在確認はクライアントがURLを辿った時点でバックエンドが行う）。
    async fn presign(&self, key: &StorageKey, ttl_secs: u32) -> Result<String, StoreError>;

    /// プレフィックス配下のキー一覧を返す。
    ///
    /// 大きなプレフィックスでは複数回の往復が必要になるため、
    /// リクエスト処理のホットパスでは使用しない（保守・デバッグ用）。
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
