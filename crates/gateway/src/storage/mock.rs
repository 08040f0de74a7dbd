//! # テスト用インメモリObjectStore
//!
//! S3への接続なしでオブジェクト取得・署名付きURL生成を模倣する。
//! 呼び出し回数を記録し、バックエンドに到達したかをテストで検証できる。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Bytes;

use super::{ObjectStore, StoreError, StoredObject};
use crate::keys::StorageKey;

/// テスト用のモックObjectStore。
#[derive(Default)]
pub struct MockObjectStore {
    objects: HashMap<String, StoredObject>,
    /// 設定されていれば全ての操作がこのエラーで失敗する
    failure: Option<StoreError>,
    calls: AtomicUsize,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// オブジェクトを追加する。
    pub fn with_object(mut self, key: &str, bytes: &[u8], content_type: Option<&str>) -> Self {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                bytes: Bytes::copy_from_slice(bytes),
                content_type: content_type.map(str::to_string),
            },
        );
        self
    }

    /// 全ての操作を指定エラーで失敗させる。
    pub fn failing_with(mut self, err: StoreError) -> Self {
        self.failure = Some(err);
        self
    }

    /// バックエンド呼び出し回数。
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn get(&self, key: &StorageKey) -> Result<StoredObject, StoreError> {
        self.record()?;
        self.objects
            .get(key.as_str())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn presign(&self, key: &StorageKey, ttl_secs: u32) -> Result<String, StoreError> {
        self.record()?;
        Ok(format!(
            "http://mock-storage/{key}?X-Amz-Expires={ttl_secs}&X-Amz-Signature=test"
        ))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.record()?;
        let mut keys: Vec<String> = self
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
