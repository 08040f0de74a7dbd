//! # Zarr Gateway 共有型定義
//!
//! GatewayのHTTPインターフェースでやり取りされるJSON構造体を提供する。
//! ブラウザ側のZarrリーダーやCLIツールからも同じ型でデコードできる。
//!
//! ## エンコーディング規則
//! - チャンク・メタデータ本体はJSONに包まず、生バイト列のまま返却する
//! - 配列形状・チャンク形状は次元ごとの要素数（`u64`）の配列で表す

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// ヘルスチェックレスポンス。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 常に "ok"
    pub status: String,
}

impl HealthResponse {
    /// 正常応答を構築する。
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// GET /signed-url/{dataset}
// ---------------------------------------------------------------------------

/// 署名付きURL発行レスポンス。
///
/// ブラウザはこのURLへ直接GETし、ストレージバックエンドからオブジェクトを取得する。
/// URLは発行時刻から設定されたTTL秒だけ有効。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    /// 署名付きGET URL
    pub signed_url: String,
}

// ---------------------------------------------------------------------------
// GET /datasets
// ---------------------------------------------------------------------------

/// データセットの公開情報。
///
/// ストレージ上のプレフィックスは内部構造のため含めない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// データセット名 (例: "route", "traffic")
    pub name: String,
    /// 配列形状
    pub shape: Vec<u64>,
    /// Zarr dtype文字列 (例: "<f8")
    pub dtype: String,
    /// チャンク形状
    pub chunks: Vec<u64>,
}

// ---------------------------------------------------------------------------
// GET /datasets/{dataset}/keys
// ---------------------------------------------------------------------------

/// データセット配下のオブジェクト一覧（保守・デバッグ用）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyListResponse {
    /// データセット名
    pub dataset: String,
    /// データセットのプレフィックスからの相対パス
    pub keys: Vec<String>,
}
