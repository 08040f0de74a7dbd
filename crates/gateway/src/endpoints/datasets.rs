//! # GET /datasets
//!
//! 設定されたデータセットの公開情報と、保守用のキー一覧。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use zarr_gateway_types::{DatasetInfo, KeyListResponse};

use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /datasets — データセット名・形状・dtype・チャンク形状の一覧。
pub async fn handle_list_datasets(
    State(state): State<Arc<GatewayState>>,
) -> Json<Vec<DatasetInfo>> {
    Json(state.gateway.datasets().iter().map(|d| d.info()).collect())
}

/// GET /datasets/{dataset}/keys — データセット配下のオブジェクト一覧。
///
/// ストレージに対して複数回の往復が発生し得るため、保守・デバッグ用途に限り
/// `ENABLE_KEY_LISTING` が有効な場合のみ公開する。
pub async fn handle_list_keys(
    State(state): State<Arc<GatewayState>>,
    Path(dataset): Path<String>,
) -> Result<Json<KeyListResponse>, GatewayError> {
    let keys = state.gateway.list_keys(&dataset).await?;
    Ok(Json(KeyListResponse { dataset, keys }))
}
