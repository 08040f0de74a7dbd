//! # GET /proxy/{dataset}/{*path}
//!
//! 代理アクセス。Gatewayがオブジェクトを取得し、そのまま中継する。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::config::GatewayState;

/// GET /proxy/{dataset}/{*path} — チャンク・メタデータの中継。
///
/// クライアントが切断するとこのfutureごと破棄され、進行中のバックエンド取得も打ち切られる。
pub async fn handle_proxy(
    State(state): State<Arc<GatewayState>>,
    Path((dataset, path)): Path<(String, String)>,
) -> Response {
    state
        .gateway
        .proxied_access(&dataset, &path)
        .await
        .into_response()
}
