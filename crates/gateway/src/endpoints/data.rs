//! # GET /data/{dataset}/{*path}
//!
//! 配備で選択された戦略でのアクセス。
//! 代理アクセスならオブジェクト本体、委譲アクセスなら署名付きURLへの307リダイレクトを返す。
//! Zarrリーダーにはこのパスをストアのルートとして渡せばよい。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::config::GatewayState;

/// GET /data/{dataset}/{*path} — 配備の優先戦略でアクセスする。
pub async fn handle_data(
    State(state): State<Arc<GatewayState>>,
    Path((dataset, path)): Path<(String, String)>,
) -> Response {
    state
        .gateway
        .access(state.access_mode.preferred(), &dataset, &path)
        .await
        .into_response()
}
