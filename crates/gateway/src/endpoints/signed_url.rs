//! # GET /signed-url/{dataset}
//!
//! 委譲アクセス。ストレージへの署名付きGET URLを発行する。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use zarr_gateway_types::SignedUrlResponse;

use crate::config::GatewayState;
use crate::gateway::AccessOutcome;

/// GET /signed-url/{dataset} — データセットの既定メタデータ文書の署名付きURL発行。
pub async fn handle_signed_url_default(
    State(state): State<Arc<GatewayState>>,
    Path(dataset): Path<String>,
) -> Response {
    let outcome = state
        .gateway
        .presigned_access(&dataset, &state.default_signed_document)
        .await;
    render(outcome)
}

/// GET /signed-url/{dataset}/{*path} — 任意のチャンク・メタデータの署名付きURL発行。
pub async fn handle_signed_url(
    State(state): State<Arc<GatewayState>>,
    Path((dataset, path)): Path<(String, String)>,
) -> Response {
    let outcome = state.gateway.presigned_access(&dataset, &path).await;
    render(outcome)
}

/// 署名付きURLはJSONで返す。失敗時のステータスは代理アクセスと同じ写像に従う。
fn render(outcome: AccessOutcome) -> Response {
    match outcome {
        AccessOutcome::Redirect { url, cache, .. } => (
            StatusCode::OK,
            [(header::CACHE_CONTROL, cache.header_value())],
            Json(SignedUrlResponse { signed_url: url }),
        )
            .into_response(),
        other => other.into_response(),
    }
}
