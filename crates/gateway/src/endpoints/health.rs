//! # GET /health
//!
//! 死活監視用エンドポイント。ストレージには問い合わせない。

use axum::Json;
use zarr_gateway_types::HealthResponse;

/// GET /health — 常に `{"status":"ok"}` を返す。
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
