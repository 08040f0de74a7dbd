//! # Gatewayエンドポイント
//!
//! AccessGateway上の薄いHTTP層。パスの分解とステータス・ヘッダーの写像のみを行う。
//!
//! ## API エンドポイント
//! - `GET /health` — 死活監視
//! - `GET /datasets` — データセット一覧
//! - `GET /proxy/{dataset}/{*path}` — 代理アクセス
//! - `GET /signed-url/{dataset}[/{*path}]` — 署名付きURL発行
//! - `GET /data/{dataset}/{*path}` — 配備の優先戦略でのアクセス
//! - `GET /datasets/{dataset}/keys` — キー一覧（保守用、設定で有効化）

pub mod data;
pub mod datasets;
pub mod health;
pub mod proxy;
pub mod response;
pub mod signed_url;

pub use data::handle_data;
pub use datasets::{handle_list_datasets, handle_list_keys};
pub use health::handle_health;
pub use proxy::handle_proxy;
pub use signed_url::{handle_signed_url, handle_signed_url_default};

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::GatewayState;
use crate::gateway::AccessStrategy;

/// 設定されたオリジンからの読み取りを許可するCORSレイヤー。
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "不正なCORSオリジンを無視");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// ルーターを構築する。無効な戦略のエンドポイントはマウントしない。
pub fn router(state: Arc<GatewayState>) -> axum::Router {
    let mut app = axum::Router::new()
        .route("/health", get(handle_health))
        .route("/datasets", get(handle_list_datasets))
        .route("/data/{dataset}/{*path}", get(handle_data));

    if state.access_mode.allows(AccessStrategy::Proxied) {
        app = app.route("/proxy/{dataset}/{*path}", get(handle_proxy));
    }
    if state.access_mode.allows(AccessStrategy::Delegated) {
        app = app
            .route("/signed-url/{dataset}", get(handle_signed_url_default))
            .route("/signed-url/{dataset}/{*path}", get(handle_signed_url));
    }
    if state.enable_key_listing {
        app = app.route("/datasets/{dataset}/keys", get(handle_list_keys));
    }

    let cors = cors_layer(&state.cors_allowed_origins);
    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
