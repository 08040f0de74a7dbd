//! # AccessOutcome → HTTPレスポンス
//!
//! ステータスコードとヘッダーの写像。エラー本文は平文で、
//! バケット名・プレフィックス・バックエンドのメッセージを含まない。

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::gateway::AccessOutcome;

fn cache_control(value: String) -> HeaderValue {
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("no-cache"))
}

impl IntoResponse for AccessOutcome {
    /// `Redirect` は `307 Temporary Redirect` として返す。
    /// JSONで署名付きURLを返すエンドポイントは `Redirect` を自前で描画する。
    fn into_response(self) -> Response {
        match self {
            AccessOutcome::Found {
                body,
                content_type,
                cache,
            } => {
                let content_type = HeaderValue::from_str(&content_type).unwrap_or_else(|_| {
                    HeaderValue::from_static(crate::gateway::OCTET_STREAM)
                });
                (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, content_type),
                        (header::CACHE_CONTROL, cache_control(cache.header_value())),
                    ],
                    body,
                )
                    .into_response()
            }
            AccessOutcome::Redirect { url, cache, .. } => match HeaderValue::from_str(&url) {
                Ok(location) => (
                    StatusCode::TEMPORARY_REDIRECT,
                    [
                        (header::LOCATION, location),
                        (header::CACHE_CONTROL, cache_control(cache.header_value())),
                    ],
                )
                    .into_response(),
                Err(e) => {
                    tracing::error!(error = %e, "署名付きURLをLocationヘッダーに変換できません");
                    (StatusCode::BAD_GATEWAY, "署名付きURLの生成に失敗しました").into_response()
                }
            },
            AccessOutcome::NotFound { detail } => (StatusCode::NOT_FOUND, detail).into_response(),
            AccessOutcome::Forbidden { detail } => (StatusCode::FORBIDDEN, detail).into_response(),
            AccessOutcome::UpstreamError {
                detail,
                retryable: true,
                retry_after_secs,
            } => {
                let mut response = (StatusCode::SERVICE_UNAVAILABLE, detail).into_response();
                if let Some(secs) = retry_after_secs {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                }
                response
            }
            AccessOutcome::UpstreamError { detail, .. } => {
                (StatusCode::BAD_GATEWAY, detail).into_response()
            }
        }
    }
}
