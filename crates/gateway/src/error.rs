//! # Gateway エラー型
//!
//! 起動時の設定エラーと、AccessOutcomeに乗らないハンドラ層のエラー。
//! オブジェクト取得の失敗は `gateway::AccessOutcome` で表現する。

use axum::http::StatusCode;

/// 設定読み込みエラー。起動時にのみ発生し、プロセスは起動を中止する。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// 必須の環境変数が未設定
    #[error("必須の環境変数 {0} が設定されていません")]
    Missing(&'static str),
    /// 環境変数の値が不正
    #[error("環境変数 {var} の値が不正です: {reason}")]
    Invalid {
        /// 環境変数名
        var: &'static str,
        /// 不正な理由
        reason: String,
    },
}

/// Gatewayエラー型（ハンドラ層）。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 未設定のデータセット
    #[error("データセットが見つかりません: {0}")]
    UnknownDataset(String),
    /// ストレージ操作に失敗
    #[error("ストレージ操作に失敗しました")]
    Storage,
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::UnknownDataset(_) => StatusCode::NOT_FOUND,
            GatewayError::Storage => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}
