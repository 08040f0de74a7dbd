//! # Zarr Gateway
//!
//! S3互換オブジェクトストレージ上のZarr配列への読み取りアクセスを提供するGateway。
//!
//! ## 役割
//! - データセット名と相対チャンクパスからストレージキーへの解決
//! - 代理アクセス（Gatewayがオブジェクトを取得して中継）
//! - 委譲アクセス（署名付きURLを発行し、クライアントが直接取得）
//! - ストレージ障害のHTTPステータスへの写像とキャッシュ指示の付与
//!
//! エンドポイント一覧は [`endpoints`] を参照。

mod config;
mod dataset;
mod endpoints;
mod error;
mod gateway;
mod keys;
mod storage;

use std::sync::Arc;

use config::{GatewayConfig, GatewayState};
use gateway::AccessGateway;
use storage::ObjectStore;

/// 設定されたストレージバックエンドを構築する。
#[cfg(feature = "vendor-aws")]
fn build_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store = storage::S3ObjectStore::from_config(&config.storage, config.retry.clone())?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "vendor-aws"))]
fn build_store(_config: &GatewayConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    anyhow::bail!("ストレージバックエンドが有効化されていません（vendor-aws featureが必要です）")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    tracing::debug!(?config, "設定を読み込みました");

    let store = build_store(&config)?;

    let state = Arc::new(GatewayState {
        gateway: AccessGateway::new(
            store,
            config.datasets.clone(),
            config.signed_url_ttl_secs,
            config.metadata_max_age_secs,
        ),
        access_mode: config.access_mode,
        default_signed_document: config.default_signed_document.clone(),
        cors_allowed_origins: config.cors_allowed_origins.clone(),
        enable_key_listing: config.enable_key_listing,
    });

    let app = endpoints::router(state);

    tracing::info!(
        addr = %config.bind_addr,
        bucket = %config.storage.bucket,
        access_mode = ?config.access_mode,
        datasets = config.datasets.len(),
        "Gatewayを起動します"
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
