use anyhow::Context;
use dbservice::{
    api, config, logging,
    opensearch::OpenSearchService,
    provisioning::{Provisioner, ProvisioningConfig, shutdown_requested},
    service::GatewayService,
};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::watch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let opensearch =
        OpenSearchService::new().context("Failed to initialize the OpenSearch client")?;
    let provisioned = Provisioner::new(&opensearch, ProvisioningConfig::from_config(config))
        .provision(shutdown_rx.clone())
        .await
        .context("OpenSearch provisioning failed; refusing to serve")?;

    let service = GatewayService::new(
        opensearch,
        provisioned,
        config.knn_index_path(),
        config.search_top_k,
    );
    let app = api::create_router(Arc::new(service));

    let address = (config.server_host.as_str(), config.server_port);
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}:{}", address.0, address.1))?;
    tracing::info!(
        "Listening on http://{}:{}{}",
        address.0,
        address.1,
        api::ROUTE_PREFIX
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown_rx).await })
        .await
        .context("HTTP server terminated unexpectedly")
}
