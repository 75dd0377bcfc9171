// Relay service main entry point.
use anyhow::{Context, Result};
use relay::{config, http, observability};
use relay_broker::Registry;
use std::future::Future;

#[tokio::main]
async fn main() -> Result<()> {
    run_with_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    observability::init_tracing();

    let config = config::RelayConfig::from_env()?;
    let registry =
        Registry::new(config.mailbox_capacity).context("create subscriber registry")?;
    tracing::info!(mailbox_capacity = config.mailbox_capacity, "registry started");

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "http listener started");

    axum::serve(listener, http::router(registry))
        .with_graceful_shutdown(shutdown)
        .await
        .context("serve relay")?;
    tracing::info!("relay stopped");
    Ok(())
}
