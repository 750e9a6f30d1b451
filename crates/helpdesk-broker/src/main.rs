use std::{net::SocketAddr, process};

use anyhow::Result;
use helpdesk_broker::{build_context, config::BrokerConfig, http};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(error) = run().await {
        tracing::error!("broker shut down with error: {error:#}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn run() -> Result<()> {
    tracing::info!(component = "broker", "helpdesk broker starting up");
    let config = BrokerConfig::from_env()?;
    tracing::info!(
        site = %format!("{}{}", config.sharepoint.hostname, config.sharepoint.site_path),
        list = %config.sharepoint.list_name,
        mail_enabled = config.mail.is_enabled(),
        "configuration loaded"
    );

    let context = build_context(&config)?;
    let router = http::router(context);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(?addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
