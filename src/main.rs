use dotenvy::dotenv;
use tracing::{info, warn};

use ltd_billing::infra::{
    app::create_app,
    config::AppConfig,
    setup::{init_app_state, init_tracing},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env();
    init_tracing(config.log_file.as_deref());

    let app_state = init_app_state(config).await?;

    // Read bind address from config before moving app_state
    let bind_addr = app_state.config.bind_addr;
    let pricing = app_state.pricing_config.current();
    info!(
        version = pricing.version,
        launch_at = %pricing.launch_at,
        discount_hold = pricing.discount.hold,
        bonus_hold = pricing.bonus.hold,
        "Pricing config loaded"
    );

    let reconciler = app_state.reconciler.clone();
    let app = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Backend listening at {}", &listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(in_flight = reconciler.in_flight_count(), "Draining webhook reconciliation");
    reconciler.wait_idle().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
