//! BlueBridge gateway - bridges short-range sensor devices to the cloud broker.

use std::env;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bluebridge_gateway::channel::WsChannel;
use bluebridge_gateway::transport::build_transport;
use bluebridge_gateway::{
    Config, GatewayController, GatewayIdentity, InstructionDispatcher, ProvisioningClient,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    println!("bluebridge-gateway {}", VERSION);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        print_version();
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Make sure config.toml exists or set BRIDGE__GATEWAY__MAC_ADDRESS and the cloud endpoints.",
            e
        )
    })?;

    let identity = GatewayIdentity::new(
        config.gateway.mac_address.clone(),
        config.gateway.secret.clone(),
    );
    let provisioning = ProvisioningClient::new(&config.cloud)?;

    // One-shot operator modes
    if args.iter().any(|a| a == "--register-only") {
        match provisioning.register(identity.mac_address()).await {
            Ok(Some(_)) => tracing::info!("Registered {}, secret issued", identity.mac_address()),
            Ok(None) => tracing::info!("Registered {}, no new secret", identity.mac_address()),
            Err(e) => tracing::error!("Registration failed: {}", e),
        }
        return Ok(());
    }
    if args.iter().any(|a| a == "--wipe") {
        provisioning.wipe(identity.mac_address(), true).await?;
        tracing::info!("Cloud records wiped for {}", identity.mac_address());
        return Ok(());
    }

    tracing::info!(
        "Starting bluebridge-gateway {} as {}",
        VERSION,
        identity.mac_address()
    );

    let (control_tx, control_rx) = mpsc::channel(config.runtime.queue_capacity);
    let (notify_tx, notify_rx) = mpsc::channel(config.runtime.queue_capacity);

    let transport = build_transport(&config.transport, notify_tx).await?;
    tracing::info!("Device transport backend: {}", transport.backend());

    let control_topic = config.broker.control_topic(identity.mac_address());
    let channel = Arc::new(WsChannel::new(&config.broker, control_topic, control_tx));
    let dispatcher = InstructionDispatcher::new(transport, notify_rx, &config.transport);

    // Ctrl-C flips the token; the controller winds down at the next tick.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            signal_token.cancel();
        }
    });

    let mut controller = GatewayController::new(
        &config,
        identity,
        provisioning,
        channel,
        dispatcher,
        control_rx,
        shutdown,
    );
    controller.run().await;

    Ok(())
}
