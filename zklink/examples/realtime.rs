//! Print attendance punches as they happen, until Ctrl-C

use tracing_subscriber::EnvFilter;
use zklink::Device;

#[tokio::main]
async fn main() -> zklink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());

    let mut device = Device::new(ip, zklink_core::DEFAULT_PORT);
    device.connect().await?;

    device
        .register(|event| println!("Punch: user {} at {}", event.user_id, event.timestamp))
        .await?;
    println!("Listening for punches, Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Cannot wait for Ctrl-C: {}", e);
    }

    device.disconnect().await?;
    Ok(())
}
