//! Device control example

use std::time::Duration;

use tokio::time::sleep;
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

    println!("Device connected over {:?}", device.transport());

    // Disable device (show "Working...")
    println!("Disabling device...");
    device.disable_device().await?;
    sleep(Duration::from_secs(3)).await;

    // Enable device (resume normal operation)
    println!("Enabling device...");
    device.enable_device().await?;
    device.voice_test().await?;

    println!("Syncing clock...");
    device.set_time(chrono::Local::now().naive_local()).await?;

    println!("Done!");
    device.disconnect().await?;

    Ok(())
}
