//! Connect (TCP, falling back to UDP) and print device information
//!
//! ```text
//! DEVICE_IP=192.168.1.201 RUST_LOG=zklink=debug cargo run --example connect
//! ```

use tracing_subscriber::EnvFilter;
use zklink::{Device, DeviceConfig};

#[tokio::main]
async fn main() -> zklink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());
    let port = std::env::var("DEVICE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(zklink_core::DEFAULT_PORT);

    println!("Connecting to {}:{}...", ip, port);
    let mut device = Device::with_config(DeviceConfig::new(ip, port));

    device.connect().await?;
    println!("✓ Connected ({})", device.state());

    let info = device.get_device_info().await?;
    println!("✓ Device: {}", info);

    let capacity = device.get_info().await?;
    println!(
        "✓ {} users, {} of {} log slots used",
        capacity.user_count, capacity.log_count, capacity.log_capacity
    );

    println!("✓ Clock: {}", device.get_time().await?);

    device.disconnect().await?;
    println!("✓ Disconnected");

    Ok(())
}
