//! Dump users and the attendance log with transfer progress

use std::io::Write;

use tracing_subscriber::EnvFilter;
use zklink::Device;

#[tokio::main]
async fn main() -> zklink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());

    let mut device = Device::new(ip, zklink_core::DEFAULT_PORT);
    device.connect().await?;

    let users = device.get_users().await?;
    println!("{} users", users.len());
    for user in &users {
        println!("  {}", user);
    }

    let logs = device
        .get_attendances_with_progress(|received, total| {
            print!("\rDownloading log: {}/{} bytes", received, total);
            let _ = std::io::stdout().flush();
        })
        .await;
    println!();

    match logs {
        Ok(logs) => {
            println!("{} attendance records", logs.len());
            for log in logs.iter().rev().take(20) {
                println!("  {}", log);
            }
        }
        Err(e) => {
            if let Some(partial) = e.partial_data() {
                eprintln!("Transfer stalled with {} bytes received", partial.len());
            }
            device.disconnect().await?;
            return Err(e);
        }
    }

    device.disconnect().await?;
    Ok(())
}
