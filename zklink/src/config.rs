//! Device connection settings

use std::time::Duration;

use zklink_core::{
    DEFAULT_PORT, TransportKind,
    constants::{DEFAULT_TIMEOUT, TCP_TRANSFER_TIMEOUT, UDP_TRANSFER_TIMEOUT},
};

/// Default depth of the realtime event queue
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Settings for one device
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use zklink::DeviceConfig;
///
/// let config = DeviceConfig::new("192.168.1.201", 4370)
///     .with_timeout(Duration::from_secs(3))
///     .with_local_port(5000);
/// assert_eq!(config.address(), "192.168.1.201:4370");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device host name or IP
    pub host: String,

    /// Device port, shared by TCP and UDP
    pub port: u16,

    /// Reply window for ordinary commands
    pub timeout: Duration,

    /// Socket connect window
    pub connect_timeout: Duration,

    /// Local UDP port (0 picks an ephemeral one)
    pub local_port: u16,

    /// Bulk transfer inactivity window; `None` uses the transport default
    pub transfer_timeout: Option<Duration>,

    /// Reject frames whose checksum does not match
    pub strict_checksums: bool,

    /// Realtime events buffered before the reader waits for the listener
    pub event_capacity: usize,
}

impl DeviceConfig {
    /// Settings with default timeouts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
            local_port: 0,
            transfer_timeout: None,
            strict_checksums: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set socket connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bind UDP to a fixed local port
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Override the bulk transfer inactivity window for both transports
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = Some(timeout);
        self
    }

    /// Enforce checksums on received frames
    pub fn with_strict_checksums(mut self, strict: bool) -> Self {
        self.strict_checksums = strict;
        self
    }

    /// Set realtime event queue depth (at least 1)
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Inactivity window for bulk transfers over `kind`
    pub fn transfer_timeout_for(&self, kind: TransportKind) -> Duration {
        self.transfer_timeout.unwrap_or(match kind {
            TransportKind::Tcp => TCP_TRANSFER_TIMEOUT,
            TransportKind::Udp => UDP_TRANSFER_TIMEOUT,
        })
    }

    /// `host:port` of the device
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new("192.168.1.201", DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_timeout_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.transfer_timeout_for(TransportKind::Tcp), Duration::from_secs(10));
        assert_eq!(config.transfer_timeout_for(TransportKind::Udp), Duration::from_secs(3));

        let config = config.with_transfer_timeout(Duration::from_millis(500));
        assert_eq!(config.transfer_timeout_for(TransportKind::Tcp), Duration::from_millis(500));
    }

    #[test]
    fn test_event_capacity_floor() {
        assert_eq!(DeviceConfig::default().with_event_capacity(0).event_capacity, 1);
    }
}
