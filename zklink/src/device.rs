//! High-level device interface

use std::fmt;

use bytes::Bytes;
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use zklink_core::{Command, Packet, TransportKind, constants::requests};
use zklink_transport::{TcpTransport, Transport, UdpTransport};
use zklink_types::{Attendance, DeviceCapacity, DeviceInfo, RealtimeEvent, User, device_info::keys};

use crate::{
    channel::CommandChannel,
    config::DeviceConfig,
    error::{ConnectFailure, Error, ErrorKind, Result},
    ops,
};

/// Where the device connection stands
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    TcpConnecting,
    TcpConnected,
    UdpConnecting,
    UdpConnected,
    Failed,
}

impl ConnectionState {
    /// Check if commands may be dispatched
    pub fn is_connected(self) -> bool {
        matches!(self, Self::TcpConnected | Self::UdpConnected)
    }

    /// Transport this state refers to
    pub fn transport(self) -> Option<TransportKind> {
        match self {
            Self::TcpConnecting | Self::TcpConnected => Some(TransportKind::Tcp),
            Self::UdpConnecting | Self::UdpConnected => Some(TransportKind::Udp),
            Self::Disconnected | Self::Failed => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::TcpConnecting => "connecting (TCP)",
            Self::TcpConnected => "connected (TCP)",
            Self::UdpConnecting => "connecting (UDP)",
            Self::UdpConnected => "connected (UDP)",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Attaches transport, operation and address to errors from one operation
struct Dispatch {
    transport: TransportKind,
    command: &'static str,
    address: String,
}

impl Dispatch {
    fn wrap(&self, error: Error) -> Error {
        match error {
            already @ Error::Context { .. } => already,
            source => Error::Context {
                transport: self.transport,
                command: self.command,
                address: self.address.clone(),
                source: Box::new(source),
            },
        }
    }

    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.wrap(e))
    }
}

/// ZKTeco device
///
/// Connects over TCP first and falls back to UDP when TCP is refused.
/// Every operation runs on whichever transport won.
///
/// # Examples
///
/// ```no_run
/// use zklink::Device;
///
/// #[tokio::main]
/// async fn main() -> zklink::Result<()> {
///     let mut device = Device::new("192.168.1.201", 4370);
///
///     device.connect().await?;
///     println!("Connected over {:?}", device.transport());
///
///     let users = device.get_users().await?;
///     println!("{} users", users.len());
///
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Device {
    config: DeviceConfig,
    state: ConnectionState,
    channel: Option<CommandChannel>,
}

impl Device {
    /// Create a new device instance
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self::with_config(DeviceConfig::new(ip, port))
    }

    /// Create a device from full settings
    pub fn with_config(config: DeviceConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            channel: None,
        }
    }

    /// Set command timeout
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Settings in use
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Current connection state
    ///
    /// A channel whose socket was lost reports `Disconnected`.
    pub fn state(&self) -> ConnectionState {
        if self.channel_lost() {
            return ConnectionState::Disconnected;
        }
        self.state
    }

    /// Transport of the live connection
    pub fn transport(&self) -> Option<TransportKind> {
        self.channel.as_ref().filter(|c| c.is_open()).map(CommandChannel::kind)
    }

    fn channel_lost(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| !c.is_open())
    }

    /// Drop a channel whose socket was lost, returning whether one was
    fn forget_lost_channel(&mut self) -> bool {
        if !self.channel_lost() {
            return false;
        }
        info!("Connection to {} was lost", self.config.address());
        self.channel = None;
        self.state = ConnectionState::Disconnected;
        true
    }

    /// Check if a live channel is available
    pub fn is_connected(&self) -> bool {
        self.state.is_connected() && self.channel.as_ref().is_some_and(CommandChannel::is_open)
    }

    /// Connect to device
    ///
    /// TCP is tried first. Only a refused TCP connection falls back to UDP;
    /// any other TCP failure ends in [`ConnectionState::Failed`]. When the
    /// local UDP port is already in use the device is reported connected
    /// without a socket, and every later command fails with `NotConnected`.
    ///
    /// Calling this while connected is a no-op; after a lost connection it
    /// reconnects.
    pub async fn connect(&mut self) -> Result<()> {
        self.forget_lost_channel();
        if self.state.is_connected() {
            debug!("Already {}", self.state);
            return Ok(());
        }

        info!("Connecting to {}...", self.config.address());
        self.state = ConnectionState::TcpConnecting;

        match self.open_channel(TransportKind::Tcp).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.state = ConnectionState::TcpConnected;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::ConnectFailed(ConnectFailure::Refused) => {
                warn!("TCP refused by {}, falling back to UDP", self.config.address());
                self.connect_udp().await
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                Err(self.dispatch_for(TransportKind::Tcp, "connect").wrap(e))
            }
        }
    }

    async fn connect_udp(&mut self) -> Result<()> {
        self.state = ConnectionState::UdpConnecting;

        match self.open_channel(TransportKind::Udp).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.state = ConnectionState::UdpConnected;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::ConnectFailed(ConnectFailure::AddrInUse) => {
                warn!(
                    "UDP port {} already in use, continuing without a socket",
                    self.config.local_port
                );
                self.state = ConnectionState::UdpConnected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                Err(self.dispatch_for(TransportKind::Udp, "connect").wrap(e))
            }
        }
    }

    fn transport_for(&self, kind: TransportKind) -> Box<dyn Transport> {
        match kind {
            TransportKind::Tcp => Box::new(
                TcpTransport::new(self.config.host.clone(), self.config.port)
                    .with_connect_timeout(self.config.connect_timeout),
            ),
            TransportKind::Udp => Box::new(
                UdpTransport::new(self.config.host.clone(), self.config.port)
                    .with_local_port(self.config.local_port)
                    .with_connect_timeout(self.config.connect_timeout),
            ),
        }
    }

    /// Open a socket and run the handshake on it
    async fn open_channel(&self, kind: TransportKind) -> Result<CommandChannel> {
        let mut channel = CommandChannel::new(self.transport_for(kind), self.config.timeout)
            .with_strict_checksums(self.config.strict_checksums)
            .with_event_capacity(self.config.event_capacity);

        if let Err(e) = channel.open().await {
            channel.close().await;
            return Err(e);
        }
        if let Err(e) = channel.connect().await {
            channel.close().await;
            return Err(e);
        }

        Ok(channel)
    }

    /// Disconnect from device
    ///
    /// Sends EXIT when a session is up and always releases the socket.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut channel) = self.channel.take() {
            info!("Disconnecting from {}...", channel.remote_addr());
            channel.close().await;
            info!("Disconnected");
        }

        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn dispatch_for(&self, transport: TransportKind, command: &'static str) -> Dispatch {
        Dispatch {
            transport,
            command,
            address: self.config.address(),
        }
    }

    /// Active channel plus the context for errors of `command`
    fn dispatch(&mut self, command: &'static str) -> Result<(&mut CommandChannel, Dispatch)> {
        if self.forget_lost_channel() {
            info!("{} not sent", command);
        }
        if !self.state.is_connected() {
            return Err(Error::NotConnected);
        }

        let address = self.config.address();
        let channel = self.channel.as_mut().ok_or(Error::NotConnected)?;
        let ctx = Dispatch {
            transport: channel.kind(),
            command,
            address,
        };
        Ok((channel, ctx))
    }

    /// Send a raw command and return the device's reply
    pub async fn execute_cmd(&mut self, command: Command, payload: impl Into<Bytes>) -> Result<Packet> {
        let (channel, ctx) = self.dispatch(command.name())?;
        ctx.finish(channel.execute_cmd(command, payload).await)
    }

    /// Release any dataset buffered on the device
    pub async fn free_data(&mut self) -> Result<()> {
        let (channel, ctx) = self.dispatch("free_data")?;
        ctx.finish(ops::free_data(channel).await)
    }

    /// Enable device (normal operation mode)
    pub async fn enable_device(&mut self) -> Result<()> {
        let (channel, ctx) = self.dispatch("enable_device")?;
        ctx.finish(ops::acknowledged(channel, Command::EnableDevice, Bytes::new()).await)?;
        debug!("Device enabled");
        Ok(())
    }

    /// Disable device (show "Working..." on LCD)
    pub async fn disable_device(&mut self) -> Result<()> {
        let (channel, ctx) = self.dispatch("disable_device")?;
        ctx.finish(ops::acknowledged(channel, Command::DisableDevice, &requests::DISABLE_DEVICE[..]).await)?;
        debug!("Device disabled");
        Ok(())
    }

    /// Play the "thank you" voice prompt
    pub async fn voice_test(&mut self) -> Result<()> {
        let (channel, ctx) = self.dispatch("voice_test")?;
        ctx.finish(ops::acknowledged(channel, Command::TestVoice, &requests::TEST_VOICE[..]).await)?;
        Ok(())
    }

    /// User count, log count and log capacity
    pub async fn get_info(&mut self) -> Result<DeviceCapacity> {
        let (channel, ctx) = self.dispatch("get_info")?;
        ctx.finish(ops::get_capacity(channel).await)
    }

    /// Number of attendance records stored
    pub async fn get_attendance_size(&mut self) -> Result<u32> {
        let (channel, ctx) = self.dispatch("get_attendance_size")?;
        ctx.finish(ops::get_capacity(channel).await).map(|c| c.log_count)
    }

    /// Device clock
    pub async fn get_time(&mut self) -> Result<NaiveDateTime> {
        let (channel, ctx) = self.dispatch("get_time")?;
        ctx.finish(ops::get_time(channel).await)
    }

    /// Set the device clock
    pub async fn set_time(&mut self, t: NaiveDateTime) -> Result<()> {
        let (channel, ctx) = self.dispatch("set_time")?;
        ctx.finish(ops::set_time(channel, &t).await)
    }

    /// Every enrolled user
    pub async fn get_users(&mut self) -> Result<Vec<User>> {
        let inactivity = self.inactivity_window();
        let (channel, ctx) = self.dispatch("get_users")?;
        ctx.finish(ops::get_users(channel, inactivity).await)
    }

    /// The whole attendance log
    pub async fn get_attendances(&mut self) -> Result<Vec<Attendance>> {
        self.get_attendances_with_progress(|_, _| {}).await
    }

    /// The whole attendance log, reporting `(bytes_received, total)` as
    /// chunks arrive
    pub async fn get_attendances_with_progress<F>(&mut self, progress: F) -> Result<Vec<Attendance>>
    where
        F: FnMut(usize, usize),
    {
        let inactivity = self.inactivity_window();
        let (channel, ctx) = self.dispatch("get_attendances")?;
        ctx.finish(ops::get_attendances(channel, inactivity, progress).await)
    }

    fn inactivity_window(&self) -> std::time::Duration {
        let kind = self.transport().unwrap_or(TransportKind::Tcp);
        self.config.transfer_timeout_for(kind)
    }

    /// Create or overwrite a user
    pub async fn set_user(&mut self, user: &User) -> Result<()> {
        let (channel, ctx) = self.dispatch("set_user")?;
        ctx.finish(ops::set_user(channel, user).await)
    }

    /// Remove a user by uid
    pub async fn delete_user(&mut self, uid: u16) -> Result<()> {
        let (channel, ctx) = self.dispatch("delete_user")?;
        ctx.finish(ops::delete_user(channel, uid).await)
    }

    /// Erase the attendance log
    pub async fn clear_attendance_log(&mut self) -> Result<()> {
        let (channel, ctx) = self.dispatch("clear_attendance_log")?;
        ctx.finish(ops::acknowledged(channel, Command::ClearAttLog, Bytes::new()).await)?;
        warn!("Attendance log cleared");
        Ok(())
    }

    /// Erase users, fingerprints and logs
    pub async fn clear_data(&mut self) -> Result<()> {
        let (channel, ctx) = self.dispatch("clear_data")?;
        ctx.finish(ops::acknowledged(channel, Command::ClearData, Bytes::new()).await)?;
        warn!("Device data cleared");
        Ok(())
    }

    /// Read one `key=value` device option
    pub async fn read_option(&mut self, key: &str) -> Result<String> {
        let (channel, ctx) = self.dispatch("read_option")?;
        ctx.finish(ops::read_option(channel, key).await)
    }

    /// Firmware version string
    pub async fn firmware_version(&mut self) -> Result<String> {
        let (channel, ctx) = self.dispatch("firmware_version")?;
        ctx.finish(ops::firmware_version(channel).await)
    }

    /// Device serial number
    pub async fn serial_number(&mut self) -> Result<String> {
        self.read_option(keys::SERIAL_NUMBER).await
    }

    /// Vendor name
    pub async fn vendor(&mut self) -> Result<String> {
        self.read_option(keys::VENDOR).await
    }

    /// Device model name
    pub async fn device_name(&mut self) -> Result<String> {
        self.read_option(keys::DEVICE_NAME).await
    }

    /// Platform identifier
    pub async fn platform(&mut self) -> Result<String> {
        self.read_option(keys::PLATFORM).await
    }

    /// Firmware operating system version
    pub async fn os(&mut self) -> Result<String> {
        self.read_option(keys::OS).await
    }

    /// Network MAC address
    pub async fn mac_address(&mut self) -> Result<String> {
        self.read_option(keys::MAC_ADDRESS).await
    }

    /// Work code setting
    pub async fn work_code(&mut self) -> Result<String> {
        self.read_option(keys::WORK_CODE).await
    }

    /// Width of user PINs
    pub async fn pin_width(&mut self) -> Result<String> {
        self.read_option(keys::PIN_WIDTH).await
    }

    /// Check if face recognition is enabled
    pub async fn face_function(&mut self) -> Result<bool> {
        let value = self.read_option(keys::FACE_FUNCTION).await?;
        Ok(DeviceInfo::parse_face_function(&value))
    }

    /// Self-service recorder setting
    pub async fn ssr(&mut self) -> Result<String> {
        self.read_option(keys::SSR).await
    }

    /// Manufacturing date as reported by the device
    pub async fn product_time(&mut self) -> Result<String> {
        self.read_option(keys::PRODUCT_TIME).await
    }

    /// Fingerprint algorithm version
    pub async fn fingerprint_version(&mut self) -> Result<String> {
        self.read_option(keys::FINGERPRINT_VERSION).await
    }

    /// Optional option: a device that rejects the key yields `None`
    async fn optional_option(&mut self, key: &str) -> Result<Option<String>> {
        match self.read_option(key).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::UnhandledCommand => {
                debug!("Device does not report {}: {}", key, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Get device information
    ///
    /// Serial number and firmware are required; every other field is `None`
    /// when the device rejects its key.
    pub async fn get_device_info(&mut self) -> Result<DeviceInfo> {
        let serial_number = self.serial_number().await?;
        let firmware_version = self.firmware_version().await?;

        let mut info = DeviceInfo::new(serial_number, firmware_version);
        info.vendor = self.optional_option(keys::VENDOR).await?;
        info.platform = self.optional_option(keys::PLATFORM).await?;
        info.device_name = self.optional_option(keys::DEVICE_NAME).await?;
        info.os = self.optional_option(keys::OS).await?;
        info.mac_address = self.optional_option(keys::MAC_ADDRESS).await?;
        info.fingerprint_version = self.optional_option(keys::FINGERPRINT_VERSION).await?;
        info.work_code = self.optional_option(keys::WORK_CODE).await?;
        info.pin_width = self.optional_option(keys::PIN_WIDTH).await?;
        info.face_function = self
            .optional_option(keys::FACE_FUNCTION)
            .await?
            .map(|v| DeviceInfo::parse_face_function(&v));
        info.ssr = self.optional_option(keys::SSR).await?;
        info.product_time = self.optional_option(keys::PRODUCT_TIME).await?;

        debug!("Device info: {}", info);
        Ok(info)
    }

    /// Subscribe to realtime attendance events
    ///
    /// The first call installs `callback` on a listener task that lives as
    /// long as the connection. Later calls refresh the subscription on the
    /// device but keep the first listener; their callback is dropped, so
    /// every event is delivered exactly once.
    pub async fn register<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(RealtimeEvent) + Send + 'static,
    {
        let (channel, ctx) = self.dispatch("register")?;
        if ctx.finish(ops::register(channel, callback).await)? {
            info!("Realtime listener installed");
        }
        Ok(())
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.config.address())
            .field("state", &self.state)
            .finish()
    }
}
