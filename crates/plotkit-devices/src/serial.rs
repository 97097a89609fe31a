//! Serial port communication implementation
//!
//! Provides serial port discovery and line-delimited links for direct
//! hardware connection to the motion controller, operator panel, and
//! actuator controller via USB or RS-232.
//!
//! Supports:
//! - Port enumeration filtered to controller-class devices
//! - Baud rate, parity, and stop bit configuration
//! - A background reader splitting bytes into broadcast lines
//! - Mutex-serialized newline-terminated writes

use crate::link::{DeviceAdapter, DeviceLink};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use plotkit_core::{DeviceType, Error, Result, TransportError};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the per-link line broadcast channel
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }
}

/// List available serial ports on the system
///
/// Returns candidate ports for plotter hardware, filtered to the
/// device patterns controllers enumerate as:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => {
            let port_infos: Vec<SerialPortInfo> = ports
                .iter()
                .filter(|port| is_controller_port(&port.port_name))
                .map(|port| {
                    let mut info =
                        SerialPortInfo::new(&port.port_name, port_description(port));

                    if let serialport::SerialPortType::UsbPort(usb_info) = &port.port_type {
                        info.vid = Some(usb_info.vid);
                        info.pid = Some(usb_info.pid);
                        info.manufacturer = usb_info.manufacturer.clone();
                        info.serial_number = usb_info.serial_number.clone();
                    }

                    info
                })
                .collect();

            Ok(port_infos)
        }
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(TransportError::EnumerationFailed {
                reason: e.to_string(),
            }
            .into())
        }
    }
}

/// Check if a port name matches controller-class device patterns
fn is_controller_port(port_name: &str) -> bool {
    // Windows COM ports
    if port_name.starts_with("COM") && port_name[3..].chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    // Linux USB and ACM devices
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }

    // macOS serial and modem devices
    if port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem") {
        return true;
    }

    false
}

/// Get a user-friendly description for a port
fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Parameters for opening one serial link
#[derive(Debug, Clone)]
pub struct SerialLinkParams {
    /// Device class the link will serve
    pub device_type: DeviceType,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5..=8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Read timeout of the background reader; keeps the stop flag live
    pub read_timeout_ms: u64,
}

impl SerialLinkParams {
    /// Conventional 8N1 parameters for a device type
    pub fn new(device_type: DeviceType, baud_rate: u32) -> Self {
        Self {
            device_type,
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            read_timeout_ms: 50,
        }
    }
}

struct SerialShared {
    device_type: DeviceType,
    path: String,
    open: AtomicBool,
    stop: AtomicBool,
    lines_tx: RwLock<Option<broadcast::Sender<String>>>,
    writer: Mutex<Box<dyn serialport::SerialPort>>,
}

impl SerialShared {
    /// Drop the sender so subscribers observe channel closure.
    fn shut_down(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
        self.lines_tx.write().take();
    }
}

/// Line-delimited serial link
///
/// A background thread owns the read half (serial reads are blocking),
/// accumulates bytes, and broadcasts complete lines. Writes share the
/// cloned write half behind a mutex.
pub struct SerialLink {
    shared: Arc<SerialShared>,
}

impl SerialLink {
    /// Open a serial link on the given port
    pub fn open(port: &str, params: &SerialLinkParams) -> Result<Self> {
        let builder = serialport::new(port, params.baud_rate)
            .timeout(Duration::from_millis(params.read_timeout_ms))
            .data_bits(match params.data_bits {
                5 => serialport::DataBits::Five,
                6 => serialport::DataBits::Six,
                7 => serialport::DataBits::Seven,
                8 => serialport::DataBits::Eight,
                other => {
                    return Err(Error::other(format!("Invalid data bits: {}", other)));
                }
            })
            .stop_bits(match params.stop_bits {
                1 => serialport::StopBits::One,
                2 => serialport::StopBits::Two,
                other => {
                    return Err(Error::other(format!("Invalid stop bits: {}", other)));
                }
            })
            .parity(to_serialport_parity(params.parity));

        let writer = builder.open().map_err(|e| {
            tracing::warn!("Failed to open serial port {}: {}", port, e);
            TransportError::FailedToOpen {
                port: port.to_string(),
                reason: e.to_string(),
            }
        })?;

        let reader = writer.try_clone().map_err(|e| TransportError::FailedToOpen {
            port: port.to_string(),
            reason: format!("clone for reader failed: {}", e),
        })?;

        let (lines_tx, _) = broadcast::channel(LINE_CHANNEL_CAPACITY);

        let shared = Arc::new(SerialShared {
            device_type: params.device_type,
            path: port.to_string(),
            open: AtomicBool::new(true),
            stop: AtomicBool::new(false),
            lines_tx: RwLock::new(Some(lines_tx)),
            writer: Mutex::new(writer),
        });

        Self::spawn_reader(shared.clone(), reader);

        Ok(Self { shared })
    }

    fn spawn_reader(shared: Arc<SerialShared>, mut reader: Box<dyn serialport::SerialPort>) {
        let thread_name = format!("serial-reader-{}", shared.device_type);
        let result = std::thread::Builder::new().name(thread_name).spawn({
            let shared = shared.clone();
            move || {
                let mut pending = String::new();
                let mut buf = [0u8; 512];

                loop {
                    if shared.stop.load(Ordering::SeqCst) {
                        break;
                    }

                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                            while let Some(pos) = pending.find('\n') {
                                let line = pending[..pos].trim_end_matches('\r').to_string();
                                pending.drain(..=pos);
                                if !line.is_empty() {
                                    if let Some(tx) = shared.lines_tx.read().as_ref() {
                                        let _ = tx.send(line);
                                    }
                                }
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::warn!(
                                "Serial read failed on {} ({}): {}",
                                shared.path,
                                shared.device_type,
                                e
                            );
                            break;
                        }
                    }
                }

                shared.shut_down();
                tracing::debug!("Serial reader for {} exited", shared.path);
            }
        });

        if let Err(e) = result {
            tracing::error!("Failed to spawn serial reader: {}", e);
            // Writes fail fast once the link reports closed.
            shared.shut_down();
        }
    }
}

#[async_trait]
impl DeviceLink for SerialLink {
    fn device_type(&self) -> DeviceType {
        self.shared.device_type
    }

    fn path(&self) -> &str {
        &self.shared.path
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::ConnectionLost {
                device: self.shared.device_type,
                reason: "link closed".to_string(),
            }
            .into());
        }

        let mut payload = line.as_bytes().to_vec();
        payload.push(b'\n');

        let mut writer = self.shared.writer.lock();
        writer
            .write_all(&payload)
            .and_then(|_| writer.flush())
            .map_err(|e| {
                Error::from(TransportError::WriteFailed {
                    device: self.shared.device_type,
                    reason: e.to_string(),
                })
            })
    }

    fn subscribe_lines(&self) -> broadcast::Receiver<String> {
        match self.shared.lines_tx.read().as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                // Already closed: hand back a receiver that reports Closed.
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.shared.shut_down();
        Ok(())
    }
}

/// Production adapter opening serial links for one device type
pub struct SerialDeviceAdapter {
    params: SerialLinkParams,
}

impl SerialDeviceAdapter {
    /// Create an adapter with the given link parameters
    pub fn new(params: SerialLinkParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl DeviceAdapter for SerialDeviceAdapter {
    async fn connect(&self, port: &str) -> Result<Arc<dyn DeviceLink>> {
        let params = self.params.clone();
        let port = port.to_string();
        // Opening a serial port touches the OS synchronously; keep it off
        // the reactor.
        let link = tokio::task::spawn_blocking(move || SerialLink::open(&port, &params))
            .await
            .map_err(|e| Error::other(format!("connect task failed: {}", e)))??;
        Ok(Arc::new(link))
    }

    async fn disconnect(&self, link: &Arc<dyn DeviceLink>) -> Result<()> {
        link.close().await
    }
}
