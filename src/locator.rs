//! Serial port discovery by USB vendor/product ID.

use tokio_serial::{available_ports, SerialPortType};
use tracing::{debug, info};

use crate::proto::{ProtoError, Result};

/// USB vendor ID of the NanoVNA's virtual COM port (STMicroelectronics).
pub const NANOVNA_VID: u16 = 0x0483;
/// USB product ID of the NanoVNA's virtual COM port.
pub const NANOVNA_PID: u16 = 0x5740;

/// Information about a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., /dev/ttyACM0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB product string
    pub product: Option<String>,
}

impl PortInfo {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                product: None,
            },
        }
    }

    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == Some(vid) && self.pid == Some(pid)
    }
}

/// Lists all serial ports known to the system.
pub fn enumerate_ports() -> Result<Vec<PortInfo>> {
    let ports: Vec<PortInfo> = available_ports()?
        .into_iter()
        .map(|p| PortInfo::from_serialport(p.port_name, &p.port_type))
        .collect();
    debug!("Found {} serial port(s)", ports.len());
    Ok(ports)
}

/// Picks the first port carrying the NanoVNA's VID/PID.
pub fn find_port_in(ports: &[PortInfo]) -> Result<String> {
    ports
        .iter()
        .find(|p| p.matches(NANOVNA_VID, NANOVNA_PID))
        .map(|p| p.port.clone())
        .ok_or(ProtoError::DeviceNotFound {
            vid: NANOVNA_VID,
            pid: NANOVNA_PID,
        })
}

/// Enumerates the system's serial ports and returns the NanoVNA's.
pub fn find_port() -> Result<String> {
    let port = find_port_in(&enumerate_ports()?)?;
    info!("NanoVNA found at {}", port);
    Ok(port)
}
