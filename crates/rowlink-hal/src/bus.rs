//! Device enumeration on the shared bus.

use async_trait::async_trait;
use rowlink_types::DeviceId;
use thiserror::Error;

use crate::transport::ErgTransport;

/// USB vendor id reported by Concept2 performance monitors.
pub const C2_VENDOR_ID: u16 = 0x17a4;

/// What the bus reports about one attached device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Hardware serial string, when the device exposes one.
    pub serial: Option<String>,
}

impl DeviceDescriptor {
    /// Stable identity for this device.
    ///
    /// The hardware serial wins when present so a device keeps its identity
    /// when it is re-plugged into another port; otherwise the bus location is
    /// used.
    pub fn identity(&self) -> DeviceId {
        match self.serial.as_deref().map(str::trim) {
            Some(serial) if !serial.is_empty() => DeviceId::new(format!("serial:{serial}")),
            _ => DeviceId::new(format!("bus{}-addr{}", self.bus, self.address)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Another process holds the bus; try again on the next cycle.
    #[error("bus busy")]
    Busy,

    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

/// Platform bus-access layer.
#[async_trait]
pub trait ErgBus: Send + Sync {
    /// List the ergometers currently attached.
    ///
    /// # Errors
    ///
    /// [`BusError::Busy`] is recoverable; [`BusError::Unavailable`] means no
    /// backend is present at all.
    async fn find(&self) -> Result<Vec<DeviceDescriptor>, BusError>;

    /// Claim the device and return a transport bound to it.
    async fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn ErgTransport>, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(serial: Option<&str>) -> DeviceDescriptor {
        DeviceDescriptor {
            bus: 1,
            address: 4,
            vendor_id: C2_VENDOR_ID,
            product_id: 0x0003,
            serial: serial.map(str::to_string),
        }
    }

    #[test]
    fn identity_prefers_serial() {
        assert_eq!(
            descriptor(Some("430012345")).identity().as_str(),
            "serial:430012345"
        );
    }

    #[test]
    fn identity_falls_back_to_location() {
        assert_eq!(descriptor(None).identity().as_str(), "bus1-addr4");
        assert_eq!(descriptor(Some("  ")).identity().as_str(), "bus1-addr4");
    }
}
