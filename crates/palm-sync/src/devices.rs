//! Known USB handhelds.
//!
//! The USB endpoint drivers live outside this crate. They use this table to
//! recognize a device, pick its init sequence and choose which framing to
//! speak before handing the stream to a [`StreamConnector`](crate::StreamConnector).

use serde::{Deserialize, Serialize};

use crate::server::Protocol;

/// Vendor control request a device needs before its sync endpoint opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsbInitMode {
    /// Endpoints are usable as soon as the device enumerates.
    None,
    /// Handspring-style "get connection info" request.
    Visor,
    /// Palm OS 4 "get extended connection info" request.
    PalmOs4,
}

/// One row of the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsbDeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub label: &'static str,
    pub init_mode: UsbInitMode,
    pub protocol: Protocol,
}

const fn device(
    vendor_id: u16,
    product_id: u16,
    label: &'static str,
    init_mode: UsbInitMode,
    protocol: Protocol,
) -> UsbDeviceInfo {
    UsbDeviceInfo {
        vendor_id,
        product_id,
        label,
        init_mode,
        protocol,
    }
}

pub const VENDOR_PALM: u16 = 0x0830;
pub const VENDOR_HANDSPRING: u16 = 0x082d;
pub const VENDOR_SONY: u16 = 0x054c;

/// Every handheld the inventory recognizes.
pub static USB_DEVICES: &[UsbDeviceInfo] = &[
    device(VENDOR_HANDSPRING, 0x0100, "Handspring Visor", UsbInitMode::Visor, Protocol::Slp),
    device(VENDOR_HANDSPRING, 0x0200, "Handspring Treo", UsbInitMode::Visor, Protocol::Slp),
    device(VENDOR_HANDSPRING, 0x0300, "Handspring Treo 600", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0001, "Palm m500", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0002, "Palm m505", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0003, "Palm m515", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0020, "Palm i705", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0031, "Palm Tungsten W", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0040, "Palm m125", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0050, "Palm m130", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0060, "Palm Tungsten / Zire", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0061, "Palm Zire 31/72, Tungsten E2/T5/TX", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_PALM, 0x0070, "Palm Zire", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_SONY, 0x0038, "Sony Clie 3.5", UsbInitMode::Visor, Protocol::Slp),
    device(VENDOR_SONY, 0x0066, "Sony Clie 4.0", UsbInitMode::Visor, Protocol::Slp),
    device(VENDOR_SONY, 0x0095, "Sony Clie S360", UsbInitMode::Visor, Protocol::Slp),
    device(VENDOR_SONY, 0x009a, "Sony Clie 4.1", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_SONY, 0x00da, "Sony Clie NX60", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_SONY, 0x00e9, "Sony Clie NZ90V", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_SONY, 0x0144, "Sony Clie UX50", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(VENDOR_SONY, 0x0169, "Sony Clie TJ25", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(0x12ef, 0x0100, "Tapwave Zodiac", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(0x0c88, 0x0021, "Kyocera 7135", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(0x091e, 0x0004, "Garmin iQue 3600", UsbInitMode::PalmOs4, Protocol::NetSync),
    device(0x04e8, 0x8001, "Samsung SPH-i500", UsbInitMode::PalmOs4, Protocol::NetSync),
];

/// Look up a handheld by its USB ids.
pub fn find_usb_device(vendor_id: u16, product_id: u16) -> Option<&'static UsbDeviceInfo> {
    USB_DEVICES
        .iter()
        .find(|info| info.vendor_id == vendor_id && info.product_id == product_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_find_known_device() {
        let visor = find_usb_device(VENDOR_HANDSPRING, 0x0100).unwrap();
        assert_eq!(visor.label, "Handspring Visor");
        assert_eq!(visor.init_mode, UsbInitMode::Visor);
        assert_eq!(visor.protocol, Protocol::Slp);

        let m515 = find_usb_device(VENDOR_PALM, 0x0003).unwrap();
        assert_eq!(m515.protocol, Protocol::NetSync);
    }

    #[test]
    fn test_unknown_device() {
        assert!(find_usb_device(0x1234, 0x5678).is_none());
        assert!(find_usb_device(VENDOR_PALM, 0xffff).is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<_> = USB_DEVICES
            .iter()
            .map(|info| (info.vendor_id, info.product_id))
            .collect();
        assert_eq!(ids.len(), USB_DEVICES.len());
    }
}
