//! BLE GATT protocol constants for the BenTech hub
//!
//! Service and characteristic UUIDs plus the command byte contract shared
//! with the hub firmware. The numeric command values are fixed by the
//! firmware revision and are not renegotiable at runtime.

use uuid::Uuid;

/// Hub GATT service UUID
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xe295c051_7ac4_4d72_b7ea_3e71e47e15a9);

/// Control characteristic: single-byte acknowledged command writes
pub const CONTROL_CHAR_UUID: Uuid = Uuid::from_u128(0x4576af67_ecc6_434e_8ce7_52c6ab1d5f04);

/// Response characteristic: single-value outcome notifications
pub const RESPONSE_CHAR_UUID: Uuid = Uuid::from_u128(0xd95426b1_2cb4_4115_bd4b_32ff24232864);

/// Stream characteristic: chunked payload bodies, both directions
pub const STREAM_CHAR_UUID: Uuid = Uuid::from_u128(0xfeb2f5aa_ec75_46ef_8da6_2da832175d8e);

/// Advertised device name of the hub
pub const HUB_NAME: &str = "BT-hub";

/// Maximum bytes per stream write; a link-layer limit agreed with the
/// firmware. Changing it requires a firmware change on the hub.
pub const CHUNK_SIZE: usize = 20;

/// Response-characteristic value notified when the hub accepted WiFi
/// credentials. Anything else is a rejection.
pub const WIFI_ACK_OK: i32 = 1;

/// Hub operations, written as single bytes to the control characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Hub receives WiFi credentials over the stream characteristic
    SendWifiCredentials = 1,
    /// Hub streams back its info snapshot
    RequestInfo = 2,
    /// Hub drops its WiFi connection
    DisconnectWifi = 3,
    /// Hub receives a push subscription over the stream characteristic
    SendSubscription = 4,
    /// Hub re-scans its accessory devices and streams back the tag list
    RescanDevices = 5,
}

impl Command {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown command byte: {0}")]
pub struct UnknownCommand(pub u8);

impl TryFrom<u8> for Command {
    type Error = UnknownCommand;

    fn try_from(byte: u8) -> Result<Self, UnknownCommand> {
        match byte {
            1 => Ok(Command::SendWifiCredentials),
            2 => Ok(Command::RequestInfo),
            3 => Ok(Command::DisconnectWifi),
            4 => Ok(Command::SendSubscription),
            5 => Ok(Command::RescanDevices),
            other => Err(UnknownCommand(other)),
        }
    }
}
