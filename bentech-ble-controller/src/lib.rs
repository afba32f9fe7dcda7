//! BLE client for the BenTech hub
//!
//! Connects to the hub's GATT service and exchanges JSON payloads over the
//! chunked stream protocol: a control characteristic for single-byte
//! commands, a stream characteristic carrying 20-byte chunk bodies in both
//! directions, and a response characteristic for single-value outcome
//! notifications.

pub mod engine;
pub mod session;
pub mod settings;
pub mod transport;

#[cfg(test)]
pub(crate) mod testlink;

pub use engine::Reassembly;
pub use session::HubSession;
pub use settings::{JsonSettings, SettingsStore};
pub use transport::{BleTransport, HubDevice, HubEndpoints, NotificationStream};

/// Errors surfaced by the hub link and the chunked transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A required endpoint handle was missing when an operation needed it;
    /// the operation never started.
    #[error("hub link unavailable: {0} characteristic not found")]
    LinkUnavailable(&'static str),

    #[error("no Bluetooth adapter found")]
    NoAdapter,

    #[error("no BenTech hub found")]
    HubNotFound,

    /// A write or subscription was rejected by the link; the in-flight
    /// transfer aborts and the cause propagates unmodified.
    #[error("transfer failed: {0}")]
    Transfer(#[from] btleplug::Error),

    /// Outbound chunk counts are announced in a single byte.
    #[error("payload spans {0} chunks, more than a one-byte count can announce")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Codec(#[from] bentech_proto::CodecError),

    /// The reassembled receive buffer was not valid JSON.
    #[error("malformed hub payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The notification stream ended before the announced chunk count arrived.
    #[error("hub link closed mid-transfer")]
    StreamClosed,

    #[error("failed to persist settings: {0}")]
    Settings(#[from] std::io::Error),
}
