//! Transport channel: the hub's three GATT endpoints over one BLE link.

use std::pin::Pin;
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use bentech_proto::ble::{CONTROL_CHAR_UUID, HUB_NAME, RESPONSE_CHAR_UUID, STREAM_CHAR_UUID};

use crate::HubError;

/// Inbound notification payloads from one characteristic.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// The three logical endpoints of the hub link.
///
/// The engine and session talk to the hub only through this trait;
/// [`BleTransport`] is the radio-backed implementation, tests substitute
/// their own. A subscription must be live before the command that triggers
/// traffic is written, or the first frames are lost.
#[allow(async_fn_in_trait)]
pub trait HubEndpoints {
    /// Acknowledged single-byte write to the control characteristic.
    async fn write_control(&self, byte: u8) -> Result<(), HubError>;

    /// Acknowledged write of one chunk to the stream characteristic.
    async fn write_stream(&self, data: &[u8]) -> Result<(), HubError>;

    /// Begin notification delivery on the stream characteristic.
    async fn subscribe_stream(&self) -> Result<NotificationStream, HubError>;

    /// Detach the stream listener.
    async fn unsubscribe_stream(&self) -> Result<(), HubError>;

    /// Begin notification delivery on the response characteristic.
    async fn subscribe_response(&self) -> Result<NotificationStream, HubError>;

    /// Detach the response listener.
    async fn unsubscribe_response(&self) -> Result<(), HubError>;
}

/// A device seen during a scan. The hub advertises as `BT-hub`.
#[derive(Debug, Clone)]
pub struct HubDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_hub: bool,
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, HubError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(HubError::NoAdapter)
}

/// Scan for BLE devices
///
/// Returns a list of discovered devices. Hub rows have `is_hub = true`.
pub async fn scan(duration_secs: u64) -> Result<Vec<HubDevice>, HubError> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let address = peripheral.address().to_string();
            let rssi = props.rssi;
            let is_hub = name == HUB_NAME;

            devices.push(HubDevice { name, address, rssi, is_hub });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find the hub by name/address pattern, or any device advertising `BT-hub`
pub async fn find_hub(target: Option<&str>) -> Result<Peripheral, HubError> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            let addr = peripheral.address().to_string();

            let matches = match target {
                Some(t) => name.contains(t) || addr.contains(t),
                None => name == HUB_NAME,
            };

            if matches {
                adapter.stop_scan().await?;
                return Ok(peripheral);
            }
        }
    }

    adapter.stop_scan().await?;
    Err(HubError::HubNotFound)
}

/// The radio-backed transport: one peripheral connection plus the three
/// characteristic handles, tied to one physical connection. Reconnecting
/// means discarding this value and resolving all three handles again.
pub struct BleTransport {
    peripheral: Peripheral,
    control: Characteristic,
    response: Characteristic,
    stream: Characteristic,
}

impl BleTransport {
    /// Connect, discover services, and resolve the three endpoint handles.
    pub async fn connect(peripheral: Peripheral) -> Result<Self, HubError> {
        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: Uuid, endpoint: &'static str| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or(HubError::LinkUnavailable(endpoint))
        };

        let control = find(CONTROL_CHAR_UUID, "control")?;
        let response = find(RESPONSE_CHAR_UUID, "response")?;
        let stream = find(STREAM_CHAR_UUID, "stream")?;

        Ok(Self { peripheral, control, response, stream })
    }

    pub async fn disconnect(&self) -> Result<(), HubError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    /// The shared notification pipe, narrowed to one characteristic.
    async fn notifications_for(&self, uuid: Uuid) -> Result<NotificationStream, HubError> {
        let stream = self
            .peripheral
            .notifications()
            .await?
            .filter_map(move |n| async move { (n.uuid == uuid).then_some(n.value) });
        Ok(Box::pin(stream))
    }
}

impl HubEndpoints for BleTransport {
    async fn write_control(&self, byte: u8) -> Result<(), HubError> {
        self.peripheral
            .write(&self.control, &[byte], WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn write_stream(&self, data: &[u8]) -> Result<(), HubError> {
        self.peripheral
            .write(&self.stream, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe_stream(&self) -> Result<NotificationStream, HubError> {
        self.peripheral.subscribe(&self.stream).await?;
        self.notifications_for(STREAM_CHAR_UUID).await
    }

    async fn unsubscribe_stream(&self) -> Result<(), HubError> {
        self.peripheral.unsubscribe(&self.stream).await?;
        Ok(())
    }

    async fn subscribe_response(&self) -> Result<NotificationStream, HubError> {
        self.peripheral.subscribe(&self.response).await?;
        self.notifications_for(RESPONSE_CHAR_UUID).await
    }

    async fn unsubscribe_response(&self) -> Result<(), HubError> {
        self.peripheral.unsubscribe(&self.response).await?;
        Ok(())
    }
}
