//! Hub session: high-level operations over one transport channel.
//!
//! Each operation is one control command plus one engine call. At most one
//! transfer is in flight per channel; overlapping calls queue on the
//! transfer guard instead of cross-talking on the shared notification
//! stream.

use futures::StreamExt;
use tokio::sync::Mutex;

use bentech_proto::ble::{Command, WIFI_ACK_OK};
use bentech_proto::{DeviceKind, InfoSnapshot, decode_int32_be};

use crate::HubError;
use crate::engine;
use crate::settings::{SettingsStore, WIFI_PASSWORD_KEY, WIFI_SSID_KEY};
use crate::transport::{HubEndpoints, NotificationStream};

/// Progress of the `send_wifi_data` handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WifiHandshake {
    Idle,
    AwaitingAck,
    Success,
    Failure,
}

impl WifiHandshake {
    /// The chunked send finished; the hub now owes one response notification.
    fn send_complete(self) -> Self {
        WifiHandshake::AwaitingAck
    }

    fn ack(self, verdict: i32) -> Self {
        if verdict == WIFI_ACK_OK {
            WifiHandshake::Success
        } else {
            WifiHandshake::Failure
        }
    }
}

/// Composition root: owns the transport channel and the settings store,
/// exposes one method per hub operation.
pub struct HubSession<E: HubEndpoints, S: SettingsStore> {
    link: E,
    settings: Mutex<S>,
    // one in-flight transfer per channel
    transfer_guard: Mutex<()>,
}

impl<E: HubEndpoints, S: SettingsStore> HubSession<E, S> {
    pub fn new(link: E, settings: S) -> Self {
        Self {
            link,
            settings: Mutex::new(settings),
            transfer_guard: Mutex::new(()),
        }
    }

    pub fn link(&self) -> &E {
        &self.link
    }

    pub fn settings(&self) -> &Mutex<S> {
        &self.settings
    }

    /// Fetch the hub's info snapshot (command 2).
    pub async fn fetch_info(&self) -> Result<InfoSnapshot, HubError> {
        let _transfer = self.transfer_guard.lock().await;
        let value = engine::receive_json(&self.link, Command::RequestInfo).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send WiFi credentials (command 1) and wait for the hub's verdict.
    ///
    /// A rejection is a normal `false`, not an error; credentials are
    /// persisted to the settings store only on acceptance.
    pub async fn send_wifi_data(&self, ssid: &str, password: &str) -> Result<bool, HubError> {
        let _transfer = self.transfer_guard.lock().await;

        // Single-shot subscription: live before the hub can answer, detached
        // again on both verdicts and on the error path.
        let mut responses = self.link.subscribe_response().await?;
        let outcome = self.wifi_handshake(&mut responses, ssid, password).await;
        self.link.unsubscribe_response().await?;

        match outcome? {
            WifiHandshake::Success => {
                let mut settings = self.settings.lock().await;
                settings.set(WIFI_SSID_KEY, ssid)?;
                settings.set(WIFI_PASSWORD_KEY, password)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn wifi_handshake(
        &self,
        responses: &mut NotificationStream,
        ssid: &str,
        password: &str,
    ) -> Result<WifiHandshake, HubError> {
        let payload = serde_json::json!({ "ssid": ssid, "password": password }).to_string();

        let mut state = WifiHandshake::Idle;
        engine::send_text(&self.link, Command::SendWifiCredentials, &payload).await?;
        state = state.send_complete();

        let frame = responses.next().await.ok_or(HubError::StreamClosed)?;
        state = state.ack(decode_int32_be(&frame)?);
        Ok(state)
    }

    /// Tell the hub to drop its WiFi connection (command 3, empty payload).
    pub async fn disconnect_wifi(&self) -> Result<(), HubError> {
        let _transfer = self.transfer_guard.lock().await;
        engine::send_text(&self.link, Command::DisconnectWifi, "").await
    }

    /// Upload the browser push subscription (command 4). The descriptor is
    /// opaque; the hub stores it and hands it back in the info snapshot.
    pub async fn send_subscription(
        &self,
        subscription: &serde_json::Value,
    ) -> Result<(), HubError> {
        let _transfer = self.transfer_guard.lock().await;
        engine::send_text(&self.link, Command::SendSubscription, &subscription.to_string()).await
    }

    /// Ask the hub to re-scan its accessories (command 5) and return the
    /// reported tags.
    pub async fn rescan_devices(&self) -> Result<Vec<DeviceKind>, HubError> {
        let _transfer = self.transfer_guard.lock().await;
        let value = engine::receive_json(&self.link, Command::RescanDevices).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testlink::{LinkEvent, MemSettings, MockLink, stream_frames_for};
    use bentech_proto::encode_fixed_width_int;

    fn session() -> HubSession<MockLink, MemSettings> {
        HubSession::new(MockLink::new(), MemSettings::default())
    }

    #[test]
    fn wifi_handshake_transitions() {
        let state = WifiHandshake::Idle.send_complete();
        assert_eq!(state, WifiHandshake::AwaitingAck);
        assert_eq!(state.ack(WIFI_ACK_OK), WifiHandshake::Success);
        assert_eq!(state.ack(0), WifiHandshake::Failure);
        assert_eq!(state.ack(2), WifiHandshake::Failure);
    }

    #[tokio::test]
    async fn wifi_ack_persists_credentials() {
        let session = session();
        session
            .link()
            .queue_response_frames(vec![encode_fixed_width_int(1, 4)]);

        let accepted = session.send_wifi_data("home", "secret").await.unwrap();
        assert!(accepted);

        let settings = session.settings().lock().await;
        assert_eq!(settings.get(WIFI_SSID_KEY).as_deref(), Some("home"));
        assert_eq!(settings.get(WIFI_PASSWORD_KEY).as_deref(), Some("secret"));

        // control byte 1, stream count byte 2, two chunk writes, listener
        // attached first and detached last
        let payload =
            serde_json::json!({ "ssid": "home", "password": "secret" }).to_string();
        let bytes = payload.as_bytes();
        assert_eq!(
            session.link().events(),
            vec![
                LinkEvent::SubscribeResponse,
                LinkEvent::Control(1),
                LinkEvent::Stream(vec![2]),
                LinkEvent::Stream(bytes[..20].to_vec()),
                LinkEvent::Stream(bytes[20..].to_vec()),
                LinkEvent::UnsubscribeResponse,
            ]
        );
    }

    #[tokio::test]
    async fn wifi_nack_returns_false_without_persisting() {
        let session = session();
        session
            .link()
            .queue_response_frames(vec![encode_fixed_width_int(0, 4)]);

        let accepted = session.send_wifi_data("home", "secret").await.unwrap();
        assert!(!accepted);

        let settings = session.settings().lock().await;
        assert_eq!(settings.get(WIFI_SSID_KEY), None);
        assert_eq!(settings.get(WIFI_PASSWORD_KEY), None);

        // the single-shot listener is detached on the failure branch too
        assert_eq!(
            *session.link().events().last().unwrap(),
            LinkEvent::UnsubscribeResponse
        );
    }

    #[tokio::test]
    async fn wifi_without_response_is_stream_closed() {
        let session = session();

        let err = session.send_wifi_data("home", "secret").await.unwrap_err();
        assert!(matches!(err, HubError::StreamClosed));
        assert_eq!(
            *session.link().events().last().unwrap(),
            LinkEvent::UnsubscribeResponse
        );
    }

    #[tokio::test]
    async fn fetch_info_parses_snapshot() {
        let session = session();
        session.link().queue_stream_frames(stream_frames_for(
            r#"{"wifi_connected": true, "subscription": null, "devices": ["deodorant"]}"#,
        ));

        let info = session.fetch_info().await.unwrap();
        assert!(info.wifi_connected);
        assert!(info.subscription.is_none());
        assert_eq!(info.devices, vec![DeviceKind::Deodorant]);

        let events = session.link().events();
        assert_eq!(events[0], LinkEvent::SubscribeStream);
        assert_eq!(events[1], LinkEvent::Control(2));
    }

    #[tokio::test]
    async fn rescan_parses_device_tags() {
        let session = session();
        session
            .link()
            .queue_stream_frames(stream_frames_for(r#"["lid-controller", "auto-flusher"]"#));

        let devices = session.rescan_devices().await.unwrap();
        assert_eq!(devices, vec![DeviceKind::LidController, DeviceKind::AutoFlusher]);
        assert_eq!(session.link().events()[1], LinkEvent::Control(5));
    }

    #[tokio::test]
    async fn disconnect_wifi_sends_empty_payload() {
        let session = session();

        session.disconnect_wifi().await.unwrap();

        assert_eq!(
            session.link().events(),
            vec![
                LinkEvent::Control(3),
                LinkEvent::Stream(vec![1]),
                LinkEvent::Stream(Vec::new()),
            ]
        );
    }

    #[tokio::test]
    async fn send_subscription_streams_the_descriptor() {
        let session = session();
        let subscription = serde_json::json!({ "endpoint": "https://push.example/abc" });

        session.send_subscription(&subscription).await.unwrap();

        let events = session.link().events();
        assert_eq!(events[0], LinkEvent::Control(4));
        assert_eq!(events[1], LinkEvent::Stream(vec![2]));

        let streamed: Vec<u8> = events[2..]
            .iter()
            .flat_map(|e| match e {
                LinkEvent::Stream(data) => data.clone(),
                _ => Vec::new(),
            })
            .collect();
        assert_eq!(streamed, subscription.to_string().into_bytes());
    }

    #[tokio::test]
    async fn overlapping_operations_queue_on_the_transfer_guard() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let link = MockLink::new();
        link.block_stream_on(rx);
        let session = Arc::new(HubSession::new(link, MemSettings::default()));

        let info = {
            let session = session.clone();
            tokio::spawn(async move { session.fetch_info().await })
        };
        tokio::task::yield_now().await;

        let disconnect = {
            let session = session.clone();
            tokio::spawn(async move { session.disconnect_wifi().await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // the receive holds the guard while awaiting the hub; the second
        // operation must not have touched the link yet
        let events = session.link().events();
        assert!(events.contains(&LinkEvent::Control(2)));
        assert!(!events.contains(&LinkEvent::Control(3)));

        for frame in stream_frames_for(r#"{"wifi_connected": false}"#) {
            tx.send(frame).unwrap();
        }
        drop(tx);

        assert!(!info.await.unwrap().unwrap().wifi_connected);
        disconnect.await.unwrap().unwrap();

        let events = session.link().events();
        let detach = events
            .iter()
            .position(|e| *e == LinkEvent::UnsubscribeStream)
            .unwrap();
        let second = events
            .iter()
            .position(|e| *e == LinkEvent::Control(3))
            .unwrap();
        assert!(detach < second);
    }
}
