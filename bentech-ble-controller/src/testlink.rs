//! In-memory endpoints for exercising the engine and session without a
//! radio. Writes are recorded, notifications are served from queues.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedReceiver;

use bentech_proto::{chunk_count, chunk_spans, encode_fixed_width_int};

use crate::HubError;
use crate::transport::{HubEndpoints, NotificationStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Control(u8),
    Stream(Vec<u8>),
    SubscribeStream,
    UnsubscribeStream,
    SubscribeResponse,
    UnsubscribeResponse,
}

#[derive(Default)]
pub struct MockLink {
    events: Mutex<Vec<LinkEvent>>,
    stream_frames: Mutex<VecDeque<Vec<u8>>>,
    response_frames: Mutex<VecDeque<Vec<u8>>>,
    blocked_stream: Mutex<Option<UnboundedReceiver<Vec<u8>>>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_stream_frames(&self, frames: impl IntoIterator<Item = Vec<u8>>) {
        self.stream_frames.lock().unwrap().extend(frames);
    }

    pub fn queue_response_frames(&self, frames: impl IntoIterator<Item = Vec<u8>>) {
        self.response_frames.lock().unwrap().extend(frames);
    }

    /// Make the next stream subscription wait on a channel instead of the
    /// pre-queued frames, so a transfer can be held open mid-flight.
    pub fn block_stream_on(&self, rx: UnboundedReceiver<Vec<u8>>) {
        *self.blocked_stream.lock().unwrap() = Some(rx);
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: LinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn channel_stream(rx: UnboundedReceiver<Vec<u8>>) -> NotificationStream {
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    }))
}

impl HubEndpoints for MockLink {
    async fn write_control(&self, byte: u8) -> Result<(), HubError> {
        self.record(LinkEvent::Control(byte));
        Ok(())
    }

    async fn write_stream(&self, data: &[u8]) -> Result<(), HubError> {
        self.record(LinkEvent::Stream(data.to_vec()));
        Ok(())
    }

    async fn subscribe_stream(&self) -> Result<NotificationStream, HubError> {
        self.record(LinkEvent::SubscribeStream);
        if let Some(rx) = self.blocked_stream.lock().unwrap().take() {
            return Ok(channel_stream(rx));
        }
        let frames: Vec<Vec<u8>> = self.stream_frames.lock().unwrap().drain(..).collect();
        Ok(Box::pin(futures::stream::iter(frames)))
    }

    async fn unsubscribe_stream(&self) -> Result<(), HubError> {
        self.record(LinkEvent::UnsubscribeStream);
        Ok(())
    }

    async fn subscribe_response(&self) -> Result<NotificationStream, HubError> {
        self.record(LinkEvent::SubscribeResponse);
        let frames: Vec<Vec<u8>> = self.response_frames.lock().unwrap().drain(..).collect();
        Ok(Box::pin(futures::stream::iter(frames)))
    }

    async fn unsubscribe_response(&self) -> Result<(), HubError> {
        self.record(LinkEvent::UnsubscribeResponse);
        Ok(())
    }
}

/// Frames exactly as the hub notifies them: the 4-byte big-endian chunk
/// count, then the chunks.
pub fn stream_frames_for(text: &str) -> Vec<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut frames = vec![encode_fixed_width_int(chunk_count(bytes.len()) as u32, 4)];
    frames.extend(
        chunk_spans(bytes.len())
            .into_iter()
            .map(|(start, end)| bytes[start..end].to_vec()),
    );
    frames
}

/// Settings store kept in memory.
#[derive(Default)]
pub struct MemSettings(std::collections::BTreeMap<String, String>);

impl crate::settings::SettingsStore for MemSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        self.0.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
