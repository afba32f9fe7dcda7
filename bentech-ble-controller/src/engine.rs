//! Chunked transfer engine
//!
//! Turns the MTU-limited stream characteristic into a reliable
//! request/response channel: outbound payloads are split into 20-byte
//! chunks behind a one-byte count, inbound streams announce a 4-byte
//! big-endian chunk count and are reassembled in arrival order.

use futures::StreamExt;

use bentech_proto::ble::Command;
use bentech_proto::{
    CodecError, chunk_count, chunk_spans, concat, decode_int32_be, decode_utf8,
    encode_fixed_width_int,
};

use crate::HubError;
use crate::transport::{HubEndpoints, NotificationStream};

/// Send `payload` to the hub under `command`.
///
/// Writes the command byte to the control endpoint, then the chunk count,
/// then each chunk to the stream endpoint, every write acknowledged before
/// the next begins. Any rejected write aborts the whole send; there is no
/// partial-send recovery.
pub async fn send_text<E: HubEndpoints>(
    link: &E,
    command: Command,
    payload: &str,
) -> Result<(), HubError> {
    let bytes = payload.as_bytes();
    let count = chunk_count(bytes.len());
    if count > u8::MAX as usize {
        return Err(HubError::PayloadTooLarge(count));
    }

    link.write_control(command.as_byte()).await?;
    link.write_stream(&encode_fixed_width_int(count as u32, 1)).await?;

    for (start, end) in chunk_spans(bytes.len()) {
        link.write_stream(&bytes[start..end]).await?;
    }
    Ok(())
}

/// Trigger `command` and reassemble the hub's chunked JSON response.
///
/// The stream subscription goes live before the command byte is written;
/// the hub may notify the first frame the moment it sees the command. The
/// listener is detached once the transfer completes or fails, so nothing
/// leaks into the next transfer.
pub async fn receive_json<E: HubEndpoints>(
    link: &E,
    command: Command,
) -> Result<serde_json::Value, HubError> {
    let mut notifications = link.subscribe_stream().await?;
    link.write_control(command.as_byte()).await?;

    let body = collect(&mut notifications).await;
    link.unsubscribe_stream().await?;
    let body = body?;

    let text = decode_utf8(&body);
    Ok(serde_json::from_str(&text)?)
}

async fn collect(notifications: &mut NotificationStream) -> Result<Vec<u8>, HubError> {
    let mut transfer = Reassembly::new();
    loop {
        match notifications.next().await {
            Some(frame) => {
                if let Some(body) = transfer.push(&frame)? {
                    return Ok(body);
                }
            }
            None => return Err(HubError::StreamClosed),
        }
    }
}

/// Per-transfer reassembly state: the announced chunk count, the number of
/// chunks received so far, and the accumulating body.
///
/// The first frame pushed is the 4-byte big-endian chunk count and is never
/// part of the body; every later frame appends verbatim. Chunks carry no
/// index; arrival order is the protocol's only ordering.
#[derive(Debug, Default)]
pub struct Reassembly {
    announced: Option<usize>,
    received: usize,
    body: Vec<u8>,
}

impl Reassembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one notification frame. Returns the reassembled body once the
    /// announced count has arrived; an announcement of zero chunks completes
    /// immediately with an empty body.
    pub fn push(&mut self, frame: &[u8]) -> Result<Option<Vec<u8>>, CodecError> {
        let announced = match self.announced {
            None => {
                // The announcement is signed on the wire; non-positive means
                // no chunks follow.
                let count = decode_int32_be(frame)?.max(0) as usize;
                self.announced = Some(count);
                count
            }
            Some(count) => {
                self.body = concat(&self.body, frame);
                self.received += 1;
                count
            }
        };

        if self.received >= announced {
            Ok(Some(std::mem::take(&mut self.body)))
        } else {
            Ok(None)
        }
    }
}
