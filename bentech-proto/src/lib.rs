//! BenTech hub wire protocol - frame codec, chunk arithmetic and data model

pub mod ble;

pub use ble::CHUNK_SIZE;

/// Frame codec errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("buffer too short: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
}

/// Write the low `width` bytes of `n` into a big-endian buffer.
///
/// The same function serves both the single-byte command/count writes
/// (`width = 1`) and the 4-byte length prefix (`width = 4`). Widths beyond 4
/// are zero-padded on the left.
pub fn encode_fixed_width_int(n: u32, width: usize) -> Vec<u8> {
    let mut buf = vec![0u8; width];
    let be = n.to_be_bytes();
    let take = width.min(4);
    buf[width - take..].copy_from_slice(&be[4 - take..]);
    buf
}

/// Read a signed 32-bit big-endian integer from the first 4 bytes.
pub fn decode_int32_be(data: &[u8]) -> Result<i32, CodecError> {
    if data.len() < 4 {
        return Err(CodecError::Truncated {
            needed: 4,
            got: data.len(),
        });
    }
    Ok(i32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

/// Decode a buffer as UTF-8 text, with replacement characters on malformed
/// input. Never fails.
pub fn decode_utf8(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Return a new buffer containing `a`'s bytes followed by `b`'s. Neither
/// input is modified.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(a.len() + b.len());
    buf.extend_from_slice(a);
    buf.extend_from_slice(b);
    buf
}

/// Number of stream writes needed for a payload of `len` bytes.
///
/// The hub firmware counts on `len / 20 + 1` writes, which yields one
/// trailing empty write when `len` is an exact multiple of 20. That extra
/// write is part of the wire contract and must not be optimized away.
pub fn chunk_count(len: usize) -> usize {
    len / CHUNK_SIZE + 1
}

/// Byte ranges of each stream write for a payload of `len` bytes.
///
/// Chunk `i` covers `[i*20, (i+1)*20)`; the final chunk runs to the end of
/// the payload.
pub fn chunk_spans(len: usize) -> Vec<(usize, usize)> {
    let count = chunk_count(len);
    (0..count)
        .map(|i| {
            let start = i * CHUNK_SIZE;
            let end = if i == count - 1 { len } else { start + CHUNK_SIZE };
            (start, end)
        })
        .collect()
}

/// Info dump streamed back by the hub on [`ble::Command::RequestInfo`].
///
/// The hub owns this document; the client only deserializes it. The
/// subscription descriptor is opaque and forwarded verbatim.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InfoSnapshot {
    pub wifi_connected: bool,
    #[serde(default)]
    pub subscription: Option<serde_json::Value>,
    #[serde(default)]
    pub devices: Vec<DeviceKind>,
}

/// Accessory module tags reported by the hub. Display-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    LidController,
    PaperObserver,
    AutoFlusher,
    Deodorant,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceKind::LidController => "lid controller",
            DeviceKind::PaperObserver => "paper observer",
            DeviceKind::AutoFlusher => "auto flusher",
            DeviceKind::Deodorant => "deodorant",
        };
        write!(f, "{label}")
    }
}

/// Body of a push-relay request: a message plus the stored subscription.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PushRequest {
    pub message: String,
    pub subscription: serde_json::Value,
}

/// Relay answer: `{"success": true}` on delivery, `{"error": "..."}` with a
/// non-2xx status otherwise.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PushAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
