//! 帧编解码
//!
//! 线上格式为无长度前缀的 JSON 文本：
//! `{"iec":"<address>","value":"<lowercased-value>","timestamp":"<epoch-seconds>"}`
//!
//! 帧边界由花括号推断：从最左侧的 `{` 到其后最近的 `}`（非贪婪、不支持嵌套）。
//! 因此记录值中不得包含花括号，`Record::new` 会拒绝此类值。

use bytes::Bytes;
use contracts::Record;
use serde::{Deserialize, Serialize};

/// Opening frame delimiter
pub const FRAME_OPEN: u8 = b'{';

/// Closing frame delimiter
pub const FRAME_CLOSE: u8 = b'}';

/// Wire shape of one record; every field travels as a string
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    iec: String,
    value: String,
    timestamp: String,
}

/// A bracketed fragment that failed structural validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedFrame {
    /// Byte offset of the fragment within the decoded buffer
    pub offset: usize,
    /// Fragment text (lossy UTF-8)
    pub fragment: String,
    /// Why the fragment was rejected
    pub reason: String,
}

/// Result of one decode pass
#[derive(Debug, Default)]
pub struct Decoded {
    /// Valid records, in stream order
    pub records: Vec<Record>,
    /// Rejected fragments (already consumed)
    pub malformed: Vec<MalformedFrame>,
    /// Bytes consumed from the front of the buffer; the rest is remainder
    pub consumed: usize,
    /// Bytes consumed without belonging to any frame
    pub discarded: usize,
    /// An unclosed frame exceeded the length limit and was dropped
    pub overflowed: bool,
}

impl Decoded {
    /// The unconsumed tail of `buffer`
    pub fn remainder<'a>(&self, buffer: &'a [u8]) -> &'a [u8] {
        &buffer[self.consumed..]
    }
}

/// Brace-delimited record codec
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl FrameCodec {
    /// Create a codec that gives up on unclosed frames longer than `max_frame_len`
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Encode one record as a self-delimited frame
    pub fn encode(record: &Record) -> Bytes {
        let wire = WireRecord {
            iec: record.address().to_string(),
            value: record.value().to_string(),
            timestamp: record.timestamp().to_string(),
        };
        // A struct of three strings always serializes.
        Bytes::from(serde_json::to_vec(&wire).unwrap_or_default())
    }

    /// Decode every complete frame in `buffer`
    ///
    /// Bytes before the first unmatched `{` can never become part of a frame
    /// and are consumed; the unmatched frame itself is left as remainder.
    pub fn decode(&self, buffer: &[u8]) -> Decoded {
        let mut decoded = Decoded::default();
        let mut pos = 0;

        loop {
            let Some(open) = find(&buffer[pos..], FRAME_OPEN).map(|i| pos + i) else {
                decoded.discarded += buffer.len() - pos;
                decoded.consumed = buffer.len();
                break;
            };
            decoded.discarded += open - pos;

            let Some(close) = find(&buffer[open + 1..], FRAME_CLOSE).map(|i| open + 1 + i) else {
                if buffer.len() - open > self.max_frame_len {
                    decoded.overflowed = true;
                    decoded.discarded += buffer.len() - open;
                    decoded.consumed = buffer.len();
                } else {
                    decoded.consumed = open;
                }
                break;
            };

            let end = close + 1;
            match parse_frame(&buffer[open..end]) {
                Ok(record) => decoded.records.push(record),
                Err(reason) => decoded.malformed.push(MalformedFrame {
                    offset: open,
                    fragment: String::from_utf8_lossy(&buffer[open..end]).into_owned(),
                    reason,
                }),
            }
            pos = end;
        }

        decoded
    }
}

fn find(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

fn parse_frame(frame: &[u8]) -> Result<Record, String> {
    let wire: WireRecord =
        serde_json::from_slice(frame).map_err(|e| format!("json error: {e}"))?;

    let address = wire
        .iec
        .parse()
        .map_err(|e| format!("invalid iec '{}': {e}", wire.iec))?;
    let timestamp = wire
        .timestamp
        .parse()
        .map_err(|e| format!("invalid timestamp '{}': {e}", wire.timestamp))?;

    Record::new(address, &wire.value, timestamp).map_err(|e| e.to_string())
}
