//! Record builder
//!
//! Maps a complete [`Message`] onto the flat row written to the session log.
//! The mapping is total and lossless: the payload is stored as upper-case hex
//! and decodes back to the exact bytes received.

use crate::types::Message;
use serde::{Deserialize, Serialize};

/// Column names of the session log, in file order
pub const HEADER: [&str; 9] = [
    "timestamp",
    "gateway_time",
    "direction",
    "priority",
    "pgn",
    "source",
    "destination",
    "length",
    "data",
];

/// One row of the session log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Arrival time, UTC, millisecond resolution
    pub timestamp: String,
    /// Gateway time of day, millisecond resolution
    pub gateway_time: String,
    /// `R` or `T`
    pub direction: String,
    pub priority: u8,
    pub pgn: u32,
    pub source: u8,
    pub destination: u8,
    /// Payload length in bytes
    pub length: usize,
    /// Payload as upper-case hex
    pub data: String,
}

impl Record {
    /// Decode the hex payload back into bytes
    pub fn payload(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.data)
    }
}

impl From<&Message> for Record {
    fn from(message: &Message) -> Self {
        Self {
            timestamp: message
                .timestamp
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
            gateway_time: message.gateway_time.format("%H:%M:%S%.3f").to_string(),
            direction: message.direction.as_str().to_string(),
            priority: message.priority,
            pgn: message.pgn,
            source: message.source,
            destination: message.destination,
            length: message.payload.len(),
            data: hex::encode_upper(&message.payload),
        }
    }
}
