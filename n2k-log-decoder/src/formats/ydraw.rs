//! Yacht Devices RAW datagram parser
//!
//! The gateway relays every CAN frame as one text line:
//!
//! ```text
//! hh:mm:ss.ddd D msgid b0 b1 b2 b3 b4 b5 b6 b7<CR><LF>
//! ```
//!
//! - `hh:mm:ss.ddd` - time of reception or transmission, `ddd` are milliseconds
//! - `D` - direction (`R` from the bus to the application, `T` the other way)
//! - `msgid` - 29-bit CAN identifier in hexadecimal
//! - `b0..b7` - 1 to 8 data bytes in hexadecimal
//!
//! A datagram may batch several lines. Each line is decoded independently so a
//! malformed line never invalidates its neighbours.

use super::DatagramParser;
use crate::can_id::CanId;
use crate::types::{
    Datagram, DecoderError, Direction, Frame, Result, Timestamp, MAX_FRAME_DATA,
};
use chrono::NaiveTime;

/// Timestamp, direction and identifier precede the data bytes
const HEADER_TOKENS: usize = 3;

fn is_line_break(b: &u8) -> bool {
    *b == b'\n'
}

/// Iterator over the frames carried by one YD RAW datagram
pub struct YdRawFrameIterator<'a> {
    lines: std::slice::Split<'a, u8, fn(&u8) -> bool>,
    received_at: Timestamp,
}

impl<'a> DatagramParser<'a> for YdRawFrameIterator<'a> {
    fn parse(datagram: Datagram<'a>) -> Self {
        Self {
            lines: datagram.bytes.split(is_line_break as fn(&u8) -> bool),
            received_at: datagram.received_at,
        }
    }
}

impl<'a> Iterator for YdRawFrameIterator<'a> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            let line = match std::str::from_utf8(line) {
                Ok(text) => text.trim(),
                Err(_) => {
                    return Some(Err(DecoderError::malformed("line is not valid UTF-8")));
                }
            };

            // Blank lines and trailing separators carry nothing
            if line.is_empty() {
                continue;
            }

            return Some(parse_line(line, self.received_at));
        }
    }
}

/// Decode a single YD RAW line into a frame
pub fn parse_line(line: &str, received_at: Timestamp) -> Result<Frame> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() <= HEADER_TOKENS {
        return Err(DecoderError::malformed(format!(
            "expected at least {} fields, got {}: '{}'",
            HEADER_TOKENS + 1,
            parts.len(),
            line
        )));
    }

    let gateway_time = NaiveTime::parse_from_str(parts[0], "%H:%M:%S%.f").map_err(|e| {
        DecoderError::malformed(format!("invalid timestamp '{}': {}", parts[0], e))
    })?;

    let direction = match parts[1] {
        "R" => Direction::Received,
        "T" => Direction::Transmitted,
        other => {
            return Err(DecoderError::malformed(format!(
                "invalid direction '{}'",
                other
            )))
        }
    };

    let raw_id = u32::from_str_radix(parts[2], 16).map_err(|e| {
        DecoderError::malformed(format!("invalid identifier '{}': {}", parts[2], e))
    })?;
    let can_id = CanId::new(raw_id)?;

    let data_tokens = &parts[HEADER_TOKENS..];
    if data_tokens.len() > MAX_FRAME_DATA {
        return Err(DecoderError::malformed(format!(
            "{} data bytes exceed the {} byte frame capacity",
            data_tokens.len(),
            MAX_FRAME_DATA
        )));
    }

    let mut data = Vec::with_capacity(data_tokens.len());
    for token in data_tokens {
        if token.len() > 2 {
            return Err(DecoderError::malformed(format!(
                "invalid data byte '{}'",
                token
            )));
        }
        let byte = u8::from_str_radix(token, 16).map_err(|e| {
            DecoderError::malformed(format!("invalid data byte '{}': {}", token, e))
        })?;
        data.push(byte);
    }

    Ok(Frame {
        timestamp: received_at,
        gateway_time,
        direction,
        can_id: can_id.raw(),
        priority: can_id.priority(),
        pgn: can_id.pgn(),
        source: can_id.source_address(),
        destination: can_id.destination(),
        data,
    })
}
