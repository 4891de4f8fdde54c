//! Gateway wire format parsers
//!
//! Each parser turns one received datagram into an iterator over CAN frames.

use crate::types::{Datagram, Frame, Result};

pub mod ydraw;

// Re-export parser types
pub use ydraw::YdRawFrameIterator;

/// Common trait for gateway datagram parsers
///
/// The iterator borrows the datagram and must not block.
pub trait DatagramParser<'a>: Iterator<Item = Result<Frame>> + Sized {
    /// Start decoding a datagram
    fn parse(datagram: Datagram<'a>) -> Self;
}
