//! Main decoder API
//!
//! The [`Decoder`] is the entry point of the library. It turns each received
//! datagram into a lazy iterator of complete messages, keeping fast-packet
//! reassembly state between datagrams.

use crate::config::DecoderConfig;
use crate::fastpacket::{FastPacketAssembler, ProcessResult, ReassemblyStats};
use crate::formats::{DatagramParser, YdRawFrameIterator};
use crate::types::{Datagram, DecoderError, Frame, Message, Result};
use std::time::Instant;

/// Running totals of everything the decoder has processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub datagrams: u64,
    pub frames: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub messages: u64,
    pub reassembly: ReassemblyStats,
}

impl DecoderStats {
    /// Recoverable anomalies seen so far
    pub fn anomalies(&self) -> u64 {
        self.malformed
            + self.reassembly.out_of_sequence
            + self.reassembly.orphaned
            + self.reassembly.stale_evicted
    }
}

/// The main decoder struct - entry point for all decoding operations
pub struct Decoder {
    config: DecoderConfig,
    assembler: FastPacketAssembler,
    stats: DecoderStats,
}

impl Decoder {
    /// Create a decoder, validating its configuration
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            assembler: FastPacketAssembler::new(&config),
            config,
            stats: DecoderStats::default(),
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode one datagram and return an iterator of complete messages
    ///
    /// Recoverable problems (malformed frames, out-of-sequence fast packets)
    /// are yielded as `Err` items; iteration continues after them.
    ///
    /// # Example
    /// ```
    /// use n2k_log_decoder::{Datagram, Decoder, DecoderConfig};
    ///
    /// let mut decoder = Decoder::new(DecoderConfig::new()).unwrap();
    /// let payload = b"17:33:21.141 R 09F80115 A0 7D E6 18 C0 05 FB D5\r\n";
    ///
    /// for message in decoder.decode_datagram(Datagram::now(payload)) {
    ///     let message = message.unwrap();
    ///     assert_eq!(message.pgn, 129025);
    /// }
    /// ```
    pub fn decode_datagram<'a>(
        &'a mut self,
        datagram: Datagram<'a>,
    ) -> DecodingIterator<'a, YdRawFrameIterator<'a>> {
        self.stats.datagrams += 1;
        DecodingIterator::new(YdRawFrameIterator::parse(datagram), self, datagram.instant)
    }

    /// Housekeeping pass: drop fast-packet sequences older than the timeout
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let evicted = self.assembler.evict_stale(now);
        if evicted > 0 {
            log::debug!("Evicted {} stale fast-packet sequence(s)", evicted);
        }
        evicted
    }

    /// Number of fast-packet sequences currently in flight
    pub fn pending_sequences(&self) -> usize {
        self.assembler.pending()
    }

    /// Get statistics about what has been decoded so far
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            reassembly: self.assembler.stats(),
            ..self.stats
        }
    }

    fn process_frame(&mut self, frame: Frame, now: Instant) -> Result<Option<Message>> {
        self.stats.frames += 1;

        if !self.config.should_process_pgn(frame.pgn) {
            log::trace!("Filtered PGN {} from {}", frame.pgn, frame.source);
            self.stats.filtered += 1;
            return Ok(None);
        }

        match self.assembler.process_frame(frame, now)? {
            ProcessResult::MessageComplete(message) => {
                self.stats.messages += 1;
                Ok(Some(message))
            }
            ProcessResult::FragmentConsumed
            | ProcessResult::Orphaned
            | ProcessResult::Absorbed
            | ProcessResult::StaleDiscarded => Ok(None),
        }
    }
}

/// Iterator that turns the frames of one datagram into messages
///
/// Frames that only feed reassembly state produce no item.
pub struct DecodingIterator<'a, I>
where
    I: Iterator<Item = Result<Frame>>,
{
    frame_iter: I,
    decoder: &'a mut Decoder,
    now: Instant,
}

impl<'a, I> DecodingIterator<'a, I>
where
    I: Iterator<Item = Result<Frame>>,
{
    fn new(frame_iter: I, decoder: &'a mut Decoder, now: Instant) -> Self {
        Self {
            frame_iter,
            decoder,
            now,
        }
    }
}

impl<'a, I> Iterator for DecodingIterator<'a, I>
where
    I: Iterator<Item = Result<Frame>>,
{
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let result = match self.frame_iter.next()? {
                Ok(frame) => self.decoder.process_frame(frame, self.now),
                Err(e) => Err(e),
            };

            match result {
                Ok(Some(message)) => return Some(Ok(message)),
                Ok(None) => continue,
                Err(e) => {
                    if matches!(e, DecoderError::MalformedFrame(_)) {
                        self.decoder.stats.malformed += 1;
                    }
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_creation() {
        let decoder = Decoder::new(DecoderConfig::new()).unwrap();
        assert_eq!(decoder.stats(), DecoderStats::default());
        assert_eq!(decoder.pending_sequences(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DecoderConfig::new().with_pgn_filter(Vec::new());
        assert!(Decoder::new(config).is_err());
    }

    #[test]
    fn test_filtered_pgn_is_counted_not_emitted() {
        let mut decoder = Decoder::new(DecoderConfig::new().with_pgn_filter(vec![127250])).unwrap();
        let payload = b"17:33:21.141 R 09F80115 A0 7D E6 18 C0 05 FB D5\r\n\
                        17:33:21.142 R 09F11203 FF 7F 00 00 00 00 FD FF\r\n";

        let messages: Vec<_> = decoder.decode_datagram(Datagram::now(payload)).collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_ref().unwrap().pgn, 127250);

        let stats = decoder.stats();
        assert_eq!(stats.datagrams, 1);
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.filtered, 1);
        assert_eq!(stats.messages, 1);
    }

    #[test]
    fn test_malformed_frames_are_counted() {
        let mut decoder = Decoder::new(DecoderConfig::new()).unwrap();
        let payload = b"not a frame\n17:33:21.141 R 09F80115 01 02 03 04 05 06 07 08 09\n";

        let results: Vec<_> = decoder.decode_datagram(Datagram::now(payload)).collect();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_err()));
        assert_eq!(decoder.stats().malformed, 2);
        assert_eq!(decoder.stats().anomalies(), 2);
    }
}
