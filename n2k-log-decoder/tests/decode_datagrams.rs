// End-to-end decoding of gateway datagrams through the public API
use chrono::Utc;
use n2k_log_decoder::{Datagram, Decoder, DecoderConfig, DecoderError, Record};
use std::time::{Duration, Instant};

fn datagram_at(bytes: &[u8], instant: Instant) -> Datagram<'_> {
    Datagram {
        bytes,
        received_at: Utc::now(),
        instant,
    }
}

fn decode_all(decoder: &mut Decoder, datagram: Datagram<'_>) -> Vec<Record> {
    decoder
        .decode_datagram(datagram)
        .filter_map(|result| result.ok())
        .map(|message| Record::from(&message))
        .collect()
}

#[test]
fn test_fast_packet_then_single_frame_in_order() {
    let mut decoder = Decoder::new(DecoderConfig::new()).unwrap();
    let start = Instant::now();

    // Distance log from source 7 split over three datagrams, then a heading from source 3
    let first = b"10:00:00.000 R 19F51307 40 0E 01 02 03 04 05 06\r\n";
    let second = b"10:00:00.010 R 19F51307 41 07 08 09 0A 0B 0C 0D\r\n";
    let third = b"10:00:00.020 R 19F51307 42 0E FF FF FF FF FF FF\r\n\
                  10:00:00.021 R 09F11203 FF 7F 00 00 00 00 FD FF\r\n";

    let mut records = Vec::new();
    records.extend(decode_all(&mut decoder, datagram_at(first, start)));
    records.extend(decode_all(
        &mut decoder,
        datagram_at(second, start + Duration::from_millis(10)),
    ));
    assert!(records.is_empty());
    assert_eq!(decoder.pending_sequences(), 1);

    records.extend(decode_all(
        &mut decoder,
        datagram_at(third, start + Duration::from_millis(20)),
    ));

    assert_eq!(records.len(), 2);

    assert_eq!(records[0].pgn, 128275);
    assert_eq!(records[0].source, 7);
    assert_eq!(records[0].priority, 6);
    assert_eq!(records[0].length, 14);
    assert_eq!(records[0].data, "0102030405060708090A0B0C0D0E");
    assert_eq!(records[0].gateway_time, "10:00:00.000");

    assert_eq!(records[1].pgn, 127250);
    assert_eq!(records[1].source, 3);
    assert_eq!(records[1].priority, 2);
    assert_eq!(records[1].destination, 255);
    assert_eq!(records[1].data, "FF7F00000000FDFF");

    let stats = decoder.stats();
    assert_eq!(stats.datagrams, 3);
    assert_eq!(stats.frames, 4);
    assert_eq!(stats.messages, 2);
    assert_eq!(stats.anomalies(), 0);
    assert_eq!(decoder.pending_sequences(), 0);
}

#[test]
fn test_batched_datagram_with_malformed_line() {
    let mut decoder = Decoder::new(DecoderConfig::new()).unwrap();
    let payload = b"17:33:21.107 R 19F51323 01 02\r\n\
                    garbage\r\n\
                    17:33:21.141 R 09F80115 A0 7D E6 18 C0 05 FB D5\r\n";

    let results: Vec<_> = decoder.decode_datagram(Datagram::now(payload)).collect();

    // Orphaned continuation yields nothing, the garbage line yields one error
    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], Err(DecoderError::MalformedFrame(_))));
    let position = results[1].as_ref().unwrap();
    assert_eq!(position.pgn, 129025);
    assert_eq!(position.source, 0x15);

    let stats = decoder.stats();
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.reassembly.orphaned, 1);
}

#[test]
fn test_stale_sequence_evicted_by_housekeeping() {
    let mut decoder = Decoder::new(
        DecoderConfig::new().with_fast_packet_timeout(Duration::from_millis(500)),
    )
    .unwrap();
    let start = Instant::now();

    let first = b"10:00:00.000 R 19F51307 40 0E 01 02 03 04 05 06\r\n";
    assert!(decode_all(&mut decoder, datagram_at(first, start)).is_empty());
    assert_eq!(decoder.pending_sequences(), 1);

    assert_eq!(decoder.evict_stale(start + Duration::from_millis(500)), 0);
    assert_eq!(decoder.evict_stale(start + Duration::from_millis(501)), 1);
    assert_eq!(decoder.pending_sequences(), 0);

    // The rest of the sequence arrives too late and is dropped
    let rest = b"10:00:00.600 R 19F51307 41 07 08 09 0A 0B 0C 0D\r\n\
                 10:00:00.601 R 19F51307 42 0E FF FF FF FF FF FF\r\n";
    assert!(decode_all(&mut decoder, datagram_at(rest, start + Duration::from_millis(600))).is_empty());

    let stats = decoder.stats();
    assert_eq!(stats.reassembly.stale_evicted, 1);
    assert_eq!(stats.reassembly.absorbed, 2);
    assert_eq!(stats.reassembly.orphaned, 0);
    assert_eq!(stats.anomalies(), 1);
    assert_eq!(stats.messages, 0);
}

#[test]
fn test_out_of_sequence_reported_once() {
    let mut decoder = Decoder::new(DecoderConfig::new()).unwrap();
    let payload = b"10:00:00.000 R 19F51307 40 0E 01 02 03 04 05 06\r\n\
                    10:00:00.001 R 19F51307 42 0E FF FF FF FF FF FF\r\n\
                    10:00:00.002 R 19F51307 43 0E FF FF FF FF FF FF\r\n";

    let results: Vec<_> = decoder.decode_datagram(Datagram::now(payload)).collect();

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0],
        Err(DecoderError::OutOfSequence {
            address: 7,
            pgn: 128275,
            expected: 1,
            got: 2,
        })
    );
    assert_eq!(decoder.pending_sequences(), 0);
    assert_eq!(decoder.stats().reassembly.absorbed, 1);
    assert_eq!(decoder.stats().reassembly.orphaned, 0);
    assert_eq!(decoder.stats().anomalies(), 1);
}

#[test]
fn test_lost_middle_frame_is_one_anomaly() {
    let mut decoder = Decoder::new(DecoderConfig::new()).unwrap();
    // 20-byte distance log: frames 0, 2, 3 arrive, frame 1 is lost
    let payload = b"10:00:00.000 R 19F51307 20 14 01 02 03 04 05 06\r\n\
                    10:00:00.002 R 19F51307 22 0E 0F 10 11 12 13 14\r\n\
                    10:00:00.003 R 19F51307 23 FF FF FF FF FF FF FF\r\n";

    let results: Vec<_> = decoder.decode_datagram(Datagram::now(payload)).collect();

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(DecoderError::OutOfSequence { got: 2, .. })));
    assert_eq!(decoder.stats().messages, 0);
    assert_eq!(decoder.stats().anomalies(), 1);
}
