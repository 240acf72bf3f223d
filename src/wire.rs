//! Wire codec (spec §4.1): pack/unpack segment and ACK headers.
//!
//! Data datagram: 4-byte big-endian offset, 16 reserved zero bytes, payload.
//! ACK datagram: 4-byte big-endian cumulative offset, up to two (start, end)
//! SACK pairs (4 bytes each), zero-padded to 16 bytes.

use crate::config::HEADER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SackBlock {
    pub start: u32,
    pub end: u32,
}

/// Encode a data segment: offset header followed by `payload`.
pub fn encode_data(offset: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&offset.to_be_bytes());
    buf.extend_from_slice(&[0u8; 16]);
    buf.extend_from_slice(payload);
    buf
}

/// Encode an ACK: cumulative offset followed by up to two SACK ranges.
pub fn encode_ack(cumulative: u32, sacks: &[SackBlock]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE);
    buf.extend_from_slice(&cumulative.to_be_bytes());

    let mut sack_area = [0u8; 16];
    for (i, sack) in sacks.iter().take(2).enumerate() {
        let base = i * 8;
        sack_area[base..base + 4].copy_from_slice(&sack.start.to_be_bytes());
        sack_area[base + 4..base + 8].copy_from_slice(&sack.end.to_be_bytes());
    }
    buf.extend_from_slice(&sack_area);
    buf
}

/// Decode a data datagram. Datagrams shorter than the header are discarded.
pub fn decode_data(datagram: &[u8]) -> Option<(u32, &[u8])> {
    if datagram.len() < HEADER_SIZE {
        return None;
    }
    let offset = u32::from_be_bytes(datagram[0..4].try_into().unwrap());
    Some((offset, &datagram[HEADER_SIZE..]))
}

/// Decode an ACK datagram. SACK pairs failing `0 < start < end && start >=
/// cum` are silently dropped (stale or zero-padded slots).
pub fn decode_ack(datagram: &[u8]) -> Option<(u32, Vec<SackBlock>)> {
    if datagram.len() < 4 {
        return None;
    }
    let cumulative = u32::from_be_bytes(datagram[0..4].try_into().unwrap());

    let mut sacks = Vec::with_capacity(2);
    if datagram.len() >= HEADER_SIZE {
        let sack_area = &datagram[4..HEADER_SIZE];
        for chunk in sack_area.chunks_exact(8) {
            let start = u32::from_be_bytes(chunk[0..4].try_into().unwrap());
            let end = u32::from_be_bytes(chunk[4..8].try_into().unwrap());
            if 0 < start && start < end && start >= cumulative {
                sacks.push(SackBlock { start, end });
            }
        }
    }

    Some((cumulative, sacks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_data_segment() {
        let packet = encode_data(42, b"hello");
        let (offset, payload) = decode_data(&packet).unwrap();
        assert_eq!(offset, 42);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn decode_data_discards_short_datagrams() {
        assert!(decode_data(&[0u8; 19]).is_none());
    }

    #[test]
    fn round_trips_ack_with_two_sacks() {
        let sacks = [
            SackBlock { start: 10, end: 20 },
            SackBlock { start: 30, end: 40 },
        ];
        let packet = encode_ack(5, &sacks);
        let (cum, decoded) = decode_ack(&packet).unwrap();
        assert_eq!(cum, 5);
        assert_eq!(decoded, sacks);
    }

    #[test]
    fn decode_ack_drops_invalid_sack_slots() {
        // start == 0 denotes an unused slot; start < cum is stale.
        let mut packet = encode_ack(100, &[SackBlock { start: 50, end: 60 }]);
        packet[8..16].copy_from_slice(&[0u8; 8]); // zero the unused slot explicitly
        let (cum, decoded) = decode_ack(&packet).unwrap();
        assert_eq!(cum, 100);
        assert!(decoded.is_empty());
    }

    #[test]
    fn decode_ack_accepts_ack_only_datagram() {
        let (cum, sacks) = decode_ack(&5u32.to_be_bytes()).unwrap();
        assert_eq!(cum, 5);
        assert!(sacks.is_empty());
    }
}
