//! TLS record header recognition

/// Record header length: type, version (2), length (2)
pub const RECORD_HEADER_LEN: usize = 5;

/// Header prefix of a TLS 1.2-versioned change cipher spec record
pub const CCS_HEADER: [u8; 3] = [20, 3, 3];

/// Header prefix of a TLS 1.2-versioned application data record
pub const APPLICATION_DATA_HEADER: [u8; 3] = [23, 3, 3];

/// Complete change cipher spec record: header, length 1, payload 1
pub const CCS_RECORD: [u8; 6] = [0x14, 0x03, 0x03, 0x00, 0x01, 0x01];

pub fn starts_with_ccs(buf: &[u8]) -> bool {
    buf.starts_with(&CCS_HEADER)
}

/// Splits a captured byte stream into application data record lengths.
///
/// Each length includes the 5-byte header. Scanning stops at the first
/// position that does not hold an application data header; whatever follows
/// is ignored. A record whose declared length runs past the end of `data`
/// is still reported and ends the scan.
pub fn record_lengths(data: &[u8]) -> Vec<usize> {
    let mut lens = Vec::new();
    let mut rest = data;
    while rest.len() >= RECORD_HEADER_LEN && rest.starts_with(&APPLICATION_DATA_HEADER) {
        let len = usize::from(u16::from_be_bytes([rest[3], rest[4]])) + RECORD_HEADER_LEN;
        lens.push(len);
        rest = rest.get(len..).unwrap_or_default();
    }
    lens
}
