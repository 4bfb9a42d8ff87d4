//! PROXY protocol headers (v1 text, v2 binary) written ahead of the TLS handshake

use std::net::SocketAddr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::ProxyVersion;

const V2_SIGNATURE: [u8; 12] =
    [0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A];
/// Version 2, PROXY command
const V2_VERSION_COMMAND: u8 = 0x21;
const V2_TCP4: u8 = 0x11;
const V2_TCP6: u8 = 0x21;
const V2_UNSPEC: u8 = 0x00;

/// Builds the header announcing `source` → `destination`, or `None` when
/// no header is configured.
pub fn encode_header(
    version: ProxyVersion,
    source: SocketAddr,
    destination: SocketAddr,
) -> Option<Bytes> {
    match version {
        ProxyVersion::None => None,
        ProxyVersion::V1 => Some(encode_v1(source, destination)),
        ProxyVersion::V2 => Some(encode_v2(source, destination)),
    }
}

fn encode_v1(source: SocketAddr, destination: SocketAddr) -> Bytes {
    let line = match (source, destination) {
        (SocketAddr::V4(src), SocketAddr::V4(dst)) => format!(
            "PROXY TCP4 {} {} {} {}\r\n",
            src.ip(),
            dst.ip(),
            src.port(),
            dst.port()
        ),
        (SocketAddr::V6(src), SocketAddr::V6(dst)) => format!(
            "PROXY TCP6 {} {} {} {}\r\n",
            src.ip(),
            dst.ip(),
            src.port(),
            dst.port()
        ),
        _ => "PROXY UNKNOWN\r\n".to_string(),
    };
    Bytes::from(line)
}

fn encode_v2(source: SocketAddr, destination: SocketAddr) -> Bytes {
    let mut buf = BytesMut::with_capacity(V2_SIGNATURE.len() + 4 + 36);
    buf.put_slice(&V2_SIGNATURE);
    buf.put_u8(V2_VERSION_COMMAND);
    match (source, destination) {
        (SocketAddr::V4(src), SocketAddr::V4(dst)) => {
            buf.put_u8(V2_TCP4);
            buf.put_u16(12);
            buf.put_slice(&src.ip().octets());
            buf.put_slice(&dst.ip().octets());
            buf.put_u16(src.port());
            buf.put_u16(dst.port());
        }
        (SocketAddr::V6(src), SocketAddr::V6(dst)) => {
            buf.put_u8(V2_TCP6);
            buf.put_u16(36);
            buf.put_slice(&src.ip().octets());
            buf.put_slice(&dst.ip().octets());
            buf.put_u16(src.port());
            buf.put_u16(dst.port());
        }
        _ => {
            buf.put_u8(V2_UNSPEC);
            buf.put_u16(0);
        }
    }
    buf.freeze()
}
