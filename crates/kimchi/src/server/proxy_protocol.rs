//! PROXY protocol v1/v2 decoding.
//!
//! Detection peeks at the first bytes of the connection without consuming
//! them. Only once a signature actually matches does this module read (and
//! thus permanently consume) header bytes from the stream; a connection
//! with no PROXY header is left completely untouched, so the caller can go
//! straight on to tagging and serving it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::error::ConnectionError;
use crate::server::conn::TlsState;

const V1_SIGNATURE: &[u8] = b"PROXY ";
const V2_SIGNATURE: &[u8] = b"\r\n\r\n\x00\r\nQUIT\n";
const V1_MAX_LEN: usize = 107;

const PP2_TYPE_ALPN: u8 = 0x01;
const PP2_TYPE_SSL: u8 = 0x20;
const PP2_CLIENT_SSL: u8 = 0x01;

/// What the decoder found, if anything. `None` means no PROXY header was
/// present and the connection was left untouched.
#[derive(Debug, Default)]
pub struct Decoded {
    pub source_addr: Option<SocketAddr>,
    pub alpn: Option<String>,
    pub tls_state: Option<TlsState>,
}

/// Peeks the connection's leading bytes and, if a PROXY header is present,
/// consumes and parses it. Returns `Ok(Decoded::default())` (all fields
/// `None`) when no header is present, which is not an error.
pub async fn decode(stream: &mut TcpStream) -> Result<Decoded, ConnectionError> {
    let mut peek_buf = [0u8; 16];
    let n = peek_some(stream, &mut peek_buf).await?;
    let peeked = &peek_buf[..n];

    if peeked.len() >= V2_SIGNATURE.len() && &peeked[..V2_SIGNATURE.len()] == V2_SIGNATURE {
        return decode_v2(stream).await;
    }
    if peeked.len() >= V1_SIGNATURE.len() && &peeked[..V1_SIGNATURE.len()] == V1_SIGNATURE {
        return decode_v1(stream).await;
    }
    Ok(Decoded::default())
}

/// `TcpStream::peek` can return fewer bytes than the buffer on a short read
/// even though more bytes are coming; loop (bounded) until we have either
/// filled the buffer or the peek stops making progress, which happens once
/// the peer has sent everything it's going to send for now.
async fn peek_some(stream: &TcpStream, buf: &mut [u8]) -> Result<usize, ConnectionError> {
    let mut last = 0;
    loop {
        let n = stream.peek(buf).await?;
        if n == buf.len() || n == last {
            return Ok(n);
        }
        last = n;
    }
}

async fn read_exact_vec(stream: &mut TcpStream, len: usize) -> Result<Vec<u8>, ConnectionError> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn decode_v1(stream: &mut TcpStream) -> Result<Decoded, ConnectionError> {
    let mut line = Vec::with_capacity(64);
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await?;
        line.push(byte[0]);
        if line.ends_with(b"\r\n") {
            break;
        }
        if line.len() > V1_MAX_LEN {
            return Err(ConnectionError::ProxyHeader(
                "v1 header exceeds maximum length".into(),
            ));
        }
    }
    let text = std::str::from_utf8(&line[..line.len() - 2])
        .map_err(|_| ConnectionError::ProxyHeader("v1 header is not valid UTF-8".into()))?;
    let mut fields = text.split(' ');
    let proxy_kw = fields.next().unwrap_or_default();
    if proxy_kw != "PROXY" {
        return Err(ConnectionError::ProxyHeader("missing PROXY keyword".into()));
    }
    let protocol = fields
        .next()
        .ok_or_else(|| ConnectionError::ProxyHeader("v1 header missing protocol field".into()))?;

    let source_addr = match protocol {
        "UNKNOWN" => None,
        "TCP4" | "TCP6" => {
            let src_ip: IpAddr = fields
                .next()
                .ok_or_else(|| ConnectionError::ProxyHeader("v1 header missing source address".into()))?
                .parse()
                .map_err(|_| ConnectionError::ProxyHeader("v1 header has invalid source address".into()))?;
            let _dst_ip = fields.next();
            let src_port: u16 = fields
                .next()
                .ok_or_else(|| ConnectionError::ProxyHeader("v1 header missing source port".into()))?
                .parse()
                .map_err(|_| ConnectionError::ProxyHeader("v1 header has invalid source port".into()))?;
            Some(SocketAddr::new(src_ip, src_port))
        }
        other => {
            return Err(ConnectionError::ProxyHeader(format!(
                "v1 header has unsupported protocol field {other:?}"
            )));
        }
    };

    Ok(Decoded {
        source_addr,
        alpn: None,
        tls_state: None,
    })
}

async fn decode_v2(stream: &mut TcpStream) -> Result<Decoded, ConnectionError> {
    let prefix = read_exact_vec(stream, 16).await?;
    if &prefix[..12] != V2_SIGNATURE {
        return Err(ConnectionError::ProxyHeader("v2 signature mismatch".into()));
    }
    let version = prefix[12] >> 4;
    if version != 2 {
        return Err(ConnectionError::ProxyHeader(format!(
            "unsupported PROXY v2 version {version}"
        )));
    }
    let command = prefix[12] & 0x0f;
    let family = prefix[13] >> 4;
    let remaining_len = u16::from_be_bytes([prefix[14], prefix[15]]) as usize;
    let body = read_exact_vec(stream, remaining_len).await?;

    // LOCAL connections (health checks, etc.) carry no meaningful address.
    if command == 0 {
        return Ok(Decoded::default());
    }

    let (addr_len, source_addr) = match family {
        0x1 => {
            // AF_INET: 4+4+2+2
            if body.len() < 12 {
                return Err(ConnectionError::ProxyHeader("v2 AF_INET body truncated".into()));
            }
            let ip = Ipv4Addr::new(body[0], body[1], body[2], body[3]);
            let port = u16::from_be_bytes([body[8], body[9]]);
            (12, Some(SocketAddr::new(IpAddr::V4(ip), port)))
        }
        0x2 => {
            // AF_INET6: 16+16+2+2
            if body.len() < 36 {
                return Err(ConnectionError::ProxyHeader("v2 AF_INET6 body truncated".into()));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&body[0..16]);
            let ip = Ipv6Addr::from(octets);
            let port = u16::from_be_bytes([body[32], body[33]]);
            (36, Some(SocketAddr::new(IpAddr::V6(ip), port)))
        }
        0x3 => {
            // AF_UNIX: 108+108, no usable socket address.
            if body.len() < 216 {
                return Err(ConnectionError::ProxyHeader("v2 AF_UNIX body truncated".into()));
            }
            (216, None)
        }
        0x0 => (0, None),
        other => {
            return Err(ConnectionError::ProxyHeader(format!(
                "v2 header has unsupported address family {other:#x}"
            )));
        }
    };

    let (alpn, tls_state) = parse_tlvs(&body[addr_len.min(body.len())..])?;

    Ok(Decoded {
        source_addr,
        alpn,
        tls_state,
    })
}

fn parse_tlvs(mut buf: &[u8]) -> Result<(Option<String>, Option<TlsState>), ConnectionError> {
    let mut alpn = None;
    let mut tls_state = None;

    while !buf.is_empty() {
        if buf.len() < 3 {
            return Err(ConnectionError::ProxyHeader(
                "v2 TLV framing truncated".into(),
            ));
        }
        let kind = buf[0];
        let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        buf = &buf[3..];
        if buf.len() < len {
            return Err(ConnectionError::ProxyHeader("v2 TLV value truncated".into()));
        }
        let value = &buf[..len];
        buf = &buf[len..];

        match kind {
            PP2_TYPE_ALPN => {
                alpn = std::str::from_utf8(value).ok().map(|s| s.to_string());
            }
            PP2_TYPE_SSL => match parse_ssl_tlv(value) {
                Ok(state) => tls_state = state,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed PROXY SSL TLV, proceeding without a TLS state");
                    tls_state = None;
                }
            },
            _ => {
                // Unrecognized TLV types are ignored by design.
            }
        }
    }

    Ok((alpn, tls_state))
}

fn parse_ssl_tlv(value: &[u8]) -> Result<Option<TlsState>, ConnectionError> {
    if value.is_empty() {
        return Err(ConnectionError::ProxyHeader(
            "v2 SSL TLV missing client field".into(),
        ));
    }
    let client = value[0];
    if client & PP2_CLIENT_SSL != 0 {
        Ok(Some(TlsState::synthesized()))
    } else {
        Ok(None)
    }
}
