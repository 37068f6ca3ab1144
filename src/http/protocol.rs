use serde::Serialize;
use std::fmt;

/// Application protocol actually negotiated on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    #[serde(rename = "h1")]
    Http1,
    #[serde(rename = "h2")]
    Http2,
    #[serde(rename = "h3")]
    Http3,
}

impl Protocol {
    /// Map an ALPN identifier to a protocol. Draft HTTP/3 tokens such as
    /// `h3-29` count as HTTP/3.
    pub fn from_alpn(alpn: &[u8]) -> Option<Self> {
        match alpn {
            b"http/1.1" | b"http/1.0" => Some(Protocol::Http1),
            b"h2" => Some(Protocol::Http2),
            b"h3" => Some(Protocol::Http3),
            other if other.starts_with(b"h3-") => Some(Protocol::Http3),
            _ => None,
        }
    }

    pub fn alpn_id(&self) -> &'static str {
        match self {
            Protocol::Http1 => "http/1.1",
            Protocol::Http2 => "h2",
            Protocol::Http3 => "h3",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http1 => "h1",
            Protocol::Http2 => "h2",
            Protocol::Http3 => "h3",
        }
    }

    pub fn version(&self) -> http::Version {
        match self {
            Protocol::Http1 => http::Version::HTTP_11,
            Protocol::Http2 => http::Version::HTTP_2,
            Protocol::Http3 => http::Version::HTTP_3,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode protocols in ALPN wire format (length-prefixed identifiers).
pub fn alpn_wire(protocols: &[Protocol]) -> Vec<u8> {
    let mut wire = Vec::new();
    for proto in protocols {
        let id = proto.alpn_id().as_bytes();
        wire.push(id.len() as u8);
        wire.extend_from_slice(id);
    }
    wire
}
