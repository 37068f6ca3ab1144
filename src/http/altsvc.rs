//! `Alt-Svc` response header parsing (RFC 7838).
//!
//! The facade only reports what the origin advertises; it never switches
//! transports on its own.

use serde::Serialize;

const DEFAULT_MAX_AGE: u64 = 86_400;

/// One advertised alternative service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AltService {
    /// ALPN token, e.g. `h3` or `h3-29`.
    pub protocol: String,
    /// Alternative host; `None` means the same host as the origin.
    pub host: Option<String>,
    pub port: u16,
    /// Freshness lifetime in seconds (`ma`), 24h when absent.
    pub max_age: u64,
}

impl AltService {
    pub fn is_h3(&self) -> bool {
        self.protocol == "h3" || self.protocol.starts_with("h3-")
    }
}

/// Parse an `Alt-Svc` header value. `clear` and malformed entries yield
/// nothing.
pub fn parse_alt_svc(header: &str) -> Vec<AltService> {
    let header = header.trim();
    if header.eq_ignore_ascii_case("clear") {
        return Vec::new();
    }

    let mut services = Vec::new();
    for alternative in header.split(',') {
        let mut params = alternative.split(';');
        let Some(main) = params.next().map(str::trim) else {
            continue;
        };
        let Some((protocol, value)) = main.split_once('=') else {
            continue;
        };
        let protocol = protocol.trim();
        if protocol.is_empty() {
            continue;
        }
        let Some((host, port)) = parse_authority(value) else {
            continue;
        };

        let mut max_age = DEFAULT_MAX_AGE;
        for param in params {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim() == "ma" {
                    if let Ok(age) = value.trim().trim_matches('"').parse() {
                        max_age = age;
                    }
                }
            }
        }

        services.push(AltService {
            protocol: protocol.to_string(),
            host,
            port,
            max_age,
        });
    }
    services
}

/// `":443"` → (None, 443); `"alt.example.com:8443"` → (Some(host), 8443).
fn parse_authority(value: &str) -> Option<(Option<String>, u16)> {
    let unquoted = value.trim().trim_matches('"').trim();
    let (host, port) = unquoted.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        Some((None, port))
    } else {
        Some((Some(host.to_string()), port))
    }
}
