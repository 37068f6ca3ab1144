use crate::base::neterror::{ErrorKind, NetError};
use std::io;

#[test]
fn test_net_error_roundtrip() {
    let original = NetError::ConnectionRefused;
    let code = original.as_i32();
    assert_eq!(code, -102);
    let converted = NetError::from(code);
    assert!(matches!(converted, NetError::ConnectionRefused));

    let quic = NetError::QuicHandshakeFailed;
    assert_eq!(quic.as_i32(), -358);
    assert!(matches!(NetError::from(-358), NetError::QuicHandshakeFailed));
}

#[test]
fn test_unknown_error() {
    let err = NetError::from(-9999);
    assert!(matches!(err, NetError::Unknown(-9999)));
    assert_eq!(err.kind(), ErrorKind::ProtocolError);
}

#[test]
fn test_context_variants_share_codes() {
    let err = NetError::dns_failed("nowhere.invalid", io::Error::other("nxdomain"));
    assert_eq!(err.as_i32(), NetError::NameNotResolved.as_i32());

    let err = NetError::SslHandshakeFailedFor {
        host: "example.com".into(),
        reason: "bad cert".into(),
    };
    assert_eq!(err.as_i32(), NetError::SslProtocolError.as_i32());
}

#[test]
fn test_kind_mapping() {
    assert_eq!(NetError::InvalidUrl.kind(), ErrorKind::InvalidUrl);
    assert_eq!(NetError::UnknownUrlScheme.kind(), ErrorKind::UnsupportedScheme);
    assert_eq!(NetError::Aborted.kind(), ErrorKind::Cancelled);
    assert_eq!(NetError::TimedOut.kind(), ErrorKind::Cancelled);
    assert_eq!(NetError::ConnectionRefused.kind(), ErrorKind::DialFailed);
    assert_eq!(NetError::NameNotResolved.kind(), ErrorKind::DialFailed);
    assert_eq!(NetError::QuicHandshakeFailed.kind(), ErrorKind::HandshakeFailed);
    assert_eq!(NetError::AlpnNegotiationFailed.kind(), ErrorKind::HandshakeFailed);
    assert_eq!(NetError::ContentLengthMismatch.kind(), ErrorKind::IncompleteResponse);
    assert_eq!(NetError::EmptyResponse.kind(), ErrorKind::NilResponse);
}

#[test]
fn test_connection_failed_to_classifies_refused() {
    let err = NetError::connection_failed_to(
        "127.0.0.1",
        9,
        io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
    );
    assert!(matches!(err, NetError::ConnectionRefused));

    let err = NetError::connection_failed_to(
        "example.com",
        443,
        io::Error::new(io::ErrorKind::Other, "boom"),
    );
    match err {
        NetError::ConnectionFailedTo { host, port, .. } => {
            assert_eq!(host, "example.com");
            assert_eq!(port, 443);
        }
        other => panic!("Expected ConnectionFailedTo, got {other:?}"),
    }
}
