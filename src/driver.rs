//! Sequential request driver: one `GET` per transport variant, reported as
//! it completes.
//!
//! ```rust,ignore
//! let driver = RequestDriver::new(DriverConfig::default())?;
//! let summary = driver.run(&mut TextReporter::new(std::io::stdout())).await?;
//! std::process::exit(summary.exit_code());
//! ```

use crate::base::deadline::Deadline;
use crate::base::endpoint::TargetEndpoint;
use crate::base::neterror::NetError;
use crate::client::{ClientConfig, HttpClient};
use crate::http::{AltService, Protocol, RequestResult};
use crate::observer::{ChannelObserver, ConnectionEvent, EventKind, TracingObserver};
use crate::socket::transport::{Transport, TransportOptions, TransportVariant};
use serde::Serialize;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_URL: &str = "https://cloudflare-quic.com/";

/// Everything a run needs.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub url: String,
    /// Tried in order.
    pub variants: Vec<TransportVariant>,
    /// Per-variant request timeout.
    pub timeout: Duration,
    pub transport: TransportOptions,
    pub client: ClientConfig,
    /// Server name to send instead of the URL host.
    pub sni: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            variants: TransportVariant::ALL.to_vec(),
            timeout: Duration::from_secs(10),
            transport: TransportOptions::default(),
            client: ClientConfig::default(),
            sni: None,
        }
    }
}

impl DriverConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_variants(mut self, variants: Vec<TransportVariant>) -> Self {
        self.variants = variants;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sni(mut self, sni: impl Into<String>) -> Self {
        self.sni = Some(sni.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportError {
    pub kind: &'static str,
    pub code: i32,
    pub message: String,
}

impl From<&NetError> for ReportError {
    fn from(e: &NetError) -> Self {
        Self { kind: e.kind().as_str(), code: e.as_i32(), message: e.to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportTiming {
    pub resolved_ms: Option<f64>,
    pub connected_ms: Option<f64>,
    pub handshake_ms: Option<f64>,
    pub headers_ms: Option<f64>,
    pub total_ms: f64,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// What one variant did.
#[derive(Debug, Clone, Serialize)]
pub struct VariantReport {
    pub variant: TransportVariant,
    pub url: String,
    /// Peer address from the `Connected` event, if one fired.
    pub connected_to: Option<SocketAddr>,
    pub events: Vec<&'static str>,
    pub status: Option<u16>,
    pub protocol: Option<Protocol>,
    pub remote_addr: Option<SocketAddr>,
    pub reused: bool,
    pub body_len: usize,
    pub alt_svc: Vec<AltService>,
    pub timing: ReportTiming,
    pub error: Option<ReportError>,
    #[serde(skip)]
    status_text: Option<String>,
}

impl VariantReport {
    pub fn new(
        variant: TransportVariant,
        url: &str,
        result: &RequestResult,
        events: &[ConnectionEvent],
    ) -> Self {
        let connected_to = events
            .iter()
            .find(|e| e.kind == EventKind::Connected)
            .and_then(|e| e.remote_addr);
        let connect = result.timing.connect;
        Self {
            variant,
            url: url.to_string(),
            connected_to,
            events: events.iter().map(|e| e.kind.as_str()).collect(),
            status: result.status.map(|s| s.as_u16()),
            protocol: result.protocol,
            remote_addr: result.remote_addr,
            reused: result.reused,
            body_len: result.body_len,
            alt_svc: result.alt_svc.clone(),
            timing: ReportTiming {
                resolved_ms: connect.map(|c| millis(c.resolved)),
                connected_ms: connect.map(|c| millis(c.connected)),
                handshake_ms: connect.and_then(|c| c.handshake_done).map(millis),
                headers_ms: result.timing.headers_received.map(millis),
                total_ms: millis(result.timing.total),
            },
            error: result.error.as_ref().map(ReportError::from),
            status_text: result.status_text(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some()
    }
}

/// Receives progress from [`RequestDriver::run`].
pub trait Reporter {
    /// A variant is about to dial.
    fn start(&mut self, _variant: TransportVariant, _url: &str) -> io::Result<()> {
        Ok(())
    }

    fn finish(&mut self, report: &VariantReport) -> io::Result<()>;

    /// The variant's shared UDP socket was closed at the end of the run.
    fn socket_closed(&mut self, _variant: TransportVariant) -> io::Result<()> {
        Ok(())
    }
}

/// Human-readable lines, one block per variant.
pub struct TextReporter<W> {
    out: W,
}

impl<W: Write> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn start(&mut self, variant: TransportVariant, url: &str) -> io::Result<()> {
        writeln!(self.out, "{variant}")?;
        writeln!(self.out, "  dialing {url}")
    }

    fn finish(&mut self, report: &VariantReport) -> io::Result<()> {
        if let Some(addr) = report.connected_to {
            writeln!(self.out, "  connected to {addr}")?;
        }
        if let Some(status) = &report.status_text {
            writeln!(self.out, "  got status: {status}")?;
        }
        if let Some(protocol) = report.protocol {
            writeln!(self.out, "  proto: {protocol}")?;
        }
        for alt in report.alt_svc.iter().filter(|a| a.is_h3()) {
            let host = alt.host.as_deref().unwrap_or("");
            writeln!(self.out, "  alt-svc: {}={}:{}", alt.protocol, host, alt.port)?;
        }
        if let Some(err) = &report.error {
            writeln!(self.out, "  error: {} ({}): {}", err.kind, err.code, err.message)?;
        }
        self.out.flush()
    }

    fn socket_closed(&mut self, _variant: TransportVariant) -> io::Result<()> {
        writeln!(self.out, "closing local udp conn")?;
        self.out.flush()
    }
}

/// One JSON object per line.
pub struct JsonReporter<W> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn finish(&mut self, report: &VariantReport) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, report)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<VariantReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    /// 0 when every variant succeeded, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 {
            0
        } else {
            1
        }
    }
}

pub struct RequestDriver {
    config: DriverConfig,
    endpoint: TargetEndpoint,
    client: HttpClient,
}

impl RequestDriver {
    /// Fails with `InvalidUrl` / `UnsupportedScheme` before anything is dialed.
    pub fn new(config: DriverConfig) -> Result<Self, NetError> {
        let mut endpoint = TargetEndpoint::parse(&config.url)?;
        if let Some(sni) = &config.sni {
            endpoint = endpoint.with_sni(sni.clone());
        }
        let client = HttpClient::with_config(config.client.clone());
        Ok(Self { config, endpoint, client })
    }

    pub fn endpoint(&self) -> &TargetEndpoint {
        &self.endpoint
    }

    pub async fn run(&self, reporter: &mut dyn Reporter) -> io::Result<RunSummary> {
        let transports: Vec<Transport> = self
            .config
            .variants
            .iter()
            .map(|v| Transport::new(*v, &self.config.transport))
            .collect();
        self.run_with(&transports, reporter).await
    }

    /// Run over caller-built transports. Every transport is closed before
    /// this returns, also when reporting fails.
    pub async fn run_with(
        &self,
        transports: &[Transport],
        reporter: &mut dyn Reporter,
    ) -> io::Result<RunSummary> {
        let outcome = self.run_variants(transports, reporter).await;
        let closed = self.close_transports(transports, reporter);
        let summary = outcome?;
        closed?;
        info!(succeeded = summary.succeeded(), failed = summary.failed(), "run finished");
        Ok(summary)
    }

    async fn run_variants(
        &self,
        transports: &[Transport],
        reporter: &mut dyn Reporter,
    ) -> io::Result<RunSummary> {
        let mut summary = RunSummary::default();
        for transport in transports {
            reporter.start(transport.variant(), &self.config.url)?;
            let report = self.run_variant(transport).await;
            reporter.finish(&report)?;
            summary.reports.push(report);
        }
        Ok(summary)
    }

    async fn run_variant(&self, transport: &Transport) -> VariantReport {
        let (channel, mut rx) = ChannelObserver::new();
        let observer = TracingObserver::new(channel);
        let deadline = Deadline::after(self.config.timeout);

        debug!(variant = %transport.variant(), endpoint = %self.endpoint, "sending request");
        let result = self.client.send(transport, &self.endpoint, &observer, &deadline).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        VariantReport::new(transport.variant(), &self.config.url, &result, &events)
    }

    fn close_transports(&self, transports: &[Transport], reporter: &mut dyn Reporter) -> io::Result<()> {
        self.client.close_idle();
        let mut first_err = None;
        for transport in transports {
            if transport.close() {
                debug!(variant = %transport.variant(), "closed shared socket");
                if let Err(e) = reporter.socket_closed(transport.variant()) {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::LoadTiming;
    use http::StatusCode;

    fn ok_result() -> RequestResult {
        RequestResult {
            status: Some(StatusCode::OK),
            protocol: Some(Protocol::Http3),
            timing: LoadTiming { total: Duration::from_millis(12), ..LoadTiming::default() },
            ..RequestResult::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(
            config.variants,
            vec![
                TransportVariant::QuicDefault,
                TransportVariant::TcpTls,
                TransportVariant::QuicSharedSocket
            ]
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = RequestDriver::new(DriverConfig::default().with_url("not a url")).err();
        assert!(matches!(err, Some(NetError::InvalidUrl)));
    }

    #[test]
    fn test_sni_override_applied() {
        let driver = RequestDriver::new(
            DriverConfig::default().with_url("https://192.0.2.1/").with_sni("front.example"),
        )
        .unwrap();
        assert_eq!(driver.endpoint().sni(), "front.example");
    }

    #[test]
    fn test_text_report_success() {
        let remote: SocketAddr = "192.0.2.7:443".parse().unwrap();
        let events = vec![ConnectionEvent::dial_started(remote), ConnectionEvent::connected(None, remote)];
        let report = VariantReport::new(TransportVariant::QuicDefault, DEFAULT_URL, &ok_result(), &events);

        let mut reporter = TextReporter::new(Vec::new());
        reporter.start(TransportVariant::QuicDefault, DEFAULT_URL).unwrap();
        reporter.finish(&report).unwrap();
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            out,
            "quic\n  dialing https://cloudflare-quic.com/\n  connected to 192.0.2.7:443\n  got status: 200 OK\n  proto: h3\n"
        );
    }

    #[test]
    fn test_text_report_skips_connected_without_event() {
        let result = RequestResult::failed(NetError::TimedOut);
        let report = VariantReport::new(TransportVariant::TcpTls, DEFAULT_URL, &result, &[]);
        let mut reporter = TextReporter::new(Vec::new());
        reporter.finish(&report).unwrap();
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(!out.contains("connected to"));
        assert!(out.starts_with("  error: cancelled"));
    }

    #[test]
    fn test_json_report_line() {
        let report = VariantReport::new(TransportVariant::QuicSharedSocket, DEFAULT_URL, &ok_result(), &[]);
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.finish(&report).unwrap();
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["variant"], "quic-shared-socket");
        assert_eq!(value["status"], 200);
        assert_eq!(value["protocol"], "h3");
        assert!(value["error"].is_null());
    }

    #[test]
    fn test_exit_code() {
        let ok = VariantReport::new(TransportVariant::TcpTls, DEFAULT_URL, &ok_result(), &[]);
        let failed = VariantReport::new(
            TransportVariant::QuicDefault,
            DEFAULT_URL,
            &RequestResult::failed(NetError::ConnectionRefused),
            &[],
        );
        assert_eq!(RunSummary { reports: vec![ok.clone()] }.exit_code(), 0);
        assert_eq!(RunSummary { reports: vec![ok, failed] }.exit_code(), 1);
        assert_eq!(RunSummary::default().exit_code(), 0);
    }
}
