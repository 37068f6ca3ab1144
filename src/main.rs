use clap::{ArgAction, Parser};
use dialscope::base::neterror::ErrorKind;
use dialscope::dns::HickoryResolver;
use dialscope::driver::{DriverConfig, JsonReporter, Reporter, RequestDriver, TextReporter, DEFAULT_URL};
use dialscope::socket::transport::TransportVariant;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Fetch one URL over TCP+TLS and QUIC and show how each connection came up.
#[derive(Parser, Debug)]
#[command(name = "dialscope", version, about)]
struct Cli {
    /// Target URL
    #[arg(default_value = DEFAULT_URL)]
    url: String,

    /// Transport to try (quic, tcp+tls, quic-shared-socket); repeatable
    #[arg(long = "variant", value_name = "NAME", value_parser = parse_variant)]
    variants: Vec<TransportVariant>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Server name to present instead of the URL host
    #[arg(long)]
    sni: Option<String>,

    /// Offer h2 over TCP+TLS
    #[arg(long)]
    h2: bool,

    /// Resolve names with hickory-dns instead of getaddrinfo
    #[arg(long)]
    hickory: bool,

    /// Skip certificate verification
    #[arg(long)]
    insecure: bool,

    /// One JSON object per variant
    #[arg(long)]
    json: bool,

    /// More log output on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_variant(name: &str) -> Result<TransportVariant, String> {
    TransportVariant::from_name(name).ok_or_else(|| {
        let known: Vec<_> = TransportVariant::ALL.iter().map(|v| v.name()).collect();
        format!("unknown variant {name:?}, expected one of {}", known.join(", "))
    })
}

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("DIALSCOPE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = DriverConfig::default()
        .with_url(cli.url)
        .with_timeout(Duration::from_millis(cli.timeout_ms));
    if !cli.variants.is_empty() {
        config = config.with_variants(cli.variants);
    }
    if let Some(sni) = cli.sni {
        config = config.with_sni(sni);
    }
    if cli.h2 {
        config.transport.tls = config.transport.tls.with_h2();
    }
    if cli.hickory {
        config.transport.resolver = Arc::new(HickoryResolver::new());
    }
    if cli.insecure {
        config.transport.tls = config.transport.tls.insecure();
    }

    let driver = match RequestDriver::new(config) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("invalid url: {e}");
            return match e.kind() {
                ErrorKind::InvalidUrl | ErrorKind::UnsupportedScheme => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            };
        }
    };

    let stdout = io::stdout();
    let mut reporter: Box<dyn Reporter> = if cli.json {
        Box::new(JsonReporter::new(stdout.lock()))
    } else {
        Box::new(TextReporter::new(stdout.lock()))
    };

    match driver.run(reporter.as_mut()).await {
        Ok(summary) => ExitCode::from(summary.exit_code() as u8),
        Err(e) => {
            eprintln!("failed to write report: {e}");
            ExitCode::FAILURE
        }
    }
}
