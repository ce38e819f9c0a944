//! custom-exporter - runs shell, SQL and key-value probes on every scrape and
//! serves the results in the Prometheus text format.

mod handlers;
mod state;

use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use std::process;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::compression::CompressionLayer;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use custom_exporter_core::config::{Config, ConfigError};
use custom_exporter_core::exposition::Exporter;
use custom_exporter_core::sink::DEFAULT_QUEUE_CAPACITY;

use state::{AppState, WebState};

/// Exit code for configuration problems detected before serving.
const EXIT_CONFIG: i32 = 2;

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(
    name = "custom-exporter",
    about = "Prometheus exporter for shell, SQL and key-value probes",
    version = custom_exporter_core::VERSION
)]
struct Args {
    /// Path to the YAML file declaring credentials and metrics.
    #[arg(long = "collector.config", env = "CUSTOM_EXPORTER_CONFIG", value_name = "PATH")]
    config: PathBuf,

    /// Address to listen on. A leading ':' listens on all interfaces.
    #[arg(long = "web.listen-address", default_value = ":9209", env = "CUSTOM_EXPORTER_LISTEN")]
    listen_address: String,

    /// Path under which metrics are exposed.
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    telemetry_path: String,

    /// Maximum samples one probe may emit per scrape; extra samples are dropped.
    #[arg(long = "scrape.queue-capacity", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let exporter = match load_exporter(&args.config, args.queue_capacity) {
        Ok(exporter) => exporter,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "invalid configuration");
            process::exit(EXIT_CONFIG);
        }
    };

    let addr = match parse_listen_address(&args.listen_address) {
        Ok(addr) => addr,
        Err(e) => {
            error!(address = %args.listen_address, error = %e, "invalid listen address");
            process::exit(EXIT_CONFIG);
        }
    };

    info!(
        version = custom_exporter_core::VERSION,
        revision = custom_exporter_core::GIT_SHA,
        probes = exporter.supervisors().len(),
        "starting custom exporter"
    );

    let app = build_router(WebState::new(exporter, &args.telemetry_path));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(addr, app)) {
        error!(%addr, error = %e, "server error");
        process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["custom_exporter", "custom_exporter_core"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads the configuration and builds every probe's backend.
fn load_exporter(path: &Path, queue_capacity: usize) -> Result<Exporter, ConfigError> {
    let config = Config::load(path)?;
    Exporter::from_config(&config, queue_capacity)
}

/// Parses `host:port`; `:port` means every interface.
fn parse_listen_address(raw: &str) -> Result<SocketAddr, AddrParseError> {
    let raw = raw.trim();
    if raw.starts_with(':') {
        format!("0.0.0.0{raw}").parse()
    } else {
        raw.parse()
    }
}

fn build_router(state: AppState) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    let mut app = Router::new().route(&telemetry_path, get(handlers::handle_metrics));
    if telemetry_path != "/" {
        app = app.route("/", get(handlers::handle_landing));
    }
    app.with_state(state).layer(CompressionLayer::new())
}

async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C signal"),
        _ = terminate => info!("received terminate signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    const CONFIG: &str = r#"
credentials:
  - name: shell_root
    type: bash
metrics:
  - name: custom_metric_shell
    credential: shell_root
    commands: ['printf 1,chicken,128\n']
    mapping: [id, animal]
    separator: ","
    value_type: GAUGE
"#;

    fn exporter() -> Exporter {
        let config = Config::from_yaml(CONFIG).unwrap();
        Exporter::from_config(&config, 100).unwrap()
    }

    async fn get_path(app: Router, path: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn cli_requires_config_and_has_defaults() {
        assert!(Args::try_parse_from(["custom-exporter"]).is_err());

        let args =
            Args::try_parse_from(["custom-exporter", "--collector.config", "/etc/exporter.yml"])
                .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/exporter.yml"));
        assert_eq!(args.listen_address, ":9209");
        assert_eq!(args.telemetry_path, "/metrics");
        assert_eq!(args.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn listen_address_shorthand() {
        assert_eq!(
            parse_listen_address(":9209").unwrap(),
            "0.0.0.0:9209".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_address("127.0.0.1:8080").unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_listen_address("localhost").is_err());
    }

    #[test]
    fn load_exporter_reads_file_and_rejects_bad_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let exporter = load_exporter(file.path(), 10).unwrap();
        assert_eq!(exporter.supervisors()[0].name(), "custom_metric_shell");

        assert!(matches!(
            load_exporter(Path::new("/test/me/wrong.yml"), 10).err(),
            Some(ConfigError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn landing_page_links_metrics() {
        let app = build_router(WebState::new(exporter(), "/metrics"));
        let (status, _, body) = get_path(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<a href=\"/metrics\">Metrics</a>"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn metrics_endpoint_serves_exposition() {
        let app = build_router(WebState::new(exporter(), "/metrics"));
        let (status, content_type, body) = get_path(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/plain; version=0.0.4"));
        assert!(body.contains(r#"custom_custom_metric_shell{animal="chicken",id="1"} 128"#));
        assert!(body.contains("custom_custom_metric_shell_scrapes_total 1"));
        assert!(body.contains("custom_exporter_build_info"));
    }

    #[tokio::test]
    async fn custom_telemetry_path_and_unknown_routes() {
        let app = build_router(WebState::new(exporter(), "probe-metrics/"));
        let (status, _, body) = get_path(app.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("href=\"/probe-metrics\""));

        let (status, _, _) = get_path(app, "/nothing-here").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
