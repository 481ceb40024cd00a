//! Docker Hub rate-limit exporter
//!
//! Single-binary service that:
//! 1. Loads Docker Hub accounts from a secrets directory (or a single
//!    username/password pair, or falls back to anonymous access)
//! 2. Polls the pull-rate limits of every account in the background
//! 3. Serves the latest results in Prometheus text format on `/metrics`

mod config;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use clap::Parser;
use dockerhub_client::{AccountSet, HttpRegistry, Registry};
use metrics_exporter_prometheus::PrometheusHandle;
use ratelimit_monitor::{RefreshLoop, SnapshotReader, snapshot_channel, spawn_refresh_task};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Cli, Config};

/// Upper bound for in-flight HTTP requests and the refresh task to finish
/// after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const INDEX_HTML: &str = r#"<html>
<head><title>Docker Hub rate limits exporter</title></head>
<body>
<h1>Docker Hub rate limits exporter</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/healthz">Health</a></p>
</body>
</html>
"#;

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    snapshot: SnapshotReader,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting dockerhub-ratelimit-exporter");

    let mut config = Config::resolve(Cli::parse()).context("failed to load configuration")?;
    info!(
        port = config.port,
        secrets_dir = %config.secrets_dir.display(),
        check_interval_secs = config.check_interval.as_secs(),
        put_source_ip = config.put_source_ip,
        "configuration loaded"
    );

    // Install before the refresh task emits anything
    let prometheus =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let accounts = match config.credentials.take() {
        Some(accounts) => {
            info!("using username/password pair, secrets directory ignored");
            accounts
        }
        None => AccountSet::load_dir(&config.secrets_dir).await,
    };
    let names: Vec<&str> = accounts.iter().map(|a| a.display_name()).collect();
    info!(accounts = ?names, "monitoring accounts");

    let client = reqwest::Client::builder()
        .timeout(config.registry.timeout)
        .build()
        .context("failed to build HTTP client")?;
    let http_registry = HttpRegistry::new(client, config.registry.endpoints.clone());
    info!(
        token_url = %http_registry.endpoints().token_url,
        limits_url = %http_registry.endpoints().limits_url,
        timeout_secs = config.registry.timeout.as_secs(),
        "registry client ready"
    );
    let registry: Arc<dyn Registry> = Arc::new(http_registry);

    let (publisher, reader) = snapshot_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh = RefreshLoop::new(
        registry,
        accounts,
        publisher,
        config.check_interval,
        config.put_source_ip,
    );
    let refresh_handle = spawn_refresh_task(refresh, shutdown_rx.clone());

    let app = build_router(
        AppState {
            snapshot: reader,
            prometheus,
        },
        config.max_connections,
    );

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let server_handle = tokio::spawn(serve(listener, app, shutdown_rx));

    shutdown_signal().await;

    // Stops the refresh loop and starts the HTTP drain; the drain timeout
    // starts here, not at server start.
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    match tokio::time::timeout(DRAIN_TIMEOUT, refresh_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "refresh task panicked"),
        Err(_) => warn!("refresh task did not stop in time"),
    }

    info!("shutdown complete");
    Ok(())
}

/// Serve `app` until `shutdown` flips to true, then drain.
async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Liveness only: the refresh loop reports problems through metric values.
async fn health_handler() -> &'static str {
    "Ok"
}

/// Latest rate-limit snapshot followed by the exporter's own metrics.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot.latest();
    let own = state.prometheus.render();

    let mut body = String::with_capacity(snapshot.text().len() + own.len());
    body.push_str(snapshot.text());
    body.push_str(&own);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        body,
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request};
    use axum::routing::head;
    use dockerhub_client::{Account, RegistryEndpoints};
    use ratelimit_monitor::MetricsSnapshot;
    use ratelimit_monitor::snapshot::PLACEHOLDER_TEXT;
    use tower::ServiceExt;

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus() -> (metrics_exporter_prometheus::PrometheusRecorder, PrometheusHandle) {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, HeaderMap, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (_publisher, reader) = snapshot_channel();
        let (_recorder, prometheus) = test_prometheus();
        let app = build_router(AppState { snapshot: reader, prometheus }, 10);

        let (status, _, body) = get_body(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Ok");
    }

    #[tokio::test]
    async fn index_links_metrics_and_health() {
        let (_publisher, reader) = snapshot_channel();
        let (_recorder, prometheus) = test_prometheus();
        let app = build_router(AppState { snapshot: reader, prometheus }, 10);

        let (status, headers, body) = get_body(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
        assert!(body.contains(r#"href="/metrics""#));
        assert!(body.contains(r#"href="/healthz""#));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (_publisher, reader) = snapshot_channel();
        let (_recorder, prometheus) = test_prometheus();
        let app = build_router(AppState { snapshot: reader, prometheus }, 10);

        let (status, _, _) = get_body(app, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_serves_placeholder_before_first_pass() {
        let (_publisher, reader) = snapshot_channel();
        let (_recorder, prometheus) = test_prometheus();
        let app = build_router(AppState { snapshot: reader, prometheus }, 10);

        let (status, headers, body) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], PROMETHEUS_CONTENT_TYPE);
        assert!(body.starts_with(PLACEHOLDER_TEXT));
    }

    #[tokio::test]
    async fn metrics_appends_self_metrics_after_snapshot() {
        let (publisher, reader) = snapshot_channel();
        let (recorder, prometheus) = test_prometheus();
        {
            let _guard = ::metrics::set_default_local_recorder(&recorder);
            ::metrics::counter!("ratelimit_exporter_refresh_cycles_total").increment(3);
        }
        publisher.publish(MetricsSnapshot::new(
            "dockerhub_ratelimit_current{dockerhub_user=\"alice\",source_ip=\"\"} 100\n".into(),
            1,
        ));
        let app = build_router(AppState { snapshot: reader, prometheus }, 10);

        let (_, _, body) = get_body(app, "/metrics").await;
        let snapshot_at = body
            .find("dockerhub_ratelimit_current{dockerhub_user=\"alice\"")
            .expect("snapshot text missing");
        let own_at = body
            .find("ratelimit_exporter_refresh_cycles_total 3")
            .expect("self-metrics missing");
        assert!(snapshot_at < own_at);
    }

    /// Mock Docker Hub: alice:s3cret gets `alice-token`, which reports
    /// 100/76 from 1.2.3.4. Everything else is 401.
    async fn start_mock_registry() -> (RegistryEndpoints, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route(
                "/token",
                get(|headers: HeaderMap| async move {
                    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                        Some("Basic YWxpY2U6czNjcmV0") => (
                            StatusCode::OK,
                            [(header::CONTENT_TYPE, "application/json")],
                            r#"{"token":"alice-token","expires_in":300}"#,
                        )
                            .into_response(),
                        _ => StatusCode::UNAUTHORIZED.into_response(),
                    }
                }),
            )
            .route(
                "/v2/ratelimitpreview/test/manifests/latest",
                head(|headers: HeaderMap| async move {
                    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                        Some("Bearer alice-token") => (
                            StatusCode::OK,
                            [
                                ("ratelimit-limit", "100;w=21600"),
                                ("ratelimit-remaining", "76;w=21600"),
                                ("docker-ratelimit-source", "1.2.3.4"),
                            ],
                        )
                            .into_response(),
                        _ => StatusCode::UNAUTHORIZED.into_response(),
                    }
                }),
            );

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let endpoints = RegistryEndpoints {
            token_url: format!("http://{addr}/token"),
            limits_url: format!("http://{addr}/v2/ratelimitpreview/test/manifests/latest"),
        };
        (endpoints, handle)
    }

    #[tokio::test]
    async fn refresh_against_http_registry_reaches_metrics_endpoint() {
        let (endpoints, _registry_server) = start_mock_registry().await;
        let registry: Arc<dyn Registry> = Arc::new(HttpRegistry::new(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            endpoints,
        ));
        let accounts = AccountSet::new(vec![
            Account::new("alice", "s3cret"),
            Account::new("mallory", "wrong"),
        ]);

        let (publisher, mut reader) = snapshot_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let refresh = RefreshLoop::new(
            registry,
            accounts,
            publisher,
            Duration::from_secs(3600),
            true,
        );
        let refresh_handle = spawn_refresh_task(refresh, shutdown_rx);

        tokio::time::timeout(Duration::from_secs(10), reader.changed())
            .await
            .expect("no snapshot published");

        let (_recorder, prometheus) = test_prometheus();
        let app = build_router(AppState { snapshot: reader, prometheus }, 10);
        let (status, _, body) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(
            r#"dockerhub_ratelimit_current{dockerhub_user="alice",source_ip="1.2.3.4"} 100"#
        ));
        assert!(body.contains(
            r#"dockerhub_ratelimit_remaining{dockerhub_user="alice",source_ip="1.2.3.4"} 76"#
        ));
        assert!(body.contains(
            r#"dockerhub_ratelimit_scrape_error{dockerhub_user="alice",source_ip="1.2.3.4"} 0"#
        ));
        assert!(body.contains(
            r#"dockerhub_ratelimit_scrape_error{dockerhub_user="mallory",source_ip=""} 1"#
        ));
        assert!(!body.contains(r#"dockerhub_ratelimit_current{dockerhub_user="mallory""#));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(DRAIN_TIMEOUT, refresh_handle)
            .await
            .expect("refresh task did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_signal() {
        let (_publisher, reader) = snapshot_channel();
        let (_recorder, prometheus) = test_prometheus();
        let app = build_router(AppState { snapshot: reader, prometheus }, 10);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, app, shutdown_rx));

        let body = reqwest::get(format!("http://{addr}/healthz"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "Ok");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(DRAIN_TIMEOUT, server)
            .await
            .expect("server did not drain")
            .unwrap()
            .unwrap();
    }
}
