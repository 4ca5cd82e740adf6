//! Shared utilities for integration tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use demo_server::config::ServiceConfig;
use demo_server::lifecycle::{Application, ServerError, Shutdown};
use demo_server::observability::{LogEvent, LogSink, Logger, LokiShipper, SinkError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Records every accepted event.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<LogEvent>>,
}

#[allow(dead_code)]
impl CaptureSink {
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message == "HTTP Request")
            .collect()
    }
}

impl LogSink for CaptureSink {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn accept(&self, event: &LogEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A running server plus handles to observe and stop it.
#[allow(dead_code)]
pub struct TestApp {
    pub addr: SocketAddr,
    pub capture: Arc<CaptureSink>,
    pub client: reqwest::Client,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), ServerError>>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn scrape(&self) -> String {
        self.get("/metrics").await.text().await.unwrap()
    }

    /// Trigger shutdown and wait for the server (and shipper) to stop.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop in time");
        result.unwrap().unwrap();
    }
}

/// Config bound to an ephemeral local port with Loki disabled.
pub fn local_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.logging.loki.enabled = false;
    config.logging.console = false;
    config
}

/// Start the server with a capture sink and an optional Loki shipper.
pub async fn spawn_app_with(
    config: ServiceConfig,
    loki: Option<(Arc<dyn LogSink>, LokiShipper)>,
) -> TestApp {
    let capture = Arc::new(CaptureSink::default());
    let mut logger = Logger::new().with_sink(capture.clone());
    let shipper = match loki {
        Some((sink, shipper)) => {
            logger = logger.with_sink(sink);
            Some(shipper)
        }
        None => None,
    };

    let app = Application::build_with_logger(&config, logger, shipper)
        .await
        .unwrap();
    let addr = app.local_addr();
    let shutdown = app.shutdown_handle();
    let handle = tokio::spawn(app.run());

    TestApp {
        addr,
        capture,
        client: reqwest::Client::new(),
        shutdown,
        handle,
    }
}

#[allow(dead_code)]
pub async fn spawn_app() -> TestApp {
    spawn_app_with(local_config(), None).await
}

/// Value of the sample `name{labels}` in an exposition, label order ignored.
#[allow(dead_code)]
pub fn sample(text: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    text.lines().filter(|l| !l.starts_with('#')).find_map(|line| {
        let (series, value) = line.rsplit_once(' ')?;
        let (metric, rest) = series.split_once('{').unwrap_or((series, "}"));
        if metric != name {
            return None;
        }
        let mut found: Vec<(String, String)> = rest
            .strip_suffix('}')?
            .split("\",")
            .filter(|p| !p.is_empty())
            .filter_map(|p| {
                let (k, v) = p.split_once("=\"")?;
                Some((k.to_string(), v.trim_end_matches('"').to_string()))
            })
            .collect();
        let mut wanted: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        found.sort();
        wanted.sort();

        let same = found.len() == wanted.len()
            && found.iter().zip(&wanted).all(|((fk, fv), (wk, wv))| {
                fk == wk
                    && (fv == wv
                        || matches!((fv.parse::<f64>(), wv.parse::<f64>()), (Ok(a), Ok(b)) if a == b))
            });
        same.then(|| value.parse().ok()).flatten()
    })
}

#[allow(dead_code)]
pub fn request_count(text: &str, method: &str, route: &str, status: &str) -> f64 {
    sample(
        text,
        "http_requests_total",
        &[("method", method), ("route", route), ("status_code", status)],
    )
    .unwrap_or(0.0)
}

/// Mock Loki push endpoint.
///
/// Answers with the queued statuses first, then 204. Every received body is
/// recorded, including the rejected ones.
#[derive(Clone, Default)]
pub struct MockLoki {
    received: Arc<Mutex<Vec<serde_json::Value>>>,
    statuses: Arc<Mutex<VecDeque<StatusCode>>>,
}

#[allow(dead_code)]
impl MockLoki {
    pub fn with_statuses(statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        let mock = Self::default();
        mock.statuses.lock().unwrap().extend(statuses);
        mock
    }

    pub fn received(&self) -> Vec<serde_json::Value> {
        self.received.lock().unwrap().clone()
    }

    /// Start serving; returns the base URL.
    pub async fn start(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/loki/api/v1/push", post(push))
            .with_state(self.clone());

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }
}

async fn push(State(mock): State<MockLoki>, Json(body): Json<serde_json::Value>) -> StatusCode {
    mock.received.lock().unwrap().push(body);
    mock.statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(StatusCode::NO_CONTENT)
}

/// Poll `check` until it holds or the deadline passes.
#[allow(dead_code)]
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
