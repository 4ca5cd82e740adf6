//! Remote log sink for Grafana Loki.
//!
//! # Data Flow
//! ```text
//! Logger::emit
//!     → LokiSink::accept (try_send, never blocks)
//!     → bounded mpsc queue
//!     → LokiShipper::run (batch by size or interval)
//!     → POST {url}/loki/api/v1/push, retried with backoff
//! ```
//!
//! Streams are keyed by the static labels plus `level`. Each line is the flat
//! JSON rendering of the event.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::config::LokiConfig;
use crate::observability::logger::{LogEvent, LogSink, SinkError};
use crate::resilience::BackoffPolicy;

/// Errors raised while configuring or pushing to Loki.
#[derive(Debug, Error)]
pub enum LokiError {
    #[error("invalid Loki URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Loki request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Loki answered {0}")]
    Status(StatusCode),
}

impl LokiError {
    /// Network failures, throttling and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            LokiError::Http(_) => true,
            LokiError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            LokiError::Url(_) => false,
        }
    }
}

/// Body of a Loki push request.
#[derive(Debug, Serialize, PartialEq)]
pub struct PushRequest {
    pub streams: Vec<PushStream>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PushStream {
    pub stream: BTreeMap<String, String>,
    /// `[timestamp in nanoseconds, line]` pairs.
    pub values: Vec<[String; 2]>,
}

/// Group events into one stream per level.
pub fn encode_push(
    labels: &BTreeMap<String, String>,
    events: &[LogEvent],
) -> Result<PushRequest, serde_json::Error> {
    let mut streams: BTreeMap<&'static str, Vec<[String; 2]>> = BTreeMap::new();
    for event in events {
        streams
            .entry(event.level.as_str())
            .or_default()
            .push([event.timestamp_nanos.to_string(), event.to_json_line()?]);
    }

    Ok(PushRequest {
        streams: streams
            .into_iter()
            .map(|(level, values)| {
                let mut stream = labels.clone();
                stream.insert("level".to_string(), level.to_string());
                PushStream { stream, values }
            })
            .collect(),
    })
}

/// Push endpoint for a Loki base URL.
pub fn push_url(base: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}/loki/api/v1/push", base.trim_end_matches('/')))
}

/// Logger-facing half: enqueues events for the shipper.
#[derive(Debug, Clone)]
pub struct LokiSink {
    tx: mpsc::Sender<LogEvent>,
}

impl LogSink for LokiSink {
    fn name(&self) -> &'static str {
        "loki"
    }

    fn accept(&self, event: &LogEvent) -> Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Background half: batches queued events and pushes them to Loki.
pub struct LokiShipper {
    rx: mpsc::Receiver<LogEvent>,
    client: LokiClient,
    batch_size: usize,
    flush_interval: Duration,
}

impl LokiShipper {
    /// Create the sink/shipper pair for a configuration.
    pub fn new(config: &LokiConfig) -> Result<(LokiSink, LokiShipper), LokiError> {
        let client = LokiClient::new(config)?;
        let (tx, rx) = mpsc::channel(config.queue_capacity);

        let shipper = LokiShipper {
            rx,
            client,
            batch_size: config.batch_size,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
        };

        Ok((LokiSink { tx }, shipper))
    }

    /// Run until shutdown is signalled or every sink handle is dropped.
    ///
    /// Queued events are flushed before returning.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let LokiShipper {
            mut rx,
            client,
            batch_size,
            flush_interval,
        } = self;

        tracing::info!(url = %client.url, batch_size, "Loki shipper starting");

        let mut batch = Vec::with_capacity(batch_size);
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + flush_interval, flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut draining = false;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= batch_size {
                            client.flush(&mut batch).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        client.flush(&mut batch).await;
                    }
                }
                _ = shutdown.recv() => {
                    draining = true;
                    break;
                }
            }
        }

        if draining {
            tracing::info!("Loki shipper received shutdown signal, draining queue");
            rx.close();
            while let Some(event) = rx.recv().await {
                batch.push(event);
                if batch.len() >= batch_size {
                    client.flush(&mut batch).await;
                }
            }
        }

        if !batch.is_empty() {
            client.flush(&mut batch).await;
        }
        tracing::info!("Loki shipper stopped");
    }
}

/// HTTP side of the shipper.
struct LokiClient {
    http: reqwest::Client,
    url: Url,
    labels: BTreeMap<String, String>,
    backoff: BackoffPolicy,
}

impl LokiClient {
    fn new(config: &LokiConfig) -> Result<Self, LokiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: push_url(&config.url)?,
            labels: config.labels.clone(),
            backoff: BackoffPolicy::from(config),
        })
    }

    /// Push the batch, retrying with backoff; the batch is empty afterwards.
    async fn flush(&self, batch: &mut Vec<LogEvent>) {
        let events = std::mem::take(batch);
        let payload = match encode_push(&self.labels, &events) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, dropped = events.len(), "Failed to encode Loki batch");
                return;
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.push(&payload).await {
                Ok(()) => {
                    tracing::debug!(events = events.len(), attempt, "Pushed batch to Loki");
                    return;
                }
                Err(e) if e.is_retryable() && self.backoff.allows_retry(attempt) => {
                    let delay = self.backoff.delay_after(attempt);
                    tracing::debug!(error = %e, attempt, delay = ?delay, "Retrying Loki push");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, dropped = events.len(), "Dropping Loki batch");
                    return;
                }
            }
        }
    }

    async fn push(&self, payload: &PushRequest) -> Result<(), LokiError> {
        let response = self.http.post(self.url.clone()).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(LokiError::Status(status))
        }
    }
}
