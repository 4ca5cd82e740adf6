//! Helpers shared by unit tests.

use std::sync::Mutex;

use crate::observability::logger::{LogEvent, LogSink, SinkError};

/// Records every accepted event.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<LogEvent>>,
}

impl CaptureSink {
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events produced by the instrumentation layer.
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

/// Value of the sample `name{labels}` in an exposition.
///
/// Label order is ignored and numeric label values (`le`) compare as numbers.
pub fn sample(text: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    text.lines().filter(|l| !l.starts_with('#')).find_map(|line| {
        let (series, value) = line.rsplit_once(' ')?;
        let (metric, rest) = series.split_once('{').unwrap_or((series, "}"));
        if metric != name {
            return None;
        }
        let body = rest.strip_suffix('}')?;
        let mut found: Vec<(String, String)> = body
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
                        || matches!(
                            (fv.parse::<f64>(), wv.parse::<f64>()),
                            (Ok(a), Ok(b)) if a == b
                        ))
            });
        same.then(|| value.parse().ok()).flatten()
    })
}

/// `http_requests_total` for one label-tuple, zero when absent.
pub fn request_count(text: &str, method: &str, route: &str, status: &str) -> f64 {
    sample(
        text,
        "http_requests_total",
        &[("method", method), ("route", route), ("status_code", status)],
    )
    .unwrap_or(0.0)
}
