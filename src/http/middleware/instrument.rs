//! Request instrumentation middleware.
//!
//! Every request is timed from the moment it enters the layer until its
//! response body is handed to the transport. The terminal event, whichever
//! comes first, produces exactly one observation:
//!
//! ```text
//! PENDING ──┬── body end of stream ─────────────┐
//!           ├── body error ─────────────────────┤
//!           ├── body dropped before its end ────┼──▶ COMPLETED
//!           ├── inner service error ────────────┤    (counter + histogram + log)
//!           └── request dropped before response ┘
//! ```
//!
//! The handler returning is not a terminal event: the body may still be
//! streaming afterwards.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use tower::{Layer, Service};

use crate::observability::{Logger, MetricsRegistry, RequestTimer, Termination};

/// Recorded when the client goes away before any response exists.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Header carrying the correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer adding request instrumentation to a service.
#[derive(Clone)]
pub struct InstrumentLayer {
    registry: Arc<MetricsRegistry>,
    logger: Arc<Logger>,
}

impl InstrumentLayer {
    pub fn new(registry: Arc<MetricsRegistry>, logger: Arc<Logger>) -> Self {
        Self { registry, logger }
    }
}

impl<S> Layer<S> for InstrumentLayer {
    type Service = InstrumentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentService {
            inner,
            registry: self.registry.clone(),
            logger: self.logger.clone(),
        }
    }
}

/// Service produced by [`InstrumentLayer`].
#[derive(Clone)]
pub struct InstrumentService<S> {
    inner: S,
    registry: Arc<MetricsRegistry>,
    logger: Arc<Logger>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for InstrumentService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Body,
{
    type Response = Response<InstrumentedBody<ResBody>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut completion = Completion::pending(
            start_timer(&req),
            self.registry.clone(),
            self.logger.clone(),
        );

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match inner.call(req).await {
                Ok(response) => {
                    completion.status = Some(response.status().as_u16());
                    Ok(response.map(|body| InstrumentedBody::new(body, completion)))
                }
                Err(e) => {
                    completion.status = Some(500);
                    completion.fire(Termination::ServiceError);
                    Err(e)
                }
            }
        })
    }
}

/// Start timing, labelling with the matched route or the raw path.
fn start_timer<B>(req: &Request<B>) -> RequestTimer {
    let path = req.uri().path();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str())
        .unwrap_or(path);
    let original = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(path);
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    RequestTimer::start(req.method().as_str(), route, original).with_request_id(request_id)
}

enum CompletionState {
    Pending(RequestTimer),
    Completed,
}

/// One-shot completion for a single request.
///
/// Owned by the response future and then by the response body, so it lives
/// exactly as long as the request. Dropping it while still pending counts as
/// an abort.
struct Completion {
    state: CompletionState,
    status: Option<u16>,
    /// Body was already at end of stream when the response was produced.
    empty_body: bool,
    registry: Arc<MetricsRegistry>,
    logger: Arc<Logger>,
}

impl Completion {
    fn pending(timer: RequestTimer, registry: Arc<MetricsRegistry>, logger: Arc<Logger>) -> Self {
        Self {
            state: CompletionState::Pending(timer),
            status: None,
            empty_body: false,
            registry,
            logger,
        }
    }

    /// PENDING → COMPLETED. No-op once completed.
    fn fire(&mut self, termination: Termination) {
        let timer = match std::mem::replace(&mut self.state, CompletionState::Completed) {
            CompletionState::Pending(timer) => timer,
            CompletionState::Completed => return,
        };

        let status = self.status.unwrap_or(CLIENT_CLOSED_REQUEST);
        let observation = timer.complete(status, termination);

        // Independent, best-effort: neither may prevent the other.
        match catch_unwind(AssertUnwindSafe(|| self.registry.record_request(&observation))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, route = %observation.route, "Failed to record request metrics"),
            Err(_) => tracing::error!(route = %observation.route, "Metrics recording panicked"),
        }

        let event = observation.to_log_event();
        if catch_unwind(AssertUnwindSafe(|| self.logger.emit(event))).is_err() {
            tracing::error!(route = %observation.route, "Request logging panicked");
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let termination = if self.empty_body {
            Termination::Finished
        } else {
            Termination::Aborted
        };
        self.fire(termination);
    }
}

pin_project! {
    /// Response body that completes the request's observation when it ends.
    pub struct InstrumentedBody<B> {
        #[pin]
        inner: B,
        completion: Completion,
    }
}

impl<B: Body> InstrumentedBody<B> {
    fn new(inner: B, mut completion: Completion) -> Self {
        completion.empty_body = inner.is_end_stream();
        Self { inner, completion }
    }
}

impl<B: Body> Body for InstrumentedBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let polled = this.inner.as_mut().poll_frame(cx);

        match &polled {
            Poll::Ready(None) => this.completion.fire(Termination::Finished),
            Poll::Ready(Some(Err(_))) => this.completion.fire(Termination::BodyError),
            Poll::Ready(Some(Ok(_))) if this.inner.is_end_stream() => {
                this.completion.fire(Termination::Finished)
            }
            _ => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
