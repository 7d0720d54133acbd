//! Request logging middleware.
//!
//! [`LoggingLayer`] wraps the whole route table of the server. It observes
//! calls and never alters them: the request, the response and any error pass
//! through untouched.
//!
//! For every call it emits:
//!
//! - a `DEBUG` line `Received request` with the method and a JSON rendering
//!   of the request metadata, when debug logging is enabled. Credential
//!   headers are redacted. Rendering is best effort; a failure is logged at
//!   `TRACE` and otherwise ignored.
//! - exactly one `INFO` line `Handled request` with the method, the elapsed
//!   time and, for failed calls, the error. A call has failed when the inner
//!   service errors or answers with a non-OK `grpc-status` header, which is
//!   how tonic reports handler errors for unary calls. A call whose future
//!   is dropped before completing is reported as abandoned.

use core::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, header::ToStrError};
use pin_project_lite::pin_project;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tonic::{Code, Status};
use tower::{Layer, Service};

const ABANDONED: &str = "call abandoned before completion";

/// Installs [`LoggingService`] around an inner service.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer;

impl LoggingLayer {
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService { inner }
    }
}

/// Pass-through service that logs every call. See the module docs.
#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for LoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: fmt::Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let call = CallContext::start(request.uri().path());
        trace_request(&call, &request);

        ResponseFuture {
            inner: self.inner.call(request),
            call: Some(call),
        }
    }
}

pin_project! {
    /// Response future of [`LoggingService`].
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        // Taken when the summary line is written.
        call: Option<CallContext>,
    }

    impl<F> PinnedDrop for ResponseFuture<F> {
        fn drop(this: Pin<&mut Self>) {
            if let Some(call) = this.project().call.take() {
                call.finish(Some(&ABANDONED));
            }
        }
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: fmt::Display,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));

        if let Some(call) = this.call.take() {
            match &result {
                Ok(response) => match grpc_error(response.headers()) {
                    Some(status) => call.finish(Some(&StatusSummary(&status))),
                    None => call.finish(None),
                },
                Err(e) => call.finish(Some(e as &dyn fmt::Display)),
            }
        }

        Poll::Ready(result)
    }
}

/// Per-call record, alive from `call` until the summary line.
#[derive(Debug)]
struct CallContext {
    method: String,
    started: Instant,
}

impl CallContext {
    fn start(method: &str) -> Self {
        Self {
            method: method.to_owned(),
            started: Instant::now(),
        }
    }

    fn finish(self, error: Option<&dyn fmt::Display>) {
        let duration = self.started.elapsed();
        match error {
            Some(error) => {
                tracing::info!(method = %self.method, ?duration, %error, "Handled request");
            }
            None => tracing::info!(method = %self.method, ?duration, "Handled request"),
        }
    }
}

fn grpc_error(headers: &HeaderMap) -> Option<Status> {
    Status::from_header_map(headers).filter(|status| status.code() != Code::Ok)
}

struct StatusSummary<'a>(&'a Status);

impl fmt::Display for StatusSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "code = {:?} desc = {}",
            self.0.code(),
            self.0.message()
        )
    }
}

#[derive(Debug, thiserror::Error)]
enum RenderError {
    #[error("metadata `{key}` is not printable: {source}")]
    Metadata {
        key: String,
        #[source]
        source: ToStrError,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn trace_request<B>(call: &CallContext, request: &Request<B>) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    match render_request(request) {
        Ok(rendered) => {
            tracing::debug!(method = %call.method, request = %rendered, "Received request");
        }
        Err(e) => tracing::trace!(method = %call.method, error = %e, "Could not render request"),
    }
}

/// Metadata keys whose values are credentials and never reach the log.
const REDACTED_KEYS: [&str; 4] = [
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
];

fn is_redacted(key: &HeaderName, headers: &HeaderMap) -> bool {
    REDACTED_KEYS.contains(&key.as_str())
        || headers.get_all(key).iter().any(HeaderValue::is_sensitive)
}

/// Renders the call's authority and ASCII metadata as a JSON object.
///
/// Binary (`-bin`) metadata and credentials are replaced by placeholders.
/// Repeated keys are joined with `", "`.
fn render_request<B>(request: &Request<B>) -> Result<String, RenderError> {
    let mut metadata = Map::new();
    for key in request.headers().keys() {
        let name = key.as_str();
        let value = if name.ends_with("-bin") {
            Value::from("<binary>")
        } else if is_redacted(key, request.headers()) {
            Value::from("<redacted>")
        } else {
            let values = request
                .headers()
                .get_all(key)
                .iter()
                .map(|v| v.to_str())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| RenderError::Metadata {
                    key: name.to_owned(),
                    source,
                })?;
            Value::from(values.join(", "))
        };
        metadata.insert(name.to_owned(), value);
    }

    let mut rendered = Map::new();
    if let Some(authority) = request.uri().authority() {
        rendered.insert("authority".to_owned(), Value::from(authority.as_str()));
    }
    rendered.insert("metadata".to_owned(), Value::Object(metadata));

    Ok(serde_json::to_string(&Value::Object(rendered))?)
}
