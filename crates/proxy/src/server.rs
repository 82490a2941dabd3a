//! HTTP/1 accept loop shared by the proxy, asset and page servers.
//!
//! One tokio task per connection. Request bodies are either collected up
//! front (bounded by a byte limit) or drained and dropped, so handlers see a
//! plain `Request<Bytes>` either way.
//! When a caller goes away mid-request the connection task is dropped along
//! with the handler future, which cancels any upstream fetch in flight.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::{ServiceError, ServiceResult};
use http::{Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::response::{plain, HttpResponse};

/// Something that answers requests.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Answer one request. Failures are encoded in the response.
    async fn handle(&self, request: Request<Bytes>) -> HttpResponse;
}

/// What happens to request bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyPolicy {
    /// Buffer up to this many bytes; larger bodies get 413.
    Collect(usize),
    /// Read and drop the body while the handler runs; handlers get an empty body.
    Discard,
}

/// Per-listener options.
#[derive(Clone, Copy, Debug)]
pub struct ServeOptions {
    /// Name used in logs.
    pub name: &'static str,
    pub body: BodyPolicy,
}

impl ServeOptions {
    /// Collect bodies up to `max_body_bytes`.
    pub fn new(name: &'static str, max_body_bytes: usize) -> Self {
        Self {
            name,
            body: BodyPolicy::Collect(max_body_bytes),
        }
    }

    /// Never buffer bodies, whatever their size.
    pub fn discarding_body(name: &'static str) -> Self {
        Self {
            name,
            body: BodyPolicy::Discard,
        }
    }
}

/// Bind a listener.
pub async fn bind(addr: SocketAddr) -> ServiceResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::bind(addr, e))
}

/// Serve connections from `listener` until `shutdown` resolves.
pub async fn serve<H, S>(
    listener: TcpListener,
    handler: Arc<H>,
    options: ServeOptions,
    shutdown: S,
) -> ServiceResult<()>
where
    H: Handler,
    S: Future<Output = ()> + Send,
{
    let local_addr = listener.local_addr()?;
    info!(server = options.name, "listening on http://{}", local_addr);

    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    // Typically fd exhaustion; back off instead of spinning.
                    warn!(server = options.name, error = %err, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!(server = options.name, "shutting down");
                return Ok(());
            }
        };

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let service = service_fn(move |request| {
                let handler = Arc::clone(&handler);
                async move {
                    Ok::<_, Infallible>(dispatch(handler.as_ref(), request, options).await)
                }
            });

            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(server = options.name, %peer, error = %err, "connection closed with error");
            }
        });
    }
}

/// Apply the body policy and hand the request to `handler`.
async fn dispatch<H: Handler + ?Sized>(
    handler: &H,
    request: Request<Incoming>,
    options: ServeOptions,
) -> HttpResponse {
    let (parts, body) = request.into_parts();

    let max_body_bytes = match options.body {
        BodyPolicy::Collect(max) => max,
        BodyPolicy::Discard => {
            let (response, ()) = tokio::join!(
                handler.handle(Request::from_parts(parts, Bytes::new())),
                drain(body, options.name)
            );
            return response;
        }
    };

    let body = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            debug!(server = options.name, uri = %parts.uri, "request body too large");
            return plain(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
        }
        Err(err) => {
            debug!(server = options.name, error = %err, "failed to read request body");
            return plain(StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    handler.handle(Request::from_parts(parts, body)).await
}

/// Read a body to the end, dropping each frame as it arrives.
async fn drain(mut body: Incoming, server: &'static str) {
    let mut read = 0usize;
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    read += data.len();
                }
            }
            Err(err) => {
                debug!(server, error = %err, "failed to drain request body");
                return;
            }
        }
    }
    if read > 0 {
        debug!(server, bytes = read, "discarded request body");
    }
}

/// Resolves on Ctrl-C. If the signal cannot be installed, never resolves.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::response::with_body;
    use http::HeaderValue;
    use tokio::sync::oneshot;

    /// Echoes method, path and body back.
    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, request: Request<Bytes>) -> HttpResponse {
            let head = format!("{} {} ", request.method(), request.uri().path());
            let mut body = head.into_bytes();
            body.extend_from_slice(request.body());
            with_body(
                StatusCode::OK,
                HeaderValue::from_static("text/plain"),
                Bytes::from(body),
            )
        }
    }

    /// Client for talking to test servers on loopback.
    pub(crate) fn local_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    type ServerTask = tokio::task::JoinHandle<ServiceResult<()>>;

    async fn start_echo(max_body_bytes: usize) -> (SocketAddr, oneshot::Sender<()>, ServerTask) {
        start_echo_with(ServeOptions::new("echo", max_body_bytes)).await
    }

    async fn start_echo_with(options: ServeOptions) -> (SocketAddr, oneshot::Sender<()>, ServerTask) {
        let listener = bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(
            listener,
            Arc::new(Echo),
            options,
            async move {
                let _ = rx.await;
            },
        ));
        (addr, tx, task)
    }

    #[tokio::test]
    async fn test_serves_requests_with_body() {
        let (addr, _tx, _task) = start_echo(1024).await;

        let response = local_client()
            .post(format!("http://{}/echo", addr))
            .body("hello")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "POST /echo hello");
    }

    #[tokio::test]
    async fn test_rejects_oversized_body() {
        let (addr, _tx, _task) = start_echo(8).await;

        let response = local_client()
            .post(format!("http://{}/", addr))
            .body(vec![b'x'; 64])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 413);
    }

    #[tokio::test]
    async fn test_discarded_body_is_never_limited() {
        let (addr, _tx, _task) = start_echo_with(ServeOptions::discarding_body("echo")).await;
        let client = local_client();

        for _ in 0..2 {
            let response = client
                .post(format!("http://{}/big", addr))
                .body(vec![b'x'; 256 * 1024])
                .send()
                .await
                .unwrap();

            assert_eq!(response.status(), 200);
            assert_eq!(response.text().await.unwrap(), "POST /big ");
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let (_addr, tx, task) = start_echo(8).await;
        tx.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let listener = bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let err = bind(addr).await.unwrap_err();
        assert!(matches!(err, ServiceError::Bind { .. }));
    }
}
