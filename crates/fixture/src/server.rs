//! HTTP and HTTPS fixture listeners
//!
//! Both listeners share one router over the document root. Requests for an
//! existing file are served from disk; other paths fall through to a
//! registered [`ResponseHook`](crate::hooks::ResponseHook), then to 404.
//! Anything that goes wrong while serving is recorded in the run's
//! [`FaultLog`] instead of aborting the run.

use std::any::Any;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use testrig_common::{FaultLog, ServerFault};

use crate::error::{FixtureError, FixtureResult};
use crate::hooks::{HookRegistry, HookRequest};
use crate::paths::Translated;
use crate::tls;

const INDEX_FILES: &[&str] = &["index.html", "index.htm"];

/// Where the fixture server finds its content
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub www_root: PathBuf,
    pub certs_dir: PathBuf,
    /// Echo each request to stdout
    pub echo: bool,
}

#[derive(Debug, Clone, Copy)]
struct Scheme(&'static str);

struct Fixture {
    root: PathBuf,
    hooks: HookRegistry,
    faults: FaultLog,
    echo: bool,
}

/// A running pair of fixture listeners.
///
/// [`shutdown`](Self::shutdown) stops both; dropping the server without it
/// aborts the accept loops.
pub struct FixtureServer {
    http_addr: SocketAddr,
    https_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl FixtureServer {
    /// Bind both listeners on ephemeral loopback ports and start serving
    pub async fn start(
        config: FixtureConfig,
        hooks: HookRegistry,
        faults: FaultLog,
    ) -> FixtureResult<Self> {
        let acceptor = TlsAcceptor::from(tls::server_config(&config.certs_dir)?);

        let state = Arc::new(Fixture {
            root: config.www_root,
            hooks,
            faults: faults.clone(),
            echo: config.echo,
        });

        let http = bind().await?;
        let https = bind().await?;
        let http_addr = http.local_addr()?;
        let https_addr = https.local_addr()?;

        let (shutdown, rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(accept_loop(
                http,
                router(state.clone(), Scheme("HTTP")),
                None,
                faults.clone(),
                rx.clone(),
            )),
            tokio::spawn(accept_loop(
                https,
                router(state, Scheme("HTTPS")),
                Some(acceptor),
                faults,
                rx,
            )),
        ];

        info!("fixture server on {} (http) and {} (https)", http_addr, https_addr);
        Ok(Self {
            http_addr,
            https_addr,
            shutdown,
            tasks,
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn https_addr(&self) -> SocketAddr {
        self.https_addr
    }

    /// Base URL handed to the target as `TEST_HTTP_BASE`
    pub fn http_base(&self) -> String {
        format!("http://localhost:{}/", self.http_addr.port())
    }

    /// Base URL handed to the target as `TEST_HTTPS_BASE`
    pub fn https_base(&self) -> String {
        format!("https://localhost:{}/", self.https_addr.port())
    }

    /// Stop accepting, close open connections and wait for the loops
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("fixture accept loop ended abnormally: {}", e);
            }
        }
        info!("fixture server stopped");
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn bind() -> FixtureResult<TcpListener> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .map_err(FixtureError::Bind)
}

fn router(state: Arc<Fixture>, scheme: Scheme) -> Router {
    let faults = state.faults.clone();
    Router::new()
        .fallback(handle)
        .layer(Extension(scheme))
        .layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| panic_response(&faults, panic),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A panicking handler is a server fault like any other
fn panic_response(faults: &FaultLog, panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(&*panic);
    warn!("request handler panicked: {}", message);
    faults.record(ServerFault::new(
        format!("request handler panicked: {message}"),
        Vec::new(),
    ));
    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn accept_loop(
    listener: TcpListener,
    router: Router,
    tls: Option<TlsAcceptor>,
    faults: FaultLog,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("fixture accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        let router = router.clone();
        let tls = tls.clone();
        let faults = faults.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => serve(stream, router, peer, faults, shutdown).await,
                    // Clients probing or rejecting the self-signed certificate
                    Err(e) => debug!("TLS handshake with {} failed: {}", peer, e),
                },
                None => serve(stream, router, peer, faults, shutdown).await,
            }
        });
    }
}

async fn serve<S>(
    stream: S,
    router: Router,
    peer: SocketAddr,
    faults: FaultLog,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));

    tokio::select! {
        result = conn => {
            if let Err(e) = result {
                if is_disconnect(&*e) {
                    debug!("client {} went away: {}", peer, e);
                } else {
                    faults.record(ServerFault::new(
                        format!("connection from {peer} failed: {e}"),
                        error_chain(&*e),
                    ));
                }
            }
        }
        _ = shutdown.changed() => {}
    }
}

/// Broken pipe, connection reset and a request cut off mid-message only
/// mean the client hung up
fn is_disconnect(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(h) = e.downcast_ref::<hyper::Error>() {
            if h.is_incomplete_message() || h.is_canceled() {
                return true;
            }
        }
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = err.source();
    while let Some(e) = current {
        lines.push(format!("caused by: {e}"));
        current = e.source();
    }
    lines
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        body.into(),
    )
        .into_response()
}

async fn handle(
    State(fixture): State<Arc<Fixture>>,
    Extension(Scheme(scheme)): Extension<Scheme>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());

    let body = match method {
        Method::GET | Method::HEAD => Bytes::new(),
        Method::POST => {
            let length = headers.get(header::CONTENT_LENGTH);
            if length
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .is_none()
            {
                let shown = length.map_or_else(
                    || "None".to_string(),
                    |v| format!("'{}'", String::from_utf8_lossy(v.as_bytes())),
                );
                return text(
                    StatusCode::BAD_REQUEST,
                    format!("No or invalid Content-Length in POST ({shown})"),
                );
            }
            body
        }
        _ => {
            return text(
                StatusCode::NOT_IMPLEMENTED,
                format!("Unsupported method ({method})"),
            )
        }
    };

    let translated = Translated::new(raw);
    let path = translated.on_disk(&fixture.root);
    if fixture.echo {
        println!("## {scheme}: {method} {raw} -> {}", path.display());
    }

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => {
            if !translated.trailing_slash {
                let location = format!("{}/", uri.path());
                return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
            }
            for index in INDEX_FILES {
                let candidate = path.join(index);
                if candidate.is_file() {
                    return fixture.send_file(candidate).await;
                }
            }
            text(StatusCode::NOT_FOUND, "File not found")
        }
        Ok(_) if translated.trailing_slash => text(StatusCode::NOT_FOUND, "File not found"),
        Ok(_) => fixture.send_file(path).await,
        Err(_) => match fixture.hooks.get(&translated.relative) {
            Some(hook) => {
                debug!("{} {} handled by hook {}", method, raw, translated.relative);
                let request = HookRequest {
                    method,
                    path: uri.path().to_string(),
                    query: uri.query().map(str::to_string),
                    headers,
                    body,
                };
                match hook.respond(&request) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("hook {} failed: {:#}", translated.relative, e);
                        fixture.faults.record(ServerFault::new(
                            format!("response hook {} failed: {}", translated.relative, e),
                            e.chain().skip(1).map(|c| format!("caused by: {c}")).collect(),
                        ));
                        text(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            format!("Internal Server Error in {}", translated.relative),
                        )
                    }
                }
            }
            None => text(StatusCode::NOT_FOUND, "File not found"),
        },
    }
}

impl Fixture {
    async fn send_file(&self, path: PathBuf) -> Response {
        match tokio::fs::read(&path).await {
            Ok(contents) => {
                let mime = mime_guess::from_path(&path).first_or_octet_stream();
                ([(header::CONTENT_TYPE, mime.to_string())], contents).into_response()
            }
            Err(e) => {
                self.faults.record(ServerFault::new(
                    format!("reading {} failed: {}", path.display(), e),
                    Vec::new(),
                ));
                text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnects_are_not_faults() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(is_disconnect(&reset));
        let pipe = io::Error::from(io::ErrorKind::BrokenPipe);
        assert!(is_disconnect(&pipe));
        let other = io::Error::from(io::ErrorKind::InvalidData);
        assert!(!is_disconnect(&other));
    }

    #[test]
    fn test_panic_response_records_fault() {
        let faults = FaultLog::new();
        let response = panic_response(&faults, Box::new(format!("index {} out of range", 3)));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let recorded = faults.drain();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].summary, "request handler panicked: index 3 out of range");

        assert_eq!(panic_message(&"static text"), "static text");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }

    #[test]
    fn test_error_chain_lists_causes() {
        let inner = io::Error::new(io::ErrorKind::Other, "inner");
        let outer = io::Error::new(io::ErrorKind::Other, inner);
        assert_eq!(error_chain(&outer), vec!["caused by: inner"]);
    }
}
