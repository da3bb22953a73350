//! Metrics exposition endpoint
//!
//! A small blocking HTTP/1.1 server for Prometheus scraping. Each
//! connection is served on its own thread and closed after one response.
//!
//! - GET /metrics (or /) - current registry snapshot, text format
//! - GET /-/healthy - liveness check

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::exposition::{self, CONTENT_TYPE};
use super::registry::Registry;
use crate::error::{MetricsError, MetricsResult};
use crate::util::create_listener;

/// Default scrape port
pub const DEFAULT_PORT: u16 = 8080;

const HEALTHY_BODY: &str = "Exporter is Healthy.";
const IO_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_HEAD: usize = 8192;

/// Handle to a running exposition endpoint.
///
/// The server lives until the process exits; dropping the handle does
/// not stop it.
#[derive(Debug, Clone, Copy)]
pub struct MetricsServer {
    local_addr: SocketAddr,
}

impl MetricsServer {
    /// Bind `addr` and start serving `registry`. No retry on failure.
    pub fn start(addr: SocketAddr, registry: Arc<Registry>) -> MetricsResult<Self> {
        let listener = create_listener(addr).map_err(|source| MetricsError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| MetricsError::Bind { addr, source })?;

        thread::spawn(move || accept_loop(listener, registry));
        info!(%local_addr, "Metrics endpoint started");

        Ok(Self { local_addr })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn accept_loop(listener: TcpListener, registry: Arc<Registry>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let registry = registry.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, &registry) {
                        debug!(error = %e, "Scrape handling error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept scrape connection");
            }
        }
    }
}

fn handle_connection(mut stream: TcpStream, registry: &Registry) -> std::io::Result<()> {
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;

    let mut buffer = vec![0u8; MAX_REQUEST_HEAD];
    let mut filled = 0;
    while filled < buffer.len() {
        let n = stream.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if buffer[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    if filled == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..filled]);
    let first_line = request.lines().next().unwrap_or("");
    let response = respond(first_line, registry);

    stream.write_all(&response)?;
    stream.flush()
}

/// Build the full HTTP response for one request line
fn respond(request_line: &str, registry: &Registry) -> Vec<u8> {
    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method, target),
        _ => return http_response("400 Bad Request", "text/plain", "bad request\n", false),
    };

    let head_only = method == "HEAD";
    if method != "GET" && !head_only {
        return http_response("405 Method Not Allowed", "text/plain", "method not allowed\n", false);
    }

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    debug!(method, path, "Scrape request");

    match path {
        "/" | "/metrics" => {
            let names = requested_names(query);
            let body = exposition::render_filtered(&registry.snapshot(), &names);
            http_response("200 OK", CONTENT_TYPE, &body, head_only)
        }
        "/-/healthy" => http_response("200 OK", "text/plain", HEALTHY_BODY, head_only),
        _ => http_response("404 Not Found", "text/plain", "not found\n", head_only),
    }
}

fn http_response(status: &str, content_type: &str, body: &str, head_only: bool) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        status,
        content_type,
        body.len()
    )
    .into_bytes();
    if !head_only {
        response.extend_from_slice(body.as_bytes());
    }
    response
}

/// Collect `name[]=` values from a query string
fn requested_names(query: &str) -> Vec<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| percent_decode(key) == "name[]")
        .map(|(_, value)| percent_decode(value))
        .filter(|value| !value.is_empty())
        .collect()
}

/// Form-style decode: `+` is a space, bad escapes are kept verbatim
fn percent_decode(input: &str) -> String {
    let spaced = input.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
