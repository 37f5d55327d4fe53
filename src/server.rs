//! MJPEG streaming endpoint.
//!
//! A small hand-rolled HTTP server on its own thread:
//! - `GET /` - embedded viewer page that points an `<img>` at the stream
//! - `GET /stream` - `multipart/x-mixed-replace` response fed by a freshly
//!   built pipeline until the consumer disconnects
//! - `GET /health` - JSON liveness probe
//!
//! The camera handle is owned exclusively by the active pipeline, so at most
//! one stream runs at a time; concurrent viewers get 503. A consumer
//! disconnect surfaces as a socket write error, which closes the pipeline
//! (releasing the source) rather than producing frames into a void.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::pipeline::{Pipeline, STREAM_BOUNDARY};

const MAX_REQUEST_BYTES: usize = 8192;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>veilcam</title></head>
<body style="margin:0;background:#111;color:#eee;font-family:sans-serif">
<h3 style="margin:8px">veilcam live</h3>
<img src="/stream" alt="live stream" style="display:block;margin:8px">
</body>
</html>
"#;

/// Builds a fresh pipeline for each stream request. The factory runs on the
/// server thread; the camera handle lives inside the pipeline it returns.
pub type PipelineFactory = Box<dyn FnMut() -> Result<Pipeline> + Send>;

pub struct StreamServer {
    addr: String,
    factory: PipelineFactory,
}

#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal shutdown and wait for the accept loop to exit. An active
    /// stream notices the flag at its next frame and winds down on its own.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream server thread panicked"))?;
        }
        Ok(())
    }
}

impl StreamServer {
    pub fn new(addr: impl Into<String>, factory: PipelineFactory) -> Self {
        Self {
            addr: addr.into(),
            factory,
        }
    }

    pub fn spawn(self) -> Result<ServerHandle> {
        let configured_addr: SocketAddr = self.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let factory = self.factory;
        let join = std::thread::Builder::new()
            .name("veilcam-stream-server".into())
            .spawn(move || {
                if let Err(err) = run_server(listener, factory, shutdown_thread) {
                    log::error!("stream server stopped: {:#}", err);
                }
            })?;

        Ok(ServerHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(
    listener: TcpListener,
    mut factory: PipelineFactory,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let stream_active = Arc::new(AtomicBool::new(false));
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(
                    stream,
                    &mut factory,
                    stream_active.clone(),
                    shutdown.clone(),
                ) {
                    log::warn!("stream request failed: {:#}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    factory: &mut PipelineFactory,
    stream_active: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    match request.path.as_str() {
        "/" => write_response(&mut stream, 200, "text/html; charset=utf-8", INDEX_HTML.as_bytes()),
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/stream" => {
            // Single-consumer contract: the camera is exclusively owned.
            if stream_active.swap(true, Ordering::SeqCst) {
                write_json_response(&mut stream, 503, r#"{"error":"stream_busy"}"#)?;
                return Ok(());
            }
            let pipeline = match factory() {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    stream_active.store(false, Ordering::SeqCst);
                    write_json_response(&mut stream, 500, r#"{"error":"pipeline_unavailable"}"#)?;
                    return Err(err);
                }
            };
            let worker_active = stream_active.clone();
            let spawned = std::thread::Builder::new()
                .name("veilcam-stream".into())
                .spawn(move || {
                    serve_stream(stream, pipeline, shutdown);
                    worker_active.store(false, Ordering::SeqCst);
                });
            if let Err(err) = spawned {
                stream_active.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
            Ok(())
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

/// Drive the pipeline into the socket until it drains, faults, the consumer
/// disconnects, or shutdown is requested.
fn serve_stream(mut stream: TcpStream, mut pipeline: Pipeline, shutdown: Arc<AtomicBool>) {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        STREAM_BOUNDARY
    );
    if let Err(err) = stream.write_all(header.as_bytes()) {
        log::info!("stream consumer went away before the first frame: {}", err);
        pipeline.close();
        return;
    }

    let cancel = pipeline.cancel_flag();
    for chunk in &mut pipeline {
        if shutdown.load(Ordering::SeqCst) {
            cancel.store(true, Ordering::SeqCst);
            break;
        }
        if let Err(err) = stream.write_all(&chunk) {
            log::info!("stream consumer disconnected: {}", err);
            break;
        }
    }

    let stats = pipeline.stats();
    log::info!(
        "stream ended in state {:?}: yielded={} skipped={} detections={} sink_failures={}",
        pipeline.state(),
        stats.frames_yielded,
        stats.frames_skipped,
        stats.detections,
        stats.sink_failures
    );
    pipeline.close();
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
