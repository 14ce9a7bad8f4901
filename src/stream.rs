//! Annotated-frame stream server.
//!
//! Serves the most recent frame from a `LatestFrameSink` over plain HTTP:
//!
//! - `GET /health`      → `{"status":"ok","frames":N}`
//! - `GET /frame.jpg`   → latest JPEG snapshot (404 until the first frame)
//! - `GET /stream.mjpg` → multipart MJPEG stream, one part per new frame
//!
//! Each MJPEG client gets its own thread; snapshot and health requests are
//! answered on the accept thread.

use anyhow::{anyhow, Result};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::output::LatestFrameSink;

const MAX_REQUEST_BYTES: usize = 8192;
const MJPEG_BOUNDARY: &str = "visionbridgeframe";
const FRAME_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct StreamHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct StreamServer {
    addr: String,
    frames: LatestFrameSink,
}

impl StreamServer {
    pub fn new(addr: impl Into<String>, frames: LatestFrameSink) -> Self {
        Self {
            addr: addr.into(),
            frames,
        }
    }

    pub fn spawn(self) -> Result<StreamHandle> {
        let configured_addr: SocketAddr = self.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let frames = self.frames;
        let join = std::thread::Builder::new()
            .name("stream-server".to_string())
            .spawn(move || {
                if let Err(err) = run_server(listener, frames, shutdown_thread) {
                    log::error!("stream server stopped: {}", err);
                }
            })?;

        Ok(StreamHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(
    listener: TcpListener,
    frames: LatestFrameSink,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &frames, &shutdown) {
                    log::warn!("stream request rejected: {}", err);
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
    frames: &LatestFrameSink,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_response(&mut stream, 405, "application/json", br#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }
    match request.path.as_str() {
        "/health" => {
            let body = format!(r#"{{"status":"ok","frames":{}}}"#, frames.sequence());
            write_response(&mut stream, 200, "application/json", body.as_bytes())
        }
        "/frame.jpg" => match frames.latest() {
            Some((_, jpeg)) => write_response(&mut stream, 200, "image/jpeg", &jpeg),
            None => write_response(&mut stream, 404, "application/json", br#"{"error":"no_frame"}"#),
        },
        "/stream.mjpg" => {
            let frames = frames.clone();
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("mjpeg-client".to_string())
                .spawn(move || {
                    if let Err(err) = serve_mjpeg(stream, frames, shutdown) {
                        log::debug!("mjpeg client disconnected: {}", err);
                    }
                })?;
            Ok(())
        }
        _ => write_response(&mut stream, 404, "application/json", br#"{"error":"not_found"}"#),
    }
}

fn serve_mjpeg(
    mut stream: TcpStream,
    frames: LatestFrameSink,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        MJPEG_BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let mut last_sequence = 0;
    while !shutdown.load(Ordering::SeqCst) {
        let Some((sequence, jpeg)) = frames.wait_newer(last_sequence, FRAME_WAIT) else {
            continue;
        };
        last_sequence = sequence;
        let part = format!(
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            MJPEG_BOUNDARY,
            jpeg.len()
        );
        stream.write_all(part.as_bytes())?;
        stream.write_all(&jpeg)?;
        stream.write_all(b"\r\n")?;
    }
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
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
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
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
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}
