//! MJPEG-over-HTTP client session
//!
//! A client sends any `GET` request and receives a
//! `multipart/x-mixed-replace` response with one JPEG part per new frame of
//! the sink's bound source. The request is read only as far as the end of its
//! head; everything past the request line is ignored.

use std::sync::{Arc, Weak};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::media::{Frame, PixelFormat};
use crate::sink::Sink;
use crate::source::Source;

use super::config::StreamServerConfig;

/// Method and target of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
}

fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + 4)
        .or_else(|| buf.windows(2).position(|w| w == b"\n\n").map(|p| p + 2))
}

/// Parse the request line of a complete head
pub fn parse_request_line(head: &[u8]) -> Result<RequestHead> {
    let line_end = head
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(head.len());
    let line = std::str::from_utf8(&head[..line_end])
        .map_err(|_| Error::ReadFailed("request line is not utf-8".into()))?
        .trim_end_matches('\r');

    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version)) if version.starts_with("HTTP/") => {
            Ok(RequestHead {
                method: method.to_string(),
                path: path.to_string(),
            })
        }
        _ => Err(Error::ReadFailed(format!("malformed request line: {:?}", line))),
    }
}

/// Read until the blank line ending the request head
pub async fn read_request_head<R>(reader: &mut R, limit: usize) -> Result<RequestHead>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = head_end(&buf) {
            return parse_request_line(&buf[..end]);
        }
        if buf.len() >= limit {
            return Err(Error::ReadFailed("request head too large".into()));
        }
        if reader.read_buf(&mut buf).await? == 0 {
            return Err(Error::ReadFailed("connection closed before request".into()));
        }
    }
}

pub fn response_header(boundary: &str) -> Bytes {
    Bytes::from(format!(
        "HTTP/1.0 200 OK\r\n\
         Connection: close\r\n\
         Server: camhub\r\n\
         Cache-Control: no-store, no-cache, must-revalidate, max-age=0\r\n\
         Pragma: no-cache\r\n\
         Content-Type: multipart/x-mixed-replace;boundary={}\r\n\
         \r\n",
        boundary
    ))
}

/// Boundary line and part headers preceding one JPEG
pub fn part_header(boundary: &str, frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_slice(b"--");
    buf.put_slice(boundary.as_bytes());
    buf.put_slice(b"\r\nContent-Type: image/jpeg\r\n");
    buf.put_slice(format!("Content-Length: {}\r\n", frame.data().len()).as_bytes());
    buf.put_slice(format!("X-Timestamp: {}\r\n\r\n", frame.time).as_bytes());
    buf.freeze()
}

/// Wait for the next frame on `frames`, forever if there is no source
async fn next_frame(frames: &mut Option<watch::Receiver<Option<Frame>>>) -> Frame {
    loop {
        let Some(rx) = frames.as_mut() else {
            return std::future::pending().await;
        };
        if rx.changed().await.is_err() {
            // Source dropped its hub
            *frames = None;
            continue;
        }
        if let Some(frame) = rx.borrow_and_update().clone() {
            return frame;
        }
    }
}

fn subscribe(source: Option<&Arc<Source>>) -> Option<watch::Receiver<Option<Frame>>> {
    // A fresh receiver treats the current frame as seen
    source.map(|source| source.hub().subscribe())
}

enum Step {
    Rebound(bool),
    Frame(Frame),
}

/// Serve one client until it disconnects or the sink goes away
pub(crate) async fn serve<S>(sink: Weak<Sink>, socket: S, config: &StreamServerConfig) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, writer) = tokio::io::split(socket);
    let mut writer = BufWriter::with_capacity(config.write_buffer_size, writer);

    let head = tokio::time::timeout(
        config.request_timeout,
        read_request_head(&mut reader, super::config::MAX_REQUEST_HEAD),
    )
    .await
    .map_err(|_| Error::ReadFailed("timed out waiting for request".into()))??;

    if head.method != "GET" {
        writer
            .write_all(b"HTTP/1.0 405 Method Not Allowed\r\nConnection: close\r\n\r\n")
            .await?;
        writer.flush().await?;
        return Ok(());
    }

    let mut source_rx = {
        let sink = sink.upgrade().ok_or_else(|| Error::ResourceNotAvailable("sink released".into()))?;
        sink.watch_source()
    };
    let mut frames = subscribe(source_rx.borrow_and_update().as_ref());

    writer.write_all(&response_header(&config.boundary)).await?;
    writer.flush().await?;

    loop {
        let step = tokio::select! {
            changed = source_rx.changed() => Step::Rebound(changed.is_ok()),
            frame = next_frame(&mut frames) => Step::Frame(frame),
        };

        let frame = match step {
            Step::Rebound(false) => return Ok(()),
            Step::Rebound(true) => {
                frames = subscribe(source_rx.borrow_and_update().as_ref());
                continue;
            }
            Step::Frame(frame) => frame,
        };

        let Some(live) = sink.upgrade() else {
            return Ok(());
        };
        if !live.is_enabled() {
            continue;
        }
        if frame.pixel_format() != PixelFormat::Mjpeg {
            live.set_error(&format!(
                "cannot stream {} frames without an encoder",
                frame.pixel_format()
            ));
            continue;
        }
        drop(live);

        writer.write_all(&part_header(&config.boundary, &frame)).await?;
        writer.write_all(frame.data()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;
        tracing::trace!(time = frame.time, bytes = frame.data().len(), "Part sent");
    }
}
