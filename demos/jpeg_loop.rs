//! Stream a still JPEG over MJPEG-over-HTTP
//!
//! Run with: cargo run --example jpeg_loop <FILE.jpg> [PORT]
//!
//! Then open http://localhost:8080/ in a browser, or:
//!   ffplay http://localhost:8080/
//!
//! The file is pushed into an injected source ten times a second. A listener
//! prints every source/sink event, and a callback sink counts delivered frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camhub::{Context, EventMask, Frame, Image, PixelFormat, RawEvent, VideoMode};

fn print_usage() {
    eprintln!("Usage: jpeg_loop <FILE.jpg> [PORT]");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        print_usage();
        std::process::exit(1);
    };
    let port: u16 = match args.next() {
        Some(p) => p.parse()?,
        None => 8080,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camhub=debug".parse()?),
        )
        .init();

    let jpeg = std::fs::read(&path)?;
    let ctx = Context::new();

    ctx.add_listener(
        |event: &RawEvent| println!("[event] {:?} {} {}", event.kind, event.handle, event.name),
        EventMask::all(),
        true,
    )?;

    let mode = VideoMode::new(PixelFormat::Mjpeg, 640, 480, 10);
    let source = ctx.create_cv_source("still", mode)?;
    ctx.set_source_description(source, &path)?;
    ctx.set_source_connected(source, true)?;

    let server = ctx.create_mjpeg_server("http", "", port)?;
    ctx.set_sink_source(server, source)?;

    let delivered = Arc::new(AtomicU64::new(0));
    let counter = {
        let delivered = Arc::clone(&delivered);
        ctx.create_cv_sink_callback(
            "counter",
            Box::new(move |_: &Frame| {
                delivered.fetch_add(1, Ordering::Relaxed);
            }),
        )?
    };
    ctx.set_sink_source(counter, source)?;

    println!("Streaming {} on http://localhost:{}/", path, port);

    loop {
        ctx.put_frame(source, Image::new(PixelFormat::Mjpeg, mode.width, mode.height, jpeg.clone()))?;
        std::thread::sleep(Duration::from_millis(100));

        let n = delivered.load(Ordering::Relaxed);
        if n > 0 && n % 100 == 0 {
            println!("Delivered {} frames", n);
        }
    }
}
