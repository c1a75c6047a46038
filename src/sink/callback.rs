//! Callback sink worker
//!
//! One thread per callback sink. The callback runs on that thread only, so it
//! is never invoked concurrently with itself, and no lock is held while it
//! runs.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::media::Frame;

use super::entry::{Miss, Sink, Worker};

/// Per-frame callback of a callback sink
pub type FrameCallback = Box<dyn FnMut(&Frame) + Send>;

/// Start the delivery thread of `sink`
pub(crate) fn spawn(sink: &Arc<Sink>, mut callback: FrameCallback, poll: Duration) -> Result<()> {
    let weak: Weak<Sink> = Arc::downgrade(sink);
    let thread = std::thread::Builder::new()
        .name(format!("sink-{}", sink.name()))
        .spawn(move || {
            loop {
                let Some(sink) = weak.upgrade() else {
                    break;
                };
                match sink.next_frame(None, poll) {
                    Ok(frame) => {
                        drop(sink);
                        callback(&frame);
                    }
                    Err(Miss::Released) => break,
                    Err(Miss::NotBound | Miss::Disabled | Miss::SourceGone) => {
                        sink.wait_ready(poll);
                    }
                    Err(Miss::SourceError(message)) => sink.set_error(&message),
                    Err(Miss::Rebound | Miss::TimedOut) => {}
                }
            }
            tracing::debug!("Callback sink thread exiting");
        })
        .map_err(|e| Error::ResourceNotAvailable(format!("failed to start sink thread: {}", e)))?;

    sink.set_worker(Worker::Thread(thread));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;
    use crate::media::{Image, PixelFormat};
    use crate::notifier::Notifier;
    use crate::registry::{Handle, HandleKind};
    use crate::sink::SinkKind;
    use crate::source::{Source, SourceInit, SourceKind};
    use crate::sync::lock;

    const POLL: Duration = Duration::from_millis(20);

    fn frame(time: u64) -> Frame {
        Frame::new(Image::new(PixelFormat::Gray, 1, 1, vec![0u8]), time)
    }

    fn callback_sink() -> (Arc<Sink>, std_mpsc::Receiver<u64>) {
        let sink = Arc::new(Sink::new(
            Handle::new(HandleKind::Sink, 0, 0),
            "cb",
            SinkKind::Callback,
            String::new(),
        ));
        let (tx, rx) = std_mpsc::channel();
        let tx = Mutex::new(tx);
        spawn(
            &sink,
            Box::new(move |f: &Frame| {
                let _ = lock(&tx).send(f.time);
            }),
            POLL,
        )
        .unwrap();
        (sink, rx)
    }

    fn source() -> Arc<Source> {
        Arc::new(Source::new(
            Handle::new(HandleKind::Source, 0, 0),
            &SourceInit::new("cam0", SourceKind::Injected),
        ))
    }

    /// Publish until the worker has picked up the binding and seen a frame
    fn prime(source: &Source, rx: &std_mpsc::Receiver<u64>) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            assert!(Instant::now() < deadline, "callback never ran");
            source.put_frame(frame(1));
            if rx.recv_timeout(Duration::from_millis(20)).is_ok() {
                break;
            }
        }
    }

    /// Next delivered time, skipping late priming frames
    fn next_time(rx: &std_mpsc::Receiver<u64>, timeout: Duration) -> Option<u64> {
        loop {
            match rx.recv_timeout(timeout) {
                Ok(1) => continue,
                Ok(time) => return Some(time),
                Err(_) => return None,
            }
        }
    }

    #[test]
    fn test_callback_sees_new_frames() {
        let (sink, rx) = callback_sink();
        let source = source();
        sink.bind(Some(Arc::clone(&source)));
        prime(&source, &rx);

        source.put_frame(frame(42));
        assert_eq!(next_time(&rx, Duration::from_secs(2)), Some(42));
    }

    #[test]
    fn test_disabled_callback_is_silent() {
        let notifier = Notifier::new("callback-test");
        let (sink, rx) = callback_sink();
        let source = source();
        sink.bind(Some(Arc::clone(&source)));
        prime(&source, &rx);

        sink.set_enabled(false, &notifier);
        source.put_frame(frame(7));
        assert_eq!(next_time(&rx, Duration::from_millis(100)), None);

        sink.set_enabled(true, &notifier);
        prime(&source, &rx);
        source.put_frame(frame(8));
        assert_eq!(next_time(&rx, Duration::from_secs(2)), Some(8));
    }

    #[test]
    fn test_retire_stops_thread() {
        let (sink, rx) = callback_sink();
        let source = source();
        sink.bind(Some(Arc::clone(&source)));
        prime(&source, &rx);

        sink.retire();
        source.put_frame(frame(9));
        assert_eq!(next_time(&rx, Duration::from_millis(100)), None);
    }
}
