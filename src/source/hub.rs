//! Latest-frame slot of a source
//!
//! Blocking consumers wait on a condition variable; async consumers (the
//! MJPEG server) subscribe to a `watch` channel. Both see the same frame,
//! shared through `Bytes` reference counting.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::media::Frame;
use crate::sync::{lock, wait_timeout};

/// Position of one consumer in a source's frame and error streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub frame_seq: u64,
    pub error_seq: u64,
}

/// Why a consumer stopped waiting before a frame arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Disabled,
    Released,
    Rebound,
}

/// Outcome of waiting on a hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wait {
    Frame(Frame, Cursor),
    Error(String, Cursor),
    Closed,
    TimedOut,
    Interrupted(Interrupt),
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<Frame>,
    frame_seq: u64,
    error_seq: u64,
    error: String,
    closed: bool,
}

impl Slot {
    fn cursor(&self) -> Cursor {
        Cursor {
            frame_seq: self.frame_seq,
            error_seq: self.error_seq,
        }
    }
}

#[derive(Debug)]
pub struct FrameHub {
    slot: Mutex<Slot>,
    cond: Condvar,
    tx: watch::Sender<Option<Frame>>,
}

impl FrameHub {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            slot: Mutex::new(Slot::default()),
            cond: Condvar::new(),
            tx,
        }
    }

    /// Store a frame and wake every waiter
    pub fn publish(&self, frame: Frame) {
        let mut slot = lock(&self.slot);
        if slot.closed {
            return;
        }
        slot.latest = Some(frame.clone());
        slot.frame_seq += 1;
        self.cond.notify_all();
        drop(slot);

        self.tx.send_replace(Some(frame));
    }

    /// Record an error state and wake every waiter
    pub fn publish_error(&self, message: &str) {
        let mut slot = lock(&self.slot);
        slot.error.clear();
        slot.error.push_str(message);
        slot.error_seq += 1;
        self.cond.notify_all();
    }

    /// Wake waiters so they re-check their consumer's state
    pub fn wakeup(&self) {
        let _slot = lock(&self.slot);
        self.cond.notify_all();
    }

    /// Mark the source gone; waiters return [`Wait::Closed`]
    pub fn close(&self) {
        let mut slot = lock(&self.slot);
        slot.closed = true;
        self.cond.notify_all();
    }

    pub fn cursor(&self) -> Cursor {
        lock(&self.slot).cursor()
    }

    /// Capture time of the latest frame, 0 if none
    pub fn last_frame_time(&self) -> u64 {
        lock(&self.slot).latest.as_ref().map_or(0, |f| f.time)
    }

    pub fn latest(&self) -> Option<Frame> {
        lock(&self.slot).latest.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.tx.subscribe()
    }

    /// Block until something newer than `cursor` happens
    ///
    /// `interrupted` runs under the slot lock on every wakeup, so a consumer
    /// flag stored before [`FrameHub::wakeup`] is never missed. `poll` bounds
    /// each sleep.
    pub fn wait<F>(&self, cursor: Cursor, deadline: Option<Instant>, poll: Duration, mut interrupted: F) -> Wait
    where
        F: FnMut() -> Option<Interrupt>,
    {
        let mut slot = lock(&self.slot);
        loop {
            if let Some(interrupt) = interrupted() {
                return Wait::Interrupted(interrupt);
            }
            if slot.closed {
                return Wait::Closed;
            }
            if slot.frame_seq > cursor.frame_seq {
                if let Some(frame) = slot.latest.clone() {
                    return Wait::Frame(frame, slot.cursor());
                }
            }
            if slot.error_seq > cursor.error_seq {
                return Wait::Error(slot.error.clone(), slot.cursor());
            }

            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Wait::TimedOut;
                    }
                    (deadline - now).min(poll)
                }
                None => poll,
            };
            slot = wait_timeout(&self.cond, slot, timeout);
        }
    }
}

impl Default for FrameHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::media::{Image, PixelFormat};

    fn frame(time: u64) -> Frame {
        Frame::new(Image::new(PixelFormat::Gray, 1, 1, vec![time as u8]), time)
    }

    const POLL: Duration = Duration::from_millis(20);

    #[test]
    fn test_wait_returns_newer_frame() {
        let hub = FrameHub::new();
        let start = hub.cursor();
        hub.publish(frame(5));

        match hub.wait(start, None, POLL, || None) {
            Wait::Frame(f, cursor) => {
                assert_eq!(f.time, 5);
                assert_eq!(cursor.frame_seq, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(hub.last_frame_time(), 5);
    }

    #[test]
    fn test_wait_times_out_without_frames() {
        let hub = FrameHub::new();
        hub.publish(frame(1));
        let cursor = hub.cursor();

        let deadline = Instant::now() + Duration::from_millis(50);
        assert_eq!(hub.wait(cursor, Some(deadline), POLL, || None), Wait::TimedOut);
    }

    #[test]
    fn test_error_is_delivered_once() {
        let hub = FrameHub::new();
        let cursor = hub.cursor();
        hub.publish_error("device unplugged");

        let cursor = match hub.wait(cursor, None, POLL, || None) {
            Wait::Error(msg, cursor) => {
                assert_eq!(msg, "device unplugged");
                cursor
            }
            other => panic!("unexpected {:?}", other),
        };

        let deadline = Instant::now() + Duration::from_millis(30);
        assert_eq!(hub.wait(cursor, Some(deadline), POLL, || None), Wait::TimedOut);
    }

    #[test]
    fn test_interrupt_releases_blocked_waiter() {
        let hub = Arc::new(FrameHub::new());
        let stop = Arc::new(AtomicBool::new(false));

        let waiter = {
            let hub = Arc::clone(&hub);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                hub.wait(hub.cursor(), None, Duration::from_secs(60), || {
                    stop.load(Ordering::Acquire).then_some(Interrupt::Disabled)
                })
            })
        };

        std::thread::sleep(Duration::from_millis(30));
        stop.store(true, Ordering::Release);
        hub.wakeup();

        assert_eq!(waiter.join().unwrap(), Wait::Interrupted(Interrupt::Disabled));
    }

    #[test]
    fn test_close_wakes_and_rejects_frames() {
        let hub = FrameHub::new();
        let cursor = hub.cursor();
        hub.close();
        hub.publish(frame(9));

        assert_eq!(hub.wait(cursor, None, POLL, || None), Wait::Closed);
        assert_eq!(hub.last_frame_time(), 0);
    }

    #[tokio::test]
    async fn test_watch_subscribers_see_frames() {
        let hub = FrameHub::new();
        let mut rx = hub.subscribe();

        hub.publish(frame(3));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().map(|f| f.time), Some(3));
    }
}
