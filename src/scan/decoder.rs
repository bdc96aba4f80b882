use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeEvent {
    pub text: String,
    pub at: Instant,
}

/// A subscription to decoded text coming off a camera feed or image frame.
pub trait Decoder {
    /// Next pending event, or `None` when nothing is queued or the
    /// subscription was cancelled.
    fn try_next(&mut self) -> Option<DecodeEvent>;

    /// Stop capture. Later events are discarded.
    fn cancel(&mut self);

    fn is_cancelled(&self) -> bool;
}

/// Producer side of a [`ChannelDecoder`].
#[derive(Debug, Clone)]
pub struct DecoderFeed {
    tx: Sender<DecodeEvent>,
    cancelled: Arc<AtomicBool>,
}

impl DecoderFeed {
    /// Queue one decoded value. Returns `false` once the subscription is gone.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.push_at(text, Instant::now())
    }

    pub fn push_at(&self, text: impl Into<String>, at: Instant) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        self.tx
            .send(DecodeEvent {
                text: text.into(),
                at,
            })
            .is_ok()
    }
}

#[derive(Debug)]
pub struct ChannelDecoder {
    rx: Receiver<DecodeEvent>,
    cancelled: Arc<AtomicBool>,
}

impl ChannelDecoder {
    pub fn new() -> (Self, DecoderFeed) {
        let (tx, rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            Self {
                rx,
                cancelled: Arc::clone(&cancelled),
            },
            DecoderFeed { tx, cancelled },
        )
    }
}

impl Decoder for ChannelDecoder {
    fn try_next(&mut self) -> Option<DecodeEvent> {
        if self.is_cancelled() {
            return None;
        }
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn cancel(&mut self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            while self.rx.try_recv().is_ok() {}
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (mut dec, feed) = ChannelDecoder::new();
        assert!(feed.push("A"));
        assert!(feed.push("B"));
        assert_eq!(dec.try_next().map(|e| e.text), Some("A".to_string()));
        assert_eq!(dec.try_next().map(|e| e.text), Some("B".to_string()));
        assert_eq!(dec.try_next(), None);
    }

    #[test]
    fn cancel_drops_queue_and_refuses_new_events() {
        let (mut dec, feed) = ChannelDecoder::new();
        feed.push("A");
        dec.cancel();
        assert!(dec.is_cancelled());
        assert_eq!(dec.try_next(), None);
        assert!(!feed.push("B"));
    }

    #[test]
    fn feed_can_push_from_another_thread() {
        let (mut dec, feed) = ChannelDecoder::new();
        let handle = std::thread::spawn(move || {
            for i in 0..3 {
                feed.push(format!("STD{}", i));
            }
        });
        handle.join().expect("producer thread");
        let got: Vec<String> = std::iter::from_fn(|| dec.try_next().map(|e| e.text)).collect();
        assert_eq!(got, vec!["STD0", "STD1", "STD2"]);
    }
}
