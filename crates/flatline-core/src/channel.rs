//! Bounded FIFO channels between pipeline stages.
//!
//! A thin layer over `std::sync::mpsc::sync_channel` that carries an in-band
//! end marker. A full channel blocks the sender; the marker travels through
//! the same queue as the data, so it is always observed after every item
//! that was sent before it.

use std::fmt;
use std::sync::mpsc::{self, SyncSender};

/// Envelope for everything that travels through a pipeline channel
#[derive(Debug, PartialEq)]
pub enum Message<T> {
    Item(T),
    /// No further items will be sent on this channel
    End,
}

/// The other side of the channel is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

impl fmt::Display for Disconnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("channel disconnected")
    }
}

impl std::error::Error for Disconnected {}

/// Create a bounded channel holding at most `capacity` messages.
///
/// `capacity` must be at least 1; `PipelineConfig::validate` enforces this
/// before any channel is built.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    debug_assert!(capacity > 0, "rendezvous channels are not supported");
    let (tx, rx) = mpsc::sync_channel(capacity);
    (Sender { inner: tx }, Receiver { inner: rx })
}

/// Producer half. Cloneable: output channels have many producers.
pub struct Sender<T> {
    inner: SyncSender<Message<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

impl<T> Sender<T> {
    /// Push an item, blocking while the channel is full.
    pub fn send(&self, item: T) -> Result<(), Disconnected> {
        self.inner.send(Message::Item(item)).map_err(|_| Disconnected)
    }

    /// Push the end marker. Consumes this handle, so one handle can only
    /// ever mark its channel once.
    pub fn finish(self) -> Result<(), Disconnected> {
        self.inner.send(Message::End).map_err(|_| Disconnected)
    }
}

/// Consumer half. Not cloneable: every channel has exactly one consumer.
pub struct Receiver<T> {
    inner: mpsc::Receiver<Message<T>>,
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

impl<T> Receiver<T> {
    /// Block until the next message arrives.
    ///
    /// Returns `Disconnected` when every sender was dropped without the
    /// channel being marked finished.
    pub fn recv(&self) -> Result<Message<T>, Disconnected> {
        self.inner.recv().map_err(|_| Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fifo_then_end() {
        let (tx, rx) = bounded(4);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        tx.finish().unwrap();
        assert_eq!(rx.recv(), Ok(Message::Item(1)));
        assert_eq!(rx.recv(), Ok(Message::Item(2)));
        assert_eq!(rx.recv(), Ok(Message::End));
    }

    #[test]
    fn full_channel_blocks_sender() {
        let (tx, rx) = bounded(1);
        let sent = Arc::new(AtomicUsize::new(0));

        let counter = sent.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..3 {
                tx.send(i).unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Give the producer time to fill the single slot and block
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sent.load(Ordering::SeqCst), 1);

        for expected in 0..3 {
            assert_eq!(rx.recv(), Ok(Message::Item(expected)));
        }
        handle.join().unwrap();
        assert_eq!(sent.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn send_fails_after_receiver_dropped() {
        let (tx, rx) = bounded::<u8>(2);
        drop(rx);
        assert_eq!(tx.send(1), Err(Disconnected));
        assert_eq!(tx.finish(), Err(Disconnected));
    }

    #[test]
    fn recv_fails_when_senders_dropped_without_end() {
        let (tx, rx) = bounded::<u8>(2);
        let tx2 = tx.clone();
        drop(tx);
        tx2.send(7).unwrap();
        drop(tx2);
        assert_eq!(rx.recv(), Ok(Message::Item(7)));
        assert_eq!(rx.recv(), Err(Disconnected));
    }

    #[test]
    fn many_producers_one_consumer() {
        let (tx, rx) = bounded(2);
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        tx.send(p * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        drop(tx);

        let mut got = Vec::new();
        while let Ok(Message::Item(v)) = rx.recv() {
            got.push(v);
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(got.len(), 400);

        // Per-producer order is preserved
        for p in 0..4 {
            let mine: Vec<_> = got.iter().filter(|v| **v / 1000 == p).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
