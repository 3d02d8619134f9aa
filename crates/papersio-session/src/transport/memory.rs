//! In-memory transport for driving the controller without network I/O.
//!
//! Clones share one [`MemoryLog`], so a test can keep a clone after handing the
//! transport to the controller and then inspect what was opened, sent and
//! closed, or inject events on any channel it opened.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ChannelEvent, ChannelEventKind, ChannelHandle, Epoch, EventSender, Transport};
use crate::error::ResearchError;

#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    pub opened: Vec<Epoch>,
    pub closed: Vec<Epoch>,
    pub sent: Vec<(Epoch, String)>,
    pub open_now: usize,
    pub peak_open: usize,
}

#[derive(Default)]
struct Shared {
    log: MemoryLog,
    senders: HashMap<Epoch, EventSender>,
    fail_next_open: Option<String>,
    auto_open: bool,
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `Opened` as soon as a channel is opened.
    pub fn auto_open() -> Self {
        let transport = Self::default();
        transport.shared.lock().auto_open = true;
        transport
    }

    /// The next `open` reports `OpenFailed(reason)` instead of opening.
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.shared.lock().fail_next_open = Some(reason.into());
    }

    pub fn log(&self) -> MemoryLog {
        self.shared.lock().log.clone()
    }

    /// Queues an event as if it arrived on the channel opened with `epoch`.
    /// Works after the channel was closed, which is how late frames are
    /// simulated. Returns false if no channel was ever opened with `epoch`.
    pub fn inject(&self, epoch: Epoch, kind: ChannelEventKind) -> bool {
        let shared = self.shared.lock();
        match shared.senders.get(&epoch) {
            Some(sender) => sender.send(ChannelEvent::new(epoch, kind)).is_ok(),
            None => false,
        }
    }

    pub fn inject_frame(&self, epoch: Epoch, raw: &str) -> bool {
        self.inject(epoch, ChannelEventKind::Frame(raw.to_string()))
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, epoch: Epoch, events: EventSender) -> Box<dyn ChannelHandle> {
        let mut shared = self.shared.lock();
        shared.log.opened.push(epoch);
        shared.log.open_now += 1;
        shared.log.peak_open = shared.log.peak_open.max(shared.log.open_now);
        shared.senders.insert(epoch, events.clone());

        if let Some(reason) = shared.fail_next_open.take() {
            let _ = events.send(ChannelEvent::new(epoch, ChannelEventKind::OpenFailed(reason)));
        } else if shared.auto_open {
            let _ = events.send(ChannelEvent::new(epoch, ChannelEventKind::Opened));
        }

        Box::new(MemoryChannel {
            epoch,
            shared: self.shared.clone(),
            closed: false,
        })
    }

    fn endpoint(&self) -> String {
        "memory://".to_string()
    }
}

struct MemoryChannel {
    epoch: Epoch,
    shared: Arc<Mutex<Shared>>,
    closed: bool,
}

impl ChannelHandle for MemoryChannel {
    fn send(&mut self, frame: String) -> Result<(), ResearchError> {
        if self.closed {
            return Err(ResearchError::Connection("channel already closed".to_string()));
        }
        self.shared.lock().log.sent.push((self.epoch, frame));
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut shared = self.shared.lock();
        shared.log.closed.push(self.epoch);
        shared.log.open_now = shared.log.open_now.saturating_sub(1);
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}
