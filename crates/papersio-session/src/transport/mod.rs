//! Channel transports.
//!
//! A transport opens channels and reports everything that happens on them as
//! [`ChannelEvent`]s on one queue. Each event carries the epoch the channel was
//! opened with, so the controller can drop events from channels it has already
//! torn down.

pub mod memory;
pub mod websocket;

use tokio::sync::mpsc;

use crate::error::ResearchError;

pub use memory::{MemoryLog, MemoryTransport};
pub use websocket::WebSocketTransport;

pub type Epoch = u64;

pub type EventSender = mpsc::UnboundedSender<ChannelEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ChannelEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEventKind {
    Opened,
    OpenFailed(String),
    Frame(String),
    /// A frame arrived that could not be turned into text. `raw` is a lossy
    /// rendering kept for diagnostics only.
    Malformed { reason: String, raw: String },
    Closed(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub epoch: Epoch,
    pub kind: ChannelEventKind,
}

impl ChannelEvent {
    pub fn new(epoch: Epoch, kind: ChannelEventKind) -> Self {
        Self { epoch, kind }
    }

    pub fn frame(epoch: Epoch, raw: impl Into<String>) -> Self {
        Self::new(epoch, ChannelEventKind::Frame(raw.into()))
    }
}

/// The client end of one open (or opening) channel.
pub trait ChannelHandle: Send {
    fn send(&mut self, frame: String) -> Result<(), ResearchError>;

    /// Closes the channel. Takes effect before returning; later events from
    /// this channel may still be queued and are the caller's to ignore.
    fn close(&mut self);
}

pub trait Transport: Send {
    /// Starts opening a channel. Completion is reported as `Opened` or
    /// `OpenFailed` on `events`, tagged with `epoch`.
    fn open(&mut self, epoch: Epoch, events: EventSender) -> Box<dyn ChannelHandle>;

    /// Where this transport connects, for logs and messages.
    fn endpoint(&self) -> String;
}
