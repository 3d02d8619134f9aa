//! WebSocket transport.
//!
//! Each channel runs on its own task: connect, report `Opened`, then forward
//! outbound frames to the socket and inbound text frames to the event queue
//! until the socket closes or the channel is cancelled. Binary frames are
//! accepted only as valid UTF-8; anything else is reported as `Malformed`.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelEvent, ChannelEventKind, ChannelHandle, Epoch, EventSender, Transport};
use crate::error::ResearchError;

pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, epoch: Epoch, events: EventSender) -> Box<dyn ChannelHandle> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let cancel = CancellationToken::new();
        tokio::spawn(run_socket(
            self.url.clone(),
            epoch,
            events,
            outbound_rx,
            cancel.clone(),
        ));
        Box::new(WebSocketChannel {
            outbound: Some(outbound_tx),
            cancel,
        })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct WebSocketChannel {
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
}

impl ChannelHandle for WebSocketChannel {
    fn send(&mut self, frame: String) -> Result<(), ResearchError> {
        let Some(outbound) = self.outbound.as_ref() else {
            return Err(ResearchError::Connection("channel already closed".to_string()));
        };
        outbound
            .send(frame)
            .map_err(|_| ResearchError::Connection("socket task has stopped".to_string()))
    }

    fn close(&mut self) {
        self.outbound = None;
        self.cancel.cancel();
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_socket(
    url: String,
    epoch: Epoch,
    events: EventSender,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let emit = |kind: ChannelEventKind| {
        let _ = events.send(ChannelEvent::new(epoch, kind));
    };

    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio_tungstenite::connect_async(url.as_str()) => result,
    };

    let ws_stream = match connected {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!("research channel {epoch}: connect to {url} failed: {e}");
            emit(ChannelEventKind::OpenFailed(e.to_string()));
            return;
        }
    };
    info!("research channel {epoch}: connected to {url}");
    emit(ChannelEventKind::Opened);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                debug!("research channel {epoch}: closed by client");
                return;
            }
            Some(frame) = outbound.recv() => {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    emit(ChannelEventKind::Closed(Some(format!("send failed: {e}"))));
                    return;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => emit(ChannelEventKind::Frame(text)),
                    Some(Ok(Message::Binary(bytes))) => emit(binary_frame(bytes)),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                        emit(ChannelEventKind::Closed(reason));
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        emit(ChannelEventKind::Closed(Some(e.to_string())));
                        return;
                    }
                    None => {
                        emit(ChannelEventKind::Closed(None));
                        return;
                    }
                }
            }
        }
    }
}

fn binary_frame(bytes: Vec<u8>) -> ChannelEventKind {
    match String::from_utf8(bytes) {
        Ok(text) => ChannelEventKind::Frame(text),
        Err(e) => ChannelEventKind::Malformed {
            reason: format!("binary frame is not valid UTF-8: {}", e.utf8_error()),
            raw: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        },
    }
}
