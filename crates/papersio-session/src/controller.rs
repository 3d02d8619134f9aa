//! The research session controller.
//!
//! One controller owns one [`Session`] and at most one live channel. Every
//! change to the session happens here, in response to a user call (`start`,
//! `cancel`, `clear`) or a [`ChannelEvent`] passed to [`handle_event`]. After
//! each change the controller publishes a snapshot on a `watch` channel;
//! observers never see the session itself.
//!
//! Channels are tagged with an epoch that increases on every `start`. Events
//! are applied only when they carry the current epoch and the session is still
//! live, so frames still in flight from a cancelled or superseded channel are
//! dropped.
//!
//! [`handle_event`]: SessionController::handle_event

use std::time::Duration;

use chrono::Utc;
use papersio_observability::{emit_event, redact_text, ObservabilityEvent};
use papersio_wire::{ResearchMode, ResearchRequest};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Level};

use crate::assembler::assemble_response;
use crate::config::ClientConfig;
use crate::error::{classify, ControlError, ResearchError};
use crate::model::{InboundEvent, ResearchResponse, Session, SessionState, TerminalKind};
use crate::parser::parse_frame;
use crate::progress::compute_progress;
use crate::transport::{
    ChannelEvent, ChannelEventKind, ChannelHandle, Epoch, EventReceiver, EventSender, Transport,
};

const COMPONENT: &str = "session.controller";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub use_search: bool,
    pub mode: ResearchMode,
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            use_search: true,
            mode: ResearchMode::Ultra,
            idle_timeout: None,
        }
    }
}

impl From<&ClientConfig> for SessionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            use_search: config.use_search,
            mode: config.mode,
            idle_timeout: config.idle_timeout,
        }
    }
}

pub struct SessionController {
    transport: Box<dyn Transport>,
    options: SessionOptions,
    session: Session,
    epoch: Epoch,
    channel: Option<Box<dyn ChannelHandle>>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    snapshots: watch::Sender<Session>,
}

enum Received {
    Event(ChannelEvent),
    IdleElapsed,
}

impl SessionController {
    pub fn new(transport: impl Transport + 'static, options: SessionOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Session::idle();
        let (snapshots, _) = watch::channel(session.clone());
        Self {
            transport: Box::new(transport),
            options,
            session,
            epoch: 0,
            channel: None,
            events_tx,
            events_rx,
            snapshots,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.session.clone()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn has_live_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    /// Begins a new session for `query`, replacing whatever came before. A
    /// live channel is closed before the new one is opened.
    pub fn start(&mut self, query: &str) -> Result<Epoch, ControlError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchError::EmptyQuery.into());
        }

        if self.channel.is_some() {
            debug!(
                "superseding live session {} (epoch {})",
                self.session.id, self.epoch
            );
            self.close_channel();
        }

        self.epoch += 1;
        self.session = Session::connecting(query.to_string());
        self.publish();

        let redacted = redact_text(query);
        self.observe(Level::INFO, "session.started", None, Some(redacted.as_str()));

        self.channel = Some(self.transport.open(self.epoch, self.events_tx.clone()));
        Ok(self.epoch)
    }

    /// Stops the live session. Anything its channel still delivers is ignored.
    pub fn cancel(&mut self) -> Result<(), ControlError> {
        if !self.session.is_live() {
            return Err(ControlError::IllegalTransition {
                operation: "cancel",
                state: self.session.state,
            });
        }
        self.close_channel();
        self.terminate(TerminalKind::Cancelled);
        self.observe(Level::INFO, "session.cancelled", None, None);
        Ok(())
    }

    /// Resets to a fresh idle session. Not allowed while a session is live.
    pub fn clear(&mut self) -> Result<(), ControlError> {
        if self.session.is_live() {
            return Err(ControlError::IllegalTransition {
                operation: "clear",
                state: self.session.state,
            });
        }
        self.session = Session::idle();
        self.publish();
        Ok(())
    }

    /// Applies one channel event. Returns false when the event was stale and
    /// left the session untouched.
    pub fn handle_event(&mut self, event: ChannelEvent) -> bool {
        if event.epoch != self.epoch || !self.session.is_live() {
            self.observe_stale(&event);
            return false;
        }

        match event.kind {
            ChannelEventKind::Opened => self.on_opened(),
            ChannelEventKind::OpenFailed(reason) => self.fail(ResearchError::Connection(reason)),
            ChannelEventKind::Frame(raw) => self.on_frame(&raw),
            ChannelEventKind::Malformed { reason, raw } => {
                self.fail(ResearchError::protocol(reason, &raw))
            }
            ChannelEventKind::Closed(reason) => {
                let reason = reason
                    .unwrap_or_else(|| "channel closed before a result arrived".to_string());
                self.fail(ResearchError::Connection(reason));
            }
        }
        true
    }

    /// Waits for the next queued channel event.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events_rx.recv().await
    }

    /// Processes events one at a time until the session is no longer live.
    /// Cancelling `cancel` cancels the session. The idle window restarts only
    /// when an event is applied; stale traffic from a superseded channel does
    /// not keep a silent session alive.
    pub async fn drive(&mut self, cancel: &CancellationToken) -> Session {
        let idle_timeout = self.options.idle_timeout;
        let mut deadline = idle_timeout.map(|after| Instant::now() + after);
        while self.session.is_live() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = self.cancel() {
                        debug!("cancel requested after the session ended: {e}");
                    }
                }
                received = recv_until(&mut self.events_rx, deadline) => match received {
                    Some(Received::Event(event)) => {
                        if self.handle_event(event) {
                            deadline = idle_timeout.map(|after| Instant::now() + after);
                        }
                    }
                    Some(Received::IdleElapsed) => {
                        let after = idle_timeout.unwrap_or_default();
                        self.fail(ResearchError::Timeout(after));
                    }
                    None => self.fail(ResearchError::Connection(
                        "event queue closed".to_string(),
                    )),
                },
            }
        }
        self.snapshot()
    }

    fn on_opened(&mut self) {
        if self.session.state != SessionState::Connecting {
            debug!("ignoring repeated open on epoch {}", self.epoch);
            return;
        }

        let request = ResearchRequest {
            query: self.session.query.clone(),
            use_search: self.options.use_search,
            mode: self.options.mode,
        };
        let frame = match serde_json::to_string(&request) {
            Ok(frame) => frame,
            Err(e) => {
                self.fail(ResearchError::Connection(format!("encode request: {e}")));
                return;
            }
        };
        let sent = match self.channel.as_mut() {
            Some(channel) => channel.send(frame),
            None => Err(ResearchError::Connection("no channel to send on".to_string())),
        };
        if let Err(e) = sent {
            self.fail(e);
            return;
        }

        self.session.state = SessionState::Open;
        self.publish();
        self.observe(Level::INFO, "session.opened", Some("open"), None);
    }

    fn on_frame(&mut self, raw: &str) {
        match parse_frame(raw) {
            Ok(InboundEvent::Status { stage, details }) => {
                let computed = compute_progress(&stage);
                self.session.displayed_progress = self.session.displayed_progress.max(computed);
                self.session.current_stage = stage;
                self.session.stage_details = details;
                self.publish();
                debug!(
                    "session {} stage `{}` -> {}% (shown {}%)",
                    self.session.id,
                    self.session.current_stage,
                    computed,
                    self.session.displayed_progress
                );
            }
            Ok(InboundEvent::Result { answer, sources }) => {
                let response = assemble_response(&self.session.query, answer, sources);
                self.complete(response);
            }
            Ok(InboundEvent::Error { message }) => self.fail(ResearchError::Remote(message)),
            Err(e) => self.fail(e),
        }
    }

    fn complete(&mut self, response: ResearchResponse) {
        self.close_channel();
        let source_count = response.sources().len().to_string();
        self.session.result = Some(response);
        self.terminate(TerminalKind::Completed);
        self.observe(
            Level::INFO,
            "session.completed",
            Some("completed"),
            Some(source_count.as_str()),
        );
    }

    fn fail(&mut self, error: ResearchError) {
        if !self.session.is_live() {
            debug!("dropping {error} for session that already ended");
            return;
        }
        self.close_channel();
        let failure = classify(&error);
        let code = failure.kind.code();
        // Raw frames stay in `failure.detail`; logs only get the reason.
        let log_detail = match &error {
            ResearchError::Protocol { reason, raw } => {
                format!("{reason} ({})", redact_text(raw))
            }
            other => other.to_string(),
        };
        self.session.error = Some(failure);
        self.terminate(TerminalKind::Failed);
        emit_event(
            Level::WARN,
            ObservabilityEvent {
                event: "session.failed",
                component: COMPONENT,
                session_id: Some(self.session.id.as_str()),
                epoch: Some(self.epoch),
                stage: Some(self.session.current_stage.as_str()),
                status: Some("failed"),
                error_code: Some(code),
                detail: Some(log_detail.as_str()),
            },
        );
    }

    fn terminate(&mut self, kind: TerminalKind) {
        self.session.state = SessionState::Terminated;
        self.session.terminal_kind = kind;
        self.session.finished_at = Some(Utc::now());
        self.publish();
    }

    fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.clone());
    }

    fn observe(&self, level: Level, event: &str, status: Option<&str>, detail: Option<&str>) {
        emit_event(
            level,
            ObservabilityEvent {
                event,
                component: COMPONENT,
                session_id: Some(self.session.id.as_str()),
                epoch: Some(self.epoch),
                stage: Some(self.session.current_stage.as_str()),
                status,
                error_code: None,
                detail,
            },
        );
    }

    fn observe_stale(&self, event: &ChannelEvent) {
        let kind = match &event.kind {
            ChannelEventKind::Opened => "opened",
            ChannelEventKind::OpenFailed(_) => "open_failed",
            ChannelEventKind::Frame(_) => "frame",
            ChannelEventKind::Malformed { .. } => "malformed",
            ChannelEventKind::Closed(_) => "closed",
        };
        emit_event(
            Level::DEBUG,
            ObservabilityEvent {
                event: "session.stale_event",
                component: COMPONENT,
                session_id: Some(self.session.id.as_str()),
                epoch: Some(event.epoch),
                status: Some(self.session.state.as_str()),
                detail: Some(kind),
                ..Default::default()
            },
        );
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.close_channel();
    }
}

async fn recv_until(rx: &mut EventReceiver, deadline: Option<Instant>) -> Option<Received> {
    match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(event) => event.map(Received::Event),
            Err(_) => Some(Received::IdleElapsed),
        },
        None => rx.recv().await.map(Received::Event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::MemoryTransport;

    fn controller() -> (SessionController, MemoryTransport) {
        let transport = MemoryTransport::new();
        let controller = SessionController::new(transport.clone(), SessionOptions::default());
        (controller, transport)
    }

    fn open(controller: &mut SessionController, query: &str) -> Epoch {
        let epoch = controller.start(query).unwrap();
        assert!(controller.handle_event(ChannelEvent::new(epoch, ChannelEventKind::Opened)));
        epoch
    }

    fn status(stage: &str) -> String {
        format!(r#"{{"type":"status","stage":"{stage}"}}"#)
    }

    #[test]
    fn empty_query_is_rejected_without_touching_the_session() {
        let (mut controller, transport) = controller();
        let before = controller.snapshot();
        let err = controller.start("   \n").unwrap_err();
        assert_eq!(err, ControlError::Rejected(ResearchError::EmptyQuery));
        assert_eq!(controller.snapshot(), before);
        assert!(transport.log().opened.is_empty());
    }

    #[test]
    fn start_sends_one_request_after_open() {
        let (mut controller, transport) = controller();
        let epoch = controller.start("  room-temperature superconductors ").unwrap();
        assert_eq!(controller.snapshot().state, SessionState::Connecting);
        assert!(transport.log().sent.is_empty());

        controller.handle_event(ChannelEvent::new(epoch, ChannelEventKind::Opened));
        let session = controller.snapshot();
        assert_eq!(session.state, SessionState::Open);
        assert_eq!(session.query, "room-temperature superconductors");

        // A duplicate open must not send a second request.
        controller.handle_event(ChannelEvent::new(epoch, ChannelEventKind::Opened));
        let sent = transport.log().sent;
        assert_eq!(sent.len(), 1);
        let request: ResearchRequest = serde_json::from_str(&sent[0].1).unwrap();
        assert_eq!(request.query, "room-temperature superconductors");
        assert!(request.use_search);
        assert_eq!(request.mode, ResearchMode::Ultra);
    }

    #[test]
    fn progress_never_regresses() {
        let (mut controller, _) = controller();
        let epoch = open(&mut controller, "q");
        let mut seen = Vec::new();
        for stage in ["Planning", "Writing", "Searching", "mystery", "Finished", "Planning"] {
            controller.handle_event(ChannelEvent::frame(epoch, status(stage)));
            seen.push(controller.snapshot().displayed_progress);
        }
        assert_eq!(seen, vec![18, 45, 45, 45, 100, 100]);
        assert_eq!(controller.snapshot().current_stage, "Planning");
    }

    #[test]
    fn unknown_first_stage_shows_minimal_progress() {
        let (mut controller, _) = controller();
        let epoch = open(&mut controller, "q");
        controller.handle_event(ChannelEvent::frame(epoch, status("Spinning up")));
        assert_eq!(controller.snapshot().displayed_progress, 8);
    }

    #[test]
    fn result_completes_and_closes_channel() {
        let (mut controller, transport) = controller();
        let epoch = open(&mut controller, "q");
        controller.handle_event(ChannelEvent::frame(
            epoch,
            r#"{"type":"result","answer":"42","sources":[{"title":"A","url":"http://x","source_type":"arxiv"}]}"#,
        ));
        let session = controller.snapshot();
        assert_eq!(session.state, SessionState::Terminated);
        assert_eq!(session.terminal_kind, TerminalKind::Completed);
        assert!(session.error.is_none());
        let result = session.result.unwrap();
        assert_eq!(result.answer(), "42");
        assert_eq!(result.sources()[0].title, "A");
        assert_eq!(transport.log().closed, vec![epoch]);
        assert!(!controller.has_live_channel());
    }

    #[test]
    fn remote_error_fails_with_verbatim_message() {
        let (mut controller, transport) = controller();
        let epoch = open(&mut controller, "q");
        controller.handle_event(ChannelEvent::frame(
            epoch,
            r#"{"type":"error","content":"Rate limit exceeded"}"#,
        ));
        let session = controller.snapshot();
        assert_eq!(session.terminal_kind, TerminalKind::Failed);
        let failure = session.error.unwrap();
        assert_eq!(failure.kind, ErrorKind::RemoteError);
        assert_eq!(failure.message, "Rate limit exceeded");
        assert!(session.result.is_none());
        assert_eq!(transport.log().closed, vec![epoch]);
    }

    #[test]
    fn bogus_frame_fails_instead_of_hanging() {
        let (mut controller, transport) = controller();
        let epoch = open(&mut controller, "q");
        controller.handle_event(ChannelEvent::frame(epoch, r#"{"type":"bogus"}"#));
        let session = controller.snapshot();
        assert_eq!(session.state, SessionState::Terminated);
        assert_eq!(session.terminal_kind, TerminalKind::Failed);
        assert_eq!(session.error.unwrap().kind, ErrorKind::ProtocolError);
        assert_eq!(transport.log().closed, vec![epoch]);
    }

    #[test]
    fn undecodable_frame_is_a_protocol_error() {
        let (mut controller, transport) = controller();
        let epoch = open(&mut controller, "q");
        assert!(controller.handle_event(ChannelEvent::new(
            epoch,
            ChannelEventKind::Malformed {
                reason: "binary frame is not valid UTF-8".to_string(),
                raw: "{\"type\":\"result\",\"answer\":\"caf\u{FFFD}\"}".to_string(),
            },
        )));
        let session = controller.snapshot();
        assert_eq!(session.terminal_kind, TerminalKind::Failed);
        assert!(session.result.is_none());
        let failure = session.error.unwrap();
        assert_eq!(failure.kind, ErrorKind::ProtocolError);
        assert!(!failure.message.contains('\u{FFFD}'));
        assert!(failure.detail.unwrap().starts_with("binary frame is not valid UTF-8"));
        assert_eq!(transport.log().closed, vec![epoch]);
    }

    #[test]
    fn open_failure_is_a_connection_error() {
        let (mut controller, transport) = controller();
        let epoch = controller.start("q").unwrap();
        controller.handle_event(ChannelEvent::new(
            epoch,
            ChannelEventKind::OpenFailed("connection refused".to_string()),
        ));
        let session = controller.snapshot();
        assert_eq!(session.terminal_kind, TerminalKind::Failed);
        let failure = session.error.unwrap();
        assert_eq!(failure.kind, ErrorKind::ConnectionError);
        assert_eq!(failure.detail.as_deref(), Some("connection refused"));
        assert!(transport.log().sent.is_empty());
    }

    #[test]
    fn drop_before_result_is_a_connection_error() {
        let (mut controller, _) = controller();
        let epoch = open(&mut controller, "q");
        controller.handle_event(ChannelEvent::frame(epoch, status("Analyzing")));
        controller.handle_event(ChannelEvent::new(epoch, ChannelEventKind::Closed(None)));
        let session = controller.snapshot();
        assert_eq!(session.error.unwrap().kind, ErrorKind::ConnectionError);
        assert_eq!(session.displayed_progress, 36);
    }

    #[test]
    fn late_frame_after_cancel_is_ignored() {
        let (mut controller, transport) = controller();
        let epoch = open(&mut controller, "q");
        controller.cancel().unwrap();
        assert_eq!(transport.log().closed, vec![epoch]);
        let cancelled = controller.snapshot();
        assert_eq!(cancelled.terminal_kind, TerminalKind::Cancelled);

        assert!(!controller.handle_event(ChannelEvent::frame(epoch, status("Finished"))));
        assert!(!controller.handle_event(ChannelEvent::frame(
            epoch,
            r#"{"type":"result","answer":"late"}"#
        )));
        assert_eq!(controller.snapshot(), cancelled);
    }

    #[test]
    fn cancel_is_only_legal_while_live() {
        let (mut controller, _) = controller();
        assert_eq!(
            controller.cancel(),
            Err(ControlError::IllegalTransition {
                operation: "cancel",
                state: SessionState::Idle
            })
        );
        let epoch = controller.start("q").unwrap();
        controller.cancel().unwrap();
        assert!(controller.cancel().is_err());
        assert_eq!(controller.epoch(), epoch);
    }

    #[test]
    fn clear_is_rejected_while_open() {
        let (mut controller, _) = controller();
        open(&mut controller, "q");
        let before = controller.snapshot();
        assert_eq!(
            controller.clear(),
            Err(ControlError::IllegalTransition {
                operation: "clear",
                state: SessionState::Open
            })
        );
        assert_eq!(controller.snapshot(), before);
    }

    #[test]
    fn clear_after_terminal_resets_everything() {
        let (mut controller, _) = controller();
        let epoch = open(&mut controller, "q");
        controller.handle_event(ChannelEvent::frame(epoch, status("Writing")));
        controller.handle_event(ChannelEvent::frame(epoch, r#"{"type":"error","content":"x"}"#));
        let failed_id = controller.snapshot().id;

        controller.clear().unwrap();
        let session = controller.snapshot();
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.terminal_kind, TerminalKind::None);
        assert_ne!(session.id, failed_id);
        assert!(session.error.is_none() && session.result.is_none());
        assert_eq!(session.displayed_progress, 0);
        assert!(session.current_stage.is_empty());
        controller.clear().unwrap();
    }

    #[test]
    fn restart_closes_previous_channel_first() {
        let (mut controller, transport) = controller();
        let first = open(&mut controller, "first");
        controller.handle_event(ChannelEvent::frame(first, status("Writing")));

        let second = controller.start("second").unwrap();
        assert!(second > first);
        let log = transport.log();
        assert_eq!(log.closed, vec![first]);
        assert_eq!(log.peak_open, 1);

        let session = controller.snapshot();
        assert_eq!(session.query, "second");
        assert_eq!(session.displayed_progress, 0);

        // Frames from the superseded channel do nothing.
        assert!(!controller.handle_event(ChannelEvent::frame(first, status("Finished"))));
        assert_eq!(controller.snapshot().displayed_progress, 0);
    }

    #[test]
    fn terminal_outcome_is_set_once() {
        let (mut controller, _) = controller();
        let epoch = open(&mut controller, "q");
        controller.handle_event(ChannelEvent::frame(epoch, r#"{"type":"result","answer":"a"}"#));
        let done = controller.snapshot();
        assert!(!controller.handle_event(ChannelEvent::frame(
            epoch,
            r#"{"type":"error","content":"after"}"#
        )));
        assert!(!controller.handle_event(ChannelEvent::new(epoch, ChannelEventKind::Closed(None))));
        assert_eq!(controller.snapshot(), done);
    }

    #[test]
    fn subscribers_see_each_transition() {
        let (mut controller, _) = controller();
        let mut rx = controller.subscribe();
        assert_eq!(rx.borrow_and_update().state, SessionState::Idle);

        let epoch = controller.start("q").unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state, SessionState::Connecting);

        controller.handle_event(ChannelEvent::new(epoch, ChannelEventKind::Opened));
        assert_eq!(rx.borrow_and_update().state, SessionState::Open);

        controller.handle_event(ChannelEvent::frame(epoch, status("Saving")));
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.current_stage, "Saving");
        assert_eq!(snapshot.displayed_progress, 82);
    }
}
