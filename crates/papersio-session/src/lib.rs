//! Client-side controller for live Papersio research sessions.
//!
//! A session submits one query over a WebSocket, follows the stage updates the
//! research service pushes back, and ends with a [`ResearchResponse`] or a
//! classified [`SessionFailure`].

pub mod assembler;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod parser;
pub mod progress;
pub mod transport;

pub use assembler::{assemble_response, LIVE_STRATEGY_LABEL};
pub use config::ClientConfig;
pub use controller::{SessionController, SessionOptions};
pub use error::{classify, ControlError, ErrorKind, ResearchError, SessionFailure};
pub use model::{
    InboundEvent, ResearchResponse, Session, SessionState, Source, SourceKind, TerminalKind,
};
pub use parser::parse_frame;
pub use progress::{compute_progress, STAGE_CATALOG, UNKNOWN_STAGE_PROGRESS};
pub use transport::{
    ChannelEvent, ChannelEventKind, ChannelHandle, Epoch, MemoryTransport, Transport,
    WebSocketTransport,
};
