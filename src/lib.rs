//! Public API for the `snacline` library.
//!
//! This crate is a client-side engine for SNAC-style multiplexed binary
//! protocols: it correlates asynchronous requests with their responses,
//! dispatches unmatched frames through a preprocess/veto/deliver listener
//! pipeline, and smooths outgoing traffic against server-assigned rate
//! classes before anything reaches the wire. The transport below it and the
//! application commands above it are supplied by the caller.

pub mod command;
pub mod config;
pub mod factory;
pub mod listener;
pub mod metrics;
pub mod outbound;
mod pending;
pub mod processor;
pub mod rate;
pub mod transport;

pub use command::{CommandKey, CommandType, RawCommand, SnacCommand, SnacFrame};
pub use config::ProcessorConfig;
pub use factory::{CommandFactory, DecodeError, FactoryRegistry};
pub use listener::{
    CommandEvent,
    CommandListener,
    FramePreprocessor,
    ListenerError,
    RequestListener,
    RequestResponseEvent,
    RequestTimeoutEvent,
    TimeoutReason,
    Veto,
    VetoableCommandListener,
};
pub use outbound::{ImmediateOutbound, OutboundItem, OutboundQueue};
pub use processor::{SnacProcessor, SnacRequest};
pub use rate::{RateClassInfo, RateConfigError, RateManager};
pub use transport::{ConnectionId, DispatchError, DispatchStage, SnacTransport};
