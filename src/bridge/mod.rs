//! The change bridge and its inspector-facing protocol.
//!
//! - [`ChangeBridge`] listens to host mutations and forwards filtered state.
//! - [`channel`] creates a bounded sink/stream pair for the outbound records.
//! - [`InspectorCommand`] covers what an inspector may ask of the bridge.

mod command;
mod dispatcher;
mod message;
mod sink;

pub use command::{CommandOutcome, InspectorCommand};
pub use dispatcher::{BridgeStats, ChangeBridge};
pub use message::{OutboundMessage, SessionId};
pub use sink::{channel, ChannelSink, InspectorSink, InspectorStream};
