//! Multi-user chat engine: envelope model, wire codec, command grammar,
//! shared user registry, broadcast dispatch, and the TCP server itself.

pub mod codec;
pub mod command;
pub mod dispatch;
pub mod envelope;
pub mod registry;
pub mod server;
