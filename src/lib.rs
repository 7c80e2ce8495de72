//! chinwag — a minimal multi-user TCP chat server.
//!
//! Clients speak newline-delimited commands; the server answers with
//! length-prefixed JSON envelopes. See [`chat`] for the protocol pieces.

pub mod chat;
