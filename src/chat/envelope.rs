//! The broadcast envelope — the unit of information exchanged between the
//! server and its clients.
//!
//! Every reply, chat relay, and activity notice crosses the wire as one
//! `Envelope`, serialized as JSON inside a length-prefixed frame (see
//! [`super::codec`]). The `kind`/`printable` pair tells a client how — and
//! whether — to render the line; `status` is the coarse ok/error signal for
//! command replies; `origin` records which side stamped the envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved sender identity for server-originated envelopes.
pub const SERVER_SENDER: &str = "__SERVER__";

/// Reserved sender identity for client-originated system traffic (used by
/// the client collaborator, never produced by the server).
pub const CLIENT_SENDER: &str = "__CLIENT__";

/// Protocol version advertised by the handshake envelope. A client compares
/// this against its own version and hangs up on mismatch.
pub const PROTOCOL_VERSION: &str = "v0.1.1";

/// What an envelope carries. Governs client-side rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Plain server text: greetings, command replies, `/help` output.
    Text,
    /// A rejected command. Rendered distinctly by clients.
    Error,
    /// A user-authored chat line, relayed to every live session.
    Chat,
    /// System-generated join/leave/timeout notice.
    Activity,
    /// Version handshake, sent once per connection before anything else.
    Version,
}

/// Coarse outcome signal for command replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Error,
}

/// Which side of the connection produced an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Client,
    Server,
}

/// One chat event. Immutable once built; broadcast paths clone a fresh copy
/// per recipient rather than sharing.
///
/// `timestamp` and `origin` are provisional until the dispatcher stamps them
/// at send time ([`super::dispatch::send_to`]), so receivers always see the
/// server's clock, not the author's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EnvelopeKind,
    pub printable: bool,
    pub status: Status,
    pub origin: Origin,
}

impl Envelope {
    fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        kind: EnvelopeKind,
        printable: bool,
        status: Status,
    ) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind,
            printable,
            status,
            origin: Origin::Server,
        }
    }

    /// Plain server text with an Ok status (greetings, confirmations).
    pub fn server_text(content: impl Into<String>) -> Self {
        Self::new(SERVER_SENDER, content, EnvelopeKind::Text, true, Status::Ok)
    }

    /// A command rejection.
    pub fn server_error(content: impl Into<String>) -> Self {
        Self::new(
            SERVER_SENDER,
            content,
            EnvelopeKind::Error,
            true,
            Status::Error,
        )
    }

    /// System notice about membership changes (join/leave/timeout).
    pub fn activity(content: impl Into<String>) -> Self {
        Self::new(
            SERVER_SENDER,
            content,
            EnvelopeKind::Activity,
            true,
            Status::Ok,
        )
    }

    /// A user's chat line, attributed to its author.
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(sender, content, EnvelopeKind::Chat, true, Status::Ok)
    }

    /// The non-printable version advertisement sent first on every
    /// connection.
    pub fn version_handshake() -> Self {
        Self::new(
            SERVER_SENDER,
            PROTOCOL_VERSION,
            EnvelopeKind::Version,
            false,
            Status::Ok,
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn chat_envelope_is_attributed_to_author() {
        let env = Envelope::chat("alice", "hi there\n");
        assert_eq!(env.sender, "alice");
        assert_eq!(env.content, "hi there\n");
        assert_eq!(env.kind, EnvelopeKind::Chat);
        assert_eq!(env.status, Status::Ok);
        assert!(env.printable);
    }

    #[test]
    fn version_handshake_is_not_printable() {
        let env = Envelope::version_handshake();
        assert_eq!(env.kind, EnvelopeKind::Version);
        assert_eq!(env.sender, SERVER_SENDER);
        assert_eq!(env.content, PROTOCOL_VERSION);
        assert!(!env.printable);
    }

    #[test]
    fn error_envelope_carries_error_status() {
        let env = Envelope::server_error("Entered credentials are incorrect.");
        assert_eq!(env.kind, EnvelopeKind::Error);
        assert_eq!(env.status, Status::Error);
        assert_eq!(env.sender, SERVER_SENDER);
    }

    #[test]
    fn wire_spellings() {
        // The JSON field set is the contract clients parse — lock it down.
        let env = Envelope::chat("alice", "hello\n");
        let value = serde_json::to_value(&env).unwrap();

        assert_eq!(value["sender"], "alice");
        assert_eq!(value["content"], "hello\n");
        assert_eq!(value["kind"], "chat");
        assert_eq!(value["printable"], true);
        assert_eq!(value["status"], "ok");
        assert_eq!(value["origin"], "server");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn kind_spellings_cover_every_variant() {
        for (kind, spelling) in [
            (EnvelopeKind::Text, "\"text\""),
            (EnvelopeKind::Error, "\"error\""),
            (EnvelopeKind::Chat, "\"chat\""),
            (EnvelopeKind::Activity, "\"activity\""),
            (EnvelopeKind::Version, "\"version\""),
        ] {
            assert_eq!(serde_json::to_string(&kind).unwrap(), spelling);
        }
    }

    #[test]
    fn deserializes_client_envelope() {
        let json = r#"{
            "sender": "__CLIENT__",
            "content": "/login alice secret1",
            "timestamp": "2024-05-01T12:00:00Z",
            "kind": "text",
            "printable": false,
            "status": "ok",
            "origin": "client"
        }"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.sender, CLIENT_SENDER);
        assert_eq!(env.origin, Origin::Client);
        assert_eq!(env.kind, EnvelopeKind::Text);
    }
}
