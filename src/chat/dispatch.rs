/// Broadcast dispatch — delivery to one or every live session.
///
/// `send_to` is the single write site: it stamps the envelope, writes the
/// frame, and folds permanent transport failures back into the registry,
/// so a dead peer is demoted exactly where its death is observed.
/// `send_to_all` fans a snapshot out in registry order; one bad peer never
/// stops the sweep.
use std::future::Future;
use std::io;
use std::pin::Pin;

use chrono::Utc;
use tracing::{info, warn};

use super::codec::CodecError;
use super::envelope::{Envelope, Origin};
use super::registry::{Recipient, SharedRegistry};

/// How badly a write went.
enum Failure {
    /// One lost delivery; the connection may still be good.
    Transient,
    /// The peer is gone. Detach it.
    Permanent,
}

fn classify(err: &CodecError) -> Failure {
    match err {
        CodecError::Io(e) => match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => Failure::Permanent,
            _ => Failure::Transient,
        },
        CodecError::FrameTooLong | CodecError::Json(_) => Failure::Transient,
    }
}

/// Deliver one envelope to one recipient. Returns whether delivery
/// succeeded.
///
/// The envelope is re-stamped with `origin=Server` and the send-time clock,
/// so receivers always see the server's view regardless of what the caller
/// built. On a permanent transport failure the recipient's registry row is
/// detached (guarded by connection id) and, if that row was authenticated,
/// a timeout notice is re-broadcast to everyone left.
pub async fn send_to(
    registry: &SharedRegistry,
    recipient: &Recipient,
    mut envelope: Envelope,
) -> bool {
    envelope.origin = Origin::Server;
    envelope.timestamp = Utc::now();

    let err = match recipient.handle.send(envelope).await {
        Ok(()) => return true,
        Err(err) => err,
    };

    let addr = recipient.handle.addr();
    match classify(&err) {
        Failure::Transient => {
            warn!(%addr, "delivery failed: {err}");
        }
        Failure::Permanent => {
            let Some(username) = &recipient.username else {
                // Nothing registered to demote; the session's own read loop
                // will notice the dead socket.
                warn!(%addr, "peer gone before registering: {err}");
                return false;
            };

            let detached = {
                let mut reg = registry.write().await;
                reg.detach(username, recipient.handle.id())
            };

            if let Some(detached) = detached {
                info!(username = %detached.username, %addr, "stale connection detached");
                if detached.authenticated {
                    let notice = Envelope::activity(format!(
                        "{}'s connection timed out.",
                        detached.username
                    ));
                    send_to_all(registry, notice).await;
                }
            }
        }
    }

    false
}

/// Deliver one envelope to every row with a live connection, in registry
/// order. Failures are folded per-recipient by [`send_to`]; the sweep
/// always runs to completion.
///
/// The send_to ↔ send_to_all recursion needs one boxed hop; the box lives
/// at this boundary so the `Send` bound is stated rather than inferred.
pub fn send_to_all<'a>(
    registry: &'a SharedRegistry,
    envelope: Envelope,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let recipients = registry.read().await.recipients();
        for recipient in &recipients {
            send_to(registry, recipient, envelope.clone()).await;
        }
    })
}
