//! Shared user registry — every known username and its connection binding.
//!
//! The registry is an ordered, append-only table: `/register` appends a
//! row, `/login` re-binds an existing row, and a row is never removed — a
//! departed user keeps their slot (connection absent) so a later `/login`
//! can claim it. All mutation flows through the methods here, behind one
//! `RwLock` shared by every session task.
//!
//! ## Design Decisions
//!
//! - **Rows are never pruned**: detach clears the connection but keeps
//!   username/password/authenticated intact, which is exactly what a later
//!   re-login needs.
//!
//! - **Detach is guarded by connection id**: two broadcasts can race to
//!   demote the same dead peer, and a re-login can race both. The loser
//!   sees a different id and does nothing, so a row transitions to
//!   connection-absent exactly once per live connection.
//!
//! - **The write half lives here**: delivery failures must fold back into
//!   the row that owns the connection, so rows store the framed writer
//!   itself rather than a channel to some writer task. The writer is boxed
//!   so tests can slot in in-memory duplex streams.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, RwLock};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, EnvelopeCodec};
use super::envelope::Envelope;

/// Process-wide connection id source.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Outbound frame writer. Boxed so unit tests can use duplex pipes in
/// place of TCP write halves.
pub type EnvelopeSink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, EnvelopeCodec>;

/// Handle to one live connection's outbound side.
///
/// Cloning shares the underlying writer and cancellation token; the id is
/// the identity of the connection itself, not of the clone.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    addr: SocketAddr,
    writer: Arc<Mutex<EnvelopeSink>>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(addr: SocketAddr, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            addr,
            writer: Arc::new(Mutex::new(FramedWrite::new(boxed, EnvelopeCodec))),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Write one envelope frame. The per-connection mutex keeps concurrent
    /// broadcasts from interleaving the bytes of two frames.
    pub async fn send(&self, envelope: Envelope) -> Result<(), CodecError> {
        self.writer.lock().await.send(envelope).await
    }

    /// Tell the owning session task to shut down (login supersession).
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

/// One identity row. Mutated only through [`Registry`] methods.
#[derive(Debug)]
pub struct UserRecord {
    username: String,
    password: String,
    authenticated: bool,
    connection: Option<ConnectionHandle>,
}

impl UserRecord {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }
}

/// A delivery target captured from the registry (or built ad hoc for a
/// session that has not registered yet).
#[derive(Debug, Clone)]
pub struct Recipient {
    /// Registry row this connection is bound to, if any. Failures for an
    /// anonymous recipient have no row to fold into.
    pub username: Option<String>,
    pub handle: ConnectionHandle,
}

impl Recipient {
    pub fn anonymous(handle: ConnectionHandle) -> Self {
        Self {
            username: None,
            handle,
        }
    }

    pub fn registered(username: impl Into<String>, handle: ConnectionHandle) -> Self {
        Self {
            username: Some(username.into()),
            handle,
        }
    }
}

/// What a successful [`Registry::detach`] cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detached {
    pub username: String,
    pub authenticated: bool,
}

/// The user table. Shared between session tasks as [`SharedRegistry`].
#[derive(Debug, Default)]
pub struct Registry {
    users: Vec<UserRecord>,
}

/// Shared, thread-safe registry.
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// Fresh registry in its shared form.
pub fn shared() -> SharedRegistry {
    Arc::new(RwLock::new(Registry::new()))
}

impl Registry {
    pub fn new() -> Self {
        Self { users: Vec::new() }
    }

    /// Append a new authenticated row bound to `handle`.
    ///
    /// Returns `false` and leaves the registry untouched if the username
    /// already has a row in any state. Check-and-append is one call so two
    /// racing registrations can never both commit.
    pub fn register(&mut self, username: &str, password: &str, handle: ConnectionHandle) -> bool {
        if self.contains(username) {
            return false;
        }
        self.users.push(UserRecord {
            username: username.to_owned(),
            password: password.to_owned(),
            authenticated: true,
            connection: Some(handle),
        });
        true
    }

    /// Exact-match credential check (no hashing — see DESIGN.md).
    pub fn verify_credentials(&self, username: &str, password: &str) -> bool {
        self.users
            .iter()
            .any(|u| u.username == username && u.password == password)
    }

    /// The live connection currently bound to `username`, if any.
    pub fn live_connection(&self, username: &str) -> Option<ConnectionHandle> {
        self.users
            .iter()
            .find(|u| u.username == username)
            .and_then(|u| u.connection.clone())
    }

    /// Point an existing row at a new connection and mark it authenticated.
    /// Returns `false` if no row carries `username`.
    pub fn rebind(&mut self, username: &str, handle: ConnectionHandle) -> bool {
        match self.users.iter_mut().find(|u| u.username == username) {
            Some(user) => {
                user.connection = Some(handle);
                user.authenticated = true;
                true
            }
            None => false,
        }
    }

    /// Clear a row's connection, but only while it is still bound to
    /// `conn_id`.
    ///
    /// Returns what was detached, or `None` when the row is absent, already
    /// bare, or since re-bound to a different connection — the caller must
    /// not announce a timeout for a connection it did not detach.
    pub fn detach(&mut self, username: &str, conn_id: u64) -> Option<Detached> {
        let user = self.users.iter_mut().find(|u| u.username == username)?;
        match &user.connection {
            Some(conn) if conn.id() == conn_id => {
                user.connection = None;
                Some(Detached {
                    username: user.username.clone(),
                    authenticated: user.authenticated,
                })
            }
            _ => None,
        }
    }

    /// Whether any row carries `username`, live or not.
    pub fn contains(&self, username: &str) -> bool {
        self.users.iter().any(|u| u.username == username)
    }

    /// Row lookup.
    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.username == username)
    }

    /// Snapshot of every row with a live connection, in registry order.
    /// Callers fan out over the snapshot without holding the lock.
    pub fn recipients(&self) -> Vec<Recipient> {
        self.users
            .iter()
            .filter_map(|u| {
                u.connection
                    .clone()
                    .map(|handle| Recipient::registered(u.username.clone(), handle))
            })
            .collect()
    }

    /// Number of rows, live or not.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the registry has no rows.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
