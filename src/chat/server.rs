/// Chat server core — accept loop, per-session state machine, command
/// handling.
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{info, warn};

use super::command::{self, Command, CommandError};
use super::dispatch::{send_to, send_to_all};
use super::envelope::Envelope;
use super::registry::{ConnectionHandle, Recipient, SharedRegistry};

/// Longest command line a client may send, in bytes.
const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Greeting sent to every fresh connection, right after the version
/// handshake.
const GREETING: &str = "Connection established.";
const LOGIN_PROMPT: &str =
    "Login with your account or create a new one. Type /help to see available commands.";

/// Bind the listener and serve forever.
pub async fn run(addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = super::registry::shared();
    let listener = TcpListener::bind(addr).await?;
    info!("chinwag listening on {addr}");
    accept_loop(listener, registry).await
}

/// Accept loop for a single listener.
///
/// Split out of [`run`] so tests can drive an ephemeral-port listener
/// against a registry they keep a handle on.
pub async fn accept_loop(
    listener: TcpListener,
    registry: SharedRegistry,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (socket, addr) = listener.accept().await?;
        info!(%addr, "new connection");
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            handle_client(socket, addr, registry).await;
            info!(%addr, "disconnected");
        });
    }
}

/// What the session loop should do after a command.
enum SessionFlow {
    Continue,
    Quit,
}

/// Drive a single client session: preamble, then the command loop until
/// the peer quits, the read side fails, or a newer login takes over the
/// identity.
async fn handle_client(socket: TcpStream, addr: SocketAddr, registry: SharedRegistry) {
    let (read_half, write_half) = socket.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut me = Recipient::anonymous(ConnectionHandle::new(addr, write_half));

    // The version envelope goes out before anything human-readable.
    send_to(&registry, &me, Envelope::version_handshake()).await;
    send_to(&registry, &me, Envelope::server_text(GREETING)).await;
    send_to(&registry, &me, Envelope::server_text(LOGIN_PROMPT)).await;

    let shutdown = me.handle.clone();
    loop {
        tokio::select! {
            // Incoming command line from the client's TCP stream.
            line = lines.next() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!(%addr, "read error: {e}");
                        break;
                    }
                    None => break, // Connection closed.
                };

                match run_command(&registry, &mut me, &line).await {
                    SessionFlow::Continue => {}
                    SessionFlow::Quit => break,
                }
            }

            // A later /login claimed this username and closed us.
            _ = shutdown.closed() => break,
        }
    }

    // No registry cleanup here: a session that ends without /quit keeps its
    // row bound until the next delivery attempt finds the dead socket.
}

/// Parse one line and run the command it names.
async fn run_command(registry: &SharedRegistry, me: &mut Recipient, line: &str) -> SessionFlow {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(err) => {
            reject(registry, me, err).await;
            return SessionFlow::Continue;
        }
    };

    match command {
        Command::Register { username, password } => {
            handle_register(registry, me, username, password).await;
            SessionFlow::Continue
        }
        Command::Login { username, password } => {
            handle_login(registry, me, username, password).await;
            SessionFlow::Continue
        }
        Command::Msg { body } => {
            handle_msg(registry, me, body).await;
            SessionFlow::Continue
        }
        Command::Help => {
            send_to(registry, me, Envelope::server_text(command::HELP_TEXT)).await;
            SessionFlow::Continue
        }
        Command::Quit => {
            handle_quit(registry, me).await;
            SessionFlow::Quit
        }
    }
}

/// Send one rejection back to the client. The session stays in whatever
/// state it was in.
async fn reject(registry: &SharedRegistry, me: &Recipient, err: CommandError) {
    send_to(registry, me, Envelope::server_error(err.to_string())).await;
}

async fn handle_register(
    registry: &SharedRegistry,
    me: &mut Recipient,
    username: String,
    password: String,
) {
    if me.username.is_some() {
        return reject(registry, me, CommandError::AlreadyAuthenticated).await;
    }
    if let Err(err) = command::validate_registration(&username, &password) {
        return reject(registry, me, err).await;
    }

    // Check-and-append happens inside one write lock, so two racing
    // registrations of the same name cannot both commit.
    let appended = {
        let mut reg = registry.write().await;
        reg.register(&username, &password, me.handle.clone())
    };
    if !appended {
        return reject(registry, me, CommandError::NameTaken).await;
    }

    me.username = Some(username.clone());
    info!(username = %username, addr = %me.handle.addr(), "registered");

    send_to(
        registry,
        me,
        Envelope::server_text(format!("Registered and logged as {username}. Welcome!")),
    )
    .await;
    send_to_all(registry, Envelope::activity(format!("{username} has joined the chat."))).await;
}

async fn handle_login(
    registry: &SharedRegistry,
    me: &mut Recipient,
    username: String,
    password: String,
) {
    if me.username.is_some() {
        return reject(registry, me, CommandError::AlreadyAuthenticated).await;
    }

    let (credentials_ok, previous) = {
        let reg = registry.read().await;
        (
            reg.verify_credentials(&username, &password),
            reg.live_connection(&username),
        )
    };
    if !credentials_ok {
        return reject(registry, me, CommandError::BadCredentials).await;
    }

    // One session per identity: whoever holds the name gets a courtesy
    // notice and is shut down before the row is re-bound.
    if let Some(previous) = previous {
        let delivered = send_to(
            registry,
            &Recipient::registered(username.clone(), previous.clone()),
            Envelope::server_text("You logged in from another terminal. Closing this session."),
        )
        .await;
        if delivered {
            previous.close();
        }
    }

    {
        let mut reg = registry.write().await;
        reg.rebind(&username, me.handle.clone());
    }

    me.username = Some(username.clone());
    info!(username = %username, addr = %me.handle.addr(), "logged in");

    send_to(
        registry,
        me,
        Envelope::server_text(format!("Logged as {username}. Welcome!")),
    )
    .await;
    send_to_all(registry, Envelope::activity(format!("{username} has joined the chat."))).await;
}

async fn handle_msg(registry: &SharedRegistry, me: &Recipient, body: String) {
    let Some(username) = &me.username else {
        return reject(registry, me, CommandError::NotAuthenticated).await;
    };

    let envelope = Envelope::chat(username.clone(), format!("{body}\n"));

    // Fan-out runs on its own task so one slow or dead peer cannot stall
    // this session's read loop.
    let registry = Arc::clone(registry);
    tokio::spawn(async move { send_to_all(&registry, envelope).await });
}

async fn handle_quit(registry: &SharedRegistry, me: &Recipient) {
    let Some(username) = &me.username else {
        send_to(registry, me, Envelope::server_text("Goodbye!")).await;
        return;
    };

    send_to(
        registry,
        me,
        Envelope::server_text(format!("Goodbye {username}!")),
    )
    .await;

    {
        let mut reg = registry.write().await;
        reg.detach(username, me.handle.id());
    }
    info!(username = %username, "left");

    send_to_all(registry, Envelope::activity(format!("{username} has left the chat."))).await;
}
