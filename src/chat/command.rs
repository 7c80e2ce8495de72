/// Chat command grammar — turns client lines into typed commands.
///
/// One command per line. The line is trimmed, then the first
/// space-delimited token picks the verb. `/register` and `/login` take
/// exactly two arguments split on single spaces — a doubled space yields an
/// empty token and fails arity, matching the strictness clients already
/// rely on. `/msg` keeps everything after the verb and one separating
/// space, embedded spaces included.
///
/// [`CommandError`] doubles as the reply taxonomy: its `Display` strings
/// are the exact texts sent back to the offending client.

/// Shortest allowed username at registration.
pub const USERNAME_MIN: usize = 4;
/// Longest allowed username at registration.
pub const USERNAME_MAX: usize = 15;
/// Shortest allowed password at registration.
pub const PASSWORD_MIN: usize = 5;

/// Static `/help` reply.
pub const HELP_TEXT: &str = "Available commands: /login, /register, /msg, /quit, /help";

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register { username: String, password: String },
    Login { username: String, password: String },
    Msg { body: String },
    Quit,
    Help,
}

/// Why a command was rejected. Display strings go to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid usage. Command usage: {usage}")]
    BadArity { usage: &'static str },
    #[error("Unknown command '{0}'. Type /help to view all commands.")]
    UnknownCommand(String),
    #[error("You are already logged in.")]
    AlreadyAuthenticated,
    #[error("You are not logged in. You can do so with /login. Type /help to show all commands.")]
    NotAuthenticated,
    #[error("Entered credentials are incorrect.")]
    BadCredentials,
    #[error("That username is already in use.")]
    NameTaken,
    #[error("Usernames must be between {USERNAME_MIN} and {USERNAME_MAX} characters.")]
    BadUsername,
    #[error("Passwords must be at least {PASSWORD_MIN} characters.")]
    BadPassword,
}

impl Command {
    /// Parse one client line (without its trailing newline).
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let verb = line.split(' ').next().unwrap_or_default();

        match verb {
            "/register" => {
                let (username, password) =
                    two_args(line, "/register <username> <password>")?;
                Ok(Command::Register { username, password })
            }
            "/login" => {
                let (username, password) = two_args(line, "/login <username> <password>")?;
                Ok(Command::Login { username, password })
            }
            "/msg" => {
                // Everything after the verb and one separating space is the
                // message body, verbatim.
                let body = line.strip_prefix("/msg").unwrap_or_default();
                let body = body.strip_prefix(' ').unwrap_or(body);
                Ok(Command::Msg {
                    body: body.to_owned(),
                })
            }
            "/quit" => Ok(Command::Quit),
            "/help" => Ok(Command::Help),
            other => Err(CommandError::UnknownCommand(other.to_owned())),
        }
    }
}

/// Split a fixed-arity command line into its two arguments.
fn two_args(line: &str, usage: &'static str) -> Result<(String, String), CommandError> {
    let parts: Vec<&str> = line.split(' ').collect();
    match parts.as_slice() {
        [_, first, second] => Ok(((*first).to_owned(), (*second).to_owned())),
        _ => Err(CommandError::BadArity { usage }),
    }
}

/// Registration credential rules, checked before the registry is consulted.
pub fn validate_registration(username: &str, password: &str) -> Result<(), CommandError> {
    let name_len = username.chars().count();
    if name_len < USERNAME_MIN || name_len > USERNAME_MAX {
        return Err(CommandError::BadUsername);
    }
    if password.chars().count() < PASSWORD_MIN {
        return Err(CommandError::BadPassword);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    // ── Parsing ──────────────────────────────────────────────────

    #[test]
    fn parse_register() {
        let cmd = Command::parse("/register alice secret1").unwrap();
        assert_eq!(
            cmd,
            Command::Register {
                username: "alice".into(),
                password: "secret1".into(),
            }
        );
    }

    #[test]
    fn parse_login() {
        let cmd = Command::parse("/login bob hunter2").unwrap();
        assert_eq!(
            cmd,
            Command::Login {
                username: "bob".into(),
                password: "hunter2".into(),
            }
        );
    }

    #[test]
    fn parse_msg_preserves_embedded_spaces() {
        let cmd = Command::parse("/msg hi there everyone").unwrap();
        assert_eq!(
            cmd,
            Command::Msg {
                body: "hi there everyone".into(),
            }
        );
    }

    #[test]
    fn parse_msg_keeps_extra_separator_spaces() {
        // Only one space after the verb is swallowed.
        let cmd = Command::parse("/msg  indented").unwrap();
        assert_eq!(
            cmd,
            Command::Msg {
                body: " indented".into(),
            }
        );
    }

    #[test]
    fn parse_msg_with_empty_body() {
        let cmd = Command::parse("/msg").unwrap();
        assert_eq!(cmd, Command::Msg { body: "".into() });
    }

    #[test]
    fn parse_quit_ignores_trailing_arguments() {
        assert_eq!(Command::parse("/quit").unwrap(), Command::Quit);
        assert_eq!(Command::parse("/quit now please").unwrap(), Command::Quit);
    }

    #[test]
    fn parse_help() {
        assert_eq!(Command::parse("/help").unwrap(), Command::Help);
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        assert_eq!(Command::parse("  /quit  ").unwrap(), Command::Quit);
        let cmd = Command::parse("\t/login alice secret1").unwrap();
        assert!(matches!(cmd, Command::Login { .. }));
    }

    // ── Rejections ───────────────────────────────────────────────

    #[test]
    fn parse_register_wrong_arity() {
        for line in ["/register", "/register alice", "/register alice pw extra"] {
            let err = Command::parse(line).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Invalid usage. Command usage: /register <username> <password>"
            );
        }
    }

    #[test]
    fn parse_login_wrong_arity() {
        let err = Command::parse("/login alice").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid usage. Command usage: /login <username> <password>"
        );
    }

    #[test]
    fn parse_doubled_space_fails_arity() {
        let err = Command::parse("/login alice  secret1").unwrap_err();
        assert!(matches!(err, CommandError::BadArity { .. }));
    }

    #[test]
    fn parse_unknown_command() {
        let err = Command::parse("/dance").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("/dance".into()));
        assert_eq!(
            err.to_string(),
            "Unknown command '/dance'. Type /help to view all commands."
        );
    }

    #[test]
    fn parse_empty_line_is_unknown_command() {
        let err = Command::parse("").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("".into()));
    }

    #[test]
    fn parse_is_case_sensitive() {
        let err = Command::parse("/QUIT").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("/QUIT".into()));
    }

    // ── Registration validation ──────────────────────────────────

    #[test]
    fn validate_accepts_reasonable_credentials() {
        assert!(validate_registration("alice", "secret1").is_ok());
    }

    #[test]
    fn validate_rejects_short_username() {
        assert_eq!(
            validate_registration("al", "secret1"),
            Err(CommandError::BadUsername)
        );
    }

    #[test]
    fn validate_rejects_long_username() {
        assert_eq!(
            validate_registration("a".repeat(16).as_str(), "secret1"),
            Err(CommandError::BadUsername)
        );
    }

    #[test]
    fn validate_rejects_short_password() {
        assert_eq!(
            validate_registration("alice", "pw"),
            Err(CommandError::BadPassword)
        );
    }

    // ── Reply texts ──────────────────────────────────────────────

    #[test]
    fn reply_texts_are_stable() {
        // Clients display these verbatim; changing one is a protocol change.
        let cases = [
            (
                CommandError::AlreadyAuthenticated,
                "You are already logged in.",
            ),
            (
                CommandError::NotAuthenticated,
                "You are not logged in. You can do so with /login. Type /help to show all commands.",
            ),
            (
                CommandError::BadCredentials,
                "Entered credentials are incorrect.",
            ),
            (CommandError::NameTaken, "That username is already in use."),
            (
                CommandError::BadUsername,
                "Usernames must be between 4 and 15 characters.",
            ),
            (
                CommandError::BadPassword,
                "Passwords must be at least 5 characters.",
            ),
        ];
        for (err, text) in cases {
            assert_eq!(err.to_string(), text);
        }
    }
}
