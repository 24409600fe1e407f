//! Error types for the device session and command execution.

use std::time::Duration;

use mccli_protocol::{FirmwareErrorCode, ProtocolError};
use thiserror::Error;

/// Failures of the link to the companion device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Reading or writing the link failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The link was closed by the device or the transport task.
    #[error("connection closed")]
    Closed,

    /// The device did not answer a request in time.
    #[error("no reply from device within {0:?}")]
    NoReply(Duration),

    /// A frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device answered with a reply that does not fit the request.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The requested transport cannot be used from this build.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// Opening or configuring the serial port failed.
    #[error("serial port error: {0}")]
    Serial(String),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Io(err.to_string())
    }
}

impl From<serialport::Error> for SessionError {
    fn from(err: serialport::Error) -> Self {
        SessionError::Serial(err.to_string())
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Problems found while turning tokens into invocations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// No command has this name or alias.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// The token stream ended before the command got all its arguments.
    #[error("{command}: missing arguments (usage: {usage})")]
    MissingArguments {
        /// Command name.
        command: String,
        /// Usage line of the command.
        usage: String,
    },

    /// An argument could not be interpreted.
    #[error("{command}: invalid {what} '{value}'")]
    InvalidArgument {
        /// Command name.
        command: String,
        /// What the argument should have been.
        what: String,
        /// The offending token.
        value: String,
    },
}

/// Why a single invocation failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The invocation could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A contact or channel reference matched nothing usable.
    #[error("{0}")]
    Unresolved(String),

    /// The device rejected the command.
    #[error("device error: {0}")]
    Device(FirmwareErrorCode),

    /// The device has the feature turned off.
    #[error("feature disabled on device")]
    Disabled,

    /// A remote node answered with a refusal (e.g. a failed login).
    #[error("{0}")]
    Rejected(String),

    /// The device answered with something the command did not expect.
    #[error("unexpected reply: {0}")]
    Unexpected(String),

    /// The link to the device failed.
    #[error("transport error: {0}")]
    Transport(SessionError),

    /// The invocation never ran because the chain stopped before it.
    #[error("not run: {0}")]
    Aborted(String),

    /// The wait was cancelled (interrupt or leaving interactive mode).
    #[error("wait cancelled")]
    Cancelled,

    /// A script file could not be read.
    #[error("cannot read script {path}: {reason}")]
    Script {
        /// Script path as given.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },
}

impl From<SessionError> for CommandError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnexpectedReply(what) => CommandError::Unexpected(what),
            other => CommandError::Transport(other),
        }
    }
}

impl CommandError {
    /// Only transport failures stop the rest of a command chain.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::Transport(_))
    }

    /// Category name used in machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Parse(_) => "parse",
            CommandError::Unresolved(_) => "unresolved",
            CommandError::Device(_) | CommandError::Disabled | CommandError::Rejected(_) => "device",
            CommandError::Unexpected(_) => "unexpected",
            CommandError::Transport(_) => "transport",
            CommandError::Aborted(_) => "aborted",
            CommandError::Cancelled => "cancelled",
            CommandError::Script { .. } => "script",
        }
    }
}

/// Result type for command handlers.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors loading or saving settings and persisted state.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Reading or writing a file failed.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid YAML for [`crate::settings::Settings`].
    #[error("{path}: {source}")]
    Yaml {
        /// File involved.
        path: String,
        /// Underlying failure.
        #[source]
        source: serde_yaml::Error,
    },

    /// A stored or given endpoint string could not be parsed.
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
}
