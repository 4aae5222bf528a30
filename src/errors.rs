// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Error kinds of the ZooKeeper wire protocol, plus the client-side
/// conditions that share their numbering (connection loss, marshalling).
///
/// The numeric codes are part of the server ABI and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    System,
    RuntimeInconsistency,
    DataInconsistency,
    ConnectionLoss,
    Marshalling,
    Unimplemented,
    OperationTimeout,
    BadArguments,
    InvalidState,
    NewConfigNoQuorum,
    ReconfigInProgress,
    NoNode,
    NoAuth,
    BadVersion,
    NoChildrenForEphemerals,
    NodeExists,
    NotEmpty,
    SessionExpired,
    InvalidCallback,
    InvalidAcl,
    AuthFailed,
    Closing,
    Nothing,
    SessionMoved,
    NotReadOnly,
    EphemeralOnLocalSession,
    NoWatcher,
    ReconfigDisabled,
}

impl ErrorKind {
    /// Wire code for this kind (`err` field of a reply header).
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::System => -1,
            ErrorKind::RuntimeInconsistency => -2,
            ErrorKind::DataInconsistency => -3,
            ErrorKind::ConnectionLoss => -4,
            ErrorKind::Marshalling => -5,
            ErrorKind::Unimplemented => -6,
            ErrorKind::OperationTimeout => -7,
            ErrorKind::BadArguments => -8,
            ErrorKind::InvalidState => -9,
            ErrorKind::NewConfigNoQuorum => -13,
            ErrorKind::ReconfigInProgress => -14,
            ErrorKind::NoNode => -101,
            ErrorKind::NoAuth => -102,
            ErrorKind::BadVersion => -103,
            ErrorKind::NoChildrenForEphemerals => -108,
            ErrorKind::NodeExists => -110,
            ErrorKind::NotEmpty => -111,
            ErrorKind::SessionExpired => -112,
            ErrorKind::InvalidCallback => -113,
            ErrorKind::InvalidAcl => -114,
            ErrorKind::AuthFailed => -115,
            ErrorKind::Closing => -116,
            ErrorKind::Nothing => -117,
            ErrorKind::SessionMoved => -118,
            ErrorKind::NotReadOnly => -119,
            ErrorKind::EphemeralOnLocalSession => -120,
            ErrorKind::NoWatcher => -121,
            ErrorKind::ReconfigDisabled => -123,
        }
    }

    /// Maps a wire code back to its kind. Unknown codes yield `None`; the
    /// receiver treats them as a marshalling failure.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => ErrorKind::System,
            -2 => ErrorKind::RuntimeInconsistency,
            -3 => ErrorKind::DataInconsistency,
            -4 => ErrorKind::ConnectionLoss,
            -5 => ErrorKind::Marshalling,
            -6 => ErrorKind::Unimplemented,
            -7 => ErrorKind::OperationTimeout,
            -8 => ErrorKind::BadArguments,
            -9 => ErrorKind::InvalidState,
            -13 => ErrorKind::NewConfigNoQuorum,
            -14 => ErrorKind::ReconfigInProgress,
            -101 => ErrorKind::NoNode,
            -102 => ErrorKind::NoAuth,
            -103 => ErrorKind::BadVersion,
            -108 => ErrorKind::NoChildrenForEphemerals,
            -110 => ErrorKind::NodeExists,
            -111 => ErrorKind::NotEmpty,
            -112 => ErrorKind::SessionExpired,
            -113 => ErrorKind::InvalidCallback,
            -114 => ErrorKind::InvalidAcl,
            -115 => ErrorKind::AuthFailed,
            -116 => ErrorKind::Closing,
            -117 => ErrorKind::Nothing,
            -118 => ErrorKind::SessionMoved,
            -119 => ErrorKind::NotReadOnly,
            -120 => ErrorKind::EphemeralOnLocalSession,
            -121 => ErrorKind::NoWatcher,
            -123 => ErrorKind::ReconfigDisabled,
            _ => return None,
        })
    }

    /// Terminal kinds end the session; the engine never reconnects past
    /// them.
    pub fn is_terminal(self) -> bool {
        matches!(self, ErrorKind::SessionExpired | ErrorKind::AuthFailed)
    }

    /// Transient kinds are absorbed by the reconnect loop for operations
    /// submitted with `auto_retry`.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::ConnectionLoss)
    }

    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::System => "system error",
            ErrorKind::RuntimeInconsistency => "runtime inconsistency",
            ErrorKind::DataInconsistency => "data inconsistency",
            ErrorKind::ConnectionLoss => "connection loss",
            ErrorKind::Marshalling => "marshalling error",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::OperationTimeout => "operation timeout",
            ErrorKind::BadArguments => "bad arguments",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::NewConfigNoQuorum => "new config has no quorum",
            ErrorKind::ReconfigInProgress => "reconfig in progress",
            ErrorKind::NoNode => "no node",
            ErrorKind::NoAuth => "no auth",
            ErrorKind::BadVersion => "bad version",
            ErrorKind::NoChildrenForEphemerals => "no children for ephemerals",
            ErrorKind::NodeExists => "node exists",
            ErrorKind::NotEmpty => "not empty",
            ErrorKind::SessionExpired => "session expired",
            ErrorKind::InvalidCallback => "invalid callback",
            ErrorKind::InvalidAcl => "invalid acl",
            ErrorKind::AuthFailed => "auth failed",
            ErrorKind::Closing => "closing",
            ErrorKind::Nothing => "nothing",
            ErrorKind::SessionMoved => "session moved",
            ErrorKind::NotReadOnly => "not read only",
            ErrorKind::EphemeralOnLocalSession => "ephemeral on local session",
            ErrorKind::NoWatcher => "no watcher",
            ErrorKind::ReconfigDisabled => "reconfig disabled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type of the whole client surface: an [`ErrorKind`] plus a context
/// message (usually the request or watcher the failure belongs to).
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ZkError {
    kind: ErrorKind,
    message: String,
}

impl ZkError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub(crate) fn connection_loss(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionLoss, message)
    }

    pub(crate) fn marshalling(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Marshalling, message)
    }
}

impl From<std::io::Error> for ZkError {
    fn from(error: std::io::Error) -> Self {
        Self::connection_loss(error.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ZkError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::connection_loss("i/o timed out")
    }
}

pub type Result<T> = std::result::Result<T, ZkError>;
