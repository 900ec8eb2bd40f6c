use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Usage,
    Auth,
    Validation,
    Remote,
    RemoteWrite,
    PartialMove,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Usage = 2,
    Auth = 3,
    Validation = 4,
    Remote = 5,
    PartialMove = 6,
    Io = 7,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{message}")]
pub struct JotError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JotError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    /// Bad input caught before any remote or local I/O.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Any remote failure; the cause (offline, timeout, permission) is opaque.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Remote, message)
    }

    /// A remote mutation failed and no local state was touched.
    pub fn remote_write(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteWrite, message)
    }

    /// A multi-step remote mutation stopped after some steps had completed.
    pub fn partial_move(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PartialMove, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.kind {
            ErrorKind::Usage => ExitCode::Usage,
            ErrorKind::Auth => ExitCode::Auth,
            ErrorKind::Validation => ExitCode::Validation,
            ErrorKind::Remote | ErrorKind::RemoteWrite => ExitCode::Remote,
            ErrorKind::PartialMove => ExitCode::PartialMove,
            ErrorKind::Io => ExitCode::Io,
        }
    }
}

impl From<std::io::Error> for JotError {
    fn from(value: std::io::Error) -> Self {
        Self::io(value.to_string())
    }
}

pub type JotResult<T> = Result<T, JotError>;
