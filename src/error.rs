use thiserror::Error;

/// Codec-level decode failures — always locally recoverable: the caller
/// discards the frame and keeps reading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame too short: got {got} bytes, need at least {need}")]
    TooShort { got: usize, need: usize },

    #[error("unexpected ether type 0x{got:04x}, expected 0x{want:04x}")]
    WrongEtherType { got: u16, want: u16 },

    #[error("unexpected HomePlug MMV 0x{got:02x}, expected 0x{want:02x}")]
    WrongMmv { got: u8, want: u8 },

    #[error("unrecognized mm_type 0x{0:04x}")]
    UnknownMmType(u16),

    #[error("field '{field}' out of range")]
    FieldOutOfRange { field: &'static str },
}

/// Top-level error type for the core protocol. Mirrors the five kinds in
/// the error handling design: parse errors are recovered locally and never
/// actually surface here except when wrapped for logging; the rest abort
/// the current matching run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("link error: {0}")]
    Link(String),

    #[error("fatal configuration error: {0}")]
    FatalConfig(String),
}

impl CoreError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        CoreError::Protocol(msg.into())
    }

    pub fn link(msg: impl Into<String>) -> Self {
        CoreError::Link(msg.into())
    }

    /// Whether this error aborts the current matching run (returns the
    /// session to UNMATCHED) as opposed to being purely diagnostic.
    pub fn aborts_run(&self) -> bool {
        !matches!(self, CoreError::Parse(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
