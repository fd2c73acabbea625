use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// Malformed match expression or alias definition.
    Parse(String),
    /// Cyclic or too deeply nested alias definitions, caught at load time.
    AliasLoop(String),
    /// A requested range, segment or dataset does not exist.
    NotFound(String),
    /// Format-level integrity failure. Never auto-repaired; recovery is an
    /// explicit maintenance action.
    Corrupt(String),
    /// Policy rejection of an import: the record is already archived.
    Duplicate(String),
    /// An append or index update failed partway. The payload state is left
    /// discoverable by the next check/repack.
    ImportFailed(String),
    /// Another writer holds the dataset lock.
    Locked(String),
    Unsupported(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Parse(msg) => write!(f, "parse error: {msg}"),
            Error::AliasLoop(msg) => write!(f, "alias loop: {msg}"),
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::Corrupt(msg) => write!(f, "corrupt data: {msg}"),
            Error::Duplicate(msg) => write!(f, "duplicate record: {msg}"),
            Error::ImportFailed(msg) => write!(f, "import failed: {msg}"),
            Error::Locked(msg) => write!(f, "dataset locked: {msg}"),
            Error::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl Error {
    /// Prefix the message with dataset/segment identifying context.
    pub fn context(self, what: &str) -> Error {
        match self {
            Error::Io(err) => Error::Io(std::io::Error::new(err.kind(), format!("{what}: {err}"))),
            Error::Parse(msg) => Error::Parse(format!("{what}: {msg}")),
            Error::AliasLoop(msg) => Error::AliasLoop(format!("{what}: {msg}")),
            Error::NotFound(msg) => Error::NotFound(format!("{what}: {msg}")),
            Error::Corrupt(msg) => Error::Corrupt(format!("{what}: {msg}")),
            Error::Duplicate(msg) => Error::Duplicate(format!("{what}: {msg}")),
            Error::ImportFailed(msg) => Error::ImportFailed(format!("{what}: {msg}")),
            Error::Locked(msg) => Error::Locked(format!("{what}: {msg}")),
            Error::Unsupported(msg) => Error::Unsupported(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
