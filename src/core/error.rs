use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Corrupt(&'static str),
    Unsupported(&'static str),
    UnsupportedVersion(u32),
    PayloadTooLarge,
    InvalidTopic(String),
    /// Topic ids are exhausted.
    TooManyTopics,
    /// Write after `LogWriter::finish`.
    WriterFinished,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Corrupt(msg) => write!(f, "corrupt data: {msg}"),
            Error::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Error::UnsupportedVersion(version) => write!(f, "unsupported version: {version}"),
            Error::PayloadTooLarge => write!(f, "payload too large"),
            Error::InvalidTopic(topic) => write!(f, "invalid topic: {topic:?}"),
            Error::TooManyTopics => write!(f, "too many topics"),
            Error::WriterFinished => write!(f, "log writer already finished"),
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

pub type Result<T> = std::result::Result<T, Error>;
