use std::fmt::Display;

pub type Result<T> = std::result::Result<T, DatagramError>;

#[derive(Debug, thiserror::Error)]
pub enum DatagramError {
    /// a required value was not provided
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// a numeric value violates a closed bound
    #[error("{what} out of range: {value} (allowed: {allowed})")]
    OutOfRange {
        what: &'static str,
        value: u64,
        allowed: &'static str,
    },

    /// a value violates a type dependent constraint
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("the client was disposed")]
    Disposed,

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// NB: the originating cause is kept as `source` rather than folding it into the message
    #[error("serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatagramError {
    pub fn serialization(context: impl Display, source: impl Into<anyhow::Error>) -> DatagramError {
        DatagramError::Serialization {
            context: context.to_string(),
            source: source.into(),
        }
    }

    /// Wraps an error from the serialize / deserialize pipeline, leaving errors that are already
    ///  serialization failures as they are.
    pub fn into_serialization(self, context: impl Display) -> DatagramError {
        match self {
            e @ DatagramError::Serialization { .. } => e,
            e => DatagramError::serialization(context, e),
        }
    }

    pub fn index_out_of_range(index: usize) -> DatagramError {
        DatagramError::OutOfRange {
            what: "index",
            value: index as u64,
            allowed: "0..len",
        }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, DatagramError::NotSupported(_))
    }
}
