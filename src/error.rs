/// Result type for midiseq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when decoding, encoding or playing MIDI data
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unexpected binary structure while decoding
    ///
    /// Fatal to the parse that raised it: no partial result is returned.
    #[error("Invalid MIDI data: {0}")]
    Format(String),

    /// Invalid payload handed to the encoder (or to a constructor)
    ///
    /// Fails the call that raised it only.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Operation invoked while the sequencer is in an incompatible state
    #[error("Invalid sequencer state: {0}")]
    State(String),

    /// Returned by [`OutputSink`](crate::OutputSink) and
    /// [`InputSource`](crate::InputSource) implementations when the device
    /// fails; the crate itself never constructs it
    #[error("MIDI port error: {0}")]
    Sink(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a format error
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Create an argument error
    pub fn argument(msg: impl Into<String>) -> Self {
        Error::Argument(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }

    /// True for [`Error::Format`]
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }

    /// True for [`Error::Argument`]
    pub fn is_argument(&self) -> bool {
        matches!(self, Error::Argument(_))
    }

    /// True for [`Error::State`]
    pub fn is_state(&self) -> bool {
        matches!(self, Error::State(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::format("bad marker");
        assert_eq!(err.to_string(), "Invalid MIDI data: bad marker");
        assert!(err.is_format());
        assert!(!err.is_argument());

        let err = Error::state("sequencer is playing");
        assert_eq!(err.to_string(), "Invalid sequencer state: sequencer is playing");
        assert!(err.is_state());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.mid");
        let err: Error = io.into();
        match err {
            Error::Io(inner) => assert_eq!(inner.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }
}
