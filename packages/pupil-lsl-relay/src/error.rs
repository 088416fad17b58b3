// Error types shared by the recorder, relay and transport layers

use thiserror::Error;

/// Result type for relay and recorder operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur while recording or relaying streams
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Timed out connecting to stream {label} after {timeout_secs}s")]
    ConnectTimeout { label: String, timeout_secs: f64 },

    #[error("Lost connection to stream: {0}")]
    ConnectionLost(String),

    #[error("Time correction for {label} timed out after {timeout_secs}s")]
    CorrectionTimeout { label: String, timeout_secs: f64 },

    #[error("Unknown outlet type: {0}")]
    UnknownOutletType(String),

    #[error("Unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Resampling error: {0}")]
    Resampling(String),

    #[error("Invalid recorder state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl RelayError {
    /// Stream loss is an expected runtime condition (device unplugged, network
    /// drop) and ends only the affected recorder.
    pub fn is_stream_loss(&self) -> bool {
        matches!(self, RelayError::ConnectionLost(_))
    }

    /// Timeouts that leave the connection usable on a later tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::CorrectionTimeout { .. })
    }
}

/// Failure to extract a channel value from an event
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("field `{field}` is not available on {event} events")]
    MissingField {
        field: &'static str,
        event: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_loss_classification() {
        assert!(RelayError::ConnectionLost("eeg (lab-pc)".into()).is_stream_loss());
        assert!(!RelayError::UnknownOutletType("Foo".into()).is_stream_loss());

        let timeout = RelayError::CorrectionTimeout {
            label: "eeg (lab-pc)".into(),
            timeout_secs: 1.0,
        };
        assert!(timeout.is_transient());
        assert!(!timeout.is_stream_loss());
    }

    #[test]
    fn test_extract_error_wraps_into_relay_error() {
        let err: RelayError = ExtractError::MissingField {
            field: "dispersion",
            event: "gaze",
        }
        .into();
        assert!(err.to_string().contains("dispersion"));
    }
}
