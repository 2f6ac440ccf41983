use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the capture and playback engines.
///
/// Errors from one-shot commands are returned to the caller; errors raised
/// inside a hardware callback are logged and never reach this type's callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("failed to start recording: {0}")]
    CaptureStartFailed(String),

    #[error("failed to start player: {0}")]
    PlaybackStartFailed(String),

    #[error("failed to stop: {0}")]
    StopFailed(String),

    #[error("failed to write player buffer: {0}")]
    WriteBufferFailed(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl StreamError {
    /// Stable error code reported to the host.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permissionDenied",
            Self::CaptureStartFailed(_) => "failedToRecord",
            Self::PlaybackStartFailed(_) => "failedToPlay",
            Self::StopFailed(_) => "failedToStop",
            Self::WriteBufferFailed(_) => "failedToWriteBuffer",
            Self::UnsupportedFormat(_) => "unsupportedFormat",
            Self::InvalidArgument(_) => "invalidArgument",
            Self::Unknown(_) => "unknown",
        }
    }

    pub fn to_reply(&self) -> ErrorReply {
        ErrorReply {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Serializable failure result for a host command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReply {
    pub code: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_host_names() {
        assert_eq!(StreamError::PermissionDenied.code(), "permissionDenied");
        assert_eq!(StreamError::CaptureStartFailed("x".into()).code(), "failedToRecord");
        assert_eq!(StreamError::WriteBufferFailed("x".into()).code(), "failedToWriteBuffer");
    }

    #[test]
    fn reply_serializes_code_and_message() {
        let reply = StreamError::InvalidArgument("chunk is empty".into()).to_reply();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["code"], "invalidArgument");
        assert_eq!(json["message"], "invalid argument: chunk is empty");
    }
}
