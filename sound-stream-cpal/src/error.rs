use sound_stream_core::StreamError;
use thiserror::Error;

/// Failures talking to the host audio API.
#[derive(Debug, Error)]
pub enum CpalBackendError {
    #[error("no {0} device available")]
    NoDevice(&'static str),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("device does not support {0}")]
    UnsupportedConfig(String),

    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to query supported stream configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to play stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("stream thread: {0}")]
    Thread(String),
}

impl From<CpalBackendError> for StreamError {
    fn from(error: CpalBackendError) -> Self {
        match error {
            CpalBackendError::UnsupportedConfig(_) => StreamError::UnsupportedFormat(error.to_string()),
            CpalBackendError::BuildStream(cpal::BuildStreamError::StreamConfigNotSupported) => {
                StreamError::UnsupportedFormat(error.to_string())
            }
            other => StreamError::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_config_maps_to_unsupported_format() {
        let error: StreamError = CpalBackendError::UnsupportedConfig("7 channels".into()).into();
        assert_eq!(error.code(), "unsupportedFormat");
    }

    #[test]
    fn missing_device_is_unknown() {
        let error: StreamError = CpalBackendError::NoDevice("input").into();
        assert_eq!(error, StreamError::Unknown("no input device available".into()));
    }
}
