use serde::Deserialize;

use super::error::StreamError;
use super::format::AudioFormatDescriptor;

/// Default rate for both engines when the host does not pass one.
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Lowest capture period/output buffer a configuration may request.
pub const MIN_PERIOD_FLOOR_MS: u32 = 10;

/// Configuration for the capture engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfiguration {
    /// Wire sample rate in Hz (default: 16000).
    pub sample_rate: u32,

    /// Channel count; only mono is supported.
    pub channels: u16,

    /// Emit `debugPrint` events in addition to `log` output.
    #[serde(alias = "showLogs")]
    pub debug_logging: bool,

    /// Lower bound on the capture period when the backend cannot report one (default: 20).
    pub min_period_ms: u32,
}

impl CaptureConfiguration {
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn wire_format(&self) -> AudioFormatDescriptor {
        AudioFormatDescriptor::wire(self.sample_rate)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.sample_rate == 0 {
            return Err(StreamError::InvalidArgument("sample rate must be positive".into()));
        }
        if self.channels != 1 {
            return Err(StreamError::UnsupportedFormat(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        if self.min_period_ms < MIN_PERIOD_FLOOR_MS {
            return Err(StreamError::InvalidArgument(format!(
                "capture period must be at least {} ms",
                MIN_PERIOD_FLOOR_MS
            )));
        }
        Ok(())
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            debug_logging: false,
            min_period_ms: 20,
        }
    }
}

/// Configuration for the playback engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackConfiguration {
    /// Wire sample rate of chunks passed to `write_chunk` (default: 16000).
    pub sample_rate: u32,

    #[serde(alias = "showLogs")]
    pub debug_logging: bool,

    /// Lower bound on the output buffer when the backend cannot report one (default: 20).
    pub min_buffer_ms: u32,

    /// Maximum number of converted chunks waiting for the output stream (default: 64).
    pub queue_capacity: usize,
}

impl PlaybackConfiguration {
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn wire_format(&self) -> AudioFormatDescriptor {
        AudioFormatDescriptor::wire(self.sample_rate)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.sample_rate == 0 {
            return Err(StreamError::InvalidArgument("sample rate must be positive".into()));
        }
        if self.min_buffer_ms < MIN_PERIOD_FLOOR_MS {
            return Err(StreamError::InvalidArgument(format!(
                "output buffer must be at least {} ms",
                MIN_PERIOD_FLOOR_MS
            )));
        }
        if self.queue_capacity == 0 {
            return Err(StreamError::InvalidArgument("queue capacity must be positive".into()));
        }
        Ok(())
    }
}

impl Default for PlaybackConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            debug_logging: false,
            min_buffer_ms: 20,
            queue_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CaptureConfiguration::default().validate().is_ok());
        assert!(PlaybackConfiguration::default().validate().is_ok());
        assert_eq!(CaptureConfiguration::default().sample_rate, 16000);
    }

    #[test]
    fn capture_rejects_stereo_and_short_periods() {
        let stereo = CaptureConfiguration {
            channels: 2,
            ..Default::default()
        };
        assert!(matches!(stereo.validate(), Err(StreamError::UnsupportedFormat(_))));

        let tiny = CaptureConfiguration {
            min_period_ms: 5,
            ..Default::default()
        };
        assert!(matches!(tiny.validate(), Err(StreamError::InvalidArgument(_))));
    }

    #[test]
    fn playback_rejects_zero_rate_and_queue() {
        assert!(PlaybackConfiguration::with_sample_rate(0).validate().is_err());
        let no_queue = PlaybackConfiguration {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(no_queue.validate().is_err());
    }

    #[test]
    fn deserializes_host_arguments() {
        let config: CaptureConfiguration =
            serde_json::from_str(r#"{"sampleRate": 44100, "showLogs": true}"#).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert!(config.debug_logging);
        assert_eq!(config.channels, 1);

        let config: PlaybackConfiguration = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PlaybackConfiguration::default());
    }
}
