use serde::{Deserialize, Serialize};

/// Direction of an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Input,
    Output,
}

/// An audio device available for capture or playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub is_default: bool,
}

/// Counters for a capture engine since its last `initialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    pub callback_count: u64,
    pub periods_emitted: u64,
    pub frames_emitted: u64,
    /// Periods lost to conversion errors or lock contention.
    pub periods_dropped: u64,
    /// Frames discarded because the capture buffer overflowed.
    pub overflow_frames: u64,
}

/// Counters for a playback engine since its last `initialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackDiagnostics {
    pub chunks_queued: u64,
    /// Chunks rejected by conversion or discarded by `stop`.
    pub chunks_dropped: u64,
    /// Output callbacks that had to be padded with silence.
    pub underruns: u64,
    pub frames_rendered: u64,
}
