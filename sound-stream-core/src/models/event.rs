use serde::{Deserialize, Serialize};

use super::format::PcmChunk;
use super::state::StreamState;

/// Event category used by hosts to route events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    RecorderEvent,
    PlayerEvent,
    PlatformEvent,
}

/// Fire-and-forget notification from an engine to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    RecorderStatus(StreamState),
    PlayerStatus(StreamState),
    /// One capture period of wire-format audio.
    DataPeriod(PcmChunk),
    DebugPrint(String),
}

impl StreamEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::RecorderStatus(_) | Self::DataPeriod(_) => EventType::RecorderEvent,
            Self::PlayerStatus(_) => EventType::PlayerEvent,
            Self::DebugPrint(_) => EventType::PlatformEvent,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RecorderStatus(_) => "recorderStatus",
            Self::PlayerStatus(_) => "playerStatus",
            Self::DataPeriod(_) => "dataPeriod",
            Self::DebugPrint(_) => "debugPrint",
        }
    }

    /// Host-transport view of the event: `{type, name, data}`.
    pub fn to_payload(&self) -> EventPayload {
        let data = match self {
            Self::RecorderStatus(state) | Self::PlayerStatus(state) => EventData::Status(*state),
            Self::DataPeriod(chunk) => EventData::Bytes(chunk.as_bytes().to_vec()),
            Self::DebugPrint(message) => EventData::Text(message.clone()),
        };
        EventPayload {
            event_type: self.event_type(),
            name: self.name(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub name: &'static str,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Status(StreamState),
    Bytes(Vec<u8>),
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_payload_shape() {
        let event = StreamEvent::PlayerStatus(StreamState::Running);
        let json = serde_json::to_value(event.to_payload()).unwrap();
        assert_eq!(json["type"], "playerEvent");
        assert_eq!(json["name"], "playerStatus");
        assert_eq!(json["data"], "playing");
    }

    #[test]
    fn data_period_is_a_recorder_event() {
        let event = StreamEvent::DataPeriod(PcmChunk::from_i16(16000, &[1, 2]));
        assert_eq!(event.event_type(), EventType::RecorderEvent);
        let json = serde_json::to_value(event.to_payload()).unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 0, 2, 0]));
    }

    #[test]
    fn debug_print_is_a_platform_event() {
        let event = StreamEvent::DebugPrint("granted".into());
        assert_eq!(event.event_type(), EventType::PlatformEvent);
        assert_eq!(event.name(), "debugPrint");
    }
}
