use serde::{Deserialize, Serialize};

/// Per-engine stream state machine.
///
/// State transitions:
/// ```text
/// unset → initialized → running ⇄ stopped
///   ↑          └──── initialize (again) ────┘
///   └──────────────── close ────────────────
/// ```
///
/// `Running` is reported to hosts as `playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    #[default]
    Unset,
    Initialized,
    #[serde(rename = "playing")]
    Running,
    Stopped,
}

impl StreamState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether `start` may transition into `Running` from here.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Initialized | Self::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Initialized => "initialized",
            Self::Running => "playing",
            Self::Stopped => "stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_serializes_as_playing() {
        assert_eq!(serde_json::to_string(&StreamState::Running).unwrap(), "\"playing\"");
        assert_eq!(serde_json::to_string(&StreamState::Unset).unwrap(), "\"unset\"");
        assert_eq!(StreamState::Running.as_str(), "playing");
    }

    #[test]
    fn start_only_from_initialized_or_stopped() {
        assert!(!StreamState::Unset.can_start());
        assert!(StreamState::Initialized.can_start());
        assert!(StreamState::Stopped.can_start());
        assert!(!StreamState::Running.can_start());
    }
}
