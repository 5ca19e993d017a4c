use serde::{Deserialize, Serialize};

/// Lifecycle of the sampling loop.
///
/// `Idle` before the first start, `Running` while the loop owns the frame
/// source, `Stopping` between cancellation and join, `Stopped` afterwards or
/// when the source could not be opened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoopStatus {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl Default for LoopStatus {
    fn default() -> Self {
        LoopStatus::Idle
    }
}

impl LoopStatus {
    pub fn is_running(self) -> bool {
        self == LoopStatus::Running
    }

    /// Whether `start()` may begin a new session from this state.
    pub fn can_start(self) -> bool {
        matches!(self, LoopStatus::Idle | LoopStatus::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_and_stopped_can_start() {
        assert!(LoopStatus::Idle.can_start());
        assert!(LoopStatus::Stopped.can_start());
        assert!(!LoopStatus::Running.can_start());
        assert!(!LoopStatus::Stopping.can_start());
    }

    #[test]
    fn serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&LoopStatus::Stopping).unwrap(),
            "\"stopping\""
        );
    }
}
