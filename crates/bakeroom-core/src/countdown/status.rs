use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownStatus {
    Idle,
    Running,
    Paused,
    /// Stopped by the caller. Terminal until started again.
    Stopped,
    /// Reached zero. Terminal until started again.
    Done,
}

impl CountdownStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountdownStatus::Idle => "idle",
            CountdownStatus::Running => "running",
            CountdownStatus::Paused => "paused",
            CountdownStatus::Stopped => "stopped",
            CountdownStatus::Done => "done",
        }
    }

    /// Whether `start()` is accepted from this status.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            CountdownStatus::Idle | CountdownStatus::Stopped | CountdownStatus::Done
        )
    }
}

impl std::fmt::Display for CountdownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an observer sees: the derived seconds and the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownView {
    pub seconds_left: u64,
    pub status: CountdownStatus,
}

impl CountdownView {
    /// `mm:ss`, or `h:mm:ss` once the countdown spans an hour.
    pub fn clock_face(&self) -> String {
        let h = self.seconds_left / 3600;
        let m = (self.seconds_left % 3600) / 60;
        let s = self.seconds_left % 60;
        if h > 0 {
            format!("{h}:{m:02}:{s:02}")
        } else {
            format!("{m:02}:{s:02}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&CountdownStatus::Done).unwrap();
        assert_eq!(json, "\"done\"");
        let parsed: CountdownStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(parsed, CountdownStatus::Paused);
    }

    #[test]
    fn clock_face_formats() {
        let view = |seconds_left| CountdownView {
            seconds_left,
            status: CountdownStatus::Running,
        };
        assert_eq!(view(0).clock_face(), "00:00");
        assert_eq!(view(75).clock_face(), "01:15");
        assert_eq!(view(3_600).clock_face(), "1:00:00");
        assert_eq!(view(5_025).clock_face(), "1:23:45");
    }
}
