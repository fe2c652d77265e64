use serde::{Deserialize, Serialize};

/// Default phase durations in minutes.
pub const EXPOSE_MINUTES: i64 = 5;
pub const ENTRETIEN_MINUTES: i64 = 10;

/// Countdown stopwatch for one examination phase. Tick-driven: the caller
/// advances it one second at a time while running; remaining time goes
/// negative in overtime rather than stopping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    initial_seconds: i64,
    remaining_seconds: i64,
    elapsed_seconds: i64,
    running: bool,
}

impl Countdown {
    pub fn new(minutes: i64) -> Countdown {
        Countdown {
            initial_seconds: minutes * 60,
            remaining_seconds: minutes * 60,
            elapsed_seconds: 0,
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.remaining_seconds = self.initial_seconds;
        self.elapsed_seconds = 0;
    }

    pub fn set_duration(&mut self, minutes: i64) {
        self.running = false;
        self.initial_seconds = minutes * 60;
        self.remaining_seconds = minutes * 60;
        self.elapsed_seconds = 0;
    }

    /// Advances the clock by `seconds`. Ignored while paused.
    pub fn tick(&mut self, seconds: i64) {
        if !self.running {
            return;
        }
        self.remaining_seconds -= seconds;
        self.elapsed_seconds += seconds;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn initial_seconds(&self) -> i64 {
        self.initial_seconds
    }

    pub fn remaining_seconds(&self) -> i64 {
        self.remaining_seconds
    }

    pub fn elapsed_seconds(&self) -> i64 {
        self.elapsed_seconds
    }

    pub fn is_overtime(&self) -> bool {
        self.remaining_seconds < 0
    }

    /// Last 30 seconds before the deadline.
    pub fn is_alert(&self) -> bool {
        self.remaining_seconds > 0 && self.remaining_seconds <= 30
    }

    /// `MM:SS`, prefixed with `-` once in overtime.
    pub fn time_string(&self) -> String {
        let abs = self.remaining_seconds.abs();
        format!(
            "{}{:02}:{:02}",
            if self.is_overtime() { "-" } else { "" },
            abs / 60,
            abs % 60
        )
    }
}

/// Phase-duration record stored on the evaluation once a phase ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerData {
    pub expected_seconds: i64,
    pub actual_seconds: i64,
}
