//! Heartbeat scheduling.

/// Tick-counted heartbeat schedule.
///
/// The gateway main loop advances this once per steady-state tick; `tick`
/// returns true exactly when the configured number of ticks has elapsed and
/// the next cycle starts.
#[derive(Debug)]
pub struct HeartbeatScheduler {
    threshold: u32,
    counter: u32,
}

impl HeartbeatScheduler {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counter: 0,
        }
    }

    /// Advance one tick. True means a heartbeat is due now.
    pub fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.threshold {
            self.counter = 0;
            return true;
        }
        false
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}
