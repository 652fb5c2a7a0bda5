//! Millisecond clock and frame pacing.
//!
//! Times are 32-bit millisecond counters that wrap after ~49.7 days; every
//! comparison goes through `wrapping_sub` so the rollover is invisible.

use std::time::Instant;

/// Milliseconds since the clock was created, truncated to 32 bits.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides when the next frame is due.
#[derive(Debug)]
pub struct FramePacer {
    interval_ms: u32,
    last_ms: Option<u32>,
}

impl FramePacer {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// True when a frame should go out at `now_ms`; records it as sent.
    ///
    /// The first call is always due.
    pub fn due(&mut self, now_ms: u32) -> bool {
        match self.last_ms {
            Some(last) if now_ms.wrapping_sub(last) < self.interval_ms => false,
            _ => {
                self.last_ms = Some(now_ms);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_due() {
        let mut pacer = FramePacer::new(100);
        assert!(pacer.due(5_000));
    }

    #[test]
    fn waits_for_interval() {
        let mut pacer = FramePacer::new(100);
        assert!(pacer.due(0));
        assert!(!pacer.due(50));
        assert!(!pacer.due(99));
        assert!(pacer.due(100));
        assert!(!pacer.due(150));
    }

    #[test]
    fn survives_rollover() {
        let mut pacer = FramePacer::new(100);
        assert!(pacer.due(u32::MAX - 40));
        assert!(!pacer.due(20));
        assert!(pacer.due(60));
    }

    #[test]
    fn clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now_ms().wrapping_sub(a) >= 5);
    }
}
