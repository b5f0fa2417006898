use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Counts loop iterations and reports the count once per elapsed window.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    frames: u32,
    window_start: Instant,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            window_start: now,
        }
    }

    /// Records one iteration. Returns the window's count when it closes.
    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;
        if now.duration_since(self.window_start) < WINDOW {
            return None;
        }
        let fps = self.frames;
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_once_per_window() {
        let t0 = Instant::now();
        let mut counter = FpsCounter::new(t0);

        for i in 1..30 {
            assert_eq!(counter.tick(t0 + Duration::from_millis(i * 33)), None);
        }
        assert_eq!(counter.tick(t0 + Duration::from_millis(1000)), Some(30));
        assert_eq!(counter.tick(t0 + Duration::from_millis(1010)), None);
    }

    #[test]
    fn test_window_restarts_at_report() {
        let t0 = Instant::now();
        let mut counter = FpsCounter::new(t0);

        assert_eq!(counter.tick(t0 + Duration::from_millis(1500)), Some(1));
        assert_eq!(counter.tick(t0 + Duration::from_millis(2400)), None);
        assert_eq!(counter.tick(t0 + Duration::from_millis(2500)), Some(2));
    }
}
