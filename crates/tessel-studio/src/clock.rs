use std::time::{Duration, Instant};

/// Per-frame delta time, clamped so animation stays stable after stalls.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,

    window_start: Instant,
    window_frames: u32,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last: now,
            frame_index: 0,
            dt_min: Duration::from_micros(100),
            dt_max: Duration::from_millis(250),
            window_start: now,
            window_frames: 0,
        }
    }

    /// Resets the baseline, e.g. after the context comes back.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Advances one frame and returns the clamped delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;
        self.frame_index = self.frame_index.wrapping_add(1);
        self.window_frames += 1;
        dt.as_secs_f32()
    }

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Frames per second over the last `every`, once per `every`.
    pub fn fps(&mut self, every: Duration) -> Option<f32> {
        let elapsed = self.last.saturating_duration_since(self.window_start);
        if elapsed < every {
            return None;
        }
        let fps = self.window_frames as f32 / elapsed.as_secs_f32();
        self.window_start = self.last;
        self.window_frames = 0;
        Some(fps)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
