//! Sliding window over recent index-fingertip positions.

/// Window length in frames.
pub const BUFFER_SIZE: usize = 7;

/// Motion summary over a full window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedState {
    /// Mean x over the window, truncated toward zero.
    pub smoothed_x: i32,
    /// newest - oldest; positive is rightward.
    pub dx: i32,
    pub dt_ms: u64,
    /// |dx| / dt in px/ms, 0 when dt is 0.
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
    Incomplete,
    Full(SmoothedState),
}

/// Two parallel fixed rings (x, t); `head` is the oldest slot.
#[derive(Debug, Clone, Copy)]
pub struct PositionSmoother {
    xs: [i32; BUFFER_SIZE],
    ts: [u64; BUFFER_SIZE],
    head: usize,
    len: usize,
}

impl Default for PositionSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionSmoother {
    pub fn new() -> Self {
        Self {
            xs: [0; BUFFER_SIZE],
            ts: [0; BUFFER_SIZE],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == BUFFER_SIZE
    }

    /// Hard reset; the next push starts from empty.
    pub fn reset(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    pub fn push(&mut self, x: i32, t_ms: u64) -> Smoothing {
        if self.len < BUFFER_SIZE {
            let idx = (self.head + self.len) % BUFFER_SIZE;
            self.xs[idx] = x;
            self.ts[idx] = t_ms;
            self.len += 1;
        } else {
            // overwrite the oldest
            self.xs[self.head] = x;
            self.ts[self.head] = t_ms;
            self.head = (self.head + 1) % BUFFER_SIZE;
        }

        if !self.is_full() {
            return Smoothing::Incomplete;
        }
        Smoothing::Full(self.summarize())
    }

    fn summarize(&self) -> SmoothedState {
        let oldest = self.head;
        let newest = (self.head + BUFFER_SIZE - 1) % BUFFER_SIZE;

        let sum: i64 = self.xs.iter().map(|&x| x as i64).sum();
        let smoothed_x = (sum / BUFFER_SIZE as i64) as i32;
        let dx = self.xs[newest].saturating_sub(self.xs[oldest]);
        let dt_ms = self.ts[newest].saturating_sub(self.ts[oldest]);
        let speed = if dt_ms > 0 {
            dx.unsigned_abs() as f32 / dt_ms as f32
        } else {
            0.0
        };

        SmoothedState {
            smoothed_x,
            dx,
            dt_ms,
            speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(s: &mut PositionSmoother, xs: &[i32], t0: u64, step: u64) -> Smoothing {
        let mut last = Smoothing::Incomplete;
        for (i, &x) in xs.iter().enumerate() {
            last = s.push(x, t0 + i as u64 * step);
        }
        last
    }

    #[test]
    fn incomplete_until_window_is_full() {
        let mut s = PositionSmoother::new();
        for i in 0..BUFFER_SIZE - 1 {
            assert_eq!(s.push(100, i as u64), Smoothing::Incomplete);
        }
        assert!(matches!(s.push(100, 6), Smoothing::Full(_)));
        assert_eq!(s.len(), BUFFER_SIZE);
    }

    #[test]
    fn rightward_sequence() {
        let mut s = PositionSmoother::new();
        let Smoothing::Full(st) = fill(&mut s, &[100, 105, 110, 150, 190, 200, 210], 0, 1) else {
            panic!("window should be full");
        };
        assert_eq!(st.dx, 110);
        assert_eq!(st.dt_ms, 6);
        assert_eq!(st.smoothed_x, 152);
        assert!((st.speed - 110.0 / 6.0).abs() < 1e-4);
    }

    #[test]
    fn oldest_sample_is_evicted() {
        let mut s = PositionSmoother::new();
        fill(&mut s, &[0, 10, 20, 30, 40, 50, 60], 0, 10);
        let Smoothing::Full(st) = s.push(70, 70) else {
            panic!("window should be full");
        };
        // window is now 10..=70 over t 10..=70
        assert_eq!(st.dx, 60);
        assert_eq!(st.dt_ms, 60);
        assert_eq!(st.smoothed_x, 40);
        assert_eq!(s.len(), BUFFER_SIZE);
    }

    #[test]
    fn zero_dt_gives_zero_speed() {
        let mut s = PositionSmoother::new();
        let Smoothing::Full(st) = fill(&mut s, &[0, 0, 0, 0, 0, 0, 500], 42, 0) else {
            panic!("window should be full");
        };
        assert_eq!(st.dx, 500);
        assert_eq!(st.dt_ms, 0);
        assert_eq!(st.speed, 0.0);
    }

    #[test]
    fn reset_starts_over() {
        let mut s = PositionSmoother::new();
        fill(&mut s, &[1, 2, 3, 4, 5, 6, 7, 8, 9], 0, 1);
        s.reset();
        assert_eq!(s.len(), 0);
        for i in 0..BUFFER_SIZE - 1 {
            assert_eq!(s.push(5, 100 + i as u64), Smoothing::Incomplete);
        }
        let Smoothing::Full(st) = s.push(5, 200) else {
            panic!("window should be full");
        };
        assert_eq!(st.dx, 0);
        assert_eq!(st.dt_ms, 100);
    }

    #[test]
    fn mean_truncates_toward_zero() {
        let mut s = PositionSmoother::new();
        let Smoothing::Full(st) = fill(&mut s, &[-1, -1, -1, 0, 0, 0, 0], 0, 1) else {
            panic!("window should be full");
        };
        assert_eq!(st.smoothed_x, 0);
    }

    #[test]
    fn extreme_positions_saturate() {
        let mut s = PositionSmoother::new();
        let xs = [i32::MIN, 0, 0, 0, 0, 0, i32::MAX];
        let Smoothing::Full(st) = fill(&mut s, &xs, 0, 1) else {
            panic!("window should be full");
        };
        assert_eq!(st.dx, i32::MAX);
        assert_eq!(st.smoothed_x, 0);

        let Smoothing::Full(st) = fill(&mut s, &[i32::MAX, 0, 0, 0, 0, 0, i32::MIN], 10, 1) else {
            panic!("window should be full");
        };
        assert_eq!(st.dx, i32::MIN);
        assert!(st.speed > 0.0);
    }
}
