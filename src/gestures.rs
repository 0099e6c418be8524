use serde::Serialize;

use crate::config::Thresholds;
use crate::pose::Pose;
use crate::smoother::Smoothing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Left,
    Right,
}

impl SwipeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    SwipeLeft,
    SwipeRight,
}

impl Gesture {
    pub fn from_direction(dir: SwipeDirection) -> Self {
        match dir {
            SwipeDirection::Left => Gesture::SwipeLeft,
            SwipeDirection::Right => Gesture::SwipeRight,
        }
    }

    pub fn direction(&self) -> SwipeDirection {
        match self {
            Gesture::SwipeLeft => SwipeDirection::Left,
            Gesture::SwipeRight => SwipeDirection::Right,
        }
    }

    /// Key under `[bindings]` in a profile.
    pub fn binding_key(&self) -> &'static str {
        match self {
            Gesture::SwipeLeft => "swipe.left",
            Gesture::SwipeRight => "swipe.right",
        }
    }
}

/// Per-frame readiness; `direction` is `Some` only when `ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwipeSignal {
    pub ready: bool,
    pub direction: Option<SwipeDirection>,
}

/// Readiness ignores cooldown and the enabled flag; the gate handles those.
pub fn evaluate(pose: Pose, smoothing: &Smoothing, th: &Thresholds) -> SwipeSignal {
    let Smoothing::Full(st) = smoothing else {
        return SwipeSignal::default();
    };
    let ready = pose == Pose::Open
        && st.dx.unsigned_abs() > th.swipe_threshold_px
        && st.speed > th.swipe_speed_px_per_ms;
    if !ready {
        return SwipeSignal::default();
    }
    SwipeSignal {
        ready,
        direction: Some(if st.dx > 0 {
            SwipeDirection::Right
        } else {
            SwipeDirection::Left
        }),
    }
}

/// Cooldown + on/off switch in front of the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct GestureGate {
    enabled: bool,
    last_trigger_ms: Option<u64>,
}

impl Default for GestureGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl GestureGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last_trigger_ms: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, en: bool) {
        self.enabled = en;
    }

    /// Flips `enabled` and returns the new value. Cooldown is untouched.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    pub fn last_trigger_ms(&self) -> Option<u64> {
        self.last_trigger_ms
    }

    fn cooled_down(&self, now_ms: u64, th: &Thresholds) -> bool {
        match self.last_trigger_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) > th.gesture_cooldown_ms,
        }
    }

    /// `has_baseline` is false on the first frame after a hand (re)appears.
    pub fn admit(
        &mut self,
        signal: SwipeSignal,
        has_baseline: bool,
        now_ms: u64,
        th: &Thresholds,
    ) -> Option<Gesture> {
        if !self.enabled || !has_baseline || !signal.ready {
            return None;
        }
        let dir = signal.direction?;
        if !self.cooled_down(now_ms, th) {
            return None;
        }
        self.last_trigger_ms = Some(now_ms);
        Some(Gesture::from_direction(dir))
    }
}
