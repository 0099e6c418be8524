//! Per-frame pipeline: classify → smooth → detect → gate.
//!
//! All loop state lives in [`RecognizerState`], which is moved into
//! [`process_frame`] and handed back together with the frame's outcome, so a
//! whole session can be replayed as a fold over frames.

use log::warn;

use crate::config::Thresholds;
use crate::gestures::{Gesture, GestureGate, SwipeDirection, SwipeSignal, evaluate};
use crate::landmarks::HandFrame;
use crate::pose::{Pose, classify};
use crate::smoother::{PositionSmoother, SmoothedState, Smoothing};

#[derive(Debug, Clone, Copy)]
pub enum FrameInput<'a> {
    Hand(&'a HandFrame),
    NoHand { t_ms: u64 },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecognizerState {
    smoother: PositionSmoother,
    gate: GestureGate,
    /// Last frame's x (smoothed once the window is full); `None` after a reset.
    prev_x: Option<i32>,
}

impl RecognizerState {
    pub fn new(enabled: bool) -> Self {
        Self {
            gate: GestureGate::new(enabled),
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    pub fn set_enabled(&mut self, en: bool) {
        self.gate.set_enabled(en);
    }

    pub fn toggle(&mut self) -> bool {
        self.gate.toggle()
    }

    pub fn buffered(&self) -> usize {
        self.smoother.len()
    }

    fn clear_hand(&mut self) {
        self.smoother.reset();
        self.prev_x = None;
    }
}

/// What the display layer and dispatcher need from one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    pub t_ms: u64,
    pub pose: Option<Pose>,
    /// Window summary once the smoother is full.
    pub smoothed: Option<SmoothedState>,
    pub ready: bool,
    pub direction: Option<SwipeDirection>,
    pub gesture: Option<Gesture>,
    pub enabled: bool,
    /// A gesture fired within the last `flash_ms`.
    pub flash: bool,
}

pub fn process_frame(
    mut state: RecognizerState,
    input: FrameInput<'_>,
    th: &Thresholds,
) -> (RecognizerState, FrameOutcome) {
    let (t_ms, hand) = match input {
        FrameInput::Hand(f) => (f.t_ms, Some(f)),
        FrameInput::NoHand { t_ms } => (t_ms, None),
    };

    // an invalid landmark set is handled exactly like a frame without a hand
    let tracked = hand.and_then(|f| match classify(&f.landmarks) {
        Ok(pose) => f.index_tip_px().map(|x| (pose, x)),
        Err(e) => {
            warn!("skipping frame at {} ms: {e}", f.t_ms);
            None
        }
    });

    let Some((pose, finger_x)) = tracked else {
        state.clear_hand();
        let out = outcome(&state, t_ms, None, None, SwipeSignal::default(), None, th);
        return (state, out);
    };

    let smoothing = state.smoother.push(finger_x, t_ms);
    let signal = evaluate(pose, &smoothing, th);
    let gesture = match smoothing {
        Smoothing::Incomplete => {
            state.prev_x = Some(finger_x);
            None
        }
        Smoothing::Full(st) => {
            let g = state
                .gate
                .admit(signal, state.prev_x.is_some(), t_ms, th);
            state.prev_x = Some(st.smoothed_x);
            g
        }
    };

    let smoothed = match smoothing {
        Smoothing::Full(st) => Some(st),
        Smoothing::Incomplete => None,
    };
    let out = outcome(&state, t_ms, Some(pose), smoothed, signal, gesture, th);
    (state, out)
}

fn outcome(
    state: &RecognizerState,
    t_ms: u64,
    pose: Option<Pose>,
    smoothed: Option<SmoothedState>,
    signal: SwipeSignal,
    gesture: Option<Gesture>,
    th: &Thresholds,
) -> FrameOutcome {
    let flash = state
        .gate
        .last_trigger_ms()
        .is_some_and(|last| t_ms.saturating_sub(last) < th.flash_ms);
    FrameOutcome {
        t_ms,
        pose,
        smoothed,
        ready: signal.ready,
        direction: signal.direction,
        gesture,
        enabled: state.gate.is_enabled(),
        flash,
    }
}
