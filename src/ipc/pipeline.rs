use anyhow::Result;
use log::{debug, error, info, warn};
use std::io::BufRead;
use std::sync::mpsc::{Receiver, Sender};

use super::server::DaemonEvent;
use crate::actions::UinputSink;
use crate::config::Profile;
use crate::landmarks::{Control, FrameSource, Observation};
use crate::recognizer::{FrameInput, FrameOutcome, RecognizerState, process_frame};

/// Commands from the control plane; applied between frames.
pub enum PipelineCmd {
    Toggle,
    SetEnabled(bool),
    UpdateProfile(Profile),
}

const STATS_EVERY: u64 = 30;

/// Drives one observation through the recognizer and applies its keypress.
/// The flag is `false` once the capture asked to quit.
fn step(state: &mut RecognizerState, obs: &Observation, profile: &Profile) -> (FrameOutcome, bool) {
    let input = match &obs.hand {
        Some(h) => FrameInput::Hand(h),
        None => FrameInput::NoHand { t_ms: obs.t_ms },
    };
    let (next, out) = process_frame(*state, input, &profile.thresholds);
    *state = next;

    // keypresses ride on the frame they arrived with and affect the next one
    let keep_going = match obs.control {
        Some(Control::Toggle) => {
            let en = state.toggle();
            info!("gesture control {}", if en { "enabled" } else { "disabled" });
            true
        }
        Some(Control::Quit) => false,
        None => true,
    };
    (out, keep_going)
}

pub fn run_pipeline<R: BufRead>(
    source: R,
    mut profile: Profile,
    mut sink: UinputSink,
    rx_cmd: Receiver<PipelineCmd>,
    tx_evt: Sender<DaemonEvent>,
) -> Result<()> {
    if sink.is_noop() {
        warn!("pipeline: no virtual keyboard; gestures will be logged only");
    }
    let mut frames = FrameSource::new(source, profile.input.max_num_hands);
    let mut state = RecognizerState::new(true);

    let mut seen: u64 = 0;
    let mut window_start_ms: Option<u64> = None;

    loop {
        while let Ok(cmd) = rx_cmd.try_recv() {
            match cmd {
                PipelineCmd::Toggle => {
                    let en = state.toggle();
                    info!("gesture control {}", if en { "enabled" } else { "disabled" });
                    let _ = tx_evt.send(DaemonEvent::Enabled(en));
                }
                PipelineCmd::SetEnabled(en) => {
                    state.set_enabled(en);
                    info!("gesture control {}", if en { "enabled" } else { "disabled" });
                    let _ = tx_evt.send(DaemonEvent::Enabled(en));
                }
                PipelineCmd::UpdateProfile(p) => {
                    profile = p;
                    debug!("pipeline: thresholds now {:?}", profile.thresholds);
                }
            }
        }

        let Some(obs) = frames.next_observation()? else {
            info!("frames: end of stream after {seen} frames");
            break;
        };

        let was_enabled = state.is_enabled();
        let buffered_before = state.buffered();
        let (out, keep_going) = step(&mut state, &obs, &profile);
        seen += 1;

        if let Some(g) = out.gesture {
            info!(
                "swiped {} at {} ms -> {}",
                g.direction().as_str(),
                out.t_ms,
                profile.action_for(&g)
            );
            if let Err(e) = super::dispatch::dispatch_gesture(&g, &profile, &mut sink) {
                error!("dispatch failed: {e}");
            }
            let _ = tx_evt.send(DaemonEvent::Gesture {
                direction: g.direction(),
                t_ms: out.t_ms,
            });
        } else if let (true, Some(st)) = (out.ready, out.smoothed) {
            debug!(
                "swipe ready ({:?}) at {} ms: dx={} dt={}ms speed={:.2}px/ms",
                out.direction, out.t_ms, st.dx, st.dt_ms, st.speed
            );
        }
        if obs.hand.is_none() && buffered_before > 0 {
            debug!("hand lost; dropped {buffered_before} buffered samples");
        }
        if state.is_enabled() != was_enabled {
            let _ = tx_evt.send(DaemonEvent::Enabled(state.is_enabled()));
        }

        if seen % STATS_EVERY == 0 {
            let start = *window_start_ms.get_or_insert(obs.t_ms);
            let fps = if obs.t_ms > start {
                (STATS_EVERY as f64 * 1000.0) / (obs.t_ms - start) as f64
            } else {
                0.0
            };
            window_start_ms = Some(obs.t_ms);
            let _ = tx_evt.send(DaemonEvent::Stats { frames: seen, fps });
        } else if window_start_ms.is_none() {
            window_start_ms = Some(obs.t_ms);
        }

        if !keep_going {
            info!("frames: quit requested by capture");
            break;
        }
    }

    let _ = tx_evt.send(DaemonEvent::Stats { frames: seen, fps: 0.0 });
    let _ = tx_evt.send(DaemonEvent::PipelineStopped);
    Ok(())
}

/// Offline run over a recorded stream; returns the frames that fired a gesture.
pub fn replay<R: BufRead>(source: R, profile: &Profile) -> Result<Vec<FrameOutcome>> {
    let mut frames = FrameSource::new(source, profile.input.max_num_hands);
    let mut state = RecognizerState::new(true);
    let mut fired = vec![];
    while let Some(obs) = frames.next_observation()? {
        let (out, keep_going) = step(&mut state, &obs, profile);
        if out.gesture.is_some() {
            fired.push(out);
        }
        if !keep_going {
            break;
        }
    }
    Ok(fired)
}
