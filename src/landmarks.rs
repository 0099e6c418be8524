//! Hand landmark frames as delivered by the external landmark extractor.
//!
//! The extractor writes one JSON object per captured frame:
//! `{"t_ms": 1034, "width": 640, "height": 480, "hands": [[{"x":..,"y":..}, ...]], "key": "g"}`.
//! An empty (or absent) `hands` list means no hand was detected in that frame.
//! Extra per-point fields such as a depth `z` are accepted and ignored.

use anyhow::{Result, anyhow};
use log::{debug, warn};
use serde::Deserialize;
use std::io::BufRead;

/// Points per hand in the upstream hand model.
pub const HAND_LANDMARKS: usize = 21;
/// Index fingertip.
pub const INDEX_TIP: usize = 8;

/// Normalized keypoint; `x`/`y` are in [0,1] relative to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

#[cfg(test)]
impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One frame with a detected hand.
#[derive(Debug, Clone)]
pub struct HandFrame {
    pub landmarks: Vec<Landmark>,
    pub t_ms: u64,
    pub width: u32,
}

impl HandFrame {
    /// Index fingertip x in pixels (truncated), if the landmark exists.
    pub fn index_tip_px(&self) -> Option<i32> {
        self.landmarks
            .get(INDEX_TIP)
            .map(|l| (l.x * self.width as f32) as i32)
    }
}

/// Keypresses forwarded by the capture window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Toggle,
    Quit,
}

impl Control {
    fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "g" => Some(Control::Toggle),
            "q" => Some(Control::Quit),
            _ => None,
        }
    }
}

/// Wire form of one frame.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameLine {
    pub t_ms: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub hands: Vec<Vec<Landmark>>,
    #[serde(default)]
    pub key: Option<String>,
}

/// A decoded frame: the hand (if any) plus an optional control keypress.
#[derive(Debug, Clone)]
pub struct Observation {
    pub t_ms: u64,
    pub hand: Option<HandFrame>,
    pub control: Option<Control>,
}

impl FrameLine {
    pub fn into_observation(self, max_hands: usize) -> Observation {
        let control = self.key.as_deref().and_then(Control::from_key);
        let hand = if self.width == 0 || self.height == 0 {
            None
        } else {
            self.hands
                .into_iter()
                .take(max_hands)
                .next()
                .map(|landmarks| HandFrame {
                    landmarks,
                    t_ms: self.t_ms,
                    width: self.width,
                })
        };
        Observation {
            t_ms: self.t_ms,
            hand,
            control,
        }
    }
}

pub fn parse_line(line: &str, max_hands: usize) -> Result<Observation> {
    let fl: FrameLine =
        serde_json::from_str(line).map_err(|e| anyhow!("bad frame line: {e}"))?;
    Ok(fl.into_observation(max_hands))
}

/// Reads observations from a newline-delimited stream, skipping junk lines.
pub struct FrameSource<R> {
    reader: R,
    max_hands: usize,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> FrameSource<R> {
    pub fn new(reader: R, max_hands: usize) -> Self {
        Self {
            reader,
            max_hands,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// `Ok(None)` at end of stream.
    pub fn next_observation(&mut self) -> Result<Option<Observation>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line, self.max_hands) {
                Ok(obs) => return Ok(Some(obs)),
                Err(e) => {
                    warn!("frames: skipping line {}: {e}", self.line_no);
                    debug!("frames: offending line: {line}");
                }
            }
        }
    }
}
