//! Open/closed hand classification from a single frame.

use thiserror::Error;

use crate::landmarks::{HAND_LANDMARKS, Landmark};

/// (tip, PIP joint) for index, middle, ring, pinky. Thumb is ignored.
const FINGERS: [(usize, usize); 4] = [(8, 6), (12, 10), (16, 14), (20, 18)];
const MIN_EXTENDED: usize = 3;
/// Normalized coordinates may overshoot the frame edge a little; anything
/// beyond this is a broken detection.
const COORD_RANGE: std::ops::RangeInclusive<f32> = -1.0..=2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pose {
    Open,
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("invalid landmark set: expected 21 points, got {len}")]
    InvalidLandmarkSet { len: usize },
    #[error("invalid landmark set: point {index} is out of frame")]
    OutOfFrame { index: usize },
}

/// Assumes an upright hand: an extended finger has its tip above (smaller y) its joint.
pub fn classify(landmarks: &[Landmark]) -> Result<Pose, LandmarkError> {
    if landmarks.len() < HAND_LANDMARKS {
        return Err(LandmarkError::InvalidLandmarkSet {
            len: landmarks.len(),
        });
    }
    // NaN fails the range check too
    if let Some(index) = landmarks
        .iter()
        .position(|l| !COORD_RANGE.contains(&l.x) || !COORD_RANGE.contains(&l.y))
    {
        return Err(LandmarkError::OutOfFrame { index });
    }
    let extended = FINGERS
        .iter()
        .filter(|&&(tip, pip)| landmarks[tip].y < landmarks[pip].y)
        .count();
    Ok(if extended >= MIN_EXTENDED {
        Pose::Open
    } else {
        Pose::Closed
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hand with the given fingers (index, middle, ring, pinky) extended.
    pub(crate) fn hand_with(extended: [bool; 4]) -> Vec<Landmark> {
        let mut pts = vec![Landmark::new(0.5, 0.5); HAND_LANDMARKS];
        for (&(tip, _), up) in FINGERS.iter().zip(extended) {
            pts[tip].y = if up { 0.3 } else { 0.7 };
        }
        pts
    }

    #[test]
    fn all_four_extended_is_open() {
        assert_eq!(classify(&hand_with([true; 4])), Ok(Pose::Open));
    }

    #[test]
    fn three_extended_is_open() {
        assert_eq!(classify(&hand_with([true, true, false, true])), Ok(Pose::Open));
        assert_eq!(classify(&hand_with([false, true, true, true])), Ok(Pose::Open));
    }

    #[test]
    fn two_or_fewer_is_closed() {
        assert_eq!(classify(&hand_with([true, true, false, false])), Ok(Pose::Closed));
        assert_eq!(classify(&hand_with([false; 4])), Ok(Pose::Closed));
    }

    #[test]
    fn tip_level_with_joint_is_not_extended() {
        // every tip at the same y as its joint
        let pts = vec![Landmark::new(0.5, 0.5); HAND_LANDMARKS];
        assert_eq!(classify(&pts), Ok(Pose::Closed));
    }

    #[test]
    fn thumb_is_ignored() {
        let mut pts = hand_with([false; 4]);
        pts[4].y = 0.0;
        pts[3].y = 1.0;
        assert_eq!(classify(&pts), Ok(Pose::Closed));
    }

    #[test]
    fn short_landmark_set_is_rejected() {
        let pts = vec![Landmark::new(0.5, 0.5); 20];
        assert_eq!(
            classify(&pts),
            Err(LandmarkError::InvalidLandmarkSet { len: 20 })
        );
    }

    #[test]
    fn wild_coordinates_are_rejected() {
        let mut pts = hand_with([true; 4]);
        pts[8].x = 1e9;
        assert_eq!(classify(&pts), Err(LandmarkError::OutOfFrame { index: 8 }));

        let mut pts = hand_with([true; 4]);
        pts[3].y = f32::NAN;
        assert_eq!(classify(&pts), Err(LandmarkError::OutOfFrame { index: 3 }));

        let mut pts = hand_with([true; 4]);
        pts[0].x = f32::NEG_INFINITY;
        assert!(classify(&pts).is_err());
    }

    #[test]
    fn slight_overshoot_is_tolerated() {
        let mut pts = hand_with([true; 4]);
        pts[8].x = 1.05;
        pts[0].y = -0.1;
        assert_eq!(classify(&pts), Ok(Pose::Open));
    }
}
