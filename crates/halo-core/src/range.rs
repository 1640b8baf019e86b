//! Signal smoothing and range classification.
//!
//! A peer's bounded sample history is folded into one smoothed value, which
//! maps onto a four-level range. The fold treats readings above the noise
//! floor as unusable: instead of the raw reading, the running mean of the
//! accumulator so far is added, substituted by a fixed correction when that
//! mean is itself above the floor. The final sum is divided by the full
//! window size of 10 even when fewer samples are present, so freshly
//! discovered peers start under-scaled and converge as their window fills.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::samples::SampleHistory;

/// Readings above this are treated as noise rather than signal.
const NOISE_FLOOR: f32 = -25.0;

/// Substitute contribution when the running mean is itself noisy.
const NOISE_CORRECTION: f32 = -55.0;

/// Fixed divisor applied to the accumulator, independent of sample count.
const SMOOTHING_DIVISOR: f32 = 10.0;

/// Coarse proximity classification, ordered from unknown to closest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Range {
    /// No usable signal, or the peer has faded out of the window.
    Unknown,
    /// Weak signal; the peer is at the edge of the radio's reach.
    Far,
    /// Moderate signal.
    Near,
    /// Strong signal; the peer is in the same room.
    Immediate,
}

impl Range {
    /// Classify a smoothed signal value.
    #[must_use]
    pub fn classify(value: f32) -> Self {
        if value < -200.0 {
            Self::Unknown
        } else if value < -90.0 {
            Self::Far
        } else if value < -72.0 {
            Self::Near
        } else if value < 0.0 {
            Self::Immediate
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Far => "Far",
            Self::Near => "Near",
            Self::Immediate => "Immediate",
        };
        f.write_str(name)
    }
}

/// A smoothed signal value and its classification for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerEstimate {
    /// The smoothed signal value, in the radio's native unit.
    pub value: f32,
    /// The range bucket `value` falls into.
    pub range: Range,
}

/// Fold a history into a single smoothed value.
#[must_use]
pub fn smooth(history: &SampleHistory) -> f32 {
    let mut accumulator = 0.0_f32;
    let mut index = 0.0_f32;
    for value in history.iter() {
        if value > NOISE_FLOOR {
            let mut correction = 0.0;
            if index > 0.0 {
                correction = accumulator / index;
            }
            if correction > NOISE_FLOOR {
                correction = NOISE_CORRECTION;
            }
            accumulator += correction;
        } else {
            accumulator += value;
        }
        index += 1.0;
    }
    accumulator / SMOOTHING_DIVISOR
}

/// Smooth and classify a history in one step.
#[must_use]
pub fn estimate(history: &SampleHistory) -> PeerEstimate {
    let value = smooth(history);
    PeerEstimate {
        value,
        range: Range::classify(value),
    }
}
