//! Fractional frame positions.
//!
//! A position is a non-negative fixed-point decimal: an integer number of
//! ticks where one frame is [`TICKS_PER_FRAME`] ticks. Synthesized frames can
//! be inserted between any two existing positions without renumbering, and
//! the text form is zero-padded so lexical order equals numeric order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Number of fractional decimal digits in the text form.
pub const POSITION_DECIMALS: u32 = 6;
/// Ticks per whole frame (`10^POSITION_DECIMALS`).
pub const TICKS_PER_FRAME: u64 = 1_000_000;
/// Width of the zero-padded integer part.
const INTEGER_DIGITS: usize = 10;
/// Largest integer part that fits the padded text form.
const MAX_INTEGER_PART: u64 = 9_999_999_999;

/// Position of a frame within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Position(u64);

impl Position {
    pub const ZERO: Position = Position(0);

    /// Create from a raw tick count.
    pub fn from_ticks(ticks: u64) -> ModelResult<Self> {
        if ticks / TICKS_PER_FRAME > MAX_INTEGER_PART {
            return Err(ModelError::invalid_position(
                ticks.to_string(),
                "exceeds the maximum representable position",
            ));
        }
        Ok(Self(ticks))
    }

    /// Position of the frame with the given zero-based index.
    pub fn from_frame(index: u32) -> Self {
        Self(u64::from(index) * TICKS_PER_FRAME)
    }

    /// Convert from a floating point frame number, rounding to the nearest tick.
    pub fn from_f64(value: f64) -> ModelResult<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(ModelError::invalid_position(
                value.to_string(),
                "must be a finite, non-negative number",
            ));
        }
        let ticks = (value * TICKS_PER_FRAME as f64).round();
        if ticks > (MAX_INTEGER_PART * TICKS_PER_FRAME + TICKS_PER_FRAME - 1) as f64 {
            return Err(ModelError::invalid_position(
                value.to_string(),
                "exceeds the maximum representable position",
            ));
        }
        Ok(Self(ticks as u64))
    }

    /// Raw tick count.
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// Frame number as a float (lossy for very large positions).
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_FRAME as f64
    }

    /// Distance in ticks between two positions.
    pub fn distance(self, other: Position) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// Fraction of the way from `left` to `right` at which this position sits.
    ///
    /// Returns a value in `(0, 1)` when `left < self < right`.
    pub fn fraction_within(self, left: Position, right: Position) -> f64 {
        let span = right.0 as f64 - left.0 as f64;
        (self.0 as f64 - left.0 as f64) / span
    }

    /// The `frame_<position>` file stem used by frame stores.
    pub fn file_stem(self) -> String {
        format!("frame_{}", self)
    }

    /// Parse a `frame_<position>` file stem.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        stem.strip_prefix("frame_")?.parse().ok()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$}.{:06}",
            self.0 / TICKS_PER_FRAME,
            self.0 % TICKS_PER_FRAME,
            width = INTEGER_DIGITS
        )
    }
}

impl FromStr for Position {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (s, None),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ModelError::invalid_position(s, "integer part must be decimal digits"));
        }

        let trimmed = int_part.trim_start_matches('0');
        if trimmed.len() > INTEGER_DIGITS {
            return Err(ModelError::invalid_position(s, "integer part too large"));
        }
        let whole: u64 = if trimmed.is_empty() {
            0
        } else {
            trimmed
                .parse()
                .map_err(|_| ModelError::invalid_position(s, "integer part too large"))?
        };

        let mut fraction = 0u64;
        if let Some(frac) = frac_part {
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ModelError::invalid_position(s, "fractional part must be decimal digits"));
            }
            if frac.len() > POSITION_DECIMALS as usize {
                return Err(ModelError::invalid_position(
                    s,
                    format!("at most {} fractional digits are supported", POSITION_DECIMALS),
                ));
            }
            // Right-pad to full precision: "5" -> 500000
            let padding = POSITION_DECIMALS - frac.len() as u32;
            fraction = frac
                .parse::<u64>()
                .map_err(|_| ModelError::invalid_position(s, "invalid fractional part"))?
                * 10u64.pow(padding);
        }

        Position::from_ticks(whole * TICKS_PER_FRAME + fraction)
    }
}

impl From<Position> for String {
    fn from(p: Position) -> Self {
        p.to_string()
    }
}

impl TryFrom<String> for Position {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
