//! Float-to-integer movement quantization with carried residue.
//!
//! Aim code produces sub-pixel deltas every tick.  Sending `round(delta)`
//! alone loses the fraction forever, so a steady 0.4 px/tick drift would never
//! move the pointer.  The quantizer keeps the remainder per channel and adds
//! it to the next delta:
//!
//! ```text
//! sum      = delta + residual
//! out      = round(sum)
//! residual = sum - out
//! ```
//!
//! The emitted running total therefore never lags the input total by a
//! full unit.

use serde::{Deserialize, Serialize};

/// Independent movement sources that each keep their own residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Main,
    Secondary,
}

/// Residual accumulator for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Residual {
    pub x: f64,
    pub y: f64,
}

impl Residual {
    /// Quantizes one delta pair and updates the stored residue.
    pub fn quantize(&mut self, dx: f64, dy: f64) -> (i32, i32) {
        (quantize_axis(&mut self.x, dx), quantize_axis(&mut self.y, dy))
    }
}

fn quantize_axis(residual: &mut f64, delta: f64) -> i32 {
    if !delta.is_finite() {
        return 0;
    }
    let sum = delta + *residual;
    let out = sum.round();
    *residual = sum - out;
    out as i32
}

/// Per-channel quantizer owned by the caller's control loop.
#[derive(Debug, Clone, Default)]
pub struct MovementQuantizer {
    main: Residual,
    secondary: Residual,
}

impl MovementQuantizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quantize(&mut self, channel: Channel, dx: f64, dy: f64) -> (i32, i32) {
        self.residual_mut(channel).quantize(dx, dy)
    }

    pub fn residual(&self, channel: Channel) -> Residual {
        match channel {
            Channel::Main => self.main,
            Channel::Secondary => self.secondary,
        }
    }

    /// Drops the residue of one channel, e.g. when its target is lost.
    pub fn reset(&mut self, channel: Channel) {
        *self.residual_mut(channel) = Residual::default();
    }

    fn residual_mut(&mut self, channel: Channel) -> &mut Residual {
        match channel {
            Channel::Main => &mut self.main,
            Channel::Secondary => &mut self.secondary,
        }
    }
}
