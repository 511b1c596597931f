//! Fixed-point split of f64 values into (high, low) f32 pairs.
//!
//! GPU vertex attributes are single precision; splitting at 2^16 keeps
//! planet-scale coordinates accurate when the shader reassembles
//! `high + low` relative to the eye.

use glam::DVec3;

/// Split one f64 at 2^16 into a high part (multiple of 65536) and the f32
/// remainder. `high as f64 + low as f64` recovers the input to within f32
/// rounding of the remainder.
pub fn split_f64(value: f64) -> (f32, f32) {
    let (doubled_high, value) = if value >= 0.0 {
        ((value / 65536.0).floor() * 65536.0, value)
    } else {
        (-((-value / 65536.0).floor() * 65536.0), value)
    };
    let high = doubled_high as f32;
    let low = (value - doubled_high) as f32;
    (high, low)
}

/// Component-wise high/low split of a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedVec3 {
    pub high: [f32; 3],
    pub low: [f32; 3],
}

impl EncodedVec3 {
    pub fn from_dvec3(value: DVec3) -> Self {
        let (hx, lx) = split_f64(value.x);
        let (hy, ly) = split_f64(value.y);
        let (hz, lz) = split_f64(value.z);
        Self {
            high: [hx, hy, hz],
            low: [lx, ly, lz],
        }
    }
}
