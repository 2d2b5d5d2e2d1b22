//! Display ramp for burn-probability rasters

use crate::types::PixelValue;

/// Twelve evenly spaced stops over probability 0..=1
pub const PROBABILITY_PALETTE: [[u8; 3]; 12] = [
    [0x00, 0x00, 0x04],
    [0x14, 0x0e, 0x36],
    [0x3b, 0x0f, 0x70],
    [0x64, 0x1a, 0x80],
    [0x8c, 0x29, 0x81],
    [0xb5, 0x36, 0x7a],
    [0xde, 0x49, 0x68],
    [0xf7, 0x6f, 0x5c],
    [0xfe, 0x9f, 0x6d],
    [0xfe, 0xcf, 0x92],
    [0xfc, 0xe8, 0xb0],
    [0xfc, 0xfd, 0xbf],
];

/// Colour of a probability, linearly interpolated between stops.
/// No-data has no colour; values outside [0, 1] clamp to the ends.
pub fn colour_for(probability: PixelValue) -> Option<[u8; 3]> {
    if !probability.is_finite() {
        return None;
    }
    let last = (PROBABILITY_PALETTE.len() - 1) as f32;
    let position = probability.clamp(0.0, 1.0) * last;
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(PROBABILITY_PALETTE.len() - 1);
    let t = position - lower as f32;

    let a = PROBABILITY_PALETTE[lower];
    let b = PROBABILITY_PALETTE[upper];
    let mut rgb = [0u8; 3];
    for i in 0..3 {
        rgb[i] = (a[i] as f32 + (b[i] as f32 - a[i] as f32) * t).round() as u8;
    }
    Some(rgb)
}
