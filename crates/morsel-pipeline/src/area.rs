//! Foreground pixel area of a binary mask.

use crate::mask::BinaryMask;

/// Count the foreground pixels in `mask`.
///
/// An all-background mask yields `0`; whether that is an error is the
/// caller's decision.
#[must_use]
pub fn pixel_area(mask: &BinaryMask) -> u64 {
    mask.as_raw().iter().map(|&v| u64::from(v)).sum()
}
