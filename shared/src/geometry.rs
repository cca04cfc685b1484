//! Random target placement.
//!
//! A target is placed by drawing a size and a centre uniformly, then shifting
//! the centre inward by one full size along any axis whose edge it crosses.
//! Corrections run left, right, bottom, top. The size is capped at half the
//! smaller viewport edge, which keeps a single shift per axis inside.

use crate::{Target, Viewport, MAX_TARGET_SIZE, MIN_TARGET_SIZE};
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("viewport {width}x{height} cannot hold a target of size {min_size}")]
    OutOfBounds {
        width: u32,
        height: u32,
        min_size: u32,
    },
    #[error("invalid target size range {min}..={max}")]
    InvalidRange { min: u32, max: u32 },
}

/// Inclusive range of target edge lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    min: u32,
    max: u32,
}

impl SizeRange {
    pub fn new(min: u32, max: u32) -> Result<Self, GeometryError> {
        if min == 0 || min > max {
            return Err(GeometryError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

impl Default for SizeRange {
    fn default() -> Self {
        Self {
            min: MIN_TARGET_SIZE,
            max: MAX_TARGET_SIZE,
        }
    }
}

/// Places a new target inside `viewport`.
pub fn generate<R: Rng + ?Sized>(
    viewport: Viewport,
    range: SizeRange,
    rng: &mut R,
) -> Result<Target, GeometryError> {
    let out_of_bounds = GeometryError::OutOfBounds {
        width: viewport.width,
        height: viewport.height,
        min_size: range.min,
    };

    let max_size = range.max.min(viewport.width.min(viewport.height) / 2);
    if max_size < range.min {
        return Err(out_of_bounds);
    }

    let size = rng.gen_range(range.min..=max_size);
    let x = i64::from(rng.gen_range(0..viewport.width));
    let y = i64::from(rng.gen_range(0..viewport.height));

    let x = shift_from_high(shift_from_low(x, size), size, viewport.width);
    let y = shift_from_low(shift_from_high(y, size, viewport.height), size);

    let (x, y) = match (i32::try_from(x), i32::try_from(y)) {
        (Ok(x), Ok(y)) => (x, y),
        _ => return Err(out_of_bounds),
    };
    let target = Target::new(x, y, size);
    if !target.is_within(&viewport) {
        return Err(out_of_bounds);
    }
    Ok(target)
}

/// Moves `pos` up by `size` when the box crosses zero (left or top edge).
fn shift_from_low(pos: i64, size: u32) -> i64 {
    let size = i64::from(size);
    if pos - size / 2 < 0 {
        pos + size
    } else {
        pos
    }
}

/// Moves `pos` down by `size` when the box crosses `extent` (right or bottom edge).
fn shift_from_high(pos: i64, size: u32, extent: u32) -> i64 {
    let size = i64::from(size);
    if pos - size / 2 + size > i64::from(extent) {
        pos - size
    } else {
        pos
    }
}
