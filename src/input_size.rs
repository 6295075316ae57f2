//! Model input size handling.
//!
//! YOLO-family models downsample by a factor of 32, so the square input edge
//! must be a multiple of 32. Requested sizes are floored to the nearest
//! multiple rather than rejected; sizes that floor to zero are rejected.

use anyhow::{anyhow, Result};
use std::fmt;

/// Stride every model input edge must be divisible by.
pub const INPUT_STRIDE: i64 = 32;

/// Default input edge when nothing (valid) was requested.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Largest input edge accepted. Keeps tensor sizes sane for a live loop.
pub const MAX_INPUT_SIZE: u32 = 4096;

/// Floors `size` to the largest multiple of [`INPUT_STRIDE`] that is `<= size`.
///
/// Uses Euclidean division, so negative inputs move further from zero
/// (`-1 -> -32`). The result is always a multiple of the stride and applying
/// the function twice yields the same value.
pub fn align_to_stride(size: i64) -> i64 {
    size.div_euclid(INPUT_STRIDE) * INPUT_STRIDE
}

/// A validated square input edge: positive, a multiple of 32, at most
/// [`MAX_INPUT_SIZE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputSize(u32);

impl InputSize {
    /// Accepts an already-aligned size. Use [`InputSize::normalize`] for raw
    /// user input.
    pub fn new(size: u32) -> Result<Self> {
        if size == 0 {
            return Err(anyhow!("input size must be positive"));
        }
        if size as i64 % INPUT_STRIDE != 0 {
            return Err(anyhow!(
                "input size {} is not a multiple of {}",
                size,
                INPUT_STRIDE
            ));
        }
        if size > MAX_INPUT_SIZE {
            return Err(anyhow!(
                "input size {} exceeds maximum {}",
                size,
                MAX_INPUT_SIZE
            ));
        }
        Ok(Self(size))
    }

    /// Normalizes a raw request, flooring it to the stride.
    ///
    /// Returns the size plus a warning when the request had to be adjusted.
    /// Fails when the aligned value is not positive or exceeds the maximum.
    pub fn normalize(requested: i64) -> Result<(Self, Option<SizeWarning>)> {
        let aligned = align_to_stride(requested);
        if aligned <= 0 {
            return Err(anyhow!(
                "input size {} normalizes to {}, which is not a usable size",
                requested,
                aligned
            ));
        }
        let size = u32::try_from(aligned)
            .map_err(|_| anyhow!("input size {} is out of range", requested))?;
        let size = Self::new(size)?;
        let warning = (aligned != requested).then_some(SizeWarning::Adjusted {
            requested,
            adjusted: size.get(),
        });
        Ok((size, warning))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self(DEFAULT_INPUT_SIZE)
    }
}

impl fmt::Display for InputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.0, self.0)
    }
}

/// A correction applied to user-supplied size input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SizeWarning {
    /// Request was not a multiple of 32 and was floored.
    Adjusted { requested: i64, adjusted: u32 },
    /// Custom size text was not an integer.
    Unparseable { input: String },
    /// Request floored to a non-positive (or oversized) value.
    Rejected { requested: i64 },
    /// Menu choice was not one of the presets.
    InvalidChoice { input: String },
}

impl fmt::Display for SizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeWarning::Adjusted {
                requested,
                adjusted,
            } => write!(
                f,
                "image size must be a multiple of {INPUT_STRIDE}; adjusted {requested} to {adjusted}x{adjusted}"
            ),
            SizeWarning::Unparseable { input } => write!(
                f,
                "invalid input {input:?}; using default image size {DEFAULT_INPUT_SIZE}x{DEFAULT_INPUT_SIZE}"
            ),
            SizeWarning::Rejected { requested } => write!(
                f,
                "image size {requested} is not usable; using default image size {DEFAULT_INPUT_SIZE}x{DEFAULT_INPUT_SIZE}"
            ),
            SizeWarning::InvalidChoice { input } => write!(
                f,
                "invalid choice {input:?}; using default image size {DEFAULT_INPUT_SIZE}x{DEFAULT_INPUT_SIZE}"
            ),
        }
    }
}
