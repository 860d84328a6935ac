//! Tolerance-based recoloring of a rendered image.
//!
//! Unlike centroid overrides this works on display pixels directly: every
//! pixel whose Euclidean RGB distance to the target is within the tolerance
//! gets the replacement color. Cluster assignment and centroids are not
//! involved.

use image::{ImageBuffer, Pixel};
use palette::Srgb;
use tracing::debug;

use crate::color_space::to_hex;
use crate::error::{ReduceError, Result};

pub const DEFAULT_TOLERANCE: f64 = 20.0;

/// One "replace colors near `target` with `replacement`" edit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Substitution {
    target: Srgb<u8>,
    replacement: Srgb<u8>,
    tolerance: f64,
}

impl Substitution {
    /// Fails with `InvalidParameter` if `tolerance` is negative or NaN.
    pub fn new(target: Srgb<u8>, replacement: Srgb<u8>, tolerance: f64) -> Result<Self> {
        if tolerance.is_nan() || tolerance < 0.0 {
            return Err(ReduceError::InvalidParameter(format!(
                "tolerance must be a non-negative number, got {tolerance}"
            )));
        }
        Ok(Self {
            target,
            replacement,
            tolerance,
        })
    }

    pub fn target(&self) -> Srgb<u8> {
        self.target
    }

    pub fn replacement(&self) -> Srgb<u8> {
        self.replacement
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Inclusive distance test against the target color.
    #[inline]
    pub fn matches(&self, rgb: [u8; 3]) -> bool {
        let dr = rgb[0] as i32 - self.target.red as i32;
        let dg = rgb[1] as i32 - self.target.green as i32;
        let db = rgb[2] as i32 - self.target.blue as i32;
        let dist = (dr * dr + dg * dg + db * db) as f64;
        dist <= self.tolerance * self.tolerance
    }

    /// Recolor matching pixels in place and return how many changed.
    ///
    /// Each pixel is tested against its own value before this call, so a
    /// replaced pixel is never re-tested. Channels past the third (alpha)
    /// are left alone.
    pub fn apply_in_place<P>(&self, image: &mut ImageBuffer<P, Vec<u8>>) -> Result<usize>
    where
        P: Pixel<Subpixel = u8>,
    {
        if P::CHANNEL_COUNT < 3 {
            return Err(ReduceError::UnsupportedImageFormat(format!(
                "{} channels per pixel, need at least RGB",
                P::CHANNEL_COUNT
            )));
        }

        let replacement = [
            self.replacement.red,
            self.replacement.green,
            self.replacement.blue,
        ];
        let mut replaced = 0usize;
        for pixel in image.pixels_mut() {
            let channels = pixel.channels_mut();
            if self.matches([channels[0], channels[1], channels[2]]) {
                channels[..3].copy_from_slice(&replacement);
                replaced += 1;
            }
        }

        debug!(
            target = %to_hex(self.target),
            replacement = %to_hex(self.replacement),
            tolerance = self.tolerance,
            replaced,
            "pixels recolored"
        );
        Ok(replaced)
    }
}

/// Return a copy of `image` with every pixel within `tolerance` of `target`
/// recolored to `replacement`.
pub fn substitute<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    target: Srgb<u8>,
    replacement: Srgb<u8>,
    tolerance: f64,
) -> Result<ImageBuffer<P, Vec<u8>>>
where
    P: Pixel<Subpixel = u8>,
{
    let substitution = Substitution::new(target, replacement, tolerance)?;
    let mut out = image.clone();
    substitution.apply_in_place(&mut out)?;
    Ok(out)
}
