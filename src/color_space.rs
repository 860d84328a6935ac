//! Conversion between display sRGB and CIE L*a*b*.
//!
//! Clustering happens in Lab because Euclidean distance there tracks
//! perceived difference far better than raw RGB. Every conversion is
//! per-pixel; neighbouring pixels never influence each other.

use image::{Rgb, RgbImage};
use palette::{Clamp, IntoColor, Lab, LinSrgb, Srgb};

use crate::error::{ReduceError, Result};
use crate::input::sample_count;

/// Lab coordinates laid out row-major over the same grid as the source image.
///
/// Only lives for one quantization pass.
#[derive(Clone, Debug)]
pub struct PerceptualBuffer {
    width: u32,
    height: u32,
    points: Vec<Lab>,
}

impl PerceptualBuffer {
    pub fn new(width: u32, height: u32, points: Vec<Lab>) -> Result<Self> {
        let expected = sample_count(width, height, 1)?;
        if points.len() != expected {
            return Err(ReduceError::InvalidParameter(format!(
                "{} points do not fill a {width}x{height} grid",
                points.len()
            )));
        }
        Ok(Self { width, height, points })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn points(&self) -> &[Lab] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Convert one display color to Lab.
#[inline]
pub fn srgb_to_lab(color: Srgb<u8>) -> Lab {
    let linear: LinSrgb<f32> = color.into_linear();
    linear.into_color()
}

/// Convert one Lab coordinate back to a display color.
///
/// Lab input is clipped to its valid range first; out-of-gamut results
/// saturate to [0, 255] instead of failing.
#[inline]
pub fn lab_to_srgb(lab: Lab) -> Srgb<u8> {
    let linear: LinSrgb<f32> = lab.clamp().into_color();
    let rgb_f32: Srgb<f32> = Srgb::from_linear(linear.clamp());
    rgb_f32.into_format::<u8>()
}

pub fn to_perceptual(img: &RgbImage) -> PerceptualBuffer {
    let points = img
        .pixels()
        .map(|&Rgb([r, g, b])| srgb_to_lab(Srgb::new(r, g, b)))
        .collect();
    PerceptualBuffer {
        width: img.width(),
        height: img.height(),
        points,
    }
}

pub fn to_display(buf: &PerceptualBuffer) -> RgbImage {
    let mut out = RgbImage::new(buf.width, buf.height);
    for (pixel, &lab) in out.pixels_mut().zip(&buf.points) {
        *pixel = to_pixel(lab_to_srgb(lab));
    }
    out
}

#[inline]
pub fn to_pixel(color: Srgb<u8>) -> Rgb<u8> {
    Rgb([color.red, color.green, color.blue])
}

/// Format a color as lowercase `#rrggbb`.
pub fn to_hex(color: Srgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color.red, color.green, color.blue)
}

/// Parse `#rrggbb` or `rrggbb` (either case).
pub fn parse_hex(s: &str) -> Result<Srgb<u8>> {
    let trimmed = s.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ReduceError::InvalidColor(format!(
            "{s:?}: hex color must be 6 hex digits"
        )));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map_err(|_| ReduceError::InvalidColor(format!("{s:?}: invalid hex digit")))
    };
    Ok(Srgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
