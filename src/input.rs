//! Normalization of caller-supplied images into the RGB buffers the
//! quantizer works on. Alpha is dropped and grayscale is expanded.

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

use crate::error::{ReduceError, Result};

/// Number of samples in a `width` x `height` buffer with `channels` per
/// pixel, or `InvalidParameter` if that does not fit in `usize`.
pub fn sample_count(width: u32, height: u32, channels: u8) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels as usize))
        .ok_or_else(|| {
            ReduceError::InvalidParameter(format!(
                "{width}x{height}x{channels} buffer is too large"
            ))
        })
}

/// Decode an encoded image (PNG, JPEG, ...) and normalize it to RGB.
pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes)?;
    Ok(normalize(&img))
}

/// Normalize any decoded image to 8-bit RGB, discarding alpha.
pub fn normalize(img: &DynamicImage) -> RgbImage {
    match img {
        DynamicImage::ImageRgb8(rgb) => rgb.clone(),
        other => other.to_rgb8(),
    }
}

/// Build an RGB image from a raw interleaved buffer with `channels` samples
/// per pixel (1 = gray, 2 = gray+alpha, 3 = RGB, 4 = RGBA).
pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<RgbImage> {
    if !(1..=4).contains(&channels) {
        return Err(ReduceError::UnsupportedImageFormat(format!(
            "{channels} channels per pixel"
        )));
    }

    let expected = sample_count(width, height, channels)?;
    if data.len() != expected {
        return Err(ReduceError::InvalidParameter(format!(
            "buffer holds {} bytes, {width}x{height}x{channels} needs {expected}",
            data.len()
        )));
    }

    let img = match channels {
        1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
        2 => GrayAlphaImage::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
        3 => return RgbImage::from_raw(width, height, data).ok_or_else(rebuild_failed),
        _ => RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
    };

    img.map(|i| i.to_rgb8()).ok_or_else(rebuild_failed)
}

fn rebuild_failed() -> ReduceError {
    ReduceError::UnsupportedImageFormat("failed to rebuild image buffer".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_alpha_is_dropped() {
        let rgba = vec![10, 20, 30, 0, 40, 50, 60, 255];
        let rgb = from_raw(2, 1, 4, rgba).unwrap();
        assert_eq!(rgb.as_raw(), &vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_grayscale_is_expanded() {
        let rgb = from_raw(2, 1, 1, vec![0, 200]).unwrap();
        assert_eq!(rgb.as_raw(), &vec![0, 0, 0, 200, 200, 200]);
    }

    #[test]
    fn test_gray_alpha_is_expanded() {
        let rgb = from_raw(1, 1, 2, vec![77, 12]).unwrap();
        assert_eq!(rgb.as_raw(), &vec![77, 77, 77]);
    }

    #[test]
    fn test_unsupported_channel_count() {
        let err = from_raw(1, 1, 5, vec![0; 5]).unwrap_err();
        assert!(matches!(err, ReduceError::UnsupportedImageFormat(_)));
    }

    #[test]
    fn test_buffer_length_mismatch() {
        let err = from_raw(2, 2, 3, vec![0; 5]).unwrap_err();
        assert!(matches!(err, ReduceError::InvalidParameter(_)));
    }

    #[test]
    fn test_decode_png_with_alpha() {
        let rgba = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 128]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(rgba)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let rgb = decode(&buf).unwrap();
        assert_eq!(rgb.dimensions(), (3, 2));
        assert!(rgb.pixels().all(|p| p.0 == [1, 2, 3]));
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(sample_count(4, 3, 3).unwrap(), 36);
        assert_eq!(sample_count(0, 9, 4).unwrap(), 0);
    }

    #[test]
    fn test_sample_count_overflow() {
        // (2^32 - 1)^2 * 4 does not fit in a 64-bit usize either.
        assert!(matches!(
            sample_count(u32::MAX, u32::MAX, 4),
            Err(ReduceError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_from_raw_rejects_overflowing_dimensions() {
        let err = from_raw(u32::MAX, u32::MAX, 4, Vec::new()).unwrap_err();
        assert!(matches!(err, ReduceError::InvalidParameter(_)));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ReduceError::Image(_)));
    }
}
