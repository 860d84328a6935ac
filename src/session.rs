//! Session-scoped state for one interactive reduce/recolor/export workflow.
//!
//! A [`Session`] owns the normalized source image, the current quantization
//! result with its overrides, the ordered log of tolerance substitutions and
//! the working image derived from all of them. It is plain owned data: one
//! session per user, driven synchronously, never shared.

use image::{DynamicImage, ImageFormat, RgbImage};
use palette::Srgb;
use tracing::info;

use crate::color_space::{parse_hex, to_hex, to_perceptual};
use crate::document::{self, PageSize, RenderOptions};
use crate::error::{ReduceError, Result};
use crate::input;
use crate::quantize::{KmeansOptions, quantize};
use crate::reconstruct::{DistributionEntry, Quantization};
use crate::substitute::{DEFAULT_TOLERANCE, Substitution};

pub const MIN_COLORS: usize = 2;
pub const MAX_COLORS: usize = 32;
pub const DEFAULT_COLORS: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub kmeans: KmeansOptions,
    pub render: RenderOptions,
    /// Used by [`Session::substitute`] when no tolerance is given.
    pub default_tolerance: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kmeans: KmeansOptions::default(),
            render: RenderOptions::default(),
            default_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    config: SessionConfig,
    source: Option<RgbImage>,
    quantization: Option<Quantization>,
    substitutions: Vec<Substitution>,
    working: Option<RgbImage>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the source image. Any previous quantization is discarded.
    pub fn load_rgb(&mut self, img: RgbImage) {
        info!(width = img.width(), height = img.height(), "image loaded");
        self.source = Some(img);
        self.quantization = None;
        self.substitutions.clear();
        self.working = None;
    }

    pub fn load_image(&mut self, img: &DynamicImage) {
        self.load_rgb(input::normalize(img));
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.load_rgb(input::decode(bytes)?);
        Ok(())
    }

    pub fn load_raw(&mut self, width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<()> {
        self.load_rgb(input::from_raw(width, height, channels, data)?);
        Ok(())
    }

    pub fn source(&self) -> Option<&RgbImage> {
        self.source.as_ref()
    }

    /// Reduce the source image to `k` colors.
    ///
    /// Overrides and substitutions belong to the previous result and are
    /// dropped.
    pub fn quantize(&mut self, k: usize) -> Result<&RgbImage> {
        if !(MIN_COLORS..=MAX_COLORS).contains(&k) {
            return Err(ReduceError::InvalidParameter(format!(
                "number of colors must be in {MIN_COLORS}..={MAX_COLORS}, got {k}"
            )));
        }
        let source = self.source.as_ref().ok_or(ReduceError::NoImageAvailable)?;

        let lab = to_perceptual(source);
        let clusters = quantize(&lab, k, &self.config.kmeans)?;
        let quantization = Quantization::new(clusters, source.width(), source.height())?;
        info!(k, palette = ?quantization.palette_hex(), "image quantized");

        self.quantization = Some(quantization);
        self.substitutions.clear();
        self.rebuild()?;
        self.image()
    }

    pub fn quantization(&self) -> Option<&Quantization> {
        self.quantization.as_ref()
    }

    fn quantization_mut(&mut self) -> Result<&mut Quantization> {
        self.quantization.as_mut().ok_or(ReduceError::NoImageAvailable)
    }

    /// Display `color` for `cluster_id` in the palette, distribution and
    /// working image.
    pub fn set_override(&mut self, cluster_id: usize, color: Srgb<u8>) -> Result<()> {
        self.quantization_mut()?.set_override(cluster_id, color)?;
        info!(cluster_id, color = %to_hex(color), "override applied");
        self.rebuild()
    }

    pub fn set_override_hex(&mut self, cluster_id: usize, hex: &str) -> Result<()> {
        self.set_override(cluster_id, parse_hex(hex)?)
    }

    /// Override the cluster whose current palette color is `old_hex`.
    pub fn replace_palette_color(&mut self, old_hex: &str, new_hex: &str) -> Result<usize> {
        let cluster_id = self.cluster_for_hex(old_hex)?;
        self.set_override_hex(cluster_id, new_hex)?;
        Ok(cluster_id)
    }

    pub fn clear_overrides(&mut self) -> Result<()> {
        self.quantization_mut()?.clear_overrides();
        info!("overrides cleared");
        self.rebuild()
    }

    /// Recolor working-image pixels within `tolerance` (default from the
    /// config) of `target`. Returns the number of pixels changed.
    pub fn substitute(
        &mut self,
        target: Srgb<u8>,
        replacement: Srgb<u8>,
        tolerance: Option<f64>,
    ) -> Result<usize> {
        let tolerance = tolerance.unwrap_or(self.config.default_tolerance);
        let substitution = Substitution::new(target, replacement, tolerance)?;
        let working = self.working.as_mut().ok_or(ReduceError::NoImageAvailable)?;
        let replaced = substitution.apply_in_place(working)?;
        self.substitutions.push(substitution);
        info!(
            target = %to_hex(target),
            replacement = %to_hex(replacement),
            tolerance,
            replaced,
            "substitution applied"
        );
        Ok(replaced)
    }

    pub fn substitute_hex(
        &mut self,
        target: &str,
        replacement: &str,
        tolerance: Option<f64>,
    ) -> Result<usize> {
        self.substitute(parse_hex(target)?, parse_hex(replacement)?, tolerance)
    }

    pub fn substitutions(&self) -> &[Substitution] {
        &self.substitutions
    }

    pub fn clear_substitutions(&mut self) -> Result<()> {
        if self.quantization.is_none() {
            return Err(ReduceError::NoImageAvailable);
        }
        self.substitutions.clear();
        info!("substitutions cleared");
        self.rebuild()
    }

    /// Working image: reconstruction with overrides, then every logged
    /// substitution in order.
    pub fn image(&self) -> Result<&RgbImage> {
        self.working.as_ref().ok_or(ReduceError::NoImageAvailable)
    }

    pub fn palette(&self) -> Result<Vec<Srgb<u8>>> {
        Ok(self.current()?.palette())
    }

    pub fn palette_hex(&self) -> Result<Vec<String>> {
        Ok(self.current()?.palette_hex())
    }

    pub fn distribution(&self) -> Result<Vec<DistributionEntry>> {
        Ok(self.current()?.distribution())
    }

    pub fn cluster_for_hex(&self, hex: &str) -> Result<usize> {
        self.current()?.cluster_for_hex(hex)
    }

    /// PDF with the working image and the palette legend.
    pub fn render_document(&self, page: PageSize) -> Result<Vec<u8>> {
        let quantization = self.current()?;
        let image = self.image()?;
        let bytes = document::render(
            image,
            &quantization.distribution(),
            page,
            &self.config.render,
        )?;
        info!(%page, bytes = bytes.len(), "document rendered");
        Ok(bytes)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let image = self.image()?;
        let mut buf = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(buf)
    }

    fn current(&self) -> Result<&Quantization> {
        self.quantization.as_ref().ok_or(ReduceError::NoImageAvailable)
    }

    fn rebuild(&mut self) -> Result<()> {
        let mut working = self.current()?.reconstruct()?;
        for substitution in &self.substitutions {
            substitution.apply_in_place(&mut working)?;
        }
        self.working = Some(working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use pretty_assertions::assert_eq;

    fn quadrants() -> RgbImage {
        RgbImage::from_fn(8, 8, |x, y| match (x < 4, y < 4) {
            (true, true) => Rgb([220, 20, 20]),
            (false, true) => Rgb([20, 220, 20]),
            (true, false) => Rgb([20, 20, 220]),
            (false, false) => Rgb([240, 240, 240]),
        })
    }

    fn quantized_session() -> Session {
        let mut session = Session::new();
        session.load_rgb(quadrants());
        session.quantize(4).unwrap();
        session
    }

    #[test]
    fn test_quantize_requires_image() {
        let mut session = Session::new();
        assert!(matches!(session.quantize(4), Err(ReduceError::NoImageAvailable)));
    }

    #[test]
    fn test_quantize_enforces_color_bounds() {
        let mut session = Session::new();
        session.load_rgb(quadrants());
        for k in [0, 1, 33] {
            assert!(matches!(
                session.quantize(k),
                Err(ReduceError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_render_before_quantize_fails() {
        let mut session = Session::new();
        assert!(matches!(
            session.render_document(PageSize::A4),
            Err(ReduceError::NoImageAvailable)
        ));
        session.load_rgb(quadrants());
        assert!(matches!(
            session.render_document(PageSize::A4),
            Err(ReduceError::NoImageAvailable)
        ));
    }

    #[test]
    fn test_palette_before_quantize_fails() {
        let session = Session::new();
        assert!(matches!(session.palette(), Err(ReduceError::NoImageAvailable)));
        assert!(matches!(session.image(), Err(ReduceError::NoImageAvailable)));
    }

    #[test]
    fn test_override_rebuilds_working_image() {
        let mut session = quantized_session();
        let id = session.cluster_for_hex(&session.palette_hex().unwrap()[1]).unwrap();
        assert_eq!(id, 1);

        session.set_override_hex(1, "#00ff00").unwrap();
        assert_eq!(session.palette_hex().unwrap()[1], "#00ff00");

        let assignment = session.quantization().unwrap().clusters().assignment.clone();
        for (pixel, &cluster) in session.image().unwrap().pixels().zip(&assignment) {
            if cluster == 1 {
                assert_eq!(pixel.0, [0, 255, 0]);
            }
        }
    }

    #[test]
    fn test_replace_palette_color_by_hex() {
        let mut session = quantized_session();
        let old = session.palette_hex().unwrap()[2].clone();
        let id = session.replace_palette_color(&old, "#123456").unwrap();
        assert_eq!(id, 2);
        assert_eq!(session.palette_hex().unwrap()[2], "#123456");
    }

    #[test]
    fn test_substitutions_survive_override_changes() {
        let mut session = quantized_session();
        let palette = session.palette().unwrap();

        let replaced = session
            .substitute(palette[0], Srgb::new(1, 2, 3), Some(0.0))
            .unwrap();
        assert_eq!(replaced, 16);

        session.set_override(3, Srgb::new(9, 9, 9)).unwrap();
        let img = session.image().unwrap();
        let assignment = &session.quantization().unwrap().clusters().assignment;
        for (pixel, &cluster) in img.pixels().zip(assignment) {
            match cluster {
                0 => assert_eq!(pixel.0, [1, 2, 3]),
                3 => assert_eq!(pixel.0, [9, 9, 9]),
                _ => {}
            }
        }

        session.clear_substitutions().unwrap();
        let restored = session.image().unwrap().clone();
        let expected = session.quantization().unwrap().reconstruct().unwrap();
        assert_eq!(restored, expected);
    }

    #[test]
    fn test_substitution_does_not_touch_distribution() {
        let mut session = quantized_session();
        let before = session.distribution().unwrap();
        session
            .substitute(Srgb::new(0, 0, 0), Srgb::new(255, 255, 255), Some(500.0))
            .unwrap();
        assert_eq!(session.distribution().unwrap(), before);
        assert!(session.image().unwrap().pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_default_tolerance_comes_from_config() {
        let mut session = Session::with_config(SessionConfig {
            default_tolerance: 0.0,
            ..SessionConfig::default()
        });
        session.load_rgb(quadrants());
        session.quantize(4).unwrap();
        session
            .substitute(Srgb::new(0, 0, 0), Srgb::new(1, 1, 1), None)
            .unwrap();
        assert_eq!(session.substitutions()[0].tolerance(), 0.0);
    }

    #[test]
    fn test_requantize_resets_edits() {
        let mut session = quantized_session();
        session.set_override(0, Srgb::new(0, 0, 0)).unwrap();
        session
            .substitute(Srgb::new(0, 0, 0), Srgb::new(5, 5, 5), None)
            .unwrap();

        session.quantize(3).unwrap();
        assert!(session.substitutions().is_empty());
        assert!(session.quantization().unwrap().overrides().is_empty());
        assert_eq!(session.palette().unwrap().len(), 3);
    }

    #[test]
    fn test_render_and_png_export() {
        let session = quantized_session();
        let pdf = session.render_document(PageSize::A3).unwrap();
        assert!(pdf.starts_with(b"%PDF"));

        let png = session.encode_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(&decoded, session.image().unwrap());
    }
}
