//! Turning clusters back into display colors: palette, per-cluster share
//! and the full-resolution quantized image.
//!
//! [`Quantization`] is the result object a session keeps around. It also
//! holds the centroid override map, which relabels a cluster's display color
//! without touching its Lab centroid or its members.

use std::collections::BTreeMap;

use image::RgbImage;
use palette::Srgb;
use tracing::debug;

use crate::color_space::{lab_to_srgb, parse_hex, to_hex, to_pixel};
use crate::error::{ReduceError, Result};
use crate::input::sample_count;
use crate::quantize::{Centroids, Clusters};

/// One palette color and the share of pixels assigned to its cluster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistributionEntry {
    pub color: Srgb<u8>,
    /// 0..=100
    pub percentage: f64,
}

impl DistributionEntry {
    pub fn hex(&self) -> String {
        to_hex(self.color)
    }
}

/// Display color of every centroid, index-aligned with cluster ids.
pub fn palette_of(centroids: &Centroids) -> Vec<Srgb<u8>> {
    centroids.iter().map(|&lab| lab_to_srgb(lab)).collect()
}

/// Paint each pixel with the palette color of its cluster.
pub fn reconstruct_image(
    assignment: &[u8],
    palette: &[Srgb<u8>],
    width: u32,
    height: u32,
) -> Result<RgbImage> {
    if assignment.len() != sample_count(width, height, 1)? {
        return Err(ReduceError::InvalidParameter(format!(
            "{} assignments do not fill a {width}x{height} image",
            assignment.len()
        )));
    }

    let mut out = RgbImage::new(width, height);
    for (pixel, &id) in out.pixels_mut().zip(assignment) {
        let color = palette
            .get(id as usize)
            .copied()
            .ok_or(ReduceError::InvalidClusterId {
                id: id as usize,
                k: palette.len(),
            })?;
        *pixel = to_pixel(color);
    }
    Ok(out)
}

/// Palette colors paired with their cluster's share of all pixels, in
/// cluster id order. Empty clusters report 0%.
pub fn distribution(assignment: &[u8], palette: &[Srgb<u8>]) -> Vec<DistributionEntry> {
    let mut counts = vec![0usize; palette.len()];
    for &id in assignment {
        if let Some(c) = counts.get_mut(id as usize) {
            *c += 1;
        }
    }
    let total = assignment.len().max(1) as f64;
    palette
        .iter()
        .zip(counts)
        .map(|(&color, count)| DistributionEntry {
            color,
            percentage: 100.0 * count as f64 / total,
        })
        .collect()
}

/// A quantized image plus its display-color overrides.
#[derive(Clone, Debug)]
pub struct Quantization {
    width: u32,
    height: u32,
    clusters: Clusters,
    base_palette: Vec<Srgb<u8>>,
    overrides: BTreeMap<usize, Srgb<u8>>,
}

impl Quantization {
    pub fn new(clusters: Clusters, width: u32, height: u32) -> Result<Self> {
        if clusters.assignment.len() != sample_count(width, height, 1)? {
            return Err(ReduceError::InvalidParameter(format!(
                "{} assignments do not fill a {width}x{height} image",
                clusters.assignment.len()
            )));
        }
        let base_palette = palette_of(&clusters.centroids);
        Ok(Self {
            width,
            height,
            clusters,
            base_palette,
            overrides: BTreeMap::new(),
        })
    }

    pub fn k(&self) -> usize {
        self.clusters.k()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn clusters(&self) -> &Clusters {
        &self.clusters
    }

    pub fn overrides(&self) -> &BTreeMap<usize, Srgb<u8>> {
        &self.overrides
    }

    /// Show `color` for `cluster_id` everywhere the palette is used.
    pub fn set_override(&mut self, cluster_id: usize, color: Srgb<u8>) -> Result<()> {
        if cluster_id >= self.k() {
            return Err(ReduceError::InvalidClusterId {
                id: cluster_id,
                k: self.k(),
            });
        }
        debug!(cluster_id, color = %to_hex(color), "override set");
        self.overrides.insert(cluster_id, color);
        Ok(())
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Display palette with overrides applied.
    pub fn palette(&self) -> Vec<Srgb<u8>> {
        let mut palette = self.base_palette.clone();
        for (&id, &color) in &self.overrides {
            palette[id] = color;
        }
        palette
    }

    pub fn palette_hex(&self) -> Vec<String> {
        self.palette().into_iter().map(to_hex).collect()
    }

    pub fn distribution(&self) -> Vec<DistributionEntry> {
        distribution(&self.clusters.assignment, &self.palette())
    }

    pub fn reconstruct(&self) -> Result<RgbImage> {
        reconstruct_image(
            &self.clusters.assignment,
            &self.palette(),
            self.width,
            self.height,
        )
    }

    /// Cluster id whose current palette color is `hex`. The lowest id wins
    /// when several clusters share a color.
    pub fn cluster_for_hex(&self, hex: &str) -> Result<usize> {
        let wanted = parse_hex(hex)?;
        self.palette()
            .iter()
            .position(|&c| c == wanted)
            .ok_or_else(|| ReduceError::InvalidColor(format!("{hex} is not in the palette")))
    }
}
