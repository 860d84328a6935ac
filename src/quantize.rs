//! K-means clustering of Lab pixels.
//!
//! Clustering is delegated to `kmeans_colors` (k-means++ seeding, fixed RNG
//! seed), so the same buffer and `k` always yield the same clusters. The
//! centroids returned here are recomputed as the exact mean of each cluster's
//! final members; clusters that end up with no members get a duplicate of the
//! most populated centroid.

use kmeans_colors::get_kmeans;
use palette::Lab;
use tracing::debug;

use crate::color_space::PerceptualBuffer;
use crate::error::{ReduceError, Result};

/// Cluster ids are stored as `u8`, which caps `k`.
pub const MAX_CLUSTERS: usize = u8::MAX as usize + 1;

/// Tuning knobs for the k-means pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KmeansOptions {
    /// Hard cap on Lloyd iterations.
    pub max_iter: usize,
    /// Stop once centroids move less than this between iterations.
    pub converge: f32,
    /// RNG seed for k-means++ initialization.
    pub seed: u64,
}

impl Default for KmeansOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            converge: 1e-4,
            seed: 42,
        }
    }
}

/// Ordered Lab centroids.
///
/// The position of a centroid in this set IS its cluster id. The set is never
/// re-sorted; palette entries, overrides and distribution rows all index into
/// it directly.
#[derive(Clone, Debug, PartialEq)]
pub struct Centroids(Vec<Lab>);

impl Centroids {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, cluster_id: usize) -> Option<Lab> {
        self.0.get(cluster_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lab> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Lab] {
        &self.0
    }
}

/// Output of one quantization pass.
#[derive(Clone, Debug, PartialEq)]
pub struct Clusters {
    /// Cluster id per pixel, row-major.
    pub assignment: Vec<u8>,
    pub centroids: Centroids,
}

impl Clusters {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Number of pixels assigned to each cluster id.
    pub fn counts(&self) -> Vec<usize> {
        histogram(&self.assignment, self.k())
    }
}

/// Partition every point of `buf` into `k` clusters.
///
/// Fails with `InvalidParameter` when `k` is zero, exceeds the number of
/// pixels, or exceeds [`MAX_CLUSTERS`].
pub fn quantize(buf: &PerceptualBuffer, k: usize, opts: &KmeansOptions) -> Result<Clusters> {
    let n = buf.len();
    if k < 1 || k > n || k > MAX_CLUSTERS {
        return Err(ReduceError::InvalidParameter(format!(
            "k = {k} must be between 1 and {} for {n} pixels",
            n.min(MAX_CLUSTERS)
        )));
    }

    let points = buf.points();
    let kmeans = get_kmeans(k, opts.max_iter, opts.converge, false, points, opts.seed);

    // k-means++ stops seeding early once every point coincides with a seed,
    // so fewer than `k` centroids may come back.
    let assignment = kmeans.indices;
    let centroids = mean_centroids(points, &assignment, k);

    debug!(
        pixels = n,
        k,
        seeded = kmeans.centroids.len(),
        score = kmeans.score,
        "k-means finished"
    );
    if tracing::enabled!(tracing::Level::DEBUG) {
        log_cluster_stats(&assignment, &centroids);
    }

    Ok(Clusters {
        assignment,
        centroids: Centroids(centroids),
    })
}

fn histogram(assignment: &[u8], k: usize) -> Vec<usize> {
    let mut counts = vec![0usize; k];
    for &id in assignment {
        if let Some(c) = counts.get_mut(id as usize) {
            *c += 1;
        }
    }
    counts
}

fn mean_centroids(points: &[Lab], assignment: &[u8], k: usize) -> Vec<Lab> {
    let mut sums = vec![[0f64; 3]; k];
    let mut counts = vec![0usize; k];
    for (p, &id) in points.iter().zip(assignment) {
        let id = id as usize;
        sums[id][0] += p.l as f64;
        sums[id][1] += p.a as f64;
        sums[id][2] += p.b as f64;
        counts[id] += 1;
    }

    let means: Vec<Option<Lab>> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| {
            (c > 0).then(|| {
                let c = c as f64;
                Lab::new((s[0] / c) as f32, (s[1] / c) as f32, (s[2] / c) as f32)
            })
        })
        .collect();

    // Degenerate clusters duplicate the most populated one.
    let fallback = counts
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
        .and_then(|(id, _)| means[id])
        .unwrap_or_else(|| Lab::new(0.0, 0.0, 0.0));

    means.into_iter().map(|m| m.unwrap_or(fallback)).collect()
}

fn log_cluster_stats(assignment: &[u8], centroids: &[Lab]) {
    let counts = histogram(assignment, centroids.len());
    let empty = counts.iter().filter(|&&c| c == 0).count();
    let (mut lo, mut hi) = ([f32::INFINITY; 3], [f32::NEG_INFINITY; 3]);
    for c in centroids {
        for (i, v) in [c.l, c.a, c.b].into_iter().enumerate() {
            lo[i] = lo[i].min(v);
            hi[i] = hi[i].max(v);
        }
    }
    debug!(
        ?counts,
        empty,
        l_range = ?(lo[0], hi[0]),
        a_range = ?(lo[1], hi[1]),
        b_range = ?(lo[2], hi[2]),
        "cluster statistics"
    );
}
