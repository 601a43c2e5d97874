use crate::dataset::Dataset;
use crate::error::ViewerError;
use log::{debug, info};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use std::time::Instant;

const LAYOUT_SEED: u64 = 0x5eed_ce11;
const ATTRACTION: f64 = 0.15;
const REPULSION: f64 = 2.0;
const NEGATIVE_SAMPLES: usize = 4;
const MIN_DIST2: f64 = 1e-6;
const MAX_STEP: f64 = 4.0;

/// Parameters for the neighbor-graph + layout pipeline. Fixed parameters
/// on the same matrix give bit-identical coordinates.
#[derive(Clone, Copy, Debug)]
pub struct EmbeddingParams {
    /// Neighbors per cell; clamped to `n_cells - 1`.
    pub n_neighbors: usize,
    pub n_iterations: usize,
}

impl Default for EmbeddingParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            n_iterations: 200,
        }
    }
}

/// Exact k-nearest-neighbor graph over the raw feature rows (Euclidean,
/// no preprocessing reduction before the graph step).
#[derive(Clone, Debug)]
pub struct NeighborGraph {
    neighbors: Vec<Vec<(u32, f64)>>,
}

impl NeighborGraph {
    /// Brute-force construction, parallel over cells. Ties are broken by
    /// cell index so the graph is deterministic.
    pub fn build(matrix: &Array2<f64>, k: usize) -> Self {
        let n = matrix.nrows();
        let k = k.min(n.saturating_sub(1));
        let neighbors = (0..n)
            .into_par_iter()
            .map(|i| {
                let row_i = matrix.row(i);
                let mut dists: Vec<(f64, u32)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (euclidean(row_i, matrix.row(j)), j as u32))
                    .collect();
                dists.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                dists.truncate(k);
                dists.into_iter().map(|(d, j)| (j, d)).collect()
            })
            .collect();
        Self { neighbors }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    #[inline(always)]
    pub fn neighbors_of(&self, cell: usize) -> &[(u32, f64)] {
        &self.neighbors[cell]
    }
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Guarantees the dataset carries a 2-D embedding, computing one from the
/// neighbor graph if absent.
///
/// A no-op when the embedding is already present, so repeated calls leave
/// bit-identical coordinates. On failure the dataset is left untouched;
/// a partial embedding is never assigned.
pub fn ensure_embedding(
    dataset: &mut Dataset,
    params: &EmbeddingParams,
) -> Result<(), ViewerError> {
    if dataset.embedding().is_some() {
        debug!("Embedding already present; skipping recomputation");
        return Ok(());
    }
    let n = dataset.n_cells();
    if n == 0 {
        return Err(ViewerError::EmbeddingComputation(
            "dataset has zero cells".to_string(),
        ));
    }
    if dataset.n_features() == 0 {
        return Err(ViewerError::EmbeddingComputation(
            "dataset has zero features".to_string(),
        ));
    }
    if dataset.matrix().iter().any(|v| !v.is_finite()) {
        return Err(ViewerError::EmbeddingComputation(
            "matrix contains non-finite values".to_string(),
        ));
    }

    let start = Instant::now();
    let graph = NeighborGraph::build(dataset.matrix(), params.n_neighbors);
    debug!(
        "Built {}-NN graph for {n} cells in {:?}",
        params.n_neighbors.min(n.saturating_sub(1)),
        start.elapsed()
    );
    let coords = layout(&graph, params.n_iterations);
    info!("Computed 2-D embedding for {n} cells in {:?}", start.elapsed());
    dataset.set_embedding(coords);
    Ok(())
}

/// Force-directed layout over the neighbor graph: attraction along edges,
/// repulsion against sampled cells, with a decaying step size. The spiral
/// initialization and fixed-seed sampler make the result a pure function
/// of the graph and iteration count.
fn layout(graph: &NeighborGraph, n_iterations: usize) -> Vec<[f64; 2]> {
    let n = graph.len();
    let mut coords: Vec<[f64; 2]> = (0..n).map(spiral_position).collect();
    let mut rng = SplitMix64::new(LAYOUT_SEED);
    for iteration in 0..n_iterations {
        let alpha = 1.0 - iteration as f64 / n_iterations.max(1) as f64;
        for i in 0..n {
            for &(j, _) in graph.neighbors_of(i) {
                let j = j as usize;
                let dx = coords[j][0] - coords[i][0];
                let dy = coords[j][1] - coords[i][1];
                coords[i][0] += ATTRACTION * alpha * dx;
                coords[i][1] += ATTRACTION * alpha * dy;
            }
            for _ in 0..NEGATIVE_SAMPLES {
                let j = rng.next_index(n);
                if j == i {
                    continue;
                }
                let dx = coords[i][0] - coords[j][0];
                let dy = coords[i][1] - coords[j][1];
                let d2 = (dx * dx + dy * dy).max(MIN_DIST2);
                let push = (REPULSION * alpha / d2).min(MAX_STEP);
                coords[i][0] += push * dx;
                coords[i][1] += push * dy;
            }
        }
    }
    coords
}

/// Golden-angle spiral: distinct, well-spread starting positions without
/// any randomness.
fn spiral_position(i: usize) -> [f64; 2] {
    const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;
    let r = (i as f64).sqrt();
    let theta = i as f64 * GOLDEN_ANGLE;
    [r * theta.cos(), r * theta.sin()]
}

/// splitmix64; fixed seed keeps repulsion sampling reproducible run to run.
struct SplitMix64(u64);

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn next_index(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}
