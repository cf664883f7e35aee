//! Exact-distance pair utilities. These are the reference the spatial
//! indexes are checked against, and the filter the interaction layer applies
//! to candidate sets.

use crate::particles::ParticleStore;
use crate::simbox::SimBox;

/// All pairs `(i, j)`, `i < j`, whose minimum-image distance is at most `cutoff`.
pub fn brute_force_pairs(
    simbox: &SimBox,
    particles: &ParticleStore,
    cutoff: f64,
) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let n = particles.len();
    let cutoff_sq = cutoff * cutoff;

    for i in 0..n {
        for j in (i + 1)..n {
            if simbox.sqr_min_image_distance(&particles[i].pos, &particles[j].pos) <= cutoff_sq {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Keeps the candidates of `p` that lie within `cutoff` of it.
pub fn filter_within(
    simbox: &SimBox,
    particles: &ParticleStore,
    p: usize,
    candidates: &[usize],
    cutoff: f64,
) -> Vec<usize> {
    let cutoff_sq = cutoff * cutoff;
    let pos_p = particles[p].pos;
    candidates
        .iter()
        .copied()
        .filter(|&q| simbox.sqr_min_image_distance(&pos_p, &particles[q].pos) <= cutoff_sq)
        .collect()
}

/// Turns per-particle candidate sets into sorted, unique `(i, j)` pairs with
/// `i < j` that survive the exact distance filter.
pub fn exact_pairs<F>(
    simbox: &SimBox,
    particles: &ParticleStore,
    cutoff: f64,
    mut candidates_of: F,
) -> Vec<(usize, usize)>
where
    F: FnMut(usize) -> Vec<usize>,
{
    let mut pairs = Vec::new();
    for i in 0..particles.len() {
        let candidates = candidates_of(i);
        for j in filter_within(simbox, particles, i, &candidates, cutoff) {
            if i < j {
                pairs.push((i, j));
            }
        }
    }
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}
