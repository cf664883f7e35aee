use crate::config;
use crate::error::{ConfigurationError, ConsistencyError, Result};
use crate::grid::GridShape;
use crate::list::{NeighborList, check_count, check_cutoff, check_particle};
use crate::particles::{Particle, ParticleStore};
use crate::simbox::SimBox;
use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::{debug, info_span};

const PARALLEL_EPSILON: f64 = 1e-12;
/// Largest lattice coordinate a rod end may reach, well inside `i64`.
const MAX_LATTICE_COORD: f64 = (1u64 << 52) as f64;

/// Squared distance between the closest points of two rods of equal
/// `length`, using the minimum image of their centers.
pub fn rod_distance_sq(simbox: &SimBox, pi: &Particle, pj: &Particle, length: f64) -> f64 {
    let r = simbox.min_image(&pi.pos, &pj.pos);
    let d1 = pi.axis() * length;
    let d2 = pj.axis() * length;
    let p1 = -0.5 * d1;
    let p2 = r - 0.5 * d2;
    segment_distance_sq(&p1, &d1, &p2, &d2)
}

/// Closest approach of the segments `p1 + s d1` and `p2 + t d2`, `s, t` in [0, 1].
fn segment_distance_sq(
    p1: &Vector3<f64>,
    d1: &Vector3<f64>,
    p2: &Vector3<f64>,
    d2: &Vector3<f64>,
) -> f64 {
    let r = p1 - p2;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);

    let (s, t) = if a <= PARALLEL_EPSILON && e <= PARALLEL_EPSILON {
        (0.0, 0.0)
    } else if a <= PARALLEL_EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= PARALLEL_EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > PARALLEL_EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (p1 + d1 * s - (p2 + d2 * t)).norm_squared()
}

/// Lattice cells crossed by the segment from `start` to `end`, both in units
/// of cells. Fails with the number of cells when it would exceed `limit`.
fn traverse_segment(
    start: &Vector3<f64>,
    end: &Vector3<f64>,
    limit: usize,
) -> std::result::Result<Vec<Vector3<i64>>, usize> {
    let first = start.map(f64::floor);
    let last = end.map(f64::floor);
    // Bounded in floating point before any integer conversion.
    let span = (last - first).abs().sum() + 1.0;
    let in_range = |v: &Vector3<f64>| v.iter().all(|x| x.abs() < MAX_LATTICE_COORD);
    if span.is_nan() || !in_range(&first) || !in_range(&last) {
        return Err(usize::MAX);
    }
    if span > limit as f64 {
        return Err(span as usize);
    }

    let mut cell = first.map(|x| x as i64);
    let last = last.map(|x| x as i64);
    let dir = end - start;

    let mut remaining = [0i64; 3];
    let mut step = [0i64; 3];
    let mut t_max = [f64::INFINITY; 3];
    let mut t_delta = [f64::INFINITY; 3];
    for axis in 0..3 {
        let diff = last[axis] - cell[axis];
        remaining[axis] = diff.abs();
        if diff == 0 {
            continue;
        }
        step[axis] = diff.signum();
        t_delta[axis] = 1.0 / dir[axis].abs();
        t_max[axis] = if diff > 0 {
            ((cell[axis] + 1) as f64 - start[axis]) / dir[axis]
        } else {
            (start[axis] - cell[axis] as f64) / -dir[axis]
        };
    }

    let total = (remaining.iter().sum::<i64>() + 1) as usize;

    let mut visited = Vec::with_capacity(total);
    visited.push(cell);
    for _ in 1..total {
        // Only axes with crossings left are candidates, which also keeps the
        // walk from overshooting `last` through rounding.
        let mut axis = usize::MAX;
        for a in 0..3 {
            if remaining[a] > 0 && (axis == usize::MAX || t_max[a] < t_max[axis]) {
                axis = a;
            }
        }
        cell[axis] += step[axis];
        t_max[axis] += t_delta[axis];
        remaining[axis] -= 1;
        visited.push(cell);
    }
    Ok(visited)
}

/// Distinct cells a rod's segment passes through.
fn rod_occupancy(
    shape: &GridShape,
    simbox: &SimBox,
    particle: &Particle,
    index: usize,
    rod_length: f64,
    max_cells: usize,
) -> Result<Vec<usize>> {
    let half = particle.axis() * (0.5 * rod_length);
    let start = shape.continuous_coords(simbox, &(particle.pos - half));
    let end = shape.continuous_coords(simbox, &(particle.pos + half));

    let overflow = |cells: usize| ConsistencyError::RodCellOverflow {
        index,
        cells,
        max: max_cells,
    };
    let lattice = traverse_segment(&start, &end, max_cells).map_err(overflow)?;

    let mut cells: Vec<usize> = lattice
        .into_iter()
        .map(|c| shape.linear_index(shape.resolve(c)))
        .collect();
    cells.sort_unstable();
    cells.dedup();
    Ok(cells)
}

/// Cell list for elongated particles. A rod is registered in every cell its
/// segment crosses, so a neighbor near either end is found even when the
/// rod's center is several cells away.
#[derive(Debug)]
pub struct RodCells {
    rod_length: f64,
    max_cells: usize,
    cutoff: f64,
    shape: Option<GridShape>,
    cells: Vec<Vec<usize>>,
    /// rod_cells[particle] = sorted cells its segment crosses
    rod_cells: Vec<Vec<usize>>,
}

impl RodCells {
    pub fn new(rod_length: f64, max_cells: usize) -> Self {
        Self {
            rod_length,
            max_cells,
            cutoff: 0.0,
            shape: None,
            cells: Vec::new(),
            rod_cells: Vec::new(),
        }
    }

    pub fn rod_length(&self) -> f64 {
        self.rod_length
    }

    pub fn shape(&self) -> Result<&GridShape> {
        self.shape
            .as_ref()
            .ok_or_else(|| ConsistencyError::NotInitialized.into())
    }

    /// Cells currently occupied by rod `p`.
    pub fn occupied_cells(&self, p: usize) -> Result<&[usize]> {
        self.shape()?;
        check_particle(p, self.rod_cells.len())?;
        Ok(&self.rod_cells[p])
    }

    fn audit(&self) -> Result<()> {
        let mut counts = vec![0usize; self.rod_cells.len()];
        for (cell, bucket) in self.cells.iter().enumerate() {
            for &p in bucket {
                counts[p] += 1;
                let recorded = &self.rod_cells[p];
                if recorded.binary_search(&cell).is_err() {
                    return Err(match recorded.first() {
                        Some(&first) => ConsistencyError::CellMismatch {
                            index: p,
                            recorded: first,
                            found: cell,
                        },
                        None => ConsistencyError::ParticleNotInCell { index: p },
                    }
                    .into());
                }
            }
        }
        for (p, recorded) in self.rod_cells.iter().enumerate() {
            if recorded.is_empty() || counts[p] < recorded.len() {
                return Err(ConsistencyError::ParticleNotInCell { index: p }.into());
            }
            if counts[p] > recorded.len() {
                return Err(ConsistencyError::DuplicateParticle {
                    index: p,
                    count: counts[p],
                }
                .into());
            }
        }
        Ok(())
    }
}

impl NeighborList for RodCells {
    fn name(&self) -> &'static str {
        "rodcells"
    }

    fn initialize(
        &mut self,
        particles: &ParticleStore,
        simbox: &SimBox,
        cutoff: f64,
    ) -> Result<()> {
        check_cutoff(cutoff)?;
        if !self.rod_length.is_finite() || self.rod_length < 0.0 {
            return Err(ConfigurationError::InvalidRodLength(self.rod_length).into());
        }
        self.cutoff = cutoff;
        self.shape = Some(GridShape::new(simbox, cutoff)?);
        self.rod_cells = vec![Vec::new(); particles.len()];
        let built = self.global_update(particles, simbox, false);
        if built.is_err() {
            self.shape = None;
        }
        built
    }

    fn single_update(&mut self, p: usize, particles: &ParticleStore, simbox: &SimBox) -> Result<()> {
        let shape = self
            .shape
            .as_ref()
            .ok_or(ConsistencyError::NotInitialized)?;
        check_count(self.rod_cells.len(), particles)?;
        check_particle(p, self.rod_cells.len())?;

        let new = rod_occupancy(
            shape,
            simbox,
            &particles[p],
            p,
            self.rod_length,
            self.max_cells,
        )?;
        if new == self.rod_cells[p] {
            return Ok(());
        }
        let old = std::mem::take(&mut self.rod_cells[p]);
        for &c in old.iter().filter(|c| new.binary_search(c).is_err()) {
            let bucket = &mut self.cells[c];
            let slot = bucket
                .iter()
                .position(|&q| q == p)
                .ok_or(ConsistencyError::ParticleNotInCell { index: p })?;
            bucket.swap_remove(slot);
        }
        for &c in new.iter().filter(|c| old.binary_search(c).is_err()) {
            self.cells[c].push(p);
        }
        self.rod_cells[p] = new;
        Ok(())
    }

    fn is_updated(&self) -> bool {
        true
    }

    fn global_update(&mut self, particles: &ParticleStore, simbox: &SimBox, force: bool) -> Result<()> {
        let _span = info_span!("RodCells::global_update", n_particles = particles.len()).entered();
        let current = self
            .shape
            .as_ref()
            .ok_or(ConsistencyError::NotInitialized)?;
        check_count(self.rod_cells.len(), particles)?;

        // Built into locals: a failed rebuild leaves the previous index intact.
        let shape = if force || current.is_stale(simbox) {
            GridShape::new(simbox, self.cutoff)?
        } else {
            current.clone()
        };

        let (rod_length, max_cells) = (self.rod_length, self.max_cells);
        let occupy = |i: usize| {
            rod_occupancy(&shape, simbox, &particles[i], i, rod_length, max_cells)
        };
        let n = particles.len();
        let occupancy: Vec<Vec<usize>> = if n >= config::get_parallel_threshold() {
            (0..n).into_par_iter().map(occupy).collect::<Result<_>>()?
        } else {
            (0..n).map(occupy).collect::<Result<_>>()?
        };

        let mut cells = vec![Vec::new(); shape.total_cells()];
        for (i, occupied) in occupancy.iter().enumerate() {
            for &c in occupied {
                cells[c].push(i);
            }
        }
        self.shape = Some(shape);
        self.cells = cells;
        let registrations: usize = occupancy.iter().map(Vec::len).sum();
        self.rod_cells = occupancy;
        debug!(registrations, n_rods = n, "rod cells rebuilt");

        if force {
            self.audit()?;
        }
        Ok(())
    }

    fn get_complete_neigh_list(&self, p: usize) -> Result<Vec<usize>> {
        let shape = self.shape()?;
        check_particle(p, self.rod_cells.len())?;
        let mut neighs = Vec::new();
        for &cell in &self.rod_cells[p] {
            shape.for_each_neighbor_cell(cell, |c| {
                neighs.extend(self.cells[c].iter().copied().filter(|&q| q != p));
            });
        }
        neighs.sort_unstable();
        neighs.dedup();
        Ok(neighs)
    }
}
