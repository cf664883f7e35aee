use crate::config;
use crate::error::{ConsistencyError, Result};
use crate::particles::ParticleStore;
use crate::simbox::SimBox;
use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::debug;

/// Cell counts and cell-coordinate arithmetic for a box partitioned into
/// cells whose perpendicular width is at least `range` along every axis.
#[derive(Clone, Debug)]
pub struct GridShape {
    num_cells: Vector3<usize>,
    pbc: Vector3<bool>,
    range: f64,
    box_generation: u64,
}

impl GridShape {
    pub fn new(simbox: &SimBox, range: f64) -> Result<Self> {
        simbox.check_range(range)?;
        let perp_widths = simbox.perpendicular_widths();
        let nx = (perp_widths.x / range).floor() as usize;
        let ny = (perp_widths.y / range).floor() as usize;
        let nz = (perp_widths.z / range).floor() as usize;
        let num_cells = Vector3::new(nx.max(1), ny.max(1), nz.max(1));
        debug!(
            nx = num_cells.x,
            ny = num_cells.y,
            nz = num_cells.z,
            range,
            "grid sized"
        );
        Ok(Self {
            num_cells,
            pbc: *simbox.pbc(),
            range,
            box_generation: simbox.generation(),
        })
    }

    pub fn num_cells(&self) -> Vector3<usize> {
        self.num_cells
    }

    pub fn total_cells(&self) -> usize {
        self.num_cells.x * self.num_cells.y * self.num_cells.z
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    /// True when the box changed after this shape was derived.
    pub fn is_stale(&self, simbox: &SimBox) -> bool {
        self.box_generation != simbox.generation()
    }

    /// Position in units of cells, without wrapping.
    pub fn continuous_coords(&self, simbox: &SimBox, pos: &Vector3<f64>) -> Vector3<f64> {
        let frac = simbox.to_fractional(pos);
        Vector3::new(
            frac.x * self.num_cells.x as f64,
            frac.y * self.num_cells.y as f64,
            frac.z * self.num_cells.z as f64,
        )
    }

    /// Cell containing `pos`. Periodic axes wrap; open axes clamp particles
    /// outside the box into the boundary cells.
    pub fn cell_coords(&self, simbox: &SimBox, pos: &Vector3<f64>) -> Vector3<usize> {
        let frac = simbox.to_fractional(pos);
        let mut coords = Vector3::zeros();
        for axis in 0..3 {
            let n = self.num_cells[axis];
            let f = if self.pbc[axis] {
                frac[axis] - frac[axis].floor()
            } else {
                frac[axis].clamp(0.0, 1.0)
            };
            coords[axis] = ((f * n as f64) as usize).min(n - 1);
        }
        coords
    }

    /// Maps an unbounded lattice coordinate onto a cell.
    pub fn resolve(&self, lattice: Vector3<i64>) -> Vector3<usize> {
        let mut coords = Vector3::zeros();
        for axis in 0..3 {
            let n = self.num_cells[axis] as i64;
            coords[axis] = if self.pbc[axis] {
                lattice[axis].rem_euclid(n) as usize
            } else {
                lattice[axis].clamp(0, n - 1) as usize
            };
        }
        coords
    }

    pub fn linear_index(&self, c: Vector3<usize>) -> usize {
        c.x + self.num_cells.x * (c.y + self.num_cells.y * c.z)
    }

    pub fn coords_of(&self, linear_idx: usize) -> Vector3<usize> {
        let bx = linear_idx % self.num_cells.x;
        let by = (linear_idx / self.num_cells.x) % self.num_cells.y;
        let bz = linear_idx / (self.num_cells.x * self.num_cells.y);
        Vector3::new(bx, by, bz)
    }

    pub fn cell_index(&self, simbox: &SimBox, pos: &Vector3<f64>) -> usize {
        self.linear_index(self.cell_coords(simbox, pos))
    }

    /// Distinct neighbors of `c` along one axis, `c` included.
    fn axis_neighbors(&self, axis: usize, c: usize) -> ([usize; 3], usize) {
        let n = self.num_cells[axis] as i64;
        let mut out = [0; 3];
        let mut len = 0;
        for d in -1..=1 {
            let v = c as i64 + d;
            let v = if self.pbc[axis] {
                v.rem_euclid(n)
            } else if v < 0 || v >= n {
                continue;
            } else {
                v
            };
            let v = v as usize;
            if !out[..len].contains(&v) {
                out[len] = v;
                len += 1;
            }
        }
        (out, len)
    }

    /// Calls `f` once for every distinct cell of the 3x3x3 block around `cell`.
    pub fn for_each_neighbor_cell(&self, cell: usize, mut f: impl FnMut(usize)) {
        let c = self.coords_of(cell);
        let (xs, nx) = self.axis_neighbors(0, c.x);
        let (ys, ny) = self.axis_neighbors(1, c.y);
        let (zs, nz) = self.axis_neighbors(2, c.z);
        for &bz in &zs[..nz] {
            for &by in &ys[..ny] {
                for &bx in &xs[..nx] {
                    f(self.linear_index(Vector3::new(bx, by, bz)));
                }
            }
        }
    }
}

/// Uniform cell grid with single occupancy: each managed particle sits in
/// exactly one bucket.
#[derive(Clone, Debug)]
pub struct CellGrid {
    shape: GridShape,
    cells: Vec<Vec<usize>>,
    /// cell_of[particle] = linear index of its bucket
    cell_of: Vec<Option<usize>>,
}

impl CellGrid {
    pub fn new(simbox: &SimBox, range: f64, n_particles: usize) -> Result<Self> {
        let shape = GridShape::new(simbox, range)?;
        Ok(Self {
            cells: vec![Vec::new(); shape.total_cells()],
            cell_of: vec![None; n_particles],
            shape,
        })
    }

    pub fn shape(&self) -> &GridShape {
        &self.shape
    }

    /// Re-derives the cell counts for the current box and empties the grid.
    pub fn reshape(&mut self, simbox: &SimBox) -> Result<()> {
        self.shape = GridShape::new(simbox, self.shape.range)?;
        self.cells = vec![Vec::new(); self.shape.total_cells()];
        self.cell_of.iter_mut().for_each(|c| *c = None);
        Ok(())
    }

    /// Clears the grid and assigns every particle of `members` to its cell.
    pub fn fill(&mut self, simbox: &SimBox, particles: &ParticleStore, members: &[usize]) {
        for bucket in &mut self.cells {
            bucket.clear();
        }
        self.cell_of.clear();
        self.cell_of.resize(particles.len(), None);

        let shape = &self.shape;
        let assignment: Vec<usize> = if members.len() >= config::get_parallel_threshold() {
            members
                .par_iter()
                .map(|&i| shape.cell_index(simbox, &particles[i].pos))
                .collect()
        } else {
            members
                .iter()
                .map(|&i| shape.cell_index(simbox, &particles[i].pos))
                .collect()
        };

        for (&i, &cell) in members.iter().zip(&assignment) {
            self.cells[cell].push(i);
            self.cell_of[i] = Some(cell);
        }
    }

    /// Moves `p` to the cell containing `pos`. Returns whether the cell changed.
    pub fn update(&mut self, p: usize, simbox: &SimBox, pos: &Vector3<f64>) -> Result<bool> {
        let old = self.cell_of[p].ok_or(ConsistencyError::ParticleNotInCell { index: p })?;
        let new = self.shape.cell_index(simbox, pos);
        if old == new {
            return Ok(false);
        }
        let bucket = &mut self.cells[old];
        let slot = bucket
            .iter()
            .position(|&q| q == p)
            .ok_or(ConsistencyError::CellMismatch {
                index: p,
                recorded: old,
                found: new,
            })?;
        bucket.swap_remove(slot);
        self.cells[new].push(p);
        self.cell_of[p] = Some(new);
        Ok(true)
    }

    pub fn cell_of(&self, p: usize) -> Option<usize> {
        self.cell_of.get(p).copied().flatten()
    }

    pub fn particles_in(&self, cell: usize) -> &[usize] {
        &self.cells[cell]
    }

    /// Appends to `out` every particle in the 3x3x3 block around `p`'s cell, except `p`.
    pub fn collect_neighbors(&self, p: usize, out: &mut Vec<usize>) -> Result<()> {
        let cell = self
            .cell_of(p)
            .ok_or(ConsistencyError::ParticleNotInCell { index: p })?;
        self.shape.for_each_neighbor_cell(cell, |c| {
            out.extend(self.cells[c].iter().copied().filter(|&q| q != p));
        });
        Ok(())
    }

    /// Checks that every particle of `members` is stored exactly once, in the
    /// bucket its inverse mapping records.
    pub fn audit(&self, members: &[usize]) -> Result<()> {
        let mut counts = vec![0usize; self.cell_of.len()];
        for (cell, bucket) in self.cells.iter().enumerate() {
            for &p in bucket {
                counts[p] += 1;
                match self.cell_of[p] {
                    Some(recorded) if recorded == cell => {}
                    Some(recorded) => {
                        return Err(ConsistencyError::CellMismatch {
                            index: p,
                            recorded,
                            found: cell,
                        }
                        .into());
                    }
                    None => return Err(ConsistencyError::ParticleNotInCell { index: p }.into()),
                }
            }
        }
        for &p in members {
            match counts[p] {
                1 => {}
                0 => return Err(ConsistencyError::ParticleNotInCell { index: p }.into()),
                count => return Err(ConsistencyError::DuplicateParticle { index: p, count }.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_grid_shape() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let shape = GridShape::new(&simbox, 3.0).unwrap();
        assert_eq!(shape.num_cells(), Vector3::new(3, 3, 3));
        assert_eq!(shape.total_cells(), 27);

        let c = shape.cell_coords(&simbox, &Vector3::new(9.9, 0.1, 5.0));
        assert_eq!(c, Vector3::new(2, 0, 1));
        assert_eq!(shape.coords_of(shape.linear_index(c)), c);
    }

    #[test]
    fn test_wrapped_and_clamped_coords() {
        let h = Matrix3::identity() * 10.0;
        let simbox = SimBox::new(h, Vector3::new(true, false, true)).unwrap();
        let shape = GridShape::new(&simbox, 2.0).unwrap();

        let c = shape.cell_coords(&simbox, &Vector3::new(-0.5, -3.0, 10.5));
        assert_eq!(c, Vector3::new(4, 0, 0));
        let c = shape.cell_coords(&simbox, &Vector3::new(10.0, 12.0, 0.0));
        assert_eq!(c, Vector3::new(0, 4, 0));

        assert_eq!(shape.resolve(Vector3::new(-1, -1, 7)), Vector3::new(4, 0, 2));
    }

    #[test]
    fn test_neighbor_cells_distinct() {
        let simbox = SimBox::cubic(10.0).unwrap();

        let shape = GridShape::new(&simbox, 2.0).unwrap();
        let mut seen = Vec::new();
        shape.for_each_neighbor_cell(0, |c| seen.push(c));
        assert_eq!(seen.len(), 27);

        // Two cells per axis: each one visited once.
        let shape = GridShape::new(&simbox, 5.0).unwrap();
        let mut seen = Vec::new();
        shape.for_each_neighbor_cell(0, |c| seen.push(c));
        seen.sort();
        assert_eq!(seen, all(8));
    }

    #[test]
    fn test_open_axis_neighbors_do_not_wrap() {
        let simbox = SimBox::new(Matrix3::identity() * 10.0, Vector3::new(false, false, false)).unwrap();
        let shape = GridShape::new(&simbox, 2.0).unwrap();
        let mut seen = Vec::new();
        shape.for_each_neighbor_cell(0, |c| seen.push(c));
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn test_box_too_small() {
        let simbox = SimBox::cubic(3.0).unwrap();
        assert!(GridShape::new(&simbox, 2.0).unwrap_err().is_configuration());
    }

    #[test]
    fn test_fill_update_audit() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let mut store = ParticleStore::from_positions(vec![
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(1.5, 1.0, 1.0),
            Vector3::new(9.0, 9.0, 9.0),
        ]);
        let mut grid = CellGrid::new(&simbox, 2.5, store.len()).unwrap();
        grid.fill(&simbox, &store, &all(3));
        grid.audit(&all(3)).unwrap();
        assert_eq!(grid.cell_of(0), grid.cell_of(1));

        store.set_position(1, Vector3::new(5.0, 5.0, 5.0));
        assert!(grid.update(1, &simbox, &store[1].pos).unwrap());
        assert!(!grid.update(1, &simbox, &store[1].pos).unwrap());
        grid.audit(&all(3)).unwrap();
        assert_ne!(grid.cell_of(0), grid.cell_of(1));
        assert_eq!(grid.particles_in(grid.cell_of(0).unwrap()), &[0]);
        assert_eq!(grid.particles_in(grid.cell_of(1).unwrap()), &[1]);
    }

    #[test]
    fn test_collect_neighbors_wraps() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let store = ParticleStore::from_positions(vec![
            Vector3::new(0.1, 5.0, 5.0),
            Vector3::new(9.9, 5.0, 5.0),
            Vector3::new(5.0, 5.0, 5.0),
        ]);
        let mut grid = CellGrid::new(&simbox, 2.0, store.len()).unwrap();
        grid.fill(&simbox, &store, &all(3));

        let mut out = Vec::new();
        grid.collect_neighbors(0, &mut out).unwrap();
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn test_parallel_fill_matches_serial() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let store = ParticleStore::from_positions(
            (0..500).map(|i| Vector3::new((i % 10) as f64, ((i / 10) % 10) as f64 + 0.5, (i / 100) as f64 * 1.9)),
        );
        let mut serial = CellGrid::new(&simbox, 1.5, store.len()).unwrap();
        serial.fill(&simbox, &store, &all(500));

        let old = config::get_parallel_threshold();
        config::set_parallel_threshold(1);
        let mut parallel = CellGrid::new(&simbox, 1.5, store.len()).unwrap();
        parallel.fill(&simbox, &store, &all(500));
        config::set_parallel_threshold(old);

        for i in 0..500 {
            assert_eq!(serial.cell_of(i), parallel.cell_of(i));
        }
        parallel.audit(&all(500)).unwrap();
    }

    #[test]
    fn test_audit_detects_missing_particle() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let store = ParticleStore::from_positions(vec![Vector3::new(1.0, 1.0, 1.0); 2]);
        let mut grid = CellGrid::new(&simbox, 2.0, store.len()).unwrap();
        grid.fill(&simbox, &store, &[0]);
        let err = grid.audit(&all(2)).unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::ParticleNotInCell { index: 1 }.into()
        );
    }

    #[cfg(feature = "dhat-heap")]
    #[test]
    fn test_memory_profile() {
        let _profiler = dhat::Profiler::new_heap();

        let simbox = SimBox::cubic(20.0).unwrap();
        let store = ParticleStore::from_positions(
            (0..10_000).map(|i| Vector3::new((i % 100) as f64 * 0.2, (i / 100) as f64 * 0.2, 0.0)),
        );
        let mut grid = CellGrid::new(&simbox, 3.0, store.len()).unwrap();
        grid.fill(&simbox, &store, &all(store.len()));
        let mut out = Vec::new();
        for p in 0..store.len() {
            out.clear();
            grid.collect_neighbors(p, &mut out).unwrap();
        }
    }
}
