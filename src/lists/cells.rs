use crate::error::{ConsistencyError, Result};
use crate::grid::CellGrid;
use crate::list::{NeighborList, check_count, check_cutoff, check_particle};
use crate::particles::ParticleStore;
use crate::simbox::SimBox;
use nalgebra::Vector3;
use tracing::{debug, info_span};

/// Uniform cell list. Every move is applied to the grid immediately, so the
/// candidate sets are always complete.
#[derive(Debug, Default)]
pub struct CellList {
    grid: Option<CellGrid>,
    /// Indices managed by the grid (all particles).
    members: Vec<usize>,
}

impl CellList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(&self) -> Result<&CellGrid> {
        self.grid
            .as_ref()
            .ok_or_else(|| ConsistencyError::NotInitialized.into())
    }

    pub fn num_cells(&self) -> Result<Vector3<usize>> {
        Ok(self.grid()?.shape().num_cells())
    }

    pub fn cell_of(&self, p: usize) -> Option<usize> {
        self.grid.as_ref().and_then(|g| g.cell_of(p))
    }

    fn grid_mut(&mut self) -> Result<&mut CellGrid> {
        self.grid
            .as_mut()
            .ok_or_else(|| ConsistencyError::NotInitialized.into())
    }
}

impl NeighborList for CellList {
    fn name(&self) -> &'static str {
        "cells"
    }

    fn initialize(
        &mut self,
        particles: &ParticleStore,
        simbox: &SimBox,
        cutoff: f64,
    ) -> Result<()> {
        check_cutoff(cutoff)?;
        self.grid = Some(CellGrid::new(simbox, cutoff, particles.len())?);
        self.members = (0..particles.len()).collect();
        self.global_update(particles, simbox, false)
    }

    fn single_update(&mut self, p: usize, particles: &ParticleStore, simbox: &SimBox) -> Result<()> {
        check_count(self.members.len(), particles)?;
        check_particle(p, self.members.len())?;
        self.grid_mut()?.update(p, simbox, &particles[p].pos)?;
        Ok(())
    }

    fn is_updated(&self) -> bool {
        true
    }

    fn global_update(&mut self, particles: &ParticleStore, simbox: &SimBox, force: bool) -> Result<()> {
        let _span = info_span!("CellList::global_update", n_particles = particles.len()).entered();
        let grid = self
            .grid
            .as_mut()
            .ok_or(ConsistencyError::NotInitialized)?;
        check_count(self.members.len(), particles)?;

        if force || grid.shape().is_stale(simbox) {
            grid.reshape(simbox)?;
        }
        grid.fill(simbox, particles, &self.members);
        if force {
            grid.audit(&self.members)?;
        }
        debug!(cells = grid.shape().total_cells(), "cell list rebuilt");
        Ok(())
    }

    fn get_complete_neigh_list(&self, p: usize) -> Result<Vec<usize>> {
        check_particle(p, self.members.len())?;
        let mut neighs = Vec::new();
        self.grid()?.collect_neighbors(p, &mut neighs)?;
        Ok(neighs)
    }
}
