use crate::error::{ConfigurationError, ConsistencyError, Result};
use crate::particles::ParticleStore;
use crate::simbox::SimBox;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to the list strategy selected for a run.
pub type ListPtr = Rc<RefCell<dyn NeighborList>>;

/// Contract shared by every neighbor-list strategy.
///
/// Candidate sets are supersets: every particle within the interaction
/// cutoff of `p` is returned while [`is_updated`](Self::is_updated) holds,
/// and the caller re-filters by exact distance. The box and the particle
/// store are passed on every call; a list only owns its index.
pub trait NeighborList {
    /// The `list_type` key this strategy is selected with.
    fn name(&self) -> &'static str;

    /// Allocates the index for the store's particles and builds it.
    fn initialize(&mut self, particles: &ParticleStore, simbox: &SimBox, cutoff: f64)
    -> Result<()>;

    /// Re-places particle `p` after its position or orientation changed.
    fn single_update(&mut self, p: usize, particles: &ParticleStore, simbox: &SimBox)
    -> Result<()>;

    /// Whether candidate sets are still complete without a rebuild.
    fn is_updated(&self) -> bool;

    /// Rebuilds the whole index. `force` re-derives the grid from the current
    /// box and audits the result.
    fn global_update(&mut self, particles: &ParticleStore, simbox: &SimBox, force: bool)
    -> Result<()>;

    /// Candidate neighbors of `p`, never including `p` itself.
    fn get_complete_neigh_list(&self, p: usize) -> Result<Vec<usize>>;

    /// Candidates of `p` with a larger index that are not bonded to it, so
    /// that iterating every particle visits each non-bonded pair once.
    fn get_neigh_list(&self, p: usize, particles: &ParticleStore) -> Result<Vec<usize>> {
        let mut neighs = self.get_complete_neigh_list(p)?;
        neighs.retain(|&q| q > p && !particles.is_bonded(p, q));
        Ok(neighs)
    }

    /// Every non-bonded candidate pair `(i, j)` with `i < j`.
    fn get_potential_interactions(&self, particles: &ParticleStore) -> Result<Vec<(usize, usize)>> {
        let mut pairs = Vec::new();
        for p in 0..particles.len() {
            pairs.extend(self.get_neigh_list(p, particles)?.into_iter().map(|q| (p, q)));
        }
        Ok(pairs)
    }

    /// Check-then-rebuild step run after a trial move of `p`. Returns whether
    /// a full rebuild was needed.
    fn update_after_move(
        &mut self,
        p: usize,
        particles: &ParticleStore,
        simbox: &SimBox,
    ) -> Result<bool> {
        self.single_update(p, particles, simbox)?;
        if self.is_updated() {
            return Ok(false);
        }
        self.global_update(particles, simbox, false)?;
        Ok(true)
    }

    /// Notification that the box changed shape or volume.
    fn change_box(&mut self, particles: &ParticleStore, simbox: &SimBox) -> Result<()> {
        self.global_update(particles, simbox, true)
    }
}

pub(crate) fn check_cutoff(cutoff: f64) -> Result<()> {
    if !cutoff.is_finite() || cutoff <= 0.0 {
        return Err(ConfigurationError::InvalidCutoff(cutoff).into());
    }
    Ok(())
}

pub(crate) fn check_skin(skin: f64) -> Result<()> {
    if !skin.is_finite() || skin <= 0.0 {
        return Err(ConfigurationError::InvalidSkin(skin).into());
    }
    Ok(())
}

pub(crate) fn check_particle(p: usize, n_particles: usize) -> Result<()> {
    if p >= n_particles {
        return Err(ConsistencyError::UnknownParticle {
            index: p,
            n_particles,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn check_count(expected: usize, particles: &ParticleStore) -> Result<()> {
    if particles.len() != expected {
        return Err(ConsistencyError::ParticleCountChanged {
            expected,
            found: particles.len(),
        }
        .into());
    }
    Ok(())
}
