use crate::error::{ConsistencyError, Result};
use crate::list::{NeighborList, check_count, check_cutoff, check_particle};
use crate::particles::ParticleStore;
use crate::simbox::SimBox;

/// All-pairs strategy: every particle is a candidate of every other one.
#[derive(Debug, Default)]
pub struct NoList {
    n_particles: Option<usize>,
    cutoff: f64,
}

impl NoList {
    pub fn new() -> Self {
        Self::default()
    }

    fn n_particles(&self) -> Result<usize> {
        self.n_particles
            .ok_or_else(|| ConsistencyError::NotInitialized.into())
    }
}

impl NeighborList for NoList {
    fn name(&self) -> &'static str {
        "no"
    }

    fn initialize(
        &mut self,
        particles: &ParticleStore,
        simbox: &SimBox,
        cutoff: f64,
    ) -> Result<()> {
        check_cutoff(cutoff)?;
        simbox.check_range(cutoff)?;
        self.cutoff = cutoff;
        self.n_particles = Some(particles.len());
        Ok(())
    }

    fn single_update(&mut self, p: usize, particles: &ParticleStore, _simbox: &SimBox) -> Result<()> {
        let n = self.n_particles()?;
        check_count(n, particles)?;
        check_particle(p, n)
    }

    fn is_updated(&self) -> bool {
        true
    }

    fn global_update(&mut self, particles: &ParticleStore, simbox: &SimBox, force: bool) -> Result<()> {
        check_count(self.n_particles()?, particles)?;
        if force {
            simbox.check_range(self.cutoff)?;
        }
        Ok(())
    }

    fn get_complete_neigh_list(&self, p: usize) -> Result<Vec<usize>> {
        let n = self.n_particles()?;
        check_particle(p, n)?;
        Ok((0..n).filter(|&q| q != p).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_everyone_is_a_candidate() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let store = ParticleStore::from_positions((0..4).map(|i| Vector3::new(i as f64 * 2.0, 0.0, 0.0)));
        let mut list = NoList::new();
        list.initialize(&store, &simbox, 1.0).unwrap();

        assert!(list.is_updated());
        assert_eq!(list.get_complete_neigh_list(2).unwrap(), vec![0, 1, 3]);
        list.single_update(2, &store, &simbox).unwrap();
        list.global_update(&store, &simbox, true).unwrap();
        assert!(list.is_updated());
    }

    #[test]
    fn test_requires_initialize() {
        let list = NoList::new();
        let err = list.get_complete_neigh_list(0).unwrap_err();
        assert_eq!(err, ConsistencyError::NotInitialized.into());
    }

    #[test]
    fn test_rejects_unknown_particle() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let store = ParticleStore::from_positions(vec![Vector3::zeros(); 2]);
        let mut list = NoList::new();
        list.initialize(&store, &simbox, 1.0).unwrap();
        assert!(list.get_complete_neigh_list(2).unwrap_err().is_consistency());
        assert!(list.single_update(5, &store, &simbox).is_err());
    }
}
