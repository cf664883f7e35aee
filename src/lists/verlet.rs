use crate::config;
use crate::error::{ConsistencyError, Result};
use crate::grid::CellGrid;
use crate::list::{NeighborList, check_cutoff, check_particle, check_skin};
use crate::lists::cells::CellList;
use crate::lists::tracker::DisplacementTracker;
use crate::particles::ParticleStore;
use crate::simbox::SimBox;
use rayon::prelude::*;
use tracing::{debug, info_span};

/// Stores, for each member, the particles of its 3x3x3 cell block within
/// `range` (minimum image) that `accept` lets through. Non-members get an
/// empty list.
pub(crate) fn build_verlet_lists<F>(
    grid: &CellGrid,
    particles: &ParticleStore,
    simbox: &SimBox,
    members: &[usize],
    range: f64,
    accept: F,
) -> Result<Vec<Vec<usize>>>
where
    F: Fn(usize, usize) -> bool + Sync,
{
    let range_sq = range * range;
    let build_one = |p: usize| -> Result<Vec<usize>> {
        let mut neighs = Vec::new();
        grid.collect_neighbors(p, &mut neighs)?;
        let pos_p = particles[p].pos;
        neighs.retain(|&q| {
            accept(p, q) && simbox.sqr_min_image_distance(&pos_p, &particles[q].pos) <= range_sq
        });
        Ok(neighs)
    };

    let built: Vec<Vec<usize>> = if members.len() >= config::get_parallel_threshold() {
        members
            .par_iter()
            .map(|&p| build_one(p))
            .collect::<Result<_>>()?
    } else {
        members
            .iter()
            .map(|&p| build_one(p))
            .collect::<Result<_>>()?
    };

    let mut lists = vec![Vec::new(); particles.len()];
    for (&p, neighs) in members.iter().zip(built) {
        lists[p] = neighs;
    }
    Ok(lists)
}

/// Verlet list on top of a cell list sized to cutoff + skin. Candidate sets
/// are computed at rebuild time and stay complete until some particle has
/// moved more than half the skin.
#[derive(Debug)]
pub struct VerletList {
    skin: f64,
    cutoff: f64,
    cells: CellList,
    tracker: DisplacementTracker,
    neighs: Vec<Vec<usize>>,
    rebuilds: usize,
}

impl VerletList {
    pub fn new(skin: f64) -> Self {
        Self {
            skin,
            cutoff: 0.0,
            cells: CellList::new(),
            tracker: DisplacementTracker::new(skin),
            neighs: Vec::new(),
            rebuilds: 0,
        }
    }

    pub fn skin(&self) -> f64 {
        self.skin
    }

    /// Number of full rebuilds since `initialize`, the initial one included.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    /// Largest displacement of any particle since the last rebuild.
    pub fn max_displacement(&self) -> f64 {
        self.tracker.max_displacement()
    }

    pub fn cells(&self) -> &CellList {
        &self.cells
    }
}

impl NeighborList for VerletList {
    fn name(&self) -> &'static str {
        "verlet"
    }

    fn initialize(
        &mut self,
        particles: &ParticleStore,
        simbox: &SimBox,
        cutoff: f64,
    ) -> Result<()> {
        check_cutoff(cutoff)?;
        check_skin(self.skin)?;
        self.cutoff = cutoff;
        self.rebuilds = 0;
        self.cells.initialize(particles, simbox, cutoff + self.skin)?;
        self.global_update(particles, simbox, false)
    }

    fn single_update(&mut self, p: usize, particles: &ParticleStore, simbox: &SimBox) -> Result<()> {
        self.cells.single_update(p, particles, simbox)?;
        self.tracker.record(p, simbox, &particles[p].pos);
        Ok(())
    }

    fn is_updated(&self) -> bool {
        self.tracker.is_valid()
    }

    fn global_update(&mut self, particles: &ParticleStore, simbox: &SimBox, force: bool) -> Result<()> {
        let _span = info_span!("VerletList::global_update", n_particles = particles.len()).entered();
        let built = self.cells.global_update(particles, simbox, force).and_then(|()| {
            let members: Vec<usize> = (0..particles.len()).collect();
            build_verlet_lists(
                self.cells.grid()?,
                particles,
                simbox,
                &members,
                self.cutoff + self.skin,
                |_, _| true,
            )
        });
        self.neighs = match built {
            Ok(neighs) => neighs,
            Err(err) => {
                self.tracker.invalidate();
                return Err(err);
            }
        };
        self.tracker.reset(particles);
        self.rebuilds += 1;
        debug!(rebuilds = self.rebuilds, "verlet lists rebuilt");
        Ok(())
    }

    fn get_complete_neigh_list(&self, p: usize) -> Result<Vec<usize>> {
        if self.rebuilds == 0 {
            return Err(ConsistencyError::NotInitialized.into());
        }
        check_particle(p, self.neighs.len())?;
        Ok(self.neighs[p].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::{brute_force_pairs, exact_pairs};
    use nalgebra::Vector3;

    fn pair_store() -> ParticleStore {
        ParticleStore::from_positions(vec![
            Vector3::new(2.0, 5.0, 5.0),
            Vector3::new(3.5, 5.0, 5.0),
        ])
    }

    #[test]
    fn test_skin_pairs_are_stored() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let store = pair_store();
        let mut list = VerletList::new(0.6);
        list.initialize(&store, &simbox, 1.0).unwrap();

        // 1.5 apart: beyond the cutoff but within cutoff + skin.
        assert_eq!(list.get_complete_neigh_list(0).unwrap(), vec![1]);
        assert_eq!(list.rebuild_count(), 1);
    }

    #[test]
    fn test_half_skin_criterion() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let mut store = pair_store();
        let skin = 0.4;
        let eps = 1e-6;
        let mut list = VerletList::new(skin);
        list.initialize(&store, &simbox, 1.0).unwrap();

        store.set_position(0, Vector3::new(2.0 + skin / 2.0 - eps, 5.0, 5.0));
        list.single_update(0, &store, &simbox).unwrap();
        assert!(list.is_updated());

        store.set_position(0, Vector3::new(2.0 + skin / 2.0 + eps, 5.0, 5.0));
        list.single_update(0, &store, &simbox).unwrap();
        assert!(!list.is_updated());

        assert!(list.update_after_move(0, &store, &simbox).unwrap());
        assert!(list.is_updated());
        assert_eq!(list.rebuild_count(), 2);
        assert_eq!(list.max_displacement(), 0.0);
    }

    #[test]
    fn test_rebuild_idempotence() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let store = ParticleStore::from_positions(
            (0..40).map(|i| {
                let f = i as f64;
                Vector3::new((f * 3.3) % 10.0, (f * 1.7) % 10.0, (f * 0.9) % 10.0)
            }),
        );
        let mut list = VerletList::new(0.3);
        list.initialize(&store, &simbox, 1.2).unwrap();

        list.global_update(&store, &simbox, false).unwrap();
        let first: Vec<Vec<usize>> = (0..40).map(|i| list.get_complete_neigh_list(i).unwrap()).collect();
        list.global_update(&store, &simbox, true).unwrap();
        let second: Vec<Vec<usize>> = (0..40).map(|i| list.get_complete_neigh_list(i).unwrap()).collect();
        assert_eq!(first, second);

        let result = exact_pairs(&simbox, &store, 1.2, |i| list.get_complete_neigh_list(i).unwrap());
        assert_eq!(result, brute_force_pairs(&simbox, &store, 1.2));
    }

    #[test]
    fn test_parallel_build_matches_serial() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let store = ParticleStore::from_positions(
            (0..300).map(|i| {
                let f = i as f64;
                Vector3::new((f * 0.37) % 10.0, (f * 1.13) % 10.0, (f * 2.29) % 10.0)
            }),
        );
        let mut serial = VerletList::new(0.2);
        serial.initialize(&store, &simbox, 1.0).unwrap();

        let old = config::get_parallel_threshold();
        config::set_parallel_threshold(1);
        let mut parallel = VerletList::new(0.2);
        parallel.initialize(&store, &simbox, 1.0).unwrap();
        config::set_parallel_threshold(old);

        for i in 0..300 {
            let mut a = serial.get_complete_neigh_list(i).unwrap();
            let mut b = parallel.get_complete_neigh_list(i).unwrap();
            a.sort();
            b.sort();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_invalid_skin() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let mut list = VerletList::new(0.0);
        assert!(list.initialize(&pair_store(), &simbox, 1.0).unwrap_err().is_configuration());
    }

    #[test]
    fn test_failed_box_change_forces_rebuild() {
        let mut simbox = SimBox::cubic(10.0).unwrap();
        let store = pair_store();
        let mut list = VerletList::new(0.5);
        list.initialize(&store, &simbox, 1.0).unwrap();
        assert_eq!(list.skin(), 0.5);
        assert_eq!(list.cells().num_cells().unwrap(), Vector3::new(6, 6, 6));

        simbox.set_h(nalgebra::Matrix3::identity() * 2.5).unwrap();
        assert!(list.change_box(&store, &simbox).unwrap_err().is_configuration());
        assert!(!list.is_updated());

        simbox.set_h(nalgebra::Matrix3::identity() * 10.0).unwrap();
        assert!(list.update_after_move(0, &store, &simbox).unwrap());
        assert!(list.is_updated());
        assert_eq!(list.get_complete_neigh_list(0).unwrap(), vec![1]);
    }

    #[test]
    fn test_box_must_hold_cutoff_plus_skin() {
        let simbox = SimBox::cubic(2.2).unwrap();
        let mut list = VerletList::new(0.2);
        let store = ParticleStore::from_positions(vec![Vector3::zeros()]);
        assert!(list.initialize(&store, &simbox, 1.0).unwrap_err().is_configuration());
    }
}
