use crate::error::{ConfigurationError, ConsistencyError, Result};
use crate::grid::CellGrid;
use crate::list::{NeighborList, check_count, check_cutoff, check_particle, check_skin};
use crate::lists::tracker::DisplacementTracker;
use crate::lists::verlet::build_verlet_lists;
use crate::particles::ParticleStore;
use crate::simbox::SimBox;
use tracing::{debug, info_span};

/// Verlet sub-list for the pairs between size classes `a` and `b` (`a <= b`).
#[derive(Debug)]
struct ClassPairList {
    a: usize,
    b: usize,
    /// R_a + R_b
    range: f64,
    members: Vec<usize>,
    grid: CellGrid,
    tracker: DisplacementTracker,
    neighs: Vec<Vec<usize>>,
}

impl ClassPairList {
    fn involves(&self, class: usize) -> bool {
        self.a == class || self.b == class
    }
}

/// Verlet list split by particle size class. Each pair of classes gets a grid
/// sized to the sum of the two interaction radii plus the skin, so small
/// particles are not binned on the scale of the largest ones.
#[derive(Debug)]
pub struct BinVerletList {
    skin: f64,
    radii: Option<Vec<f64>>,
    class_of: Vec<usize>,
    sublists: Vec<ClassPairList>,
    initialized: bool,
    rebuilds: usize,
}

impl BinVerletList {
    pub fn new(skin: f64, radii: Option<Vec<f64>>) -> Self {
        Self {
            skin,
            radii,
            class_of: Vec::new(),
            sublists: Vec::new(),
            initialized: false,
            rebuilds: 0,
        }
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    /// Interaction range of classes `a` and `b`, if both are present in the run.
    pub fn pair_range(&self, a: usize, b: usize) -> Option<f64> {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        self.sublists
            .iter()
            .find(|s| s.a == a && s.b == b)
            .map(|s| s.range)
    }

    fn class_radii(&self, particles: &ParticleStore, cutoff: f64) -> Result<Vec<f64>> {
        let max_class = particles.iter().map(|p| p.size_class).max().unwrap_or(0);
        match &self.radii {
            Some(radii) => {
                if let Some(&r) = radii.iter().find(|r| !r.is_finite() || **r <= 0.0) {
                    return Err(ConfigurationError::InvalidValue {
                        key: "bin_verlet_radii".to_string(),
                        value: r.to_string(),
                    }
                    .into());
                }
                if max_class >= radii.len() {
                    return Err(ConfigurationError::MissingClassRadius {
                        class: max_class,
                        n_classes: radii.len(),
                    }
                    .into());
                }
                Ok(radii.clone())
            }
            None => Ok(vec![0.5 * cutoff; max_class + 1]),
        }
    }

    fn rebuild_sublists(&mut self, particles: &ParticleStore, simbox: &SimBox, force: bool) -> Result<()> {
        // Every grid that needs reshaping has to fit before any is touched.
        for sub in &self.sublists {
            if force || sub.grid.shape().is_stale(simbox) {
                simbox.check_range(sub.grid.shape().range())?;
            }
        }

        let class_of = &self.class_of;
        let skin = self.skin;
        for sub in &mut self.sublists {
            if force || sub.grid.shape().is_stale(simbox) {
                sub.grid.reshape(simbox)?;
            }
            sub.grid.fill(simbox, particles, &sub.members);
            if force {
                sub.grid.audit(&sub.members)?;
            }
            let same_class = sub.a == sub.b;
            sub.neighs = build_verlet_lists(
                &sub.grid,
                particles,
                simbox,
                &sub.members,
                sub.range + skin,
                |p, q| same_class || class_of[p] != class_of[q],
            )?;
            sub.tracker.reset(particles);
        }
        Ok(())
    }
}

impl NeighborList for BinVerletList {
    fn name(&self) -> &'static str {
        "bin_verlet"
    }

    fn initialize(
        &mut self,
        particles: &ParticleStore,
        simbox: &SimBox,
        cutoff: f64,
    ) -> Result<()> {
        check_cutoff(cutoff)?;
        check_skin(self.skin)?;
        let radii = self.class_radii(particles, cutoff)?;

        self.class_of = particles.iter().map(|p| p.size_class).collect();
        self.sublists.clear();
        let n_classes = radii.len();
        for a in 0..n_classes {
            for b in a..n_classes {
                let members: Vec<usize> = (0..particles.len())
                    .filter(|&i| self.class_of[i] == a || self.class_of[i] == b)
                    .collect();
                let has_a = members.iter().any(|&i| self.class_of[i] == a);
                let has_b = members.iter().any(|&i| self.class_of[i] == b);
                if !has_a || !has_b {
                    continue;
                }
                let range = radii[a] + radii[b];
                debug!(a, b, range, n_members = members.len(), "class pair grid");
                self.sublists.push(ClassPairList {
                    a,
                    b,
                    range,
                    grid: CellGrid::new(simbox, range + self.skin, particles.len())?,
                    members,
                    tracker: DisplacementTracker::new(self.skin),
                    neighs: Vec::new(),
                });
            }
        }
        self.initialized = true;
        self.rebuilds = 0;
        self.global_update(particles, simbox, false)
    }

    fn single_update(&mut self, p: usize, particles: &ParticleStore, simbox: &SimBox) -> Result<()> {
        if !self.initialized {
            return Err(ConsistencyError::NotInitialized.into());
        }
        check_count(self.class_of.len(), particles)?;
        check_particle(p, self.class_of.len())?;
        let class = self.class_of[p];
        let pos = particles[p].pos;
        for sub in self.sublists.iter_mut().filter(|s| s.involves(class)) {
            sub.grid.update(p, simbox, &pos)?;
            sub.tracker.record(p, simbox, &pos);
        }
        Ok(())
    }

    fn is_updated(&self) -> bool {
        self.sublists.iter().all(|s| s.tracker.is_valid())
    }

    fn global_update(&mut self, particles: &ParticleStore, simbox: &SimBox, force: bool) -> Result<()> {
        let _span = info_span!("BinVerletList::global_update", n_particles = particles.len()).entered();
        if !self.initialized {
            return Err(ConsistencyError::NotInitialized.into());
        }
        check_count(self.class_of.len(), particles)?;

        if let Err(err) = self.rebuild_sublists(particles, simbox, force) {
            for sub in &mut self.sublists {
                sub.tracker.invalidate();
            }
            return Err(err);
        }
        self.rebuilds += 1;
        debug!(
            sublists = self.sublists.len(),
            rebuilds = self.rebuilds,
            "binned verlet lists rebuilt"
        );
        Ok(())
    }

    fn get_complete_neigh_list(&self, p: usize) -> Result<Vec<usize>> {
        if !self.initialized {
            return Err(ConsistencyError::NotInitialized.into());
        }
        check_particle(p, self.class_of.len())?;
        let class = self.class_of[p];
        let mut neighs = Vec::new();
        for sub in self.sublists.iter().filter(|s| s.involves(class)) {
            neighs.extend_from_slice(&sub.neighs[p]);
        }
        Ok(neighs)
    }
}
