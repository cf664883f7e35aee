use crate::particles::ParticleStore;
use crate::simbox::SimBox;
use nalgebra::Vector3;

/// Positions recorded at the last rebuild and the largest displacement seen
/// since. Valid while no particle has moved further than half the skin.
#[derive(Clone, Debug)]
pub struct DisplacementTracker {
    half_skin_sq: f64,
    last_positions: Vec<Vector3<f64>>,
    max_displacement_sq: f64,
}

impl DisplacementTracker {
    pub fn new(skin: f64) -> Self {
        Self {
            half_skin_sq: 0.25 * skin * skin,
            last_positions: Vec::new(),
            max_displacement_sq: 0.0,
        }
    }

    /// Snapshots every position and clears the accumulator.
    pub fn reset(&mut self, particles: &ParticleStore) {
        self.last_positions.clear();
        self.last_positions.extend(particles.iter().map(|p| p.pos));
        self.max_displacement_sq = 0.0;
    }

    /// Records the minimum-image displacement of `p` from its snapshot.
    pub fn record(&mut self, p: usize, simbox: &SimBox, pos: &Vector3<f64>) -> f64 {
        let d_sq = simbox.sqr_min_image_distance(&self.last_positions[p], pos);
        if d_sq > self.max_displacement_sq {
            self.max_displacement_sq = d_sq;
        }
        d_sq
    }

    /// Marks the stored candidates as unusable until the next `reset`.
    pub fn invalidate(&mut self) {
        self.max_displacement_sq = f64::INFINITY;
    }

    pub fn is_valid(&self) -> bool {
        self.max_displacement_sq <= self.half_skin_sq
    }

    pub fn max_displacement(&self) -> f64 {
        self.max_displacement_sq.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_half_skin_threshold() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let mut store = ParticleStore::from_positions(vec![Vector3::new(9.95, 5.0, 5.0)]);
        let mut tracker = DisplacementTracker::new(0.4);
        tracker.reset(&store);
        assert!(tracker.is_valid());

        // Crossing the periodic boundary counts as a short move.
        store.set_position(0, Vector3::new(0.1, 5.0, 5.0));
        tracker.record(0, &simbox, &store[0].pos);
        assert_relative_eq!(tracker.max_displacement(), 0.15, epsilon = 1e-9);
        assert!(tracker.is_valid());

        store.set_position(0, Vector3::new(0.2, 5.0, 5.0));
        tracker.record(0, &simbox, &store[0].pos);
        assert!(!tracker.is_valid());

        // Moving back does not restore validity before a rebuild.
        store.set_position(0, Vector3::new(9.95, 5.0, 5.0));
        tracker.record(0, &simbox, &store[0].pos);
        assert!(!tracker.is_valid());

        tracker.reset(&store);
        assert!(tracker.is_valid());
        assert_eq!(tracker.max_displacement(), 0.0);

        tracker.invalidate();
        assert!(!tracker.is_valid());
        tracker.reset(&store);
        assert!(tracker.is_valid());
    }
}
