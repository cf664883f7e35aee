use nalgebra::{Rotation3, Vector3};

/// One point or rigid-body particle.
#[derive(Clone, Debug)]
pub struct Particle {
    pub pos: Vector3<f64>,
    pub orientation: Rotation3<f64>,
    /// Size class used by the binned Verlet list.
    pub size_class: usize,
    bonded: Vec<usize>,
}

impl Particle {
    pub fn new(pos: Vector3<f64>) -> Self {
        Self {
            pos,
            orientation: Rotation3::identity(),
            size_class: 0,
            bonded: Vec::new(),
        }
    }

    pub fn with_orientation(mut self, orientation: Rotation3<f64>) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_size_class(mut self, size_class: usize) -> Self {
        self.size_class = size_class;
        self
    }

    /// Unit vector along the particle's long axis (the rotated z axis).
    pub fn axis(&self) -> Vector3<f64> {
        self.orientation * Vector3::z()
    }

    pub fn bonded(&self) -> &[usize] {
        &self.bonded
    }

    pub fn is_bonded(&self, other: usize) -> bool {
        self.bonded.contains(&other)
    }
}

/// Owner of all particles. Indices are stable for the store's lifetime.
#[derive(Clone, Debug, Default)]
pub struct ParticleStore {
    particles: Vec<Particle>,
}

impl ParticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: impl IntoIterator<Item = Vector3<f64>>) -> Self {
        Self {
            particles: positions.into_iter().map(Particle::new).collect(),
        }
    }

    pub fn push(&mut self, particle: Particle) -> usize {
        self.particles.push(particle);
        self.particles.len() - 1
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }

    pub fn position(&self, index: usize) -> Vector3<f64> {
        self.particles[index].pos
    }

    pub fn set_position(&mut self, index: usize, pos: Vector3<f64>) {
        self.particles[index].pos = pos;
    }

    pub fn set_orientation(&mut self, index: usize, orientation: Rotation3<f64>) {
        self.particles[index].orientation = orientation;
    }

    /// Records a bond between `i` and `j` on both particles.
    pub fn bond(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        if !self.particles[i].bonded.contains(&j) {
            self.particles[i].bonded.push(j);
        }
        if !self.particles[j].bonded.contains(&i) {
            self.particles[j].bonded.push(i);
        }
    }

    pub fn is_bonded(&self, i: usize, j: usize) -> bool {
        self.particles[i].is_bonded(j)
    }
}

impl std::ops::Index<usize> for ParticleStore {
    type Output = Particle;

    fn index(&self, index: usize) -> &Particle {
        &self.particles[index]
    }
}
