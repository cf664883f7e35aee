use thiserror::Error;

/// Problems with how a list was configured. Fatal to the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Invalid list '{0}'")]
    InvalidList(String),

    #[error("Invalid value '{value}' for key '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("Box matrix is not invertible")]
    SingularBox,

    #[error("Cutoff must be positive and finite, got {0}")]
    InvalidCutoff(f64),

    #[error("Verlet skin must be positive and finite, got {0}")]
    InvalidSkin(f64),

    #[error("Rod length must be non-negative and finite, got {0}")]
    InvalidRodLength(f64),

    #[error(
        "Box is too small along axis {axis}: perpendicular width {width} is less than twice the interaction range {range}"
    )]
    BoxTooSmall { axis: usize, width: f64, range: f64 },

    #[error("No interaction radius configured for size class {class} ({n_classes} radii given)")]
    MissingClassRadius { class: usize, n_classes: usize },
}

/// Internal invariant violations. These indicate a logic bug and must abort
/// the current step rather than under-report neighbors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("The list has not been initialized")]
    NotInitialized,

    #[error("Particle index {index} out of range (total particles: {n_particles})")]
    UnknownParticle { index: usize, n_particles: usize },

    #[error("Particle count changed from {expected} to {found} since the list was initialized")]
    ParticleCountChanged { expected: usize, found: usize },

    #[error("Particle {index} is not assigned to any cell")]
    ParticleNotInCell { index: usize },

    #[error("Particle {index} is registered {count} times in the cell grid")]
    DuplicateParticle { index: usize, count: usize },

    #[error("Particle {index} is recorded in cell {recorded} but stored in cell {found}")]
    CellMismatch {
        index: usize,
        recorded: usize,
        found: usize,
    },

    #[error("Rod {index} spans {cells} cells, more than the {max} allowed")]
    RodCellOverflow {
        index: usize,
        cells: usize,
        max: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

impl ListError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, ListError::Configuration(_))
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, ListError::Consistency(_))
    }
}

pub type Result<T> = std::result::Result<T, ListError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_list_message() {
        let err: ListError = ConfigurationError::InvalidList("foo".to_string()).into();
        assert_eq!(err.to_string(), "Invalid list 'foo'");
        assert!(err.is_configuration());
        assert!(!err.is_consistency());
    }

    #[test]
    fn test_consistency_conversion() {
        let err: ListError = ConsistencyError::ParticleNotInCell { index: 3 }.into();
        assert!(err.is_consistency());
        assert_eq!(err.to_string(), "Particle 3 is not assigned to any cell");
    }
}
