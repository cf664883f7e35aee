use crate::error::{ConfigurationError, Result};
use crate::factory::ListType;
use std::sync::atomic::{AtomicUsize, Ordering};

// Default heuristic value for this machine.
const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

pub const DEFAULT_VERLET_SKIN: f64 = 0.2;
pub const DEFAULT_ROD_LENGTH: f64 = 1.0;
pub const DEFAULT_RODCELLS_MAX_CELLS: usize = 128;

static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);

/// Particle count from which a full rebuild computes cell coordinates in parallel.
pub fn get_parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

pub fn set_parallel_threshold(val: usize) {
    PARALLEL_THRESHOLD.store(val, Ordering::Relaxed);
}

/// Settings consumed by [`crate::factory::make_list`].
#[derive(Clone, Debug, PartialEq)]
pub struct ListSettings {
    pub list_type: ListType,
    /// Extra margin of the Verlet variants. A tuning knob, not a correctness contract.
    pub verlet_skin: f64,
    /// Interaction radius per size class. `None` gives every class `cutoff / 2`.
    pub bin_verlet_radii: Option<Vec<f64>>,
    pub rod_length: f64,
    pub rodcells_max_cells: usize,
}

impl Default for ListSettings {
    fn default() -> Self {
        Self {
            list_type: ListType::default(),
            verlet_skin: DEFAULT_VERLET_SKIN,
            bin_verlet_radii: None,
            rod_length: DEFAULT_ROD_LENGTH,
            rodcells_max_cells: DEFAULT_RODCELLS_MAX_CELLS,
        }
    }
}

impl ListSettings {
    /// Builds settings from `key = value` pairs. Keys that do not concern the
    /// lists are ignored so a whole simulation input can be passed through.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            let key = key.trim();
            let value = value.trim();
            match key {
                "list_type" => settings.list_type = value.parse()?,
                "verlet_skin" => settings.verlet_skin = parse_number(key, value)?,
                "bin_verlet_radii" => {
                    let radii = value
                        .split(',')
                        .map(|r| parse_number(key, r.trim()))
                        .collect::<Result<Vec<f64>>>()?;
                    settings.bin_verlet_radii = Some(radii);
                }
                "rod_length" => settings.rod_length = parse_number(key, value)?,
                "rodcells_max_cells" => {
                    settings.rodcells_max_cells = value.parse().map_err(|_| invalid(key, value))?
                }
                _ => {}
            }
        }
        Ok(settings)
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(key, value).into())
}

fn invalid(key: &str, value: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
