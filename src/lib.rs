//! Neighbor-list strategies for Monte Carlo particle simulations.
//!
//! A strategy is picked once per run from [`ListSettings`] through
//! [`make_list`], initialized against a [`ParticleStore`] and a [`SimBox`],
//! and then kept in sync with single-particle moves and box changes. Every
//! strategy returns candidate supersets; callers filter by exact distance.

pub mod config;
pub mod error;
pub mod factory;
pub mod grid;
pub mod list;
pub mod lists;
pub mod pairs;
pub mod particles;
pub mod simbox;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

pub use config::{ListSettings, get_parallel_threshold, set_parallel_threshold};
pub use error::{ConfigurationError, ConsistencyError, ListError, Result};
pub use factory::{ListType, make_list, make_list_from_pairs};
pub use list::{ListPtr, NeighborList};
pub use lists::{BinVerletList, CellList, NoList, RodCells, VerletList};
pub use particles::{Particle, ParticleStore};
pub use simbox::SimBox;

use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber. `RUST_LOG` wins over `level`, which
/// falls back to `info`. Does nothing if a subscriber is already set.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_thread_ids(true)
        .try_init();
}
