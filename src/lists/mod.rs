pub mod bin_verlet;
pub mod cells;
pub mod no_list;
pub mod rod_cells;
pub mod tracker;
pub mod verlet;

pub use bin_verlet::BinVerletList;
pub use cells::CellList;
pub use no_list::NoList;
pub use rod_cells::{RodCells, rod_distance_sq};
pub use tracker::DisplacementTracker;
pub use verlet::VerletList;
