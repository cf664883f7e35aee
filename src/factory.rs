use crate::config::ListSettings;
use crate::error::{ConfigurationError, Result};
use crate::list::{ListPtr, check_skin};
use crate::lists::{BinVerletList, CellList, NoList, RodCells, VerletList};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::info;

/// Strategy selected by the `list_type` setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ListType {
    No,
    #[default]
    Verlet,
    BinVerlet,
    Cells,
    RodCells,
}

impl ListType {
    pub const ALL: [ListType; 5] = [
        ListType::No,
        ListType::Verlet,
        ListType::BinVerlet,
        ListType::Cells,
        ListType::RodCells,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ListType::No => "no",
            ListType::Verlet => "verlet",
            ListType::BinVerlet => "bin_verlet",
            ListType::Cells => "cells",
            ListType::RodCells => "rodcells",
        }
    }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ListType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ConfigurationError::InvalidList(s.to_string()))
    }
}

/// Builds the strategy named by `settings`. The list still has to be
/// initialized against the particles and the box.
pub fn make_list(settings: &ListSettings) -> Result<ListPtr> {
    let list: ListPtr = match settings.list_type {
        ListType::No => Rc::new(RefCell::new(NoList::new())),
        ListType::Cells => Rc::new(RefCell::new(CellList::new())),
        ListType::Verlet => {
            check_skin(settings.verlet_skin)?;
            Rc::new(RefCell::new(VerletList::new(settings.verlet_skin)))
        }
        ListType::BinVerlet => {
            check_skin(settings.verlet_skin)?;
            Rc::new(RefCell::new(BinVerletList::new(
                settings.verlet_skin,
                settings.bin_verlet_radii.clone(),
            )))
        }
        ListType::RodCells => {
            if !settings.rod_length.is_finite() || settings.rod_length < 0.0 {
                return Err(ConfigurationError::InvalidRodLength(settings.rod_length).into());
            }
            if settings.rodcells_max_cells == 0 {
                return Err(ConfigurationError::InvalidValue {
                    key: "rodcells_max_cells".to_string(),
                    value: "0".to_string(),
                }
                .into());
            }
            Rc::new(RefCell::new(RodCells::new(
                settings.rod_length,
                settings.rodcells_max_cells,
            )))
        }
    };
    info!(
        list_type = %settings.list_type,
        verlet_skin = settings.verlet_skin,
        "neighbor list selected"
    );
    Ok(list)
}

/// [`make_list`] straight from `key = value` pairs.
pub fn make_list_from_pairs<'a, I>(pairs: I) -> Result<ListPtr>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    make_list(&ListSettings::from_pairs(pairs)?)
}
