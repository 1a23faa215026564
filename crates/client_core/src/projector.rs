use std::{fmt, str::FromStr};

use shared::domain::Item;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterCriterion {
    #[default]
    All,
    Active,
    Completed,
}

impl FilterCriterion {
    pub fn matches(self, item: &Item) -> bool {
        match self {
            FilterCriterion::All => true,
            FilterCriterion::Active => !item.completed,
            FilterCriterion::Completed => item.completed,
        }
    }
}

impl fmt::Display for FilterCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterCriterion::All => "all",
            FilterCriterion::Active => "active",
            FilterCriterion::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown filter '{0}', expected all, active or completed")]
pub struct UnknownFilter(pub String);

impl FromStr for FilterCriterion {
    type Err = UnknownFilter;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FilterCriterion::All),
            "active" => Ok(FilterCriterion::Active),
            "completed" => Ok(FilterCriterion::Completed),
            _ => Err(UnknownFilter(raw.to_string())),
        }
    }
}

/// Items matching `criterion`, in collection order. `All` is a plain copy;
/// reloading from the store is `Engine::refresh`, never a side effect of viewing.
pub fn project(items: &[Item], criterion: FilterCriterion) -> Vec<Item> {
    items
        .iter()
        .filter(|item| criterion.matches(item))
        .cloned()
        .collect()
}
