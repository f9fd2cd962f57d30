//! Bundled reference substance data.
//!
//! The catalog is parsed once per process from `data/substances.json` and is read-only after
//! that. Lookups are by canonical name, case-insensitive.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::models::{AdministrationRoute, Roa};

/// Category tag marking substances that are surfaced ahead of the rest in search results.
pub const COMMON_CATEGORY: &str = "common";

const BUNDLED_SUBSTANCES: &str = include_str!("../data/substances.json");

static BUNDLED: LazyLock<SubstanceCatalog> =
    LazyLock::new(|| SubstanceCatalog::from_json(BUNDLED_SUBSTANCES));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Substance {
    pub name: String,
    #[serde(default)]
    pub common_names: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub roas: Vec<Roa>,
}

impl Substance {
    #[must_use]
    pub fn roa(&self, route: AdministrationRoute) -> Option<&Roa> {
        self.roas.iter().find(|r| r.route == route)
    }

    #[must_use]
    pub fn has_category(&self, category: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
    }
}

#[derive(Debug, Default)]
pub struct SubstanceCatalog {
    substances: Vec<Substance>,
    by_name: HashMap<String, usize>,
}

impl SubstanceCatalog {
    /// The catalog shipped with the library.
    #[must_use]
    pub fn bundled() -> &'static SubstanceCatalog {
        &BUNDLED
    }

    /// Parse a catalog from a JSON array of substances. Malformed data yields an empty catalog.
    #[must_use]
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<Vec<Substance>>(json) {
            Ok(substances) => Self::new(substances),
            Err(e) => {
                tracing::error!(error = %e, "failed to parse substance catalog");
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn new(substances: Vec<Substance>) -> Self {
        let by_name = substances
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.to_lowercase(), i))
            .collect();
        Self {
            substances,
            by_name,
        }
    }

    #[must_use]
    pub fn all(&self) -> &[Substance] {
        &self.substances
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Substance> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&i| &self.substances[i])
    }

    /// All distinct categories, sorted.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut cats: Vec<String> = self
            .substances
            .iter()
            .flat_map(|s| s.categories.iter().cloned())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.substances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.substances.is_empty()
    }
}
