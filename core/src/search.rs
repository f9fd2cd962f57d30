//! Substance search: category filtering, prefix/substring ranking, and recency re-ranking.
//!
//! Works over anything implementing [`Searchable`], so catalog substances and custom
//! substances go through the same pipeline.

use std::collections::HashSet;

use serde::Serialize;

use crate::catalog::{COMMON_CATEGORY, Substance};
use crate::models::CustomSubstance;

pub trait Searchable {
    fn canonical_name(&self) -> &str;
    fn common_names(&self) -> &[String];
    fn categories(&self) -> &[String];

    fn is_common(&self) -> bool {
        self.categories()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(COMMON_CATEGORY))
    }
}

impl Searchable for Substance {
    fn canonical_name(&self) -> &str {
        &self.name
    }

    fn common_names(&self) -> &[String] {
        &self.common_names
    }

    fn categories(&self) -> &[String] {
        &self.categories
    }
}

impl Searchable for CustomSubstance {
    fn canonical_name(&self) -> &str {
        &self.name
    }

    fn common_names(&self) -> &[String] {
        &[]
    }

    fn categories(&self) -> &[String] {
        &[]
    }
}

/// A search candidate from either source.
#[derive(Debug, Clone, Copy)]
pub enum SearchHit<'a> {
    Reference(&'a Substance),
    Custom(&'a CustomSubstance),
}

impl Searchable for SearchHit<'_> {
    fn canonical_name(&self) -> &str {
        match self {
            Self::Reference(s) => s.canonical_name(),
            Self::Custom(c) => c.canonical_name(),
        }
    }

    fn common_names(&self) -> &[String] {
        match self {
            Self::Reference(s) => s.common_names(),
            Self::Custom(c) => c.common_names(),
        }
    }

    fn categories(&self) -> &[String] {
        match self {
            Self::Reference(s) => s.categories(),
            Self::Custom(c) => c.categories(),
        }
    }
}

/// Owned search result, handed to callers once ranking is done.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SearchResult {
    Reference(Substance),
    Custom(CustomSubstance),
}

impl SearchResult {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Reference(s) => &s.name,
            Self::Custom(c) => &c.name,
        }
    }
}

impl From<SearchHit<'_>> for SearchResult {
    fn from(hit: SearchHit<'_>) -> Self {
        match hit {
            SearchHit::Reference(s) => Self::Reference(s.clone()),
            SearchHit::Custom(c) => Self::Custom(c.clone()),
        }
    }
}

/// Strip hyphens and whitespace and lowercase, so "3-MMC", "3 mmc" and "3mmc" compare equal.
#[must_use]
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Keep candidates that carry every required category.
pub fn filter_by_categories<'a, T: Searchable>(
    candidates: &'a [T],
    required: &[String],
) -> Vec<&'a T> {
    candidates
        .iter()
        .filter(|c| {
            required.iter().all(|req| {
                c.categories()
                    .iter()
                    .any(|cat| cat.eq_ignore_ascii_case(req))
            })
        })
        .collect()
}

fn dedup_by_name<'a, T: Searchable>(items: impl IntoIterator<Item = &'a T>) -> Vec<&'a T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.canonical_name().to_lowercase()))
        .collect()
}

fn all_names<T: Searchable>(item: &T) -> impl Iterator<Item = &str> {
    std::iter::once(item.canonical_name()).chain(item.common_names().iter().map(String::as_str))
}

/// Match `query` against already-filtered candidates: canonical-name prefix matches first,
/// then any-name prefix matches, then any-name substring matches. Deduplicated.
pub fn match_query<'a, T: Searchable>(filtered: &[&'a T], query: &str) -> Vec<&'a T> {
    let q = normalize(query);
    if q.is_empty() {
        return filtered.to_vec();
    }

    let name_prefix = filtered
        .iter()
        .filter(|c| normalize(c.canonical_name()).starts_with(&q));
    let alias_prefix = filtered
        .iter()
        .filter(|c| all_names(**c).any(|n| normalize(n).starts_with(&q)));
    let alias_contains = filtered
        .iter()
        .filter(|c| all_names(**c).any(|n| normalize(n).contains(&q)));

    dedup_by_name(
        name_prefix
            .chain(alias_prefix)
            .chain(alias_contains)
            .copied(),
    )
}

/// Move recently used substances (in recency order) to the front, then `common` ones.
pub fn prioritize<'a, T: Searchable>(results: &[&'a T], recently_used: &[String]) -> Vec<&'a T> {
    let mut seen_recent = HashSet::new();
    let recent: Vec<&String> = recently_used
        .iter()
        .filter(|name| seen_recent.insert(name.to_lowercase()))
        .collect();

    let recent_hits = recent.iter().filter_map(|name| {
        results
            .iter()
            .find(|r| r.canonical_name().eq_ignore_ascii_case(name))
            .copied()
    });
    let common_hits = results.iter().filter(|r| r.is_common()).copied();

    dedup_by_name(
        recent_hits
            .chain(common_hits)
            .chain(results.iter().copied())
            .collect::<Vec<_>>(),
    )
}

/// Full search pipeline: category filter, query ranking, recency/common re-ranking.
pub fn search_substances<'a, T: Searchable>(
    candidates: &'a [T],
    query: &str,
    required_categories: &[String],
    recently_used: &[String],
) -> Vec<&'a T> {
    let filtered = filter_by_categories(candidates, required_categories);
    let matched = match_query(&filtered, query);
    prioritize(&matched, recently_used)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substance(name: &str, common: &[&str], categories: &[&str]) -> Substance {
        Substance {
            name: name.to_string(),
            common_names: common.iter().map(ToString::to_string).collect(),
            url: None,
            categories: categories.iter().map(ToString::to_string).collect(),
            summary: None,
            roas: vec![],
        }
    }

    fn names<T: Searchable>(items: &[&T]) -> Vec<String> {
        items.iter().map(|i| i.canonical_name().to_string()).collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn dataset() -> Vec<Substance> {
        vec![
            substance("3-MDMA-analog", &["3-MDMA-analog"], &["stimulant"]),
            substance("MDMA", &["Ecstasy", "Molly"], &["entactogen", "stimulant", "common"]),
            substance("MDA", &["Sass"], &["entactogen", "psychedelic"]),
            substance("Caffeine", &["Coffee"], &["stimulant", "common"]),
            substance("LSD", &["Acid"], &["psychedelic", "common"]),
            substance("Methylone", &["bk-MDMA"], &["entactogen", "stimulant"]),
        ]
    }

    #[test]
    fn test_category_filter_is_superset() {
        let data = dataset();
        let required = strings(&["entactogen", "stimulant"]);
        let filtered = filter_by_categories(&data, &required);
        assert_eq!(names(&filtered), vec!["MDMA", "Methylone"]);
        for s in &filtered {
            for req in &required {
                assert!(s.categories.contains(req));
            }
        }
    }

    #[test]
    fn test_category_filter_case_insensitive() {
        let data = dataset();
        let filtered = filter_by_categories(&data, &strings(&["PSYCHEDELIC"]));
        assert_eq!(names(&filtered), vec!["MDA", "LSD"]);
    }

    #[test]
    fn test_empty_query_keeps_filtered_order() {
        let data = dataset();
        let result = search_substances(&data, "", &strings(&["psychedelic"]), &[]);
        // LSD is common, MDA is not
        assert_eq!(names(&result), vec!["LSD", "MDA"]);

        let filtered = filter_by_categories(&data, &strings(&["psychedelic"]));
        let matched = match_query(&filtered, "   ");
        assert_eq!(names(&matched), vec!["MDA", "LSD"]);
    }

    #[test]
    fn test_prefix_ranks_before_substring() {
        let data = dataset();
        let filtered = filter_by_categories(&data, &[]);
        let matched = match_query(&filtered, "mdma");
        let got = names(&matched);
        let mdma = got.iter().position(|n| n == "MDMA").unwrap();
        let analog = got.iter().position(|n| n == "3-MDMA-analog").unwrap();
        assert!(mdma < analog);
        // Methylone only matches through its "bk-MDMA" alias after normalization
        assert!(got.contains(&"Methylone".to_string()));
    }

    #[test]
    fn test_canonical_prefix_before_alias_prefix() {
        let data = vec![
            substance("Molybdenum", &[], &[]),
            substance("MDMA", &["Molly"], &[]),
            substance("Mollusc", &[], &[]),
        ];
        let all = filter_by_categories(&data, &[]);
        let matched = match_query(&all, "mol");
        assert_eq!(names(&matched), vec!["Molybdenum", "Mollusc", "MDMA"]);
    }

    #[test]
    fn test_normalization_ignores_hyphens_spaces_case() {
        assert_eq!(normalize("3-MMC"), "3mmc");
        assert_eq!(normalize(" Psilocybin mushrooms "), "psilocybinmushrooms");
        let data = vec![substance("2C-B", &["Nexus"], &[])];
        let all = filter_by_categories(&data, &[]);
        assert_eq!(names(&match_query(&all, "2c b")), vec!["2C-B"]);
        assert_eq!(names(&match_query(&all, "2CB")), vec!["2C-B"]);
    }

    #[test]
    fn test_results_are_deduplicated() {
        let data = dataset();
        let recents = strings(&["MDMA", "mdma", "Methylone"]);
        let result = search_substances(&data, "m", &[], &recents);
        let mut got = names(&result);
        let len = got.len();
        got.sort();
        got.dedup();
        assert_eq!(got.len(), len);
    }

    #[test]
    fn test_recents_then_common_then_rest() {
        let data = dataset();
        let recents = strings(&["Methylone", "Unknown", "MDA", "Methylone"]);
        let result = search_substances(&data, "", &[], &recents);
        assert_eq!(
            names(&result),
            vec![
                "Methylone",
                "MDA",
                "MDMA",
                "Caffeine",
                "LSD",
                "3-MDMA-analog"
            ]
        );
    }

    #[test]
    fn test_recents_outside_filter_are_ignored() {
        let data = dataset();
        let recents = strings(&["Caffeine"]);
        let result = search_substances(&data, "", &strings(&["psychedelic"]), &recents);
        assert_eq!(names(&result), vec!["LSD", "MDA"]);
    }

    #[test]
    fn test_no_match_returns_empty() {
        let data = dataset();
        assert!(search_substances(&data, "zzz", &[], &[]).is_empty());
        assert!(search_substances(&data, "", &strings(&["opioid"]), &[]).is_empty());
    }

    #[test]
    fn test_custom_substances_excluded_by_category_filter() {
        let catalog = dataset();
        let custom = CustomSubstance {
            id: 1,
            name: "Homebrew".to_string(),
            units: "mg".to_string(),
            description: String::new(),
            roas: vec![],
        };
        let mut hits: Vec<SearchHit> = catalog.iter().map(SearchHit::Reference).collect();
        hits.push(SearchHit::Custom(&custom));

        let result = search_substances(&hits, "home", &[], &[]);
        assert_eq!(names(&result), vec!["Homebrew"]);

        let result = search_substances(&hits, "home", &strings(&["stimulant"]), &[]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_custom_duplicate_of_reference_is_dropped() {
        let catalog = dataset();
        let custom = CustomSubstance {
            id: 7,
            name: "mdma".to_string(),
            units: "mg".to_string(),
            description: String::new(),
            roas: vec![],
        };
        let mut hits: Vec<SearchHit> = catalog.iter().map(SearchHit::Reference).collect();
        hits.push(SearchHit::Custom(&custom));

        let result = search_substances(&hits, "mdma", &[], &[]);
        let matches: Vec<&&SearchHit> = result
            .iter()
            .filter(|h| h.canonical_name().eq_ignore_ascii_case("mdma"))
            .collect();
        assert_eq!(matches.len(), 1);
        assert!(matches!(matches[0], SearchHit::Reference(_)));
    }
}
