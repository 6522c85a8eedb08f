//! Sequential, year-grouped identifier assignment.
//!
//! Pure and deterministic: the same catalog always produces the same order and
//! the same identifiers, which is what lets an interrupted run be resumed.

use crate::reorg::artwork::Artwork;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Sort key for artworks without a usable year; larger than any real year.
const UNKNOWN_YEAR_SORT: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdChange {
    pub old_id: Option<String>,
    pub new_id: String,
}

impl IdChange {
    pub fn is_rename(&self) -> bool {
        self.old_id.as_deref() != Some(self.new_id.as_str())
    }
}

/// Old → new identifier association for one run, one entry per artwork, in
/// the same order as the reordered catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    entries: Vec<IdChange>,
}

impl IdMapping {
    pub fn entries(&self) -> &[IdChange] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn old_id_for(&self, new_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.new_id == new_id)
            .and_then(|entry| entry.old_id.as_deref())
    }

    pub fn renames(&self) -> impl Iterator<Item = &IdChange> {
        self.entries.iter().filter(|entry| entry.is_rename())
    }

    /// Old identifiers that some *other* artwork now uses as its new id.
    /// Their assets can be overwritten before their own artwork is reconciled.
    pub fn contested_old_ids(&self) -> BTreeSet<String> {
        let new_ids: BTreeSet<&str> = self.entries.iter().map(|e| e.new_id.as_str()).collect();
        self.entries
            .iter()
            .filter(|entry| entry.is_rename())
            .filter_map(|entry| entry.old_id.as_deref())
            .filter(|old| new_ids.contains(old))
            .map(ToOwned::to_owned)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct IdAssignment {
    pub artworks: Vec<Artwork>,
    pub mapping: IdMapping,
}

pub fn format_id(year_token: &str, sequence: usize) -> String {
    format!("{year_token}_{sequence:03}")
}

/// Case-insensitive title order. Titles that differ only in case put the
/// lowercase spelling first, so "apple" < "Apple" < "Banana".
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| b.cmp(a))
}

pub fn assign_sequential_ids(artworks: Vec<Artwork>) -> IdAssignment {
    let mut sorted = artworks;
    // `sort_by` is stable, so identical (year, title) pairs keep input order.
    sorted.sort_by(|a, b| {
        let year_a = a.parsed_year().unwrap_or(UNKNOWN_YEAR_SORT);
        let year_b = b.parsed_year().unwrap_or(UNKNOWN_YEAR_SORT);
        year_a
            .cmp(&year_b)
            .then_with(|| compare_titles(&a.title, &b.title))
    });

    let mut groups: BTreeMap<String, Vec<Artwork>> = BTreeMap::new();
    for artwork in sorted {
        groups.entry(artwork.year_token()).or_default().push(artwork);
    }

    let mut reordered = Vec::new();
    let mut entries = Vec::new();
    for (token, group) in groups {
        tracing::debug!(year = %token, count = group.len(), "assigning ids for year group");
        for (index, mut artwork) in group.into_iter().enumerate() {
            let new_id = format_id(&token, index + 1);
            let old_id = artwork.old_id().map(ToOwned::to_owned);
            if old_id.as_deref() != Some(new_id.as_str()) {
                tracing::debug!(
                    old = old_id.as_deref().unwrap_or("<none>"),
                    new = %new_id,
                    title = %artwork.title,
                    "id change"
                );
            }
            entries.push(IdChange {
                old_id,
                new_id: new_id.clone(),
            });
            artwork.id = new_id;
            reordered.push(artwork);
        }
    }

    IdAssignment {
        artworks: reordered,
        mapping: IdMapping { entries },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorg::artwork::split_id;
    use std::collections::BTreeMap;

    fn art(id: &str, year: &str, title: &str) -> Artwork {
        Artwork::new(id, title, Some(year))
    }

    fn ids(assignment: &IdAssignment) -> Vec<String> {
        assignment.artworks.iter().map(|a| a.id.clone()).collect()
    }

    #[test]
    fn sorts_by_year_then_title() {
        let out = assign_sequential_ids(vec![
            art("old1", "2022", "B"),
            art("old2", "2022", "A"),
            art("old3", "2020", "Z"),
        ]);
        assert_eq!(ids(&out), vec!["2020_001", "2022_001", "2022_002"]);
        let mapping = &out.mapping;
        assert_eq!(mapping.old_id_for("2020_001"), Some("old3"));
        assert_eq!(mapping.old_id_for("2022_001"), Some("old2"));
        assert_eq!(mapping.old_id_for("2022_002"), Some("old1"));
    }

    #[test]
    fn titles_sort_case_insensitively() {
        let out = assign_sequential_ids(vec![
            art("b", "2020", "Banana"),
            art("a", "2020", "apple"),
            art("c", "2020", "cherry"),
            art("A", "2020", "Apple"),
        ]);
        let titles: Vec<&str> = out.artworks.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["apple", "Apple", "Banana", "cherry"]);
        assert_eq!(out.mapping.old_id_for("2020_001"), Some("a"));
        assert_eq!(compare_titles("Same", "Same"), Ordering::Equal);
    }

    #[test]
    fn empty_year_becomes_unknown() {
        let out = assign_sequential_ids(vec![art("x", "", "Lonely")]);
        assert_eq!(ids(&out), vec!["unknown_001"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let out = assign_sequential_ids(vec![
            art("X", "2021", "Same"),
            art("Y", "2021", "Same"),
        ]);
        assert_eq!(out.mapping.old_id_for("2021_001"), Some("X"));
        assert_eq!(out.mapping.old_id_for("2021_002"), Some("Y"));
    }

    #[test]
    fn unknown_group_comes_last_and_sub_versions_group_apart() {
        let out = assign_sequential_ids(vec![
            art("a", "circa 1990", "Old"),
            art("b", "2022.8", "Autumn"),
            art("c", "2022", "Spring"),
            art("d", "2023", "Winter"),
        ]);
        assert_eq!(
            ids(&out),
            vec!["2022_001", "2022.8_001", "2023_001", "unknown_001"]
        );
    }

    #[test]
    fn unchanged_ids_are_still_mapped() {
        let out = assign_sequential_ids(vec![art("2020_001", "2020", "A")]);
        assert_eq!(out.mapping.len(), 1);
        assert!(!out.mapping.entries()[0].is_rename());
        assert_eq!(out.mapping.renames().count(), 0);
    }

    #[test]
    fn missing_old_id_maps_from_none() {
        let out = assign_sequential_ids(vec![art("  ", "2020", "A")]);
        assert_eq!(out.mapping.entries()[0].old_id, None);
        assert!(out.mapping.entries()[0].is_rename());
    }

    #[test]
    fn swapped_ids_are_contested() {
        let out = assign_sequential_ids(vec![
            art("2020_002", "2020", "A"),
            art("2020_001", "2020", "B"),
            art("2020_003", "2020", "C"),
        ]);
        let contested = out.mapping.contested_old_ids();
        assert!(contested.contains("2020_001"));
        assert!(contested.contains("2020_002"));
        assert!(!contested.contains("2020_003"));
    }

    fn messy_catalog() -> Vec<Artwork> {
        let years = ["2019", "2020", "", "2020", "2021.5", "abc", "2019", "2021"];
        let titles = ["Plum", "Bamboo", "Crane", "Bamboo", "Lotus", "", "Orchid", "Pine"];
        (0..40)
            .map(|i| {
                art(
                    &format!("legacy_{}", i % 7),
                    years[i % years.len()],
                    titles[(i * 3) % titles.len()],
                )
            })
            .collect()
    }

    #[test]
    fn every_year_group_is_gapless_and_ids_are_unique() {
        let out = assign_sequential_ids(messy_catalog());
        assert_eq!(out.artworks.len(), 40);

        let mut per_token: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for artwork in &out.artworks {
            let (token, seq) = split_id(&artwork.id).expect("canonical id");
            per_token.entry(token.to_string()).or_default().push(seq);
        }
        for (token, mut seqs) in per_token {
            seqs.sort_unstable();
            let expected: Vec<u32> = (1..=seqs.len() as u32).collect();
            assert_eq!(seqs, expected, "gap or duplicate in {token}");
        }

        let unique: BTreeSet<&str> = out.artworks.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(unique.len(), out.artworks.len());
    }

    #[test]
    fn assignment_is_deterministic() {
        let first = assign_sequential_ids(messy_catalog());
        let second = assign_sequential_ids(messy_catalog());
        assert_eq!(first.artworks, second.artworks);
        assert_eq!(first.mapping, second.mapping);
    }
}
