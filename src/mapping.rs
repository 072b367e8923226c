//! Field auto-mapping
//!
//! Suggests source → destination column pairs by name similarity. Names are normalized
//! (lowercase, alphanumerics only) and scored with Jaro-Winkler; identical normalized names
//! always score 1.0. Pairs are then taken greedily from the highest score down, so every
//! source and every destination column is used at most once.

use std::collections::HashSet;

use strsim::jaro_winkler;

use crate::models::sync::FieldMapping;

pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Lowercase and drop everything that is not a letter or digit.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Similarity of two column names in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize(a), normalize(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    jaro_winkler(&a, &b)
}

/// Map each source column to its best remaining destination column scoring at least
/// `threshold`. Output follows source column order.
pub fn auto_map<S, D>(
    source_columns: &[S],
    destination_columns: &[D],
    threshold: f64,
) -> Vec<FieldMapping>
where
    S: AsRef<str>,
    D: AsRef<str>,
{
    let mut candidates = Vec::new();
    for (si, source) in source_columns.iter().enumerate() {
        for (di, destination) in destination_columns.iter().enumerate() {
            let score = similarity(source.as_ref(), destination.as_ref());
            if score >= threshold {
                candidates.push((score, si, di));
            }
        }
    }

    // Highest score first; ties keep column order so results are deterministic
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut used_sources = HashSet::new();
    let mut used_destinations = HashSet::new();
    let mut assigned = Vec::new();
    for (score, si, di) in candidates {
        if used_sources.contains(&si) || used_destinations.contains(&di) {
            continue;
        }
        used_sources.insert(si);
        used_destinations.insert(di);
        assigned.push((si, di, score));
    }

    assigned.sort_by_key(|(si, _, _)| *si);
    assigned
        .into_iter()
        .map(|(si, di, score)| FieldMapping {
            source: source_columns[si].as_ref().to_string(),
            destination: destination_columns[di].as_ref().to_string(),
            score: Some((score * 1000.0).round() / 1000.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_case_and_punctuation() {
        assert_eq!(normalize("First Name"), "firstname");
        assert_eq!(normalize("first_name"), "firstname");
        assert_eq!(normalize("E-Mail!"), "email");
    }

    #[test]
    fn exact_normalized_match_scores_one() {
        assert_eq!(similarity("Created At", "created_at"), 1.0);
        assert_eq!(similarity("", "name"), 0.0);
        assert!(similarity("email", "phone") < DEFAULT_THRESHOLD);
    }

    #[test]
    fn each_destination_is_used_once() {
        let source = ["Email", "E-mail", "Name"];
        let destination = ["email", "full_name"];

        let mappings = auto_map(&source, &destination, DEFAULT_THRESHOLD);

        let destinations: Vec<_> = mappings.iter().map(|m| m.destination.as_str()).collect();
        assert_eq!(destinations.iter().filter(|d| **d == "email").count(), 1);
        assert_eq!(mappings[0].source, "Email");
        assert_eq!(mappings[0].score, Some(1.0));
    }

    #[test]
    fn below_threshold_is_left_unmapped() {
        let mappings = auto_map(&["Status"], &["priority"], DEFAULT_THRESHOLD);
        assert!(mappings.is_empty());
    }

    #[test]
    fn close_names_are_paired() {
        let mappings = auto_map(
            &["customer_name", "phone"],
            &["CustomerName", "phone_number"],
            0.8,
        );

        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].destination, "CustomerName");
        assert_eq!(mappings[1].destination, "phone_number");
        assert!(mappings[1].score.unwrap() < 1.0);
    }
}
