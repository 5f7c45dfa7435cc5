//! Deterministic artifact filenames
//!
//! Pattern: `Surname_Year_Title.pdf`, where the surname is the last word of
//! the first author, the year falls back to `Unknown` and the title is cut
//! to 50 characters before sanitizing. When that name is already taken by
//! another record, `_` and the first 8 characters of the record id are added.

use crate::state::Record;

const EXTENSION: &str = ".pdf";
const TITLE_CHARS: usize = 50;
const ID_SUFFIX_CHARS: usize = 8;

/// Builds the local filename for a record's artifact
///
/// # Arguments
///
/// * `record` - The record the artifact belongs to
/// * `max_length` - Maximum length in characters, extension included
pub fn artifact_filename(record: &Record, max_length: usize) -> String {
    build_filename(record, max_length, None)
}

/// Like [`artifact_filename`], with `_` and the first characters of the record
/// id appended to the stem
///
/// Used when the plain name already belongs to a different record. The
/// suffix always survives truncation; the descriptive part is cut instead.
pub fn disambiguated_filename(record: &Record, max_length: usize) -> String {
    let suffix: String = record.id.chars().take(ID_SUFFIX_CHARS).collect();
    build_filename(record, max_length, Some(&suffix))
}

fn build_filename(record: &Record, max_length: usize, suffix: Option<&str>) -> String {
    let author = record
        .authors
        .first()
        .and_then(|a| a.split_whitespace().last())
        .unwrap_or("Unknown");

    let year = record
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    let title: String = record.title.chars().take(TITLE_CHARS).collect();

    let mut stem = sanitize_filename(&format!("{}_{}_{}", author, year, title));

    let reserved = EXTENSION.len() + suffix.map_or(0, |s| s.chars().count() + 1);
    let stem_budget = max_length.saturating_sub(reserved).max(1);
    if stem.chars().count() > stem_budget {
        stem = stem.chars().take(stem_budget).collect();
        stem = stem.trim_end_matches(['.', '_']).to_string();
    }

    match suffix {
        Some(suffix) if stem.is_empty() => stem = suffix.to_string(),
        Some(suffix) => stem = format!("{}_{}", stem, suffix),
        None if stem.is_empty() => stem = record.id.clone(),
        None => {}
    }

    format!("{}{}", stem, EXTENSION)
}

/// Strips characters that are illegal in filenames and collapses whitespace
///
/// `<>:"/\|?*` and control characters are dropped, whitespace runs become a
/// single `_`, repeated underscores collapse, and leading or trailing dots
/// and underscores are trimmed.
pub fn sanitize_filename(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;

    for ch in value.chars() {
        let is_separator = ch.is_whitespace() || ch == '_';
        let is_illegal =
            matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || ch.is_control();
        if !is_separator && is_illegal {
            continue;
        }

        if is_separator {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(ch);
            prev_sep = false;
        }
    }

    out.trim_matches(['.', '_']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CandidateRecord;

    fn record(title: &str, authors: &[&str], year: Option<i32>) -> Record {
        Record::from_candidate(CandidateRecord {
            title: title.to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            year,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_standard_filename() {
        let r = record("Deep Learning on Graphs", &["J Smith", "A Jones"], Some(2019));
        assert_eq!(artifact_filename(&r, 100), "Smith_2019_Deep_Learning_on_Graphs.pdf");
    }

    #[test]
    fn test_missing_author_and_year() {
        let r = record("Untitled Work", &[], None);
        assert_eq!(artifact_filename(&r, 100), "Unknown_Unknown_Untitled_Work.pdf");
    }

    #[test]
    fn test_illegal_characters_removed() {
        let r = record("What? A: \"Study\" of <x>/y*z", &["B Lee"], Some(2020));
        let name = artifact_filename(&r, 100);
        assert_eq!(name, "Lee_2020_What_A_Study_of_xyz.pdf");
    }

    #[test]
    fn test_title_cut_to_fifty_chars() {
        let long = "a".repeat(80);
        let r = record(&long, &["C Doe"], Some(2001));
        let name = artifact_filename(&r, 200);
        assert_eq!(name, format!("Doe_2001_{}.pdf", "a".repeat(50)));
    }

    #[test]
    fn test_max_length_includes_extension() {
        let r = record("A fairly long title about many things", &["D Roe"], Some(1999));
        let name = artifact_filename(&r, 20);
        assert_eq!(name.chars().count(), 20);
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_deterministic() {
        let r = record("Same Title", &["E Poe"], Some(2010));
        assert_eq!(artifact_filename(&r, 100), artifact_filename(&r, 100));
    }

    #[test]
    fn test_disambiguated_name_carries_id_prefix() {
        let r = record("Deep Learning on Graphs", &["J Smith"], Some(2019));
        let name = disambiguated_filename(&r, 100);
        assert_eq!(
            name,
            format!("Smith_2019_Deep_Learning_on_Graphs_{}.pdf", &r.id[..8])
        );
        assert_ne!(name, artifact_filename(&r, 100));
    }

    #[test]
    fn test_disambiguated_name_respects_max_length() {
        let r = record("A fairly long title about many things", &["D Roe"], Some(1999));
        let name = disambiguated_filename(&r, 25);
        assert_eq!(name.chars().count(), 25);
        assert!(name.ends_with(&format!("_{}.pdf", &r.id[..8])));
    }

    #[test]
    fn test_shared_title_prefix_gets_distinct_disambiguated_names() {
        let prefix = "b".repeat(60);
        let first = record(&format!("{} part one", prefix), &["F Wu"], Some(2015));
        let second = record(&format!("{} part two", prefix), &["F Wu"], Some(2015));

        assert_eq!(artifact_filename(&first, 100), artifact_filename(&second, 100));
        assert_ne!(
            disambiguated_filename(&first, 100),
            disambiguated_filename(&second, 100)
        );
    }

    #[test]
    fn test_sanitize_collapses_separators() {
        assert_eq!(sanitize_filename("  a   b__c\t\nd  "), "a_b_c_d");
        assert_eq!(sanitize_filename("..hidden_"), "hidden");
    }
}
