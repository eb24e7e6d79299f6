//! Column target resolution for delete-columns.
//!
//! A target list is resolved against one sheet's header all at once: either every target
//! resolves, or the caller gets one `ColumnNotFound` naming every target that did not.

use std::collections::HashSet;

use clap::ValueEnum;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::{ExcelMgrError, ExcelMgrResult};

/// How targets are compared to column headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
pub enum MatchMode {
    /// Header names, case-sensitive
    #[default]
    #[serde(rename = "names")]
    Names,
    /// Header names, ignoring case
    #[value(name = "ci")]
    #[serde(rename = "ci", alias = "case-insensitive")]
    CaseInsensitive,
    /// 1-based column positions
    #[serde(rename = "index")]
    Index,
}

/// How a name target is compared to a header (name modes only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameStrategy {
    #[default]
    Exact,
    Contains,
    #[value(name = "startswith")]
    StartsWith,
    #[value(name = "endswith")]
    EndsWith,
    /// Pattern search anywhere in the header
    Regex,
}

/// Check index targets up front: each must be a positive integer.
pub fn parse_index_targets(targets: &[String]) -> ExcelMgrResult<Vec<usize>> {
    targets
        .iter()
        .map(|raw| match raw.trim().parse::<i64>() {
            Ok(n) if n >= 1 => Ok(n as usize),
            Ok(n) => Err(ExcelMgrError::Validation(format!(
                "Column index must be 1 or greater, got {n}"
            ))),
            Err(_) => Err(ExcelMgrError::Validation(format!(
                "Column index must be a whole number, got '{}'",
                raw.trim()
            ))),
        })
        .collect()
}

/// Compile regex targets so a bad pattern fails the plan instead of a file
pub fn check_patterns(targets: &[String], mode: MatchMode) -> ExcelMgrResult<()> {
    for target in targets {
        compile(target, mode)?;
    }
    Ok(())
}

fn compile(pattern: &str, mode: MatchMode) -> ExcelMgrResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(mode == MatchMode::CaseInsensitive)
        .build()
        .map_err(|e| ExcelMgrError::Validation(format!("Invalid regex '{pattern}': {e}")))
}

/// Resolve `targets` to column positions in first-request order, without duplicates.
pub fn resolve(
    targets: &[String],
    mode: MatchMode,
    strategy: NameStrategy,
    columns: &[String],
) -> ExcelMgrResult<Vec<usize>> {
    let mut positions = Vec::new();
    let mut seen = HashSet::new();
    let mut missing = Vec::new();
    let mut resolved = Vec::new();

    for target in targets {
        let hits = match mode {
            MatchMode::Index => match_index(target, columns)?,
            MatchMode::Names | MatchMode::CaseInsensitive => {
                match_name(target.trim(), mode, strategy, columns)?
            }
        };

        if hits.is_empty() {
            missing.push(target.trim().to_string());
            continue;
        }
        resolved.push(target.trim().to_string());
        for pos in hits {
            if seen.insert(pos) {
                positions.push(pos);
            }
        }
    }

    if !missing.is_empty() {
        return Err(ExcelMgrError::ColumnNotFound { missing, resolved });
    }
    Ok(positions)
}

fn match_index(target: &str, columns: &[String]) -> ExcelMgrResult<Vec<usize>> {
    let index = parse_index_targets(std::slice::from_ref(&target.to_string()))?;
    Ok(index
        .into_iter()
        .filter(|i| *i <= columns.len())
        .map(|i| i - 1)
        .collect())
}

fn match_name(
    target: &str,
    mode: MatchMode,
    strategy: NameStrategy,
    columns: &[String],
) -> ExcelMgrResult<Vec<usize>> {
    let fold = mode == MatchMode::CaseInsensitive;
    let norm = |s: &str| {
        if fold {
            s.trim().to_lowercase()
        } else {
            s.trim().to_string()
        }
    };
    let wanted = norm(target);

    if strategy == NameStrategy::Regex {
        let re = compile(target, mode)?;
        return Ok(positions_where(columns, |c| re.is_match(c.trim())));
    }

    let hits = positions_where(columns, |c| {
        let have = norm(c);
        match strategy {
            NameStrategy::Exact => have == wanted,
            NameStrategy::Contains => have.contains(&wanted),
            NameStrategy::StartsWith => have.starts_with(&wanted),
            NameStrategy::EndsWith => have.ends_with(&wanted),
            NameStrategy::Regex => false,
        }
    });

    // Case folding can make two distinct headers indistinguishable
    if fold && strategy == NameStrategy::Exact && hits.len() > 1 {
        return Err(ExcelMgrError::AmbiguousMatch {
            target: target.to_string(),
            candidates: hits.iter().map(|&i| columns[i].clone()).collect(),
        });
    }
    Ok(hits)
}

fn positions_where(columns: &[String], pred: impl Fn(&str) -> bool) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| pred(c))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn targets(raw: &[&str]) -> Vec<String> {
        cols(raw)
    }

    #[test]
    fn test_exact_names_in_request_order() {
        let columns = cols(&["A", "B", "C", "D"]);
        let got = resolve(&targets(&["C", "A"]), MatchMode::Names, NameStrategy::Exact, &columns).unwrap();
        assert_eq!(got, vec![2, 0]);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let columns = cols(&["Name", "City"]);
        let err = resolve(&targets(&["name"]), MatchMode::Names, NameStrategy::Exact, &columns).unwrap_err();
        assert!(matches!(err, ExcelMgrError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_ci_mode_matches_any_case() {
        let columns = cols(&["Name", "City"]);
        let got = resolve(&targets(&["CITY"]), MatchMode::CaseInsensitive, NameStrategy::Exact, &columns).unwrap();
        assert_eq!(got, vec![1]);
    }

    #[test]
    fn test_ci_mode_reports_ambiguity() {
        let columns = cols(&["Total", "TOTAL", "Other"]);
        let err = resolve(&targets(&["total"]), MatchMode::CaseInsensitive, NameStrategy::Exact, &columns)
            .unwrap_err();
        match err {
            ExcelMgrError::AmbiguousMatch { target, candidates } => {
                assert_eq!(target, "total");
                assert_eq!(candidates, vec!["Total", "TOTAL"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_index_reports_every_missing_target() {
        let columns = cols(&["a", "b", "c", "d", "e"]);
        let err = resolve(&targets(&["1", "3", "7"]), MatchMode::Index, NameStrategy::Exact, &columns)
            .unwrap_err();
        match err {
            ExcelMgrError::ColumnNotFound { missing, resolved } => {
                assert_eq!(missing, vec!["7"]);
                assert_eq!(resolved, vec!["1", "3"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_targets_are_deduplicated() {
        let columns = cols(&["a", "b", "c"]);
        let got = resolve(&targets(&["2", "2", "1", "2"]), MatchMode::Index, NameStrategy::Exact, &columns).unwrap();
        assert_eq!(got, vec![1, 0]);
    }

    #[test]
    fn test_index_zero_and_negative_fail_validation() {
        for bad in ["0", "-1", "two"] {
            let err = parse_index_targets(&targets(&[bad])).unwrap_err();
            assert!(matches!(err, ExcelMgrError::Validation(_)), "{bad}");
        }
        assert_eq!(parse_index_targets(&targets(&[" 3 "])).unwrap(), vec![3]);
    }

    #[test]
    fn test_contains_strategy_removes_every_hit() {
        let columns = cols(&["tmp_a", "keep", "b_tmp", "tmp_c"]);
        let got = resolve(&targets(&["tmp"]), MatchMode::Names, NameStrategy::Contains, &columns).unwrap();
        assert_eq!(got, vec![0, 2, 3]);
    }

    #[test]
    fn test_prefix_and_suffix_strategies() {
        let columns = cols(&["Notes 2023", "notes_old", "Amount"]);
        let starts = resolve(&targets(&["notes"]), MatchMode::CaseInsensitive, NameStrategy::StartsWith, &columns).unwrap();
        assert_eq!(starts, vec![0, 1]);
        let ends = resolve(&targets(&["unt"]), MatchMode::Names, NameStrategy::EndsWith, &columns).unwrap();
        assert_eq!(ends, vec![2]);
    }

    #[test]
    fn test_regex_strategy_searches_headers() {
        let columns = cols(&["Q1 2023", "Q2 2023", "Total"]);
        let got = resolve(&targets(&[r"^q\d"]), MatchMode::CaseInsensitive, NameStrategy::Regex, &columns).unwrap();
        assert_eq!(got, vec![0, 1]);
        assert!(check_patterns(&targets(&["(unclosed"]), MatchMode::Names).is_err());
    }
}
