//! Output naming: sheet-name sanitization, file-stem sanitization and
//! deterministic de-duplication.

use std::collections::HashSet;

/// Excel's hard limit on worksheet name length
pub const MAX_SHEET_NAME: usize = 31;

const SHEET_ILLEGAL: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];
const FILE_ILLEGAL: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Turn an arbitrary value into a legal worksheet name.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if SHEET_ILLEGAL.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let collapsed = collapse_whitespace(&replaced);
    // Excel rejects names that start or end with an apostrophe
    let trimmed = collapsed.trim_matches('\'').trim_start_matches('_');
    let truncated: String = trimmed.chars().take(MAX_SHEET_NAME).collect();
    let truncated = truncated.trim_end().to_string();

    if truncated.is_empty() {
        if raw.trim().is_empty() {
            "Empty".to_string()
        } else {
            "Sheet".to_string()
        }
    } else {
        truncated
    }
}

/// Turn an arbitrary value into a file stem that is safe on every common filesystem.
pub fn sanitize_file_stem(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if FILE_ILLEGAL.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let collapsed = collapse_whitespace(&replaced);
    // Trailing dots and spaces are stripped by Windows
    let trimmed = collapsed.trim_end_matches(['.', ' ']).trim_start_matches('.');

    if trimmed.is_empty() {
        if raw.trim().is_empty() {
            "Empty".to_string()
        } else {
            "_".to_string()
        }
    } else {
        trimmed.to_string()
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hands out unique names in request order: the first `Sheet` stays `Sheet`,
/// later ones become `Sheet (2)`, `Sheet (3)`, ...
#[derive(Debug, Default)]
pub struct NameAllocator {
    taken: HashSet<String>,
    max_len: Option<usize>,
    case_insensitive: bool,
}

impl NameAllocator {
    /// Allocator for worksheet names: 31 chars, compared case-insensitively like Excel does
    pub fn for_sheets() -> Self {
        Self {
            taken: HashSet::new(),
            max_len: Some(MAX_SHEET_NAME),
            case_insensitive: true,
        }
    }

    /// Allocator for file stems. Case-insensitive so outputs never clash on
    /// case-folding filesystems.
    pub fn for_files() -> Self {
        Self {
            taken: HashSet::new(),
            max_len: None,
            case_insensitive: true,
        }
    }

    pub fn allocate(&mut self, base: &str) -> String {
        let base = self.fit(base, "");
        let key = self.key(&base);
        if self.taken.insert(key) {
            return base;
        }

        let mut n = 2usize;
        loop {
            let suffix = format!(" ({n})");
            let candidate = self.fit(&base, &suffix);
            let key = self.key(&candidate);
            if self.taken.insert(key) {
                return candidate;
            }
            n += 1;
        }
    }

    fn fit(&self, base: &str, suffix: &str) -> String {
        match self.max_len {
            Some(max) => {
                let room = max.saturating_sub(suffix.chars().count());
                let core: String = base.chars().take(room).collect();
                format!("{}{}", core.trim_end(), suffix)
            }
            None => format!("{base}{suffix}"),
        }
    }

    fn key(&self, name: &str) -> String {
        if self.case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("Q1/Q2 [draft]"), "Q1_Q2 _draft_");
        assert_eq!(sanitize_sheet_name("  North   East "), "North East");
        assert_eq!(sanitize_sheet_name(""), "Empty");
        assert_eq!(sanitize_sheet_name("???"), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), MAX_SHEET_NAME);
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("a/b:c"), "a_b_c");
        assert_eq!(sanitize_file_stem("report. "), "report");
        assert_eq!(sanitize_file_stem("   "), "Empty");
        assert_eq!(sanitize_file_stem("Région Est"), "Région Est");
    }

    #[test]
    fn test_allocator_suffixes_duplicates_in_order() {
        let mut names = NameAllocator::for_sheets();
        assert_eq!(names.allocate("Sheet"), "Sheet");
        assert_eq!(names.allocate("Sheet"), "Sheet (2)");
        assert_eq!(names.allocate("sheet"), "sheet (3)");
        assert_eq!(names.allocate("Other"), "Other");
    }

    #[test]
    fn test_allocator_respects_sheet_length_limit() {
        let mut names = NameAllocator::for_sheets();
        let long = "y".repeat(31);
        assert_eq!(names.allocate(&long), long);
        let second = names.allocate(&long);
        assert_eq!(second.chars().count(), MAX_SHEET_NAME);
        assert!(second.ends_with(" (2)"));
    }
}
