use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fmt;

//==============================================================================
// Cell values
//==============================================================================

/// A single spreadsheet cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Grouping key used by split: exact value equality, empties collapse together
    pub fn group_key(&self) -> GroupKey {
        match self {
            CellValue::Text(s) if !s.is_empty() => GroupKey::Text(s.clone()),
            CellValue::Number(n) => GroupKey::Number(n.to_bits()),
            CellValue::Boolean(b) => GroupKey::Boolean(*b),
            CellValue::Date(d) => GroupKey::Date(*d),
            _ => GroupKey::Empty,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Date(d) => {
                if d.time() == chrono::NaiveTime::MIN {
                    write!(f, "{}", d.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))
                }
            }
            CellValue::Empty => Ok(()),
        }
    }
}

/// Hashable identity of a cell for grouping
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Text(String),
    Number(u64),
    Boolean(bool),
    Date(NaiveDateTime),
    Empty,
}

//==============================================================================
// Tables
//==============================================================================

/// One sheet's worth of tabular data: a header row plus value rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from a raw header row, making the headers unique.
    pub fn from_raw_headers(headers: Vec<String>) -> Self {
        Self::new(unique_headers(headers))
    }

    /// Append a row, padding it to the column count. A wider row widens the table.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        if row.len() > self.columns.len() {
            self.widen_to(row.len());
        }
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    /// Add `Unnamed: N` columns until the table has `width` columns
    pub fn widen_to(&mut self, width: usize) {
        while self.columns.len() < width {
            let base = format!("Unnamed: {}", self.columns.len());
            let mut name = base.clone();
            let mut counter = 0;
            while self.columns.contains(&name) {
                counter += 1;
                name = format!("{base}.{counter}");
            }
            self.columns.push(name);
        }
        for row in &mut self.rows {
            row.resize(width, CellValue::Empty);
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at (row, column name), if the column exists
    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Remove the columns at the given positions from the header and from every row.
    pub fn remove_columns(&mut self, positions: &[usize]) {
        let mut sorted: Vec<usize> = positions
            .iter()
            .copied()
            .filter(|p| *p < self.columns.len())
            .collect();
        sorted.sort_unstable();
        sorted.dedup();

        for &pos in sorted.iter().rev() {
            self.columns.remove(pos);
            for row in &mut self.rows {
                if pos < row.len() {
                    row.remove(pos);
                }
            }
        }
    }

    /// Insert a column at the front with one value per existing row
    pub fn prepend_column(&mut self, name: String, value: CellValue) {
        self.columns.insert(0, name);
        for row in &mut self.rows {
            row.insert(0, value.clone());
        }
    }

    /// Take rows by index into a new table with the same header
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|i| self.rows.get(*i).cloned())
                .collect(),
        }
    }
}

/// Make header names unique the way spreadsheet readers conventionally do:
/// blank headers become `Unnamed: N`, repeats get `.1`, `.2`, ... suffixes.
pub fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(headers.len());

    for (idx, raw) in headers.into_iter().enumerate() {
        let base = {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                format!("Unnamed: {idx}")
            } else {
                trimmed.to_string()
            }
        };

        let mut name = base.clone();
        if taken.contains(&name) {
            let counter = seen.entry(base.clone()).or_insert(0);
            loop {
                *counter += 1;
                name = format!("{base}.{counter}");
                if !taken.contains(&name) {
                    break;
                }
            }
        }
        taken.insert(name.clone());
        out.push(name);
    }

    out
}

/// Sheets of one workbook, in workbook order
pub type SheetSet = Vec<(String, Table)>;

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_unique_headers() {
        let headers = vec![
            "Name".to_string(),
            "".to_string(),
            "Name".to_string(),
            "Name".to_string(),
            " City ".to_string(),
        ];
        assert_eq!(
            unique_headers(headers),
            vec!["Name", "Unnamed: 1", "Name.1", "Name.2", "City"]
        );
    }

    #[test]
    fn test_unique_headers_avoids_existing_suffix() {
        let headers = vec!["A".to_string(), "A.1".to_string(), "A".to_string()];
        assert_eq!(unique_headers(headers), vec!["A", "A.1", "A.2"]);
    }

    #[test]
    fn test_wide_row_widens_table() {
        let mut table = Table::new(vec!["a".into(), "b".into()]);
        table.push_row(vec![text("1"), text("2")]);
        table.push_row(vec![text("3"), text("4"), text("5")]);

        assert_eq!(table.columns, vec!["a", "b", "Unnamed: 2"]);
        assert_eq!(table.rows[0], vec![text("1"), text("2"), CellValue::Empty]);
        assert_eq!(table.rows[1][2], text("5"));
    }

    #[test]
    fn test_remove_columns_keeps_rows_aligned() {
        let mut table = Table::new(vec!["a".into(), "b".into(), "c".into()]);
        table.push_row(vec![text("1"), text("2"), text("3")]);
        table.push_row(vec![text("4"), text("5"), text("6")]);

        table.remove_columns(&[2, 0, 2]);

        assert_eq!(table.columns, vec!["b"]);
        assert_eq!(table.rows, vec![vec![text("2")], vec![text("5")]]);
    }

    #[test]
    fn test_push_row_pads_short_rows() {
        let mut table = Table::new(vec!["a".into(), "b".into()]);
        table.push_row(vec![text("x")]);
        assert_eq!(table.rows[0], vec![text("x"), CellValue::Empty]);
    }

    #[test]
    fn test_group_key_treats_blank_text_as_empty() {
        assert_eq!(text("").group_key(), GroupKey::Empty);
        assert_eq!(CellValue::Empty.group_key(), GroupKey::Empty);
        assert_ne!(text("A").group_key(), text("a").group_key());
    }

    #[test]
    fn test_display_number() {
        assert_eq!(CellValue::Number(3.0).to_string(), "3");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
    }
}
