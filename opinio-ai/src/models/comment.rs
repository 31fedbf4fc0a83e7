//! Input rows and deduplicated comments

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One spreadsheet cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Text cell
    Text(String),
    /// Numeric cell
    Number(f64),
    /// Boolean cell
    Bool(bool),
    /// Date/time cell (ISO text or spreadsheet serial rendered as text)
    DateTime(String),
    /// Empty cell
    Blank,
}

impl CellValue {
    /// Render cell as text; blanks and NaN render as an empty string
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) | CellValue::DateTime(s) => s.clone(),
            CellValue::Number(n) if n.is_nan() => String::new(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Blank => String::new(),
        }
    }

    /// True for blank cells and whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Blank => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(n) => n.is_nan(),
            _ => false,
        }
    }
}

/// One spreadsheet row
///
/// Headers are shared between all rows of a file so a row only owns its cells.
#[derive(Debug, Clone)]
pub struct RawRow {
    headers: Arc<[String]>,
    cells: Vec<CellValue>,
    comment_index: usize,
}

impl RawRow {
    /// Build a row; missing trailing cells read as blank
    pub fn new(headers: Arc<[String]>, cells: Vec<CellValue>, comment_index: usize) -> Self {
        Self {
            headers,
            cells,
            comment_index,
        }
    }

    /// Cell by column name (exact header match)
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        let idx = self.headers.iter().position(|h| h == column)?;
        Some(self.cells.get(idx).unwrap_or(&CellValue::Blank))
    }

    /// Cell in the detected comment column
    pub fn comment_cell(&self) -> &CellValue {
        self.cells.get(self.comment_index).unwrap_or(&CellValue::Blank)
    }

    /// Comment text (empty for blank cells)
    pub fn comment_text(&self) -> String {
        self.comment_cell().as_text()
    }

    /// Column names
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

/// Unique comment after normalization and deduplication
///
/// Identity is `normalized_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// First raw spelling seen for this comment
    #[serde(default)]
    pub raw_text: String,
    /// Canonical form used as the deduplication key
    #[serde(default)]
    pub normalized_text: String,
    /// Number of rows that collapsed into this comment (>= 1)
    #[serde(default = "single_occurrence")]
    pub occurrence_count: usize,
}

fn single_occurrence() -> usize {
    1
}

impl Default for Comment {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Comment {
    /// New comment seen once
    pub fn new(raw_text: impl Into<String>, normalized_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            normalized_text: normalized_text.into(),
            occurrence_count: 1,
        }
    }
}
