//! Line-item tables found in supplier documents.

use serde::{Deserialize, Serialize};

use crate::document::Table;

/// Column positions of a usable line-item table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub description: usize,
    pub quantity: usize,
    pub unit_value: usize,
    pub code: Option<usize>,
}

impl ColumnLayout {
    /// Find the columns by header tokens.
    ///
    /// Each header cell is assigned to at most one column, checked in the order
    /// description, quantity, unit value, code; a later cell with the same token
    /// replaces an earlier one. `None` unless description, quantity and unit
    /// value are all present.
    pub fn detect(header: &[String]) -> Option<Self> {
        let mut description = None;
        let mut quantity = None;
        let mut unit_value = None;
        let mut code = None;
        for (i, cell) in header.iter().enumerate() {
            let h = normalize_header(cell);
            if h.contains("DESCRI") {
                description = Some(i);
            } else if h.contains("QTD") || h.contains("QUANT") {
                quantity = Some(i);
            } else if h.contains("UNIT") {
                unit_value = Some(i);
            } else if h.contains("SKU") || h.contains("CÓD") || h.contains("COD") {
                code = Some(i);
            }
        }
        Some(Self {
            description: description?,
            quantity: quantity?,
            unit_value: unit_value?,
            code,
        })
    }

    fn required_width(&self) -> usize {
        self.description.max(self.quantity).max(self.unit_value) + 1
    }
}

fn normalize_header(cell: &str) -> String {
    cell.replace('\n', " ").trim().to_uppercase()
}

/// One data row of a line-item table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLine {
    pub description: String,
    pub code: Option<String>,
    pub quantity: f64,
    pub unit_value: f64,
}

/// Parse a document number with `.` as thousands separator and `,` as the
/// decimal mark. An empty cell reads as zero.
pub fn parse_decimal(cell: &str) -> Option<f64> {
    let cleaned = cell.trim().replace('.', "").replace(',', ".");
    if cleaned.is_empty() {
        return Some(0.0);
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Data rows of `table`, or `None` when its header does not describe line items.
///
/// Rows that are too short, have no description, or carry an unreadable
/// quantity or unit value are skipped.
pub fn line_items(table: &Table) -> Option<Vec<RawLine>> {
    let header = table.first()?;
    let layout = ColumnLayout::detect(header)?;
    Some(parse_rows(&table[1..], &layout))
}

pub fn parse_rows(rows: &[Vec<String>], layout: &ColumnLayout) -> Vec<RawLine> {
    let mut lines = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if row.len() < layout.required_width() {
            continue;
        }
        let description = row[layout.description].replace('\n', " ").trim().to_string();
        if description.is_empty() {
            continue;
        }
        let (Some(quantity), Some(unit_value)) = (
            parse_decimal(&row[layout.quantity]),
            parse_decimal(&row[layout.unit_value]),
        ) else {
            tracing::debug!(row = i + 1, %description, "skipping row with unreadable numbers");
            continue;
        };
        let code = layout
            .code
            .and_then(|c| row.get(c))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        lines.push(RawLine {
            description,
            code,
            quantity,
            unit_value,
        });
    }
    lines
}
