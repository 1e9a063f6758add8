//! Column-aligned tables for `status` and `history`.

use console::{measure_text_width, pad_str, Alignment};

/// A simple table with box-drawing borders.
#[derive(Debug)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    column_widths: Vec<usize>,
}

impl Table {
    /// Create a new table with the given headers.
    pub fn new(headers: &[&str]) -> Self {
        let headers: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
        let column_widths = headers.iter().map(|h| measure_text_width(h)).collect();

        Self {
            headers,
            rows: Vec::new(),
            column_widths,
        }
    }

    /// Add a row. Cells beyond the header count are dropped.
    pub fn add_row<S: Into<String>>(&mut self, row: impl IntoIterator<Item = S>) {
        let row: Vec<String> = row
            .into_iter()
            .map(Into::into)
            .take(self.headers.len())
            .collect();

        for (width, cell) in self.column_widths.iter_mut().zip(&row) {
            *width = (*width).max(measure_text_width(cell));
        }

        self.rows.push(row);
    }

    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the table as a string.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 4);
        lines.push(self.render_border('┌', '┬', '┐'));
        lines.push(self.render_row(&self.headers));
        lines.push(self.render_border('├', '┼', '┤'));
        for row in &self.rows {
            lines.push(self.render_row(row));
        }
        lines.push(self.render_border('└', '┴', '┘'));
        lines.join("\n")
    }

    fn render_border(&self, left: char, mid: char, right: char) -> String {
        let segments: Vec<String> = self
            .column_widths
            .iter()
            .map(|width| "─".repeat(width + 2))
            .collect();
        format!("{}{}{}", left, segments.join(&mid.to_string()), right)
    }

    fn render_row(&self, row: &[String]) -> String {
        let mut s = String::from("│");
        for (i, width) in self.column_widths.iter().enumerate() {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            s.push_str(&format!(" {} │", pad_str(cell, *width, Alignment::Left, None)));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_renders_headers() {
        let table = Table::new(&["Stage", "Status"]);
        assert!(table.is_empty());

        let output = table.render();
        assert!(output.contains("Stage"));
        assert_eq!(output.lines().count(), 4);
    }

    #[test]
    fn rows_widen_columns() {
        let mut table = Table::new(&["A", "B"]);
        table.add_row(["setup", "succeeded"]);
        table.add_row(vec!["analyze".to_string(), "stale".to_string()]);

        assert_eq!(table.row_count(), 2);
        let output = table.render();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[3].starts_with("│ setup   │ succeeded │"));
        assert!(lines[4].starts_with("│ analyze │ stale     │"));
    }

    #[test]
    fn missing_cells_are_blank() {
        let mut table = Table::new(&["A", "B", "C"]);
        table.add_row(["only", "two"]);

        let output = table.render();
        assert!(output.contains("│ only │ two │   │"));
    }

    #[test]
    fn unicode_icons_align() {
        let mut table = Table::new(&["", "Stage"]);
        table.add_row(["✓", "setup"]);
        let output = table.render();
        let widths: Vec<usize> = output.lines().map(measure_text_width).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }
}
