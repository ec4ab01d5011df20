use crate::config::LocaleConfig;
use crate::error::RuleError;
use crate::extract::markup;
use crate::locale::cell_number;
use crate::types::ExtractedTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    pub text: String,
    pub is_header: bool,
    /// Placeholder for a column covered by a preceding cell's colspan
    pub is_filler: bool,
}

impl GridCell {
    fn data(text: &str) -> Self {
        Self {
            text: text.trim().to_string(),
            is_header: false,
            is_filler: false,
        }
    }
}

/// Where the grid was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridOrigin {
    Rows,
    Markup,
}

/// A table normalized for the arithmetic and completeness rules.
///
/// `rows` take precedence; `raw_html` is parsed when no rows were extracted,
/// and otherwise only lends its `<th>` and colspan layout. Header rows lead
/// the table and carry no total label and no numbers outside the label column
/// other than column years. With `<th>` markup they are the leading rows made
/// only of `<th>` cells; without it only row 0 qualifies. Column 0 holds row
/// labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableGrid {
    rows: Vec<Vec<GridCell>>,
    header_rows: Vec<bool>,
    origin: GridOrigin,
}

impl TableGrid {
    pub fn build(table: &ExtractedTable, locale: &LocaleConfig) -> Result<Self, RuleError> {
        let mut grid = if table.rows.iter().any(|row| !row.is_empty()) {
            let mut grid = Self::from_rows(&table.rows);
            if !table.raw_html.trim().is_empty() {
                if let Ok(layout) = Self::from_markup(&table.raw_html) {
                    grid.adopt_layout(&layout);
                }
            }
            grid
        } else if !table.raw_html.trim().is_empty() {
            Self::from_markup(&table.raw_html)?
        } else {
            return Err(RuleError::MalformedTable(
                "table has neither extracted rows nor markup".to_string(),
            ));
        };
        grid.classify_header_rows(locale);
        grid.check_shape()?;
        Ok(grid)
    }

    fn from_rows(rows: &[Vec<String>]) -> Self {
        let rows = rows
            .iter()
            .filter(|row| !row.is_empty())
            .map(|row| row.iter().map(|text| GridCell::data(text)).collect())
            .collect();
        Self {
            rows,
            header_rows: Vec::new(),
            origin: GridOrigin::Rows,
        }
    }

    fn from_markup(raw_html: &str) -> Result<Self, RuleError> {
        let parsed = markup::parse_table_rows(raw_html);
        if parsed.is_empty() {
            return Err(RuleError::MalformedTable(
                "no rows could be read from the table markup".to_string(),
            ));
        }

        let rows = parsed
            .iter()
            .map(|row| {
                let mut cells = Vec::new();
                for cell in &row.cells {
                    cells.push(GridCell {
                        text: cell.text.clone(),
                        is_header: cell.is_header,
                        is_filler: false,
                    });
                    for _ in 1..cell.colspan {
                        cells.push(GridCell {
                            text: String::new(),
                            is_header: cell.is_header,
                            is_filler: true,
                        });
                    }
                }
                cells
            })
            .collect();

        Ok(Self {
            rows,
            header_rows: Vec::new(),
            origin: GridOrigin::Markup,
        })
    }

    /// Takes `<th>` and colspan flags from the markup when it has exactly the
    /// same shape as the extracted rows
    fn adopt_layout(&mut self, layout: &TableGrid) {
        let same_shape = self.rows.len() == layout.rows.len()
            && self
                .rows
                .iter()
                .zip(&layout.rows)
                .all(|(ours, theirs)| ours.len() == theirs.len());
        if !same_shape {
            return;
        }
        for (ours, theirs) in self.rows.iter_mut().zip(&layout.rows) {
            for (cell, styled) in ours.iter_mut().zip(theirs) {
                cell.is_header = styled.is_header;
                cell.is_filler = styled.is_filler;
            }
        }
    }

    /// Settles which rows are headers. Afterwards a cell's `is_header` flag
    /// follows its row rather than its `<th>` markup.
    fn classify_header_rows(&mut self, locale: &LocaleConfig) {
        let marked = self.rows.iter().flatten().any(|cell| cell.is_header);
        // Without `<th>` markup only the first row can label the columns
        let limit = if marked { self.rows.len() } else { 1 };
        let mut leading = self
            .rows
            .iter()
            .take(limit)
            .take_while(|row| looks_like_header(row, marked, locale))
            .count();
        if leading == self.rows.len() {
            leading = leading.min(1);
        }

        self.header_rows = (0..self.rows.len()).map(|row| row < leading).collect();
        for (index, row) in self.rows.iter_mut().enumerate() {
            row.iter_mut().for_each(|cell| cell.is_header = index < leading);
        }
    }

    /// Rejects tables whose rows disagree on width: more than half of the
    /// rows differ from the most common width by more than one column.
    fn check_shape(&self) -> Result<(), RuleError> {
        if self.rows.is_empty() {
            return Err(RuleError::MalformedTable("table has no rows".to_string()));
        }

        let modal = self.modal_width();
        let deviating = self
            .rows
            .iter()
            .filter(|row| row.len().abs_diff(modal) > 1)
            .count();
        if deviating * 2 > self.rows.len() {
            return Err(RuleError::MalformedTable(format!(
                "{deviating} of {} rows deviate from the usual width of {modal} columns",
                self.rows.len()
            )));
        }
        Ok(())
    }

    /// Most frequent row width; ties go to the wider one
    fn modal_width(&self) -> usize {
        let mut counts: Vec<(usize, usize)> = Vec::new();
        for row in &self.rows {
            match counts.iter_mut().find(|(width, _)| *width == row.len()) {
                Some((_, count)) => *count += 1,
                None => counts.push((row.len(), 1)),
            }
        }
        counts
            .into_iter()
            .max_by_key(|(width, count)| (*count, *width))
            .map_or(0, |(width, _)| width)
    }

    pub fn origin(&self) -> GridOrigin {
        self.origin
    }

    pub fn rows(&self) -> &[Vec<GridCell>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&GridCell> {
        self.rows.get(row).and_then(|cells| cells.get(column))
    }

    pub fn is_header_row(&self, row: usize) -> bool {
        self.header_rows.get(row).copied().unwrap_or(false)
    }

    pub fn data_rows(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.rows.len()).filter(|row| !self.is_header_row(*row))
    }

    pub fn row_label(&self, row: usize) -> Option<&str> {
        self.cell(row, 0)
            .filter(|cell| !cell.is_filler)
            .map(|cell| cell.text.as_str())
    }

    /// Header text above `column`, looking left through colspan fillers
    pub fn column_label(&self, column: usize) -> Option<&str> {
        (0..self.rows.len())
            .filter(|row| self.is_header_row(*row))
            .find_map(|row| {
                let cells = &self.rows[row];
                (0..=column.min(cells.len().saturating_sub(1)))
                    .rev()
                    .find(|index| !cells[*index].is_filler)
                    .filter(|_| column < cells.len())
                    .map(|index| cells[index].text.as_str())
                    .filter(|text| !text.is_empty())
            })
    }

    pub fn row_text(&self, row: usize) -> String {
        self.rows
            .get(row)
            .map(|cells| {
                cells
                    .iter()
                    .filter(|cell| !cell.is_filler)
                    .map(|cell| cell.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .unwrap_or_default()
    }

    /// Data rows whose label cell is a total label
    pub fn total_rows(&self, locale: &LocaleConfig) -> Vec<usize> {
        self.data_rows()
            .filter(|row| self.row_label(*row).is_some_and(|label| locale.is_total_label(label)))
            .collect()
    }

    /// Columns (never the label column) whose header cell is a total label
    pub fn total_columns(&self, locale: &LocaleConfig) -> Vec<usize> {
        (1..self.width())
            .filter(|column| {
                (0..self.rows.len())
                    .filter(|row| self.is_header_row(*row))
                    .any(|row| {
                        self.cell(row, *column)
                            .is_some_and(|cell| !cell.is_filler && locale.is_total_label(&cell.text))
                    })
            })
            .collect()
    }
}

fn looks_like_header(row: &[GridCell], marked: bool, locale: &LocaleConfig) -> bool {
    if marked && !row.iter().all(|cell| cell.is_header) {
        return false;
    }
    if row
        .first()
        .is_some_and(|cell| !cell.is_filler && locale.is_total_label(&cell.text))
    {
        return false;
    }

    let values: Vec<&str> = row
        .iter()
        .skip(1)
        .filter(|cell| !cell.is_filler)
        .map(|cell| cell.text.trim())
        .filter(|text| !text.is_empty())
        .collect();
    if values
        .iter()
        .any(|text| column_year(text).is_none() && cell_number(text).is_some())
    {
        return false;
    }

    // Unmarked rows of bare years only read as labels when they run in order
    let years: Vec<u32> = values.iter().filter_map(|text| column_year(text)).collect();
    years.is_empty() || marked || (years.len() >= 2 && years.windows(2).all(|pair| pair[0] < pair[1]))
}

fn column_year(text: &str) -> Option<u32> {
    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|year| (1900..=2100).contains(year))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rows_use_first_row_as_header() {
        let table = ExtractedTable::from_rows([["Campus", "Students"], ["A", "40"], ["Total", "40"]]);
        let grid = TableGrid::build(&table, &LocaleConfig::default()).unwrap();
        assert_eq!(grid.origin(), GridOrigin::Rows);
        assert!(grid.is_header_row(0));
        assert_eq!(grid.data_rows().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(grid.total_rows(&LocaleConfig::default()), vec![2]);
        assert_eq!(grid.column_label(1), Some("Students"));
    }

    #[test]
    fn markup_fallback_detects_th_headers_and_fillers() {
        let table = ExtractedTable::from_html(
            "<table><tr><th>Unit</th><th colspan='2'>Students</th><th>Total</th></tr>\
             <tr><td>A</td><td>1</td><td>2</td><td>3</td></tr></table>",
        );
        let grid = TableGrid::build(&table, &LocaleConfig::default()).unwrap();
        assert_eq!(grid.origin(), GridOrigin::Markup);
        assert_eq!(grid.width(), 4);
        assert!(grid.cell(0, 2).unwrap().is_filler);
        assert_eq!(grid.column_label(2), Some("Students"));
        assert_eq!(grid.total_columns(&LocaleConfig::default()), vec![3]);
    }

    #[test]
    fn rows_adopt_colspan_layout_from_matching_markup() {
        let table = ExtractedTable::from_rows(vec![
            vec!["Campus", "Students"],
            vec!["North region", ""],
            vec!["A", "10"],
        ])
        .with_raw_html(
            "<table><tr><th>Campus</th><th>Students</th></tr>\
             <tr><td colspan=2>North region</td></tr><tr><td>A</td><td>10</td></tr></table>",
        );
        let grid = TableGrid::build(&table, &LocaleConfig::default()).unwrap();
        assert_eq!(grid.origin(), GridOrigin::Rows);
        assert!(grid.cell(1, 1).unwrap().is_filler);
        assert!(!grid.cell(2, 1).unwrap().is_filler);
    }

    #[test]
    fn headerless_rows_are_all_data() {
        let table = ExtractedTable::from_rows([["A", "40"], ["B", "30"], ["Total", "100"]]);
        let grid = TableGrid::build(&table, &LocaleConfig::default()).unwrap();
        assert_eq!(grid.data_rows().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(grid.total_rows(&LocaleConfig::default()), vec![2]);
    }

    #[test]
    fn th_total_row_after_data_is_a_data_row() {
        let table = ExtractedTable::from_html(
            "<table><tr><th>Campus</th><th>Students</th></tr>\
             <tr><td>A</td><td>40</td></tr><tr><td>B</td><td>30</td></tr>\
             <tr><th>Total</th><th>100</th></tr></table>",
        );
        let grid = TableGrid::build(&table, &LocaleConfig::default()).unwrap();
        assert!(grid.is_header_row(0));
        assert!(!grid.is_header_row(3));
        assert!(!grid.cell(3, 1).unwrap().is_header);
        assert_eq!(grid.total_rows(&LocaleConfig::default()), vec![3]);
    }

    #[test]
    fn leading_th_total_row_is_never_a_header() {
        let table = ExtractedTable::from_html(
            "<table><tr><th>Total</th><th>70</th></tr>\
             <tr><td>A</td><td>40</td></tr><tr><td>B</td><td>30</td></tr></table>",
        );
        let grid = TableGrid::build(&table, &LocaleConfig::default()).unwrap();
        assert_eq!(grid.total_rows(&LocaleConfig::default()), vec![0]);
    }

    #[test]
    fn year_columns_stay_in_the_header() {
        let plain = ExtractedTable::from_rows([["Campus", "2022", "2023"], ["A", "1", "2"]]);
        let grid = TableGrid::build(&plain, &LocaleConfig::default()).unwrap();
        assert!(grid.is_header_row(0));
        assert_eq!(grid.column_label(2), Some("2023"));

        let marked = ExtractedTable::from_html(
            "<table><tr><th>Campus</th><th>2023</th></tr><tr><td>A</td><td>5</td></tr></table>",
        );
        let grid = TableGrid::build(&marked, &LocaleConfig::default()).unwrap();
        assert!(grid.is_header_row(0));

        let data = ExtractedTable::from_rows([["A", "2010"], ["B", "30"]]);
        let grid = TableGrid::build(&data, &LocaleConfig::default()).unwrap();
        assert!(!grid.is_header_row(0));
    }

    #[test]
    fn text_only_table_keeps_first_row_as_header() {
        let table = ExtractedTable::from_rows([["Unit", "Head"], ["A", "Ana"], ["B", ""]]);
        let grid = TableGrid::build(&table, &LocaleConfig::default()).unwrap();
        assert_eq!(grid.data_rows().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn empty_table_is_malformed() {
        let err = TableGrid::build(&ExtractedTable::default(), &LocaleConfig::default()).unwrap_err();
        assert!(matches!(err, RuleError::MalformedTable(_)));
    }

    #[test]
    fn markup_without_rows_is_malformed() {
        let err = TableGrid::build(&ExtractedTable::from_html("<table><p>oops</p></table>"), &LocaleConfig::default()).unwrap_err();
        assert!(matches!(err, RuleError::MalformedTable(_)));
    }

    #[test]
    fn ragged_rows_within_one_column_are_tolerated() {
        let table = ExtractedTable::from_rows(vec![
            vec!["Campus", "2022", "2023"],
            vec!["A", "1"],
            vec!["B", "2", "3"],
            vec!["C", "4", "5", "x"],
        ]);
        assert!(TableGrid::build(&table, &LocaleConfig::default()).is_ok());
    }

    #[test]
    fn mostly_irregular_rows_are_malformed() {
        let table = ExtractedTable::from_rows(vec![
            vec!["a", "b", "c", "d", "e"],
            vec!["a"],
            vec!["a", "b", "c", "d", "e", "f", "g", "h"],
            vec!["a", "b"],
        ]);
        assert!(matches!(
            TableGrid::build(&table, &LocaleConfig::default()),
            Err(RuleError::MalformedTable(_))
        ));
    }
}
