//! COLINFO records of a sheet, kept sorted and merged.

use duke_xls_records::record::ColumnInfoRecord;
use duke_xls_records::{sid, Record};

use crate::error::{XlsError, XlsResult};
use crate::sheet::RecordAggregate;
use crate::stream::RecordStream;

/// Largest column width Excel accepts, in 1/256 of a character.
pub const MAX_COLUMN_WIDTH: u16 = 255 * 256;

/// Default column format.
const DEFAULT_XF: u16 = 0x0F;

/// Settings to apply with [`ColumnInfoTable::set_column`]; `None` leaves the
/// current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnChange {
    pub xf_index: Option<u16>,
    pub width: Option<u16>,
    pub level: Option<u16>,
    pub hidden: Option<bool>,
    pub collapsed: Option<bool>,
}

impl ColumnChange {
    fn is_noop_for(&self, ci: &ColumnInfoRecord) -> bool {
        self.xf_index.map_or(true, |v| v == ci.xf_index)
            && self.width.map_or(true, |v| v == ci.col_width)
            && self.level.map_or(true, |v| v == ci.outline_level())
            && self.hidden.map_or(true, |v| v == ci.is_hidden())
            && self.collapsed.map_or(true, |v| v == ci.is_collapsed())
    }

    fn apply(&self, ci: &mut ColumnInfoRecord) {
        if let Some(xf) = self.xf_index {
            ci.xf_index = xf;
        }
        if let Some(width) = self.width {
            ci.col_width = width;
        }
        if let Some(level) = self.level {
            ci.set_outline_level(level);
        }
        if let Some(hidden) = self.hidden {
            ci.set_hidden(hidden);
        }
        if let Some(collapsed) = self.collapsed {
            ci.set_collapsed(collapsed);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnInfoTable {
    records: Vec<ColumnInfoRecord>,
}

impl ColumnInfoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read consecutive COLINFO records.
    pub fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        let mut records: Vec<ColumnInfoRecord> = Vec::new();
        let mut sorted = true;
        while rs.peek_next_sid() == Some(sid::COLINFO) {
            match rs.next()? {
                Record::ColumnInfo(ci) => {
                    if let Some(prev) = records.last() {
                        sorted &= prev.first_col < ci.first_col;
                    }
                    records.push(ci);
                }
                other => {
                    return Err(XlsError::format(format!("malformed COLINFO record ({})", other.name())));
                }
            }
        }
        if records.is_empty() {
            return Err(XlsError::format("no column info records found"));
        }
        if !sorted {
            log::debug!("column info records out of order, sorting");
            records.sort_by_key(|ci| ci.first_col);
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[ColumnInfoRecord] {
        &self.records
    }

    pub fn num_columns(&self) -> usize {
        self.records.len()
    }

    pub fn find_column_info(&self, col: u16) -> Option<&ColumnInfoRecord> {
        self.records.iter().find(|ci| ci.contains_column(col))
    }

    fn find_index(&self, col: u16) -> Option<usize> {
        self.records.iter().position(|ci| ci.contains_column(col))
    }

    /// Change the settings of one column, splitting the record that covers
    /// it and merging neighbours that end up identical.
    pub fn set_column(&mut self, col: u16, change: ColumnChange) {
        let Some(i) = self.find_index(col) else {
            let mut ci = ColumnInfoRecord::new(col, col);
            change.apply(&mut ci);
            let at = self.records.iter().position(|r| r.first_col > col).unwrap_or(self.records.len());
            self.records.insert(at, ci);
            self.attempt_merge(at);
            return;
        };
        let existing = self.records[i];
        if change.is_noop_for(&existing) {
            return;
        }
        if existing.first_col == existing.last_col {
            change.apply(&mut self.records[i]);
            self.attempt_merge(i);
            return;
        }

        let mut target = existing;
        target.first_col = col;
        target.last_col = col;
        change.apply(&mut target);

        if col == existing.first_col {
            self.records[i].first_col = col + 1;
            self.records.insert(i, target);
            self.attempt_merge(i);
        } else if col == existing.last_col {
            self.records[i].last_col = col - 1;
            self.records.insert(i + 1, target);
            self.attempt_merge(i + 1);
        } else {
            let mut after = existing;
            after.first_col = col + 1;
            self.records[i].last_col = col - 1;
            self.records.insert(i + 1, target);
            self.records.insert(i + 2, after);
        }
    }

    fn attempt_merge(&mut self, i: usize) {
        let mut i = i;
        if i > 0 && self.mergeable(i - 1, i) {
            self.records[i - 1].last_col = self.records[i].last_col;
            self.records.remove(i);
            i -= 1;
        }
        if i + 1 < self.records.len() && self.mergeable(i, i + 1) {
            self.records[i].last_col = self.records[i + 1].last_col;
            self.records.remove(i + 1);
        }
    }

    fn mergeable(&self, a: usize, b: usize) -> bool {
        let (a, b) = (&self.records[a], &self.records[b]);
        a.is_adjacent_before(b) && a.format_matches(b)
    }

    /// Raise (`indent`) or lower the outline level of `from..=to`.
    pub fn group_column_range(&mut self, from: u16, to: u16, indent: bool) {
        for col in from..=to {
            let level = self.find_column_info(col).map_or(0, ColumnInfoRecord::outline_level);
            let level = if indent { (level + 1).min(7) } else { level.saturating_sub(1) };
            self.set_column(
                col,
                ColumnChange {
                    level: Some(level),
                    ..ColumnChange::default()
                },
            );
        }
    }

    pub fn max_outline_level(&self) -> u16 {
        self.records.iter().map(ColumnInfoRecord::outline_level).max().unwrap_or(0)
    }

    pub fn column_width(&self, col: u16) -> Option<u16> {
        self.find_column_info(col).map(|ci| ci.col_width)
    }

    pub fn set_column_width(&mut self, col: u16, width: u16) -> XlsResult<()> {
        if width > MAX_COLUMN_WIDTH {
            return Err(XlsError::argument(format!(
                "the maximum column width for an individual cell is 255 characters, got {}",
                width / 256
            )));
        }
        self.set_column(
            col,
            ColumnChange {
                width: Some(width),
                ..ColumnChange::default()
            },
        );
        Ok(())
    }

    pub fn is_column_hidden(&self, col: u16) -> bool {
        self.find_column_info(col).map_or(false, ColumnInfoRecord::is_hidden)
    }

    pub fn set_column_hidden(&mut self, col: u16, hidden: bool) {
        self.set_column(
            col,
            ColumnChange {
                hidden: Some(hidden),
                ..ColumnChange::default()
            },
        );
    }

    pub fn xf_index_for_col_at(&self, col: u16) -> u16 {
        self.find_column_info(col).map_or(DEFAULT_XF, |ci| ci.xf_index)
    }

    pub fn set_default_column_style(&mut self, col: u16, xf_index: u16) {
        self.set_column(
            col,
            ColumnChange {
                xf_index: Some(xf_index),
                ..ColumnChange::default()
            },
        );
    }
}

impl RecordAggregate for ColumnInfoTable {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        for ci in &self.records {
            visitor(&Record::ColumnInfo(*ci));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ranges(table: &ColumnInfoTable) -> Vec<(u16, u16)> {
        table.records().iter().map(|ci| (ci.first_col, ci.last_col)).collect()
    }

    #[test]
    fn setting_the_middle_column_splits_in_three() {
        let mut ci = ColumnInfoRecord::new(2, 6);
        ci.col_width = 1000;
        let mut rs = RecordStream::new(vec![Record::ColumnInfo(ci)]);
        let mut table = ColumnInfoTable::read(&mut rs).unwrap();
        table.set_column_width(4, 3000).unwrap();
        assert_eq!(ranges(&table), vec![(2, 3), (4, 4), (5, 6)]);
        assert_eq!(table.column_width(4), Some(3000));
        assert_eq!(table.column_width(6), Some(1000));

        // putting it back merges the three again
        table.set_column_width(4, 1000).unwrap();
        assert_eq!(ranges(&table), vec![(2, 6)]);
    }

    #[test]
    fn adjacent_new_columns_merge() {
        let mut table = ColumnInfoTable::new();
        table.set_column_hidden(1, true);
        table.set_column_hidden(2, true);
        table.set_column_hidden(0, true);
        assert_eq!(ranges(&table), vec![(0, 2)]);
        assert!(table.is_column_hidden(1));
        assert!(!table.is_column_hidden(3));
    }

    #[test]
    fn out_of_order_records_are_sorted() {
        let mut rs = RecordStream::new(vec![
            Record::ColumnInfo(ColumnInfoRecord::new(5, 5)),
            Record::ColumnInfo(ColumnInfoRecord::new(1, 1)),
        ]);
        let table = ColumnInfoTable::read(&mut rs).unwrap();
        assert_eq!(ranges(&table), vec![(1, 1), (5, 5)]);
    }

    #[test]
    fn grouping_raises_levels_up_to_seven() {
        let mut table = ColumnInfoTable::new();
        for _ in 0..9 {
            table.group_column_range(0, 1, true);
        }
        assert_eq!(table.max_outline_level(), 7);
        table.group_column_range(1, 1, false);
        assert_eq!(table.find_column_info(1).map(ColumnInfoRecord::outline_level), Some(6));
        assert_eq!(table.find_column_info(0).map(ColumnInfoRecord::outline_level), Some(7));
    }

    #[test]
    fn width_limit_and_default_style() {
        let mut table = ColumnInfoTable::new();
        assert!(matches!(table.set_column_width(0, MAX_COLUMN_WIDTH + 1), Err(XlsError::InvalidArgument(_))));
        assert!(table.set_column_width(0, MAX_COLUMN_WIDTH).is_ok());
        assert_eq!(table.xf_index_for_col_at(9), 0x0F);
        table.set_default_column_style(9, 0x16);
        assert_eq!(table.xf_index_for_col_at(9), 0x16);
    }
}
