//! Cell value records of a sheet, ordered by row then column.

use std::collections::BTreeMap;

use duke_xls_records::record::{CellHeader, FormulaRecord, StringRecord};
use duke_xls_records::Record;

use crate::error::{XlsError, XlsResult};
use crate::sheet::shared_values::SharedValueManager;

/// FORMULA record with the STRING record holding its cached text result.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaCell {
    pub record: FormulaRecord,
    pub cached_string: Option<StringRecord>,
}

impl FormulaCell {
    pub fn new(record: FormulaRecord, cached_string: Option<StringRecord>) -> XlsResult<Self> {
        if record.has_cached_string() && cached_string.is_none() {
            return Err(XlsError::format("formula record flag is set but STRING record was not found"));
        }
        Ok(Self { record, cached_string })
    }

    /// Anchor of the shared formula this cell belongs to.
    pub fn shared_anchor(&self) -> Option<(u16, u16)> {
        if !self.record.is_shared_formula() {
            return None;
        }
        let exp = self.record.formula.exp_reference()?;
        (!exp.is_table).then_some((exp.row, exp.col))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// NUMBER, LABELSST, LABEL, BLANK or BOOLERR.
    Value(Record),
    Formula(FormulaCell),
}

impl CellValue {
    /// Wrap a cell value record.
    pub fn from_record(record: Record) -> XlsResult<Self> {
        match record {
            Record::Formula(f) => Ok(CellValue::Formula(FormulaCell::new(f, None)?)),
            r if r.is_value_record() => Ok(CellValue::Value(r)),
            other => Err(XlsError::argument(format!("{} is not a cell value record", other.name()))),
        }
    }

    pub fn header(&self) -> CellHeader {
        match self {
            CellValue::Value(r) => r.cell_header().copied().unwrap_or_default(),
            CellValue::Formula(f) => f.record.cell,
        }
    }

    pub fn row(&self) -> u16 {
        self.header().row
    }

    pub fn col(&self) -> u16 {
        self.header().col
    }

    pub fn as_formula(&self) -> Option<&FormulaCell> {
        match self {
            CellValue::Formula(f) => Some(f),
            CellValue::Value(_) => None,
        }
    }

    /// The cell as a single record (the FORMULA for formula cells).
    pub fn to_record(&self) -> Record {
        match self {
            CellValue::Value(r) => r.clone(),
            CellValue::Formula(f) => Record::Formula(f.record.clone()),
        }
    }

    /// Records written for the cell, including a SHRFMLA/ARRAY/TABLE when
    /// this is the first cell of its range.
    pub fn visit_records(&self, shared: &SharedValueManager, visitor: &mut dyn FnMut(&Record)) {
        match self {
            CellValue::Value(r) => visitor(r),
            CellValue::Formula(f) => {
                visitor(&Record::Formula(f.record.clone()));
                if let Some(rec) = shared.record_for_first_cell(&f.record) {
                    visitor(&rec);
                }
                if f.record.has_cached_string() {
                    if let Some(s) = &f.cached_string {
                        visitor(&Record::StringValue(s.clone()));
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValueRecordsAggregate {
    cells: BTreeMap<(u16, u16), CellValue>,
}

impl ValueRecordsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cell, returning the one it replaced.
    pub fn insert_cell(&mut self, cell: CellValue) -> Option<CellValue> {
        self.cells.insert((cell.row(), cell.col()), cell)
    }

    pub fn remove_cell(&mut self, row: u16, col: u16) -> Option<CellValue> {
        self.cells.remove(&(row, col))
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&CellValue> {
        self.cells.get(&(row, col))
    }

    pub fn cell_mut(&mut self, row: u16, col: u16) -> Option<&mut CellValue> {
        self.cells.get_mut(&(row, col))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellValue> {
        self.cells.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CellValue> {
        self.cells.values_mut()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells_in_row(&self, row: u16) -> impl Iterator<Item = &CellValue> {
        self.cells.range((row, 0)..=(row, u16::MAX)).map(|(_, c)| c)
    }

    pub fn row_has_cells(&self, row: u16) -> bool {
        self.cells_in_row(row).next().is_some()
    }

    /// Row numbers in `first..=last` that hold at least one cell.
    pub fn rows_with_cells(&self, first: u16, last: u16) -> Vec<u16> {
        let mut rows: Vec<u16> = self
            .cells
            .range((first, 0)..=(last, u16::MAX))
            .map(|(&(row, _), _)| row)
            .collect();
        rows.dedup();
        rows
    }

    /// First and one-past-last column used in `row`.
    pub fn column_extent(&self, row: u16) -> Option<(u16, u16)> {
        let first = self.cells_in_row(row).next()?.col();
        let last = self.cells_in_row(row).last()?.col();
        Some((first, last + 1))
    }

    pub fn visit_cells_for_row(&self, row: u16, shared: &SharedValueManager, visitor: &mut dyn FnMut(&Record)) {
        for cell in self.cells_in_row(row) {
            cell.visit_records(shared, visitor);
        }
    }

    /// Cells of formulas linked to the shared formula anchored at `anchor`.
    pub fn shared_members(&self, anchor: (u16, u16)) -> Vec<(u16, u16)> {
        self.cells
            .iter()
            .filter(|(_, c)| c.as_formula().and_then(FormulaCell::shared_anchor) == Some(anchor))
            .map(|(&k, _)| k)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::record::{BlankRecord, NumberRecord};
    use duke_xls_records::Formula;

    fn number(row: u16, col: u16) -> CellValue {
        CellValue::Value(Record::Number(NumberRecord {
            cell: CellHeader::new(row, col, 15),
            value: 2.5,
        }))
    }

    #[test]
    fn cells_are_ordered_by_row_then_column() {
        let mut values = ValueRecordsAggregate::new();
        values.insert_cell(number(3, 1));
        values.insert_cell(number(1, 7));
        values.insert_cell(number(1, 2));
        let order: Vec<(u16, u16)> = values.iter().map(|c| (c.row(), c.col())).collect();
        assert_eq!(order, vec![(1, 2), (1, 7), (3, 1)]);
        assert_eq!(values.column_extent(1), Some((2, 8)));
        assert_eq!(values.rows_with_cells(0, 5), vec![1, 3]);
        assert!(!values.row_has_cells(2));
    }

    #[test]
    fn non_value_records_are_refused() {
        assert!(CellValue::from_record(Record::Eof).is_err());
        let blank = Record::Blank(BlankRecord {
            cell: CellHeader::new(0, 0, 15),
        });
        assert!(CellValue::from_record(blank).is_ok());
    }

    #[test]
    fn cached_string_flag_needs_a_string_record() {
        let mut f = FormulaRecord::new(CellHeader::new(0, 0, 15), Formula::new(vec![0x1E, 1, 0]));
        f.cached_result = [0, 0, 0, 0, 0, 0, 0xFF, 0xFF];
        assert!(f.has_cached_string());
        assert!(FormulaCell::new(f.clone(), None).is_err());
        let cell = FormulaCell::new(f, Some(StringRecord { value: "x".into() })).unwrap();
        let mut sids = Vec::new();
        CellValue::Formula(cell).visit_records(&SharedValueManager::new(), &mut |r| sids.push(r.sid()));
        assert_eq!(sids, vec![duke_xls_records::sid::FORMULA, duke_xls_records::sid::STRING]);
    }
}
