//! Shared formulas, array formulas and data tables of one sheet.
//!
//! A FORMULA cell whose tokens are a single `PtgExp` (or `PtgTbl`) points at
//! the first cell of a range; the real expression lives in the SHRFMLA,
//! ARRAY or TABLE record written right after that first cell.

use ahash::AHashMap;
use duke_xls_records::record::{ArrayRecord, CellRange8, FormulaRecord, SharedFormulaRecord, TableRecord};
use duke_xls_records::Record;

use crate::error::{XlsError, XlsResult};

#[derive(Debug, Clone)]
struct SharedFormulaGroup {
    record: SharedFormulaRecord,
    /// Formula cells linked to the group.
    members: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SharedValueManager {
    /// Keyed by the (row, col) of the formula cell the SHRFMLA followed.
    groups: AHashMap<(u16, u16), SharedFormulaGroup>,
    arrays: Vec<ArrayRecord>,
    tables: Vec<TableRecord>,
}

impl SharedValueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the records collected out of a row block.
    ///
    /// `shared` pairs each SHRFMLA with the cell of the FORMULA it followed.
    pub fn create(
        shared: Vec<(SharedFormulaRecord, (u16, u16))>,
        arrays: Vec<ArrayRecord>,
        tables: Vec<TableRecord>,
    ) -> XlsResult<Self> {
        let mut groups = AHashMap::with_capacity(shared.len());
        for (record, (row, col)) in shared {
            if !record.range.is_in_range(row, col) {
                return Err(XlsError::format(format!(
                    "first formula cell ({row}, {col}) is not in shared formula range {:?}",
                    record.range
                )));
            }
            groups.insert((row, col), SharedFormulaGroup { record, members: 0 });
        }
        Ok(Self { groups, arrays, tables })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.arrays.is_empty() && self.tables.is_empty()
    }

    /// Attach a formula cell to the group anchored at `first_cell`.
    pub fn link_shared_formula(&mut self, first_cell: (u16, u16)) -> XlsResult<&SharedFormulaRecord> {
        let group = self
            .groups
            .get_mut(&first_cell)
            .ok_or_else(|| XlsError::format("failed to find a matching shared formula record"))?;
        group.members += 1;
        Ok(&group.record)
    }

    pub fn shared_formula(&self, first_cell: (u16, u16)) -> Option<&SharedFormulaRecord> {
        self.groups.get(&first_cell).map(|g| &g.record)
    }

    /// Number of formula cells linked to the group at `first_cell`.
    pub fn group_size(&self, first_cell: (u16, u16)) -> usize {
        self.groups.get(&first_cell).map_or(0, |g| g.members)
    }

    /// Drop the group anchored at `first_cell`, handing back its record so
    /// the member cells can be given standalone formulas.
    pub fn unlink(&mut self, first_cell: (u16, u16)) -> Option<SharedFormulaRecord> {
        self.groups.remove(&first_cell).map(|g| g.record)
    }

    /// SHRFMLA, TABLE or ARRAY record to write after `cell`, when `cell` is
    /// the first cell of its range.
    pub fn record_for_first_cell(&self, cell: &FormulaRecord) -> Option<Record> {
        let anchor = cell.formula.exp_reference()?;
        let (row, col) = (anchor.row, anchor.col);
        if cell.cell.row != row || cell.cell.col != col {
            return None;
        }
        if let Some(group) = self.groups.get(&(row, col)) {
            return Some(Record::SharedFormula(group.record.clone()));
        }
        // arrays and tables cover their whole range, so the first cell is the top left
        if let Some(table) = self.tables.iter().find(|t| t.range.is_first_cell(row, col)) {
            return Some(Record::Table(*table));
        }
        self.arrays
            .iter()
            .find(|a| a.range.is_first_cell(row, col))
            .map(|a| Record::Array(a.clone()))
    }

    // ── Array formulas ──────────────────────────────────────────────────

    pub fn add_array_record(&mut self, record: ArrayRecord) {
        self.arrays.push(record);
    }

    /// Remove the array formula covering `(row, col)`, returning its range.
    pub fn remove_array_formula(&mut self, row: u16, col: u16) -> XlsResult<CellRange8> {
        let i = self
            .arrays
            .iter()
            .position(|a| a.range.is_in_range(row, col))
            .ok_or_else(|| XlsError::argument(format!("cell ({row}, {col}) is not part of an array formula")))?;
        Ok(self.arrays.remove(i).range)
    }

    /// Array formula whose first cell is `(row, col)`.
    pub fn array_record(&self, row: u16, col: u16) -> Option<&ArrayRecord> {
        self.arrays.iter().find(|a| a.range.is_first_cell(row, col))
    }

    pub fn arrays(&self) -> &[ArrayRecord] {
        &self.arrays
    }

    pub fn tables(&self) -> &[TableRecord] {
        &self.tables
    }

    pub fn shared_formulas(&self) -> impl Iterator<Item = &SharedFormulaRecord> {
        self.groups.values().map(|g| &g.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::record::CellHeader;
    use duke_xls_records::formula::{Formula, PTG_EXP};

    fn range(first_row: u16, last_row: u16, first_col: u8, last_col: u8) -> CellRange8 {
        CellRange8 {
            first_row,
            last_row,
            first_col,
            last_col,
        }
    }

    fn shared(r: CellRange8) -> SharedFormulaRecord {
        SharedFormulaRecord {
            range: r,
            reserved: 0,
            formula: Formula::new(vec![0x1E, 1, 0]),
        }
    }

    fn exp_cell(row: u16, col: u16, anchor_row: u16, anchor_col: u16) -> FormulaRecord {
        let mut tokens = vec![PTG_EXP];
        tokens.extend_from_slice(&anchor_row.to_le_bytes());
        tokens.extend_from_slice(&anchor_col.to_le_bytes());
        let mut f = FormulaRecord::new(CellHeader::new(row, col, 15), Formula::new(tokens));
        f.set_shared_formula(true);
        f
    }

    #[test]
    fn shared_formula_is_written_after_its_first_cell_only() {
        let mut svm = SharedValueManager::create(vec![(shared(range(2, 4, 1, 1)), (2, 1))], vec![], vec![]).unwrap();
        svm.link_shared_formula((2, 1)).unwrap();
        svm.link_shared_formula((2, 1)).unwrap();
        assert_eq!(svm.group_size((2, 1)), 2);
        assert!(matches!(
            svm.record_for_first_cell(&exp_cell(2, 1, 2, 1)),
            Some(Record::SharedFormula(_))
        ));
        assert_eq!(svm.record_for_first_cell(&exp_cell(3, 1, 2, 1)), None);
    }

    #[test]
    fn first_cell_outside_the_range_is_rejected() {
        let err = SharedValueManager::create(vec![(shared(range(2, 4, 1, 1)), (9, 9))], vec![], vec![]);
        assert!(matches!(err, Err(XlsError::InvalidFormat(_))));
    }

    #[test]
    fn unknown_anchor_cannot_be_linked() {
        let mut svm = SharedValueManager::new();
        assert!(svm.link_shared_formula((0, 0)).is_err());
    }

    #[test]
    fn array_formula_removal_by_any_cell() {
        let mut svm = SharedValueManager::new();
        svm.add_array_record(ArrayRecord {
            range: range(0, 1, 0, 1),
            options: 0,
            reserved: 0,
            formula: Formula::default(),
        });
        assert!(svm.array_record(0, 0).is_some());
        assert!(svm.array_record(1, 1).is_none());
        assert_eq!(svm.remove_array_formula(1, 1).unwrap(), range(0, 1, 0, 1));
        assert!(matches!(svm.remove_array_formula(0, 0), Err(XlsError::InvalidArgument(_))));
    }
}
