//! ROW records and the cells under them, written in blocks of 32 rows each
//! closed by a DBCELL.

use std::collections::BTreeMap;

use duke_xls_records::record::{DbCellRecord, IndexRecord, LabelRecord, LabelSstRecord, RowRecord};
use duke_xls_records::{sid, Record};

use crate::error::{XlsError, XlsResult};
use crate::sheet::shared_values::SharedValueManager;
use crate::sheet::values::{CellValue, FormulaCell, ValueRecordsAggregate};
use crate::sheet::RecordAggregate;
use crate::stream::RecordStream;

/// Rows per DBCELL block.
pub const ROWS_PER_BLOCK: usize = 32;

/// Encoded size of a ROW record, header included.
const ROW_RECORD_SIZE: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct RowRecordsAggregate {
    rows: BTreeMap<u16, RowRecord>,
    values: ValueRecordsAggregate,
    shared_values: SharedValueManager,
    /// Records of unknown type found among the rows, written after the last
    /// block.
    unknown: Vec<Record>,
}

impl RowRecordsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the plain records of a row block.
    pub fn read(rs: &mut RecordStream, shared_values: SharedValueManager) -> XlsResult<Self> {
        let mut agg = Self {
            shared_values,
            ..Self::default()
        };
        while rs.has_next() {
            let record = rs.next()?;
            match record {
                Record::Row(row) => agg.insert_row(row),
                // regenerated on write
                Record::DbCell(_) => {}
                Record::Unknown { .. } => {
                    agg.unknown.push(record);
                    while rs.peek_next_sid() == Some(sid::CONTINUE) {
                        agg.unknown.push(rs.next()?);
                    }
                }
                Record::Formula(f) => {
                    let cached = match rs.peek() {
                        Some(Record::StringValue(_)) => match rs.next()? {
                            Record::StringValue(s) => Some(s),
                            _ => None,
                        },
                        _ => None,
                    };
                    let mut cell = FormulaCell::new(f, cached)?;
                    agg.link_formula(&mut cell)?;
                    agg.values.insert_cell(CellValue::Formula(cell));
                }
                r if r.is_value_record() => {
                    agg.values.insert_cell(CellValue::Value(r));
                }
                other => {
                    log::warn!("unexpected {} among row records, keeping it", other.name());
                    agg.unknown.push(other);
                }
            }
        }

        let missing: Vec<u16> = agg
            .values
            .iter()
            .map(CellValue::row)
            .filter(|r| !agg.rows.contains_key(r))
            .collect();
        if !missing.is_empty() {
            log::warn!("{} cells have no ROW record, creating rows", missing.len());
            for row in missing {
                agg.rows.entry(row).or_insert_with(|| RowRecord::new(row));
            }
        }
        log::debug!("read {} rows, {} cells", agg.rows.len(), agg.values.len());
        Ok(agg)
    }

    fn link_formula(&mut self, cell: &mut FormulaCell) -> XlsResult<()> {
        if !cell.record.is_shared_formula() {
            return Ok(());
        }
        match cell.record.formula.exp_reference() {
            Some(exp) if !exp.is_table => {
                self.shared_values.link_shared_formula((exp.row, exp.col))?;
            }
            Some(_) => {}
            // flag set on an ordinary formula
            None => cell.record.set_shared_formula(false),
        }
        Ok(())
    }

    // ── Rows ────────────────────────────────────────────────────────────

    pub fn insert_row(&mut self, row: RowRecord) {
        self.rows.insert(row.row_number, row);
    }

    /// Remove a row and every cell in it.
    pub fn remove_row(&mut self, row_number: u16) -> XlsResult<RowRecord> {
        let cols: Vec<u16> = self.values.cells_in_row(row_number).map(CellValue::col).collect();
        for col in cols {
            self.remove_cell(row_number, col)?;
        }
        self.rows
            .remove(&row_number)
            .ok_or_else(|| XlsError::argument(format!("invalid row index ({row_number})")))
    }

    pub fn row(&self, row_number: u16) -> Option<&RowRecord> {
        self.rows.get(&row_number)
    }

    pub fn row_mut(&mut self, row_number: u16) -> Option<&mut RowRecord> {
        self.rows.get_mut(&row_number)
    }

    pub fn rows(&self) -> impl Iterator<Item = &RowRecord> {
        self.rows.values()
    }

    pub fn physical_num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn first_row_num(&self) -> Option<u16> {
        self.rows.keys().next().copied()
    }

    pub fn last_row_num(&self) -> Option<u16> {
        self.rows.keys().next_back().copied()
    }

    // ── Cells ───────────────────────────────────────────────────────────

    pub fn values(&self) -> &ValueRecordsAggregate {
        &self.values
    }

    pub fn shared_values(&self) -> &SharedValueManager {
        &self.shared_values
    }

    pub fn shared_values_mut(&mut self) -> &mut SharedValueManager {
        &mut self.shared_values
    }

    /// Add or replace a cell. A ROW record is created for it when missing
    /// and the row's column extent is widened.
    pub fn insert_cell(&mut self, mut cell: CellValue) -> XlsResult<()> {
        let (row, col) = (cell.row(), cell.col());
        if self.values.cell(row, col).is_some() {
            self.remove_cell(row, col)?;
        }
        if let CellValue::Formula(f) = &mut cell {
            self.link_formula(f)?;
        }
        let row_record = self.rows.entry(row).or_insert_with(|| RowRecord::new(row));
        if row_record.is_empty() {
            row_record.first_col = col;
            row_record.last_col = col.saturating_add(1);
        } else {
            row_record.first_col = row_record.first_col.min(col);
            row_record.last_col = row_record.last_col.max(col.saturating_add(1));
        }
        self.values.insert_cell(cell);
        Ok(())
    }

    /// Remove a cell. Removing any member of a shared formula turns every
    /// other member into a standalone formula.
    pub fn remove_cell(&mut self, row: u16, col: u16) -> XlsResult<Option<CellValue>> {
        let Some(removed) = self.values.remove_cell(row, col) else {
            return Ok(None);
        };
        if let Some(anchor) = removed.as_formula().and_then(FormulaCell::shared_anchor) {
            self.unlink_shared_formula(anchor)?;
        }
        Ok(Some(removed))
    }

    fn unlink_shared_formula(&mut self, anchor: (u16, u16)) -> XlsResult<()> {
        let Some(shared) = self.shared_values.unlink(anchor) else {
            return Ok(());
        };
        for (row, col) in self.values.shared_members(anchor) {
            if let Some(CellValue::Formula(f)) = self.values.cell_mut(row, col) {
                f.record.formula = shared.formula.convert_shared(row, col)?;
                f.record.set_shared_formula(false);
            }
        }
        Ok(())
    }

    /// Replace LABEL cells by LABELSST through `intern`, which returns the
    /// string's SST index.
    pub fn convert_labels(&mut self, mut intern: impl FnMut(&LabelRecord) -> u32) -> usize {
        let mut converted = 0;
        for cell in self.values.iter_mut() {
            if let CellValue::Value(Record::Label(label)) = cell {
                let sst_index = intern(label);
                *cell = CellValue::Value(Record::LabelSst(LabelSstRecord {
                    cell: label.cell,
                    sst_index,
                }));
                converted += 1;
            }
        }
        converted
    }

    /// Recompute every row's column extent from its cells.
    pub fn refresh_row_extents(&mut self) {
        for (row, record) in self.rows.iter_mut() {
            match self.values.column_extent(*row) {
                Some((first, last)) => {
                    record.first_col = first;
                    record.last_col = last;
                }
                None => record.set_empty(),
            }
        }
    }

    /// Used range: (first row, last row + 1, first col, last col + 1).
    pub fn extent(&self) -> Option<(u32, u32, u16, u16)> {
        let first_row = self.first_row_num()?;
        let last_row = self.last_row_num()?;
        let mut cols = self.values.iter().map(CellValue::col);
        let (first_col, last_col) = match cols.next() {
            Some(c) => cols.fold((c, c), |(lo, hi), c| (lo.min(c), hi.max(c))),
            None => (0, 0),
        };
        let last_col = if self.values.is_empty() { 0 } else { last_col + 1 };
        Some((first_row as u32, last_row as u32 + 1, first_col, last_col))
    }

    // ── Serialization ───────────────────────────────────────────────────

    pub fn block_count(&self) -> usize {
        (self.rows.len() + ROWS_PER_BLOCK - 1) / ROWS_PER_BLOCK
    }

    /// INDEX record for a sheet whose INDEX starts at stream position
    /// `index_offset`, with `initial_size` bytes between the INDEX and the
    /// first ROW.
    pub fn create_index_record(&self, index_offset: usize, initial_size: usize) -> IndexRecord {
        let blocks = self.block_count();
        let mut pos = index_offset + 4 + IndexRecord::data_size_for(blocks) + initial_size;
        let mut dbcells = Vec::with_capacity(blocks);
        self.visit_records(&mut |r| {
            if r.sid() == sid::DBCELL {
                dbcells.push(pos as u32);
            }
            pos += r.record_size();
        });
        IndexRecord {
            first_row: self.first_row_num().map_or(0, u32::from),
            last_row_add1: self.last_row_num().map_or(0, |r| r as u32 + 1),
            dbcells,
        }
    }
}

impl RecordAggregate for RowRecordsAggregate {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        let row_numbers: Vec<u16> = self.rows.keys().copied().collect();
        for block in row_numbers.chunks(ROWS_PER_BLOCK) {
            let (Some(&start), Some(&end)) = (block.first(), block.last()) else {
                continue;
            };
            for row in block {
                if let Some(r) = self.rows.get(row) {
                    visitor(&Record::Row(*r));
                }
            }
            let row_block_size = block.len() * ROW_RECORD_SIZE;
            let mut pos = row_block_size;
            // the first offset runs from the second ROW to the first cell
            let mut cell_ref_offset = row_block_size - ROW_RECORD_SIZE;
            let mut cell_offsets = Vec::new();
            for row in self.values.rows_with_cells(start, end) {
                let mut row_cell_size = 0;
                self.values.visit_cells_for_row(row, &self.shared_values, &mut |r| {
                    row_cell_size += r.record_size();
                    visitor(r);
                });
                pos += row_cell_size;
                cell_offsets.push(cell_ref_offset as u16);
                cell_ref_offset = row_cell_size;
            }
            visitor(&Record::DbCell(DbCellRecord {
                row_offset: pos as u32,
                cell_offsets,
            }));
        }
        self.unknown.iter().for_each(|r| visitor(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::formula::{Formula, PTG_EXP};
    use duke_xls_records::record::{CellHeader, CellRange8, FormulaRecord, NumberRecord, SharedFormulaRecord};
    use pretty_assertions::assert_eq;

    fn number(row: u16, col: u16) -> CellValue {
        CellValue::Value(Record::Number(NumberRecord {
            cell: CellHeader::new(row, col, 15),
            value: 1.0,
        }))
    }

    fn sids(agg: &RowRecordsAggregate) -> Vec<u16> {
        let mut out = Vec::new();
        agg.visit_records(&mut |r| out.push(r.sid()));
        out
    }

    #[test]
    fn cells_follow_their_row_block_and_dbcell_closes_it() {
        let mut agg = RowRecordsAggregate::new();
        agg.insert_cell(number(0, 0)).unwrap();
        agg.insert_cell(number(0, 3)).unwrap();
        agg.insert_cell(number(1, 1)).unwrap();
        assert_eq!(
            sids(&agg),
            vec![sid::ROW, sid::ROW, sid::NUMBER, sid::NUMBER, sid::NUMBER, sid::DBCELL]
        );
        let row = agg.row(0).unwrap();
        assert_eq!((row.first_col, row.last_col), (0, 4));

        let mut dbcell = None;
        agg.visit_records(&mut |r| {
            if let Record::DbCell(d) = r {
                dbcell = Some(d.clone());
            }
        });
        let dbcell = dbcell.unwrap();
        // two ROWs and three 18-byte NUMBERs
        assert_eq!(dbcell.row_offset, 2 * 20 + 3 * 18);
        assert_eq!(dbcell.cell_offsets, vec![20, 36]);
    }

    #[test]
    fn thirty_three_rows_make_two_blocks() {
        let mut agg = RowRecordsAggregate::new();
        for r in 0..33 {
            agg.insert_row(RowRecord::new(r));
        }
        assert_eq!(agg.block_count(), 2);
        let dbcells = sids(&agg).iter().filter(|&&s| s == sid::DBCELL).count();
        assert_eq!(dbcells, 2);
    }

    #[test]
    fn index_points_at_each_dbcell() {
        let mut agg = RowRecordsAggregate::new();
        for r in 0..40 {
            agg.insert_cell(number(r, 0)).unwrap();
        }
        let index = agg.create_index_record(100, 50);
        assert_eq!(index.first_row, 0);
        assert_eq!(index.last_row_add1, 40);
        let index_size = 4 + IndexRecord::data_size_for(2);
        let first_dbcell = 100 + index_size + 50 + 32 * 20 + 32 * 18;
        assert_eq!(index.dbcells[0] as usize, first_dbcell);
        let first_dbcell_size = 4 + DbCellRecord::data_size_for(32);
        assert_eq!(
            index.dbcells[1] as usize,
            first_dbcell + first_dbcell_size + 8 * 20 + 8 * 18
        );
    }

    #[test]
    fn removing_a_missing_row_is_an_argument_error() {
        let mut agg = RowRecordsAggregate::new();
        assert!(matches!(agg.remove_row(3), Err(XlsError::InvalidArgument(_))));
    }

    #[test]
    fn removing_a_shared_formula_member_unlinks_the_group() {
        let shared = SharedFormulaRecord {
            range: CellRange8 {
                first_row: 0,
                last_row: 1,
                first_col: 0,
                last_col: 0,
            },
            reserved: 0,
            // PtgRefN: one column to the right, same row
            formula: Formula::new(vec![0x2C, 0, 0, 1, 0xC0]),
        };
        let svm = SharedValueManager::create(vec![(shared, (0, 0))], vec![], vec![]).unwrap();
        let exp = |row: u16| {
            let mut f = FormulaRecord::new(CellHeader::new(row, 0, 15), Formula::new(vec![PTG_EXP, 0, 0, 0, 0]));
            f.set_shared_formula(true);
            Record::Formula(f)
        };
        let mut rs = RecordStream::new(vec![Record::Row(RowRecord::new(0)), exp(0), Record::Row(RowRecord::new(1)), exp(1)]);
        let mut agg = RowRecordsAggregate::read(&mut rs, svm).unwrap();
        assert_eq!(agg.shared_values().group_size((0, 0)), 2);

        agg.remove_cell(0, 0).unwrap();
        assert!(agg.shared_values().shared_formula((0, 0)).is_none());
        let remaining = agg.values().cell(1, 0).and_then(CellValue::as_formula).unwrap();
        assert!(!remaining.record.is_shared_formula());
        assert_eq!(remaining.record.formula.tokens, vec![0x24, 1, 0, 1, 0xC0]);
    }

    #[test]
    fn labels_become_sst_references() {
        let mut agg = RowRecordsAggregate::new();
        agg.insert_cell(CellValue::Value(Record::Label(LabelRecord {
            cell: CellHeader::new(2, 2, 15),
            value: "hi".into(),
        })))
        .unwrap();
        assert_eq!(agg.convert_labels(|_| 7), 1);
        assert!(matches!(
            agg.values().cell(2, 2),
            Some(CellValue::Value(Record::LabelSst(LabelSstRecord { sst_index: 7, .. })))
        ));
    }
}
