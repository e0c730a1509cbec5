//! Splits a sheet's row block into plain row/cell records and the records
//! that need to be set aside first.

use duke_xls_records::record::{ArrayRecord, MergeCellsRecord, SharedFormulaRecord, TableRecord};
use duke_xls_records::{sid, Record};

use crate::error::{XlsError, XlsResult};
use crate::orderer::is_end_of_row_block;
use crate::sheet::shared_values::SharedValueManager;
use crate::stream::RecordStream;

/// Contents of one row block once SHRFMLA, ARRAY, TABLE and MERGECELLS
/// records have been pulled out.
#[derive(Debug)]
pub struct RowBlocksReader {
    plain: Vec<Record>,
    shared_values: SharedValueManager,
    loose_merged_cells: Vec<MergeCellsRecord>,
}

fn expected(what: &str, record: &Record) -> XlsError {
    XlsError::format(format!("malformed {what} record in row block ({})", record.name()))
}

impl RowBlocksReader {
    /// Read up to the first record that ends the row block.
    pub fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        let mut plain = Vec::new();
        let mut shared: Vec<(SharedFormulaRecord, (u16, u16))> = Vec::new();
        let mut arrays: Vec<ArrayRecord> = Vec::new();
        let mut tables: Vec<TableRecord> = Vec::new();
        let mut loose_merged_cells = Vec::new();
        let mut prev_formula_cell: Option<(u16, u16)> = None;

        loop {
            let Some(next) = rs.peek_next_sid() else {
                return Err(XlsError::format("failed to find end of row/cell records"));
            };
            if is_end_of_row_block(next)? {
                break;
            }
            let record = rs.next()?;
            let formula_cell = match &record {
                Record::Formula(f) => Some((f.cell.row, f.cell.col)),
                _ => None,
            };
            match record.sid() {
                sid::MERGECELLS => match record {
                    Record::MergeCells(m) => loose_merged_cells.push(m),
                    other => return Err(expected("MERGECELLS", &other)),
                },
                sid::SHRFMLA => {
                    // the anchor is the formula the SHRFMLA follows
                    let Some(first_cell) = prev_formula_cell else {
                        return Err(XlsError::format("shared formula record should follow a FORMULA record"));
                    };
                    match record {
                        Record::SharedFormula(s) => shared.push((s, first_cell)),
                        other => return Err(expected("SHRFMLA", &other)),
                    }
                }
                sid::ARRAY => match record {
                    Record::Array(a) => arrays.push(a),
                    other => return Err(expected("ARRAY", &other)),
                },
                sid::TABLE => match record {
                    Record::Table(t) => tables.push(t),
                    other => return Err(expected("TABLE", &other)),
                },
                _ => plain.push(record),
            }
            prev_formula_cell = formula_cell;
        }

        log::trace!(
            "row block: {} records, {} shared formulas, {} arrays, {} tables",
            plain.len(),
            shared.len(),
            arrays.len(),
            tables.len()
        );
        let shared_values = SharedValueManager::create(shared, arrays, tables)?;
        Ok(Self {
            plain,
            shared_values,
            loose_merged_cells,
        })
    }

    /// MERGECELLS records found among the rows; some producers put them there.
    pub fn loose_merged_cells(&self) -> &[MergeCellsRecord] {
        &self.loose_merged_cells
    }

    pub fn into_parts(self) -> (RecordStream, SharedValueManager, Vec<MergeCellsRecord>) {
        (RecordStream::new(self.plain), self.shared_values, self.loose_merged_cells)
    }
}
