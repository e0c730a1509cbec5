//! Cell value records and the shared/array/table formula records.

use crate::error::RecordResult;
use crate::formula::Formula;
use crate::parser::*;
use crate::strings::{read_unicode_string, write_unicode_string};

/// Row, column and format shared by every cell record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CellHeader {
    pub row: u16,
    pub col: u16,
    pub xf_index: u16,
}

impl CellHeader {
    pub fn new(row: u16, col: u16, xf_index: u16) -> Self {
        Self { row, col, xf_index }
    }

    pub fn parse(data: &[u8], o: &mut usize) -> RecordResult<Self> {
        Ok(Self {
            row: read_u16(data, o)?,
            col: read_u16(data, o)?,
            xf_index: read_u16(data, o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.row);
        write_u16(out, self.col);
        write_u16(out, self.xf_index);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberRecord {
    pub cell: CellHeader,
    pub value: f64,
}

impl NumberRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            cell: CellHeader::parse(data, &mut o)?,
            value: read_f64(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.cell.write(out);
        write_f64(out, self.value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSstRecord {
    pub cell: CellHeader,
    pub sst_index: u32,
}

impl LabelSstRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            cell: CellHeader::parse(data, &mut o)?,
            sst_index: read_u32(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.cell.write(out);
        write_u32(out, self.sst_index);
    }
}

/// Inline string cell, converted to LABELSST when a workbook is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    pub cell: CellHeader,
    pub value: String,
}

impl LabelRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            cell: CellHeader::parse(data, &mut o)?,
            value: read_unicode_string(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.cell.write(out);
        write_unicode_string(out, &self.value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlankRecord {
    pub cell: CellHeader,
}

impl BlankRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        Ok(Self {
            cell: CellHeader::parse(data, &mut 0)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.cell.write(out);
    }
}

/// Boolean or error constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolErrRecord {
    pub cell: CellHeader,
    pub value: u8,
    pub is_error: bool,
}

impl BoolErrRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            cell: CellHeader::parse(data, &mut o)?,
            value: read_u8(data, &mut o)?,
            is_error: read_u8(data, &mut o)? != 0,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.cell.write(out);
        write_u8(out, self.value);
        write_u8(out, self.is_error as u8);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaRecord {
    pub cell: CellHeader,
    /// Cached result as stored (a double, or a tagged string/bool/error/empty).
    pub cached_result: [u8; 8],
    pub options: u16,
    pub reserved: u32,
    pub formula: Formula,
}

impl FormulaRecord {
    pub const ALWAYS_CALC: u16 = 0x0001;
    pub const CALC_ON_LOAD: u16 = 0x0002;
    pub const SHARED_FORMULA: u16 = 0x0008;

    pub fn new(cell: CellHeader, formula: Formula) -> Self {
        Self {
            cell,
            cached_result: [0; 8],
            options: 0,
            reserved: 0,
            formula,
        }
    }

    pub fn is_shared_formula(&self) -> bool {
        self.options & Self::SHARED_FORMULA != 0
    }

    pub fn set_shared_formula(&mut self, shared: bool) {
        super::sheet::set_bit(&mut self.options, Self::SHARED_FORMULA, shared);
    }

    /// Whether the cached result says a STRING record follows.
    pub fn has_cached_string(&self) -> bool {
        self.cached_result[6] == 0xFF && self.cached_result[7] == 0xFF && self.cached_result[0] == 0
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let cell = CellHeader::parse(data, &mut o)?;
        let mut cached_result = [0u8; 8];
        cached_result.copy_from_slice(read_bytes(data, &mut o, 8)?);
        let options = read_u16(data, &mut o)?;
        let reserved = read_u32(data, &mut o)?;
        let cce = read_u16(data, &mut o)? as usize;
        let total = data.len() - o;
        let formula = Formula::read(data, &mut o, cce, total)?;
        Ok(Self {
            cell,
            cached_result,
            options,
            reserved,
            formula,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.cell.write(out);
        out.extend_from_slice(&self.cached_result);
        write_u16(out, self.options);
        write_u32(out, self.reserved);
        write_u16(out, self.formula.tokens.len() as u16);
        self.formula.write_data(out);
    }
}

/// Cached string result of the preceding FORMULA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringRecord {
    pub value: String,
}

impl StringRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        Ok(Self {
            value: read_unicode_string(data, &mut 0)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_unicode_string(out, &self.value);
    }
}

/// Range covered by a shared/array/table record; columns are 8-bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CellRange8 {
    pub first_row: u16,
    pub last_row: u16,
    pub first_col: u8,
    pub last_col: u8,
}

impl CellRange8 {
    pub fn parse(data: &[u8], o: &mut usize) -> RecordResult<Self> {
        Ok(Self {
            first_row: read_u16(data, o)?,
            last_row: read_u16(data, o)?,
            first_col: read_u8(data, o)?,
            last_col: read_u8(data, o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.first_row);
        write_u16(out, self.last_row);
        write_u8(out, self.first_col);
        write_u8(out, self.last_col);
    }

    pub fn is_in_range(&self, row: u16, col: u16) -> bool {
        self.first_row <= row && row <= self.last_row && self.first_col as u16 <= col && col <= self.last_col as u16
    }

    pub fn is_first_cell(&self, row: u16, col: u16) -> bool {
        self.first_row == row && self.first_col as u16 == col
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFormulaRecord {
    pub range: CellRange8,
    pub reserved: u16,
    pub formula: Formula,
}

impl SharedFormulaRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let range = CellRange8::parse(data, &mut o)?;
        let reserved = read_u16(data, &mut o)?;
        let cce = read_u16(data, &mut o)? as usize;
        let total = data.len() - o;
        Ok(Self {
            range,
            reserved,
            formula: Formula::read(data, &mut o, cce, total)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.range.write(out);
        write_u16(out, self.reserved);
        write_u16(out, self.formula.tokens.len() as u16);
        self.formula.write_data(out);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayRecord {
    pub range: CellRange8,
    pub options: u16,
    pub reserved: u32,
    pub formula: Formula,
}

impl ArrayRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let range = CellRange8::parse(data, &mut o)?;
        let options = read_u16(data, &mut o)?;
        let reserved = read_u32(data, &mut o)?;
        let cce = read_u16(data, &mut o)? as usize;
        let total = data.len() - o;
        Ok(Self {
            range,
            options,
            reserved,
            formula: Formula::read(data, &mut o, cce, total)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.range.write(out);
        write_u16(out, self.options);
        write_u32(out, self.reserved);
        write_u16(out, self.formula.tokens.len() as u16);
        self.formula.write_data(out);
    }
}

/// What-if data table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRecord {
    pub range: CellRange8,
    pub flags: u8,
    pub reserved: u8,
    pub row_input_row: u16,
    pub col_input_row: u16,
    pub row_input_col: u16,
    pub col_input_col: u16,
}

impl TableRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            range: CellRange8::parse(data, &mut o)?,
            flags: read_u8(data, &mut o)?,
            reserved: read_u8(data, &mut o)?,
            row_input_row: read_u16(data, &mut o)?,
            col_input_row: read_u16(data, &mut o)?,
            row_input_col: read_u16(data, &mut o)?,
            col_input_col: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.range.write(out);
        write_u8(out, self.flags);
        write_u8(out, self.reserved);
        write_u16(out, self.row_input_row);
        write_u16(out, self.col_input_row);
        write_u16(out, self.row_input_col);
        write_u16(out, self.col_input_col);
    }
}

/// Expand a MULRK body into (header, value) pairs.
pub fn parse_mulrk(data: &[u8]) -> RecordResult<Vec<NumberRecord>> {
    let mut o = 0;
    let row = read_u16(data, &mut o)?;
    let first_col = read_u16(data, &mut o)?;
    let count = data.len().saturating_sub(6) / 6;
    let mut cells = Vec::with_capacity(count);
    for i in 0..count {
        let xf_index = read_u16(data, &mut o)?;
        let value = read_rk(data, &mut o)?;
        cells.push(NumberRecord {
            cell: CellHeader::new(row, first_col + i as u16, xf_index),
            value,
        });
    }
    Ok(cells)
}

/// Expand a MULBLANK body into BLANK cells.
pub fn parse_mulblank(data: &[u8]) -> RecordResult<Vec<BlankRecord>> {
    let mut o = 0;
    let row = read_u16(data, &mut o)?;
    let first_col = read_u16(data, &mut o)?;
    let count = data.len().saturating_sub(6) / 2;
    let mut cells = Vec::with_capacity(count);
    for i in 0..count {
        cells.push(BlankRecord {
            cell: CellHeader::new(row, first_col + i as u16, read_u16(data, &mut o)?),
        });
    }
    Ok(cells)
}

/// Read an RK cell as a NUMBER.
pub fn parse_rk(data: &[u8]) -> RecordResult<NumberRecord> {
    let mut o = 0;
    Ok(NumberRecord {
        cell: CellHeader::parse(data, &mut o)?,
        value: read_rk(data, &mut o)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mulrk_expands_columns() {
        // row 2, cols 1..=2, RK 1.0 (0x3FF00000) and integer 5
        let mut data = vec![2, 0, 1, 0];
        data.extend_from_slice(&[0x0F, 0]);
        data.extend_from_slice(&0x3FF0_0000u32.to_le_bytes());
        data.extend_from_slice(&[0x10, 0]);
        data.extend_from_slice(&((5u32 << 2) | 2).to_le_bytes());
        data.extend_from_slice(&[2, 0]);
        let cells = parse_mulrk(&data).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].cell, CellHeader::new(2, 1, 0x0F));
        assert_eq!(cells[0].value, 1.0);
        assert_eq!(cells[1].cell, CellHeader::new(2, 2, 0x10));
        assert_eq!(cells[1].value, 5.0);
    }

    #[test]
    fn mulblank_expands_columns() {
        let data = [4, 0, 3, 0, 0x0F, 0, 0x11, 0, 0x12, 0, 5, 0];
        let cells = parse_mulblank(&data).unwrap();
        let cols: Vec<(u16, u16)> = cells.iter().map(|b| (b.cell.col, b.cell.xf_index)).collect();
        assert_eq!(cols, vec![(3, 0x0F), (4, 0x11), (5, 0x12)]);
    }

    #[test]
    fn formula_keeps_extra_bytes() {
        let mut rec = FormulaRecord::new(CellHeader::new(0, 0, 15), Formula::new(vec![0x1E, 1, 0]));
        rec.formula.extra = vec![9, 9];
        rec.set_shared_formula(true);
        let mut buf = Vec::new();
        rec.write(&mut buf);
        let back = FormulaRecord::parse(&buf).unwrap();
        assert_eq!(back, rec);
        assert!(back.is_shared_formula());
    }

    #[test]
    fn shared_range_checks() {
        let range = CellRange8 {
            first_row: 1,
            last_row: 4,
            first_col: 2,
            last_col: 2,
        };
        assert!(range.is_in_range(3, 2));
        assert!(!range.is_in_range(5, 2));
        assert!(range.is_first_cell(1, 2));
    }
}
