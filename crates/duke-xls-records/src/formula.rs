//! Parsed-expression (`rgce`) storage and a token walker.
//!
//! Formula tokens are kept as raw bytes. The walker only understands token
//! sizes, which is enough to find and patch the extern-sheet index of 3-D
//! references and to read the anchor of `PtgExp` / `PtgTbl`.

use crate::error::{RecordError, RecordResult};
use crate::parser::{read_bytes, read_u16, write_u16};

pub const PTG_EXP: u8 = 0x01;
pub const PTG_TBL: u8 = 0x02;
pub const PTG_ERR: u8 = 0x1C;

/// `#REF!` error code as stored in a `PtgErr`.
pub const ERROR_REF: u8 = 0x17;

/// Token bytes plus any trailing data (array constants) that follows them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Formula {
    pub tokens: Vec<u8>,
    pub extra: Vec<u8>,
}

impl Formula {
    pub fn new(tokens: Vec<u8>) -> Self {
        Self {
            tokens,
            extra: Vec::new(),
        }
    }

    /// Read `cce` token bytes followed by `total_len - cce` bytes of extra data.
    pub fn read(data: &[u8], offset: &mut usize, cce: usize, total_len: usize) -> RecordResult<Self> {
        let tokens = read_bytes(data, offset, cce)?.to_vec();
        let extra_len = total_len.saturating_sub(cce);
        let extra = read_bytes(data, offset, extra_len)?.to_vec();
        Ok(Self { tokens, extra })
    }

    /// Read a `u16` token length followed by exactly that many token bytes.
    pub fn read_with_len(data: &[u8], offset: &mut usize) -> RecordResult<Self> {
        let cce = read_u16(data, offset)? as usize;
        Self::read(data, offset, cce, cce)
    }

    /// Write tokens then extra data; the caller writes `cce` where the record wants it.
    pub fn write_data(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tokens);
        out.extend_from_slice(&self.extra);
    }

    /// Write the `u16` token length, the tokens and the extra data.
    pub fn write_with_len(&self, out: &mut Vec<u8>) {
        write_u16(out, self.tokens.len() as u16);
        self.write_data(out);
    }

    pub fn encoded_size(&self) -> usize {
        self.tokens.len() + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Anchor cell of a `PtgExp` (shared/array formula) or `PtgTbl` first token.
    pub fn exp_reference(&self) -> Option<ExpReference> {
        let kind = *self.tokens.first()?;
        if kind != PTG_EXP && kind != PTG_TBL {
            return None;
        }
        if self.tokens.len() < 5 {
            return None;
        }
        Some(ExpReference {
            row: u16::from_le_bytes([self.tokens[1], self.tokens[2]]),
            col: u16::from_le_bytes([self.tokens[3], self.tokens[4]]),
            is_table: kind == PTG_TBL,
        })
    }

    /// Rewrite the extern-sheet index of every 3-D reference token.
    ///
    /// `map` receives the current index and returns the replacement, if any.
    /// Returns how many tokens were changed.
    pub fn remap_extern_sheet_indexes<F>(&mut self, map: F) -> RecordResult<usize>
    where
        F: FnMut(u16) -> Option<u16>,
    {
        remap_3d_refs(&mut self.tokens, map)
    }

    /// Cell formula for `(row, col)` from the tokens of a shared formula.
    ///
    /// Relative `PtgRefN` / `PtgAreaN` tokens become `PtgRef` / `PtgArea`
    /// with their offsets applied to the cell position.
    pub fn convert_shared(&self, row: u16, col: u16) -> RecordResult<Formula> {
        let mut tokens = self.tokens.clone();
        let mut pos = 0;
        while pos < tokens.len() {
            let size = token_size(&tokens, pos)?;
            match tokens[pos] {
                0x2C | 0x4C | 0x6C => {
                    tokens[pos] -= 0x08;
                    fix_relative_cell(&mut tokens[pos + 1..pos + 5], 0, 2, row, col);
                }
                0x2D | 0x4D | 0x6D => {
                    tokens[pos] -= 0x08;
                    fix_relative_cell(&mut tokens[pos + 1..pos + 9], 0, 4, row, col);
                    fix_relative_cell(&mut tokens[pos + 1..pos + 9], 2, 6, row, col);
                }
                _ => {}
            }
            pos += size;
        }
        Ok(Formula {
            tokens,
            extra: self.extra.clone(),
        })
    }

    /// Extern-sheet indexes of every 3-D reference token, in token order.
    pub fn extern_sheet_indexes(&self) -> RecordResult<Vec<u16>> {
        let mut found = Vec::new();
        let mut scratch = self.tokens.clone();
        remap_3d_refs(&mut scratch, |ix| {
            found.push(ix);
            None
        })?;
        Ok(found)
    }
}

/// Reference held by a `PtgExp` / `PtgTbl` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpReference {
    pub row: u16,
    pub col: u16,
    pub is_table: bool,
}

fn is_3d_ref(ptg: u8) -> bool {
    matches!(ptg, 0x3A | 0x5A | 0x7A | 0x3B | 0x5B | 0x7B | 0x3C | 0x5C | 0x7C | 0x3D | 0x5D | 0x7D)
}

/// Size in bytes of the token starting at `tokens[pos]` (including the ptg byte).
pub fn token_size(tokens: &[u8], pos: usize) -> RecordResult<usize> {
    let ptg = *tokens
        .get(pos)
        .ok_or_else(|| RecordError::Parse(format!("token offset {pos} out of range")))?;
    let at = |i: usize| -> RecordResult<u8> {
        tokens
            .get(pos + i)
            .copied()
            .ok_or_else(|| RecordError::Parse(format!("truncated ptg 0x{ptg:02X} at {pos}")))
    };
    let size = match ptg {
        // PtgExp / PtgTbl: [rw:u16][col:u16]
        0x01 | 0x02 => 5,
        // Operators, PtgParen, PtgMissArg
        0x03..=0x16 => 1,
        // PtgStr: [cch:u8][flags:u8][chars...]
        0x17 => {
            let cch = at(1)? as usize;
            let flags = at(2)?;
            3 + if flags & 0x01 != 0 { cch * 2 } else { cch }
        }
        // PtgExtend family: [etpg:u8] + payload
        0x18 | 0x38 | 0x58 | 0x78 => {
            if at(1)? == 0x19 {
                14
            } else {
                6
            }
        }
        // PtgAttr: [grbit:u8][wAttr:u16] (+ jump table for tAttrChoose)
        0x19 => {
            let grbit = at(1)?;
            let w_attr = u16::from_le_bytes([at(2)?, at(3)?]) as usize;
            if grbit & 0x04 != 0 {
                4 + (w_attr + 1) * 2
            } else {
                4
            }
        }
        // PtgErr / PtgBool
        0x1C | 0x1D => 2,
        // PtgInt
        0x1E => 3,
        // PtgNum
        0x1F => 9,
        // PtgArray
        0x20 | 0x40 | 0x60 => 8,
        // PtgFunc
        0x21 | 0x41 | 0x61 => 3,
        // PtgFuncVar
        0x22 | 0x42 | 0x62 => 4,
        // PtgName
        0x23 | 0x43 | 0x63 => 5,
        // PtgRef, PtgRefErr, PtgRefN
        0x24 | 0x44 | 0x64 | 0x2A | 0x4A | 0x6A | 0x2C | 0x4C | 0x6C => 5,
        // PtgArea, PtgAreaErr, PtgAreaN
        0x25 | 0x45 | 0x65 | 0x2B | 0x4B | 0x6B | 0x2D | 0x4D | 0x6D => 9,
        // PtgMem*: [reserved:u32][cce:u16], sub-expression follows as ordinary tokens
        0x26 | 0x46 | 0x66 | 0x27 | 0x47 | 0x67 | 0x28 | 0x48 | 0x68 => 7,
        // PtgMemFunc, PtgMemAreaN, PtgMemNoMemN: [cce:u16]
        0x29 | 0x49 | 0x69 | 0x2E | 0x4E | 0x6E | 0x2F | 0x4F | 0x6F => 3,
        // PtgNameX: [ixti:u16][nameindex:u16][reserved:u16]
        0x39 | 0x59 | 0x79 => 7,
        // PtgRef3d / PtgRefErr3d: [ixti:u16][row:u16][col:u16]
        0x3A | 0x5A | 0x7A | 0x3C | 0x5C | 0x7C => 7,
        // PtgArea3d / PtgAreaErr3d: [ixti:u16][row1][row2][col1][col2]
        0x3B | 0x5B | 0x7B | 0x3D | 0x5D | 0x7D => 11,
        other => {
            return Err(RecordError::Parse(format!(
                "unknown ptg 0x{other:02X} at offset {pos}"
            )))
        }
    };
    if pos + size > tokens.len() {
        return Err(RecordError::Parse(format!(
            "ptg 0x{ptg:02X} at {pos} needs {size} bytes, {} left",
            tokens.len() - pos
        )));
    }
    Ok(size)
}

fn remap_3d_refs<F>(tokens: &mut [u8], mut map: F) -> RecordResult<usize>
where
    F: FnMut(u16) -> Option<u16>,
{
    let mut pos = 0;
    let mut changed = 0;
    while pos < tokens.len() {
        let size = token_size(tokens, pos)?;
        if is_3d_ref(tokens[pos]) {
            let ixti = u16::from_le_bytes([tokens[pos + 1], tokens[pos + 2]]);
            if let Some(new_ixti) = map(ixti) {
                tokens[pos + 1..pos + 3].copy_from_slice(&new_ixti.to_le_bytes());
                changed += 1;
            }
        }
        pos += size;
    }
    Ok(changed)
}

const ROW_RELATIVE: u16 = 0x8000;
const COL_RELATIVE: u16 = 0x4000;

/// Apply a relative row/column pair stored at `row_at` / `col_at` of `body`.
fn fix_relative_cell(body: &mut [u8], row_at: usize, col_at: usize, row: u16, col: u16) {
    let col_field = u16::from_le_bytes([body[col_at], body[col_at + 1]]);
    if col_field & ROW_RELATIVE != 0 {
        let offset = u16::from_le_bytes([body[row_at], body[row_at + 1]]);
        body[row_at..row_at + 2].copy_from_slice(&row.wrapping_add(offset).to_le_bytes());
    }
    if col_field & COL_RELATIVE != 0 {
        let offset = col_field as u8 as i8;
        let new_col = (col as i32 + offset as i32) as u16 & 0x00FF;
        let fixed = (col_field & 0xC000) | new_col;
        body[col_at..col_at + 2].copy_from_slice(&fixed.to_le_bytes());
    }
}

/// `PtgErr(#REF!)`, the definition Excel stores for add-in function names.
pub fn ref_error_tokens() -> Vec<u8> {
    vec![PTG_ERR, ERROR_REF]
}

/// `PtgArea3d` covering the given absolute range.
pub fn area_3d_tokens(ixti: u16, first_row: u16, last_row: u16, first_col: u16, last_col: u16) -> Vec<u8> {
    let mut out = vec![0x3B];
    write_u16(&mut out, ixti);
    write_u16(&mut out, first_row);
    write_u16(&mut out, last_row);
    write_u16(&mut out, first_col & 0x3FFF);
    write_u16(&mut out, last_col & 0x3FFF);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn remap_touches_only_3d_tokens() {
        // PtgRef A1, PtgRef3d ixti=2, PtgArea3d ixti=5, PtgAdd
        let mut tokens = vec![0x24, 0, 0, 0, 0xC0];
        tokens.extend_from_slice(&[0x3A, 2, 0, 1, 0, 1, 0xC0]);
        tokens.extend(area_3d_tokens(5, 0, 9, 0, 3));
        tokens.push(0x03);
        let mut f = Formula::new(tokens);

        let changed = f
            .remap_extern_sheet_indexes(|ix| if ix == 5 { Some(7) } else { None })
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(f.extern_sheet_indexes().unwrap(), vec![2, 7]);
    }

    #[test]
    fn attr_choose_jump_table_is_skipped() {
        // tAttrChoose with 2 options carries (2 + 1) u16 offsets
        let tokens = vec![0x19, 0x04, 0x02, 0x00, 1, 0, 2, 0, 3, 0, 0x3A, 9, 0, 0, 0, 0, 0];
        let f = Formula::new(tokens);
        assert_eq!(f.extern_sheet_indexes().unwrap(), vec![9]);
    }

    #[test]
    fn exp_reference_reads_anchor() {
        let f = Formula::new(vec![PTG_EXP, 4, 0, 2, 0]);
        assert_eq!(
            f.exp_reference(),
            Some(ExpReference {
                row: 4,
                col: 2,
                is_table: false
            })
        );
        assert_eq!(Formula::new(vec![0x1E, 1, 0]).exp_reference(), None);
    }

    #[test]
    fn shared_formula_offsets_are_applied() {
        // PtgRefN one row up, same column (both relative), PtgAdd, PtgAreaN rows 0..+2 of column B absolute
        let mut tokens = vec![0x2C, 0xFF, 0xFF, 0x00, 0xC0];
        tokens.extend_from_slice(&[0x2D, 0, 0, 2, 0, 1, 0x80, 1, 0x80]);
        tokens.push(0x03);
        let shared = Formula::new(tokens);
        let f = shared.convert_shared(10, 3).unwrap();
        assert_eq!(&f.tokens[..5], &[0x24, 9, 0, 3, 0xC0]);
        assert_eq!(&f.tokens[5..14], &[0x25, 10, 0, 12, 0, 1, 0x80, 1, 0x80]);
        assert_eq!(f.tokens[14], 0x03);
    }

    #[test]
    fn unknown_ptg_is_an_error() {
        let mut f = Formula::new(vec![0xFF]);
        assert!(f.remap_extern_sheet_indexes(|_| None).is_err());
    }
}
