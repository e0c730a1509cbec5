//! Worksheet structure records: row blocks, columns, page setup, view.

use crate::error::{RecordError, RecordResult};
use crate::parser::*;
use crate::sid;
use crate::strings::{read_unicode_string, write_unicode_string};

/// Offsets of the DBCELL records of each row block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRecord {
    pub first_row: u32,
    /// One past the last row.
    pub last_row_add1: u32,
    pub dbcells: Vec<u32>,
}

impl IndexRecord {
    /// Body size for `blocks` DBCELL offsets.
    pub fn data_size_for(blocks: usize) -> usize {
        16 + 4 * blocks
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let _reserved = read_u32(data, &mut o)?;
        let first_row = read_u32(data, &mut o)?;
        let last_row_add1 = read_u32(data, &mut o)?;
        let _reserved = read_u32(data, &mut o)?;
        let mut dbcells = Vec::with_capacity((data.len() - o) / 4);
        while o + 4 <= data.len() {
            dbcells.push(read_u32(data, &mut o)?);
        }
        Ok(Self {
            first_row,
            last_row_add1,
            dbcells,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u32(out, 0);
        write_u32(out, self.first_row);
        write_u32(out, self.last_row_add1);
        write_u32(out, 0);
        for &offset in &self.dbcells {
            write_u32(out, offset);
        }
    }
}

/// Used cell range; last row and column are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimensionsRecord {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u16,
    pub last_col: u16,
}

impl DimensionsRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let record = Self {
            first_row: read_u32(data, &mut o)?,
            last_row: read_u32(data, &mut o)?,
            first_col: read_u16(data, &mut o)?,
            last_col: read_u16(data, &mut o)?,
        };
        let _reserved = read_u16(data, &mut o)?;
        Ok(record)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u32(out, self.first_row);
        write_u32(out, self.last_row);
        write_u16(out, self.first_col);
        write_u16(out, self.last_col);
        write_u16(out, 0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRecord {
    pub row_number: u16,
    pub first_col: u16,
    /// One past the last column with a cell.
    pub last_col: u16,
    pub height: u16,
    pub optimize: u16,
    pub reserved: u16,
    pub options: u16,
    pub xf_options: u16,
}

impl RowRecord {
    pub const MAX_ROW_NUMBER: u32 = 65535;

    const OUTLINE_LEVEL_MASK: u16 = 0x0007;
    const COLLAPSED: u16 = 0x0010;
    const ZERO_HEIGHT: u16 = 0x0020;
    const FORMATTED: u16 = 0x0080;
    const ALWAYS_SET: u16 = 0x0100;
    const XF_INDEX_MASK: u16 = 0x0FFF;

    pub fn new(row_number: u16) -> Self {
        Self {
            row_number,
            first_col: 0,
            last_col: 0,
            height: 0x00FF,
            optimize: 0,
            reserved: 0,
            options: Self::ALWAYS_SET,
            xf_options: 0x000F,
        }
    }

    /// No cells in the row.
    pub fn is_empty(&self) -> bool {
        self.first_col == 0 && self.last_col == 0
    }

    pub fn set_empty(&mut self) {
        self.first_col = 0;
        self.last_col = 0;
    }

    pub fn outline_level(&self) -> u16 {
        self.options & Self::OUTLINE_LEVEL_MASK
    }

    pub fn set_outline_level(&mut self, level: u16) {
        self.options = (self.options & !Self::OUTLINE_LEVEL_MASK) | (level & Self::OUTLINE_LEVEL_MASK);
    }

    pub fn is_collapsed(&self) -> bool {
        self.options & Self::COLLAPSED != 0
    }

    pub fn set_collapsed(&mut self, collapsed: bool) {
        set_bit(&mut self.options, Self::COLLAPSED, collapsed);
    }

    pub fn is_zero_height(&self) -> bool {
        self.options & Self::ZERO_HEIGHT != 0
    }

    pub fn set_zero_height(&mut self, hidden: bool) {
        set_bit(&mut self.options, Self::ZERO_HEIGHT, hidden);
    }

    pub fn is_formatted(&self) -> bool {
        self.options & Self::FORMATTED != 0
    }

    pub fn set_formatted(&mut self, formatted: bool) {
        set_bit(&mut self.options, Self::FORMATTED, formatted);
    }

    pub fn xf_index(&self) -> u16 {
        self.xf_options & Self::XF_INDEX_MASK
    }

    pub fn set_xf_index(&mut self, xf: u16) {
        self.xf_options = (self.xf_options & !Self::XF_INDEX_MASK) | (xf & Self::XF_INDEX_MASK);
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            row_number: read_u16(data, &mut o)?,
            first_col: read_u16(data, &mut o)?,
            last_col: read_u16(data, &mut o)?,
            height: read_u16(data, &mut o)?,
            optimize: read_u16(data, &mut o)?,
            reserved: read_u16(data, &mut o)?,
            options: read_u16(data, &mut o)?,
            xf_options: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        for v in [
            self.row_number,
            self.first_col,
            self.last_col,
            self.height,
            self.optimize,
            self.reserved,
            self.options,
            self.xf_options,
        ] {
            write_u16(out, v);
        }
    }
}

pub(crate) fn set_bit(field: &mut u16, mask: u16, on: bool) {
    if on {
        *field |= mask;
    } else {
        *field &= !mask;
    }
}

/// Stream offsets of the first ROW of a block and of each row's first cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbCellRecord {
    /// Distance from this record back to the block's first ROW.
    pub row_offset: u32,
    pub cell_offsets: Vec<u16>,
}

impl DbCellRecord {
    pub fn data_size_for(rows: usize) -> usize {
        4 + 2 * rows
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let row_offset = read_u32(data, &mut o)?;
        let mut cell_offsets = Vec::new();
        while o + 2 <= data.len() {
            cell_offsets.push(read_u16(data, &mut o)?);
        }
        Ok(Self {
            row_offset,
            cell_offsets,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u32(out, self.row_offset);
        for &offset in &self.cell_offsets {
            write_u16(out, offset);
        }
    }
}

/// Width and format of a column range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfoRecord {
    pub first_col: u16,
    pub last_col: u16,
    /// In 1/256 of a character width.
    pub col_width: u16,
    pub xf_index: u16,
    pub options: u16,
    pub reserved: u16,
    /// Trailing bytes as stored (0, 1 or 2).
    reserved_len: u8,
}

impl Default for ColumnInfoRecord {
    fn default() -> Self {
        Self {
            first_col: 0,
            last_col: 0,
            col_width: 2275,
            xf_index: 0x0F,
            options: 2,
            reserved: 2,
            reserved_len: 2,
        }
    }
}

impl ColumnInfoRecord {
    const HIDDEN: u16 = 0x0001;
    const OUTLINE_MASK: u16 = 0x0700;
    const COLLAPSED: u16 = 0x1000;

    pub fn new(first_col: u16, last_col: u16) -> Self {
        Self {
            first_col,
            last_col,
            ..Self::default()
        }
    }

    pub fn contains_column(&self, col: u16) -> bool {
        self.first_col <= col && col <= self.last_col
    }

    pub fn is_adjacent_before(&self, other: &ColumnInfoRecord) -> bool {
        self.last_col as u32 + 1 == other.first_col as u32
    }

    /// Same settings other than the column range.
    pub fn format_matches(&self, other: &ColumnInfoRecord) -> bool {
        self.xf_index == other.xf_index && self.options == other.options && self.col_width == other.col_width
    }

    pub fn is_hidden(&self) -> bool {
        self.options & Self::HIDDEN != 0
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        set_bit(&mut self.options, Self::HIDDEN, hidden);
    }

    pub fn outline_level(&self) -> u16 {
        (self.options & Self::OUTLINE_MASK) >> 8
    }

    pub fn set_outline_level(&mut self, level: u16) {
        self.options = (self.options & !Self::OUTLINE_MASK) | ((level << 8) & Self::OUTLINE_MASK);
    }

    pub fn is_collapsed(&self) -> bool {
        self.options & Self::COLLAPSED != 0
    }

    pub fn set_collapsed(&mut self, collapsed: bool) {
        set_bit(&mut self.options, Self::COLLAPSED, collapsed);
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let mut record = Self {
            first_col: read_u16(data, &mut o)?,
            last_col: read_u16(data, &mut o)?,
            col_width: read_u16(data, &mut o)?,
            xf_index: read_u16(data, &mut o)?,
            options: read_u16(data, &mut o)?,
            reserved: 0,
            reserved_len: 0,
        };
        match data.len() - o {
            0 => {}
            1 => {
                record.reserved = read_u8(data, &mut o)? as u16;
                record.reserved_len = 1;
            }
            2 => {
                record.reserved = read_u16(data, &mut o)?;
                record.reserved_len = 2;
            }
            n => {
                return Err(RecordError::InvalidFormat(format!(
                    "COLINFO has {n} unexpected trailing bytes"
                )))
            }
        }
        Ok(record)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.first_col);
        write_u16(out, self.last_col);
        write_u16(out, self.col_width);
        write_u16(out, self.xf_index);
        write_u16(out, self.options);
        match self.reserved_len {
            0 => {}
            1 => write_u8(out, self.reserved as u8),
            _ => write_u16(out, self.reserved),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRowHeightRecord {
    pub options: u16,
    /// In twips.
    pub row_height: u16,
}

impl Default for DefaultRowHeightRecord {
    fn default() -> Self {
        Self {
            options: 0,
            row_height: 0x00FF,
        }
    }
}

impl DefaultRowHeightRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            options: read_u16(data, &mut o)?,
            row_height: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.options);
        write_u16(out, self.row_height);
    }
}

/// Outline gutter sizes and levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GutsRecord {
    pub left_row_gutter: u16,
    pub top_col_gutter: u16,
    pub row_level_max: u16,
    pub col_level_max: u16,
}

impl GutsRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            left_row_gutter: read_u16(data, &mut o)?,
            top_col_gutter: read_u16(data, &mut o)?,
            row_level_max: read_u16(data, &mut o)?,
            col_level_max: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.left_row_gutter);
        write_u16(out, self.top_col_gutter);
        write_u16(out, self.row_level_max);
        write_u16(out, self.col_level_max);
    }
}

/// A manual break before row (or column) `main`, spanning `sub_from..=sub_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBreak {
    pub main: u16,
    pub sub_from: u16,
    pub sub_to: u16,
}

/// HORIZONTALPAGEBREAKS (row breaks) or VERTICALPAGEBREAKS (column breaks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBreakRecord {
    pub sid: u16,
    breaks: Vec<PageBreak>,
}

impl PageBreakRecord {
    pub fn horizontal() -> Self {
        Self {
            sid: sid::HORIZONTALPAGEBREAKS,
            breaks: Vec::new(),
        }
    }

    pub fn vertical() -> Self {
        Self {
            sid: sid::VERTICALPAGEBREAKS,
            breaks: Vec::new(),
        }
    }

    pub fn breaks(&self) -> &[PageBreak] {
        &self.breaks
    }

    pub fn num_breaks(&self) -> usize {
        self.breaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breaks.is_empty()
    }

    pub fn get_break(&self, main: u16) -> Option<&PageBreak> {
        self.breaks.iter().find(|b| b.main == main)
    }

    /// Add a break, replacing any existing break at `main`.
    pub fn add_break(&mut self, main: u16, sub_from: u16, sub_to: u16) {
        let brk = PageBreak { main, sub_from, sub_to };
        match self.breaks.iter_mut().find(|b| b.main == main) {
            Some(existing) => *existing = brk,
            None => self.breaks.push(brk),
        }
    }

    pub fn remove_break(&mut self, main: u16) -> bool {
        let before = self.breaks.len();
        self.breaks.retain(|b| b.main != main);
        self.breaks.len() != before
    }

    pub fn parse(record_sid: u16, data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let count = read_u16(data, &mut o)?;
        let mut breaks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            breaks.push(PageBreak {
                main: read_u16(data, &mut o)?,
                sub_from: read_u16(data, &mut o)?,
                sub_to: read_u16(data, &mut o)?,
            });
        }
        Ok(Self {
            sid: record_sid,
            breaks,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.breaks.len() as u16);
        for b in &self.breaks {
            write_u16(out, b.main);
            write_u16(out, b.sub_from);
            write_u16(out, b.sub_to);
        }
    }
}

/// HEADER or FOOTER text; an empty text writes an empty body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFooterRecord {
    pub sid: u16,
    pub text: String,
}

impl HeaderFooterRecord {
    pub fn header(text: &str) -> Self {
        Self {
            sid: sid::HEADER,
            text: text.to_string(),
        }
    }

    pub fn footer(text: &str) -> Self {
        Self {
            sid: sid::FOOTER,
            text: text.to_string(),
        }
    }

    pub fn parse(record_sid: u16, data: &[u8]) -> RecordResult<Self> {
        let text = if data.is_empty() {
            String::new()
        } else {
            read_unicode_string(data, &mut 0)?
        };
        Ok(Self { sid: record_sid, text })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        if !self.text.is_empty() {
            write_unicode_string(out, &self.text);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintSetupRecord {
    pub paper_size: u16,
    pub scale: u16,
    pub page_start: u16,
    pub fit_width: u16,
    pub fit_height: u16,
    pub options: u16,
    pub h_resolution: u16,
    pub v_resolution: u16,
    pub header_margin: f64,
    pub footer_margin: f64,
    pub copies: u16,
}

impl Default for PrintSetupRecord {
    fn default() -> Self {
        Self {
            paper_size: 1,
            scale: 100,
            page_start: 1,
            fit_width: 1,
            fit_height: 1,
            options: 2,
            h_resolution: 300,
            v_resolution: 300,
            header_margin: 0.5,
            footer_margin: 0.5,
            copies: 1,
        }
    }
}

impl PrintSetupRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            paper_size: read_u16(data, &mut o)?,
            scale: read_u16(data, &mut o)?,
            page_start: read_u16(data, &mut o)?,
            fit_width: read_u16(data, &mut o)?,
            fit_height: read_u16(data, &mut o)?,
            options: read_u16(data, &mut o)?,
            h_resolution: read_u16(data, &mut o)?,
            v_resolution: read_u16(data, &mut o)?,
            header_margin: read_f64(data, &mut o)?,
            footer_margin: read_f64(data, &mut o)?,
            copies: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        for v in [
            self.paper_size,
            self.scale,
            self.page_start,
            self.fit_width,
            self.fit_height,
            self.options,
            self.h_resolution,
            self.v_resolution,
        ] {
            write_u16(out, v);
        }
        write_f64(out, self.header_margin);
        write_f64(out, self.footer_margin);
        write_u16(out, self.copies);
    }
}

/// Sheet window settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTwoRecord {
    pub options: u16,
    pub top_row: u16,
    pub left_col: u16,
    pub header_color: u32,
    pub page_break_zoom: u16,
    pub normal_zoom: u16,
    pub reserved: u32,
    /// Whether the zoom fields are present (18-byte form).
    pub extended: bool,
}

impl Default for WindowTwoRecord {
    fn default() -> Self {
        Self {
            options: 0x06B6,
            top_row: 0,
            left_col: 0,
            header_color: 0x40,
            page_break_zoom: 0,
            normal_zoom: 0,
            reserved: 0,
            extended: true,
        }
    }
}

impl WindowTwoRecord {
    pub const DISPLAY_FORMULAS: u16 = 0x0001;
    pub const DISPLAY_GRIDLINES: u16 = 0x0002;
    pub const DISPLAY_ROW_COL_HEADINGS: u16 = 0x0004;
    pub const FREEZE_PANES: u16 = 0x0008;
    pub const DISPLAY_ZEROS: u16 = 0x0010;
    pub const FREEZE_PANES_NO_SPLIT: u16 = 0x0100;
    pub const SELECTED: u16 = 0x0200;
    pub const ACTIVE: u16 = 0x0400;

    pub fn flag(&self, mask: u16) -> bool {
        self.options & mask != 0
    }

    pub fn set_flag(&mut self, mask: u16, on: bool) {
        set_bit(&mut self.options, mask, on);
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let mut record = Self {
            options: read_u16(data, &mut o)?,
            top_row: read_u16(data, &mut o)?,
            left_col: read_u16(data, &mut o)?,
            header_color: read_u32(data, &mut o)?,
            page_break_zoom: 0,
            normal_zoom: 0,
            reserved: 0,
            extended: false,
        };
        if data.len() > 10 {
            record.page_break_zoom = read_u16(data, &mut o)?;
            record.normal_zoom = read_u16(data, &mut o)?;
            if data.len() > 14 {
                record.reserved = read_u32(data, &mut o)?;
            }
            record.extended = true;
        }
        Ok(record)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.options);
        write_u16(out, self.top_row);
        write_u16(out, self.left_col);
        write_u32(out, self.header_color);
        if self.extended {
            write_u16(out, self.page_break_zoom);
            write_u16(out, self.normal_zoom);
            write_u32(out, self.reserved);
        }
    }
}

/// Cell range inside a SELECTION (columns are 8-bit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionRef {
    pub first_row: u16,
    pub last_row: u16,
    pub first_col: u8,
    pub last_col: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRecord {
    pub pane: u8,
    pub active_row: u16,
    pub active_col: u16,
    pub active_ref_index: u16,
    pub refs: Vec<SelectionRef>,
}

impl Default for SelectionRecord {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl SelectionRecord {
    pub const PANE_LOWER_RIGHT: u8 = 0;
    pub const PANE_UPPER_RIGHT: u8 = 1;
    pub const PANE_LOWER_LEFT: u8 = 2;
    pub const PANE_UPPER_LEFT: u8 = 3;

    pub fn new(active_row: u16, active_col: u16) -> Self {
        Self {
            pane: Self::PANE_UPPER_LEFT,
            active_row,
            active_col,
            active_ref_index: 0,
            refs: vec![SelectionRef {
                first_row: active_row,
                last_row: active_row,
                first_col: active_col as u8,
                last_col: active_col as u8,
            }],
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let pane = read_u8(data, &mut o)?;
        let active_row = read_u16(data, &mut o)?;
        let active_col = read_u16(data, &mut o)?;
        let active_ref_index = read_u16(data, &mut o)?;
        let count = read_u16(data, &mut o)?;
        let mut refs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            refs.push(SelectionRef {
                first_row: read_u16(data, &mut o)?,
                last_row: read_u16(data, &mut o)?,
                first_col: read_u8(data, &mut o)?,
                last_col: read_u8(data, &mut o)?,
            });
        }
        Ok(Self {
            pane,
            active_row,
            active_col,
            active_ref_index,
            refs,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u8(out, self.pane);
        write_u16(out, self.active_row);
        write_u16(out, self.active_col);
        write_u16(out, self.active_ref_index);
        write_u16(out, self.refs.len() as u16);
        for r in &self.refs {
            write_u16(out, r.first_row);
            write_u16(out, r.last_row);
            write_u8(out, r.first_col);
            write_u8(out, r.last_col);
        }
    }
}

/// Split or freeze position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaneRecord {
    pub x: u16,
    pub y: u16,
    pub top_row: u16,
    pub left_col: u16,
    pub active_pane: u16,
}

impl PaneRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            x: read_u16(data, &mut o)?,
            y: read_u16(data, &mut o)?,
            top_row: read_u16(data, &mut o)?,
            left_col: read_u16(data, &mut o)?,
            // Some writers omit the active pane
            active_pane: read_u16(data, &mut o).unwrap_or(0),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.x);
        write_u16(out, self.y);
        write_u16(out, self.top_row);
        write_u16(out, self.left_col);
        write_u16(out, self.active_pane);
    }
}

/// Zoom as a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SclRecord {
    pub numerator: u16,
    pub denominator: u16,
}

impl SclRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            numerator: read_u16(data, &mut o)?,
            denominator: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.numerator);
        write_u16(out, self.denominator);
    }
}

/// Rectangular cell range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellRangeAddress {
    pub first_row: u16,
    pub last_row: u16,
    pub first_col: u16,
    pub last_col: u16,
}

impl CellRangeAddress {
    pub fn new(first_row: u16, last_row: u16, first_col: u16, last_col: u16) -> Self {
        Self {
            first_row,
            last_row,
            first_col,
            last_col,
        }
    }

    pub fn contains(&self, row: u16, col: u16) -> bool {
        self.first_row <= row && row <= self.last_row && self.first_col <= col && col <= self.last_col
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeCellsRecord {
    pub regions: Vec<CellRangeAddress>,
}

impl MergeCellsRecord {
    /// Most areas a single record may hold.
    pub const MAX_AREAS: usize = 1027;

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let count = read_u16(data, &mut o)?;
        let mut regions = Vec::with_capacity(count as usize);
        for _ in 0..count {
            regions.push(CellRangeAddress {
                first_row: read_u16(data, &mut o)?,
                last_row: read_u16(data, &mut o)?,
                first_col: read_u16(data, &mut o)?,
                last_col: read_u16(data, &mut o)?,
            });
        }
        Ok(Self { regions })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.regions.len() as u16);
        for r in &self.regions {
            write_u16(out, r.first_row);
            write_u16(out, r.last_row);
            write_u16(out, r.first_col);
            write_u16(out, r.last_col);
        }
    }
}

/// Header of the data validation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvalRecord {
    pub options: u16,
    pub horiz_pos: u32,
    pub vert_pos: u32,
    /// Object id of the drop-down, or `0xFFFFFFFF` when there is none.
    pub cbo_id: u32,
    pub dv_count: u32,
}

impl Default for DvalRecord {
    fn default() -> Self {
        Self {
            options: 0,
            horiz_pos: 0,
            vert_pos: 0,
            cbo_id: 0xFFFF_FFFF,
            dv_count: 0,
        }
    }
}

impl DvalRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            options: read_u16(data, &mut o)?,
            horiz_pos: read_u32(data, &mut o)?,
            vert_pos: read_u32(data, &mut o)?,
            cbo_id: read_u32(data, &mut o)?,
            dv_count: read_u32(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.options);
        write_u32(out, self.horiz_pos);
        write_u32(out, self.vert_pos);
        write_u32(out, self.cbo_id);
        write_u32(out, self.dv_count);
    }
}
