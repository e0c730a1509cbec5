//! Where new sheet-level blocks go.
//!
//! Excel rejects sheets whose records are out of the order laid down in
//! "Record Order in a BIFF8 Workbook Stream". When a block that was absent on
//! read gets created, its position is found by scanning the neighbours it
//! must follow or precede.

use duke_xls_records::sid;

use crate::error::{XlsError, XlsResult};
use crate::sheet::page_settings::is_component_record;
use crate::sheet::{EntryKind, SheetEntry};

const QUICKTIP: u16 = 0x0800;
const VIEWDEFINITION: u16 = 0x00D3;
const FEAT11: u16 = 0x0872;
const FEAT12: u16 = 0x0875;

/// Blocks whose position is decided here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewBlock {
    DataValidity,
    MergedCells,
    ConditionalFormatting,
    Guts,
    PageSettings,
    Protection,
}

/// Insert `entry` at the position mandated for `block`, returning it.
pub fn add_new_sheet_entry(entries: &mut Vec<SheetEntry>, block: NewBlock, entry: SheetEntry) -> XlsResult<usize> {
    let pos = find_sheet_insert_pos(entries, block)?;
    entries.insert(pos, entry);
    Ok(pos)
}

pub fn find_sheet_insert_pos(entries: &[SheetEntry], block: NewBlock) -> XlsResult<usize> {
    match block {
        NewBlock::DataValidity => data_validity_insert_pos(entries),
        NewBlock::MergedCells => merged_cells_insert_pos(entries),
        NewBlock::ConditionalFormatting => cond_format_insert_pos(entries),
        NewBlock::Guts => guts_insert_pos(entries),
        NewBlock::PageSettings => page_settings_insert_pos(entries),
        NewBlock::Protection => protection_insert_pos(entries),
    }
}

fn dimensions_index(entries: &[SheetEntry]) -> XlsResult<usize> {
    entries
        .iter()
        .position(|e| e.kind() == EntryKind::Record(sid::DIMENSION))
        .ok_or_else(|| XlsError::format("DIMENSIONS record not found"))
}

fn record_sid(entry: &SheetEntry) -> Option<u16> {
    match entry.kind() {
        EntryKind::Record(s) => Some(s),
        _ => None,
    }
}

fn protection_insert_pos(entries: &[SheetEntry]) -> XlsResult<usize> {
    let mut i = dimensions_index(entries)?;
    while i > 0 {
        i -= 1;
        if !is_protection_subsequent(&entries[i]) {
            return Ok(i + 1);
        }
    }
    Err(XlsError::format("did not find insert position for protection block"))
}

fn is_protection_subsequent(entry: &SheetEntry) -> bool {
    // Excel writes DEFCOLWIDTH after COLINFO
    match entry.kind() {
        EntryKind::Columns => true,
        EntryKind::Record(s) => matches!(s, sid::DEFCOLWIDTH | sid::SORT),
        _ => false,
    }
}

fn page_settings_insert_pos(entries: &[SheetEntry]) -> XlsResult<usize> {
    let mut i = dimensions_index(entries)?.saturating_sub(1);
    while i > 0 {
        i -= 1;
        if record_sid(&entries[i]).map_or(false, is_page_break_prior) {
            return Ok(i + 1);
        }
    }
    Err(XlsError::format("did not find insert position for page settings"))
}

fn guts_insert_pos(entries: &[SheetEntry]) -> XlsResult<usize> {
    let mut i = dimensions_index(entries)?.saturating_sub(1);
    while i > 0 {
        i -= 1;
        if record_sid(&entries[i]).map_or(false, is_guts_prior) {
            return Ok(i + 1);
        }
    }
    Err(XlsError::format("did not find insert position for GUTS"))
}

fn is_calc_settings(s: u16) -> bool {
    matches!(
        s,
        sid::UNCALCED
            | sid::CALCCOUNT
            | sid::CALCMODE
            | sid::PRECISION
            | sid::REFMODE
            | sid::DELTA
            | sid::ITERATION
            | sid::DATEMODE
            | sid::SAVERECALC
    )
}

fn is_guts_prior(s: u16) -> bool {
    matches!(
        s,
        sid::BOF | sid::INDEX | sid::PRINTHEADERS | sid::PRINTGRIDLINES | sid::GRIDSET
    ) || is_calc_settings(s)
}

fn is_page_break_prior(s: u16) -> bool {
    is_guts_prior(s) || matches!(s, sid::DEFAULTROWHEIGHT | sid::WSBOOL)
}

/// Records making up the "view settings" group that ends with WINDOW2's
/// companions.
fn is_view_settings(s: u16) -> bool {
    matches!(
        s,
        sid::WINDOW2 | sid::SCL | sid::PANE | sid::SELECTION | sid::STANDARDWIDTH
    )
}

fn merged_cells_insert_pos(entries: &[SheetEntry]) -> XlsResult<usize> {
    // skip EOF
    for i in (0..entries.len().saturating_sub(1)).rev() {
        let Some(s) = record_sid(&entries[i]) else {
            continue;
        };
        if is_view_settings(s) {
            return Ok(i + 1);
        }
    }
    Err(XlsError::format("did not find WINDOW2 record"))
}

fn cond_format_insert_pos(entries: &[SheetEntry]) -> XlsResult<usize> {
    for i in (0..entries.len().saturating_sub(1)).rev() {
        match entries[i].kind() {
            EntryKind::MergedCells => return Ok(i + 1),
            EntryKind::Record(s) if is_view_settings(s) || matches!(s, sid::LABELRANGES | sid::PHONETICPR) => {
                return Ok(i + 1)
            }
            _ => {}
        }
    }
    Err(XlsError::format("did not find WINDOW2 record"))
}

fn is_dv_prior(entry: &SheetEntry) -> bool {
    match entry.kind() {
        EntryKind::MergedCells | EntryKind::ConditionalFormatting => true,
        EntryKind::Record(s) => {
            is_view_settings(s)
                || matches!(
                    s,
                    sid::LABELRANGES | sid::PHONETICPR | sid::HLINK | QUICKTIP | sid::CODENAME
                )
        }
        _ => false,
    }
}

fn is_dv_subsequent(entry: &SheetEntry) -> bool {
    matches!(
        record_sid(entry),
        Some(sid::SHEETEXT | sid::FEATHDR | FEAT11 | FEAT12 | sid::EOF)
    )
}

fn data_validity_insert_pos(entries: &[SheetEntry]) -> XlsResult<usize> {
    let Some(mut i) = entries.len().checked_sub(1) else {
        return Err(XlsError::format("empty sheet record list"));
    };
    if record_sid(&entries[i]) != Some(sid::EOF) {
        return Err(XlsError::format("last sheet record should be EOF"));
    }
    while i > 0 {
        i -= 1;
        let entry = &entries[i];
        if is_dv_prior(entry) {
            if !is_dv_subsequent(&entries[i + 1]) {
                return Err(XlsError::format(format!(
                    "unexpected {:?} found after {:?}",
                    entries[i + 1].kind(),
                    entry.kind()
                )));
            }
            return Ok(i + 1);
        }
        if !is_dv_subsequent(entry) {
            return Err(XlsError::format(format!(
                "unexpected {:?} while looking for data validity insert position",
                entry.kind()
            )));
        }
    }
    Ok(0)
}

/// Whether `s` cannot be part of the row block and so ends it.
///
/// Reaching EOF before WINDOW2 is an error.
pub fn is_end_of_row_block(s: u16) -> XlsResult<bool> {
    match s {
        VIEWDEFINITION | sid::MSODRAWING | sid::MSODRAWINGSELECTION | sid::OBJ | sid::TXO | sid::COLINFO
        | sid::GUTS | sid::WINDOW1 | sid::WINDOW2 | sid::DVAL => Ok(true),
        sid::EOF => Err(XlsError::format("found EOF before WINDOW2 was encountered")),
        _ => Ok(is_component_record(s)),
    }
}

/// Records that belong to a row block: ROW and every cell value record.
pub fn is_row_block_record(s: u16) -> bool {
    matches!(
        s,
        sid::ROW
            | sid::BLANK
            | sid::BOOLERR
            | sid::FORMULA
            | sid::LABEL
            | sid::LABELSST
            | sid::NUMBER
            | sid::RK
            | sid::MULRK
            | sid::MULBLANK
            | sid::ARRAY
            | sid::SHRFMLA
            | sid::TABLE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::record::{BofRecord, DimensionsRecord, WindowTwoRecord};
    use duke_xls_records::Record;
    use pretty_assertions::assert_eq;

    fn rec(r: Record) -> SheetEntry {
        SheetEntry::Record(r)
    }

    fn skeleton() -> Vec<SheetEntry> {
        vec![
            rec(Record::Bof(BofRecord::worksheet())),
            rec(Record::short(sid::CALCMODE, 1)),
            rec(Record::short(sid::GRIDSET, 1)),
            rec(Record::Unknown {
                sid: sid::DEFAULTROWHEIGHT,
                data: vec![0, 0, 0xFF, 0],
            }),
            rec(Record::short(sid::WSBOOL, 0x04C1)),
            rec(Record::short(sid::DEFCOLWIDTH, 8)),
            SheetEntry::Columns,
            rec(Record::Dimensions(DimensionsRecord::default())),
            SheetEntry::Rows,
            rec(Record::WindowTwo(WindowTwoRecord::default())),
            rec(Record::Eof),
        ]
    }

    fn kinds(entries: &[SheetEntry]) -> Vec<EntryKind> {
        entries.iter().map(SheetEntry::kind).collect()
    }

    #[test]
    fn guts_goes_after_gridset() {
        assert_eq!(find_sheet_insert_pos(&skeleton(), NewBlock::Guts).unwrap(), 3);
    }

    #[test]
    fn page_settings_go_after_wsbool() {
        assert_eq!(find_sheet_insert_pos(&skeleton(), NewBlock::PageSettings).unwrap(), 5);
    }

    #[test]
    fn protection_goes_before_defcolwidth() {
        assert_eq!(find_sheet_insert_pos(&skeleton(), NewBlock::Protection).unwrap(), 5);
    }

    #[test]
    fn tables_follow_window2() {
        let mut entries = skeleton();
        add_new_sheet_entry(&mut entries, NewBlock::MergedCells, SheetEntry::MergedCells).unwrap();
        add_new_sheet_entry(&mut entries, NewBlock::DataValidity, SheetEntry::DataValidity).unwrap();
        add_new_sheet_entry(
            &mut entries,
            NewBlock::ConditionalFormatting,
            SheetEntry::ConditionalFormatting,
        )
        .unwrap();
        let tail = kinds(&entries[9..]);
        assert_eq!(
            tail,
            vec![
                EntryKind::Record(sid::WINDOW2),
                EntryKind::MergedCells,
                EntryKind::ConditionalFormatting,
                EntryKind::DataValidity,
                EntryKind::Record(sid::EOF),
            ]
        );
    }

    #[test]
    fn missing_dimensions_is_fatal() {
        let entries = vec![rec(Record::Bof(BofRecord::worksheet())), rec(Record::Eof)];
        assert!(matches!(
            find_sheet_insert_pos(&entries, NewBlock::Guts),
            Err(XlsError::InvalidFormat(_))
        ));
        assert!(find_sheet_insert_pos(&entries, NewBlock::MergedCells).is_err());
    }

    #[test]
    fn row_block_ends_at_window2() {
        assert!(is_end_of_row_block(sid::WINDOW2).unwrap());
        assert!(is_end_of_row_block(sid::HEADER).unwrap());
        assert!(!is_end_of_row_block(sid::NOTE).unwrap());
        assert!(is_end_of_row_block(sid::EOF).is_err());
    }
}
