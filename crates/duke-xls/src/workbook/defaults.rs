//! Globals records of a workbook created from scratch.
//!
//! The values are the ones Excel itself writes into a new file: four fonts,
//! eight built-in currency/accounting formats, 21 XFs (15 style XFs, one cell
//! XF, five styled XFs) and the six built-in STYLE records.

use duke_xls_records::record::{
    BofRecord, BoundSheetRecord, CountryRecord, ExtSstRecord, ExtendedFormatRecord, FontRecord, FormatRecord,
    SstRecord, StyleRecord, TabIdRecord, WindowOneRecord, WriteAccessRecord,
};
use duke_xls_records::{sid, Record};

use crate::error::XlsResult;
use crate::options::WorkbookOptions;
use crate::record_list::{Anchor, WorkbookRecordList};

/// UTF-16LE, as written by every BIFF8 producer.
pub const CODEPAGE_UTF_16: u16 = 0x04B0;

const NUM_DEFAULT_FONTS: usize = 4;

const BUILT_IN_FORMATS: [(u16, &str); 8] = [
    (0x05, "\"$\"#,##0_);(\"$\"#,##0)"),
    (0x06, "\"$\"#,##0_);[Red](\"$\"#,##0)"),
    (0x07, "\"$\"#,##0.00_);(\"$\"#,##0.00)"),
    (0x08, "\"$\"#,##0.00_);[Red](\"$\"#,##0.00)"),
    (0x2a, "_(\"$\"* #,##0_);_(\"$\"* (#,##0);_(\"$\"* \"-\"_);_(@_)"),
    (0x29, "_(* #,##0_);_(* (#,##0);_(* \"-\"_);_(@_)"),
    (0x2c, "_(\"$\"* #,##0.00_);_(\"$\"* (#,##0.00);_(\"$\"* \"-\"??_);_(@_)"),
    (0x2b, "_(* #,##0.00_);_(* (#,##0.00);_(* \"-\"??_);_(@_)"),
];

/// `(xf index, built-in style id)` of the default STYLE records.
const BUILT_IN_STYLES: [(u16, u8); 6] = [(0x10, 3), (0x11, 6), (0x12, 4), (0x13, 7), (0x00, 0), (0x14, 5)];

/// Font, format, cell options and indention options of default XF `index`.
fn xf_fields(index: usize) -> (u16, u16, u16, u16) {
    match index {
        0 => (0, 0, 0xFFF5, 0),
        1 | 2 => (1, 0, 0xFFF5, 0xF400),
        3 | 4 => (2, 0, 0xFFF5, 0xF400),
        15 => (0, 0, 0x0001, 0),
        16 => (1, 0x2b, 0xFFF5, 0xF800),
        17 => (1, 0x29, 0xFFF5, 0xF800),
        18 => (1, 0x2c, 0xFFF5, 0xF800),
        19 => (1, 0x2a, 0xFFF5, 0xF800),
        20 => (1, 0x09, 0xFFF5, 0xF800),
        _ => (0, 0, 0xFFF5, 0xF400),
    }
}

pub(crate) fn default_xf(index: usize) -> ExtendedFormatRecord {
    let (font_index, format_index, cell_options, indention_options) = xf_fields(index);
    ExtendedFormatRecord {
        font_index,
        format_index,
        cell_options,
        alignment_options: 0x20,
        indention_options,
        border_options: 0,
        palette_options: 0,
        additional_palette_options: 0,
        fill_palette_options: 0x20c0,
    }
}

pub(crate) fn default_formats() -> Vec<FormatRecord> {
    BUILT_IN_FORMATS
        .iter()
        .map(|&(id, text)| FormatRecord::new(id, text))
        .collect()
}

/// Push `record`, pointing `anchor` at it.
fn push_anchored(list: &mut WorkbookRecordList, anchor: Anchor, record: Record) {
    list.set_anchor(anchor, Some(list.len()));
    list.push(record);
}

/// The globals records for a one-sheet workbook, anchors set, without the
/// link table (which needs COUNTRY in place first).
pub(crate) fn globals_records(options: &WorkbookOptions) -> XlsResult<WorkbookRecordList> {
    let mut list = WorkbookRecordList::new();
    let short = Record::short;

    list.push(Record::Bof(BofRecord::workbook()));
    list.push(short(sid::INTERFACEHDR, CODEPAGE_UTF_16));
    list.push(short(sid::MMS, 0));
    list.push(Record::Empty(sid::INTERFACEEND));
    list.push(Record::WriteAccess(WriteAccessRecord::new(&options.username)?));
    list.push(short(sid::CODEPAGE, CODEPAGE_UTF_16));
    list.push(short(sid::DSF, 0));
    push_anchored(&mut list, Anchor::TabId, Record::TabId(TabIdRecord { tab_ids: vec![0] }));
    list.push(short(sid::FNGROUPCOUNT, 14));
    list.push(short(sid::WINDOWPROTECT, 0));
    push_anchored(&mut list, Anchor::Protect, short(sid::PROTECT, 0));
    list.push(short(sid::PASSWORD, 0));
    list.push(short(sid::PROT4REV, 0));
    list.push(short(sid::PROT4REVPASS, 0));
    list.push(Record::WindowOne(WindowOneRecord::default()));
    push_anchored(&mut list, Anchor::Backup, short(sid::BACKUP, 0));
    list.push(short(sid::HIDEOBJ, 0));
    list.push(short(sid::DATEMODE, 0));
    list.push(short(sid::PRECISION, 1));
    list.push(short(sid::REFRESHALL, 0));
    list.push(short(sid::BOOKBOOL, 0));

    for _ in 0..NUM_DEFAULT_FONTS {
        push_anchored(&mut list, Anchor::Font, Record::Font(FontRecord::default()));
    }
    for format in default_formats() {
        list.push(Record::Format(format));
    }
    for k in 0..21 {
        push_anchored(&mut list, Anchor::ExtendedFormat, Record::ExtendedFormat(default_xf(k)));
    }
    for (xf, id) in BUILT_IN_STYLES {
        list.push(Record::Style(StyleRecord::built_in(xf, id)));
    }
    list.push(short(sid::USESELFS, 0));
    push_anchored(
        &mut list,
        Anchor::BoundSheet,
        Record::BoundSheet(BoundSheetRecord::new(&options.sheet_name(0))),
    );
    list.push(Record::Country(CountryRecord {
        default_country: 1,
        current_country: options.country,
    }));
    list.push(Record::Sst(SstRecord::new()));
    list.push(Record::ExtSst(ExtSstRecord::default()));
    list.push(Record::Eof);
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn globals_start_and_end_where_excel_expects() {
        let list = globals_records(&WorkbookOptions::default()).unwrap();
        let sids: Vec<u16> = list.iter().map(Record::sid).collect();
        assert_eq!(&sids[..4], &[sid::BOF, sid::INTERFACEHDR, sid::MMS, sid::INTERFACEEND]);
        assert_eq!(&sids[sids.len() - 3..], &[sid::SST, sid::EXTSST, sid::EOF]);
        assert_eq!(list.count_by_sid(sid::FONT), 4);
        assert_eq!(list.count_by_sid(sid::FORMAT), 8);
        assert_eq!(list.count_by_sid(sid::XF), 21);
        assert_eq!(list.count_by_sid(sid::STYLE), 6);
    }

    #[test]
    fn anchors_point_at_their_records() {
        let list = globals_records(&WorkbookOptions::default()).unwrap();
        let expect = [
            (Anchor::TabId, sid::TABID),
            (Anchor::Protect, sid::PROTECT),
            (Anchor::Backup, sid::BACKUP),
            (Anchor::Font, sid::FONT),
            (Anchor::ExtendedFormat, sid::XF),
            (Anchor::BoundSheet, sid::BOUNDSHEET),
        ];
        for (anchor, s) in expect {
            let pos = list.anchor(anchor).unwrap();
            assert_eq!(list.get(pos).map(Record::sid), Some(s), "{anchor:?}");
        }
        let last_font = list.anchor(Anchor::Font).unwrap();
        assert_ne!(list.get(last_font + 1).map(Record::sid), Some(sid::FONT));
    }

    #[test]
    fn style_xfs_precede_the_cell_xf() {
        assert!(default_xf(0).is_style_xf());
        assert!(!default_xf(15).is_style_xf());
        assert_eq!(default_xf(20).format_index, 0x09);
    }
}
