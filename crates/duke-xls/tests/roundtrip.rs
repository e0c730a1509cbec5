//! Whole-file round trips through the compound-file writer and reader.

use duke_xls::{WorkbookOptions, XlsDocument};
use duke_xls_records::escher::{EscherRecord, BSE};
use duke_xls_records::record::{CellHeader, LabelRecord, LabelSstRecord, NumberRecord, SheetVisibility};
use duke_xls_records::{sid, Record};
use pretty_assertions::assert_eq;

fn number(row: u16, col: u16, value: f64) -> Record {
    Record::Number(NumberRecord {
        cell: CellHeader { row, col, xf_index: 15 },
        value,
    })
}

fn sample() -> XlsDocument {
    let mut doc = XlsDocument::new(&WorkbookOptions::default().with_username("tester")).unwrap();
    doc.create_sheet("Data").unwrap();
    let sheet = doc.sheet_mut(1).unwrap();
    for row in 0..40u16 {
        sheet.add_value_record(number(row, 0, f64::from(row) * 1.5)).unwrap();
    }
    sheet.add_merged_region(0, 1, 2, 3).unwrap();
    sheet.create_freeze_pane(0, 1, 1, 0).unwrap();

    let wb = doc.workbook_mut();
    let index = wb.add_sst_string(duke_xls_records::record::UnicodeString::new("label")).unwrap();
    wb.create_name("Total", 0).unwrap();
    wb.set_sheet_visibility(0, SheetVisibility::Hidden).unwrap();
    doc.sheet_mut(0)
        .unwrap()
        .add_value_record(Record::LabelSst(LabelSstRecord {
            cell: CellHeader {
                row: 0,
                col: 0,
                xf_index: 15,
            },
            sst_index: index,
        }))
        .unwrap();
    doc
}

fn reread(doc: &mut XlsDocument) -> XlsDocument {
    let mut bytes = Vec::new();
    doc.write(&mut bytes).unwrap();
    XlsDocument::read(std::io::Cursor::new(bytes)).unwrap()
}

#[test]
fn file_round_trip_keeps_structure() {
    let mut doc = sample();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.xls");
    doc.write_file(&path).unwrap();

    let read = XlsDocument::read_file(&path).unwrap();
    assert_eq!(read.num_sheets(), 2);
    let wb = read.workbook();
    assert_eq!(wb.sheet_name(1), Some("Data"));
    assert_eq!(wb.sheet_visibility(0), Some(SheetVisibility::Hidden));
    assert_eq!(wb.num_names(), 1);
    assert_eq!(wb.name_record(0).map(|n| n.name_text().to_string()), Some("Total".to_string()));
    assert_eq!(wb.sst_string(0).map(|s| s.text.as_str()), Some("label"));

    let data = read.sheet(1).unwrap();
    assert_eq!(data.num_merged_regions(), 1);
    assert!(data.pane().is_some());
    match data.cell(39, 0) {
        Some(duke_xls::sheet::values::CellValue::Value(Record::Number(n))) => assert_eq!(n.value, 58.5),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn second_write_is_byte_identical() {
    let mut doc = sample();
    let first = doc.to_bytes().unwrap();
    let mut read = XlsDocument::from_workbook_stream(&first).unwrap();
    let second = read.to_bytes().unwrap();
    assert_eq!(first.len(), second.len());
    assert!(first == second);
}

#[test]
fn labels_become_shared_strings_on_read() {
    let mut doc = XlsDocument::new(&WorkbookOptions::default()).unwrap();
    let label = |col, text: &str| {
        Record::Label(LabelRecord {
            cell: CellHeader { row: 2, col, xf_index: 15 },
            value: text.to_string(),
        })
    };
    let sheet = doc.sheet_mut(0).unwrap();
    sheet.add_value_record(label(0, "alpha")).unwrap();
    sheet.add_value_record(label(1, "alpha")).unwrap();
    sheet.add_value_record(label(2, "beta")).unwrap();

    let read = reread(&mut doc);
    let sst = read.workbook().sst().unwrap();
    assert_eq!(sst.num_unique_strings(), 2);
    assert_eq!(sst.num_strings, 3);
    let sids: Vec<u16> = read.sheet(0).unwrap().cells().map(|c| c.to_record().sid()).collect();
    assert_eq!(sids, vec![sid::LABELSST; 3]);
}

#[test]
fn cloned_sheet_gets_new_drawing_and_bound_sheet() {
    let mut doc = XlsDocument::new(&WorkbookOptions::default()).unwrap();
    doc.create_drawing_patriarch(0).unwrap();
    doc.workbook_mut()
        .add_bse_record(EscherRecord::atom(BSE, 0x0062, vec![0; 36]))
        .unwrap();

    let clone = doc.clone_sheet(0).unwrap();
    assert_eq!(clone, 1);
    assert_eq!(doc.workbook().sheet_name(1), Some("Sheet1 (2)"));
    let first = doc.sheet(0).unwrap().drawing().and_then(|d| d.drawing_group_id());
    let second = doc.sheet(1).unwrap().drawing().and_then(|d| d.drawing_group_id());
    assert_eq!(first, Some(1));
    assert_eq!(second, Some(2));
    assert!(!doc.sheet(1).unwrap().is_selected());

    let read = reread(&mut doc);
    assert_eq!(read.num_sheets(), 2);
    assert_eq!(read.workbook().sheet_name(1), Some("Sheet1 (2)"));
}

#[test]
fn sheet_order_moves_sheets_and_offsets() {
    let mut doc = XlsDocument::new(&WorkbookOptions::default()).unwrap();
    doc.create_sheet("B").unwrap();
    doc.sheet_mut(1).unwrap().add_value_record(number(0, 0, 7.0)).unwrap();
    doc.set_sheet_order("B", 0).unwrap();
    assert_eq!(doc.workbook().sheet_index("B"), Some(0));
    assert!(doc.sheet(0).unwrap().cell(0, 0).is_some());

    let read = reread(&mut doc);
    assert_eq!(read.workbook().sheet_name(0), Some("B"));
    assert!(read.sheet(0).unwrap().cell(0, 0).is_some());
    assert!(read.sheet(1).unwrap().cell(0, 0).is_none());
}

#[test]
fn files_without_a_workbook_stream_are_rejected() {
    let mut compound = cfb::CompoundFile::create(std::io::Cursor::new(Vec::new())).unwrap();
    compound.create_stream("/Other").unwrap();
    compound.flush().unwrap();
    let bytes = compound.into_inner().into_inner();
    assert!(matches!(
        XlsDocument::read(std::io::Cursor::new(bytes)),
        Err(duke_xls::XlsError::InvalidFormat(_))
    ));
}
