//! Typed BIFF8 records.
//!
//! [`Record`] is a tagged union keyed by sid. Records the engine reads fields
//! from get a typed variant; everything else is carried as
//! [`Record::Unknown`] and written back byte-for-byte.

mod book;
mod cell;
mod link;
mod sheet;
mod sst;

pub use book::*;
pub use cell::*;
pub use link::*;
pub use sheet::*;
pub use sst::*;

use crate::error::RecordResult;
use crate::escher::{serialize_all, EscherRecord};
use crate::parser::{write_f64, write_u16};
use crate::sid;
use crate::stream::{write_header, write_record, RawRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Bof(BofRecord),
    Eof,
    /// Record whose body is a single `u16` (flags, counts, codepage...).
    Short { sid: u16, value: u16 },
    /// Record whose body is a single IEEE double (margins, DELTA).
    Double { sid: u16, value: f64 },
    /// Record with an empty body.
    Empty(u16),

    WriteAccess(WriteAccessRecord),
    TabId(TabIdRecord),
    WindowOne(WindowOneRecord),
    Font(FontRecord),
    Format(FormatRecord),
    ExtendedFormat(ExtendedFormatRecord),
    Style(StyleRecord),
    BoundSheet(BoundSheetRecord),
    Country(CountryRecord),
    Palette(PaletteRecord),
    FileSharing(FileSharingRecord),
    RecalcId(RecalcIdRecord),
    Sst(SstRecord),
    ExtSst(ExtSstRecord),
    SupBook(SupBookRecord),
    ExternSheet(ExternSheetRecord),
    ExternalName(ExternalNameRecord),
    Name(NameRecord),
    NameComment(NameCommentRecord),
    CrnCount(CrnCountRecord),
    DrawingGroup(Vec<EscherRecord>),

    Index(IndexRecord),
    Dimensions(DimensionsRecord),
    Row(RowRecord),
    DbCell(DbCellRecord),
    ColumnInfo(ColumnInfoRecord),
    DefaultRowHeight(DefaultRowHeightRecord),
    Guts(GutsRecord),
    PageBreak(PageBreakRecord),
    HeaderFooter(HeaderFooterRecord),
    PrintSetup(PrintSetupRecord),
    WindowTwo(WindowTwoRecord),
    Selection(SelectionRecord),
    Pane(PaneRecord),
    Scl(SclRecord),
    MergeCells(MergeCellsRecord),
    Dval(DvalRecord),

    Number(NumberRecord),
    LabelSst(LabelSstRecord),
    Label(LabelRecord),
    Blank(BlankRecord),
    BoolErr(BoolErrRecord),
    Formula(FormulaRecord),
    StringValue(StringRecord),
    SharedFormula(SharedFormulaRecord),
    Array(ArrayRecord),
    Table(TableRecord),

    Unknown { sid: u16, data: Vec<u8> },
}

fn is_short_sid(record_sid: u16) -> bool {
    matches!(
        record_sid,
        sid::INTERFACEHDR
            | sid::MMS
            | sid::CODEPAGE
            | sid::DSF
            | sid::FNGROUPCOUNT
            | sid::WINDOWPROTECT
            | sid::PROTECT
            | sid::PASSWORD
            | sid::PROT4REV
            | sid::PROT4REVPASS
            | sid::BACKUP
            | sid::HIDEOBJ
            | sid::DATEMODE
            | sid::PRECISION
            | sid::REFRESHALL
            | sid::BOOKBOOL
            | sid::USESELFS
            | sid::UNCALCED
            | sid::CALCMODE
            | sid::CALCCOUNT
            | sid::REFMODE
            | sid::ITERATION
            | sid::SAVERECALC
            | sid::PRINTHEADERS
            | sid::PRINTGRIDLINES
            | sid::GRIDSET
            | sid::WSBOOL
            | sid::HCENTER
            | sid::VCENTER
            | sid::OBJPROTECT
            | sid::SCENPROTECT
            | sid::DEFCOLWIDTH
    )
}

fn is_double_sid(record_sid: u16) -> bool {
    matches!(
        record_sid,
        sid::DELTA | sid::LEFTMARGIN | sid::RIGHTMARGIN | sid::TOPMARGIN | sid::BOTTOMMARGIN
    )
}

fn is_empty_sid(record_sid: u16) -> bool {
    matches!(record_sid, sid::INTERFACEEND | sid::WRITEPROT)
}

impl Record {
    pub fn short(record_sid: u16, value: u16) -> Self {
        Record::Short { sid: record_sid, value }
    }

    pub fn double(record_sid: u16, value: f64) -> Self {
        Record::Double { sid: record_sid, value }
    }

    pub fn sid(&self) -> u16 {
        match self {
            Record::Bof(_) => sid::BOF,
            Record::Eof => sid::EOF,
            Record::Short { sid, .. } | Record::Double { sid, .. } | Record::Empty(sid) => *sid,
            Record::WriteAccess(_) => sid::WRITEACCESS,
            Record::TabId(_) => sid::TABID,
            Record::WindowOne(_) => sid::WINDOW1,
            Record::Font(_) => sid::FONT,
            Record::Format(_) => sid::FORMAT,
            Record::ExtendedFormat(_) => sid::XF,
            Record::Style(_) => sid::STYLE,
            Record::BoundSheet(_) => sid::BOUNDSHEET,
            Record::Country(_) => sid::COUNTRY,
            Record::Palette(_) => sid::PALETTE,
            Record::FileSharing(_) => sid::FILESHARING,
            Record::RecalcId(_) => sid::RECALCID,
            Record::Sst(_) => sid::SST,
            Record::ExtSst(_) => sid::EXTSST,
            Record::SupBook(_) => sid::SUPBOOK,
            Record::ExternSheet(_) => sid::EXTERNSHEET,
            Record::ExternalName(_) => sid::EXTERNNAME,
            Record::Name(_) => sid::NAME,
            Record::NameComment(_) => sid::NAMECMT,
            Record::CrnCount(_) => sid::XCT,
            Record::DrawingGroup(_) => sid::MSODRAWINGGROUP,
            Record::Index(_) => sid::INDEX,
            Record::Dimensions(_) => sid::DIMENSION,
            Record::Row(_) => sid::ROW,
            Record::DbCell(_) => sid::DBCELL,
            Record::ColumnInfo(_) => sid::COLINFO,
            Record::DefaultRowHeight(_) => sid::DEFAULTROWHEIGHT,
            Record::Guts(_) => sid::GUTS,
            Record::PageBreak(r) => r.sid,
            Record::HeaderFooter(r) => r.sid,
            Record::PrintSetup(_) => sid::SETUP,
            Record::WindowTwo(_) => sid::WINDOW2,
            Record::Selection(_) => sid::SELECTION,
            Record::Pane(_) => sid::PANE,
            Record::Scl(_) => sid::SCL,
            Record::MergeCells(_) => sid::MERGECELLS,
            Record::Dval(_) => sid::DVAL,
            Record::Number(_) => sid::NUMBER,
            Record::LabelSst(_) => sid::LABELSST,
            Record::Label(_) => sid::LABEL,
            Record::Blank(_) => sid::BLANK,
            Record::BoolErr(_) => sid::BOOLERR,
            Record::Formula(_) => sid::FORMULA,
            Record::StringValue(_) => sid::STRING,
            Record::SharedFormula(_) => sid::SHRFMLA,
            Record::Array(_) => sid::ARRAY,
            Record::Table(_) => sid::TABLE,
            Record::Unknown { sid, .. } => *sid,
        }
    }

    /// Decode a physical record, keeping it raw when the body does not fit
    /// the typed layout.
    pub fn decode(raw: &RawRecord) -> Record {
        match Self::try_decode(raw) {
            Ok(Some(record)) => record,
            Ok(None) => Self::raw(raw),
            Err(e) => {
                log::debug!(
                    "keeping {} (0x{:04X}) raw: {e}",
                    sid::name(raw.sid),
                    raw.sid
                );
                Self::raw(raw)
            }
        }
    }

    fn raw(raw: &RawRecord) -> Record {
        Record::Unknown {
            sid: raw.sid,
            data: raw.data.clone(),
        }
    }

    fn try_decode(raw: &RawRecord) -> RecordResult<Option<Record>> {
        let data = raw.data.as_slice();
        let s = raw.sid;
        if is_short_sid(s) {
            if data.len() != 2 {
                return Ok(None);
            }
            return Ok(Some(Record::short(s, u16::from_le_bytes([data[0], data[1]]))));
        }
        if is_double_sid(s) {
            if data.len() != 8 {
                return Ok(None);
            }
            return Ok(Some(Record::double(s, crate::parser::read_f64(data, &mut 0)?)));
        }
        if is_empty_sid(s) {
            return Ok(data.is_empty().then_some(Record::Empty(s)));
        }
        let record = match s {
            sid::BOF => Record::Bof(BofRecord::parse(data)?),
            sid::EOF => Record::Eof,
            sid::WRITEACCESS => Record::WriteAccess(WriteAccessRecord::parse(data)?),
            sid::TABID => Record::TabId(TabIdRecord::parse(data)?),
            sid::WINDOW1 => Record::WindowOne(WindowOneRecord::parse(data)?),
            sid::FONT => Record::Font(FontRecord::parse(data)?),
            sid::FORMAT => Record::Format(FormatRecord::parse(data)?),
            sid::XF => Record::ExtendedFormat(ExtendedFormatRecord::parse(data)?),
            sid::STYLE => Record::Style(StyleRecord::parse(data)?),
            sid::BOUNDSHEET => Record::BoundSheet(BoundSheetRecord::parse(data)?),
            sid::COUNTRY => Record::Country(CountryRecord::parse(data)?),
            sid::PALETTE => Record::Palette(PaletteRecord::parse(data)?),
            sid::FILESHARING => Record::FileSharing(FileSharingRecord::parse(data)?),
            sid::RECALCID => Record::RecalcId(RecalcIdRecord::parse(data)?),
            sid::SST => Record::Sst(SstRecord::parse(data, &raw.continue_offsets)?),
            sid::EXTSST => Record::ExtSst(ExtSstRecord::parse(data)?),
            sid::SUPBOOK => Record::SupBook(SupBookRecord::parse(data)?),
            sid::EXTERNSHEET => Record::ExternSheet(ExternSheetRecord::parse(data)?),
            sid::EXTERNNAME => Record::ExternalName(ExternalNameRecord::parse(data)?),
            sid::NAME => Record::Name(NameRecord::parse(data)?),
            sid::NAMECMT => Record::NameComment(NameCommentRecord::parse(data)?),
            sid::XCT => Record::CrnCount(CrnCountRecord::parse(data)?),
            sid::MSODRAWINGGROUP => {
                let records = EscherRecord::parse_all(data)?;
                // Only keep the tree when it writes back to the same bytes.
                if serialize_all(&records) != data {
                    return Ok(None);
                }
                Record::DrawingGroup(records)
            }
            sid::INDEX => Record::Index(IndexRecord::parse(data)?),
            sid::DIMENSION => Record::Dimensions(DimensionsRecord::parse(data)?),
            sid::ROW => Record::Row(RowRecord::parse(data)?),
            sid::DBCELL => Record::DbCell(DbCellRecord::parse(data)?),
            sid::COLINFO => Record::ColumnInfo(ColumnInfoRecord::parse(data)?),
            sid::DEFAULTROWHEIGHT => Record::DefaultRowHeight(DefaultRowHeightRecord::parse(data)?),
            sid::GUTS => Record::Guts(GutsRecord::parse(data)?),
            sid::HORIZONTALPAGEBREAKS | sid::VERTICALPAGEBREAKS => {
                Record::PageBreak(PageBreakRecord::parse(s, data)?)
            }
            sid::HEADER | sid::FOOTER => Record::HeaderFooter(HeaderFooterRecord::parse(s, data)?),
            sid::SETUP => Record::PrintSetup(PrintSetupRecord::parse(data)?),
            sid::WINDOW2 => Record::WindowTwo(WindowTwoRecord::parse(data)?),
            sid::SELECTION => Record::Selection(SelectionRecord::parse(data)?),
            sid::PANE => Record::Pane(PaneRecord::parse(data)?),
            sid::SCL => Record::Scl(SclRecord::parse(data)?),
            sid::MERGECELLS => Record::MergeCells(MergeCellsRecord::parse(data)?),
            sid::DVAL => Record::Dval(DvalRecord::parse(data)?),
            sid::NUMBER => Record::Number(NumberRecord::parse(data)?),
            sid::RK => Record::Number(parse_rk(data)?),
            sid::LABELSST => Record::LabelSst(LabelSstRecord::parse(data)?),
            sid::LABEL => Record::Label(LabelRecord::parse(data)?),
            sid::BLANK => Record::Blank(BlankRecord::parse(data)?),
            sid::BOOLERR => Record::BoolErr(BoolErrRecord::parse(data)?),
            sid::FORMULA => Record::Formula(FormulaRecord::parse(data)?),
            sid::STRING => Record::StringValue(StringRecord::parse(data)?),
            sid::SHRFMLA => Record::SharedFormula(SharedFormulaRecord::parse(data)?),
            sid::ARRAY => Record::Array(ArrayRecord::parse(data)?),
            sid::TABLE => Record::Table(TableRecord::parse(data)?),
            _ => return Ok(None),
        };
        Ok(Some(record))
    }

    /// Decode a record list, expanding MULRK and MULBLANK into one record per cell.
    pub fn decode_records(raws: &[RawRecord]) -> Vec<Record> {
        let mut records = Vec::with_capacity(raws.len());
        for raw in raws {
            let expanded: RecordResult<Vec<Record>> = match raw.sid {
                sid::MULRK => parse_mulrk(&raw.data).map(|cells| cells.into_iter().map(Record::Number).collect()),
                sid::MULBLANK => {
                    parse_mulblank(&raw.data).map(|cells| cells.into_iter().map(Record::Blank).collect())
                }
                _ => {
                    records.push(Record::decode(raw));
                    continue;
                }
            };
            match expanded {
                Ok(cells) => records.extend(cells),
                Err(e) => {
                    log::warn!("keeping malformed {} raw: {e}", sid::name(raw.sid));
                    records.push(Self::raw(raw));
                }
            }
        }
        records
    }

    fn write_body(&self, body: &mut Vec<u8>) {
        match self {
            Record::Bof(r) => r.write(body),
            Record::Eof | Record::Empty(_) => {}
            Record::Short { value, .. } => write_u16(body, *value),
            Record::Double { value, .. } => write_f64(body, *value),
            Record::WriteAccess(r) => r.write(body),
            Record::TabId(r) => r.write(body),
            Record::WindowOne(r) => r.write(body),
            Record::Font(r) => r.write(body),
            Record::Format(r) => r.write(body),
            Record::ExtendedFormat(r) => r.write(body),
            Record::Style(r) => r.write(body),
            Record::BoundSheet(r) => r.write(body),
            Record::Country(r) => r.write(body),
            Record::Palette(r) => r.write(body),
            Record::FileSharing(r) => r.write(body),
            Record::RecalcId(r) => r.write(body),
            // Framed by `serialize`
            Record::Sst(_) => {}
            Record::ExtSst(r) => r.write(body),
            Record::SupBook(r) => r.write(body),
            Record::ExternSheet(r) => r.write(body),
            Record::ExternalName(r) => r.write(body),
            Record::Name(r) => r.write(body),
            Record::NameComment(r) => r.write(body),
            Record::CrnCount(r) => r.write(body),
            Record::DrawingGroup(records) => {
                for r in records {
                    r.serialize(body);
                }
            }
            Record::Index(r) => r.write(body),
            Record::Dimensions(r) => r.write(body),
            Record::Row(r) => r.write(body),
            Record::DbCell(r) => r.write(body),
            Record::ColumnInfo(r) => r.write(body),
            Record::DefaultRowHeight(r) => r.write(body),
            Record::Guts(r) => r.write(body),
            Record::PageBreak(r) => r.write(body),
            Record::HeaderFooter(r) => r.write(body),
            Record::PrintSetup(r) => r.write(body),
            Record::WindowTwo(r) => r.write(body),
            Record::Selection(r) => r.write(body),
            Record::Pane(r) => r.write(body),
            Record::Scl(r) => r.write(body),
            Record::MergeCells(r) => r.write(body),
            Record::Dval(r) => r.write(body),
            Record::Number(r) => r.write(body),
            Record::LabelSst(r) => r.write(body),
            Record::Label(r) => r.write(body),
            Record::Blank(r) => r.write(body),
            Record::BoolErr(r) => r.write(body),
            Record::Formula(r) => r.write(body),
            Record::StringValue(r) => r.write(body),
            Record::SharedFormula(r) => r.write(body),
            Record::Array(r) => r.write(body),
            Record::Table(r) => r.write(body),
            Record::Unknown { data, .. } => body.extend_from_slice(data),
        }
    }

    /// Append the record (header, body and any CONTINUE records) to `out`.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Record::Sst(sst) => {
                sst.serialize(out);
            }
            Record::Eof | Record::Empty(_) => write_header(out, self.sid(), 0),
            _ => {
                let mut body = Vec::new();
                self.write_body(&mut body);
                write_record(out, self.sid(), &body);
            }
        }
    }

    /// Exact number of bytes `serialize` appends.
    pub fn record_size(&self) -> usize {
        match self {
            Record::Eof | Record::Empty(_) => 4,
            Record::Short { .. } => 6,
            Record::Double { .. } => 12,
            _ => {
                let mut scratch = Vec::new();
                self.serialize(&mut scratch);
                scratch.len()
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize(&mut out);
        out
    }

    /// Row/column/format of a cell value record.
    pub fn cell_header(&self) -> Option<&CellHeader> {
        match self {
            Record::Number(r) => Some(&r.cell),
            Record::LabelSst(r) => Some(&r.cell),
            Record::Label(r) => Some(&r.cell),
            Record::Blank(r) => Some(&r.cell),
            Record::BoolErr(r) => Some(&r.cell),
            Record::Formula(r) => Some(&r.cell),
            _ => None,
        }
    }

    pub fn cell_header_mut(&mut self) -> Option<&mut CellHeader> {
        match self {
            Record::Number(r) => Some(&mut r.cell),
            Record::LabelSst(r) => Some(&mut r.cell),
            Record::Label(r) => Some(&mut r.cell),
            Record::Blank(r) => Some(&mut r.cell),
            Record::BoolErr(r) => Some(&mut r.cell),
            Record::Formula(r) => Some(&mut r.cell),
            _ => None,
        }
    }

    pub fn is_value_record(&self) -> bool {
        self.cell_header().is_some()
    }

    /// Value of a `Short` record with the given sid.
    pub fn short_value(&self, record_sid: u16) -> Option<u16> {
        match self {
            Record::Short { sid, value } if *sid == record_sid => Some(*value),
            _ => None,
        }
    }

    pub fn set_short_value(&mut self, new_value: u16) -> bool {
        match self {
            Record::Short { value, .. } => {
                *value = new_value;
                true
            }
            _ => false,
        }
    }

    pub fn double_value(&self, record_sid: u16) -> Option<f64> {
        match self {
            Record::Double { sid, value } if *sid == record_sid => Some(*value),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        sid::name(self.sid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::read_records_from_bytes;
    use pretty_assertions::assert_eq;

    fn raw(record_sid: u16, data: &[u8]) -> RawRecord {
        RawRecord::new(record_sid, data.to_vec())
    }

    #[test]
    fn short_records_keep_their_sid() {
        let rec = Record::decode(&raw(sid::CODEPAGE, &[0xB0, 0x04]));
        assert_eq!(rec, Record::short(sid::CODEPAGE, 1200));
        assert_eq!(rec.to_bytes(), vec![0x42, 0x00, 0x02, 0x00, 0xB0, 0x04]);
        assert_eq!(rec.record_size(), 6);
    }

    #[test]
    fn odd_length_short_record_stays_raw() {
        let rec = Record::decode(&raw(sid::MMS, &[0, 0, 0]));
        assert!(matches!(rec, Record::Unknown { sid: sid::MMS, .. }));
        assert_eq!(rec.record_size(), 7);
    }

    #[test]
    fn malformed_typed_record_falls_back_to_unknown() {
        let rec = Record::decode(&raw(sid::DIMENSION, &[1, 2, 3]));
        assert_eq!(
            rec,
            Record::Unknown {
                sid: sid::DIMENSION,
                data: vec![1, 2, 3]
            }
        );
    }

    #[test]
    fn mulblank_and_rk_are_expanded() {
        let raws = vec![
            raw(sid::MULBLANK, &[0, 0, 0, 0, 15, 0, 15, 0, 1, 0]),
            raw(sid::RK, &[1, 0, 0, 0, 15, 0, 0x0A, 0, 0, 0]),
        ];
        let records = Record::decode_records(&raws);
        let sids: Vec<u16> = records.iter().map(Record::sid).collect();
        assert_eq!(sids, vec![sid::BLANK, sid::BLANK, sid::NUMBER]);
        match &records[2] {
            Record::Number(n) => assert_eq!(n.value, 2.0),
            other => panic!("expected NUMBER, got {other:?}"),
        }
    }

    #[test]
    fn record_size_matches_serialized_bytes() {
        let mut sst = SstRecord::new();
        sst.add_string(UnicodeString::new("hello"));
        let records = vec![
            Record::Bof(BofRecord::workbook()),
            Record::Empty(sid::INTERFACEEND),
            Record::Font(FontRecord::default()),
            Record::Sst(sst),
            Record::ExternSheet(ExternSheetRecord::new()),
            Record::HeaderFooter(HeaderFooterRecord::header("")),
            Record::Eof,
        ];
        for r in &records {
            assert_eq!(r.record_size(), r.to_bytes().len(), "{}", r.name());
        }
    }

    #[test]
    fn unknown_records_are_written_back_unchanged() {
        let mut bytes = Vec::new();
        write_record(&mut bytes, 0x0867, &[1, 2, 3, 4]);
        write_record(&mut bytes, sid::EOF, &[]);
        let raws = read_records_from_bytes(&bytes).unwrap();
        let mut out = Vec::new();
        for r in Record::decode_records(&raws) {
            r.serialize(&mut out);
        }
        assert_eq!(out, bytes);
    }
}
