//! Workbook globals.
//!
//! [`InternalWorkbook`] owns the globals record list, from the workbook BOF
//! to its EOF, and keeps typed views next to it: the sheet list, the number
//! formats, the link table and the drawing manager. Every structural edit goes
//! through [`WorkbookRecordList`] so the remembered positions of the FONT, XF,
//! BOUNDSHEET, TABID, PROTECT and BACKUP records stay right.

mod defaults;

pub use defaults::CODEPAGE_UTF_16;

use ahash::AHashMap;
use duke_xls_records::escher::{
    EscherBody, EscherDgg, EscherRecord, BSE, BSTORE_CONTAINER, DGG, DGG_CONTAINER, OPT, PROP_BLIP_TO_DISPLAY,
    SPLIT_MENU_COLORS,
};
use duke_xls_records::record::{
    BoundSheetRecord, ExtSstRecord, ExtendedFormatRecord, FileSharingRecord, FontRecord, FormatRecord,
    NameCommentRecord, NameRecord, PaletteRecord, RecalcIdRecord, SheetVisibility, SstRecord, StyleRecord,
    UnicodeString, WindowOneRecord, WriteAccessRecord, BUILTIN_FILTER_DB,
};
use duke_xls_records::{sid, Record};
use log::{debug, trace, warn};

use crate::drawing::DrawingManager;
use crate::error::{XlsError, XlsResult};
use crate::formula_shifter::FormulaShifter;
use crate::link_table::{ExternalName, ExternalSheet, LinkTable, NameXRef};
use crate::options::WorkbookOptions;
use crate::password::xor_verifier;
use crate::record_list::{Anchor, WorkbookRecordList};
use crate::sheet::Sheet;
use crate::stream::RecordStream;

/// Excel compares sheet names on this many characters and truncates longer
/// ones.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// First id handed out to a user-defined number format.
const FIRST_USER_FORMAT_ID: u16 = 0xA4;

/// Logical font index of the record at `real` position in the font table.
/// There is no font 4.
fn logical_font_index(real: usize) -> usize {
    if real > 3 {
        real + 1
    } else {
        real
    }
}

fn truncated_sheet_name(name: &str) -> String {
    name.chars().take(MAX_SHEET_NAME_LEN).collect()
}

fn same_sheet_name(a: &str, b: &str) -> bool {
    truncated_sheet_name(a).to_lowercase() == truncated_sheet_name(b).to_lowercase()
}

#[derive(Debug, Clone)]
pub struct InternalWorkbook {
    records: WorkbookRecordList,
    link_table: Option<LinkTable>,
    bound_sheets: Vec<BoundSheetRecord>,
    formats: Vec<FormatRecord>,
    hyperlinks: Vec<Record>,
    num_fonts: usize,
    num_xfs: usize,
    max_format_id: u16,
    uses_1904_dates: bool,
    has_window_one: bool,
    drawing_manager: Option<DrawingManager>,
    name_comments: AHashMap<String, NameCommentRecord>,
    options: WorkbookOptions,
}

impl InternalWorkbook {
    fn empty(options: WorkbookOptions) -> Self {
        Self {
            records: WorkbookRecordList::new(),
            link_table: None,
            bound_sheets: Vec::new(),
            formats: Vec::new(),
            hyperlinks: Vec::new(),
            num_fonts: 0,
            num_xfs: 0,
            max_format_id: 0,
            uses_1904_dates: false,
            has_window_one: false,
            drawing_manager: None,
            name_comments: AHashMap::new(),
            options,
        }
    }

    /// Read the globals from `rs`, consuming through the globals EOF.
    pub fn create_workbook(rs: &mut RecordStream) -> XlsResult<Self> {
        let bof = match rs.next()? {
            Record::Bof(bof) => bof,
            other => {
                return Err(XlsError::format(format!(
                    "workbook globals must start with BOF, found {}",
                    other.name()
                )))
            }
        };
        if bof.bof_type != sid::BOF_WORKBOOK_GLOBALS {
            return Err(XlsError::UnsupportedVersion(format!(
                "expected a workbook globals BOF, got type 0x{:04X}",
                bof.bof_type
            )));
        }
        if bof.version != sid::BIFF8_VERSION {
            return Err(XlsError::UnsupportedVersion(format!(
                "expected BIFF8 (0x0600), got 0x{:04X}",
                bof.version
            )));
        }

        let mut wb = Self::empty(WorkbookOptions::default());
        wb.records.push(Record::Bof(bof));
        loop {
            let next = rs
                .peek_next_sid()
                .ok_or_else(|| XlsError::format("workbook globals end without EOF"))?;
            match next {
                sid::SUPBOOK | sid::NAME => {
                    if wb.link_table.is_some() {
                        return Err(XlsError::format("link table records are split across the globals"));
                    }
                    debug!("found link table at record {}", wb.records.len());
                    wb.link_table = Some(LinkTable::read(rs, &mut wb.records, &mut wb.name_comments)?);
                    continue;
                }
                sid::EXTERNSHEET => return Err(XlsError::format("EXTERNSHEET is part of the link table")),
                _ => {}
            }
            let record = rs.next()?;
            let is_eof = matches!(record, Record::Eof);
            wb.categorize(&record);
            wb.records.push(record);
            if is_eof {
                break;
            }
        }

        if !wb.has_window_one {
            warn!("workbook has no WINDOW1 record, using defaults");
        }
        if wb.records.anchor(Anchor::TabId).is_none() {
            warn!("workbook has no TABID record");
        }
        debug!(
            "workbook globals: {} records, {} sheets, {} fonts, {} XFs, {} formats",
            wb.records.len(),
            wb.bound_sheets.len(),
            wb.num_fonts,
            wb.num_xfs,
            wb.formats.len()
        );
        Ok(wb)
    }

    /// Note what `record` is before it is appended to the list.
    fn categorize(&mut self, record: &Record) {
        let pos = self.records.len();
        match record {
            Record::BoundSheet(bs) => {
                self.bound_sheets.push(bs.clone());
                self.records.set_anchor(Anchor::BoundSheet, Some(pos));
            }
            Record::Font(_) => {
                self.records.set_anchor(Anchor::Font, Some(pos));
                self.num_fonts += 1;
            }
            Record::ExtendedFormat(_) => {
                self.records.set_anchor(Anchor::ExtendedFormat, Some(pos));
                self.num_xfs += 1;
            }
            Record::TabId(_) => self.records.set_anchor(Anchor::TabId, Some(pos)),
            Record::Palette(_) => self.records.set_anchor(Anchor::Palette, Some(pos)),
            Record::Format(f) => {
                self.max_format_id = self.max_format_id.max(f.index_code);
                self.formats.push(f.clone());
            }
            Record::WindowOne(_) => self.has_window_one = true,
            Record::NameComment(c) => {
                self.name_comments.insert(c.name_text.clone(), c.clone());
            }
            Record::Short { sid: sid::PROTECT, .. } => self.records.set_anchor(Anchor::Protect, Some(pos)),
            Record::Short { sid: sid::BACKUP, .. } => self.records.set_anchor(Anchor::Backup, Some(pos)),
            Record::Short {
                sid: sid::DATEMODE,
                value,
            } => self.uses_1904_dates = *value == 1,
            other => trace!("globals record {} at {pos}", other.name()),
        }
    }

    /// A blank workbook holding one bound sheet, with the globals Excel
    /// writes for a new file.
    pub fn create_workbook_default(options: &WorkbookOptions) -> XlsResult<Self> {
        let mut wb = Self::empty(options.clone());
        wb.records = defaults::globals_records(options)?;
        wb.num_fonts = wb.records.count_by_sid(sid::FONT);
        wb.num_xfs = wb.records.count_by_sid(sid::XF);
        wb.formats = defaults::default_formats();
        wb.max_format_id = wb.formats.iter().map(|f| f.index_code).max().unwrap_or(0);
        wb.bound_sheets = vec![BoundSheetRecord::new(&options.sheet_name(0))];
        wb.has_window_one = true;

        let mut link_table = LinkTable::new(1, &mut wb.records)?;
        link_table.check_extern_sheet(&mut wb.records, 0, 0)?;
        wb.link_table = Some(link_table);
        debug!("created blank workbook with {} globals records", wb.records.len());
        Ok(wb)
    }

    /// Keep the HLINK records found among `records` (the ones trailing the
    /// globals EOF).
    pub(crate) fn collect_hyperlinks(&mut self, records: &[Record]) {
        self.hyperlinks
            .extend(records.iter().filter(|r| r.sid() == sid::HLINK).cloned());
        if !self.hyperlinks.is_empty() {
            debug!("{} hyperlink records", self.hyperlinks.len());
        }
    }

    pub fn options(&self) -> &WorkbookOptions {
        &self.options
    }

    // ── Fonts ───────────────────────────────────────────────────────────

    fn font_base(&self) -> XlsResult<usize> {
        let last = self
            .records
            .anchor(Anchor::Font)
            .ok_or_else(|| XlsError::format("workbook has no FONT records"))?;
        Ok(last + 1 - self.num_fonts)
    }

    fn font_position(&self, index: usize) -> XlsResult<usize> {
        if index == 4 {
            return Err(XlsError::argument("there is no font with index 4"));
        }
        let real = if index > 4 { index - 1 } else { index };
        if real >= self.num_fonts {
            return Err(XlsError::argument(format!(
                "there are only {} font records, you asked for {index}",
                self.num_fonts
            )));
        }
        Ok(self.font_base()? + real)
    }

    pub fn font_record_at(&self, index: usize) -> XlsResult<&FontRecord> {
        let pos = self.font_position(index)?;
        match self.records.get(pos) {
            Some(Record::Font(font)) => Ok(font),
            _ => Err(XlsError::format(format!("record {pos} is not a FONT"))),
        }
    }

    pub fn font_record_at_mut(&mut self, index: usize) -> XlsResult<&mut FontRecord> {
        let pos = self.font_position(index)?;
        match self.records.get_mut(pos) {
            Some(Record::Font(font)) => Ok(font),
            _ => Err(XlsError::format(format!("record {pos} is not a FONT"))),
        }
    }

    /// Logical index of `font`. A reference obtained from
    /// [`InternalWorkbook::font_record_at`] maps back to the index it came
    /// from; any other font matches the first equal record.
    pub fn font_index(&self, font: &FontRecord) -> XlsResult<usize> {
        let base = self.font_base()?;
        let fonts: Vec<Option<&FontRecord>> = (0..self.num_fonts)
            .map(|i| match self.records.get(base + i) {
                Some(Record::Font(f)) => Some(f),
                _ => None,
            })
            .collect();
        let real = fonts
            .iter()
            .position(|f| f.map_or(false, |f| std::ptr::eq(f, font)))
            .or_else(|| fonts.iter().position(|f| *f == Some(font)))
            .ok_or_else(|| XlsError::argument("could not find that font"))?;
        Ok(logical_font_index(real))
    }

    /// Append a default font after the last one, returning its index.
    pub fn create_new_font(&mut self) -> XlsResult<usize> {
        let last = self
            .records
            .anchor(Anchor::Font)
            .ok_or_else(|| XlsError::format("workbook has no FONT records"))?;
        self.records.add(last + 1, Record::Font(FontRecord::default()));
        self.records.set_anchor(Anchor::Font, Some(last + 1));
        self.num_fonts += 1;
        Ok(logical_font_index(self.num_fonts - 1))
    }

    /// Remove the font at `index`. Fonts after it move down one index; their
    /// users are not updated.
    pub fn remove_font_record(&mut self, index: usize) -> XlsResult<FontRecord> {
        let pos = self.font_position(index)?;
        let removed = self.records.remove(pos);
        self.num_fonts -= 1;
        if self.num_fonts == 0 {
            self.records.set_anchor(Anchor::Font, None);
        }
        match removed {
            Some(Record::Font(font)) => Ok(font),
            _ => Err(XlsError::format(format!("record {pos} was not a FONT"))),
        }
    }

    pub fn number_of_font_records(&self) -> usize {
        self.num_fonts
    }

    // ── Extended formats and styles ─────────────────────────────────────

    fn xf_position(&self, index: usize) -> Option<usize> {
        let last = self.records.anchor(Anchor::ExtendedFormat)?;
        (index < self.num_xfs).then(|| last + 1 - self.num_xfs + index)
    }

    pub fn ex_format_at(&self, index: usize) -> Option<&ExtendedFormatRecord> {
        match self.records.get(self.xf_position(index)?) {
            Some(Record::ExtendedFormat(xf)) => Some(xf),
            _ => None,
        }
    }

    pub fn ex_format_at_mut(&mut self, index: usize) -> Option<&mut ExtendedFormatRecord> {
        let pos = self.xf_position(index)?;
        match self.records.get_mut(pos) {
            Some(Record::ExtendedFormat(xf)) => Some(xf),
            _ => None,
        }
    }

    pub fn number_of_ex_formats(&self) -> usize {
        self.num_xfs
    }

    /// Append a default cell XF, returning its index.
    pub fn create_cell_xf(&mut self) -> XlsResult<usize> {
        let last = self
            .records
            .anchor(Anchor::ExtendedFormat)
            .ok_or_else(|| XlsError::format("workbook has no XF records"))?;
        self.records
            .add(last + 1, Record::ExtendedFormat(ExtendedFormatRecord::cell_default()));
        self.records.set_anchor(Anchor::ExtendedFormat, Some(last + 1));
        self.num_xfs += 1;
        Ok(self.num_xfs - 1)
    }

    /// Remove XF `index`. Later XFs move down one index; cells pointing at
    /// them are not updated.
    pub fn remove_ex_format_record(&mut self, index: usize) -> XlsResult<ExtendedFormatRecord> {
        let pos = self
            .xf_position(index)
            .ok_or_else(|| XlsError::argument(format!("no XF at index {index}")))?;
        let removed = self.records.remove(pos);
        self.num_xfs -= 1;
        if self.num_xfs == 0 {
            self.records.set_anchor(Anchor::ExtendedFormat, None);
        }
        match removed {
            Some(Record::ExtendedFormat(xf)) => Ok(xf),
            _ => Err(XlsError::format(format!("record {pos} was not an XF"))),
        }
    }

    /// STYLE records sit right after the XF block.
    fn style_scan_start(&self) -> usize {
        self.records.anchor(Anchor::ExtendedFormat).unwrap_or(0)
    }

    /// The STYLE record for XF `xf_index`, if that XF has one.
    pub fn style_record(&self, xf_index: u16) -> Option<&StyleRecord> {
        self.records.records()[self.style_scan_start()..]
            .iter()
            .find_map(|r| match r {
                Record::Style(s) if s.xf_index == xf_index => Some(s),
                _ => None,
            })
    }

    pub fn style_record_mut(&mut self, xf_index: u16) -> Option<&mut StyleRecord> {
        let start = self.style_scan_start();
        let pos = (start..self.records.len())
            .find(|&i| matches!(self.records.get(i), Some(Record::Style(s)) if s.xf_index == xf_index))?;
        match self.records.get_mut(pos) {
            Some(Record::Style(s)) => Some(s),
            _ => None,
        }
    }

    /// Re-point every STYLE record from `old_xf` to `new_xf`, returning how
    /// many changed.
    pub fn update_style_record(&mut self, old_xf: u16, new_xf: u16) -> usize {
        let mut changed = 0;
        for pos in self.style_scan_start()..self.records.len() {
            if let Some(Record::Style(s)) = self.records.get_mut(pos) {
                if s.xf_index == old_xf {
                    s.xf_index = new_xf;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Insert an unnamed user STYLE for `xf_index` at the end of the XF/STYLE
    /// block, returning its record position.
    pub fn create_style_record(&mut self, xf_index: u16) -> XlsResult<usize> {
        let start = self
            .records
            .anchor(Anchor::ExtendedFormat)
            .ok_or_else(|| XlsError::format("No XF Records found"))?;
        let pos = (start..self.records.len())
            .find(|&i| !matches!(self.records.get(i), Some(Record::ExtendedFormat(_) | Record::Style(_))))
            .ok_or_else(|| XlsError::format("No XF Records found"))?;
        self.records.add(pos, Record::Style(StyleRecord::user(xf_index, "")));
        Ok(pos)
    }

    // ── Number formats ──────────────────────────────────────────────────

    pub fn formats(&self) -> &[FormatRecord] {
        &self.formats
    }

    /// Id of the number format `format`, creating it when asked to.
    pub fn format(&mut self, format: &str, create_if_not_found: bool) -> XlsResult<Option<u16>> {
        if let Some(existing) = self.formats.iter().find(|f| f.format_string == format) {
            return Ok(Some(existing.index_code));
        }
        if create_if_not_found {
            return self.create_format(format).map(Some);
        }
        Ok(None)
    }

    /// Add a FORMAT record after the existing ones, returning its new id.
    pub fn create_format(&mut self, format: &str) -> XlsResult<u16> {
        let id = if self.max_format_id >= FIRST_USER_FORMAT_ID {
            self.max_format_id
                .checked_add(1)
                .ok_or_else(|| XlsError::argument("no number format ids left"))?
        } else {
            FIRST_USER_FORMAT_ID
        };
        let pos = match self.records.find_first_loc_by_sid(sid::FORMAT) {
            Some(first) => first + self.formats.len(),
            None => {
                self.records
                    .anchor(Anchor::Font)
                    .ok_or_else(|| XlsError::format("no FONT or FORMAT records to place a format after"))?
                    + 1
            }
        };
        let record = FormatRecord::new(id, format);
        self.records.add(pos, Record::Format(record.clone()));
        self.formats.push(record);
        self.max_format_id = id;
        Ok(id)
    }

    // ── Shared strings ──────────────────────────────────────────────────

    pub fn sst(&self) -> Option<&SstRecord> {
        match self.records.find_first_by_sid(sid::SST)? {
            Record::Sst(sst) => Some(sst),
            _ => None,
        }
    }

    fn sst_mut(&mut self) -> XlsResult<&mut SstRecord> {
        let pos = match self.records.find_first_loc_by_sid(sid::SST) {
            Some(pos) => pos,
            None => {
                self.insert_sst();
                self.records
                    .find_first_loc_by_sid(sid::SST)
                    .ok_or_else(|| XlsError::format("SST record could not be inserted"))?
            }
        };
        match self.records.get_mut(pos) {
            Some(Record::Sst(sst)) => Ok(sst),
            _ => Err(XlsError::format("SST record could not be decoded")),
        }
    }

    /// Add SST and EXTSST records just before EOF.
    pub fn insert_sst(&mut self) {
        debug!("creating new SST");
        let eof = self.records.len().saturating_sub(1);
        self.records.add(eof, Record::ExtSst(ExtSstRecord::default()));
        self.records.add(eof, Record::Sst(SstRecord::new()));
    }

    /// Add a reference to `string`, returning its SST index.
    pub fn add_sst_string(&mut self, string: UnicodeString) -> XlsResult<u32> {
        trace!("adding SST string {:?}", string.text);
        Ok(self.sst_mut()?.add_string(string))
    }

    pub fn sst_string(&self, index: usize) -> Option<&UnicodeString> {
        self.sst()?.string(index)
    }

    // ── Sheets ──────────────────────────────────────────────────────────

    pub fn bound_sheets(&self) -> &[BoundSheetRecord] {
        &self.bound_sheets
    }

    pub fn num_sheets(&self) -> usize {
        self.bound_sheets.len()
    }

    fn bound_sheet_pos(&self, index: usize) -> XlsResult<usize> {
        let last = self
            .records
            .anchor(Anchor::BoundSheet)
            .ok_or_else(|| XlsError::format("workbook has no BOUNDSHEET records"))?;
        Ok(last + 1 - self.bound_sheets.len() + index)
    }

    /// Write the typed bound sheet `index` through to the record list.
    fn sync_bound_sheet(&mut self, index: usize) -> XlsResult<()> {
        let pos = self.bound_sheet_pos(index)?;
        let record = self
            .bound_sheets
            .get(index)
            .cloned()
            .ok_or_else(|| XlsError::argument(format!("no sheet at index {index}")))?;
        let slot = self
            .records
            .get_mut(pos)
            .filter(|r| matches!(r, Record::BoundSheet(_)))
            .ok_or_else(|| XlsError::format(format!("record {pos} is not a BOUNDSHEET")))?;
        *slot = Record::BoundSheet(record);
        Ok(())
    }

    /// Make sure sheet `index` exists. One past the end adds a bound sheet
    /// with a generated name; further out is an error.
    fn check_sheets(&mut self, index: usize) -> XlsResult<()> {
        let count = self.bound_sheets.len();
        if index < count {
            return Ok(());
        }
        if index > count {
            return Err(XlsError::argument(format!(
                "sheet number {index} is out of bounds for {count} sheets"
            )));
        }
        let pos = match self.records.anchor(Anchor::BoundSheet) {
            Some(last) => last + 1,
            None => self
                .records
                .find_first_loc_by_sid(sid::COUNTRY)
                .ok_or_else(|| XlsError::format("no BOUNDSHEET or COUNTRY record to place a sheet at"))?,
        };
        let record = BoundSheetRecord::new(&self.options.sheet_name(index));
        self.records.add(pos, Record::BoundSheet(record.clone()));
        self.records.set_anchor(Anchor::BoundSheet, Some(pos));
        self.bound_sheets.push(record);

        let (link_table, records) = self.link_table_and_records()?;
        link_table.check_extern_sheet(records, index as i16, index as i16)?;
        self.fix_tab_id();
        debug!("added bound sheet {index}");
        Ok(())
    }

    /// Add a bound sheet named `name` at the end, returning its index.
    pub fn add_bound_sheet(&mut self, name: &str) -> XlsResult<usize> {
        let index = self.bound_sheets.len();
        self.set_sheet_name(index, name)?;
        Ok(index)
    }

    pub fn set_sheet_bof(&mut self, index: usize, pos: u32) -> XlsResult<()> {
        trace!("setting BOF for sheet {index} at {pos}");
        self.check_sheets(index)?;
        self.bound_sheets[index].position_of_bof = pos;
        self.sync_bound_sheet(index)
    }

    pub fn sheet_name(&self, index: usize) -> Option<&str> {
        self.bound_sheets.get(index).map(|bs| bs.sheet_name.as_str())
    }

    /// Rename sheet `index`, truncating to 31 characters as Excel does.
    /// Naming the sheet one past the end creates it.
    pub fn set_sheet_name(&mut self, index: usize, name: &str) -> XlsResult<()> {
        self.check_sheets(index)?;
        self.bound_sheets[index].sheet_name = truncated_sheet_name(name);
        self.sync_bound_sheet(index)
    }

    /// Whether another sheet already has `name`, compared without case on
    /// the first 31 characters.
    pub fn contains_sheet_name(&self, name: &str, exclude: Option<usize>) -> bool {
        self.bound_sheets
            .iter()
            .enumerate()
            .any(|(i, bs)| Some(i) != exclude && same_sheet_name(name, &bs.sheet_name))
    }

    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        let wanted = name.to_lowercase();
        self.bound_sheets
            .iter()
            .position(|bs| bs.sheet_name.to_lowercase() == wanted)
    }

    /// Move the sheet called `name` to position `pos`, carrying sheet-scoped
    /// names and 3-D references in name definitions along.
    pub fn set_sheet_order(&mut self, name: &str, pos: usize) -> XlsResult<()> {
        let from = self
            .sheet_index(name)
            .ok_or_else(|| XlsError::argument(format!("no sheet named '{name}'")))?;
        if pos >= self.bound_sheets.len() {
            return Err(XlsError::argument(format!(
                "sheet position {pos} is out of bounds for {} sheets",
                self.bound_sheets.len()
            )));
        }
        if from == pos {
            return Ok(());
        }
        let base = self.bound_sheet_pos(0)?;
        let last = base + self.bound_sheets.len() - 1;
        let sheet = self.bound_sheets.remove(from);
        self.bound_sheets.insert(pos, sheet);
        if let Some(record) = self.records.remove(base + from) {
            self.records.add(base + pos, record);
        }
        self.records.set_anchor(Anchor::BoundSheet, Some(last));

        let shifter = FormulaShifter::for_sheet_move(from, pos);
        self.renumber_names(|n| {
            if n == 0 {
                0
            } else {
                (shifter.adjust_sheet_index(n as i16 - 1) + 1) as u16
            }
        })?;
        self.update_names_after_cell_shift(&shifter)?;
        debug!("moved sheet {name:?} from {from} to {pos}");
        Ok(())
    }

    pub fn sheet_visibility(&self, index: usize) -> Option<SheetVisibility> {
        self.bound_sheets.get(index).map(|bs| bs.visibility)
    }

    pub fn set_sheet_visibility(&mut self, index: usize, visibility: SheetVisibility) -> XlsResult<()> {
        self.check_sheets(index)?;
        self.bound_sheets[index].visibility = visibility;
        self.sync_bound_sheet(index)
    }

    /// Remove sheet `index`. Names local to it become workbook names; names
    /// local to later sheets follow their sheet down one place.
    pub fn remove_sheet(&mut self, index: usize) -> XlsResult<()> {
        if index >= self.bound_sheets.len() {
            return Err(XlsError::argument(format!(
                "sheet number {index} is out of bounds for {} sheets",
                self.bound_sheets.len()
            )));
        }
        let pos = self.bound_sheet_pos(index)?;
        self.records.remove(pos);
        self.bound_sheets.remove(index);
        if self.bound_sheets.is_empty() {
            self.records.set_anchor(Anchor::BoundSheet, None);
        }
        self.fix_tab_id();

        let removed = index as u16 + 1;
        self.renumber_names(|n| {
            if n == removed {
                0
            } else if n > removed {
                n - 1
            } else {
                n
            }
        })?;
        if let Some(link_table) = self.link_table.as_mut() {
            link_table.remove_sheet(&mut self.records, index as i16);
        }
        debug!("removed sheet {index}");
        Ok(())
    }

    fn renumber_names(&mut self, map: impl Fn(u16) -> u16) -> XlsResult<()> {
        let Some(link_table) = self.link_table.as_mut() else {
            return Ok(());
        };
        for i in 0..link_table.num_names() {
            let current = link_table.name_record(i).map_or(0, |n| n.sheet_number);
            let updated = map(current);
            if updated != current {
                link_table.update_name(&mut self.records, i, |n| n.sheet_number = updated)?;
            }
        }
        Ok(())
    }

    /// Rewrite TABID to `0..n` for the current sheets.
    fn fix_tab_id(&mut self) {
        let Some(pos) = self.records.anchor(Anchor::TabId) else {
            return;
        };
        let count = self.bound_sheets.len() as u16;
        if let Some(Record::TabId(tab)) = self.records.get_mut(pos) {
            tab.tab_ids = (0..count).collect();
        }
    }

    // ── Defined names ───────────────────────────────────────────────────

    fn link_table_and_records(&mut self) -> XlsResult<(&mut LinkTable, &mut WorkbookRecordList)> {
        let link_table = match self.link_table.take() {
            Some(link_table) => link_table,
            None => LinkTable::new(self.bound_sheets.len() as u16, &mut self.records)?,
        };
        Ok((self.link_table.insert(link_table), &mut self.records))
    }

    pub fn link_table(&self) -> Option<&LinkTable> {
        self.link_table.as_ref()
    }

    pub fn num_names(&self) -> usize {
        self.link_table.as_ref().map_or(0, LinkTable::num_names)
    }

    pub fn name_record(&self, index: usize) -> Option<&NameRecord> {
        self.link_table.as_ref()?.name_record(index)
    }

    pub fn names(&self) -> &[NameRecord] {
        self.link_table.as_ref().map_or(&[], LinkTable::names)
    }

    /// Edit name `index` in place.
    pub fn update_name<F>(&mut self, index: usize, f: F) -> XlsResult<()>
    where
        F: FnOnce(&mut NameRecord),
    {
        let link_table = self
            .link_table
            .as_mut()
            .ok_or_else(|| XlsError::argument(format!("no defined name at index {index}")))?;
        link_table.update_name(&mut self.records, index, f)
    }

    /// Add `name`, rejecting one whose text and scope are already taken.
    pub fn add_name(&mut self, name: NameRecord) -> XlsResult<usize> {
        let (link_table, records) = self.link_table_and_records()?;
        if link_table.name_already_exists(&name) {
            return Err(XlsError::argument(format!(
                "the workbook already contains the name '{}' for sheet number {}",
                name.name_text(),
                name.sheet_number
            )));
        }
        link_table.add_name(records, name)
    }

    /// Add a user name with `text`, local to 1-based `sheet_number` (0 for
    /// the whole workbook).
    pub fn create_name(&mut self, text: &str, sheet_number: u16) -> XlsResult<usize> {
        self.add_name(NameRecord::new(text, sheet_number))
    }

    /// Add built-in name `code` for 1-based `sheet_number`.
    pub fn create_built_in_name(&mut self, code: u8, sheet_number: usize) -> XlsResult<usize> {
        if sheet_number + 1 > i16::MAX as usize {
            return Err(XlsError::argument(format!("sheet number [{sheet_number}] is not valid")));
        }
        let name = NameRecord::built_in(code, sheet_number as u16);
        let (link_table, records) = self.link_table_and_records()?;
        if link_table.name_already_exists(&name) {
            return Err(XlsError::argument(format!(
                "built-in name ({}) already exists for sheet ({sheet_number})",
                name.name_text()
            )));
        }
        link_table.add_name(records, name)
    }

    pub fn remove_name(&mut self, index: usize) -> XlsResult<NameRecord> {
        let link_table = self
            .link_table
            .as_mut()
            .filter(|lt| index < lt.num_names())
            .ok_or_else(|| XlsError::argument(format!("no defined name at index {index}")))?;
        if let Some(pos) = self.records.find_nth_loc_by_sid(sid::NAME, index) {
            self.records.remove(pos);
        }
        let removed = link_table
            .remove_name(index)
            .ok_or_else(|| XlsError::argument(format!("no defined name at index {index}")))?;
        if link_table.num_names() == 0 {
            self.records.set_anchor(Anchor::Name, None);
        }
        Ok(removed)
    }

    pub fn specific_builtin_record(&self, code: u8, sheet_number: u16) -> Option<&NameRecord> {
        let link_table = self.link_table.as_ref()?;
        link_table.name_record(link_table.specific_builtin_index(code, sheet_number)?)
    }

    pub fn remove_builtin_record(&mut self, code: u8, sheet_number: u16) -> bool {
        match self.link_table.as_mut() {
            Some(link_table) => link_table.remove_builtin_record(&mut self.records, code, sheet_number),
            None => false,
        }
    }

    pub fn name_comment(&self, name_text: &str) -> Option<&NameCommentRecord> {
        self.name_comments.get(name_text)
    }

    /// Re-key `comment` under its current name text.
    pub fn update_name_comment_record_cache(&mut self, comment: NameCommentRecord) {
        self.name_comments.retain(|_, c| *c != comment);
        self.name_comments.insert(comment.name_text.clone(), comment);
    }

    // ── References through the link table ──────────────────────────────

    fn sheet_name_for(&self, index: Option<i16>) -> Option<&str> {
        let index = usize::try_from(index?).ok()?;
        self.sheet_name(index)
    }

    pub fn find_sheet_first_name_from_extern_sheet(&self, extern_sheet_index: usize) -> Option<&str> {
        let link_table = self.link_table.as_ref()?;
        self.sheet_name_for(link_table.first_internal_sheet_index(extern_sheet_index))
    }

    pub fn find_sheet_last_name_from_extern_sheet(&self, extern_sheet_index: usize) -> Option<&str> {
        let link_table = self.link_table.as_ref()?;
        self.sheet_name_for(link_table.last_internal_sheet_index(extern_sheet_index))
    }

    pub fn first_sheet_index_from_extern_sheet_index(&self, extern_sheet_index: usize) -> Option<i16> {
        self.link_table.as_ref()?.first_internal_sheet_index(extern_sheet_index)
    }

    pub fn last_sheet_index_from_extern_sheet_index(&self, extern_sheet_index: usize) -> Option<i16> {
        self.link_table.as_ref()?.last_internal_sheet_index(extern_sheet_index)
    }

    /// Workbook and sheet names behind an entry pointing at another file.
    pub fn external_sheet(&self, extern_sheet_index: usize) -> Option<ExternalSheet> {
        self.link_table.as_ref()?.external_book_and_sheet_names(extern_sheet_index)
    }

    pub fn external_name(&self, extern_sheet_index: usize, name_index: usize) -> Option<ExternalName> {
        let link_table = self.link_table.as_ref()?;
        let name = link_table
            .resolve_name_x_text(extern_sheet_index, name_index, &self.bound_sheets)
            .ok()?;
        let ix = link_table
            .resolve_name_x_ix(extern_sheet_index, name_index)
            .unwrap_or(0);
        Some(ExternalName {
            name,
            index: name_index,
            ix,
        })
    }

    /// EXTERNSHEET index for sheet `sheet_index` of this workbook.
    pub fn check_extern_sheet(&mut self, sheet_index: usize) -> XlsResult<usize> {
        self.check_extern_sheet_range(sheet_index as i16, sheet_index as i16)
    }

    pub fn check_extern_sheet_range(&mut self, first: i16, last: i16) -> XlsResult<usize> {
        let (link_table, records) = self.link_table_and_records()?;
        link_table.check_extern_sheet(records, first, last)
    }

    pub fn external_sheet_index(&mut self, workbook_name: &str, first: &str, last: &str) -> XlsResult<usize> {
        let (link_table, records) = self.link_table_and_records()?;
        link_table.external_sheet_index(records, workbook_name, first, last)
    }

    pub fn link_external_workbook(&mut self, name: &str, sheet_names: &[String]) -> XlsResult<usize> {
        let (link_table, records) = self.link_table_and_records()?;
        link_table.link_external_workbook(records, name, sheet_names)
    }

    pub fn change_external_reference(&mut self, old_url: &str, new_url: &str) -> bool {
        match self.link_table.as_mut() {
            Some(link_table) => link_table.change_external_reference(&mut self.records, old_url, new_url),
            None => false,
        }
    }

    pub fn resolve_name_x_text(&self, ref_index: usize, name_index: usize) -> XlsResult<String> {
        self.link_table
            .as_ref()
            .ok_or_else(|| XlsError::argument("workbook has no link table"))?
            .resolve_name_x_text(ref_index, name_index, &self.bound_sheets)
    }

    pub fn name_x_ptg(&self, name: &str, sheet_ref_index: Option<usize>) -> Option<NameXRef> {
        self.link_table.as_ref()?.name_x_ptg(name, sheet_ref_index)
    }

    /// Register the add-in function `name`, returning where a NameX token
    /// should point.
    pub fn add_name_x_ptg(&mut self, name: &str) -> XlsResult<NameXRef> {
        if let Some(existing) = self.name_x_ptg(name, None) {
            return Ok(existing);
        }
        let (link_table, records) = self.link_table_and_records()?;
        link_table.add_name_x_ptg(records, name)
    }

    // ── Record queries ──────────────────────────────────────────────────

    pub fn records(&self) -> &WorkbookRecordList {
        &self.records
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    pub fn find_first_record_by_sid(&self, record_sid: u16) -> Option<&Record> {
        self.records.find_first_by_sid(record_sid)
    }

    pub fn find_first_record_loc_by_sid(&self, record_sid: u16) -> Option<usize> {
        self.records.find_first_loc_by_sid(record_sid)
    }

    /// The `nth` (0-based) record with this sid.
    pub fn find_next_record_by_sid(&self, record_sid: u16, nth: usize) -> Option<&Record> {
        self.records.find_nth_by_sid(record_sid, nth)
    }

    // ── Workbook settings ───────────────────────────────────────────────

    pub fn is_using_1904_date_windowing(&self) -> bool {
        self.uses_1904_dates
    }

    pub fn hyperlinks(&self) -> &[Record] {
        &self.hyperlinks
    }

    /// The PALETTE record, created after the BOF with the default colors when
    /// absent.
    pub fn custom_palette(&mut self) -> XlsResult<&mut PaletteRecord> {
        let pos = match self.records.anchor(Anchor::Palette) {
            Some(pos) => pos,
            None => {
                self.records.add(1, Record::Palette(PaletteRecord::default()));
                self.records.set_anchor(Anchor::Palette, Some(1));
                1
            }
        };
        match self.records.get_mut(pos) {
            Some(Record::Palette(palette)) => Ok(palette),
            other => Err(XlsError::format(format!(
                "expected PALETTE at {pos}, found {}",
                other.map_or("nothing", |r| r.name())
            ))),
        }
    }

    /// WINDOW1 as stored, or the default one when the file has none.
    pub fn window_one(&self) -> WindowOneRecord {
        match self.records.find_first_by_sid(sid::WINDOW1) {
            Some(Record::WindowOne(w)) => w.clone(),
            _ => WindowOneRecord::default(),
        }
    }

    /// Mutable WINDOW1, inserted before BACKUP when the file has none.
    pub fn window_one_mut(&mut self) -> XlsResult<&mut WindowOneRecord> {
        let pos = match self.records.find_first_loc_by_sid(sid::WINDOW1) {
            Some(pos) => pos,
            None => {
                let pos = self.records.anchor(Anchor::Backup).unwrap_or(1);
                self.records.add(pos, Record::WindowOne(WindowOneRecord::default()));
                self.has_window_one = true;
                pos
            }
        };
        match self.records.get_mut(pos) {
            Some(Record::WindowOne(w)) => Ok(w),
            _ => Err(XlsError::format("WINDOW1 record could not be decoded")),
        }
    }

    pub fn backup_record(&self) -> Option<&Record> {
        self.records.get(self.records.anchor(Anchor::Backup)?)
    }

    pub fn set_backup(&mut self, backup: bool) -> XlsResult<()> {
        let updated = self
            .records
            .anchor(Anchor::Backup)
            .and_then(|pos| self.records.get_mut(pos))
            .map_or(false, |r| r.set_short_value(backup as u16));
        if !updated {
            return Err(XlsError::format("BACKUP record not found"));
        }
        Ok(())
    }

    /// RECALCID, created after COUNTRY when absent.
    pub fn recalc_id(&mut self) -> XlsResult<&mut RecalcIdRecord> {
        let pos = match self.records.find_first_loc_by_sid(sid::RECALCID) {
            Some(pos) => pos,
            None => {
                let country = self
                    .records
                    .find_first_loc_by_sid(sid::COUNTRY)
                    .ok_or_else(|| XlsError::format("COUNTRY record not found"))?;
                self.records.add(country + 1, Record::RecalcId(RecalcIdRecord::default()));
                country + 1
            }
        };
        match self.records.get_mut(pos) {
            Some(Record::RecalcId(r)) => Ok(r),
            _ => Err(XlsError::format("RECALCID record could not be decoded")),
        }
    }

    // ── Protection ──────────────────────────────────────────────────────

    /// Position of the first `wanted` record, inserting `make()` after the
    /// first `after` record (or after BOF) when there is none.
    fn find_or_insert_after<F>(&mut self, wanted: u16, after: u16, make: F) -> XlsResult<usize>
    where
        F: FnOnce() -> XlsResult<Record>,
    {
        if let Some(pos) = self.records.find_first_loc_by_sid(wanted) {
            return Ok(pos);
        }
        let pos = self.records.find_first_loc_by_sid(after).map_or(1, |p| p + 1);
        self.records.add(pos, make()?);
        Ok(pos)
    }

    /// Mark the file read-only-recommended with a password, as Excel's
    /// "Protect and Share" does.
    pub fn write_protect_workbook(&mut self, password: &str, username: &str) -> XlsResult<()> {
        self.find_or_insert_after(sid::WRITEACCESS, sid::INTERFACEEND, || {
            Ok(Record::WriteAccess(WriteAccessRecord::new(username)?))
        })?;
        self.find_or_insert_after(sid::WRITEPROT, sid::BOF, || Ok(Record::Empty(sid::WRITEPROT)))?;
        let sharing = self.find_or_insert_after(sid::FILESHARING, sid::WRITEACCESS, || {
            Ok(Record::FileSharing(FileSharingRecord::default()))
        })?;
        if let Some(Record::FileSharing(fs)) = self.records.get_mut(sharing) {
            fs.read_only = 1;
            fs.password = xor_verifier(password);
            fs.username = username.to_string();
        }
        let access = WriteAccessRecord::new(username)?;
        if let Some(slot) = self
            .records
            .find_first_loc_by_sid(sid::WRITEACCESS)
            .and_then(|pos| self.records.get_mut(pos))
        {
            *slot = Record::WriteAccess(access);
        }
        debug!("workbook write protected for {username:?}");
        Ok(())
    }

    pub fn unwrite_protect_workbook(&mut self) {
        for record_sid in [sid::FILESHARING, sid::WRITEPROT] {
            if let Some(pos) = self.records.find_first_loc_by_sid(record_sid) {
                self.records.remove(pos);
            }
        }
    }

    pub fn is_write_protected(&self) -> bool {
        matches!(
            self.records.find_first_by_sid(sid::FILESHARING),
            Some(Record::FileSharing(fs)) if fs.read_only == 1
        )
    }

    /// Protect the workbook structure with `password`, or lift the
    /// protection with `None`.
    pub fn protect_structure(&mut self, password: Option<&str>) -> XlsResult<()> {
        let pos = self
            .records
            .anchor(Anchor::Protect)
            .ok_or_else(|| XlsError::format("PROTECT record not found"))?;
        let updated = self
            .records
            .get_mut(pos)
            .map_or(false, |r| r.set_short_value(password.is_some() as u16));
        if !updated {
            return Err(XlsError::format(format!("record {pos} is not PROTECT")));
        }
        let verifier = password.map_or(0, xor_verifier);
        if self.records.get(pos + 1).map(Record::sid) == Some(sid::PASSWORD) {
            if let Some(r) = self.records.get_mut(pos + 1) {
                r.set_short_value(verifier);
            }
        } else {
            self.records.add(pos + 1, Record::short(sid::PASSWORD, verifier));
        }
        Ok(())
    }

    pub fn is_structure_protected(&self) -> bool {
        self.records
            .anchor(Anchor::Protect)
            .and_then(|pos| self.records.get(pos))
            .and_then(|r| r.short_value(sid::PROTECT))
            .map_or(false, |v| v != 0)
    }

    // ── Drawing group ───────────────────────────────────────────────────

    fn drawing_group_escher(&self) -> Option<&[EscherRecord]> {
        match self.records.find_first_by_sid(sid::MSODRAWINGGROUP)? {
            Record::DrawingGroup(escher) => Some(escher),
            _ => None,
        }
    }

    fn drawing_group_escher_mut(&mut self) -> Option<&mut Vec<EscherRecord>> {
        let pos = self.records.find_first_loc_by_sid(sid::MSODRAWINGGROUP)?;
        match self.records.get_mut(pos)? {
            Record::DrawingGroup(escher) => Some(escher),
            _ => None,
        }
    }

    /// Set up the drawing manager from an existing drawing group. Returns
    /// whether there is one.
    pub fn find_drawing_group(&mut self) -> bool {
        if self.drawing_manager.is_some() {
            return true;
        }
        let Some(escher) = self.drawing_group_escher() else {
            return false;
        };
        let mut found: Option<EscherDgg> = None;
        for record in escher {
            record.walk(&mut |r| {
                if let (None, EscherBody::Dgg(dgg)) = (&found, &r.body) {
                    found = Some(dgg.clone());
                }
            });
        }
        match found {
            Some(dgg) => {
                debug!(
                    "drawing group: {} drawings, shape id max {}",
                    dgg.drawings_saved, dgg.shape_id_max
                );
                self.drawing_manager = Some(DrawingManager::new(dgg));
                true
            }
            None => {
                warn!("MSODRAWINGGROUP record without a DGG");
                false
            }
        }
    }

    /// Create the drawing group (DGG, default shape options and split menu
    /// colors) when the workbook has none yet.
    pub fn create_drawing_group(&mut self) {
        if self.find_drawing_group() {
            return;
        }
        let dgg = EscherDgg {
            shape_id_max: 1024,
            ..EscherDgg::default()
        };
        let mut menu_colors = Vec::with_capacity(16);
        for color in [0x0800_000Du32, 0x0800_000C, 0x0800_0017, 0x1000_00F7] {
            menu_colors.extend_from_slice(&color.to_le_bytes());
        }
        let container = EscherRecord::container(
            DGG_CONTAINER,
            vec![
                EscherRecord::dgg(dgg.clone()),
                EscherRecord::opt(&[(0x00BF, 0x0008_0008), (0x0181, 0x0800_0041), (0x01C0, 0x0800_0040)]),
                EscherRecord::atom(SPLIT_MENU_COLORS, 0x0040, menu_colors),
            ],
        );
        let record = Record::DrawingGroup(vec![container]);
        match self.records.find_first_loc_by_sid(sid::MSODRAWINGGROUP) {
            Some(pos) => {
                if let Some(slot) = self.records.get_mut(pos) {
                    *slot = record;
                }
            }
            None => {
                let pos = self.records.find_first_loc_by_sid(sid::COUNTRY).map_or(1, |p| p + 1);
                self.records.add(pos, record);
            }
        }
        self.drawing_manager = Some(DrawingManager::new(dgg));
        debug!("created drawing group");
    }

    pub fn drawing_manager(&self) -> Option<&DrawingManager> {
        self.drawing_manager.as_ref()
    }

    pub fn drawing_manager_mut(&mut self) -> Option<&mut DrawingManager> {
        self.drawing_manager.as_mut()
    }

    fn bstore(&self) -> Option<&EscherRecord> {
        self.drawing_group_escher()?
            .iter()
            .find(|r| r.record_id == DGG_CONTAINER)?
            .find_child(BSTORE_CONTAINER)
    }

    /// Picture `index`, counting from 1 as BLIP properties do.
    pub fn bse_record(&self, index: usize) -> Option<&EscherRecord> {
        self.bstore()?.children().get(index.checked_sub(1)?)
    }

    fn bse_record_mut(&mut self, index: usize) -> Option<&mut EscherRecord> {
        let slot = index.checked_sub(1)?;
        let container = self
            .drawing_group_escher_mut()?
            .iter_mut()
            .find(|r| r.record_id == DGG_CONTAINER)?;
        container
            .find_child_mut(BSTORE_CONTAINER)?
            .children_mut()?
            .get_mut(slot)
    }

    /// Append a picture to the BLIP store, returning its 1-based index.
    pub fn add_bse_record(&mut self, bse: EscherRecord) -> XlsResult<usize> {
        if bse.record_id != BSE {
            return Err(XlsError::argument(format!(
                "escher record 0x{:04X} is not a BSE",
                bse.record_id
            )));
        }
        self.create_drawing_group();
        let container = self
            .drawing_group_escher_mut()
            .and_then(|escher| escher.iter_mut().find(|r| r.record_id == DGG_CONTAINER))
            .ok_or_else(|| XlsError::format("drawing group has no DGG container"))?;
        let children = container
            .children_mut()
            .ok_or_else(|| XlsError::format("DGG container has no children"))?;
        if !children.iter().any(|r| r.record_id == BSTORE_CONTAINER) {
            let at = children.len().min(1);
            children.insert(at, EscherRecord::container(BSTORE_CONTAINER, Vec::new()));
        }
        let bstore = children
            .iter_mut()
            .find(|r| r.record_id == BSTORE_CONTAINER)
            .ok_or_else(|| XlsError::format("BLIP store missing"))?;
        let pictures = bstore
            .children_mut()
            .ok_or_else(|| XlsError::format("BLIP store is not a container"))?;
        pictures.push(bse);
        let count = pictures.len();
        bstore.set_instance(count as u16);
        Ok(count)
    }

    /// Give the drawing of a freshly cloned `sheet` its own drawing id and
    /// shape ids, and count the extra use of every picture it shows.
    pub fn clone_drawings(&mut self, sheet: &mut Sheet) -> XlsResult<()> {
        if !self.find_drawing_group() {
            return Ok(());
        }
        let Some(manager) = self.drawing_manager.as_mut() else {
            return Ok(());
        };
        if sheet.aggregate_drawing_records(manager, false)?.is_none() {
            return Ok(());
        }
        let Some(drawing) = sheet.drawing_mut() else {
            return Ok(());
        };
        drawing.reassign_shape_ids(manager)?;

        let mut pictures = Vec::new();
        for record in drawing.escher_records().unwrap_or(&[]) {
            record.walk(&mut |r| {
                if r.record_id == OPT {
                    if let Some(pib) = r.opt_property(PROP_BLIP_TO_DISPLAY) {
                        pictures.push(pib as usize);
                    }
                }
            });
        }
        for pib in pictures {
            if let Some(bse) = self.bse_record_mut(pib) {
                let count = bse.bse_ref_count().unwrap_or(0);
                bse.set_bse_ref_count(count + 1);
            }
        }
        Ok(())
    }

    /// Copy the `_FilterDatabase` name at `filter_db_name_index` for the
    /// sheet cloned to `new_sheet_index`, pointing its references there.
    pub fn clone_filter(&mut self, filter_db_name_index: usize, new_sheet_index: usize) -> XlsResult<usize> {
        let original = self
            .name_record(filter_db_name_index)
            .cloned()
            .ok_or_else(|| XlsError::argument(format!("no defined name at index {filter_db_name_index}")))?;
        let extern_sheet_index = self.check_extern_sheet(new_sheet_index)? as u16;
        let mut definition = original.definition;
        definition.remap_extern_sheet_indexes(|_| Some(extern_sheet_index))?;
        let index = self.create_built_in_name(BUILTIN_FILTER_DB, new_sheet_index + 1)?;
        self.update_name(index, |name| {
            name.definition = definition;
            name.set_hidden(true);
        })?;
        Ok(index)
    }

    /// Apply a sheet move to the 3-D references of every name definition,
    /// returning how many names changed.
    pub fn update_names_after_cell_shift(&mut self, shifter: &FormulaShifter) -> XlsResult<usize> {
        let Some(link_table) = self.link_table.as_mut() else {
            return Ok(0);
        };
        let mut changed = 0;
        for i in 0..link_table.num_names() {
            let Some(mut definition) = link_table.name_record(i).map(|n| n.definition.clone()) else {
                continue;
            };
            if link_table.shift_sheet_references(&mut self.records, &mut definition, shifter)? {
                link_table.update_name(&mut self.records, i, |n| n.definition = definition)?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    // ── Serialization ───────────────────────────────────────────────────

    /// Bring derived records up to date before sizing and writing.
    pub fn pre_serialize(&mut self) {
        let short_tab_ids = self
            .records
            .anchor(Anchor::TabId)
            .and_then(|pos| self.records.get(pos))
            .map_or(false, |r| matches!(r, Record::TabId(t) if t.tab_ids.len() < self.bound_sheets.len()));
        if short_tab_ids {
            self.fix_tab_id();
        }

        let Some(dgg) = self.drawing_manager.as_ref().map(|m| m.dgg().clone()) else {
            return;
        };
        if let Some(escher) = self.drawing_group_escher_mut() {
            for record in escher.iter_mut() {
                record.walk_mut(&mut |r| {
                    if r.record_id == DGG {
                        r.body = EscherBody::Dgg(dgg.clone());
                    }
                });
            }
        }
    }

    /// Bytes [`InternalWorkbook::serialize`] will write.
    pub fn size(&self) -> usize {
        let mut sst_strings = None;
        self.records
            .iter()
            .map(|record| match record {
                Record::Sst(sst) => {
                    sst_strings = Some(sst.num_unique_strings());
                    record.record_size()
                }
                Record::ExtSst(_) => match sst_strings {
                    Some(n) => 4 + ExtSstRecord::data_size_for(n),
                    None => record.record_size(),
                },
                _ => record.record_size(),
            })
            .sum()
    }

    /// Append the globals to `out`, with `offset` the stream position of the
    /// workbook BOF. EXTSST is regenerated from where the SST strings landed.
    pub fn serialize(&self, offset: usize, out: &mut Vec<u8>) -> usize {
        let start = out.len();
        let mut buckets = None;
        for record in self.records.iter() {
            match record {
                Record::Sst(sst) => {
                    let sst_pos = (offset + out.len() - start) as u32;
                    let mut written = sst.serialize(out);
                    for bucket in &mut written {
                        bucket.stream_pos += sst_pos;
                    }
                    buckets = Some(written);
                }
                Record::ExtSst(_) if buckets.is_some() => {
                    let ext = ExtSstRecord {
                        buckets: buckets.take().unwrap_or_default(),
                        ..ExtSstRecord::default()
                    };
                    Record::ExtSst(ext).serialize(out);
                }
                _ => record.serialize(out),
            }
        }
        trace!("wrote {} bytes of workbook globals", out.len() - start);
        out.len() - start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::formula::area_3d_tokens;
    use duke_xls_records::{read_records_from_bytes, Formula};
    use pretty_assertions::assert_eq;

    fn blank() -> InternalWorkbook {
        InternalWorkbook::create_workbook_default(&WorkbookOptions::default()).unwrap()
    }

    fn reread(wb: &InternalWorkbook) -> InternalWorkbook {
        let mut bytes = Vec::new();
        let written = wb.serialize(0, &mut bytes);
        assert_eq!(written, wb.size());
        let raws = read_records_from_bytes(&bytes).unwrap();
        let mut rs = RecordStream::new(Record::decode_records(&raws));
        let read = InternalWorkbook::create_workbook(&mut rs).unwrap();
        assert!(!rs.has_next());
        read
    }

    fn sids(wb: &InternalWorkbook) -> Vec<u16> {
        wb.records().iter().map(Record::sid).collect()
    }

    #[test]
    fn blank_workbook_reads_back() {
        let mut wb = blank();
        wb.set_sheet_name(1, "Data").unwrap();
        wb.create_name("Total", 0).unwrap();
        wb.add_sst_string(UnicodeString::new("hello")).unwrap();
        wb.pre_serialize();

        let read = reread(&wb);
        assert_eq!(sids(&read), sids(&wb));
        assert_eq!(read.number_of_font_records(), 4);
        assert_eq!(read.number_of_ex_formats(), 21);
        assert_eq!(read.formats().len(), 8);
        assert_eq!(read.sheet_name(0), Some("Sheet1"));
        assert_eq!(read.sheet_name(1), Some("Data"));
        assert_eq!(read.num_names(), 1);
        assert_eq!(read.sst_string(0).map(|s| s.text.as_str()), Some("hello"));
        assert_eq!(read.window_one(), WindowOneRecord::default());
    }

    #[test]
    fn link_table_sits_after_country() {
        let wb = blank();
        let country = wb.find_first_record_loc_by_sid(sid::COUNTRY).unwrap();
        assert_eq!(wb.records().get(country + 1).map(Record::sid), Some(sid::SUPBOOK));
        assert_eq!(wb.records().get(country + 2).map(Record::sid), Some(sid::EXTERNSHEET));
        assert_eq!(wb.link_table().and_then(|lt| lt.extern_sheet()).map(|es| es.num_refs()), Some(1));
    }

    #[test]
    fn there_is_no_font_four() {
        let mut wb = blank();
        assert!(wb.font_record_at(4).is_err());
        assert!(wb.font_record_at(5).is_err());
        assert_eq!(wb.create_new_font().unwrap(), 5);
        wb.font_record_at_mut(5).unwrap().height = 0x140;

        for index in [0, 1, 2, 3, 5] {
            let font = wb.font_record_at(index).unwrap();
            assert_eq!(wb.font_index(font).unwrap(), index);
        }
        let mut lookalike = FontRecord::default();
        lookalike.height = 0x140;
        assert_eq!(wb.font_index(&lookalike).unwrap(), 5);

        let removed = wb.remove_font_record(5).unwrap();
        assert_eq!(removed.height, 0x140);
        assert_eq!(wb.number_of_font_records(), 4);
        assert!(wb.font_record_at(5).is_err());
    }

    #[test]
    fn new_fonts_and_xfs_keep_later_anchors_in_place() {
        let mut wb = blank();
        let bound_sheet = wb.records().anchor(Anchor::BoundSheet).unwrap();
        wb.create_new_font().unwrap();
        let xf = wb.create_cell_xf().unwrap();
        assert_eq!(xf, 21);
        assert_eq!(wb.ex_format_at(xf), Some(&ExtendedFormatRecord::cell_default()));
        let moved = wb.records().anchor(Anchor::BoundSheet).unwrap();
        assert_eq!(moved, bound_sheet + 2);
        assert_eq!(wb.records().get(moved).map(Record::sid), Some(sid::BOUNDSHEET));

        wb.remove_ex_format_record(xf).unwrap();
        assert_eq!(wb.number_of_ex_formats(), 21);
        assert_eq!(wb.records().anchor(Anchor::BoundSheet), Some(bound_sheet + 1));
    }

    #[test]
    fn styles_follow_the_xf_block() {
        let mut wb = blank();
        assert!(matches!(
            wb.style_record(0).map(|s| &s.kind),
            Some(duke_xls_records::record::StyleKind::BuiltIn { style_id: 0, .. })
        ));
        assert!(wb.style_record(21).is_none());

        let xf = wb.create_cell_xf().unwrap() as u16;
        let pos = wb.create_style_record(xf).unwrap();
        assert_eq!(wb.records().get(pos + 1).map(Record::sid), Some(sid::USESELFS));
        assert_eq!(wb.update_style_record(xf, 3), 1);
        assert!(wb.style_record(xf).is_none());
        assert!(wb.style_record_mut(3).is_some());
    }

    #[test]
    fn user_formats_start_at_a4() {
        let mut wb = blank();
        assert_eq!(wb.format("\"$\"#,##0_);(\"$\"#,##0)", false).unwrap(), Some(5));
        assert_eq!(wb.format("0.000", false).unwrap(), None);
        assert_eq!(wb.format("0.000", true).unwrap(), Some(0xA4));
        assert_eq!(wb.create_format("0.0000").unwrap(), 0xA5);
        let first = wb.find_first_record_loc_by_sid(sid::FORMAT).unwrap();
        assert_eq!(wb.records().get(first + 9).map(Record::sid), Some(sid::FORMAT));
        assert_eq!(wb.records().get(first + 10).map(Record::sid), Some(sid::XF));
    }

    #[test]
    fn concrete_sheet_and_name_scenario() {
        let mut wb = blank();
        for (i, name) in ["Sheet1", "Sheet2", "Sheet3"].iter().enumerate() {
            wb.set_sheet_name(i, name).unwrap();
        }
        assert_eq!(wb.num_sheets(), 3);
        let long = "a".repeat(40);
        wb.set_sheet_name(1, &long).unwrap();
        assert_eq!(wb.sheet_name(1).map(str::len), Some(31));
        assert!(wb.contains_sheet_name(&"A".repeat(35), None));
        assert!(!wb.contains_sheet_name(&long, Some(1)));

        let total = wb.create_name("Total", 1).unwrap();
        wb.remove_sheet(0).unwrap();
        assert_eq!(wb.name_record(total).map(|n| n.sheet_number), Some(0));
        assert_eq!(wb.sheet_index("Sheet1"), None);
        assert_eq!(wb.sheet_index("sheet3"), Some(1));
        match wb.find_first_record_by_sid(sid::TABID) {
            Some(Record::TabId(t)) => assert_eq!(t.tab_ids, vec![0, 1]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn removing_a_sheet_renumbers_later_names_only() {
        let mut wb = blank();
        for i in 1..4 {
            wb.set_sheet_name(i, &format!("S{i}")).unwrap();
        }
        for sheet in 0..=4u16 {
            wb.create_name(&format!("n{sheet}"), sheet).unwrap();
        }
        wb.remove_sheet(1).unwrap();
        let numbers: Vec<u16> = wb.names().iter().map(|n| n.sheet_number).collect();
        assert_eq!(numbers, vec![0, 1, 0, 2, 3]);
        assert_eq!(wb.records().count_by_sid(sid::NAME), 5);
    }

    #[test]
    fn sheets_can_only_grow_by_one() {
        let mut wb = blank();
        assert!(matches!(wb.set_sheet_name(2, "x"), Err(XlsError::InvalidArgument(_))));
        assert_eq!(wb.add_bound_sheet("Second").unwrap(), 1);
        assert_eq!(wb.sheet_name(1), Some("Second"));
        assert!(wb.remove_sheet(5).is_err());
    }

    #[test]
    fn extern_sheet_entries_are_shared() {
        let mut wb = blank();
        wb.set_sheet_name(1, "Two").unwrap();
        let a = wb.check_extern_sheet(0).unwrap();
        assert_eq!(wb.check_extern_sheet(0).unwrap(), a);
        let range = wb.check_extern_sheet_range(0, 1).unwrap();
        assert_ne!(range, a);
        assert_eq!(wb.check_extern_sheet_range(0, 1).unwrap(), range);
        assert_eq!(wb.find_sheet_first_name_from_extern_sheet(range), Some("Sheet1"));
        assert_eq!(wb.find_sheet_last_name_from_extern_sheet(range), Some("Two"));
    }

    #[test]
    fn sheet_order_moves_names_and_references() {
        let mut wb = blank();
        wb.set_sheet_name(1, "B").unwrap();
        wb.set_sheet_name(2, "C").unwrap();
        let c = wb.check_extern_sheet(2).unwrap() as u16;
        let name = wb.create_name("OnC", 3).unwrap();
        wb.update_name(name, |n| n.definition = Formula::new(area_3d_tokens(c, 0, 0, 0, 0)))
            .unwrap();

        wb.set_sheet_order("C", 0).unwrap();
        let order: Vec<&str> = (0..3).filter_map(|i| wb.sheet_name(i)).collect();
        assert_eq!(order, vec!["C", "Sheet1", "B"]);
        let names: Vec<String> = wb
            .records()
            .iter()
            .filter_map(|r| match r {
                Record::BoundSheet(bs) => Some(bs.sheet_name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["C", "Sheet1", "B"]);

        let moved = wb.name_record(name).unwrap();
        assert_eq!(moved.sheet_number, 1);
        let ix = moved.definition.extern_sheet_indexes().unwrap();
        assert_eq!(ix.len(), 1);
        assert_eq!(wb.first_sheet_index_from_extern_sheet_index(ix[0] as usize), Some(0));
    }

    #[test]
    fn duplicate_names_are_rejected_per_scope() {
        let mut wb = blank();
        wb.create_name("Rate", 0).unwrap();
        assert!(matches!(wb.create_name("RATE", 0), Err(XlsError::InvalidArgument(_))));
        assert!(wb.create_name("Rate", 1).is_ok());

        wb.create_built_in_name(duke_xls_records::record::BUILTIN_PRINT_AREA, 1)
            .unwrap();
        assert!(wb
            .create_built_in_name(duke_xls_records::record::BUILTIN_PRINT_AREA, 1)
            .is_err());
        assert!(wb
            .specific_builtin_record(duke_xls_records::record::BUILTIN_PRINT_AREA, 1)
            .is_some());
        assert!(wb.remove_builtin_record(duke_xls_records::record::BUILTIN_PRINT_AREA, 1));
        assert_eq!(wb.num_names(), 2);

        let removed = wb.remove_name(0).unwrap();
        assert_eq!(removed.name_text(), "Rate");
        assert_eq!(wb.records().count_by_sid(sid::NAME), 1);
        assert!(wb.remove_name(7).is_err());
    }

    #[test]
    fn cloned_filter_points_at_the_new_sheet() {
        let mut wb = blank();
        wb.set_sheet_name(1, "Copy").unwrap();
        let first = wb.check_extern_sheet(0).unwrap() as u16;
        let filter = wb.create_built_in_name(BUILTIN_FILTER_DB, 1).unwrap();
        wb.update_name(filter, |n| n.definition = Formula::new(area_3d_tokens(first, 0, 9, 0, 3)))
            .unwrap();

        let clone = wb.clone_filter(filter, 1).unwrap();
        let copy = wb.name_record(clone).unwrap();
        assert!(copy.is_hidden());
        assert_eq!(copy.sheet_number, 2);
        let ix = copy.definition.extern_sheet_indexes().unwrap();
        assert_eq!(wb.first_sheet_index_from_extern_sheet_index(ix[0] as usize), Some(1));
    }

    #[test]
    fn write_protection_round_trip() {
        let mut wb = blank();
        assert!(!wb.is_write_protected());
        wb.write_protect_workbook("secret", "alice").unwrap();
        assert!(wb.is_write_protected());
        assert_eq!(wb.records().get(1).map(Record::sid), Some(sid::WRITEPROT));
        let access = wb.find_first_record_loc_by_sid(sid::WRITEACCESS).unwrap();
        assert_eq!(wb.records().get(access + 1).map(Record::sid), Some(sid::FILESHARING));
        match wb.find_first_record_by_sid(sid::FILESHARING) {
            Some(Record::FileSharing(fs)) => {
                assert_eq!(fs.password, xor_verifier("secret"));
                assert_eq!(fs.username, "alice");
            }
            other => panic!("unexpected {other:?}"),
        }
        let read = reread(&wb);
        assert!(read.is_write_protected());

        wb.unwrite_protect_workbook();
        assert!(!wb.is_write_protected());
        assert!(wb.find_first_record_by_sid(sid::WRITEPROT).is_none());
    }

    #[test]
    fn structure_protection_sets_the_password_after_protect() {
        let mut wb = blank();
        wb.protect_structure(Some("pw")).unwrap();
        assert!(wb.is_structure_protected());
        let pos = wb.records().anchor(Anchor::Protect).unwrap();
        assert_eq!(
            wb.records().get(pos + 1).and_then(|r| r.short_value(sid::PASSWORD)),
            Some(xor_verifier("pw"))
        );
        wb.protect_structure(None).unwrap();
        assert!(!wb.is_structure_protected());
    }

    #[test]
    fn palette_and_recalc_id_are_created_on_demand() {
        let mut wb = blank();
        assert!(wb.find_first_record_by_sid(sid::PALETTE).is_none());
        let font_anchor = wb.records().anchor(Anchor::Font).unwrap();
        wb.custom_palette().unwrap().set_color(8, [1, 2, 3]);
        assert_eq!(wb.records().get(1).map(Record::sid), Some(sid::PALETTE));
        assert_eq!(wb.records().anchor(Anchor::Font), Some(font_anchor + 1));
        assert_eq!(wb.custom_palette().unwrap().color(8), Some([1, 2, 3]));

        wb.recalc_id().unwrap().engine_id = 0x1234;
        let country = wb.find_first_record_loc_by_sid(sid::COUNTRY).unwrap();
        assert_eq!(wb.records().get(country + 1).map(Record::sid), Some(sid::RECALCID));
    }

    #[test]
    fn missing_sst_is_inserted_before_eof() {
        let mut wb = blank();
        let pos = wb.find_first_record_loc_by_sid(sid::SST).unwrap();
        wb.records.remove(pos);
        wb.records.remove(pos);
        assert!(wb.sst().is_none());

        assert_eq!(wb.add_sst_string(UnicodeString::new("a")).unwrap(), 0);
        assert_eq!(wb.add_sst_string(UnicodeString::new("a")).unwrap(), 0);
        assert_eq!(wb.sst().map(|s| s.num_strings), Some(2));
        let n = wb.num_records();
        let tail: Vec<u16> = sids(&wb)[n - 3..].to_vec();
        assert_eq!(tail, vec![sid::SST, sid::EXTSST, sid::EOF]);
    }

    #[test]
    fn extsst_buckets_point_into_the_sst() {
        let mut wb = blank();
        for i in 0..20 {
            wb.add_sst_string(UnicodeString::new(&format!("string {i}"))).unwrap();
        }
        let mut bytes = Vec::new();
        wb.serialize(0, &mut bytes);
        assert_eq!(bytes.len(), wb.size());
        let read = reread(&wb);
        match read.find_first_record_by_sid(sid::EXTSST) {
            Some(Record::ExtSst(ext)) => {
                assert_eq!(ext.buckets.len(), 3);
                let sst_pos = read
                    .records()
                    .iter()
                    .take_while(|r| r.sid() != sid::SST)
                    .map(Record::record_size)
                    .sum::<usize>();
                assert!(ext.buckets.iter().all(|b| b.stream_pos as usize > sst_pos));
                assert_eq!(ext.buckets[0].record_offset, 12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn drawing_group_and_pictures() {
        let mut wb = blank();
        assert!(!wb.find_drawing_group());
        wb.create_drawing_group();
        assert!(wb.drawing_manager().is_some());
        let country = wb.find_first_record_loc_by_sid(sid::COUNTRY).unwrap();
        assert_eq!(wb.records().get(country + 1).map(Record::sid), Some(sid::MSODRAWINGGROUP));

        let bse = EscherRecord::atom(BSE, 0x0062, vec![0; 36]);
        assert_eq!(wb.add_bse_record(bse.clone()).unwrap(), 1);
        assert_eq!(wb.add_bse_record(bse).unwrap(), 2);
        assert!(wb.bse_record(2).is_some());
        assert!(wb.bse_record(0).is_none());
        assert!(wb.add_bse_record(EscherRecord::atom(OPT, 0, Vec::new())).is_err());

        wb.drawing_manager_mut().unwrap().register_drawing(1);
        wb.pre_serialize();
        let mut read = reread(&wb);
        assert!(read.find_drawing_group());
        assert_eq!(read.drawing_manager().map(|m| m.dgg().drawings_saved), Some(1));
        assert!(read.bse_record(2).is_some());
    }

    #[test]
    fn unsupported_streams_are_rejected() {
        let mut bof = duke_xls_records::record::BofRecord::workbook();
        bof.version = 0x0500;
        let mut rs = RecordStream::new(vec![Record::Bof(bof), Record::Eof]);
        assert!(matches!(
            InternalWorkbook::create_workbook(&mut rs),
            Err(XlsError::UnsupportedVersion(_))
        ));

        let mut rs = RecordStream::new(vec![Record::Bof(duke_xls_records::record::BofRecord::workbook())]);
        assert!(matches!(
            InternalWorkbook::create_workbook(&mut rs),
            Err(XlsError::InvalidFormat(_))
        ));
    }

    #[test]
    fn sparse_globals_are_tolerated() {
        let mut rs = RecordStream::new(vec![
            Record::Bof(duke_xls_records::record::BofRecord::workbook()),
            Record::Font(FontRecord::default()),
            Record::BoundSheet(BoundSheetRecord::new("Only")),
            Record::Eof,
            Record::Unknown {
                sid: sid::HLINK,
                data: vec![0; 8],
            },
        ]);
        let mut wb = InternalWorkbook::create_workbook(&mut rs).unwrap();
        wb.collect_hyperlinks(&rs.into_remaining());
        assert_eq!(wb.hyperlinks().len(), 1);
        assert_eq!(wb.window_one(), WindowOneRecord::default());
        assert_eq!(wb.num_sheets(), 1);
        wb.pre_serialize();
        assert!(wb.find_first_record_by_sid(sid::TABID).is_none());
    }

    #[test]
    fn lone_extern_sheet_is_a_format_error() {
        let es = duke_xls_records::record::ExternSheetRecord::new();
        let mut rs = RecordStream::new(vec![
            Record::Bof(duke_xls_records::record::BofRecord::workbook()),
            Record::ExternSheet(es),
            Record::Eof,
        ]);
        assert!(matches!(
            InternalWorkbook::create_workbook(&mut rs),
            Err(XlsError::InvalidFormat(_))
        ));
    }
}
