//! Worksheet record aggregate.
//!
//! A sheet is an ordered list of entries. Most are plain records; the rest
//! mark where an aggregate (rows and cells, column infos, merged cells and so
//! on) writes its records. The aggregates themselves live in typed fields.

pub mod columns;
pub mod cond_format;
pub mod drawing;
pub mod merged;
pub mod page_settings;
pub mod protection;
pub mod row_blocks;
pub mod rows;
pub mod shared_values;
pub mod substream;
pub mod validity;
pub mod values;

use duke_xls_records::record::{
    BofRecord, CellRangeAddress, DefaultRowHeightRecord, DimensionsRecord, GutsRecord, PaneRecord, RowRecord,
    SclRecord, SelectionRecord, SelectionRef, WindowTwoRecord,
};
use duke_xls_records::{sid, Record};

use crate::drawing::DrawingManager;
use crate::error::{XlsError, XlsResult};
use crate::orderer::{add_new_sheet_entry, is_row_block_record, NewBlock};
use crate::stream::RecordStream;

use self::columns::ColumnInfoTable;
use self::cond_format::ConditionalFormattingTable;
use self::drawing::DrawingAggregate;
use self::merged::MergedCellsTable;
use self::page_settings::PageSettingsBlock;
use self::protection::WorksheetProtectionBlock;
use self::row_blocks::RowBlocksReader;
use self::rows::RowRecordsAggregate;
use self::substream::{ChartSubstream, CustomViewBlock};
use self::validity::DataValidityTable;
use self::values::CellValue;

/// Something that writes a run of records.
pub trait RecordAggregate {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record));

    /// Bytes the records take once serialized.
    fn record_size(&self) -> usize {
        let mut size = 0;
        self.visit_records(&mut |r| size += r.record_size());
        size
    }
}

/// One position in a sheet's record order.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetEntry {
    Record(Record),
    Rows,
    Columns,
    MergedCells,
    ConditionalFormatting,
    DataValidity,
    PageSettings,
    Protection,
    Drawing,
    /// Index into the sheet's chart sub-streams.
    Chart(usize),
    /// Index into the sheet's custom views.
    CustomView(usize),
}

/// What an entry is, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Record(u16),
    Rows,
    Columns,
    MergedCells,
    ConditionalFormatting,
    DataValidity,
    PageSettings,
    Protection,
    Drawing,
    Chart,
    CustomView,
}

impl SheetEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            SheetEntry::Record(r) => EntryKind::Record(r.sid()),
            SheetEntry::Rows => EntryKind::Rows,
            SheetEntry::Columns => EntryKind::Columns,
            SheetEntry::MergedCells => EntryKind::MergedCells,
            SheetEntry::ConditionalFormatting => EntryKind::ConditionalFormatting,
            SheetEntry::DataValidity => EntryKind::DataValidity,
            SheetEntry::PageSettings => EntryKind::PageSettings,
            SheetEntry::Protection => EntryKind::Protection,
            SheetEntry::Drawing => EntryKind::Drawing,
            SheetEntry::Chart(_) => EntryKind::Chart,
            SheetEntry::CustomView(_) => EntryKind::CustomView,
        }
    }
}

/// Cell extent as a DIMENSIONS record.
fn dimensions_for(rows: &RowRecordsAggregate) -> DimensionsRecord {
    match rows.extent() {
        Some((first_row, last_row, first_col, last_col)) => DimensionsRecord {
            first_row,
            last_row,
            first_col,
            last_col,
        },
        None => DimensionsRecord::default(),
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    entries: Vec<SheetEntry>,
    rows: RowRecordsAggregate,
    columns: ColumnInfoTable,
    merged: MergedCellsTable,
    cond_formats: Option<ConditionalFormattingTable>,
    validity: Option<DataValidityTable>,
    page_settings: Option<PageSettingsBlock>,
    protection: WorksheetProtectionBlock,
    drawing: Option<DrawingAggregate>,
    charts: Vec<ChartSubstream>,
    custom_views: Vec<CustomViewBlock>,
    uncalced: bool,
    /// Cells changed since the last DIMENSIONS update.
    dimensions_dirty: bool,
}

impl Sheet {
    fn with_entries(entries: Vec<SheetEntry>) -> Self {
        Self {
            entries,
            rows: RowRecordsAggregate::new(),
            columns: ColumnInfoTable::new(),
            merged: MergedCellsTable::new(),
            cond_formats: None,
            validity: None,
            page_settings: None,
            protection: WorksheetProtectionBlock::new(),
            drawing: None,
            charts: Vec::new(),
            custom_views: Vec::new(),
            uncalced: false,
            dimensions_dirty: false,
        }
    }

    /// Build a sheet from its records, starting at its BOF and consuming
    /// through the matching EOF.
    pub fn create_sheet(rs: &mut RecordStream) -> XlsResult<Self> {
        let bof = match rs.next()? {
            Record::Bof(bof) => bof,
            other => return Err(XlsError::format(format!("sheet must start with BOF, found {}", other.name()))),
        };
        if !matches!(bof.bof_type, sid::BOF_WORKSHEET | sid::BOF_CHART | sid::BOF_MACRO) {
            return Err(XlsError::UnsupportedVersion(format!("bad sheet BOF type 0x{:04X}", bof.bof_type)));
        }

        let mut sheet = Self::with_entries(vec![SheetEntry::Record(Record::Bof(bof))]);
        let mut have_rows = false;
        let mut have_columns = false;
        let mut dims_loc: Option<usize> = None;
        let mut window_two_found = false;
        let mut eof_found = false;

        while let Some(s) = rs.peek_next_sid() {
            if matches!(s, sid::CFHEADER | sid::CFHEADER12) {
                let table = ConditionalFormattingTable::read(rs)?;
                match &mut sheet.cond_formats {
                    Some(existing) => existing.extend(table),
                    None => {
                        sheet.cond_formats = Some(table);
                        sheet.entries.push(SheetEntry::ConditionalFormatting);
                    }
                }
                continue;
            }
            if s == sid::DVAL {
                if sheet.validity.is_some() {
                    return Err(XlsError::format("found more than one DVAL record"));
                }
                sheet.validity = Some(DataValidityTable::read(rs)?);
                sheet.entries.push(SheetEntry::DataValidity);
                continue;
            }
            if is_row_block_record(s) {
                if have_rows {
                    return Err(XlsError::format("row/cell records found in the wrong place"));
                }
                let (mut plain, shared_values, loose_merged) = RowBlocksReader::read(rs)?.into_parts();
                sheet.merged.add_records(loose_merged);
                sheet.rows = RowRecordsAggregate::read(&mut plain, shared_values)?;
                sheet.entries.push(SheetEntry::Rows);
                have_rows = true;
                continue;
            }
            if s == sid::USERSVIEWBEGIN {
                sheet.custom_views.push(CustomViewBlock::read(rs)?);
                sheet.entries.push(SheetEntry::CustomView(sheet.custom_views.len() - 1));
                continue;
            }
            if page_settings::is_component_record(s) {
                match &mut sheet.page_settings {
                    Some(psb) => psb.add_late_records(rs)?,
                    None => {
                        sheet.page_settings = Some(PageSettingsBlock::read(rs)?);
                        sheet.entries.push(SheetEntry::PageSettings);
                    }
                }
                continue;
            }
            if protection::is_component_record(s) {
                sheet.protection.add_records(rs)?;
                continue;
            }
            if s == sid::MERGECELLS {
                sheet.merged.read(rs)?;
                continue;
            }
            if s == sid::COLINFO {
                if have_columns {
                    return Err(XlsError::format("found more than one column info block"));
                }
                sheet.columns = ColumnInfoTable::read(rs)?;
                sheet.entries.push(SheetEntry::Columns);
                have_columns = true;
                continue;
            }
            if s == sid::BOF {
                sheet.charts.push(ChartSubstream::read(rs)?);
                sheet.entries.push(SheetEntry::Chart(sheet.charts.len() - 1));
                continue;
            }

            let record = rs.next()?;
            match s {
                // regenerated on write
                sid::INDEX => continue,
                sid::UNCALCED => {
                    sheet.uncalced = true;
                    continue;
                }
                sid::EOF => {
                    sheet.entries.push(SheetEntry::Record(record));
                    eof_found = true;
                    break;
                }
                sid::DIMENSION => {
                    if !have_columns {
                        sheet.entries.push(SheetEntry::Columns);
                        have_columns = true;
                    }
                    dims_loc = Some(sheet.entries.len());
                }
                sid::WINDOW2 => {
                    if !matches!(record, Record::WindowTwo(_)) {
                        return Err(XlsError::format("malformed WINDOW2 record"));
                    }
                    window_two_found = true;
                }
                _ => {}
            }
            sheet.entries.push(SheetEntry::Record(record));
        }

        if !eof_found {
            return Err(XlsError::format("sheet records ended before EOF"));
        }
        if !window_two_found {
            return Err(XlsError::format("WINDOW2 was not found"));
        }
        let mut dims_loc = match dims_loc {
            Some(loc) => loc,
            None => {
                if have_rows {
                    log::warn!("DIMENSIONS record not found even though row/cells present");
                }
                let loc = sheet
                    .find_record_loc(sid::WINDOW2)
                    .ok_or_else(|| XlsError::format("WINDOW2 was not found"))?;
                let dims = dimensions_for(&sheet.rows);
                sheet.entries.insert(loc, SheetEntry::Record(Record::Dimensions(dims)));
                loc
            }
        };
        if !have_columns {
            sheet.entries.insert(dims_loc, SheetEntry::Columns);
            dims_loc += 1;
        }
        if !have_rows {
            sheet.entries.insert(dims_loc + 1, SheetEntry::Rows);
        }

        add_new_sheet_entry(&mut sheet.entries, NewBlock::MergedCells, SheetEntry::MergedCells)?;
        add_new_sheet_entry(&mut sheet.entries, NewBlock::Protection, SheetEntry::Protection)?;
        if let Some(psb) = &mut sheet.page_settings {
            psb.position_records(&mut sheet.custom_views);
        }

        log::debug!(
            "sheet read: {} entries, {} rows, {} cells, {} merged regions",
            sheet.entries.len(),
            sheet.rows.physical_num_rows(),
            sheet.rows.values().len(),
            sheet.merged.num_areas()
        );
        Ok(sheet)
    }

    /// A blank worksheet with the records Excel writes for a new sheet.
    pub fn create_sheet_default() -> Self {
        let r = SheetEntry::Record;
        let entries = vec![
            r(Record::Bof(BofRecord::worksheet())),
            r(Record::short(sid::CALCMODE, 1)),
            r(Record::short(sid::CALCCOUNT, 100)),
            r(Record::short(sid::REFMODE, 1)),
            r(Record::short(sid::ITERATION, 0)),
            r(Record::double(sid::DELTA, 0.001)),
            r(Record::short(sid::SAVERECALC, 1)),
            r(Record::short(sid::PRINTHEADERS, 0)),
            r(Record::short(sid::PRINTGRIDLINES, 0)),
            r(Record::short(sid::GRIDSET, 1)),
            r(Record::Guts(GutsRecord::default())),
            r(Record::DefaultRowHeight(DefaultRowHeightRecord::default())),
            r(Record::short(sid::WSBOOL, 0x04C1)),
            SheetEntry::PageSettings,
            SheetEntry::Protection,
            r(Record::short(sid::DEFCOLWIDTH, 8)),
            SheetEntry::Columns,
            r(Record::Dimensions(DimensionsRecord::default())),
            SheetEntry::Rows,
            r(Record::WindowTwo(WindowTwoRecord::default())),
            r(Record::Selection(SelectionRecord::default())),
            SheetEntry::MergedCells,
            r(Record::Eof),
        ];
        let mut sheet = Self::with_entries(entries);
        sheet.page_settings = Some(PageSettingsBlock::new());
        sheet
    }

    /// Deep copy rebuilt from the sheet's own records.
    pub fn clone_sheet(&self) -> XlsResult<Self> {
        let mut records = Vec::new();
        self.visit_records(&mut |r| records.push(r.clone()));
        let mut clone = Self::create_sheet(&mut RecordStream::new(records))?;
        clone.uncalced = self.uncalced;
        Ok(clone)
    }

    // ── Entries ─────────────────────────────────────────────────────────

    pub fn entries(&self) -> &[SheetEntry] {
        &self.entries
    }

    pub fn find_record_loc(&self, record_sid: u16) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, SheetEntry::Record(r) if r.sid() == record_sid))
    }

    pub fn find_first_record_by_sid(&self, record_sid: u16) -> Option<&Record> {
        self.entries.iter().find_map(|e| match e {
            SheetEntry::Record(r) if r.sid() == record_sid => Some(r),
            _ => None,
        })
    }

    fn find_record_mut(&mut self, record_sid: u16) -> Option<&mut Record> {
        self.entries.iter_mut().find_map(|e| match e {
            SheetEntry::Record(r) if r.sid() == record_sid => Some(r),
            _ => None,
        })
    }

    fn entry_position(&self, kind: EntryKind) -> Option<usize> {
        self.entries.iter().position(|e| e.kind() == kind)
    }

    fn visit_entry(&self, entry: &SheetEntry, visitor: &mut dyn FnMut(&Record)) {
        match entry {
            SheetEntry::Record(r) => visitor(r),
            SheetEntry::Rows => self.rows.visit_records(visitor),
            SheetEntry::Columns => self.columns.visit_records(visitor),
            SheetEntry::MergedCells => self.merged.visit_records(visitor),
            SheetEntry::ConditionalFormatting => {
                if let Some(t) = &self.cond_formats {
                    t.visit_records(visitor);
                }
            }
            SheetEntry::DataValidity => {
                if let Some(t) = &self.validity {
                    t.visit_records(visitor);
                }
            }
            SheetEntry::PageSettings => {
                if let Some(psb) = &self.page_settings {
                    psb.visit_records(visitor);
                }
            }
            SheetEntry::Protection => self.protection.visit_records(visitor),
            SheetEntry::Drawing => {
                if let Some(d) = &self.drawing {
                    d.visit_records(visitor);
                }
            }
            SheetEntry::Chart(i) => {
                if let Some(c) = self.charts.get(*i) {
                    c.visit_records(visitor);
                }
            }
            SheetEntry::CustomView(i) => {
                if let Some(v) = self.custom_views.get(*i) {
                    v.visit_records(visitor);
                }
            }
        }
    }

    // ── Cells and rows ──────────────────────────────────────────────────

    pub fn rows(&self) -> &RowRecordsAggregate {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut RowRecordsAggregate {
        self.dimensions_dirty = true;
        &mut self.rows
    }

    pub fn row(&self, row_number: u16) -> Option<&RowRecord> {
        self.rows.row(row_number)
    }

    pub fn row_mut(&mut self, row_number: u16) -> Option<&mut RowRecord> {
        self.rows.row_mut(row_number)
    }

    /// Add a ROW record, replacing any with the same number.
    pub fn add_row(&mut self, row: RowRecord) {
        self.rows.insert_row(row);
        self.dimensions_dirty = true;
    }

    pub fn remove_row(&mut self, row_number: u16) -> XlsResult<RowRecord> {
        let removed = self.rows.remove_row(row_number)?;
        self.dimensions_dirty = true;
        Ok(removed)
    }

    pub fn cells(&self) -> impl Iterator<Item = &CellValue> {
        self.rows.values().iter()
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&CellValue> {
        self.rows.values().cell(row, col)
    }

    /// Add a NUMBER, LABELSST, LABEL, BLANK, BOOLERR or FORMULA record.
    pub fn add_value_record(&mut self, record: Record) -> XlsResult<()> {
        self.insert_cell(CellValue::from_record(record)?)
    }

    pub fn insert_cell(&mut self, cell: CellValue) -> XlsResult<()> {
        self.rows.insert_cell(cell)?;
        self.dimensions_dirty = true;
        Ok(())
    }

    pub fn remove_value_record(&mut self, row: u16, col: u16) -> XlsResult<Option<CellValue>> {
        let removed = self.rows.remove_cell(row, col)?;
        self.dimensions_dirty |= removed.is_some();
        Ok(removed)
    }

    /// Put `record` in place of whatever cell is at its position.
    pub fn replace_value_record(&mut self, record: Record) -> XlsResult<Option<CellValue>> {
        let cell = CellValue::from_record(record)?;
        let old = self.rows.remove_cell(cell.row(), cell.col())?;
        self.insert_cell(cell)?;
        Ok(old)
    }

    pub fn dimensions(&self) -> Option<&DimensionsRecord> {
        match self.find_first_record_by_sid(sid::DIMENSION) {
            Some(Record::Dimensions(d)) => Some(d),
            _ => None,
        }
    }

    pub fn is_uncalced(&self) -> bool {
        self.uncalced
    }

    pub fn set_uncalced(&mut self, uncalced: bool) {
        self.uncalced = uncalced;
    }

    /// Raise (`indent`) or lower the outline level of rows `from..=to`,
    /// creating rows that do not exist yet.
    pub fn group_row_range(&mut self, from: u16, to: u16, indent: bool) -> XlsResult<()> {
        for k in from..=to {
            if self.rows.row(k).is_none() {
                self.rows.insert_row(RowRecord::new(k));
            }
            if let Some(row) = self.rows.row_mut(k) {
                let level = row.outline_level();
                let level = if indent { (level + 1).min(7) } else { level.saturating_sub(1) };
                row.set_outline_level(level);
            }
        }
        self.dimensions_dirty = true;
        self.recalc_row_gutter()
    }

    fn recalc_row_gutter(&mut self) -> XlsResult<()> {
        let max_level = self.rows.rows().map(RowRecord::outline_level).max().unwrap_or(0);
        let guts = self.guts_mut()?;
        guts.row_level_max = max_level + 1;
        guts.left_row_gutter = 29 + 12 * max_level;
        Ok(())
    }

    /// GUTS record, created in its mandated position when missing.
    pub fn guts_mut(&mut self) -> XlsResult<&mut GutsRecord> {
        if self.find_record_loc(sid::GUTS).is_none() {
            let entry = SheetEntry::Record(Record::Guts(GutsRecord::default()));
            add_new_sheet_entry(&mut self.entries, NewBlock::Guts, entry)?;
        }
        match self.find_record_mut(sid::GUTS) {
            Some(Record::Guts(guts)) => Ok(guts),
            _ => Err(XlsError::format("malformed GUTS record")),
        }
    }

    pub fn default_row_height(&self) -> u16 {
        match self.find_first_record_by_sid(sid::DEFAULTROWHEIGHT) {
            Some(Record::DefaultRowHeight(d)) => d.row_height,
            _ => DefaultRowHeightRecord::default().row_height,
        }
    }

    pub fn set_default_row_height(&mut self, twips: u16) -> XlsResult<()> {
        match self.find_record_mut(sid::DEFAULTROWHEIGHT) {
            Some(Record::DefaultRowHeight(d)) => {
                d.row_height = twips;
                // custom height
                d.options = 1;
                Ok(())
            }
            _ => Err(XlsError::format("DEFAULTROWHEIGHT record not found")),
        }
    }

    // ── Columns ─────────────────────────────────────────────────────────

    pub fn columns(&self) -> &ColumnInfoTable {
        &self.columns
    }

    /// Default column width in characters.
    pub fn default_column_width(&self) -> u16 {
        self.find_first_record_by_sid(sid::DEFCOLWIDTH)
            .and_then(|r| r.short_value(sid::DEFCOLWIDTH))
            .unwrap_or(8)
    }

    pub fn set_default_column_width(&mut self, chars: u16) -> XlsResult<()> {
        let updated = self
            .find_record_mut(sid::DEFCOLWIDTH)
            .map_or(false, |r| r.set_short_value(chars));
        if !updated {
            return Err(XlsError::format("DEFCOLWIDTH record not found"));
        }
        Ok(())
    }

    /// Width of `col` in 1/256 of a character.
    pub fn column_width(&self, col: u16) -> u16 {
        self.columns
            .column_width(col)
            .unwrap_or_else(|| 256u16.saturating_mul(self.default_column_width()))
    }

    pub fn set_column_width(&mut self, col: u16, width: u16) -> XlsResult<()> {
        self.columns.set_column_width(col, width)
    }

    pub fn is_column_hidden(&self, col: u16) -> bool {
        self.columns.is_column_hidden(col)
    }

    pub fn set_column_hidden(&mut self, col: u16, hidden: bool) {
        self.columns.set_column_hidden(col, hidden);
    }

    pub fn xf_index_for_col_at(&self, col: u16) -> u16 {
        self.columns.xf_index_for_col_at(col)
    }

    pub fn set_default_column_style(&mut self, col: u16, xf_index: u16) {
        self.columns.set_default_column_style(col, xf_index);
    }

    pub fn group_column_range(&mut self, from: u16, to: u16, indent: bool) -> XlsResult<()> {
        self.columns.group_column_range(from, to, indent);
        let max_level = self.columns.max_outline_level();
        let guts = self.guts_mut()?;
        guts.col_level_max = max_level + 1;
        guts.top_col_gutter = if max_level == 0 { 0 } else { 29 + 12 * (max_level - 1) };
        Ok(())
    }

    // ── Merged cells ────────────────────────────────────────────────────

    pub fn add_merged_region(&mut self, first_row: u16, first_col: u16, last_row: u16, last_col: u16) -> XlsResult<usize> {
        self.merged.add_area(first_row, first_col, last_row, last_col)
    }

    pub fn remove_merged_region(&mut self, index: usize) -> XlsResult<CellRangeAddress> {
        self.merged.remove_area(index)
    }

    pub fn merged_region_at(&self, index: usize) -> Option<CellRangeAddress> {
        self.merged.area_at(index)
    }

    pub fn num_merged_regions(&self) -> usize {
        self.merged.num_areas()
    }

    // ── Page settings and protection ────────────────────────────────────

    pub fn page_settings(&self) -> Option<&PageSettingsBlock> {
        self.page_settings.as_ref()
    }

    /// Page settings, added in their mandated position when missing.
    pub fn page_settings_mut(&mut self) -> XlsResult<&mut PageSettingsBlock> {
        if self.page_settings.is_none() {
            add_new_sheet_entry(&mut self.entries, NewBlock::PageSettings, SheetEntry::PageSettings)?;
        }
        Ok(self.page_settings.get_or_insert_with(PageSettingsBlock::new))
    }

    pub fn protection(&self) -> &WorksheetProtectionBlock {
        &self.protection
    }

    pub fn protect_sheet(&mut self, password: &str, objects: bool, scenarios: bool) {
        self.protection.protect_sheet(Some(password), objects, scenarios);
    }

    pub fn unprotect_sheet(&mut self) {
        self.protection.protect_sheet(None, false, false);
    }

    pub fn is_protected(&self) -> bool {
        self.protection.is_protected()
    }

    pub fn password_hash(&self) -> u16 {
        self.protection.password_hash()
    }

    // ── Conditional formatting and data validation ──────────────────────

    pub fn conditional_formatting(&self) -> Option<&ConditionalFormattingTable> {
        self.cond_formats.as_ref()
    }

    pub fn conditional_formatting_mut(&mut self) -> XlsResult<&mut ConditionalFormattingTable> {
        if self.cond_formats.is_none() {
            add_new_sheet_entry(
                &mut self.entries,
                NewBlock::ConditionalFormatting,
                SheetEntry::ConditionalFormatting,
            )?;
        }
        Ok(self.cond_formats.get_or_insert_with(ConditionalFormattingTable::new))
    }

    pub fn data_validity(&self) -> Option<&DataValidityTable> {
        self.validity.as_ref()
    }

    pub fn data_validity_mut(&mut self) -> XlsResult<&mut DataValidityTable> {
        if self.validity.is_none() {
            add_new_sheet_entry(&mut self.entries, NewBlock::DataValidity, SheetEntry::DataValidity)?;
        }
        Ok(self.validity.get_or_insert_with(DataValidityTable::new))
    }

    // ── View ────────────────────────────────────────────────────────────

    pub fn window_two(&self) -> XlsResult<&WindowTwoRecord> {
        match self.find_first_record_by_sid(sid::WINDOW2) {
            Some(Record::WindowTwo(w)) => Ok(w),
            _ => Err(XlsError::format("WINDOW2 was not found")),
        }
    }

    fn window_two_mut(&mut self) -> XlsResult<&mut WindowTwoRecord> {
        match self.find_record_mut(sid::WINDOW2) {
            Some(Record::WindowTwo(w)) => Ok(w),
            _ => Err(XlsError::format("WINDOW2 was not found")),
        }
    }

    pub fn selection(&self) -> Option<&SelectionRecord> {
        match self.find_first_record_by_sid(sid::SELECTION) {
            Some(Record::Selection(s)) => Some(s),
            _ => None,
        }
    }

    fn selection_mut(&mut self) -> Option<&mut SelectionRecord> {
        match self.find_record_mut(sid::SELECTION) {
            Some(Record::Selection(s)) => Some(s),
            _ => None,
        }
    }

    pub fn pane(&self) -> Option<&PaneRecord> {
        match self.find_first_record_by_sid(sid::PANE) {
            Some(Record::Pane(p)) => Some(p),
            _ => None,
        }
    }

    fn set_selection_pane(&mut self, pane: u8) {
        if let Some(selection) = self.selection_mut() {
            selection.pane = pane;
        }
    }

    fn replace_pane(&mut self, pane: Option<PaneRecord>) -> XlsResult<()> {
        if let Some(loc) = self.find_record_loc(sid::PANE) {
            self.entries.remove(loc);
        }
        if let Some(pane) = pane {
            let loc = self
                .find_record_loc(sid::WINDOW2)
                .ok_or_else(|| XlsError::format("WINDOW2 was not found"))?;
            self.entries.insert(loc + 1, SheetEntry::Record(Record::Pane(pane)));
        }
        Ok(())
    }

    /// Freeze the first `row_split` rows and `col_split` columns. Both zero
    /// removes the freeze.
    pub fn create_freeze_pane(&mut self, col_split: u16, row_split: u16, top_row: u16, left_col: u16) -> XlsResult<()> {
        if col_split == 0 && row_split == 0 {
            self.replace_pane(None)?;
            let window = self.window_two_mut()?;
            window.set_flag(WindowTwoRecord::FREEZE_PANES, false);
            window.set_flag(WindowTwoRecord::FREEZE_PANES_NO_SPLIT, false);
            self.set_selection_pane(SelectionRecord::PANE_UPPER_LEFT);
            return Ok(());
        }
        let mut pane = PaneRecord {
            x: col_split,
            y: row_split,
            top_row,
            left_col,
            active_pane: 0,
        };
        if row_split == 0 {
            pane.top_row = 0;
            pane.active_pane = SelectionRecord::PANE_UPPER_RIGHT as u16;
        } else if col_split == 0 {
            pane.left_col = 0;
            pane.active_pane = SelectionRecord::PANE_LOWER_LEFT as u16;
        }
        let active = pane.active_pane as u8;
        self.replace_pane(Some(pane))?;
        let window = self.window_two_mut()?;
        window.set_flag(WindowTwoRecord::FREEZE_PANES, true);
        window.set_flag(WindowTwoRecord::FREEZE_PANES_NO_SPLIT, true);
        self.set_selection_pane(active);
        Ok(())
    }

    /// Split the window at `x_split`/`y_split`, in 1/20 of a point.
    pub fn create_split_pane(
        &mut self,
        x_split: u16,
        y_split: u16,
        top_row: u16,
        left_col: u16,
        active_pane: u8,
    ) -> XlsResult<()> {
        self.replace_pane(Some(PaneRecord {
            x: x_split,
            y: y_split,
            top_row,
            left_col,
            active_pane: active_pane as u16,
        }))?;
        let window = self.window_two_mut()?;
        window.set_flag(WindowTwoRecord::FREEZE_PANES, false);
        window.set_flag(WindowTwoRecord::FREEZE_PANES_NO_SPLIT, false);
        self.set_selection_pane(SelectionRecord::PANE_LOWER_RIGHT);
        Ok(())
    }

    /// Zoom as the fraction `numerator / denominator`.
    pub fn set_zoom(&mut self, numerator: u16, denominator: u16) -> XlsResult<()> {
        if numerator == 0 || denominator == 0 {
            return Err(XlsError::argument("zoom numerator and denominator must be between 1 and 65535"));
        }
        let scl = Record::Scl(SclRecord { numerator, denominator });
        match self.find_record_loc(sid::SCL) {
            Some(loc) => self.entries[loc] = SheetEntry::Record(scl),
            None => {
                let loc = self
                    .find_record_loc(sid::WINDOW2)
                    .ok_or_else(|| XlsError::format("WINDOW2 was not found"))?;
                self.entries.insert(loc + 1, SheetEntry::Record(scl));
            }
        }
        Ok(())
    }

    pub fn zoom(&self) -> Option<(u16, u16)> {
        match self.find_first_record_by_sid(sid::SCL) {
            Some(Record::Scl(s)) => Some((s.numerator, s.denominator)),
            _ => None,
        }
    }

    fn set_window_flag(&mut self, mask: u16, on: bool) -> XlsResult<()> {
        self.window_two_mut()?.set_flag(mask, on);
        Ok(())
    }

    pub fn is_selected(&self) -> bool {
        self.window_two().map_or(false, |w| w.flag(WindowTwoRecord::SELECTED))
    }

    pub fn set_selected(&mut self, selected: bool) -> XlsResult<()> {
        self.set_window_flag(WindowTwoRecord::SELECTED, selected)
    }

    pub fn set_active(&mut self, active: bool) -> XlsResult<()> {
        self.set_window_flag(WindowTwoRecord::ACTIVE, active)
    }

    pub fn is_display_gridlines(&self) -> bool {
        self.window_two().map_or(false, |w| w.flag(WindowTwoRecord::DISPLAY_GRIDLINES))
    }

    pub fn set_display_gridlines(&mut self, show: bool) -> XlsResult<()> {
        self.set_window_flag(WindowTwoRecord::DISPLAY_GRIDLINES, show)
    }

    pub fn is_display_formulas(&self) -> bool {
        self.window_two().map_or(false, |w| w.flag(WindowTwoRecord::DISPLAY_FORMULAS))
    }

    pub fn set_display_formulas(&mut self, show: bool) -> XlsResult<()> {
        self.set_window_flag(WindowTwoRecord::DISPLAY_FORMULAS, show)
    }

    pub fn is_display_row_col_headings(&self) -> bool {
        self.window_two()
            .map_or(false, |w| w.flag(WindowTwoRecord::DISPLAY_ROW_COL_HEADINGS))
    }

    pub fn set_display_row_col_headings(&mut self, show: bool) -> XlsResult<()> {
        self.set_window_flag(WindowTwoRecord::DISPLAY_ROW_COL_HEADINGS, show)
    }

    pub fn is_print_gridlines(&self) -> bool {
        self.find_first_record_by_sid(sid::PRINTGRIDLINES)
            .and_then(|r| r.short_value(sid::PRINTGRIDLINES))
            .map_or(false, |v| v != 0)
    }

    pub fn set_print_gridlines(&mut self, print: bool) -> XlsResult<()> {
        let updated = self
            .find_record_mut(sid::PRINTGRIDLINES)
            .map_or(false, |r| r.set_short_value(print as u16));
        if !updated {
            return Err(XlsError::format("PRINTGRIDLINES record not found"));
        }
        Ok(())
    }

    pub fn active_cell(&self) -> Option<(u16, u16)> {
        self.selection().map(|s| (s.active_row, s.active_col))
    }

    /// Make `(row, col)` the active cell and the only selected range.
    pub fn set_active_cell(&mut self, row: u16, col: u16) -> XlsResult<()> {
        let selection = self
            .selection_mut()
            .ok_or_else(|| XlsError::format("SELECTION record not found"))?;
        selection.active_row = row;
        selection.active_col = col;
        selection.active_ref_index = 0;
        selection.refs = vec![SelectionRef {
            first_row: row,
            last_row: row,
            first_col: col.min(0xFF) as u8,
            last_col: col.min(0xFF) as u8,
        }];
        Ok(())
    }

    // ── Drawing layer and sub-streams ───────────────────────────────────

    pub fn drawing(&self) -> Option<&DrawingAggregate> {
        self.drawing.as_ref()
    }

    pub fn drawing_mut(&mut self) -> Option<&mut DrawingAggregate> {
        self.drawing.as_mut()
    }

    /// Fold the drawing records into one aggregate, returning its entry
    /// position. With `create_if_missing`, a sheet without drawing records
    /// gets an empty drawing just before WINDOW2.
    pub fn aggregate_drawing_records(
        &mut self,
        manager: &mut DrawingManager,
        create_if_missing: bool,
    ) -> XlsResult<Option<usize>> {
        if self.drawing.is_some() {
            return Ok(self.entry_position(EntryKind::Drawing));
        }
        let Some(loc) = self.find_record_loc(sid::MSODRAWING) else {
            if !create_if_missing {
                return Ok(None);
            }
            let loc = self
                .find_record_loc(sid::WINDOW2)
                .ok_or_else(|| XlsError::format("WINDOW2 was not found"))?;
            self.drawing = Some(DrawingAggregate::create_patriarch(manager));
            self.entries.insert(loc, SheetEntry::Drawing);
            return Ok(Some(loc));
        };

        let record_sid = |e: &SheetEntry| match e {
            SheetEntry::Record(r) => Some(r.sid()),
            _ => None,
        };
        let mut end = loc;
        while end < self.entries.len() && record_sid(&self.entries[end]).map_or(false, drawing::is_drawing_run_record) {
            end += 1;
        }
        while end < self.entries.len() && record_sid(&self.entries[end]) == Some(sid::NOTE) {
            end += 1;
        }
        let run: Vec<Record> = self
            .entries
            .drain(loc..end)
            .filter_map(|e| match e {
                SheetEntry::Record(r) => Some(r),
                _ => None,
            })
            .collect();
        self.drawing = Some(DrawingAggregate::read(&mut RecordStream::new(run))?);
        self.entries.insert(loc, SheetEntry::Drawing);
        Ok(Some(loc))
    }

    pub fn charts(&self) -> &[ChartSubstream] {
        &self.charts
    }

    pub fn custom_views(&self) -> &[CustomViewBlock] {
        &self.custom_views
    }

    // ── Serialization ───────────────────────────────────────────────────

    /// Bring derived records up to date before writing.
    pub fn pre_serialize(&mut self) {
        if !self.dimensions_dirty {
            return;
        }
        self.rows.refresh_row_extents();
        let dims = dimensions_for(&self.rows);
        if let Some(Record::Dimensions(d)) = self.find_record_mut(sid::DIMENSION) {
            *d = dims;
        }
        self.dimensions_dirty = false;
    }

    fn size_of_initial_records(&self, bof_index: usize) -> usize {
        self.entries[bof_index + 1..]
            .iter()
            .take_while(|e| !matches!(e, SheetEntry::Rows))
            .map(|e| {
                let mut size = 0;
                self.visit_entry(e, &mut |r| size += r.record_size());
                size
            })
            .sum()
    }

    /// Visit the records exactly as written, with UNCALCED and INDEX after
    /// the BOF. `offset` is the stream position of the sheet's BOF.
    pub fn visit_serialized_records(&self, offset: usize, visitor: &mut dyn FnMut(&Record)) {
        let mut index_written = false;
        for (k, entry) in self.entries.iter().enumerate() {
            self.visit_entry(entry, visitor);
            if index_written {
                continue;
            }
            if let SheetEntry::Record(bof @ Record::Bof(_)) = entry {
                index_written = true;
                let mut pos = offset + bof.record_size();
                if self.uncalced {
                    let uncalced = Record::short(sid::UNCALCED, 0);
                    pos += uncalced.record_size();
                    visitor(&uncalced);
                }
                let initial = self.size_of_initial_records(k);
                visitor(&Record::Index(self.rows.create_index_record(pos, initial)));
            }
        }
    }

    /// Append the sheet's bytes to `out`, returning how many were written.
    pub fn serialize(&self, offset: usize, out: &mut Vec<u8>) -> usize {
        let start = out.len();
        self.visit_serialized_records(offset, &mut |r| r.serialize(out));
        out.len() - start
    }

    /// Bytes [`Sheet::serialize`] will write.
    pub fn size(&self) -> usize {
        let mut size = 0;
        self.visit_serialized_records(0, &mut |r| size += r.record_size());
        size
    }
}

impl RecordAggregate for Sheet {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        for entry in &self.entries {
            self.visit_entry(entry, visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::escher::EscherDgg;
    use duke_xls_records::record::{CellHeader, NumberRecord};
    use pretty_assertions::assert_eq;

    fn number(row: u16, col: u16) -> Record {
        Record::Number(NumberRecord {
            cell: CellHeader::new(row, col, 15),
            value: 42.0,
        })
    }

    fn serialized_sids(sheet: &Sheet) -> Vec<u16> {
        let mut sids = Vec::new();
        sheet.visit_serialized_records(0, &mut |r| sids.push(r.sid()));
        sids
    }

    fn reread(sheet: &Sheet) -> Sheet {
        let mut records = Vec::new();
        sheet.visit_records(&mut |r| records.push(r.clone()));
        Sheet::create_sheet(&mut RecordStream::new(records)).unwrap()
    }

    #[test]
    fn default_sheet_record_order() {
        let sheet = Sheet::create_sheet_default();
        assert_eq!(
            serialized_sids(&sheet),
            vec![
                sid::BOF,
                sid::INDEX,
                sid::CALCMODE,
                sid::CALCCOUNT,
                sid::REFMODE,
                sid::ITERATION,
                sid::DELTA,
                sid::SAVERECALC,
                sid::PRINTHEADERS,
                sid::PRINTGRIDLINES,
                sid::GRIDSET,
                sid::GUTS,
                sid::DEFAULTROWHEIGHT,
                sid::WSBOOL,
                sid::HEADER,
                sid::FOOTER,
                sid::HCENTER,
                sid::VCENTER,
                sid::SETUP,
                sid::DEFCOLWIDTH,
                sid::DIMENSION,
                sid::WINDOW2,
                sid::SELECTION,
                sid::EOF,
            ]
        );
        let mut out = Vec::new();
        assert_eq!(sheet.serialize(0, &mut out), sheet.size());
        assert_eq!(out.len(), sheet.size());
    }

    #[test]
    fn index_points_at_the_dbcell_in_the_stream() {
        let mut sheet = Sheet::create_sheet_default();
        sheet.set_uncalced(true);
        sheet.add_value_record(number(0, 0)).unwrap();
        sheet.add_value_record(number(3, 2)).unwrap();
        sheet.pre_serialize();

        let offset = 1000;
        let mut pos = offset;
        let mut index = None;
        let mut dbcell_pos = Vec::new();
        sheet.visit_serialized_records(offset, &mut |r| {
            match r {
                Record::Index(i) => index = Some(i.clone()),
                Record::DbCell(_) => dbcell_pos.push(pos as u32),
                _ => {}
            }
            pos += r.record_size();
        });
        let index = index.unwrap();
        assert_eq!(index.dbcells, dbcell_pos);
        assert_eq!((index.first_row, index.last_row_add1), (0, 4));
        assert_eq!(serialized_sids(&sheet)[..3], [sid::BOF, sid::UNCALCED, sid::INDEX]);

        let dims = sheet.dimensions().unwrap();
        assert_eq!((dims.first_row, dims.last_row, dims.first_col, dims.last_col), (0, 4, 0, 3));
    }

    #[test]
    fn written_sheet_reads_back() {
        let mut sheet = Sheet::create_sheet_default();
        sheet.add_value_record(number(2, 2)).unwrap();
        sheet.add_merged_region(0, 0, 1, 1).unwrap();
        sheet.protect_sheet("pw", false, false);
        sheet.set_uncalced(true);
        sheet.pre_serialize();

        let copy = sheet.clone_sheet().unwrap();
        assert!(copy.is_uncalced());
        assert!(copy.is_protected());
        assert_eq!(copy.num_merged_regions(), 1);
        assert!(copy.cell(2, 2).is_some());
        assert_eq!(serialized_sids(&copy), serialized_sids(&sheet));
    }

    #[test]
    fn missing_dimensions_is_synthesized_from_cells() {
        let mut rs = RecordStream::new(vec![
            Record::Bof(BofRecord::worksheet()),
            Record::Row(RowRecord::new(0)),
            number(0, 1),
            Record::WindowTwo(WindowTwoRecord::default()),
            Record::Eof,
        ]);
        let sheet = Sheet::create_sheet(&mut rs).unwrap();
        let dims = sheet.dimensions().unwrap();
        assert_eq!((dims.first_row, dims.last_row, dims.first_col, dims.last_col), (0, 1, 1, 2));
        let kinds: Vec<EntryKind> = sheet.entries().iter().map(SheetEntry::kind).collect();
        let dims_at = kinds.iter().position(|k| *k == EntryKind::Record(sid::DIMENSION)).unwrap();
        assert_eq!(kinds[dims_at + 1], EntryKind::Record(sid::WINDOW2));
        assert!(kinds.contains(&EntryKind::MergedCells));
        assert!(kinds.contains(&EntryKind::Protection));
    }

    #[test]
    fn window2_is_required() {
        let mut rs = RecordStream::new(vec![
            Record::Bof(BofRecord::worksheet()),
            Record::Dimensions(DimensionsRecord::default()),
            Record::Eof,
        ]);
        assert!(matches!(Sheet::create_sheet(&mut rs), Err(XlsError::InvalidFormat(_))));
    }

    #[test]
    fn globals_bof_is_not_a_sheet() {
        let mut rs = RecordStream::new(vec![Record::Bof(BofRecord::workbook()), Record::Eof]);
        assert!(matches!(Sheet::create_sheet(&mut rs), Err(XlsError::UnsupportedVersion(_))));
    }

    #[test]
    fn embedded_chart_is_kept_whole() {
        let mut chart_bof = BofRecord::worksheet();
        chart_bof.bof_type = sid::BOF_CHART;
        let mut rs = RecordStream::new(vec![
            Record::Bof(BofRecord::worksheet()),
            Record::Dimensions(DimensionsRecord::default()),
            Record::Bof(chart_bof),
            Record::short(sid::CALCMODE, 1),
            Record::Eof,
            Record::WindowTwo(WindowTwoRecord::default()),
            Record::Eof,
            Record::Bof(BofRecord::worksheet()),
        ]);
        let sheet = Sheet::create_sheet(&mut rs).unwrap();
        assert_eq!(sheet.charts().len(), 1);
        assert_eq!(sheet.charts()[0].records().len(), 3);
        // the next sheet's BOF is left alone
        assert_eq!(rs.peek_next_sid(), Some(sid::BOF));
    }

    #[test]
    fn row_grouping_creates_guts_where_it_belongs() {
        let mut rs = RecordStream::new(vec![
            Record::Bof(BofRecord::worksheet()),
            Record::short(sid::GRIDSET, 1),
            Record::short(sid::WSBOOL, 0x04C1),
            Record::Dimensions(DimensionsRecord::default()),
            Record::WindowTwo(WindowTwoRecord::default()),
            Record::Eof,
        ]);
        let mut sheet = Sheet::create_sheet(&mut rs).unwrap();
        assert!(sheet.find_record_loc(sid::GUTS).is_none());
        sheet.group_row_range(1, 3, true).unwrap();
        sheet.group_row_range(2, 2, true).unwrap();
        assert_eq!(sheet.find_record_loc(sid::GUTS), Some(2));
        match sheet.find_first_record_by_sid(sid::GUTS) {
            Some(Record::Guts(g)) => {
                assert_eq!(g.row_level_max, 3);
                assert_eq!(g.left_row_gutter, 29 + 24);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sheet.row(2).map(RowRecord::outline_level), Some(2));
    }

    #[test]
    fn column_grouping_sets_the_top_gutter() {
        let mut sheet = Sheet::create_sheet_default();
        sheet.group_column_range(0, 2, true).unwrap();
        sheet.group_column_range(1, 1, true).unwrap();
        match sheet.find_first_record_by_sid(sid::GUTS) {
            Some(Record::Guts(g)) => {
                assert_eq!(g.col_level_max, 3);
                assert_eq!(g.top_col_gutter, 29 + 12);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sheet.column_width(40), 8 * 256);
    }

    #[test]
    fn freeze_pane_goes_after_window2() {
        let mut sheet = Sheet::create_sheet_default();
        sheet.create_freeze_pane(0, 2, 2, 0).unwrap();
        let window_at = sheet.find_record_loc(sid::WINDOW2).unwrap();
        assert_eq!(sheet.find_record_loc(sid::PANE), Some(window_at + 1));
        assert_eq!(sheet.pane().map(|p| p.active_pane), Some(2));
        assert!(sheet.window_two().unwrap().flag(WindowTwoRecord::FREEZE_PANES));
        assert_eq!(sheet.selection().map(|s| s.pane), Some(SelectionRecord::PANE_LOWER_LEFT));

        sheet.create_freeze_pane(0, 0, 0, 0).unwrap();
        assert!(sheet.pane().is_none());
        assert!(!sheet.window_two().unwrap().flag(WindowTwoRecord::FREEZE_PANES));
    }

    #[test]
    fn zoom_and_view_flags() {
        let mut sheet = Sheet::create_sheet_default();
        assert!(sheet.set_zoom(0, 1).is_err());
        sheet.set_zoom(3, 4).unwrap();
        sheet.set_zoom(1, 2).unwrap();
        assert_eq!(sheet.zoom(), Some((1, 2)));
        let window_at = sheet.find_record_loc(sid::WINDOW2).unwrap();
        assert_eq!(sheet.find_record_loc(sid::SCL), Some(window_at + 1));

        sheet.set_display_gridlines(false).unwrap();
        sheet.set_display_formulas(true).unwrap();
        assert!(!sheet.is_display_gridlines());
        assert!(sheet.is_display_formulas());
        sheet.set_active_cell(4, 3).unwrap();
        assert_eq!(sheet.active_cell(), Some((4, 3)));
    }

    #[test]
    fn merged_regions_cross_record_boundaries() {
        let mut sheet = Sheet::create_sheet_default();
        for i in 0..1100u16 {
            sheet.add_merged_region(i, 0, i, 2).unwrap();
        }
        assert_eq!(sheet.merged_region_at(1050).map(|a| a.first_row), Some(1050));
        let merge_records = serialized_sids(&sheet).iter().filter(|&&s| s == sid::MERGECELLS).count();
        assert_eq!(merge_records, 2);
        assert!(sheet.add_merged_region(3, 3, 2, 3).is_err());
    }

    #[test]
    fn patriarch_is_created_before_window2() {
        let mut sheet = Sheet::create_sheet_default();
        let mut manager = DrawingManager::new(EscherDgg::default());
        assert_eq!(sheet.aggregate_drawing_records(&mut manager, false).unwrap(), None);
        let loc = sheet.aggregate_drawing_records(&mut manager, true).unwrap().unwrap();
        assert_eq!(sheet.entries()[loc + 1].kind(), EntryKind::Record(sid::WINDOW2));
        assert!(serialized_sids(&sheet).contains(&sid::MSODRAWING));

        // written drawing records fold back into one aggregate
        let mut copy = reread(&sheet);
        assert!(copy.drawing().is_none());
        let loc = copy.aggregate_drawing_records(&mut manager, false).unwrap();
        assert!(loc.is_some());
        assert!(copy.drawing().map_or(false, DrawingAggregate::is_parsed));
    }

    #[test]
    fn page_settings_and_tables_are_created_in_order() {
        let mut rs = RecordStream::new(vec![
            Record::Bof(BofRecord::worksheet()),
            Record::short(sid::WSBOOL, 0x04C1),
            Record::Dimensions(DimensionsRecord::default()),
            Record::WindowTwo(WindowTwoRecord::default()),
            Record::Eof,
        ]);
        let mut sheet = Sheet::create_sheet(&mut rs).unwrap();
        sheet.page_settings_mut().unwrap().set_row_break(4, 0, 255);
        sheet.conditional_formatting_mut().unwrap();
        sheet.data_validity_mut().unwrap();
        let kinds: Vec<EntryKind> = sheet.entries().iter().map(SheetEntry::kind).collect();
        assert_eq!(kinds[2], EntryKind::PageSettings);
        let tail = &kinds[kinds.len() - 4..];
        assert_eq!(
            tail,
            &[
                EntryKind::MergedCells,
                EntryKind::ConditionalFormatting,
                EntryKind::DataValidity,
                EntryKind::Record(sid::EOF),
            ]
        );
        assert!(sheet.page_settings().unwrap().is_row_broken(4));
    }
}
