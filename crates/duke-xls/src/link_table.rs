//! The link table: SUPBOOK blocks, EXTERNSHEET and defined names.
//!
//! Every 3-D reference in a formula stores an index into the EXTERNSHEET
//! entry list, and every entry points at one SUPBOOK block. The table keeps
//! typed copies of its records and writes each change through to the
//! workbook record list, where SUPBOOK, EXTERNNAME, EXTERNSHEET and NAME
//! records sit in the same relative order.
//!
//! Layout in the globals stream:
//!
//! ```text
//! ( SUPBOOK EXTERNNAME* ( XCT CRN* )* )* EXTERNSHEET? ( NAME | NAMECMT )*
//! ```

use ahash::AHashMap;
use duke_xls_records::record::{
    BoundSheetRecord, CrnCountRecord, ExternSheetRecord, ExternalNameRecord, NameCommentRecord, NameRecord,
    SupBookRecord,
};
use duke_xls_records::{sid, Formula, Record};
use log::{debug, warn};

use crate::error::{XlsError, XlsResult};
use crate::formula_shifter::FormulaShifter;
use crate::record_list::{Anchor, WorkbookRecordList};
use crate::stream::RecordStream;

/// Sheet index marking an EXTERNSHEET entry that covers a whole workbook
/// (add-in function names).
pub const WORKBOOK_SCOPE_SHEET: i16 = -2;

/// Cached cell values of one external sheet (XCT followed by its CRNs).
#[derive(Debug, Clone, PartialEq)]
pub struct CrnBlock {
    pub count: CrnCountRecord,
    pub crns: Vec<Record>,
}

impl CrnBlock {
    fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        let count = match rs.next()? {
            Record::CrnCount(c) => c,
            other => return Err(XlsError::format(format!("expected XCT, found {}", other.name()))),
        };
        let mut crns = Vec::with_capacity(count.number_of_crns as usize);
        for _ in 0..count.number_of_crns {
            let crn = rs.next()?;
            if crn.sid() != sid::CRN {
                return Err(XlsError::format(format!("expected CRN, found {}", crn.name())));
            }
            crns.push(crn);
        }
        Ok(Self { count, crns })
    }
}

/// One SUPBOOK with the EXTERNNAME and CRN blocks that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalBookBlock {
    pub supbook: SupBookRecord,
    pub external_names: Vec<ExternalNameRecord>,
    pub crn_blocks: Vec<CrnBlock>,
}

impl ExternalBookBlock {
    fn new(supbook: SupBookRecord) -> Self {
        Self {
            supbook,
            external_names: Vec::new(),
            crn_blocks: Vec::new(),
        }
    }

    fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        let supbook = match rs.next()? {
            Record::SupBook(s) => s,
            other => return Err(XlsError::format(format!("expected SUPBOOK, found {}", other.name()))),
        };
        let mut block = Self::new(supbook);
        while rs.peek_next_sid() == Some(sid::EXTERNNAME) {
            match rs.next()? {
                Record::ExternalName(n) => block.external_names.push(n),
                other => {
                    return Err(XlsError::format(format!(
                        "EXTERNNAME could not be decoded ({} bytes)",
                        other.record_size()
                    )))
                }
            }
        }
        while rs.peek_next_sid() == Some(sid::XCT) {
            block.crn_blocks.push(CrnBlock::read(rs)?);
        }
        Ok(block)
    }

    fn index_of_name(&self, name: &str) -> Option<usize> {
        self.external_names.iter().position(|n| n.name.eq_ignore_ascii_case(name))
    }

    fn records(&self) -> impl Iterator<Item = Record> + '_ {
        std::iter::once(Record::SupBook(self.supbook.clone()))
            .chain(self.external_names.iter().cloned().map(Record::ExternalName))
            .chain(self.crn_blocks.iter().flat_map(|b| {
                std::iter::once(Record::CrnCount(b.count)).chain(b.crns.iter().cloned())
            }))
    }
}

/// Reference to an external (add-in) name: EXTERNSHEET entry plus the
/// 0-based index of the name inside its SUPBOOK block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameXRef {
    pub sheet_ref_index: usize,
    pub name_index: usize,
}

/// Book and sheet names behind an EXTERNSHEET entry into another workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSheet {
    pub workbook_name: String,
    pub first_sheet_name: Option<String>,
    /// Present only for sheet ranges.
    pub last_sheet_name: Option<String>,
}

/// Resolved external name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalName {
    pub name: String,
    pub index: usize,
    pub ix: u16,
}

#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    blocks: Vec<ExternalBookBlock>,
    extern_sheet: Option<ExternSheetRecord>,
    defined_names: Vec<NameRecord>,
    record_count: usize,
}

impl LinkTable {
    /// Default table for a workbook with `num_sheets` sheets: one internal
    /// SUPBOOK and an empty EXTERNSHEET, inserted after COUNTRY.
    pub fn new(num_sheets: u16, records: &mut WorkbookRecordList) -> XlsResult<Self> {
        let country = records
            .find_first_loc_by_sid(sid::COUNTRY)
            .ok_or_else(|| XlsError::format("COUNTRY record not found"))?;
        let supbook = SupBookRecord::internal_references(num_sheets);
        let extern_sheet = ExternSheetRecord::new();
        records.add(country + 1, Record::ExternSheet(extern_sheet.clone()));
        records.add(country + 1, Record::SupBook(supbook.clone()));
        records.set_anchor(Anchor::SupBook, Some(country + 1));
        records.set_anchor(Anchor::ExternSheet, Some(country + 2));
        debug!("created default link table for {num_sheets} sheets");
        Ok(Self {
            blocks: vec![ExternalBookBlock::new(supbook)],
            extern_sheet: Some(extern_sheet),
            defined_names: Vec::new(),
            record_count: 2,
        })
    }

    /// Read the link table region from `rs`, appending its records to
    /// `records` and name comments to `comments`.
    pub fn read(
        rs: &mut RecordStream,
        records: &mut WorkbookRecordList,
        comments: &mut AHashMap<String, NameCommentRecord>,
    ) -> XlsResult<Self> {
        let start = rs.count_read();
        let mut table = Self::default();

        while rs.peek_next_sid() == Some(sid::SUPBOOK) {
            let block = ExternalBookBlock::read(rs)?;
            records.set_anchor(Anchor::SupBook, Some(records.len()));
            records.push(Record::SupBook(block.supbook.clone()));
            for r in block.records().skip(1) {
                records.push(r);
            }
            table.blocks.push(block);
        }

        if !table.blocks.is_empty() {
            if rs.peek_next_sid() == Some(sid::EXTERNSHEET) {
                let extern_sheet = read_extern_sheet(rs)?;
                records.set_anchor(Anchor::ExternSheet, Some(records.len()));
                records.push(Record::ExternSheet(extern_sheet.clone()));
                table.extern_sheet = Some(extern_sheet);
            } else {
                // Some third-party writers leave it out.
                warn!(
                    "{} external book blocks without an EXTERNSHEET record",
                    table.blocks.len()
                );
            }
        }

        loop {
            match rs.peek_next_sid() {
                Some(sid::NAME) => {
                    let record = rs.next()?;
                    let Record::Name(name) = &record else {
                        return Err(XlsError::format("NAME record could not be decoded"));
                    };
                    table.defined_names.push(name.clone());
                    records.set_anchor(Anchor::Name, Some(records.len()));
                    records.push(record);
                }
                Some(sid::NAMECMT) => {
                    let record = rs.next()?;
                    if let Record::NameComment(c) = &record {
                        comments.insert(c.name_text.clone(), c.clone());
                    }
                    records.push(record);
                }
                _ => break,
            }
        }

        table.record_count = rs.count_read() - start;
        debug!(
            "link table: {} books, {} extern sheet refs, {} names",
            table.blocks.len(),
            table.extern_sheet.as_ref().map_or(0, ExternSheetRecord::num_refs),
            table.defined_names.len()
        );
        Ok(table)
    }

    /// Records consumed by [`LinkTable::read`] (2 for a default table).
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn blocks(&self) -> &[ExternalBookBlock] {
        &self.blocks
    }

    pub fn extern_sheet(&self) -> Option<&ExternSheetRecord> {
        self.extern_sheet.as_ref()
    }

    fn extern_sheet_mut(&mut self) -> XlsResult<&mut ExternSheetRecord> {
        self.extern_sheet
            .as_mut()
            .ok_or_else(|| XlsError::format("link table has no EXTERNSHEET record"))
    }

    fn sync_extern_sheet(&self, records: &mut WorkbookRecordList) {
        let Some(es) = &self.extern_sheet else { return };
        if let Some(slot) = records
            .find_first_loc_by_sid(sid::EXTERNSHEET)
            .and_then(|pos| records.get_mut(pos))
        {
            *slot = Record::ExternSheet(es.clone());
        }
    }

    fn sync_supbook(&self, records: &mut WorkbookRecordList, block: usize) {
        if let Some(slot) = records
            .find_nth_loc_by_sid(sid::SUPBOOK, block)
            .and_then(|pos| records.get_mut(pos))
        {
            *slot = Record::SupBook(self.blocks[block].supbook.clone());
        }
    }

    // ── Defined names ───────────────────────────────────────────────────

    pub fn num_names(&self) -> usize {
        self.defined_names.len()
    }

    pub fn name_record(&self, index: usize) -> Option<&NameRecord> {
        self.defined_names.get(index)
    }

    pub fn names(&self) -> &[NameRecord] {
        &self.defined_names
    }

    /// Apply `f` to the name at `index` and write it through to the list.
    pub fn update_name<F>(&mut self, records: &mut WorkbookRecordList, index: usize, f: F) -> XlsResult<()>
    where
        F: FnOnce(&mut NameRecord),
    {
        let name = self
            .defined_names
            .get_mut(index)
            .ok_or_else(|| XlsError::argument(format!("no defined name at index {index}")))?;
        f(name);
        let updated = Record::Name(name.clone());
        if let Some(slot) = records
            .find_nth_loc_by_sid(sid::NAME, index)
            .and_then(|pos| records.get_mut(pos))
        {
            *slot = updated;
        }
        Ok(())
    }

    /// Append a name, placing its record after the existing NAME records.
    pub fn add_name(&mut self, records: &mut WorkbookRecordList, name: NameRecord) -> XlsResult<usize> {
        let base = records
            .find_first_loc_by_sid(sid::EXTERNSHEET)
            .or_else(|| records.find_first_loc_by_sid(sid::SUPBOOK))
            .or_else(|| records.find_first_loc_by_sid(sid::COUNTRY))
            .ok_or_else(|| XlsError::format("no EXTERNSHEET, SUPBOOK or COUNTRY record to anchor names"))?;
        self.defined_names.push(name.clone());
        let pos = base + self.defined_names.len();
        records.add(pos, Record::Name(name));
        records.set_anchor(Anchor::Name, Some(pos));
        Ok(self.defined_names.len() - 1)
    }

    /// Drop the name from the table only; the caller owns the list edit.
    pub fn remove_name(&mut self, index: usize) -> Option<NameRecord> {
        if index < self.defined_names.len() {
            Some(self.defined_names.remove(index))
        } else {
            None
        }
    }

    /// Whether another name has the same text (ignoring case) and scope.
    pub fn name_already_exists(&self, name: &NameRecord) -> bool {
        self.defined_names.iter().any(|other| {
            !std::ptr::eq(other, name)
                && other.sheet_number == name.sheet_number
                && other.name_text().eq_ignore_ascii_case(name.name_text())
        })
    }

    /// Index of the built-in name `code` for 1-based `sheet_number`.
    pub fn specific_builtin_index(&self, code: u8, sheet_number: u16) -> Option<usize> {
        self.defined_names
            .iter()
            .position(|n| n.built_in_code() == Some(code) && n.sheet_number == sheet_number)
    }

    /// Remove a built-in name from the table and its NAME record from the list.
    pub fn remove_builtin_record(&mut self, records: &mut WorkbookRecordList, code: u8, sheet_number: u16) -> bool {
        let Some(index) = self.specific_builtin_index(code, sheet_number) else {
            return false;
        };
        if let Some(pos) = records.find_nth_loc_by_sid(sid::NAME, index) {
            records.remove(pos);
        }
        self.defined_names.remove(index);
        true
    }

    // ── EXTERNSHEET ─────────────────────────────────────────────────────

    fn internal_block_index(&self) -> XlsResult<usize> {
        self.blocks
            .iter()
            .position(|b| b.supbook.is_internal_references())
            .ok_or_else(|| XlsError::format("could not find 'internal references' SUPBOOK"))
    }

    /// EXTERNSHEET index for sheets `first..=last` of this workbook, adding
    /// an entry only when no identical one exists.
    pub fn check_extern_sheet(&mut self, records: &mut WorkbookRecordList, first: i16, last: i16) -> XlsResult<usize> {
        let book = self.internal_block_index()? as u16;
        let es = self.extern_sheet_mut()?;
        if let Some(existing) = es.ref_index_for_sheet(book, first, last) {
            return Ok(existing);
        }
        let index = es.add_ref(book, first, last);
        self.sync_extern_sheet(records);
        Ok(index)
    }

    pub fn first_internal_sheet_index(&self, extern_sheet_index: usize) -> Option<i16> {
        self.extern_sheet.as_ref()?.first_sheet_index_from_ref_index(extern_sheet_index)
    }

    pub fn last_internal_sheet_index(&self, extern_sheet_index: usize) -> Option<i16> {
        self.extern_sheet.as_ref()?.last_sheet_index_from_ref_index(extern_sheet_index)
    }

    /// Adjust EXTERNSHEET entries after sheet `sheet_index` was removed.
    pub fn remove_sheet(&mut self, records: &mut WorkbookRecordList, sheet_index: i16) {
        if let Some(es) = self.extern_sheet.as_mut() {
            es.remove_sheet(sheet_index);
            self.sync_extern_sheet(records);
        }
    }

    /// Re-point the 3-D references of `formula` at the EXTERNSHEET entries
    /// for their sheets' positions after the move described by `shifter`.
    /// Returns whether any token changed.
    pub fn shift_sheet_references(
        &mut self,
        records: &mut WorkbookRecordList,
        formula: &mut Formula,
        shifter: &FormulaShifter,
    ) -> XlsResult<bool> {
        if shifter.is_noop() || self.extern_sheet.is_none() {
            return Ok(false);
        }
        let book = self.internal_block_index()? as u16;
        let mut mapping: AHashMap<u16, u16> = AHashMap::new();
        for ix in formula.extern_sheet_indexes()? {
            if mapping.contains_key(&ix) {
                continue;
            }
            let Some(r) = self.extern_sheet.as_ref().and_then(|es| es.get_ref(ix as usize).copied()) else {
                continue;
            };
            if r.ext_book_index != book || r.first_sheet_index < 0 {
                continue;
            }
            let first = shifter.adjust_sheet_index(r.first_sheet_index);
            let last = shifter.adjust_sheet_index(r.last_sheet_index);
            if (first, last) == (r.first_sheet_index, r.last_sheet_index) {
                continue;
            }
            let new_ix = self.check_extern_sheet(records, first.min(last), first.max(last))?;
            mapping.insert(ix, new_ix as u16);
        }
        if mapping.is_empty() {
            return Ok(false);
        }
        let changed = formula.remap_extern_sheet_indexes(|ix| mapping.get(&ix).copied())?;
        Ok(changed > 0)
    }

    // ── External workbooks ──────────────────────────────────────────────

    fn external_workbook_index(&self, workbook_name: &str) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.supbook.is_external_references() && b.supbook.url().as_deref() == Some(workbook_name))
    }

    /// Link another workbook by name, returning its SUPBOOK block index.
    /// Linking an already linked name returns the existing block.
    pub fn link_external_workbook(
        &mut self,
        records: &mut WorkbookRecordList,
        name: &str,
        sheet_names: &[String],
    ) -> XlsResult<usize> {
        if let Some(existing) = self.external_workbook_index(name) {
            return Ok(existing);
        }
        let url = format!("\u{0}{name}");
        let supbook = SupBookRecord::external_references(&url, sheet_names.to_vec());
        let pos = records
            .find_first_loc_by_sid(sid::EXTERNSHEET)
            .unwrap_or_else(|| records.len());
        records.add(pos, Record::SupBook(supbook.clone()));
        self.blocks.push(ExternalBookBlock::new(supbook));
        let book = (self.blocks.len() - 1) as u16;

        let es = self.extern_sheet_mut()?;
        for sn in 0..sheet_names.len() {
            es.add_ref(book, sn as i16, sn as i16);
        }
        self.sync_extern_sheet(records);
        debug!("linked external workbook {name:?} as book {book}");
        Ok(book as usize)
    }

    /// EXTERNSHEET index for a sheet range of a linked workbook.
    pub fn external_sheet_index(
        &mut self,
        records: &mut WorkbookRecordList,
        workbook_name: &str,
        first_sheet_name: &str,
        last_sheet_name: &str,
    ) -> XlsResult<usize> {
        let book = self
            .external_workbook_index(workbook_name)
            .ok_or_else(|| XlsError::argument(format!("no external workbook with name '{workbook_name}'")))?;
        let names = self.blocks[book].supbook.sheet_names();
        let find = |sheet: &str| {
            names
                .iter()
                .position(|n| n == sheet)
                .map(|i| i as i16)
                .ok_or_else(|| XlsError::argument(format!("external workbook does not contain sheet '{sheet}'")))
        };
        let first = find(first_sheet_name)?;
        let last = find(last_sheet_name)?;
        let es = self.extern_sheet_mut()?;
        if let Some(existing) = es.ref_index_for_sheet(book as u16, first, last) {
            return Ok(existing);
        }
        let index = es.add_ref(book as u16, first, last);
        self.sync_extern_sheet(records);
        Ok(index)
    }

    /// Book URL and sheet names for an entry pointing into another workbook.
    pub fn external_book_and_sheet_names(&self, extern_sheet_index: usize) -> Option<ExternalSheet> {
        let es = self.extern_sheet.as_ref()?;
        let book = es.ext_book_index_from_ref_index(extern_sheet_index)? as usize;
        let supbook = &self.blocks.get(book)?.supbook;
        if !supbook.is_external_references() {
            return None;
        }
        let first = es.first_sheet_index_from_ref_index(extern_sheet_index)?;
        let last = es.last_sheet_index_from_ref_index(extern_sheet_index)?;
        let sheet_name = |ix: i16| -> Option<String> {
            if ix < 0 {
                None
            } else {
                supbook.sheet_names().get(ix as usize).cloned()
            }
        };
        Some(ExternalSheet {
            workbook_name: supbook.url()?,
            first_sheet_name: sheet_name(first),
            last_sheet_name: if first == last { None } else { sheet_name(last) },
        })
    }

    /// Replace the URL of the linked workbook `old_url`. Returns whether one
    /// was found.
    pub fn change_external_reference(&mut self, records: &mut WorkbookRecordList, old_url: &str, new_url: &str) -> bool {
        let Some(book) = self.external_workbook_index(old_url) else {
            return false;
        };
        self.blocks[book].supbook.set_url(new_url);
        self.sync_supbook(records, book);
        true
    }

    // ── External names ──────────────────────────────────────────────────

    /// Find an external name by text, optionally restricted to one
    /// EXTERNSHEET entry.
    pub fn name_x_ptg(&self, name: &str, sheet_ref_index: Option<usize>) -> Option<NameXRef> {
        let es = self.extern_sheet.as_ref()?;
        for (book, block) in self.blocks.iter().enumerate() {
            let Some(name_index) = block.index_of_name(name) else {
                continue;
            };
            let Some(this_ref) = es.find_ref_index_from_ext_book_index(book as u16) else {
                continue;
            };
            if sheet_ref_index.map_or(true, |wanted| wanted == this_ref) {
                return Some(NameXRef {
                    sheet_ref_index: this_ref,
                    name_index,
                });
            }
        }
        None
    }

    /// Register an add-in function name, creating the add-in SUPBOOK (scoped
    /// to the whole workbook) on first use.
    pub fn add_name_x_ptg(&mut self, records: &mut WorkbookRecordList, name: &str) -> XlsResult<NameXRef> {
        if self.extern_sheet.is_none() {
            return Err(XlsError::format("link table has no EXTERNSHEET record"));
        }
        let book = match self.blocks.iter().position(|b| b.supbook.is_add_in_functions()) {
            Some(book) => book,
            None => {
                let supbook = SupBookRecord::add_in_functions();
                let pos = records
                    .find_first_loc_by_sid(sid::EXTERNSHEET)
                    .unwrap_or_else(|| records.len());
                records.add(pos, Record::SupBook(supbook.clone()));
                self.blocks.push(ExternalBookBlock::new(supbook));
                let book = self.blocks.len() - 1;
                self.extern_sheet_mut()?
                    .add_ref(book as u16, WORKBOOK_SCOPE_SHEET, WORKBOOK_SCOPE_SHEET);
                book
            }
        };

        let record = ExternalNameRecord::add_in_function(name);
        let block = &mut self.blocks[book];
        block.external_names.push(record.clone());
        let name_index = block.external_names.len() - 1;

        let supbook_pos = records
            .iter()
            .position(|r| matches!(r, Record::SupBook(s) if s.is_add_in_functions()))
            .ok_or_else(|| XlsError::format("add-in SUPBOOK missing from the record list"))?;
        records.add(supbook_pos + block.external_names.len(), Record::ExternalName(record));

        let sheet_ref_index = self
            .extern_sheet_mut()?
            .ref_index_for_sheet(book as u16, WORKBOOK_SCOPE_SHEET, WORKBOOK_SCOPE_SHEET)
            .ok_or_else(|| XlsError::format("add-in SUPBOOK has no workbook-scope EXTERNSHEET entry"))?;
        self.sync_extern_sheet(records);
        Ok(NameXRef {
            sheet_ref_index,
            name_index,
        })
    }

    /// Text of external name `name_index` reached through EXTERNSHEET entry
    /// `ref_index`.
    ///
    /// When the block has no such external name and the entry is
    /// workbook-scoped (first sheet -2), the index is taken as a defined name
    /// of this workbook, prefixed with its sheet when it is sheet-scoped.
    pub fn resolve_name_x_text(
        &self,
        ref_index: usize,
        name_index: usize,
        sheets: &[BoundSheetRecord],
    ) -> XlsResult<String> {
        let es = self
            .extern_sheet
            .as_ref()
            .ok_or_else(|| XlsError::format("link table has no EXTERNSHEET record"))?;
        let book = es
            .ext_book_index_from_ref_index(ref_index)
            .ok_or_else(|| XlsError::argument(format!("no EXTERNSHEET entry {ref_index}")))? as usize;
        let first_tab = es.first_sheet_index_from_ref_index(ref_index).unwrap_or(-1);
        if first_tab == -1 {
            return Err(XlsError::argument("referenced sheet could not be found"));
        }
        let block = self
            .blocks
            .get(book)
            .ok_or_else(|| XlsError::format(format!("EXTERNSHEET entry points at missing book {book}")))?;
        if let Some(ext) = block.external_names.get(name_index) {
            return Ok(ext.name.clone());
        }
        if first_tab == WORKBOOK_SCOPE_SHEET {
            let nr = self
                .defined_names
                .get(name_index)
                .ok_or_else(|| XlsError::argument(format!("no defined name at index {name_index}")))?;
            let mut text = String::with_capacity(64);
            if nr.sheet_number > 0 {
                if let Some(sheet) = sheets.get(nr.sheet_number as usize - 1) {
                    append_sheet_name(&mut text, &sheet.sheet_name);
                    text.push('!');
                }
            }
            text.push_str(nr.name_text());
            return Ok(text);
        }
        Err(XlsError::argument(format!(
            "external name index {name_index} beyond book {book} with {} names",
            block.external_names.len()
        )))
    }

    /// The `ixals` of the external name behind `ref_index` / `name_index`.
    pub fn resolve_name_x_ix(&self, ref_index: usize, name_index: usize) -> Option<u16> {
        let book = self.extern_sheet.as_ref()?.ext_book_index_from_ref_index(ref_index)? as usize;
        Some(self.blocks.get(book)?.external_names.get(name_index)?.ixals)
    }

    /// Every record of the table in stream order.
    pub fn records(&self) -> Vec<Record> {
        let mut out: Vec<Record> = self.blocks.iter().flat_map(|b| b.records()).collect();
        if let Some(es) = &self.extern_sheet {
            out.push(Record::ExternSheet(es.clone()));
        }
        out.extend(self.defined_names.iter().cloned().map(Record::Name));
        out
    }
}

fn read_extern_sheet(rs: &mut RecordStream) -> XlsResult<ExternSheetRecord> {
    let mut found = Vec::with_capacity(1);
    while rs.peek_next_sid() == Some(sid::EXTERNSHEET) {
        match rs.next()? {
            Record::ExternSheet(es) => found.push(es),
            _ => return Err(XlsError::format("EXTERNSHEET record could not be decoded")),
        }
    }
    match found.len() {
        0 => Err(XlsError::format("expected an EXTERNSHEET record")),
        1 => Ok(found.remove(0)),
        n => {
            warn!("combining {n} EXTERNSHEET records into one");
            Ok(ExternSheetRecord::combine(found))
        }
    }
}

/// Append `name`, quoted when a formula would need it quoted.
pub fn append_sheet_name(out: &mut String, name: &str) {
    if needs_quoting(name) {
        out.push('\'');
        for c in name.chars() {
            if c == '\'' {
                out.push('\'');
            }
            out.push(c);
        }
        out.push('\'');
    } else {
        out.push_str(name);
    }
}

fn needs_quoting(name: &str) -> bool {
    let Some(first) = name.chars().next() else {
        return true;
    };
    if !(first.is_alphabetic() || first == '_') {
        return true;
    }
    if name.chars().any(|c| !(c.is_alphanumeric() || c == '_' || c == '.')) {
        return true;
    }
    if name.eq_ignore_ascii_case("TRUE") || name.eq_ignore_ascii_case("FALSE") {
        return true;
    }
    looks_like_cell_reference(name)
}

/// `A1`-style: 1-3 letters followed by digits only.
fn looks_like_cell_reference(name: &str) -> bool {
    let letters = name.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let rest = &name[letters..];
    (1..=3).contains(&letters) && !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::record::{BofRecord, CountryRecord};
    use pretty_assertions::assert_eq;

    fn globals() -> WorkbookRecordList {
        let mut list = WorkbookRecordList::new();
        list.push(Record::Bof(BofRecord::workbook()));
        list.push(Record::Country(CountryRecord {
            default_country: 1,
            current_country: 1,
        }));
        list.push(Record::Eof);
        list
    }

    #[test]
    fn default_table_goes_after_country() {
        let mut list = globals();
        let table = LinkTable::new(3, &mut list).unwrap();
        let sids: Vec<u16> = list.iter().map(Record::sid).collect();
        assert_eq!(
            sids,
            vec![sid::BOF, sid::COUNTRY, sid::SUPBOOK, sid::EXTERNSHEET, sid::EOF]
        );
        assert_eq!(table.record_count(), 2);
        assert_eq!(list.anchor(Anchor::ExternSheet), Some(3));
    }

    #[test]
    fn check_extern_sheet_dedups() {
        let mut list = globals();
        let mut table = LinkTable::new(3, &mut list).unwrap();
        let a = table.check_extern_sheet(&mut list, 1, 1).unwrap();
        let b = table.check_extern_sheet(&mut list, 1, 1).unwrap();
        let c = table.check_extern_sheet(&mut list, 0, 2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        match list.find_first_by_sid(sid::EXTERNSHEET) {
            Some(Record::ExternSheet(es)) => assert_eq!(es.num_refs(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn names_are_placed_after_externsheet() {
        let mut list = globals();
        let mut table = LinkTable::new(1, &mut list).unwrap();
        table.add_name(&mut list, NameRecord::new("A", 0)).unwrap();
        table.add_name(&mut list, NameRecord::new("B", 1)).unwrap();
        let sids: Vec<u16> = list.iter().map(Record::sid).collect();
        assert_eq!(
            sids,
            vec![sid::BOF, sid::COUNTRY, sid::SUPBOOK, sid::EXTERNSHEET, sid::NAME, sid::NAME, sid::EOF]
        );
        match list.get(5) {
            Some(Record::Name(n)) => assert_eq!(n.name_text(), "B"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_depend_on_scope() {
        let mut list = globals();
        let mut table = LinkTable::new(2, &mut list).unwrap();
        table.add_name(&mut list, NameRecord::new("Total", 1)).unwrap();
        assert!(table.name_already_exists(&NameRecord::new("TOTAL", 1)));
        assert!(!table.name_already_exists(&NameRecord::new("TOTAL", 0)));
        assert!(!table.name_already_exists(&NameRecord::new("Other", 1)));
    }

    #[test]
    fn linking_a_workbook_is_idempotent() {
        let mut list = globals();
        let mut table = LinkTable::new(1, &mut list).unwrap();
        let sheets = vec!["Data".to_string(), "Summary".to_string()];
        let book = table.link_external_workbook(&mut list, "other.xls", &sheets).unwrap();
        assert_eq!(book, 1);
        assert_eq!(table.link_external_workbook(&mut list, "other.xls", &sheets).unwrap(), 1);
        assert_eq!(list.count_by_sid(sid::SUPBOOK), 2);

        let ix = table
            .external_sheet_index(&mut list, "other.xls", "Summary", "Summary")
            .unwrap();
        let ext = table.external_book_and_sheet_names(ix).unwrap();
        assert_eq!(ext.workbook_name, "other.xls");
        assert_eq!(ext.first_sheet_name.as_deref(), Some("Summary"));
        assert_eq!(ext.last_sheet_name, None);

        assert!(table.change_external_reference(&mut list, "other.xls", "moved.xls"));
        assert!(!table.change_external_reference(&mut list, "other.xls", "x.xls"));
        match list.find_nth_by_sid(sid::SUPBOOK, 1) {
            Some(Record::SupBook(s)) => assert_eq!(s.url().as_deref(), Some("moved.xls")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn add_in_names_use_the_workbook_scope_sentinel() {
        let mut list = globals();
        let mut table = LinkTable::new(1, &mut list).unwrap();
        let first = table.add_name_x_ptg(&mut list, "MYFUNC").unwrap();
        let second = table.add_name_x_ptg(&mut list, "OTHER").unwrap();
        assert_eq!(first.sheet_ref_index, second.sheet_ref_index);
        assert_eq!((first.name_index, second.name_index), (0, 1));
        let es = table.extern_sheet().unwrap();
        assert_eq!(es.first_sheet_index_from_ref_index(first.sheet_ref_index), Some(-2));

        assert_eq!(table.name_x_ptg("myfunc", None), Some(first));
        assert_eq!(table.name_x_ptg("missing", None), None);
        assert_eq!(
            table.resolve_name_x_text(first.sheet_ref_index, 1, &[]).unwrap(),
            "OTHER"
        );
        let sids: Vec<u16> = list.iter().map(Record::sid).collect();
        assert_eq!(
            sids,
            vec![
                sid::BOF,
                sid::COUNTRY,
                sid::SUPBOOK,
                sid::SUPBOOK,
                sid::EXTERNNAME,
                sid::EXTERNNAME,
                sid::EXTERNSHEET,
                sid::EOF
            ]
        );
    }

    #[test]
    fn workbook_scope_falls_back_to_defined_names() {
        let mut list = globals();
        let mut table = LinkTable::new(2, &mut list).unwrap();
        let x = table.add_name_x_ptg(&mut list, "F").unwrap();
        table.add_name(&mut list, NameRecord::new("Shadowed", 0)).unwrap();
        table.add_name(&mut list, NameRecord::new("Global", 0)).unwrap();
        table.add_name(&mut list, NameRecord::new("Local", 2)).unwrap();
        let sheets = vec![BoundSheetRecord::new("Sheet1"), BoundSheetRecord::new("My Sheet")];
        // index 0 is the add-in name itself
        assert_eq!(table.resolve_name_x_text(x.sheet_ref_index, 0, &sheets).unwrap(), "F");
        // sheet number 0 is global scope: no prefix
        assert_eq!(table.resolve_name_x_text(x.sheet_ref_index, 1, &sheets).unwrap(), "Global");
        assert_eq!(table.resolve_name_x_text(x.sheet_ref_index, 2, &sheets).unwrap(), "'My Sheet'!Local");
        assert!(table.resolve_name_x_text(x.sheet_ref_index, 3, &sheets).is_err());
    }

    #[test]
    fn sheet_move_repoints_3d_references() {
        use duke_xls_records::formula::area_3d_tokens;
        let mut list = globals();
        let mut table = LinkTable::new(3, &mut list).unwrap();
        let ix0 = table.check_extern_sheet(&mut list, 0, 0).unwrap();
        let ix2 = table.check_extern_sheet(&mut list, 2, 2).unwrap();
        let mut formula = Formula::new(area_3d_tokens(ix0 as u16, 0, 9, 0, 0));
        // sheet 0 moves to the end
        let shifter = FormulaShifter::for_sheet_move(0, 2);
        assert!(table.shift_sheet_references(&mut list, &mut formula, &shifter).unwrap());
        assert_eq!(formula.extern_sheet_indexes().unwrap(), vec![ix2 as u16]);
    }

    #[test]
    fn sheet_name_quoting() {
        let mut s = String::new();
        append_sheet_name(&mut s, "Sheet1");
        s.push('|');
        append_sheet_name(&mut s, "It's");
        s.push('|');
        append_sheet_name(&mut s, "AB12");
        assert_eq!(s, "Sheet1|'It''s'|'AB12'");
    }
}
