//! `.xls` files: a compound file holding one `Workbook` stream, read into an
//! [`InternalWorkbook`] and its sheets and written back the same way.

use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;

use duke_xls_records::record::{UnicodeString, BUILTIN_FILTER_DB};
use duke_xls_records::{read_records_from_bytes, sid, Record};
use log::{debug, trace};

use crate::error::{XlsError, XlsResult};
use crate::options::WorkbookOptions;
use crate::sheet::Sheet;
use crate::stream::RecordStream;
use crate::workbook::{InternalWorkbook, MAX_SHEET_NAME_LEN};

/// A workbook and its sheets, in stream order.
#[derive(Debug, Clone)]
pub struct XlsDocument {
    workbook: InternalWorkbook,
    sheets: Vec<Sheet>,
}

impl XlsDocument {
    /// A blank document with one empty sheet.
    pub fn new(options: &WorkbookOptions) -> XlsResult<Self> {
        let workbook = InternalWorkbook::create_workbook_default(options)?;
        let mut sheet = Sheet::create_sheet_default();
        sheet.set_selected(true)?;
        sheet.set_active(true)?;
        Ok(Self {
            workbook,
            sheets: vec![sheet],
        })
    }

    /// Read an XLS file from a filesystem path.
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::read(file)
    }

    /// Read an XLS file from any `Read + Seek` source.
    pub fn read<R: Read + Seek>(reader: R) -> XlsResult<Self> {
        let mut compound = cfb::CompoundFile::open(reader)?;
        let stream_path = if compound.exists("/Workbook") {
            "/Workbook"
        } else if compound.exists("/Book") {
            "/Book"
        } else {
            return Err(XlsError::InvalidFormat("no Workbook or Book stream found in CFB".into()));
        };

        let mut stream_data = Vec::new();
        compound.open_stream(stream_path)?.read_to_end(&mut stream_data)?;
        debug!("read {} byte {stream_path} stream", stream_data.len());
        Self::from_workbook_stream(&stream_data)
    }

    /// Build the document from the bytes of a `Workbook` stream.
    pub fn from_workbook_stream(data: &[u8]) -> XlsResult<Self> {
        let raws = read_records_from_bytes(data)?;
        let records = Record::decode_records(&raws);
        debug!("decoded {} records", records.len());

        let mut rs = RecordStream::new(records);
        let mut workbook = InternalWorkbook::create_workbook(&mut rs)?;
        let remaining = rs.into_remaining();
        workbook.collect_hyperlinks(&remaining);

        let mut rs = RecordStream::new(remaining);
        let mut sheets = Vec::new();
        while rs.has_next() {
            if rs.peek_next_sid() == Some(sid::BOF) {
                sheets.push(Sheet::create_sheet(&mut rs)?);
            } else {
                let skipped = rs.next()?;
                trace!("skipping {} between sheets", skipped.name());
            }
        }

        let mut failure = None;
        for sheet in &mut sheets {
            let converted = sheet.rows_mut().convert_labels(|label| {
                match workbook.add_sst_string(UnicodeString::new(&label.value)) {
                    Ok(index) => index,
                    Err(e) => {
                        failure.get_or_insert(e);
                        0
                    }
                }
            });
            if converted > 0 {
                debug!("converted {converted} LABEL cells to LABELSST");
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        debug!("document has {} sheets", sheets.len());
        Ok(Self { workbook, sheets })
    }

    pub fn workbook(&self) -> &InternalWorkbook {
        &self.workbook
    }

    pub fn workbook_mut(&mut self) -> &mut InternalWorkbook {
        &mut self.workbook
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn num_sheets(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn sheet_mut(&mut self, index: usize) -> Option<&mut Sheet> {
        self.sheets.get_mut(index)
    }

    fn check_new_name(&self, name: &str) -> XlsResult<()> {
        if self.workbook.contains_sheet_name(name, None) {
            return Err(XlsError::argument(format!("the workbook already contains a sheet named '{name}'")));
        }
        Ok(())
    }

    /// Append an empty sheet called `name`, returning its index.
    pub fn create_sheet(&mut self, name: &str) -> XlsResult<usize> {
        self.check_new_name(name)?;
        let index = self.sheets.len();
        self.workbook.set_sheet_name(index, name)?;
        let mut sheet = Sheet::create_sheet_default();
        sheet.set_selected(index == 0)?;
        sheet.set_active(index == 0)?;
        self.sheets.push(sheet);
        debug!("created sheet {index} {name:?}");
        Ok(index)
    }

    /// Append a copy of sheet `index` named like "Data (2)", returning the
    /// new index. The copy gets its own drawing and autofilter name.
    pub fn clone_sheet(&mut self, index: usize) -> XlsResult<usize> {
        let source = self
            .sheets
            .get(index)
            .ok_or_else(|| XlsError::argument(format!("no sheet at index {index}")))?;
        let mut clone = source.clone_sheet()?;
        clone.set_selected(false)?;
        clone.set_active(false)?;

        let source_name = self.workbook.sheet_name(index).unwrap_or_default().to_string();
        let name = self.unique_sheet_name(&source_name);
        let new_index = self.workbook.add_bound_sheet(&name)?;
        self.workbook.clone_drawings(&mut clone)?;

        let filter = self
            .workbook
            .names()
            .iter()
            .position(|n| n.built_in_code() == Some(BUILTIN_FILTER_DB) && usize::from(n.sheet_number) == index + 1);
        if let Some(filter) = filter {
            self.workbook.clone_filter(filter, new_index)?;
        }
        self.sheets.push(clone);
        debug!("cloned sheet {index} as {new_index} {name:?}");
        Ok(new_index)
    }

    fn unique_sheet_name(&self, source: &str) -> String {
        let (base, mut n) = match source.rfind(" (") {
            Some(i) if source.ends_with(')') => match source[i + 2..source.len() - 1].parse::<u32>() {
                Ok(k) => (&source[..i], k + 1),
                Err(_) => (source, 2),
            },
            _ => (source, 2),
        };
        loop {
            let suffix = format!(" ({n})");
            let keep = MAX_SHEET_NAME_LEN.saturating_sub(suffix.len());
            let candidate: String = base.chars().take(keep).chain(suffix.chars()).collect();
            if !self.workbook.contains_sheet_name(&candidate, None) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Remove sheet `index`. The selection moves to a neighbour when the
    /// removed sheet held it.
    pub fn remove_sheet(&mut self, index: usize) -> XlsResult<Sheet> {
        if index >= self.sheets.len() {
            return Err(XlsError::argument(format!(
                "sheet index {index} is out of range 0..{}",
                self.sheets.len()
            )));
        }
        self.workbook.remove_sheet(index)?;
        let removed = self.sheets.remove(index);

        if !self.sheets.is_empty() && !self.sheets.iter().any(Sheet::is_selected) {
            let next = index.min(self.sheets.len() - 1);
            self.sheets[next].set_selected(true)?;
            self.sheets[next].set_active(true)?;
        }
        let last = self.sheets.len().saturating_sub(1) as u16;
        let window = self.workbook.window_one_mut()?;
        window.active_sheet = window.active_sheet.min(last);
        window.first_visible_tab = window.first_visible_tab.min(last);
        Ok(removed)
    }

    /// Move the sheet called `name` to position `pos`.
    pub fn set_sheet_order(&mut self, name: &str, pos: usize) -> XlsResult<()> {
        let from = self
            .workbook
            .sheet_index(name)
            .ok_or_else(|| XlsError::argument(format!("no sheet named '{name}'")))?;
        self.workbook.set_sheet_order(name, pos)?;
        let sheet = self.sheets.remove(from);
        self.sheets.insert(pos, sheet);
        Ok(())
    }

    /// Give sheet `index` an empty drawing, creating the workbook drawing
    /// group first when needed.
    pub fn create_drawing_patriarch(&mut self, index: usize) -> XlsResult<()> {
        self.workbook.create_drawing_group();
        let sheet = self
            .sheets
            .get_mut(index)
            .ok_or_else(|| XlsError::argument(format!("no sheet at index {index}")))?;
        let manager = self
            .workbook
            .drawing_manager_mut()
            .ok_or_else(|| XlsError::format("drawing group could not be created"))?;
        sheet.aggregate_drawing_records(manager, true)?;
        Ok(())
    }

    /// The whole `Workbook` stream.
    pub fn to_bytes(&mut self) -> XlsResult<Vec<u8>> {
        if self.sheets.len() != self.workbook.num_sheets() {
            return Err(XlsError::format(format!(
                "{} sheets but {} BOUNDSHEET records",
                self.sheets.len(),
                self.workbook.num_sheets()
            )));
        }
        self.workbook.pre_serialize();
        for sheet in &mut self.sheets {
            sheet.pre_serialize();
        }

        let mut offset = self.workbook.size();
        for (i, sheet) in self.sheets.iter().enumerate() {
            self.workbook.set_sheet_bof(i, offset as u32)?;
            offset += sheet.size();
        }

        let mut out = Vec::with_capacity(offset);
        let mut pos = self.workbook.serialize(0, &mut out);
        for sheet in &self.sheets {
            pos += sheet.serialize(pos, &mut out);
        }
        debug!("serialized {pos} byte workbook stream");
        Ok(out)
    }

    /// Write a compound file holding the `Workbook` stream.
    pub fn write<W: Write>(&mut self, mut writer: W) -> XlsResult<()> {
        let stream = self.to_bytes()?;
        let mut compound = cfb::CompoundFile::create(Cursor::new(Vec::new()))?;
        {
            let mut workbook = compound.create_stream("/Workbook")?;
            workbook.write_all(&stream)?;
            workbook.flush()?;
        }
        compound.flush()?;
        writer.write_all(&compound.into_inner().into_inner())?;
        Ok(())
    }

    pub fn write_file<P: AsRef<Path>>(&mut self, path: P) -> XlsResult<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn document() -> XlsDocument {
        XlsDocument::new(&WorkbookOptions::default()).unwrap()
    }

    #[test]
    fn clone_names_count_up() {
        let mut doc = document();
        assert_eq!(doc.unique_sheet_name("Sheet1"), "Sheet1 (2)");
        doc.create_sheet("Sheet1 (2)").unwrap();
        assert_eq!(doc.unique_sheet_name("Sheet1"), "Sheet1 (3)");
        assert_eq!(doc.unique_sheet_name("Sheet1 (2)"), "Sheet1 (3)");
        assert_eq!(doc.unique_sheet_name("Totals (x)"), "Totals (x) (2)");

        let long = "b".repeat(31);
        let name = doc.unique_sheet_name(&long);
        assert_eq!(name.chars().count(), 31);
        assert!(name.ends_with(" (2)"));
    }

    #[test]
    fn duplicate_sheet_names_are_refused() {
        let mut doc = document();
        assert!(matches!(doc.create_sheet("SHEET1"), Err(XlsError::InvalidArgument(_))));
        assert_eq!(doc.create_sheet("Other").unwrap(), 1);
        assert_eq!(doc.num_sheets(), 2);
        assert!(!doc.sheet(1).unwrap().is_selected());
    }

    #[test]
    fn only_the_first_created_sheet_is_selected() {
        let mut doc = document();
        doc.create_sheet("Two").unwrap();
        doc.create_sheet("Three").unwrap();
        let selected = |doc: &XlsDocument| doc.sheets().iter().map(Sheet::is_selected).collect::<Vec<_>>();
        assert_eq!(selected(&doc), vec![true, false, false]);

        let bytes = doc.to_bytes().unwrap();
        let read = XlsDocument::from_workbook_stream(&bytes).unwrap();
        assert_eq!(selected(&read), vec![true, false, false]);
    }

    #[test]
    fn removing_the_selected_sheet_selects_a_neighbour() {
        let mut doc = document();
        doc.create_sheet("Two").unwrap();
        doc.remove_sheet(0).unwrap();
        assert!(doc.sheet(0).unwrap().is_selected());
        assert_eq!(doc.workbook().window_one().active_sheet, 0);
        assert!(doc.remove_sheet(3).is_err());
    }

    #[test]
    fn bof_offsets_point_at_sheet_bofs() {
        let mut doc = document();
        doc.create_sheet("Two").unwrap();
        let bytes = doc.to_bytes().unwrap();
        for bs in doc.workbook().bound_sheets() {
            let at = bs.position_of_bof as usize;
            assert_eq!(&bytes[at..at + 2], &sid::BOF.to_le_bytes());
            assert_eq!(&bytes[at + 6..at + 8], &sid::BOF_WORKSHEET.to_le_bytes());
        }
    }
}
