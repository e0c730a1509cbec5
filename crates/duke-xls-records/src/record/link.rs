//! Link table records: SUPBOOK, EXTERNSHEET, EXTERNNAME, NAME, NAMECMT, XCT.

use crate::error::{RecordError, RecordResult};
use crate::formula::{ref_error_tokens, Formula};
use crate::parser::*;
use crate::strings::{
    char_count, is_compressible, read_character_data, read_short_string, read_unicode_string, write_characters,
    write_short_string, write_unicode_string, FLAG_HIGH_BYTE,
};

// ── SUPBOOK ─────────────────────────────────────────────────────────────────

/// Marker of the internal-references SUPBOOK.
pub const TAG_INTERNAL_REFERENCES: u16 = 0x0401;
/// Marker of the add-in functions SUPBOOK.
pub const TAG_ADD_IN_FUNCTIONS: u16 = 0x3A01;

// Encoded file name control characters.
const CH_VOLUME: char = '\u{1}';
const CH_SAME_VOLUME: char = '\u{2}';
const CH_DOWN_DIR: char = '\u{3}';
const CH_UP_DIR: char = '\u{4}';
const CH_LONG_VOLUME: char = '\u{5}';
const CH_STARTUP_DIR: char = '\u{6}';
const CH_ALT_STARTUP_DIR: char = '\u{7}';
const CH_LIB_DIR: char = '\u{8}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupBookKind {
    /// References to sheets of this workbook.
    Internal,
    /// Add-in function names (always one "sheet").
    AddIn,
    /// Another workbook; the URL is stored encoded.
    External { encoded_url: String, sheet_names: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupBookRecord {
    pub number_of_sheets: u16,
    pub kind: SupBookKind,
}

impl SupBookRecord {
    pub fn internal_references(number_of_sheets: u16) -> Self {
        Self {
            number_of_sheets,
            kind: SupBookKind::Internal,
        }
    }

    pub fn add_in_functions() -> Self {
        Self {
            number_of_sheets: 1,
            kind: SupBookKind::AddIn,
        }
    }

    pub fn external_references(encoded_url: &str, sheet_names: Vec<String>) -> Self {
        Self {
            number_of_sheets: sheet_names.len() as u16,
            kind: SupBookKind::External {
                encoded_url: encoded_url.to_string(),
                sheet_names,
            },
        }
    }

    pub fn is_internal_references(&self) -> bool {
        matches!(self.kind, SupBookKind::Internal)
    }

    pub fn is_add_in_functions(&self) -> bool {
        matches!(self.kind, SupBookKind::AddIn)
    }

    pub fn is_external_references(&self) -> bool {
        matches!(self.kind, SupBookKind::External { .. })
    }

    pub fn sheet_names(&self) -> &[String] {
        match &self.kind {
            SupBookKind::External { sheet_names, .. } => sheet_names,
            _ => &[],
        }
    }

    /// Decoded URL of an external book.
    pub fn url(&self) -> Option<String> {
        let SupBookKind::External { encoded_url, .. } = &self.kind else {
            return None;
        };
        let mut chars = encoded_url.chars();
        Some(match chars.next() {
            // empty workbook name and self-reference
            Some('\u{0}') | Some('\u{2}') => chars.collect(),
            Some(CH_VOLUME) => decode_file_name(chars.as_str()),
            _ => encoded_url.clone(),
        })
    }

    /// Replace the URL, keeping the leading encoding marker.
    pub fn set_url(&mut self, url: &str) {
        if let SupBookKind::External { encoded_url, .. } = &mut self.kind {
            let marker: String = encoded_url.chars().take(1).collect();
            *encoded_url = marker + url;
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let number_of_sheets = read_u16(data, &mut o)?;
        if data.len() > 4 {
            let encoded_url = read_unicode_string(data, &mut o)?;
            let mut sheet_names = Vec::with_capacity(number_of_sheets as usize);
            for _ in 0..number_of_sheets {
                sheet_names.push(read_unicode_string(data, &mut o)?);
            }
            return Ok(Self {
                number_of_sheets,
                kind: SupBookKind::External {
                    encoded_url,
                    sheet_names,
                },
            });
        }
        let kind = match read_u16(data, &mut o)? {
            TAG_INTERNAL_REFERENCES => SupBookKind::Internal,
            TAG_ADD_IN_FUNCTIONS => {
                if number_of_sheets != 1 {
                    return Err(RecordError::InvalidFormat(format!(
                        "add-in SUPBOOK must have 1 sheet, found {number_of_sheets}"
                    )));
                }
                SupBookKind::AddIn
            }
            other => {
                return Err(RecordError::InvalidFormat(format!(
                    "invalid SUPBOOK marker 0x{other:04X}"
                )))
            }
        };
        Ok(Self { number_of_sheets, kind })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.number_of_sheets);
        match &self.kind {
            SupBookKind::Internal => write_u16(out, TAG_INTERNAL_REFERENCES),
            SupBookKind::AddIn => write_u16(out, TAG_ADD_IN_FUNCTIONS),
            SupBookKind::External {
                encoded_url,
                sheet_names,
            } => {
                write_unicode_string(out, encoded_url);
                for name in sheet_names {
                    write_unicode_string(out, name);
                }
            }
        }
    }
}

fn decode_file_name(encoded: &str) -> String {
    let sep = std::path::MAIN_SEPARATOR;
    let mut sb = String::new();
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        match c {
            CH_VOLUME => match chars.next() {
                Some('@') => sb.push_str("\\\\"),
                Some(drive) => {
                    sb.push(drive);
                    sb.push(':');
                }
                None => {}
            },
            CH_SAME_VOLUME | CH_DOWN_DIR => sb.push(sep),
            CH_UP_DIR => {
                sb.push_str("..");
                sb.push(sep);
            }
            CH_LONG_VOLUME => log::warn!("unsupported long-volume marker in external workbook path"),
            CH_STARTUP_DIR | CH_ALT_STARTUP_DIR | CH_LIB_DIR => {
                sb.push('.');
                sb.push(sep);
            }
            other => sb.push(other),
        }
    }
    sb
}

// ── EXTERNSHEET ─────────────────────────────────────────────────────────────

/// One XTI entry. Sheet indexes are signed: `-1` marks a deleted sheet and
/// `-2` the workbook-level scope used by add-in names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefSubRecord {
    pub ext_book_index: u16,
    pub first_sheet_index: i16,
    pub last_sheet_index: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternSheetRecord {
    refs: Vec<RefSubRecord>,
}

impl ExternSheetRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refs(&self) -> &[RefSubRecord] {
        &self.refs
    }

    pub fn num_refs(&self) -> usize {
        self.refs.len()
    }

    pub fn get_ref(&self, index: usize) -> Option<&RefSubRecord> {
        self.refs.get(index)
    }

    /// Append an entry and return its index.
    pub fn add_ref(&mut self, ext_book_index: u16, first_sheet_index: i16, last_sheet_index: i16) -> usize {
        self.refs.push(RefSubRecord {
            ext_book_index,
            first_sheet_index,
            last_sheet_index,
        });
        self.refs.len() - 1
    }

    /// Index of the first entry pointing into `ext_book_index`.
    pub fn find_ref_index_from_ext_book_index(&self, ext_book_index: u16) -> Option<usize> {
        self.refs.iter().position(|r| r.ext_book_index == ext_book_index)
    }

    /// Index of the entry matching the book and sheet range exactly.
    pub fn ref_index_for_sheet(&self, ext_book_index: u16, first: i16, last: i16) -> Option<usize> {
        self.refs.iter().position(|r| {
            r.ext_book_index == ext_book_index && r.first_sheet_index == first && r.last_sheet_index == last
        })
    }

    pub fn ext_book_index_from_ref_index(&self, ref_index: usize) -> Option<u16> {
        self.refs.get(ref_index).map(|r| r.ext_book_index)
    }

    pub fn first_sheet_index_from_ref_index(&self, ref_index: usize) -> Option<i16> {
        self.refs.get(ref_index).map(|r| r.first_sheet_index)
    }

    pub fn last_sheet_index_from_ref_index(&self, ref_index: usize) -> Option<i16> {
        self.refs.get(ref_index).map(|r| r.last_sheet_index)
    }

    /// Adjust every entry for the removal of sheet `sheet_index`.
    pub fn remove_sheet(&mut self, sheet_index: i16) {
        for r in &mut self.refs {
            if r.first_sheet_index == sheet_index && r.last_sheet_index == sheet_index {
                r.first_sheet_index = -1;
                r.last_sheet_index = -1;
            } else if r.first_sheet_index > sheet_index && r.last_sheet_index > sheet_index {
                r.first_sheet_index -= 1;
                r.last_sheet_index -= 1;
            }
        }
    }

    /// Merge the entries of several records, in order.
    pub fn combine(records: Vec<ExternSheetRecord>) -> Self {
        Self {
            refs: records.into_iter().flat_map(|r| r.refs).collect(),
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let count = read_u16(data, &mut o)? as usize;
        let mut refs = Vec::with_capacity(count);
        for _ in 0..count {
            refs.push(RefSubRecord {
                ext_book_index: read_u16(data, &mut o)?,
                first_sheet_index: read_i16(data, &mut o)?,
                last_sheet_index: read_i16(data, &mut o)?,
            });
        }
        Ok(Self { refs })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.refs.len() as u16);
        for r in &self.refs {
            write_u16(out, r.ext_book_index);
            write_i16(out, r.first_sheet_index);
            write_i16(out, r.last_sheet_index);
        }
    }
}

// ── EXTERNNAME ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalNameRecord {
    pub options: u16,
    /// Index into the sheet list of the SUPBOOK, 1-based; 0 for book scope.
    pub ixals: u16,
    pub reserved: u16,
    pub name: String,
    pub definition: Formula,
    /// Cached DDE/OLE values, kept as stored.
    pub cached_values: Vec<u8>,
}

impl ExternalNameRecord {
    pub const OPT_BUILTIN_NAME: u16 = 0x0001;
    pub const OPT_AUTOMATIC_LINK: u16 = 0x0002;
    pub const OPT_PICTURE_LINK: u16 = 0x0004;
    pub const OPT_STD_DOCUMENT_NAME: u16 = 0x0008;
    pub const OPT_OLE_LINK: u16 = 0x0010;

    /// Add-in function name, defined as `#REF!`.
    pub fn add_in_function(name: &str) -> Self {
        Self {
            options: 0,
            ixals: 0,
            reserved: 0,
            name: name.to_string(),
            definition: Formula::new(ref_error_tokens()),
            cached_values: Vec::new(),
        }
    }

    pub fn is_automatic_link(&self) -> bool {
        self.options & Self::OPT_AUTOMATIC_LINK != 0
    }

    pub fn is_ole_link(&self) -> bool {
        self.options & Self::OPT_OLE_LINK != 0
    }

    pub fn is_std_document_name_identifier(&self) -> bool {
        self.options & Self::OPT_STD_DOCUMENT_NAME != 0
    }

    fn has_definition(&self) -> bool {
        !self.is_ole_link() && !self.is_std_document_name_identifier() && !self.is_automatic_link()
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let options = read_u16(data, &mut o)?;
        let ixals = read_u16(data, &mut o)?;
        let reserved = read_u16(data, &mut o)?;
        let name = read_short_string(data, &mut o)?;
        let mut record = Self {
            options,
            ixals,
            reserved,
            name,
            definition: Formula::default(),
            cached_values: Vec::new(),
        };
        if record.has_definition() {
            if o < data.len() {
                record.definition = Formula::read_with_len(data, &mut o)?;
            }
        } else {
            record.cached_values = read_remaining(data, &mut o);
        }
        Ok(record)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.options);
        write_u16(out, self.ixals);
        write_u16(out, self.reserved);
        write_short_string(out, &self.name);
        if self.has_definition() {
            self.definition.write_with_len(out);
        } else {
            out.extend_from_slice(&self.cached_values);
        }
    }
}

// ── NAME ────────────────────────────────────────────────────────────────────

pub const BUILTIN_CONSOLIDATE_AREA: u8 = 0x00;
pub const BUILTIN_AUTO_OPEN: u8 = 0x01;
pub const BUILTIN_AUTO_CLOSE: u8 = 0x02;
pub const BUILTIN_EXTRACT: u8 = 0x03;
pub const BUILTIN_DATABASE: u8 = 0x04;
pub const BUILTIN_CRITERIA: u8 = 0x05;
pub const BUILTIN_PRINT_AREA: u8 = 0x06;
pub const BUILTIN_PRINT_TITLE: u8 = 0x07;
pub const BUILTIN_RECORDER: u8 = 0x08;
pub const BUILTIN_DATA_FORM: u8 = 0x09;
pub const BUILTIN_AUTO_ACTIVATE: u8 = 0x0A;
pub const BUILTIN_AUTO_DEACTIVATE: u8 = 0x0B;
pub const BUILTIN_SHEET_TITLE: u8 = 0x0C;
pub const BUILTIN_FILTER_DB: u8 = 0x0D;

/// Display text of a built-in name code.
pub fn builtin_name_text(code: u8) -> &'static str {
    match code {
        BUILTIN_CONSOLIDATE_AREA => "Consolidate_Area",
        BUILTIN_AUTO_OPEN => "Auto_Open",
        BUILTIN_AUTO_CLOSE => "Auto_Close",
        BUILTIN_EXTRACT => "Extract",
        BUILTIN_DATABASE => "Database",
        BUILTIN_CRITERIA => "Criteria",
        BUILTIN_PRINT_AREA => "Print_Area",
        BUILTIN_PRINT_TITLE => "Print_Titles",
        BUILTIN_RECORDER => "Recorder",
        BUILTIN_DATA_FORM => "Data_Form",
        BUILTIN_AUTO_ACTIVATE => "Auto_Activate",
        BUILTIN_AUTO_DEACTIVATE => "Auto_Deactivate",
        BUILTIN_SHEET_TITLE => "Sheet_Title",
        BUILTIN_FILTER_DB => "_FilterDatabase",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinedName {
    BuiltIn(u8),
    User(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    pub options: u16,
    pub keyboard_shortcut: u8,
    pub extern_sheet_index: u16,
    /// 1-based sheet the name is local to; 0 for workbook scope.
    pub sheet_number: u16,
    pub name: DefinedName,
    pub definition: Formula,
    pub custom_menu_text: String,
    pub description_text: String,
    pub help_topic_text: String,
    pub status_bar_text: String,
}

impl NameRecord {
    pub const OPT_HIDDEN_NAME: u16 = 0x0001;
    pub const OPT_FUNCTION_NAME: u16 = 0x0002;
    pub const OPT_COMMAND_NAME: u16 = 0x0004;
    pub const OPT_MACRO: u16 = 0x0008;
    pub const OPT_COMPLEX: u16 = 0x0010;
    pub const OPT_BUILTIN: u16 = 0x0020;
    pub const OPT_BINDATA: u16 = 0x1000;

    pub fn new(name: &str, sheet_number: u16) -> Self {
        Self {
            options: 0,
            keyboard_shortcut: 0,
            extern_sheet_index: 0,
            sheet_number,
            name: DefinedName::User(name.to_string()),
            definition: Formula::default(),
            custom_menu_text: String::new(),
            description_text: String::new(),
            help_topic_text: String::new(),
            status_bar_text: String::new(),
        }
    }

    pub fn built_in(code: u8, sheet_number: u16) -> Self {
        let mut record = Self::new("", sheet_number);
        record.name = DefinedName::BuiltIn(code);
        record.options |= Self::OPT_BUILTIN;
        record
    }

    pub fn is_built_in_name(&self) -> bool {
        self.options & Self::OPT_BUILTIN != 0
    }

    pub fn built_in_code(&self) -> Option<u8> {
        match self.name {
            DefinedName::BuiltIn(code) => Some(code),
            DefinedName::User(_) => None,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.options & Self::OPT_HIDDEN_NAME != 0
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        if hidden {
            self.options |= Self::OPT_HIDDEN_NAME;
        } else {
            self.options &= !Self::OPT_HIDDEN_NAME;
        }
    }

    pub fn is_function_name(&self) -> bool {
        self.options & Self::OPT_FUNCTION_NAME != 0
    }

    pub fn name_text(&self) -> &str {
        match &self.name {
            DefinedName::BuiltIn(code) => builtin_name_text(*code),
            DefinedName::User(text) => text,
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let options = read_u16(data, &mut o)?;
        let keyboard_shortcut = read_u8(data, &mut o)?;
        let cch = read_u8(data, &mut o)? as u16;
        let cce = read_u16(data, &mut o)? as usize;
        let extern_sheet_index = read_u16(data, &mut o)?;
        let sheet_number = read_u16(data, &mut o)?;
        let menu_len = read_u8(data, &mut o)? as u16;
        let description_len = read_u8(data, &mut o)? as u16;
        let help_len = read_u8(data, &mut o)? as u16;
        let status_len = read_u8(data, &mut o)? as u16;

        let flags = read_u8(data, &mut o)?;
        let name = if options & Self::OPT_BUILTIN != 0 {
            let code = read_u8(data, &mut o)?;
            // Some writers store the code as a UTF-16 unit
            if flags & FLAG_HIGH_BYTE != 0 {
                read_u8(data, &mut o)?;
            }
            DefinedName::BuiltIn(code)
        } else {
            DefinedName::User(read_character_data(data, &mut o, cch, flags)?)
        };

        let trailing = (menu_len + description_len + help_len + status_len) as usize;
        let available = data.len().saturating_sub(o).saturating_sub(trailing);
        let definition = Formula::read(data, &mut o, cce, available.max(cce))?;

        Ok(Self {
            options,
            keyboard_shortcut,
            extern_sheet_index,
            sheet_number,
            name,
            definition,
            custom_menu_text: read_character_data(data, &mut o, menu_len, 0)?,
            description_text: read_character_data(data, &mut o, description_len, 0)?,
            help_topic_text: read_character_data(data, &mut o, help_len, 0)?,
            status_bar_text: read_character_data(data, &mut o, status_len, 0)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let (cch, wide) = match &self.name {
            DefinedName::BuiltIn(_) => (1, false),
            DefinedName::User(text) => (char_count(text), !is_compressible(text)),
        };
        write_u16(out, self.options);
        write_u8(out, self.keyboard_shortcut);
        write_u8(out, cch as u8);
        write_u16(out, self.definition.tokens.len() as u16);
        write_u16(out, self.extern_sheet_index);
        write_u16(out, self.sheet_number);
        write_u8(out, self.custom_menu_text.chars().count() as u8);
        write_u8(out, self.description_text.chars().count() as u8);
        write_u8(out, self.help_topic_text.chars().count() as u8);
        write_u8(out, self.status_bar_text.chars().count() as u8);
        write_u8(out, if wide { FLAG_HIGH_BYTE } else { 0 });
        match &self.name {
            DefinedName::BuiltIn(code) => write_u8(out, *code),
            DefinedName::User(text) => write_characters(out, text, wide),
        }
        self.definition.write_data(out);
        for text in [
            &self.custom_menu_text,
            &self.description_text,
            &self.help_topic_text,
            &self.status_bar_text,
        ] {
            write_characters(out, text, false);
        }
    }
}

// ── NAMECMT ─────────────────────────────────────────────────────────────────

/// Comment attached to a defined name (a future record type with an FRT header).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCommentRecord {
    pub record_type: u16,
    pub frt_flags: u16,
    pub reserved: u64,
    pub name_text: String,
    pub comment_text: String,
}

impl NameCommentRecord {
    pub fn new(name_text: &str, comment_text: &str) -> Self {
        Self {
            record_type: crate::sid::NAMECMT,
            frt_flags: 0,
            reserved: 0,
            name_text: name_text.to_string(),
            comment_text: comment_text.to_string(),
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let record_type = read_u16(data, &mut o)?;
        let frt_flags = read_u16(data, &mut o)?;
        let low = read_u32(data, &mut o)? as u64;
        let high = read_u32(data, &mut o)? as u64;
        let name_len = read_u16(data, &mut o)?;
        let comment_len = read_u16(data, &mut o)?;
        let name_flags = read_u8(data, &mut o)?;
        let name_text = read_character_data(data, &mut o, name_len, name_flags)?;
        let comment_flags = read_u8(data, &mut o)?;
        let comment_text = read_character_data(data, &mut o, comment_len, comment_flags)?;
        Ok(Self {
            record_type,
            frt_flags,
            reserved: low | (high << 32),
            name_text,
            comment_text,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.record_type);
        write_u16(out, self.frt_flags);
        write_u32(out, self.reserved as u32);
        write_u32(out, (self.reserved >> 32) as u32);
        write_u16(out, char_count(&self.name_text) as u16);
        write_u16(out, char_count(&self.comment_text) as u16);
        for text in [&self.name_text, &self.comment_text] {
            let wide = !is_compressible(text);
            write_u8(out, if wide { FLAG_HIGH_BYTE } else { 0 });
            write_characters(out, text, wide);
        }
    }
}

// ── XCT ─────────────────────────────────────────────────────────────────────

/// Header of a cached external sheet: how many CRN records follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrnCountRecord {
    pub number_of_crns: u16,
    pub sheet_table_index: u16,
}

impl CrnCountRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        // The count is negative when the cache is not up to date.
        let raw = read_i16(data, &mut o)?;
        Ok(Self {
            number_of_crns: raw.unsigned_abs(),
            sheet_table_index: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.number_of_crns);
        write_u16(out, self.sheet_table_index);
    }
}
