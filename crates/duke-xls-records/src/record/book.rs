//! Workbook-globals records.

use crate::error::{RecordError, RecordResult};
use crate::parser::*;
use crate::sid;
use crate::strings::{
    read_short_string, read_unicode_string, unicode_string_size, write_short_string,
    write_unicode_string,
};

/// Beginning of a substream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BofRecord {
    pub version: u16,
    pub bof_type: u16,
    pub build: u16,
    pub build_year: u16,
    pub history_mask: u32,
    pub required_version: u32,
}

impl BofRecord {
    pub fn workbook() -> Self {
        Self {
            version: sid::BIFF8_VERSION,
            bof_type: sid::BOF_WORKBOOK_GLOBALS,
            build: 0x10d3,
            build_year: 1996,
            history_mask: 0x41,
            required_version: 0x6,
        }
    }

    pub fn worksheet() -> Self {
        Self {
            version: sid::BIFF8_VERSION,
            bof_type: sid::BOF_WORKSHEET,
            build: 0x0dbb,
            build_year: 1996,
            history_mask: 0xc1,
            required_version: 0x6,
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        if data.len() < 4 {
            return Err(RecordError::InvalidFormat("BOF record too short".into()));
        }
        let mut o = 0;
        let version = read_u16(data, &mut o)?;
        let bof_type = read_u16(data, &mut o)?;
        let build = read_u16(data, &mut o).unwrap_or(0);
        let build_year = read_u16(data, &mut o).unwrap_or(0);
        let history_mask = read_u32(data, &mut o).unwrap_or(0);
        let required_version = read_u32(data, &mut o).unwrap_or(0);
        Ok(Self {
            version,
            bof_type,
            build,
            build_year,
            history_mask,
            required_version,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.version);
        write_u16(out, self.bof_type);
        write_u16(out, self.build);
        write_u16(out, self.build_year);
        write_u32(out, self.history_mask);
        write_u32(out, self.required_version);
    }
}

/// Name of the user who last saved the file, space padded to a fixed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAccessRecord {
    pub username: String,
}

impl WriteAccessRecord {
    pub const DATA_SIZE: usize = 112;

    pub fn new(username: &str) -> RecordResult<Self> {
        if unicode_string_size(username) > Self::DATA_SIZE {
            return Err(RecordError::InvalidFormat(format!(
                "user name '{username}' does not fit in WRITEACCESS"
            )));
        }
        Ok(Self {
            username: username.to_string(),
        })
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let username = read_unicode_string(data, &mut o)?;
        Ok(Self {
            username: username.trim_end_matches(' ').to_string(),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let start = out.len();
        write_unicode_string(out, &self.username);
        let written = out.len() - start;
        if written < Self::DATA_SIZE {
            out.resize(start + Self::DATA_SIZE, b' ');
        }
    }
}

/// Sheet tab ids, rewritten to `0..n` whenever the sheet count changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabIdRecord {
    pub tab_ids: Vec<u16>,
}

impl TabIdRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let mut tab_ids = Vec::with_capacity(data.len() / 2);
        while o + 2 <= data.len() {
            tab_ids.push(read_u16(data, &mut o)?);
        }
        Ok(Self { tab_ids })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        for &id in &self.tab_ids {
            write_u16(out, id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOneRecord {
    pub h_hold: u16,
    pub v_hold: u16,
    pub width: u16,
    pub height: u16,
    pub options: u16,
    pub active_sheet: u16,
    pub first_visible_tab: u16,
    pub num_selected_tabs: u16,
    pub tab_width_ratio: u16,
}

impl Default for WindowOneRecord {
    fn default() -> Self {
        Self {
            h_hold: 0x168,
            v_hold: 0x10e,
            width: 0x3a5c,
            height: 0x23be,
            options: 0x38,
            active_sheet: 0,
            first_visible_tab: 0,
            num_selected_tabs: 1,
            tab_width_ratio: 0x258,
        }
    }
}

impl WindowOneRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            h_hold: read_u16(data, &mut o)?,
            v_hold: read_u16(data, &mut o)?,
            width: read_u16(data, &mut o)?,
            height: read_u16(data, &mut o)?,
            options: read_u16(data, &mut o)?,
            active_sheet: read_u16(data, &mut o)?,
            first_visible_tab: read_u16(data, &mut o)?,
            num_selected_tabs: read_u16(data, &mut o)?,
            tab_width_ratio: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        for v in [
            self.h_hold,
            self.v_hold,
            self.width,
            self.height,
            self.options,
            self.active_sheet,
            self.first_visible_tab,
            self.num_selected_tabs,
            self.tab_width_ratio,
        ] {
            write_u16(out, v);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRecord {
    pub height: u16,
    pub attributes: u16,
    pub color_palette_index: u16,
    pub bold_weight: u16,
    pub super_sub_script: u16,
    pub underline: u8,
    pub family: u8,
    pub charset: u8,
    pub name: String,
}

impl Default for FontRecord {
    fn default() -> Self {
        Self {
            height: 0xc8,
            attributes: 0,
            color_palette_index: 0x7fff,
            bold_weight: 0x190,
            super_sub_script: 0,
            underline: 0,
            family: 0,
            charset: 0,
            name: "Arial".to_string(),
        }
    }
}

impl FontRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let height = read_u16(data, &mut o)?;
        let attributes = read_u16(data, &mut o)?;
        let color_palette_index = read_u16(data, &mut o)?;
        let bold_weight = read_u16(data, &mut o)?;
        let super_sub_script = read_u16(data, &mut o)?;
        let underline = read_u8(data, &mut o)?;
        let family = read_u8(data, &mut o)?;
        let charset = read_u8(data, &mut o)?;
        let _reserved = read_u8(data, &mut o)?;
        let name = read_short_string(data, &mut o)?;
        Ok(Self {
            height,
            attributes,
            color_palette_index,
            bold_weight,
            super_sub_script,
            underline,
            family,
            charset,
            name,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.height);
        write_u16(out, self.attributes);
        write_u16(out, self.color_palette_index);
        write_u16(out, self.bold_weight);
        write_u16(out, self.super_sub_script);
        write_u8(out, self.underline);
        write_u8(out, self.family);
        write_u8(out, self.charset);
        write_u8(out, 0);
        write_short_string(out, &self.name);
    }
}

/// Number format string with its index code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRecord {
    pub index_code: u16,
    pub format_string: String,
}

impl FormatRecord {
    pub fn new(index_code: u16, format_string: &str) -> Self {
        Self {
            index_code,
            format_string: format_string.to_string(),
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let index_code = read_u16(data, &mut o)?;
        let format_string = read_unicode_string(data, &mut o)?;
        Ok(Self {
            index_code,
            format_string,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.index_code);
        write_unicode_string(out, &self.format_string);
    }
}

/// Extended format (XF). Field packing is kept as on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedFormatRecord {
    pub font_index: u16,
    pub format_index: u16,
    pub cell_options: u16,
    pub alignment_options: u16,
    pub indention_options: u16,
    pub border_options: u16,
    pub palette_options: u16,
    pub additional_palette_options: u32,
    pub fill_palette_options: u16,
}

impl ExtendedFormatRecord {
    pub const XF_STYLE: u16 = 0x0004;

    /// Default cell XF: black borders, no fill.
    pub fn cell_default() -> Self {
        Self {
            font_index: 0,
            format_index: 0,
            cell_options: 0x1,
            alignment_options: 0x20,
            indention_options: 0,
            border_options: 0,
            palette_options: 0x0408,
            additional_palette_options: 0x0408,
            fill_palette_options: 0x20c0,
        }
    }

    pub fn is_style_xf(&self) -> bool {
        self.cell_options & Self::XF_STYLE != 0
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            font_index: read_u16(data, &mut o)?,
            format_index: read_u16(data, &mut o)?,
            cell_options: read_u16(data, &mut o)?,
            alignment_options: read_u16(data, &mut o)?,
            indention_options: read_u16(data, &mut o)?,
            border_options: read_u16(data, &mut o)?,
            palette_options: read_u16(data, &mut o)?,
            additional_palette_options: read_u32(data, &mut o)?,
            fill_palette_options: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.font_index);
        write_u16(out, self.format_index);
        write_u16(out, self.cell_options);
        write_u16(out, self.alignment_options);
        write_u16(out, self.indention_options);
        write_u16(out, self.border_options);
        write_u16(out, self.palette_options);
        write_u32(out, self.additional_palette_options);
        write_u16(out, self.fill_palette_options);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleKind {
    BuiltIn { style_id: u8, outline_level: u8 },
    User(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRecord {
    /// Index of the style XF (low 12 bits on disk).
    pub xf_index: u16,
    pub kind: StyleKind,
}

impl StyleRecord {
    const BUILT_IN: u16 = 0x8000;
    const XF_MASK: u16 = 0x0FFF;

    pub fn built_in(xf_index: u16, style_id: u8) -> Self {
        Self {
            xf_index,
            kind: StyleKind::BuiltIn {
                style_id,
                outline_level: 0xFF,
            },
        }
    }

    pub fn user(xf_index: u16, name: &str) -> Self {
        Self {
            xf_index,
            kind: StyleKind::User(name.to_string()),
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let raw = read_u16(data, &mut o)?;
        let kind = if raw & Self::BUILT_IN != 0 {
            StyleKind::BuiltIn {
                style_id: read_u8(data, &mut o)?,
                outline_level: read_u8(data, &mut o)?,
            }
        } else {
            StyleKind::User(read_unicode_string(data, &mut o)?)
        };
        Ok(Self {
            xf_index: raw & Self::XF_MASK,
            kind,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        match &self.kind {
            StyleKind::BuiltIn {
                style_id,
                outline_level,
            } => {
                write_u16(out, (self.xf_index & Self::XF_MASK) | Self::BUILT_IN);
                write_u8(out, *style_id);
                write_u8(out, *outline_level);
            }
            StyleKind::User(name) => {
                write_u16(out, self.xf_index & Self::XF_MASK);
                write_unicode_string(out, name);
            }
        }
    }
}

/// Sheet visibility as stored in BOUNDSHEET's `hsState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SheetVisibility {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetVisibility {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Visible,
            1 => Self::Hidden,
            _ => Self::VeryHidden,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Visible => 0,
            Self::Hidden => 1,
            Self::VeryHidden => 2,
        }
    }
}

/// Sheet name, visibility and BOF offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSheetRecord {
    pub position_of_bof: u32,
    pub visibility: SheetVisibility,
    pub sheet_type: u8,
    pub sheet_name: String,
}

impl BoundSheetRecord {
    pub fn new(sheet_name: &str) -> Self {
        Self {
            position_of_bof: 0,
            visibility: SheetVisibility::Visible,
            sheet_type: 0,
            sheet_name: sheet_name.to_string(),
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let position_of_bof = read_u32(data, &mut o)?;
        let visibility = SheetVisibility::from_bits(read_u8(data, &mut o)?);
        let sheet_type = read_u8(data, &mut o)?;
        let sheet_name = read_short_string(data, &mut o)?;
        Ok(Self {
            position_of_bof,
            visibility,
            sheet_type,
            sheet_name,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u32(out, self.position_of_bof);
        write_u8(out, self.visibility.bits());
        write_u8(out, self.sheet_type);
        write_short_string(out, &self.sheet_name);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRecord {
    pub default_country: u16,
    pub current_country: u16,
}

impl CountryRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        Ok(Self {
            default_country: read_u16(data, &mut o)?,
            current_country: read_u16(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.default_country);
        write_u16(out, self.current_country);
    }
}

/// The 56 user-changeable colors (palette indexes 8..=63).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteRecord {
    pub colors: Vec<[u8; 3]>,
}

/// Palette the host application uses when no PALETTE record is present.
pub const DEFAULT_PALETTE: [u32; 56] = [
    0x000000, 0xFFFFFF, 0xFF0000, 0x00FF00, 0x0000FF, 0xFFFF00, 0xFF00FF, 0x00FFFF, //
    0x800000, 0x008000, 0x000080, 0x808000, 0x800080, 0x008080, 0xC0C0C0, 0x808080, //
    0x9999FF, 0x993366, 0xFFFFCC, 0xCCFFFF, 0x660066, 0xFF8080, 0x0066CC, 0xCCCCFF, //
    0x000080, 0xFF00FF, 0xFFFF00, 0x00FFFF, 0x800080, 0x800000, 0x008080, 0x0000FF, //
    0x00CCFF, 0xCCFFFF, 0xCCFFCC, 0xFFFF99, 0x99CCFF, 0xFF99CC, 0xCC99FF, 0xFFCC99, //
    0x3366FF, 0x33CCCC, 0x99CC00, 0xFFCC00, 0xFF9900, 0xFF6600, 0x666699, 0x969696, //
    0x003366, 0x339966, 0x003300, 0x333300, 0x993300, 0x993366, 0x333399, 0x333333,
];

impl Default for PaletteRecord {
    fn default() -> Self {
        Self {
            colors: DEFAULT_PALETTE
                .iter()
                .map(|&c| [(c >> 16) as u8, (c >> 8) as u8, c as u8])
                .collect(),
        }
    }
}

impl PaletteRecord {
    pub const FIRST_COLOR_INDEX: u16 = 0x8;

    /// RGB of palette index `index` (8-based), if in range.
    pub fn color(&self, index: u16) -> Option<[u8; 3]> {
        let i = index.checked_sub(Self::FIRST_COLOR_INDEX)? as usize;
        self.colors.get(i).copied()
    }

    pub fn set_color(&mut self, index: u16, rgb: [u8; 3]) -> bool {
        match index.checked_sub(Self::FIRST_COLOR_INDEX) {
            Some(i) if (i as usize) < self.colors.len() => {
                self.colors[i as usize] = rgb;
                true
            }
            _ => false,
        }
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let count = read_u16(data, &mut o)? as usize;
        let mut colors = Vec::with_capacity(count);
        for _ in 0..count {
            let rgb = read_bytes(data, &mut o, 4)?;
            colors.push([rgb[0], rgb[1], rgb[2]]);
        }
        Ok(Self { colors })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.colors.len() as u16);
        for c in &self.colors {
            out.extend_from_slice(&[c[0], c[1], c[2], 0]);
        }
    }
}

/// Write-reservation state: read-only recommendation, password verifier and user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSharingRecord {
    pub read_only: u16,
    pub password: u16,
    pub username: String,
}

impl FileSharingRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let read_only = read_u16(data, &mut o)?;
        let password = read_u16(data, &mut o)?;
        let username = if o < data.len() {
            read_unicode_string(data, &mut o)?
        } else {
            String::new()
        };
        Ok(Self {
            read_only,
            password,
            username,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.read_only);
        write_u16(out, self.password);
        write_unicode_string(out, &self.username);
    }
}

/// Id of the calculation engine that last recalculated the workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcIdRecord {
    pub reserved: u16,
    pub engine_id: u32,
}

impl RecalcIdRecord {
    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let _rt = read_u16(data, &mut o)?;
        Ok(Self {
            reserved: read_u16(data, &mut o)?,
            engine_id: read_u32(data, &mut o)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, sid::RECALCID);
        write_u16(out, self.reserved);
        write_u32(out, self.engine_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn write_access_is_padded() {
        let rec = WriteAccessRecord::new("duke").unwrap();
        let mut out = Vec::new();
        rec.write(&mut out);
        assert_eq!(out.len(), WriteAccessRecord::DATA_SIZE);
        assert_eq!(WriteAccessRecord::parse(&out).unwrap(), rec);
    }

    #[test]
    fn write_access_rejects_long_names() {
        assert!(WriteAccessRecord::new(&"x".repeat(120)).is_err());
    }

    #[test]
    fn style_built_in_flag() {
        let rec = StyleRecord::built_in(0x10, 3);
        let mut out = Vec::new();
        rec.write(&mut out);
        assert_eq!(out, vec![0x10, 0x80, 3, 0xFF]);
        assert_eq!(StyleRecord::parse(&out).unwrap(), rec);
    }

    #[test]
    fn boundsheet_visibility_bits() {
        let mut rec = BoundSheetRecord::new("Data");
        rec.visibility = SheetVisibility::VeryHidden;
        let mut out = Vec::new();
        rec.write(&mut out);
        assert_eq!(out[4], 2);
        assert_eq!(BoundSheetRecord::parse(&out).unwrap(), rec);
    }

    #[test]
    fn default_palette_lookup() {
        let p = PaletteRecord::default();
        assert_eq!(p.colors.len(), 56);
        assert_eq!(p.color(8), Some([0, 0, 0]));
        assert_eq!(p.color(0x0A), Some([0xFF, 0, 0]));
        assert_eq!(p.color(7), None);
    }
}
