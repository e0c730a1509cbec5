//! XLUnicodeString and ShortXLUnicodeString fields.
//!
//! Layout: length (u8 or u16), then a flags byte. `FLAG_HIGH_BYTE` selects
//! UTF-16LE over one byte per character. `FLAG_RICH` adds a u16 run count
//! after the flags and `FLAG_EXT` a u32 phonetic block size; the runs (4
//! bytes each) and the phonetic block follow the characters.
//!
//! Strings are written compressed whenever every character fits in one byte.

use crate::error::{RecordError, RecordResult};
use crate::parser::{read_bytes, read_u16, read_u32, read_u8, write_u16, write_u8};

pub const FLAG_HIGH_BYTE: u8 = 0x01;
pub const FLAG_EXT: u8 = 0x04;
pub const FLAG_RICH: u8 = 0x08;

/// ShortXLUnicodeString: u8 length, flags, characters.
pub fn read_short_string(data: &[u8], offset: &mut usize) -> RecordResult<String> {
    let len = read_u8(data, offset)?;
    read_string_body(data, offset, u16::from(len))
}

/// XLUnicodeString with its optional formatting runs and phonetic block
/// stepped over.
pub fn read_unicode_string(data: &[u8], offset: &mut usize) -> RecordResult<String> {
    let len = read_u16(data, offset)?;
    let flags = read_u8(data, offset)?;
    let runs = match flags & FLAG_RICH {
        0 => 0,
        _ => usize::from(read_u16(data, offset)?),
    };
    let phonetic = match flags & FLAG_EXT {
        0 => 0,
        _ => read_u32(data, offset)? as usize,
    };
    let text = read_character_data(data, offset, len, flags)?;
    read_bytes(data, offset, runs * 4 + phonetic)?;
    Ok(text)
}

/// Read a flags byte followed by `char_count` characters (the length lives
/// elsewhere in the record, as in NAME and SUPBOOK).
pub fn read_string_body(data: &[u8], offset: &mut usize, char_count: u16) -> RecordResult<String> {
    let flags = read_u8(data, offset)?;
    read_character_data(data, offset, char_count, flags)
}

/// Read character data (no header) given char_count and flags byte.
pub fn read_character_data(
    data: &[u8],
    offset: &mut usize,
    char_count: u16,
    flags: u8,
) -> RecordResult<String> {
    let count = char_count as usize;
    if (flags & FLAG_HIGH_BYTE) != 0 {
        let bytes = read_bytes(data, offset, count * 2)
            .map_err(|_| RecordError::Parse(format!("string data too short: need {count} UTF-16 chars")))?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16(&units).map_err(|e| RecordError::Parse(format!("invalid UTF-16 string: {e}")))
    } else {
        let bytes = read_bytes(data, offset, count)
            .map_err(|_| RecordError::Parse(format!("string data too short: need {count} bytes")))?;
        Ok(bytes.iter().map(|&b| b as char).collect())
    }
}

/// Whether every character of `s` fits in the compressed (Latin-1) form.
pub fn is_compressible(s: &str) -> bool {
    s.chars().all(|c| (c as u32) < 0x100)
}

/// Number of UTF-16 code units, which is what BIFF8 length fields count.
pub fn char_count(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Write the characters of `s`, one byte each when `wide` is false.
pub fn write_characters(out: &mut Vec<u8>, s: &str, wide: bool) {
    if wide {
        for unit in s.encode_utf16() {
            write_u16(out, unit);
        }
    } else {
        out.extend(s.chars().map(|c| c as u32 as u8));
    }
}

/// Write a flags byte and the characters (length written by the caller).
pub fn write_string_body(out: &mut Vec<u8>, s: &str) {
    let wide = !is_compressible(s);
    write_u8(out, if wide { FLAG_HIGH_BYTE } else { 0 });
    write_characters(out, s, wide);
}

/// Write an XLUnicodeString (2-byte length, flags, characters).
pub fn write_unicode_string(out: &mut Vec<u8>, s: &str) {
    write_u16(out, char_count(s) as u16);
    write_string_body(out, s);
}

/// Write a ShortXLUnicodeString (1-byte length, flags, characters).
pub fn write_short_string(out: &mut Vec<u8>, s: &str) {
    write_u8(out, char_count(s) as u8);
    write_string_body(out, s);
}

/// Encoded size of `write_unicode_string(s)`.
pub fn unicode_string_size(s: &str) -> usize {
    3 + encoded_chars_size(s)
}

/// Encoded size of the characters of `s` in its preferred form.
pub fn encoded_chars_size(s: &str) -> usize {
    if is_compressible(s) {
        s.chars().count()
    } else {
        char_count(s) * 2
    }
}
