//! Shared string table (SST) and its bucket index (EXTSST).
//!
//! A string may run past the end of the SST body into a CONTINUE. Each
//! continuation restarts with its own option byte, so the character width
//! can flip between fragments; the decoder walks the fragment boundaries
//! kept by the physical reader.

use ahash::AHashMap;

use crate::error::{RecordError, RecordResult};
use crate::parser::*;
use crate::sid;
use crate::stream::ContinuableWriter;
use crate::strings::{char_count, is_compressible, FLAG_EXT, FLAG_HIGH_BYTE, FLAG_RICH};

/// Strings per EXTSST bucket.
pub const STRINGS_PER_BUCKET: usize = 8;
/// The host application only indexes the first 128 buckets.
pub const MAX_BUCKETS: usize = 128;

/// A formatting run: character position and font index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatRun {
    pub char_index: u16,
    pub font_index: u16,
}

/// SST entry with its rich-text runs and phonetic data preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UnicodeString {
    pub text: String,
    pub runs: Vec<FormatRun>,
    pub ext: Vec<u8>,
}

impl UnicodeString {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            runs: Vec::new(),
            ext: Vec::new(),
        }
    }

    fn flags(&self, wide: bool) -> u8 {
        let mut flags = if wide { FLAG_HIGH_BYTE } else { 0 };
        if !self.runs.is_empty() {
            flags |= FLAG_RICH;
        }
        if !self.ext.is_empty() {
            flags |= FLAG_EXT;
        }
        flags
    }

    fn header_size(&self) -> usize {
        3 + if self.runs.is_empty() { 0 } else { 2 } + if self.ext.is_empty() { 0 } else { 4 }
    }
}

/// Bucket entry of EXTSST: where a string starts in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SstBucket {
    /// Stream position of the string's first byte.
    pub stream_pos: u32,
    /// Offset within the SST or CONTINUE record, counting its header.
    pub record_offset: u16,
}

#[derive(Debug, Clone, Default)]
pub struct SstRecord {
    /// Total number of cell references to strings in the workbook.
    pub num_strings: u32,
    strings: Vec<UnicodeString>,
    lookup: AHashMap<UnicodeString, u32>,
}

impl PartialEq for SstRecord {
    fn eq(&self, other: &Self) -> bool {
        self.num_strings == other.num_strings && self.strings == other.strings
    }
}

impl SstRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference to `s`, returning its index. Duplicates share an entry.
    pub fn add_string(&mut self, s: UnicodeString) -> u32 {
        self.num_strings += 1;
        if let Some(&index) = self.lookup.get(&s) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.lookup.insert(s.clone(), index);
        self.strings.push(s);
        index
    }

    pub fn string(&self, index: usize) -> Option<&UnicodeString> {
        self.strings.get(index)
    }

    pub fn strings(&self) -> &[UnicodeString] {
        &self.strings
    }

    pub fn num_unique_strings(&self) -> usize {
        self.strings.len()
    }

    /// Decode from merged SST data; `boundaries` are the CONTINUE starts.
    pub fn parse(data: &[u8], boundaries: &[usize]) -> RecordResult<Self> {
        let mut o = 0;
        let num_strings = read_u32(data, &mut o)?;
        let unique = read_u32(data, &mut o)? as usize;
        let mut sst = Self {
            num_strings,
            strings: Vec::with_capacity(unique.min(data.len() / 3)),
            lookup: AHashMap::new(),
        };
        for i in 0..unique {
            match read_sst_string(data, &mut o, boundaries) {
                Ok(s) => {
                    sst.lookup.entry(s.clone()).or_insert(i as u32);
                    sst.strings.push(s);
                }
                Err(e) => {
                    // Some producers write a short or padded table.
                    log::warn!("SST parse error at string {i}/{unique}: {e}");
                    break;
                }
            }
        }
        Ok(sst)
    }

    /// Write SST plus CONTINUE records, returning the bucket offsets for EXTSST
    /// relative to the SST's first byte.
    pub fn serialize(&self, out: &mut Vec<u8>) -> Vec<SstBucket> {
        let mut w = ContinuableWriter::new(sid::SST);
        write_u32(w.buffer(), self.num_strings);
        write_u32(w.buffer(), self.strings.len() as u32);

        let mut buckets = Vec::new();
        for (k, s) in self.strings.iter().enumerate() {
            let wide = !is_compressible(&s.text);
            let char_size = if wide { 2 } else { 1 };
            let has_chars = !s.text.is_empty();
            // Keep the header and at least one character together.
            let needed = s.header_size() + if has_chars { char_size } else { 0 };
            if w.available() < needed {
                w.start_continue();
            }

            if k % STRINGS_PER_BUCKET == 0 && k / STRINGS_PER_BUCKET < MAX_BUCKETS {
                buckets.push(SstBucket {
                    stream_pos: w.total_size() as u32,
                    record_offset: w.fragment_offset() as u16,
                });
            }

            let flags = s.flags(wide);
            let buf = w.buffer();
            write_u16(buf, char_count(&s.text) as u16);
            write_u8(buf, flags);
            if !s.runs.is_empty() {
                write_u16(buf, s.runs.len() as u16);
            }
            if !s.ext.is_empty() {
                write_u32(buf, s.ext.len() as u32);
            }

            write_split_characters(&mut w, &s.text, wide);

            for run in &s.runs {
                if w.available() < 4 {
                    w.start_continue();
                }
                write_u16(w.buffer(), run.char_index);
                write_u16(w.buffer(), run.font_index);
            }

            let mut rest: &[u8] = &s.ext;
            while !rest.is_empty() {
                if w.available() == 0 {
                    w.start_continue();
                }
                let take = rest.len().min(w.available());
                w.buffer().extend_from_slice(&rest[..take]);
                rest = &rest[take..];
            }
        }
        w.finish(out);
        buckets
    }

    /// Exact bytes `serialize` emits.
    pub fn record_size(&self) -> usize {
        let mut scratch = Vec::new();
        self.serialize(&mut scratch);
        scratch.len()
    }
}

fn write_split_characters(w: &mut ContinuableWriter, text: &str, wide: bool) {
    let units: Vec<u16> = text.encode_utf16().collect();
    let char_size = if wide { 2 } else { 1 };
    let mut pos = 0;
    while pos < units.len() {
        let fit = w.available() / char_size;
        if fit == 0 {
            w.start_continue_with_flags(if wide { FLAG_HIGH_BYTE } else { 0 });
            continue;
        }
        let end = (pos + fit).min(units.len());
        let out = w.buffer();
        for &unit in &units[pos..end] {
            if wide {
                write_u16(out, unit);
            } else {
                write_u8(out, unit as u8);
            }
        }
        pos = end;
    }
}

fn read_sst_string(data: &[u8], o: &mut usize, boundaries: &[usize]) -> RecordResult<UnicodeString> {
    let cch = read_u16(data, o)? as usize;
    let mut flags = read_u8(data, o)?;
    let run_count = if flags & FLAG_RICH != 0 { read_u16(data, o)? } else { 0 };
    let ext_size = if flags & FLAG_EXT != 0 { read_u32(data, o)? } else { 0 };

    let mut units: Vec<u16> = Vec::with_capacity(cch);
    while units.len() < cch {
        let next_boundary = boundaries
            .iter()
            .copied()
            .find(|&b| b > *o)
            .unwrap_or(data.len());
        let char_size = if flags & FLAG_HIGH_BYTE != 0 { 2 } else { 1 };
        let fit = (next_boundary - *o) / char_size;
        let take = fit.min(cch - units.len());
        let bytes = read_bytes(data, o, take * char_size)?;
        if char_size == 2 {
            units.extend(bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])));
        } else {
            units.extend(bytes.iter().map(|&b| b as u16));
        }
        if units.len() < cch {
            if next_boundary >= data.len() {
                return Err(RecordError::Parse(format!(
                    "SST string truncated after {} of {cch} characters",
                    units.len()
                )));
            }
            // A CONTINUE splitting character data starts with a new flags byte.
            *o = next_boundary;
            flags = (flags & !FLAG_HIGH_BYTE) | (read_u8(data, o)? & FLAG_HIGH_BYTE);
        }
    }
    let text = String::from_utf16(&units).map_err(|e| RecordError::Parse(format!("invalid UTF-16 in SST: {e}")))?;

    let mut runs = Vec::with_capacity(run_count as usize);
    for _ in 0..run_count {
        runs.push(FormatRun {
            char_index: read_u16(data, o)?,
            font_index: read_u16(data, o)?,
        });
    }
    let ext = read_bytes(data, o, ext_size as usize)?.to_vec();
    Ok(UnicodeString { text, runs, ext })
}

/// Bucket index into the SST, regenerated whenever the SST is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtSstRecord {
    pub strings_per_bucket: u16,
    pub buckets: Vec<SstBucket>,
}

impl Default for ExtSstRecord {
    fn default() -> Self {
        Self {
            strings_per_bucket: STRINGS_PER_BUCKET as u16,
            buckets: Vec::new(),
        }
    }
}

impl ExtSstRecord {
    /// Number of buckets written for a table of `num_strings` unique strings.
    pub fn num_buckets_for(num_strings: usize) -> usize {
        ((num_strings + STRINGS_PER_BUCKET - 1) / STRINGS_PER_BUCKET).min(MAX_BUCKETS)
    }

    /// Body size for a table of `num_strings` unique strings.
    pub fn data_size_for(num_strings: usize) -> usize {
        2 + 8 * Self::num_buckets_for(num_strings)
    }

    pub fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut o = 0;
        let strings_per_bucket = read_u16(data, &mut o)?;
        let mut buckets = Vec::new();
        while o + 8 <= data.len() {
            let stream_pos = read_u32(data, &mut o)?;
            let record_offset = read_u16(data, &mut o)?;
            let _reserved = read_u16(data, &mut o)?;
            buckets.push(SstBucket {
                stream_pos,
                record_offset,
            });
        }
        Ok(Self {
            strings_per_bucket,
            buckets,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.strings_per_bucket);
        for b in &self.buckets {
            write_u32(out, b.stream_pos);
            write_u16(out, b.record_offset);
            write_u16(out, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::read_records_from_bytes;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_strings_share_an_index() {
        let mut sst = SstRecord::new();
        assert_eq!(sst.add_string(UnicodeString::new("a")), 0);
        assert_eq!(sst.add_string(UnicodeString::new("b")), 1);
        assert_eq!(sst.add_string(UnicodeString::new("a")), 0);
        assert_eq!(sst.num_strings, 3);
        assert_eq!(sst.num_unique_strings(), 2);
    }

    #[test]
    fn parse_simple_table() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&[0x01, 0x00, 0x00, b'A']);
        buf.extend_from_slice(&[0x02, 0x00, 0x00, b'B', b'C']);
        let sst = SstRecord::parse(&buf, &[]).unwrap();
        let texts: Vec<&str> = sst.strings().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "BC"]);
    }

    #[test]
    fn encoding_switch_at_continue_boundary() {
        // "AB" + "\u{0416}" where the third char starts a CONTINUE in UTF-16
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&[0x03, 0x00, 0x00, b'A', b'B']);
        let boundary = buf.len();
        buf.extend_from_slice(&[0x01, 0x16, 0x04]);
        let sst = SstRecord::parse(&buf, &[boundary]).unwrap();
        assert_eq!(sst.string(0).unwrap().text, "AB\u{0416}");
    }

    #[test]
    fn large_table_splits_and_reparses() {
        let mut sst = SstRecord::new();
        for i in 0..3000 {
            let mut s = UnicodeString::new(&format!("string number {i} \u{00e9}"));
            if i % 7 == 0 {
                s.text.push('\u{0416}');
            }
            if i % 11 == 0 {
                s.runs.push(FormatRun {
                    char_index: 0,
                    font_index: 1,
                });
            }
            sst.add_string(s);
        }
        let mut out = Vec::new();
        let buckets = sst.serialize(&mut out);
        assert_eq!(out.len(), sst.record_size());
        assert_eq!(buckets.len(), ExtSstRecord::num_buckets_for(3000));

        let raw = read_records_from_bytes(&out).unwrap();
        assert_eq!(raw.len(), 1);
        assert!(!raw[0].continue_offsets.is_empty());
        let reparsed = SstRecord::parse(&raw[0].data, &raw[0].continue_offsets).unwrap();
        assert_eq!(reparsed, sst);
    }

    #[test]
    fn surrogate_pairs_survive_a_continue_split() {
        // one narrow char shifts every pair so one straddles the boundary
        let text = format!("\u{00e9}{}", "\u{1F600}".repeat(3000));
        let mut sst = SstRecord::new();
        sst.add_string(UnicodeString::new(&text));
        let mut out = Vec::new();
        sst.serialize(&mut out);

        let raw = read_records_from_bytes(&out).unwrap();
        assert!(!raw[0].continue_offsets.is_empty());
        let reparsed = SstRecord::parse(&raw[0].data, &raw[0].continue_offsets).unwrap();
        assert_eq!(reparsed.string(0).unwrap().text, text);
    }

    #[test]
    fn bucket_counts() {
        assert_eq!(ExtSstRecord::num_buckets_for(0), 0);
        assert_eq!(ExtSstRecord::num_buckets_for(8), 1);
        assert_eq!(ExtSstRecord::num_buckets_for(9), 2);
        assert_eq!(ExtSstRecord::num_buckets_for(100_000), MAX_BUCKETS);
        assert_eq!(ExtSstRecord::data_size_for(9), 18);
    }
}
