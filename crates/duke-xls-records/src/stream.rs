//! Physical BIFF8 record framing.
//!
//! A BIFF8 stream is a sequence of records, each with a 4-byte header
//! (2 bytes record type + 2 bytes body length) followed by the body.
//!
//! CONTINUE records (type 0x003C) extend the body of the preceding record
//! beyond the 8224-byte per-record limit. Only record kinds whose payload is
//! a continuation absorb them; the rest keep their CONTINUE records as
//! separate entries (OBJ/TXO text lives in those).

use std::io::{Read, Seek};

use crate::error::{RecordError, RecordResult};
use crate::parser::{write_u16, write_u8};
use crate::sid::{self, CONTINUE, MAX_RECORD_DATA_SIZE};

/// A single BIFF8 record as framed in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Record type ID (e.g. `sid::SST`, `sid::NUMBER`).
    pub sid: u16,
    /// Record body bytes (merged CONTINUE bodies appended).
    pub data: Vec<u8>,
    /// Offsets into `data` where a merged CONTINUE body starts.
    pub continue_offsets: Vec<usize>,
    /// Byte offset of this record's header in the stream.
    pub stream_offset: u64,
}

impl RawRecord {
    pub fn new(sid: u16, data: Vec<u8>) -> Self {
        Self {
            sid,
            data,
            continue_offsets: Vec::new(),
            stream_offset: 0,
        }
    }
}

/// Reads all BIFF8 records from a byte stream, merging CONTINUE records
/// into predecessors that accept them.
pub fn read_all_records<R: Read + Seek>(stream: &mut R) -> RecordResult<Vec<RawRecord>> {
    let mut records: Vec<RawRecord> = Vec::new();
    let mut header_buf = [0u8; 4];

    loop {
        let stream_offset = stream.stream_position()?;

        match stream.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(RecordError::Io(e)),
        }

        let record_sid = u16::from_le_bytes([header_buf[0], header_buf[1]]);
        let body_len = u16::from_le_bytes([header_buf[2], header_buf[3]]) as usize;

        let mut body = Vec::with_capacity(body_len);
        stream.by_ref().take(body_len as u64).read_to_end(&mut body)?;
        if body.len() < body_len {
            return Err(RecordError::Truncated {
                sid: record_sid,
                expected: body_len,
                actual: body.len(),
            });
        }

        if record_sid == CONTINUE {
            if let Some(prev) = records.last_mut() {
                if sid::is_continuable(prev.sid) {
                    prev.continue_offsets.push(prev.data.len());
                    prev.data.extend_from_slice(&body);
                    continue;
                }
            } else {
                log::warn!("orphan CONTINUE record at offset {stream_offset}");
            }
        }

        log::trace!(
            "record 0x{record_sid:04X} ({}) len={body_len} at {stream_offset}",
            sid::name(record_sid)
        );
        records.push(RawRecord {
            sid: record_sid,
            data: body,
            continue_offsets: Vec::new(),
            stream_offset,
        });
    }

    Ok(records)
}

/// Read records from an in-memory stream.
pub fn read_records_from_bytes(data: &[u8]) -> RecordResult<Vec<RawRecord>> {
    read_all_records(&mut std::io::Cursor::new(data))
}

/// Write a record header plus body, splitting bodies longer than 8224 bytes
/// into CONTINUE records.
pub fn write_record(out: &mut Vec<u8>, record_sid: u16, body: &[u8]) {
    let mut chunks = body.chunks(MAX_RECORD_DATA_SIZE);
    let first = chunks.next().unwrap_or(&[]);
    write_header(out, record_sid, first.len());
    out.extend_from_slice(first);
    for chunk in chunks {
        write_header(out, CONTINUE, chunk.len());
        out.extend_from_slice(chunk);
    }
}

/// Bytes `write_record` emits for a body of `body_len` bytes.
pub fn physical_size(body_len: usize) -> usize {
    if body_len == 0 {
        return 4;
    }
    let fragments = (body_len + MAX_RECORD_DATA_SIZE - 1) / MAX_RECORD_DATA_SIZE;
    body_len + 4 * fragments
}

pub fn write_header(out: &mut Vec<u8>, record_sid: u16, len: usize) {
    write_u16(out, record_sid);
    write_u16(out, len as u16);
}

/// Builder for records that need their own CONTINUE placement (SST).
///
/// Tracks the current fragment so callers can decide whether a unit of data
/// still fits, and start a new CONTINUE explicitly.
pub struct ContinuableWriter {
    sid: u16,
    fragments: Vec<Vec<u8>>,
    current: Vec<u8>,
}

impl ContinuableWriter {
    pub fn new(sid: u16) -> Self {
        Self {
            sid,
            fragments: Vec::new(),
            current: Vec::new(),
        }
    }

    /// Free bytes left in the current fragment.
    pub fn available(&self) -> usize {
        MAX_RECORD_DATA_SIZE - self.current.len()
    }

    /// Bytes written so far, counting the 4-byte header of each fragment.
    pub fn total_size(&self) -> usize {
        self.fragments.iter().map(|f| f.len() + 4).sum::<usize>() + 4 + self.current.len()
    }

    /// Offset of the next byte relative to the start of the current fragment's header.
    pub fn fragment_offset(&self) -> usize {
        4 + self.current.len()
    }

    pub fn start_continue(&mut self) {
        let done = std::mem::take(&mut self.current);
        self.fragments.push(done);
    }

    /// Begin a CONTINUE that carries a fresh string option byte.
    pub fn start_continue_with_flags(&mut self, flags: u8) {
        self.start_continue();
        write_u8(&mut self.current, flags);
    }

    pub fn buffer(&mut self) -> &mut Vec<u8> {
        &mut self.current
    }

    pub fn finish(mut self, out: &mut Vec<u8>) {
        self.start_continue();
        for (i, fragment) in self.fragments.iter().enumerate() {
            let record_sid = if i == 0 { self.sid } else { CONTINUE };
            write_header(out, record_sid, fragment.len());
            out.extend_from_slice(fragment);
        }
    }
}
