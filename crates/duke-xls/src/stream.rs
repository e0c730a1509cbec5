//! Forward-only cursor over decoded records.

use std::iter::Peekable;
use std::vec::IntoIter;

use duke_xls_records::Record;

use crate::error::{XlsError, XlsResult};

/// Cursor over an owned record list.
///
/// Consumers take records off the front; there is no way back. Running out
/// of records while a structure is still open is a format error.
#[derive(Debug)]
pub struct RecordStream {
    records: Peekable<IntoIter<Record>>,
    count_read: usize,
}

impl RecordStream {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into_iter().peekable(),
            count_read: 0,
        }
    }

    pub fn has_next(&mut self) -> bool {
        self.records.peek().is_some()
    }

    /// Consume the next record.
    pub fn next(&mut self) -> XlsResult<Record> {
        match self.records.next() {
            Some(record) => {
                self.count_read += 1;
                Ok(record)
            }
            None => Err(XlsError::format("attempt to read past end of record stream")),
        }
    }

    /// Sid of the next record, or `None` at the end.
    pub fn peek_next_sid(&mut self) -> Option<u16> {
        self.records.peek().map(Record::sid)
    }

    pub fn peek(&mut self) -> Option<&Record> {
        self.records.peek()
    }

    /// Number of records consumed so far.
    pub fn count_read(&self) -> usize {
        self.count_read
    }

    /// Everything not yet consumed.
    pub fn into_remaining(self) -> Vec<Record> {
        self.records.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::sid;

    #[test]
    fn exhausted_stream_is_an_error() {
        let mut rs = RecordStream::new(vec![Record::Eof]);
        assert_eq!(rs.peek_next_sid(), Some(sid::EOF));
        assert!(rs.next().is_ok());
        assert_eq!(rs.count_read(), 1);
        assert!(!rs.has_next());
        assert_eq!(rs.peek_next_sid(), None);
        assert!(matches!(rs.next(), Err(XlsError::InvalidFormat(_))));
    }
}
