//! Opaque sheet sub-streams: embedded charts and custom views.

use duke_xls_records::{sid, Record};

use crate::error::{XlsError, XlsResult};
use crate::sheet::RecordAggregate;
use crate::stream::RecordStream;

/// A nested BOF..EOF sub-stream, kept record for record.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSubstream {
    records: Vec<Record>,
}

impl ChartSubstream {
    /// Read from the BOF up to and including its matching EOF.
    pub fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        let bof = rs.next()?;
        if bof.sid() != sid::BOF {
            return Err(XlsError::format(format!("sub-stream starts with {}, not BOF", bof.name())));
        }
        let mut records = vec![bof];
        let mut depth = 1usize;
        while depth > 0 {
            let record = rs.next()?;
            match record.sid() {
                sid::BOF => depth += 1,
                sid::EOF => depth -= 1,
                _ => {}
            }
            records.push(record);
        }
        log::trace!("read sub-stream of {} records", records.len());
        Ok(Self { records })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl RecordAggregate for ChartSubstream {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        self.records.iter().for_each(|r| visitor(r));
    }
}

/// USERSVIEWBEGIN..USERSVIEWEND block.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomViewBlock {
    records: Vec<Record>,
}

impl CustomViewBlock {
    pub fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        let begin = rs.next()?;
        if begin.sid() != sid::USERSVIEWBEGIN {
            return Err(XlsError::format("bad custom view begin record"));
        }
        let mut records = vec![begin];
        loop {
            let record = rs.next()?;
            let done = record.sid() == sid::USERSVIEWEND;
            records.push(record);
            if done {
                break;
            }
        }
        Ok(Self { records })
    }

    /// GUID of the view, from USERSVIEWBEGIN.
    pub fn guid(&self) -> Option<Vec<u8>> {
        match self.records.first() {
            Some(Record::Unknown { data, .. }) if data.len() >= 16 => Some(data[..16].to_vec()),
            _ => None,
        }
    }

    /// Add a record just before USERSVIEWEND.
    pub fn append(&mut self, record: Record) {
        let end = self.records.len().saturating_sub(1).max(1);
        self.records.insert(end, record);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl RecordAggregate for CustomViewBlock {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        self.records.iter().for_each(|r| visitor(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::record::BofRecord;
    use pretty_assertions::assert_eq;

    #[test]
    fn nested_substreams_are_depth_tracked() {
        let mut chart_bof = BofRecord::worksheet();
        chart_bof.bof_type = sid::BOF_CHART;
        let mut rs = RecordStream::new(vec![
            Record::Bof(chart_bof.clone()),
            Record::Bof(chart_bof),
            Record::Eof,
            Record::short(sid::CALCMODE, 1),
            Record::Eof,
            Record::short(sid::GRIDSET, 1),
        ]);
        let chart = ChartSubstream::read(&mut rs).unwrap();
        assert_eq!(chart.records().len(), 5);
        assert_eq!(rs.peek_next_sid(), Some(sid::GRIDSET));
    }

    #[test]
    fn unterminated_substream_is_an_error() {
        let mut rs = RecordStream::new(vec![Record::Bof(BofRecord::worksheet()), Record::short(sid::CALCMODE, 1)]);
        assert!(ChartSubstream::read(&mut rs).is_err());
    }

    #[test]
    fn custom_view_appends_before_end() {
        let mut guid = vec![7u8; 16];
        guid.extend_from_slice(&[0; 48]);
        let mut rs = RecordStream::new(vec![
            Record::Unknown {
                sid: sid::USERSVIEWBEGIN,
                data: guid,
            },
            Record::short(sid::HCENTER, 1),
            Record::Empty(sid::USERSVIEWEND),
        ]);
        let mut view = CustomViewBlock::read(&mut rs).unwrap();
        assert_eq!(view.guid(), Some(vec![7u8; 16]));
        view.append(Record::short(sid::VCENTER, 1));
        let sids: Vec<u16> = view.records().iter().map(Record::sid).collect();
        assert_eq!(sids, vec![sid::USERSVIEWBEGIN, sid::HCENTER, sid::VCENTER, sid::USERSVIEWEND]);
    }
}
